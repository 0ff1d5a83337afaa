//! Source locations. Every diagnostic and every schema object carries one of
//! these so that errors can be attributed back to a specific module, line,
//! and column of the original YANG text.

use std::fmt;

/// A single point in a YANG source file (module or submodule).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Location {
    pub module: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(module: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            module: module.into(),
            line,
            column,
        }
    }

    /// A placeholder location for objects synthesized by the compiler itself
    /// (synthetic rpc input/output, synthetic choice-shorthand cases) which
    /// have no direct textual origin of their own; callers should prefer
    /// `Location::derived_from` when a sensible parent location exists.
    pub fn synthetic(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            line: 0,
            column: 0,
        }
    }

    pub fn derived_from(origin: &Location) -> Self {
        origin.clone()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.module, self.line, self.column)
    }
}
