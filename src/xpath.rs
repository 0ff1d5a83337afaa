//! The XPath subsystem (§6.3): parsing and semantic validation of
//! `must`/`when` expressions and schema-node-id paths (`augment` targets,
//! `leafref` paths). True XPath 1.0 expression evaluation is out of scope
//! and stays behind the [`XPathEngine`] trait; this crate ships a
//! [`SchemaPathResolver`] that understands schema-node-id syntax well
//! enough to resolve augment targets and leafref targets in its own tests.

use crate::arena::ObjectId;
use std::fmt;

/// A "parse control block": the external XPath subsystem's opaque parsed
/// representation of one expression. Cheap to `Clone` because cloning a PCB
/// (to re-validate the same expression against a different context object,
/// e.g. a clone produced by uses-expansion) is a named operation of the
/// external interface (`clone_pcb`, §6.2/§6.3).
#[derive(Debug, Clone)]
pub struct Pcb {
    /// The raw expression text, exactly as written in the module.
    pub expr: String,
    /// Filled in once `validate_expr` (for must/when) or
    /// `find_schema_target`/`yang_validate_path` (for augment targets and
    /// leafref paths) has run; `None` beforehand.
    pub resolved_target: Option<ObjectId>,
}

impl Pcb {
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            resolved_target: None,
        }
    }
}

impl fmt::Display for Pcb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// Where a must/when expression is declared — the external validator needs
/// this to decide which axes are legal (e.g. a `when` on an augment may
/// reference the augment's target context even before the clone exists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprSource {
    Must,
    When,
}

/// One segment of a schema-node-id path: an optional namespace prefix and a
/// local name, e.g. `ex:top` in `/ex:top/ex:child`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub prefix: Option<String>,
    pub name: String,
}

/// A parsed schema-node-id: either absolute (rooted at a module's top
/// level, required for top-level augments, §4.5.1) or a descendant path
/// (rooted at the current scope, required for augments nested inside a
/// uses, and for refine/leafref targets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNodeId {
    pub absolute: bool,
    pub steps: Vec<PathStep>,
}

#[derive(thiserror::Error, Debug)]
pub enum PathParseError {
    #[error("empty path")]
    Empty,
    #[error("empty path step in '{0}'")]
    EmptyStep(String),
}

impl SchemaNodeId {
    /// Parse `/prefix:name/prefix:name` (absolute) or `prefix:name/name`
    /// (descendant, relative) schema-node-id syntax.
    pub fn parse(path: &str) -> Result<SchemaNodeId, PathParseError> {
        if path.is_empty() {
            return Err(PathParseError::Empty);
        }
        let absolute = path.starts_with('/');
        let body = path.trim_start_matches('/');
        let mut steps = Vec::new();
        for part in body.split('/') {
            if part.is_empty() {
                return Err(PathParseError::EmptyStep(path.to_string()));
            }
            let (prefix, name) = match part.split_once(':') {
                Some((p, n)) => (Some(p.to_string()), n.to_string()),
                None => (None, part.to_string()),
            };
            steps.push(PathStep { prefix, name });
        }
        Ok(SchemaNodeId { absolute, steps })
    }
}

/// The external XPath subsystem's interface (§6.3).
pub trait XPathEngine {
    /// `xpath1_parse_expr`: parse a must/when expression's text into a PCB,
    /// without yet resolving any schema references it contains.
    fn parse_expr(&self, expr: &str, _source: ExprSource) -> Pcb {
        Pcb::new(expr)
    }

    /// `xpath1_validate_expr`: semantic check of a parsed must/when
    /// expression against a context object. The reference implementation is
    /// a black box returning success; callers needing real boolean-valued
    /// XPath evaluation must supply their own `XPathEngine`.
    fn validate_expr(&self, _pcb: &Pcb, _context: ObjectId) -> Result<(), String> {
        Ok(())
    }

    /// `xpath_yang_parse_path`: parse a leafref `path` argument.
    fn parse_leafref_path(&self, path: &str) -> Result<Pcb, PathParseError> {
        SchemaNodeId::parse(path)?;
        Ok(Pcb::new(path))
    }

    fn clone_pcb(&self, pcb: &Pcb) -> Pcb {
        pcb.clone()
    }
}

/// Reference `XPathEngine` understanding only schema-node-id syntax
/// (absolute and descendant paths); `must`/`when` boolean semantics are a
/// pass-through no-op, matching the spec's framing of full XPath evaluation
/// as a black box (§1 Out of scope).
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaPathResolver;

impl XPathEngine for SchemaPathResolver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_schema_node_id() {
        let id = SchemaNodeId::parse("/ex:top/ex:child").unwrap();
        assert!(id.absolute);
        assert_eq!(id.steps.len(), 2);
        assert_eq!(id.steps[0].prefix.as_deref(), Some("ex"));
        assert_eq!(id.steps[0].name, "top");
    }

    #[test]
    fn parses_descendant_schema_node_id() {
        let id = SchemaNodeId::parse("child/grandchild").unwrap();
        assert!(!id.absolute);
        assert_eq!(id.steps.len(), 2);
        assert_eq!(id.steps[1].name, "grandchild");
    }

    #[test]
    fn rejects_empty_step() {
        assert!(SchemaNodeId::parse("/ex:top//ex:child").is_err());
    }
}
