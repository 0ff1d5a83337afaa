//! Structured diagnostics accumulated across all six compile phases.
//!
//! Mirrors the teacher's two-tier split: recoverable semantic problems are
//! pushed into a [`Diagnostics`] sink and compilation continues so a single
//! run surfaces as many problems as possible (c.f. `tables::Errors` /
//! `errors.push_validation` in the teacher's `models::validation` module);
//! unrecoverable system errors are returned as `Err(CompileError)` and
//! short-circuit the current phase via `?`.

use crate::location::Location;
use std::fmt;

/// Severity of a single diagnostic. Only `Error` marks the compiled module
/// invalid; `Warning` and `Info` are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// The closed enumeration of semantic diagnostic kinds a compile can surface.
/// Kept 1:1 with §6.4 of the specification; renamed to Rust-idiomatic
/// `CamelCase` but otherwise unchanged in meaning.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub enum DiagnosticKind {
    #[error("duplicate entry '{0}'")]
    DupEntry(String),
    #[error("definition '{0}' not found")]
    DefNotFound(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("wrong type: {0}")]
    WrongType(String),
    #[error("refine/augment/deviation target '{0}' not found")]
    MissingRefTarget(String),
    #[error("refinement of '{sub_statement}' is not allowed on target kind '{target_kind}'")]
    RefineNotAllowed {
        sub_statement: String,
        target_kind: String,
    },
    #[error("duplicate refine sub-statement '{0}' for the same target")]
    DupRefineStmt(String),
    #[error("mandatory sub-statement not allowed here: {0}")]
    MandatoryNotAllowed(String),
    #[error("invalid augment target '{0}'")]
    InvalidAugTarget(String),
    #[error("invalid deviate statement: {0}")]
    InvalidDevStmt(String),
    #[error("duplicate augment node '{0}'")]
    DupAugNode(String),
    #[error("invalid conditional: {0}")]
    InvalidConditional(String),
    #[error("unique component '{0}' has a conditional not present on its list")]
    UniqueConditionalMismatch(String),
    #[error("base type '{0}' cannot be used as a key or unique index")]
    TypeNotIndex(String),
    #[error("key or unique component '{0}' has the wrong index type")]
    WrongIndexType(String),
    #[error("leafref loop detected at '{path}' (revisits '{revisited}')")]
    LeafrefLoop { path: String, revisited: String },
    #[error("'{0}' is mandatory at the top level of the schema tree")]
    TopLevelMandatory(String),
    #[error("data missing: {0}")]
    DataMissing(String),
    #[error("invalid status: {0}")]
    InvalidStatus(String),
    #[error("statement ignored: {0}")]
    StmtIgnored(String),
    #[error("default case '{0}' of choice is not optional")]
    DefchoiceNotOptional(String),
    #[error("'{0}' uses a reserved name")]
    UsingReservedName(String),
    #[error("unexpected end of token stream")]
    Eof,
    #[error("internal memory error: {0}")]
    InternalMem(String),
    #[error("internal validation error: {0}")]
    InternalVal(String),
}

impl DiagnosticKind {
    /// The default severity for this kind, absent any config override.
    /// Most kinds are hard errors; a handful are advisory by nature (unused
    /// groupings/typedefs, cross-module same-name augment collisions, the
    /// unique/conditional mismatch which is explicitly a warning in §4.7.8).
    pub fn default_severity(&self) -> Severity {
        match self {
            DiagnosticKind::UniqueConditionalMismatch(_) => Severity::Warning,
            DiagnosticKind::StmtIgnored(_) => Severity::Warning,
            DiagnosticKind::DataMissing(_) => Severity::Info,
            _ => Severity::Error,
        }
    }
}

/// One reported problem, tagged with severity and source location. Derives
/// `Serialize` so a host embedding this crate as a library can hand
/// diagnostics to its own structured-output layer (JSON over a wire, a log
/// sink) rather than only ever `Display`-formatting them to a string (§7:
/// "diagnostics are still returned to the caller ... as structured values").
#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub location: Location,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:?}] {}", self.location, self.severity, self.kind)
    }
}

/// Accumulates diagnostics across an entire compile, and latches the
/// "retres" — the first error-severity code observed — without losing later
/// diagnostics. `has_errors()` is what a phase boundary checks before
/// proceeding, matching the spec's two-tier error model (§7).
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    retres: Option<DiagnosticKind>,
    // Warning kinds silenced by `CompilerConfig`; suppressed warnings still
    // bump this counter rather than being dropped from context entirely.
    suppressed_warnings: u32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a diagnostic at its kind's default severity.
    pub fn push(&mut self, location: Location, kind: DiagnosticKind) {
        let severity = kind.default_severity();
        self.push_with_severity(location, kind, severity);
    }

    pub fn push_with_severity(
        &mut self,
        location: Location,
        kind: DiagnosticKind,
        severity: Severity,
    ) {
        if severity == Severity::Error && self.retres.is_none() {
            self.retres = Some(kind.clone());
        }
        tracing::debug!(%location, ?severity, %kind, "diagnostic");
        self.entries.push(Diagnostic {
            kind,
            severity,
            location,
        });
    }

    /// Record that a warning of this kind was suppressed by configuration,
    /// without adding it to the visible entries.
    pub fn suppress(&mut self) {
        self.suppressed_warnings += 1;
    }

    /// Drop every non-error entry the given [`crate::config::CompilerConfig`]
    /// disables, moving it into the suppressed-warning count instead of the
    /// visible entry list (§9.3: suppressed warnings are still counted,
    /// never silently dropped from context entirely). Errors are never
    /// removed, matching `CompilerConfig::is_enabled`'s own rule.
    pub fn apply_config(&mut self, config: &crate::config::CompilerConfig) {
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if config.is_enabled(&entry.kind, entry.severity) {
                kept.push(entry);
            } else {
                self.suppressed_warnings += 1;
            }
        }
        self.entries = kept;
    }

    pub fn suppressed_warnings(&self) -> u32 {
        self.suppressed_warnings
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// The first error-severity diagnostic kind observed, if any — the
    /// "retres" of the spec's error model.
    pub fn retres(&self) -> Option<&DiagnosticKind> {
        self.retres.as_ref()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Warning)
    }
}

/// Fatal, unrecoverable compiler errors: abort the current phase immediately
/// and propagate, rather than being collected. Distinct from
/// [`DiagnosticKind`], which is always recoverable.
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error("unexpected end of token stream in {context}")]
    UnexpectedEof { context: &'static str },
    #[error("internal arena handle '{0}' is invalid; this is a compiler bug")]
    InvalidHandle(String),
    #[error("grouping expansion recursion exceeded the configured depth limit of {0}")]
    UsesDepthExceeded(usize),
}
