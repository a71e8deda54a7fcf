//! Error types for the cage
//!
//! Three channels, kept deliberately apart:
//! - [`PolicyViolation`]: a precondition refused the action. Always logged to
//!   the trail before it reaches the caller, and always rendered with the same
//!   refusal text.
//! - [`AuditError`]: the trail itself failed. `Integrity` is fatal.
//! - Everything else (I/O, configuration) is recoverable and usually folded
//!   into a structured failure by the executor.

use std::fmt;
use std::path::PathBuf;

/// User-facing text for every policy refusal.
pub const VIOLATION_MESSAGE: &str = "Not allowed. Diff-only and append-only per the rules.";

/// Top-level cage error
#[derive(Debug, thiserror::Error)]
pub enum CageError {
    /// A precondition refused the action
    #[error(transparent)]
    Violation(#[from] PolicyViolation),

    /// The audit trail failed
    #[error("audit trail error: {0}")]
    Audit(#[from] AuditError),

    /// Create-only write hit an existing file
    #[error("refusing to overwrite existing file: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CageError {
    /// Check if the error must abort the process rather than be folded into a result
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Audit(AuditError::Integrity { .. }))
    }

    /// Check if the error is a policy refusal
    #[inline]
    #[must_use]
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Violation(_))
    }

    /// The rule behind a policy refusal, if this is one
    #[inline]
    #[must_use]
    pub fn violated_rule(&self) -> Option<Rule> {
        match self {
            Self::Violation(v) => Some(v.rule()),
            _ => None,
        }
    }
}

/// Preconditions enforced by the referee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    PlanThenAct,
    RehydrateBeforeAct,
    WorkspaceOnly,
    WritePermitted,
    AppendOnlyLog,
}

impl Rule {
    /// Identifier recorded in `violation` entries
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PlanThenAct => "plan_then_act",
            Self::RehydrateBeforeAct => "rehydrate_before_act",
            Self::WorkspaceOnly => "workspace_only",
            Self::WritePermitted => "write_permitted",
            Self::AppendOnlyLog => "append_only_log",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refused precondition
///
/// Displays as [`VIOLATION_MESSAGE`] regardless of the rule, so a caller
/// cannot tell which check fired. The rule is kept for the trail and for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    rule: Rule,
}

impl PolicyViolation {
    #[must_use]
    pub const fn new(rule: Rule) -> Self {
        Self { rule }
    }

    #[must_use]
    pub const fn rule(&self) -> Rule {
        self.rule
    }
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(VIOLATION_MESSAGE)
    }
}

impl std::error::Error for PolicyViolation {}

/// Audit trail failures
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The log shrank or was replaced out-of-band
    #[error("log integrity violated: expected at least {expected_at_least} bytes, found {actual}")]
    Integrity { expected_at_least: u64, actual: u64 },

    /// Filesystem failure while appending or reading
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid rulebook: {0}")]
    Rulebook(String),
}

pub type Result<T, E = CageError> = std::result::Result<T, E>;
