//! Cage Core - guarded mutation of a sandboxed workspace
//!
//! Every change to the workspace goes through one pipeline:
//! - a plan declares the intended find/replace before anything is touched
//! - the referee refuses writes outside the sandbox or outside a diff-mode window
//! - the executor writes, runs a post-condition, and reverts on failure
//! - every step lands in an append-only, hash-verified audit trail
//!
//! # Example
//!
//! ```rust,ignore
//! use cage_core::{Cage, CageConfig};
//!
//! # fn example() -> Result<(), cage_core::CageError> {
//! let cage = Cage::open(CageConfig::for_room("room"))?;
//! cage.rehydrate(None)?;
//! cage.plan("Swap label", "notes.txt", "A", "B")?;
//! let report = cage.apply()?;
//! println!("{:?}: {}", report.state, report.detail);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod audit;
pub mod cage;
pub mod config;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod postcheck;
pub mod referee;
pub mod rehydrator;
pub mod rulebook;
pub mod sandbox;
pub mod session;
pub mod state_machine;
pub mod workbench;

pub use audit::{AuditEntry, AuditTrail, EntryKind, IntegrityReport};
pub use cage::{Cage, PublishOutcome};
pub use config::{CageConfig, PlanRetention, DEFAULT_CONTEXT_DEPTH};
pub use diff::{DiffRecord, DiffRenderer, UnifiedDiff};
pub use error::{
    AuditError, CageError, ConfigError, PolicyViolation, Result, Rule, VIOLATION_MESSAGE,
};
pub use executor::{substitute, ApplyReport, Executor};
pub use planner::{Plan, PlanHolder};
pub use postcheck::{CheckResult, PostCondition, SmokeCheck};
pub use referee::Referee;
pub use rehydrator::{ContextDepth, FixedDepth, RehydratedContext, Rehydrator};
pub use rulebook::{find_correction, Correction, PreferenceSource, Rulebook};
pub use sandbox::{Sandbox, SandboxError};
pub use session::{Permission, PermissionGuard, Session, SessionFlags};
pub use state_machine::{allowed_transitions, validate_transition, ApplyState, IllegalTransition};
pub use workbench::Workbench;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        ApplyReport, ApplyState, Cage, CageConfig, CageError, CheckResult, Correction, EntryKind,
        Permission, PostCondition, PublishOutcome, Rule, Workbench,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
