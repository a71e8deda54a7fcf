//! Policy referee
//!
//! Each check is either a no-op or a refusal. A refusal is written to the
//! trail as a `violation` entry naming the rule, then returned to the caller
//! as [`PolicyViolation`], whose text never names the rule.

use crate::audit::{AuditTrail, EntryKind};
use crate::error::AuditError;
use crate::error::{CageError, PolicyViolation, Result, Rule, VIOLATION_MESSAGE};
use crate::planner::PlanHolder;
use crate::sandbox::Sandbox;
use crate::session::Session;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub struct Referee<'a> {
    session: &'a Session,
    plans: &'a PlanHolder,
    trail: &'a AuditTrail,
    sandbox: &'a Sandbox,
}

impl<'a> Referee<'a> {
    #[must_use]
    pub fn new(
        session: &'a Session,
        plans: &'a PlanHolder,
        trail: &'a AuditTrail,
        sandbox: &'a Sandbox,
    ) -> Self {
        Self {
            session,
            plans,
            trail,
            sandbox,
        }
    }

    /// # Errors
    /// Refuses when no plan is pending
    pub fn require_plan_exists(&self) -> Result<()> {
        if self.plans.is_present() {
            Ok(())
        } else {
            Err(self.refuse(Rule::PlanThenAct, Value::Null))
        }
    }

    /// # Errors
    /// Refuses when the session has not been rehydrated
    pub fn require_rehydrated(&self) -> Result<()> {
        if self.session.is_rehydrated() {
            Ok(())
        } else {
            Err(self.refuse(Rule::RehydrateBeforeAct, Value::Null))
        }
    }

    /// Resolve `path` inside the sandbox
    ///
    /// # Errors
    /// Refuses on escape or when the path cannot be resolved
    pub fn require_in_sandbox(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        self.sandbox.resolve(path).map_err(|e| {
            self.refuse(
                Rule::WorkspaceOnly,
                json!({ "path": path.display().to_string(), "reason": e.to_string() }),
            )
        })
    }

    /// `resolved` must come from [`Referee::require_in_sandbox`]
    ///
    /// # Errors
    /// Refuses unless diff-mode is active, or bootstrap-mode is active and the
    /// target does not exist yet
    pub fn require_write_permitted(&self, resolved: &Path) -> Result<()> {
        let flags = self.session.flags();
        let permitted =
            flags.diff_mode_active || (flags.bootstrap_mode && !resolved.exists());
        if permitted {
            Ok(())
        } else {
            Err(self.refuse(
                Rule::WritePermitted,
                json!({
                    "path": self.display_path(resolved),
                    "diff_mode_active": flags.diff_mode_active,
                    "bootstrap_mode": flags.bootstrap_mode,
                }),
            ))
        }
    }

    /// # Errors
    /// Refuses when the trail has been seen to shrink. Recording that refusal
    /// fails too, so the caller receives the fatal audit error.
    pub fn require_log_append_only(&self) -> Result<()> {
        if self.trail.check_integrity() {
            Ok(())
        } else {
            Err(self.refuse(Rule::AppendOnlyLog, Value::Null))
        }
    }

    fn display_path(&self, resolved: &Path) -> String {
        self.sandbox
            .relative(resolved)
            .unwrap_or(resolved)
            .display()
            .to_string()
    }

    /// Only a broken trail replaces the refusal; other recording failures are
    /// logged and the caller still sees the violation.
    fn refuse(&self, rule: Rule, detail: Value) -> CageError {
        tracing::warn!(rule = %rule, %detail, "policy violation");
        let mut data = json!({ "rule": rule.as_str(), "message": VIOLATION_MESSAGE });
        if let (Some(data), Value::Object(extra)) = (data.as_object_mut(), detail) {
            data.extend(extra);
        }
        match self.trail.append(EntryKind::Violation, data) {
            Err(e @ AuditError::Integrity { .. }) => e.into(),
            Err(e) => {
                tracing::error!(rule = %rule, error = %e, "violation could not be recorded");
                PolicyViolation::new(rule).into()
            }
            Ok(_) => PolicyViolation::new(rule).into(),
        }
    }
}
