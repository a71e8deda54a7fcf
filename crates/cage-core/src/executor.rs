//! Execution orchestrator
//!
//! Drives one apply attempt for the pending plan:
//!
//! 1. referee preconditions (plan, rehydration, intact trail); refusals are
//!    returned as errors
//! 2. read the target through the workbench
//! 3. substitute every occurrence of `find_text`
//! 4. record a display diff
//! 5. write inside a diff-mode window
//! 6. run the post-condition
//! 7. keep (clear the plan) or revert to the original bytes
//!
//! Anything that goes wrong after the preconditions is recorded as
//! `apply_error` and reported through [`ApplyReport`]; only a broken audit
//! trail escapes as an error.

use crate::audit::{AuditTrail, EntryKind};
use crate::config::PlanRetention;
use crate::diff::DiffRenderer;
use crate::error::{PolicyViolation, Result, Rule};
use crate::planner::{Plan, PlanHolder};
use crate::postcheck::{CheckResult, PostCondition};
use crate::referee::Referee;
use crate::session::{Permission, Session};
use crate::state_machine::{validate_transition, ApplyState};
use crate::workbench::Workbench;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;

/// Replace every occurrence of `find` with `replace`
///
/// An empty `find` matches nothing, so the content comes back unchanged.
#[must_use]
pub fn substitute(original: &str, find: &str, replace: &str) -> String {
    if find.is_empty() {
        original.to_string()
    } else {
        original.replace(find, replace)
    }
}

/// Outcome of one apply attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub success: bool,
    pub state: ApplyState,
    pub plan_title: String,
    pub detail: String,
    pub tests: Option<CheckResult>,
    pub revert_success: Option<bool>,
}

impl ApplyReport {
    fn new(plan: &Plan, state: ApplyState, detail: impl Into<String>) -> Self {
        Self {
            success: state == ApplyState::Committed,
            state,
            plan_title: plan.title.clone(),
            detail: detail.into(),
            tests: None,
            revert_success: None,
        }
    }
}

struct Tracker {
    state: ApplyState,
}

impl Tracker {
    fn advance(&mut self, to: ApplyState) {
        let legal = validate_transition(self.state, to);
        if let Err(illegal) = &legal {
            tracing::error!(error = %illegal, "apply pipeline left the transition table");
        }
        debug_assert!(
            legal.is_ok(),
            "illegal apply transition: {:?} -> {:?}",
            self.state,
            to
        );
        tracing::debug!(from = ?self.state, to = ?to, "apply transition");
        self.state = to;
    }
}

pub struct Executor<'a> {
    session: &'a Session,
    plans: &'a PlanHolder,
    trail: &'a AuditTrail,
    referee: Referee<'a>,
    bench: Workbench<'a>,
    renderer: &'a dyn DiffRenderer,
    postcheck: &'a dyn PostCondition,
    retention: PlanRetention,
}

impl<'a> Executor<'a> {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        session: &'a Session,
        plans: &'a PlanHolder,
        trail: &'a AuditTrail,
        referee: Referee<'a>,
        bench: Workbench<'a>,
        renderer: &'a dyn DiffRenderer,
        postcheck: &'a dyn PostCondition,
        retention: PlanRetention,
    ) -> Self {
        Self {
            session,
            plans,
            trail,
            referee,
            bench,
            renderer,
            postcheck,
            retention,
        }
    }

    /// Apply the pending plan
    ///
    /// # Errors
    /// A [`CageError::Violation`](crate::error::CageError::Violation) when
    /// there is no plan or the session is not rehydrated (nothing is written),
    /// or a fatal audit error. All other failures come back as an
    /// unsuccessful [`ApplyReport`].
    pub fn apply_current_plan(&self) -> Result<ApplyReport> {
        self.referee.require_plan_exists()?;
        self.referee.require_rehydrated()?;
        self.referee.require_log_append_only()?;
        let Some(plan) = self.plans.current() else {
            return Err(PolicyViolation::new(Rule::PlanThenAct).into());
        };

        let mut tracker = Tracker {
            state: ApplyState::Idle,
        };
        tracker.advance(ApplyState::Planned);
        tracing::info!(title = %plan.title, file = %plan.target_file, "applying plan");

        match self.run(&plan, &mut tracker) {
            Ok(report) => Ok(report),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(title = %plan.title, error = %e, "apply failed");
                self.trail.append(
                    EntryKind::ApplyError,
                    json!({ "plan_title": plan.title, "error": e.to_string() }),
                )?;
                tracker.advance(ApplyState::Failed);
                Ok(ApplyReport::new(&plan, tracker.state, e.to_string()))
            }
        }
    }

    fn run(&self, plan: &Plan, tracker: &mut Tracker) -> Result<ApplyReport> {
        let file = plan.target_file.as_str();
        let original = self.bench.read(file)?;
        let updated = substitute(&original, &plan.find_text, &plan.replace_text);

        tracker.advance(ApplyState::Diffing);
        let record = self.renderer.render(&original, &updated, file);
        self.trail.append(
            EntryKind::Diff,
            json!({
                "plan_title": plan.title,
                "file": file,
                "diff": record.diff,
                "has_changes": record.has_changes,
            }),
        )?;

        let written = self.write_in_diff_mode(file, &updated);
        let write_error = written.as_ref().err().map(ToString::to_string);
        self.trail.append(
            EntryKind::ApplyResult,
            json!({
                "plan_title": plan.title,
                "file": file,
                "success": written.is_ok(),
                "error": write_error,
            }),
        )?;
        if let Err(e) = written {
            if e.is_fatal() {
                return Err(e);
            }
            self.trail.append(
                EntryKind::ApplyError,
                json!({ "plan_title": plan.title, "file": file, "error": e.to_string() }),
            )?;
            tracker.advance(ApplyState::Failed);
            return Ok(ApplyReport::new(plan, tracker.state, e.to_string()));
        }

        tracker.advance(ApplyState::Testing);
        let result = self.postcheck.check(&self.bench, file);
        self.trail.append(
            EntryKind::Tests,
            json!({
                "plan_title": plan.title,
                "file": file,
                "passed": result.passed,
                "details": result.details,
            }),
        )?;

        if !result.passed {
            return self.revert(plan, &original, result, tracker);
        }

        self.plans.clear();
        tracker.advance(ApplyState::Committed);
        tracing::info!(title = %plan.title, file, "plan committed");
        let mut report = ApplyReport::new(plan, tracker.state, "Changes applied and tests passed");
        report.tests = Some(result);
        Ok(report)
    }

    fn revert(
        &self,
        plan: &Plan,
        original: &str,
        result: CheckResult,
        tracker: &mut Tracker,
    ) -> Result<ApplyReport> {
        let file = plan.target_file.as_str();
        tracing::warn!(title = %plan.title, file, details = %result.details, "post-condition failed, reverting");

        let restored = match self
            .write_in_diff_mode(file, original)
            .and_then(|_| self.bench.read(file))
            .map(|content| content == original)
        {
            Err(e) if e.is_fatal() => return Err(e),
            other => other,
        };
        let revert_success = matches!(restored, Ok(true));
        let revert_error = match &restored {
            Ok(true) => None,
            Ok(false) => Some("restored content differs from original".to_string()),
            Err(e) => Some(e.to_string()),
        };
        self.trail.append(
            EntryKind::Revert,
            json!({
                "plan_title": plan.title,
                "file": file,
                "reason": "test_failure",
                "revert_success": revert_success,
                "error": revert_error,
            }),
        )?;

        if self.retention == PlanRetention::Clear {
            self.plans.clear();
        }

        let (state, detail) = if revert_success {
            (ApplyState::Reverted, "Tests failed, changes reverted".to_string())
        } else {
            tracing::error!(title = %plan.title, file, "revert failed; workspace holds rejected content");
            (
                ApplyState::Failed,
                format!(
                    "Tests failed and revert failed: {}",
                    revert_error.unwrap_or_default()
                ),
            )
        };
        tracker.advance(state);
        let mut report = ApplyReport::new(plan, tracker.state, detail);
        report.tests = Some(result);
        report.revert_success = Some(revert_success);
        Ok(report)
    }

    fn write_in_diff_mode(&self, file: &str, content: &str) -> Result<PathBuf> {
        let _window = self.session.acquire(Permission::DiffMode);
        self.bench.guarded_overwrite(file, content)
    }
}
