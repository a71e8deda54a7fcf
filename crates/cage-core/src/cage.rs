//! The cage: one owner for the session and every component
//!
//! Components borrow from the cage for the length of a call, so there is a
//! single session per cage and no process-wide state. Two cages over two rooms
//! are fully independent.

use crate::audit::{AuditEntry, AuditTrail, EntryKind};
use crate::config::CageConfig;
use crate::diff::{DiffRenderer, UnifiedDiff};
use crate::error::Result;
use crate::executor::{ApplyReport, Executor};
use crate::planner::{Plan, PlanHolder};
use crate::postcheck::{CheckResult, PostCondition, SmokeCheck};
use crate::referee::Referee;
use crate::rehydrator::{ContextDepth, FixedDepth, RehydratedContext, Rehydrator};
use crate::rulebook::{find_correction, Correction, PreferenceSource, Rulebook};
use crate::sandbox::Sandbox;
use crate::session::{Permission, Session};
use crate::workbench::Workbench;
use parking_lot::Mutex;
use serde_json::json;
use std::fs;
use std::path::PathBuf;

/// Result of a publish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { from: PathBuf, to: PathBuf },
    /// The last post-condition check did not pass (or none ran)
    Refused(String),
    NotFound(String),
}

pub struct Cage {
    config: CageConfig,
    session: Session,
    plans: PlanHolder,
    trail: AuditTrail,
    sandbox: Sandbox,
    preferences: Box<dyn PreferenceSource>,
    depth: Box<dyn ContextDepth>,
    renderer: Box<dyn DiffRenderer>,
    postcheck: Box<dyn PostCondition>,
    last_check: Mutex<Option<CheckResult>>,
}

impl std::fmt::Debug for Cage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cage")
            .field("sandbox", &self.sandbox.root())
            .field("trail", &self.trail.path())
            .field("session", &self.session.flags())
            .field("plan", &self.plans.current().map(|p| p.title))
            .finish_non_exhaustive()
    }
}

impl Cage {
    /// Open a cage over an existing sandbox directory
    ///
    /// The trail file is created if missing. The rulebook is read if present,
    /// defaults otherwise.
    ///
    /// # Errors
    /// Returns error if the sandbox root is missing, the trail cannot be
    /// opened, or the rulebook is malformed
    pub fn open(config: CageConfig) -> Result<Self> {
        let sandbox = Sandbox::new(&config.sandbox_root)?;
        let trail = AuditTrail::open(&config.trail_log_path)?;
        let rulebook = Rulebook::load(&config.rulebook_path)?;
        tracing::info!(
            sandbox = %sandbox.root().display(),
            trail = %trail.path().display(),
            "cage opened"
        );
        Ok(Self {
            depth: Box::new(FixedDepth(config.default_context_depth)),
            postcheck: Box::new(SmokeCheck::new(config.forbidden_markers.clone())),
            renderer: Box::new(UnifiedDiff::default()),
            preferences: Box::new(rulebook),
            session: Session::new(),
            plans: PlanHolder::new(),
            last_check: Mutex::new(None),
            config,
            sandbox,
            trail,
        })
    }

    #[must_use]
    pub fn with_preferences(mut self, source: impl PreferenceSource + 'static) -> Self {
        self.preferences = Box::new(source);
        self
    }

    #[must_use]
    pub fn with_context_depth(mut self, depth: impl ContextDepth + 'static) -> Self {
        self.depth = Box::new(depth);
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: impl DiffRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    #[must_use]
    pub fn with_postcondition(mut self, check: impl PostCondition + 'static) -> Self {
        self.postcheck = Box::new(check);
        self
    }

    #[must_use]
    pub fn config(&self) -> &CageConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn plans(&self) -> &PlanHolder {
        &self.plans
    }

    #[must_use]
    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    #[must_use]
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    #[must_use]
    pub fn referee(&self) -> Referee<'_> {
        Referee::new(&self.session, &self.plans, &self.trail, &self.sandbox)
    }

    #[must_use]
    pub fn workbench(&self) -> Workbench<'_> {
        Workbench::new(self.referee(), &self.sandbox)
    }

    #[must_use]
    pub fn rehydrator(&self) -> Rehydrator<'_> {
        Rehydrator::new(
            &self.session,
            &self.trail,
            self.preferences.as_ref(),
            self.depth.as_ref(),
        )
    }

    #[must_use]
    pub fn executor(&self) -> Executor<'_> {
        Executor::new(
            &self.session,
            &self.plans,
            &self.trail,
            self.referee(),
            self.workbench(),
            self.renderer.as_ref(),
            self.postcheck.as_ref(),
            self.config.plan_retention,
        )
    }

    /// # Errors
    /// See [`Rehydrator::rehydrate`]
    pub fn rehydrate(&self, hint: Option<&str>) -> Result<RehydratedContext> {
        self.rehydrator().rehydrate(hint)
    }

    /// Declare a plan and mirror it into the trail
    ///
    /// When the replacement repeats a stored correction, the entry's `notes`
    /// says so.
    ///
    /// # Errors
    /// Propagates preference-store and trail failures
    pub fn plan(
        &self,
        title: &str,
        target_file: &str,
        find_text: &str,
        replace_text: &str,
    ) -> Result<Plan> {
        let corrections = self.preferences.corrections()?;
        let notes = find_correction(&corrections, find_text, replace_text)
            .map(|c| format!("respects prior correction from {}", c.timestamp));

        let plan = self.plans.create(title, target_file, find_text, replace_text);
        self.trail.append(
            EntryKind::Plan,
            json!({
                "title": plan.title,
                "target_file": plan.target_file,
                "find_text": plan.find_text,
                "replace_text": plan.replace_text,
                "timestamp": plan.timestamp(),
                "notes": notes,
            }),
        )?;
        tracing::info!(title, target_file, "plan recorded");
        Ok(plan)
    }

    /// Apply the pending plan; see [`Executor::apply_current_plan`]
    ///
    /// # Errors
    /// Policy refusals before any write, or a fatal audit error
    pub fn apply(&self) -> Result<ApplyReport> {
        let report = self.executor().apply_current_plan()?;
        if let Some(tests) = &report.tests {
            *self.last_check.lock() = Some(tests.clone());
        }
        Ok(report)
    }

    /// Create first-time files inside a bootstrap window
    ///
    /// Files that already exist are left alone. Returns the paths created.
    ///
    /// # Errors
    /// Refuses paths outside the sandbox; propagates I/O and trail failures
    pub fn seed(&self, files: &[(&str, &str)]) -> Result<Vec<String>> {
        let bench = self.workbench();
        let mut created = Vec::new();
        {
            let _window = self.session.acquire(Permission::Bootstrap);
            for (path, content) in files {
                if bench.exists(path)? {
                    tracing::debug!(path, "seed skipped, already present");
                    continue;
                }
                bench.create_only_write(path, content)?;
                created.push((*path).to_string());
            }
        }
        self.trail.append(
            EntryKind::RoomReady,
            json!({ "action": "initialized", "files_created": created }),
        )?;
        Ok(created)
    }

    /// Copy a sandbox file to the artifacts directory
    ///
    /// Only allowed while the most recent post-condition check passed.
    ///
    /// # Errors
    /// Refuses paths outside the sandbox; propagates I/O and trail failures
    pub fn publish(&self, file: &str) -> Result<PublishOutcome> {
        if !self.last_check().is_some_and(|c| c.passed) {
            return Ok(PublishOutcome::Refused(
                "Tests must pass before publishing.".to_string(),
            ));
        }
        let from = self.referee().require_in_sandbox(file)?;
        if !from.is_file() {
            return Ok(PublishOutcome::NotFound(format!(
                "{file} does not exist in workspace."
            )));
        }
        let content = self.workbench().read(file)?;
        let relative = self.sandbox.relative(&from).unwrap_or(from.as_path());
        let to = self.config.artifacts_dir.join(relative);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&to, content)?;

        self.trail.append(
            EntryKind::Publish,
            json!({
                "file": file,
                "from": from.display().to_string(),
                "to": to.display().to_string(),
            }),
        )?;
        tracing::info!(file, to = %to.display(), "published");
        Ok(PublishOutcome::Published { from, to })
    }

    /// Log a correction the preference store has just recorded
    ///
    /// # Errors
    /// Propagates trail failures
    pub fn record_correction(&self, correction: &Correction) -> Result<AuditEntry> {
        Ok(self
            .trail
            .append(EntryKind::CorrectionAdded, serde_json::to_value(correction)?)?)
    }

    /// Most recent trail entries, oldest first
    ///
    /// # Errors
    /// Propagates trail read failures
    pub fn recent(&self, n: usize) -> Result<Vec<AuditEntry>> {
        Ok(self.trail.tail(n)?)
    }

    /// Outcome of the most recent post-condition check in this session
    #[must_use]
    pub fn last_check(&self) -> Option<CheckResult> {
        self.last_check.lock().clone()
    }
}
