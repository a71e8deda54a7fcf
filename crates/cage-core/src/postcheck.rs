//! Post-condition checks
//!
//! Decide whether an applied change is kept. The executor runs the check
//! against the file it just wrote and reverts on failure.

use crate::workbench::Workbench;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub passed: bool,
    pub details: String,
}

impl CheckResult {
    #[must_use]
    pub fn pass(details: impl Into<String>) -> Self {
        Self {
            passed: true,
            details: details.into(),
        }
    }

    #[must_use]
    pub fn fail(details: impl Into<String>) -> Self {
        Self {
            passed: false,
            details: details.into(),
        }
    }
}

/// Pluggable keep-or-revert predicate
pub trait PostCondition {
    /// Check `target` after it has been written. Errors are reported as a
    /// failed result, never raised.
    fn check(&self, bench: &Workbench<'_>, target: &str) -> CheckResult;
}

/// File must exist, carry no forbidden marker, and not be blank
#[derive(Debug, Clone)]
pub struct SmokeCheck {
    forbidden_markers: Vec<String>,
}

impl SmokeCheck {
    #[must_use]
    pub fn new(forbidden_markers: Vec<String>) -> Self {
        Self { forbidden_markers }
    }
}

impl Default for SmokeCheck {
    fn default() -> Self {
        Self::new(vec!["TODO".to_string()])
    }
}

impl PostCondition for SmokeCheck {
    fn check(&self, bench: &Workbench<'_>, target: &str) -> CheckResult {
        match bench.exists(target) {
            Ok(true) => {}
            Ok(false) => return CheckResult::fail("File does not exist"),
            Err(e) => return CheckResult::fail(format!("Test error: {e}")),
        }
        let content = match bench.read(target) {
            Ok(content) => content,
            Err(e) => return CheckResult::fail(format!("Test error: {e}")),
        };
        if let Some(marker) = self.forbidden_markers.iter().find(|m| content.contains(m.as_str())) {
            return CheckResult::fail(format!("{marker} markers found in content"));
        }
        if content.trim().is_empty() {
            return CheckResult::fail("File is empty");
        }
        CheckResult::pass("All smoke tests passed")
    }
}

