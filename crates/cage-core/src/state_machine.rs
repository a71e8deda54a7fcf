//! Apply lifecycle
//!
//! One attempt moves `Idle -> Planned -> Diffing -> Testing` and ends in
//! `Committed`, `Reverted` or `Failed`. Every live state may fail.

use serde::Serialize;

/// Lifecycle of one apply attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    Idle,
    Planned,
    Diffing,
    Testing,
    Committed,
    Reverted,
    Failed,
}

impl ApplyState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal apply transition: {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: ApplyState,
    pub to: ApplyState,
}

/// # Errors
/// Returns error if `to` is not reachable from `from` in one step
pub fn validate_transition(from: ApplyState, to: ApplyState) -> Result<(), IllegalTransition> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}

#[must_use]
pub fn allowed_transitions(from: ApplyState) -> &'static [ApplyState] {
    match from {
        ApplyState::Idle => &[ApplyState::Planned, ApplyState::Failed],
        ApplyState::Planned => &[ApplyState::Diffing, ApplyState::Failed],
        ApplyState::Diffing => &[ApplyState::Testing, ApplyState::Failed],
        ApplyState::Testing => &[
            ApplyState::Committed,
            ApplyState::Reverted,
            ApplyState::Failed,
        ],
        ApplyState::Committed | ApplyState::Reverted | ApplyState::Failed => &[],
    }
}
