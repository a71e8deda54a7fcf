//! Single-slot plan holder
//!
//! A plan declares intent only; nothing here touches the workspace or checks
//! what the find/replace text will do.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Declared intent to replace text in one sandbox file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub title: String,
    pub target_file: String,
    pub find_text: String,
    pub replace_text: String,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// `created_at` in the trail's timestamp format
    #[must_use]
    pub fn timestamp(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

#[derive(Debug, Default)]
pub struct PlanHolder {
    slot: Mutex<Option<Plan>>,
}

impl PlanHolder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new plan, discarding any pending one
    pub fn create(
        &self,
        title: impl Into<String>,
        target_file: impl Into<String>,
        find_text: impl Into<String>,
        replace_text: impl Into<String>,
    ) -> Plan {
        let plan = Plan {
            title: title.into(),
            target_file: target_file.into(),
            find_text: find_text.into(),
            replace_text: replace_text.into(),
            created_at: Utc::now(),
        };
        if let Some(old) = self.slot.lock().replace(plan.clone()) {
            tracing::debug!(replaced = %old.title, "pending plan superseded");
        }
        plan
    }

    #[must_use]
    pub fn current(&self) -> Option<Plan> {
        self.slot.lock().clone()
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn clear(&self) {
        self.slot.lock().take();
    }
}
