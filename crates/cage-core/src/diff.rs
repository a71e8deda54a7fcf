//! Diff records for the trail
//!
//! Display only. The executor never applies a diff; it writes whole-file
//! content and uses these records to show what changed.

use serde::Serialize;
use similar::TextDiff;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffRecord {
    pub diff: String,
    pub has_changes: bool,
}

/// Renders the change between two versions of a file
pub trait DiffRenderer {
    fn render(&self, original: &str, updated: &str, filename: &str) -> DiffRecord;
}

/// Unified diff with `a/` and `b/` headers
#[derive(Debug, Clone, Copy)]
pub struct UnifiedDiff {
    pub context_radius: usize,
}

impl Default for UnifiedDiff {
    fn default() -> Self {
        Self { context_radius: 3 }
    }
}

impl DiffRenderer for UnifiedDiff {
    fn render(&self, original: &str, updated: &str, filename: &str) -> DiffRecord {
        if original == updated {
            return DiffRecord {
                diff: String::new(),
                has_changes: false,
            };
        }
        let (from, to) = (format!("a/{filename}"), format!("b/{filename}"));
        let text_diff = TextDiff::from_lines(original, updated);
        let diff = text_diff
            .unified_diff()
            .context_radius(self.context_radius)
            .header(&from, &to)
            .to_string();
        DiffRecord {
            diff,
            has_changes: true,
        }
    }
}
