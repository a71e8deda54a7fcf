//! Session-context loader
//!
//! Rehydration pulls in preferences, corrections and a slice of recent trail
//! history, then marks the session as allowed to act. How much history is
//! loaded is decided by a [`ContextDepth`] heuristic.

use crate::audit::{AuditEntry, AuditTrail, EntryKind};
use crate::error::Result;
use crate::rulebook::{Correction, PreferenceSource};
use crate::session::Session;
use serde_json::{json, Map, Value};

/// Decides how many recent trail entries to load
pub trait ContextDepth {
    /// A small positive count, optionally informed by a task hint
    fn depth(&self, hint: Option<&str>) -> usize;
}

/// Returns the same depth whatever the hint
#[derive(Debug, Clone, Copy)]
pub struct FixedDepth(pub usize);

impl ContextDepth for FixedDepth {
    fn depth(&self, _hint: Option<&str>) -> usize {
        self.0.max(1)
    }
}

impl<F> ContextDepth for F
where
    F: Fn(Option<&str>) -> usize,
{
    fn depth(&self, hint: Option<&str>) -> usize {
        self(hint).max(1)
    }
}

/// What a rehydration loaded
#[derive(Debug, Clone, Default)]
pub struct RehydratedContext {
    pub preferences: Map<String, Value>,
    pub corrections: Vec<Correction>,
    pub recent: Vec<AuditEntry>,
}

pub struct Rehydrator<'a> {
    session: &'a Session,
    trail: &'a AuditTrail,
    source: &'a dyn PreferenceSource,
    depth: &'a dyn ContextDepth,
}

impl<'a> Rehydrator<'a> {
    #[must_use]
    pub fn new(
        session: &'a Session,
        trail: &'a AuditTrail,
        source: &'a dyn PreferenceSource,
        depth: &'a dyn ContextDepth,
    ) -> Self {
        Self {
            session,
            trail,
            source,
            depth,
        }
    }

    /// Load context and mark the session rehydrated
    ///
    /// Safe to repeat; each call reloads and logs again.
    ///
    /// # Errors
    /// Propagates preference-store and trail failures; the session stays
    /// un-rehydrated if loading fails.
    pub fn rehydrate(&self, hint: Option<&str>) -> Result<RehydratedContext> {
        let preferences = self.source.preferences()?;
        let corrections = self.source.corrections()?;
        let depth = self.depth.depth(hint);
        let recent = self.trail.tail(depth)?;

        self.session.mark_rehydrated();
        self.trail.append(
            EntryKind::Rehydrate,
            json!({
                "preferences_loaded": preferences.len(),
                "corrections_loaded": corrections.len(),
                "context_entries": recent.len(),
            }),
        )?;
        tracing::info!(
            preferences = preferences.len(),
            corrections = corrections.len(),
            context_entries = recent.len(),
            "session rehydrated"
        );

        Ok(RehydratedContext {
            preferences,
            corrections,
            recent,
        })
    }

    #[must_use]
    pub fn is_rehydrated(&self) -> bool {
        self.session.is_rehydrated()
    }
}
