//! Preferences and corrections
//!
//! The store on disk is owned by something else; the cage only reads it.

use crate::error::{CageError, ConfigError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io;
use std::path::Path;

/// A recorded "use `to` instead of `from`" correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub timestamp: String,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Read accessors the cage needs from the preference store
pub trait PreferenceSource {
    /// # Errors
    /// Implementation-defined read failures
    fn preferences(&self) -> Result<Map<String, Value>, CageError>;

    /// # Errors
    /// Implementation-defined read failures
    fn corrections(&self) -> Result<Vec<Correction>, CageError>;
}

/// In-memory image of `{"preferences": {...}, "corrections": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rulebook {
    #[serde(default)]
    pub preferences: Map<String, Value>,
    #[serde(default)]
    pub corrections: Vec<Correction>,
}

impl Default for Rulebook {
    fn default() -> Self {
        let preferences = json!({
            "voice_style": "maxim_threadline",
            "max_context_lines": 50,
        });
        Self {
            preferences: preferences.as_object().cloned().unwrap_or_default(),
            corrections: Vec::new(),
        }
    }
}

impl Rulebook {
    /// Load from JSON; a missing file yields the defaults
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// # Errors
    /// Returns error on malformed JSON
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Rulebook(e.to_string()))
    }

    #[must_use]
    pub fn with_correction(mut self, correction: Correction) -> Self {
        self.corrections.push(correction);
        self
    }

    /// First stored correction turning `from` into `to`
    #[must_use]
    pub fn matching_correction(&self, from: &str, to: &str) -> Option<&Correction> {
        find_correction(&self.corrections, from, to)
    }
}

/// First correction in `corrections` turning `from` into `to`
#[must_use]
pub fn find_correction<'a>(
    corrections: &'a [Correction],
    from: &str,
    to: &str,
) -> Option<&'a Correction> {
    corrections.iter().find(|c| c.from == from && c.to == to)
}

impl PreferenceSource for Rulebook {
    fn preferences(&self) -> Result<Map<String, Value>, CageError> {
        Ok(self.preferences.clone())
    }

    fn corrections(&self) -> Result<Vec<Correction>, CageError> {
        Ok(self.corrections.clone())
    }
}
