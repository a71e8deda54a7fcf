//! Cage configuration
//!
//! A cage lives in a "room": a directory holding the sandboxed `workspace/`,
//! the `artifacts/` publish target, the `rulebook.json` preference store and
//! the `trail.log` audit trail. Every location can be overridden, either with
//! the `with_*` builders or from a TOML file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Context depth used when no hint is supplied to rehydration
pub const DEFAULT_CONTEXT_DEPTH: usize = 10;

/// What happens to the pending plan after a reverted apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanRetention {
    /// Keep the plan so the caller may retry it
    #[default]
    Retain,
    /// Drop the plan; a new one must be declared
    Clear,
}

/// Cage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CageConfig {
    /// Directory all workspace reads and writes are confined to
    pub sandbox_root: PathBuf,
    /// Publish target, outside the sandbox
    pub artifacts_dir: PathBuf,
    /// Preference/correction store
    pub rulebook_path: PathBuf,
    /// Append-only audit trail
    pub trail_log_path: PathBuf,
    /// Number of trail entries loaded on rehydration without a hint
    #[serde(default = "default_context_depth")]
    pub default_context_depth: usize,
    /// Plan handling after a revert
    #[serde(default)]
    pub plan_retention: PlanRetention,
    /// Substrings the default post-condition rejects
    #[serde(default = "default_forbidden_markers")]
    pub forbidden_markers: Vec<String>,
}

fn default_context_depth() -> usize {
    DEFAULT_CONTEXT_DEPTH
}

fn default_forbidden_markers() -> Vec<String> {
    vec!["TODO".to_string()]
}

impl CageConfig {
    /// Standard layout under a room directory
    #[must_use]
    pub fn for_room(room: impl AsRef<Path>) -> Self {
        let room = room.as_ref();
        Self {
            sandbox_root: room.join("workspace"),
            artifacts_dir: room.join("artifacts"),
            rulebook_path: room.join("rulebook.json"),
            trail_log_path: room.join("trail.log"),
            default_context_depth: DEFAULT_CONTEXT_DEPTH,
            plan_retention: PlanRetention::default(),
            forbidden_markers: default_forbidden_markers(),
        }
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Returns error on malformed TOML or unknown keys
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    #[must_use]
    pub fn with_sandbox_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sandbox_root = root.into();
        self
    }

    #[must_use]
    pub fn with_trail_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.trail_log_path = path.into();
        self
    }

    #[must_use]
    pub fn with_context_depth(mut self, depth: usize) -> Self {
        self.default_context_depth = depth;
        self
    }

    #[must_use]
    pub fn with_plan_retention(mut self, retention: PlanRetention) -> Self {
        self.plan_retention = retention;
        self
    }

    #[must_use]
    pub fn with_forbidden_markers(mut self, markers: Vec<String>) -> Self {
        self.forbidden_markers = markers;
        self
    }
}
