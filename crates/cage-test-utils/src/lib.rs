//! Testing utilities for the cage workspace
//!
//! Shared rooms, stub post-conditions and trail helpers.

#![allow(missing_docs)]

use cage_core::{AuditEntry, Cage, CageConfig, CheckResult, EntryKind, PostCondition, Workbench};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cage_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A throwaway room: `workspace/` exists, everything else is created lazily
pub struct TempRoom {
    dir: TempDir,
}

impl TempRoom {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("workspace")).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn workspace(&self) -> PathBuf {
        self.dir.path().join("workspace")
    }

    pub fn config(&self) -> CageConfig {
        CageConfig::for_room(self.dir.path())
    }

    pub fn open(&self) -> Cage {
        Cage::open(self.config()).unwrap()
    }

    /// Write directly, bypassing the gate; for arranging fixtures only
    pub fn write_workspace_file(&self, rel: &str, content: &str) {
        let path = self.workspace().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn read_workspace_file(&self, rel: &str) -> String {
        fs::read_to_string(self.workspace().join(rel)).unwrap()
    }

    pub fn write_rulebook(&self, json: &serde_json::Value) {
        fs::write(self.config().rulebook_path, json.to_string()).unwrap();
    }
}

impl Default for TempRoom {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPass;

impl PostCondition for AlwaysPass {
    fn check(&self, _bench: &Workbench<'_>, _target: &str) -> CheckResult {
        CheckResult::pass("stub pass")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFail;

impl PostCondition for AlwaysFail {
    fn check(&self, _bench: &Workbench<'_>, _target: &str) -> CheckResult {
        CheckResult::fail("stub fail")
    }
}

pub fn kinds(entries: &[AuditEntry]) -> Vec<EntryKind> {
    entries.iter().map(|e| e.kind).collect()
}

/// Entries appended after the first `skip`
pub fn entries_since(cage: &Cage, skip: usize) -> Vec<AuditEntry> {
    let mut entries = cage.trail().entries().unwrap();
    entries.split_off(skip.min(entries.len()))
}

pub fn count_kind(cage: &Cage, kind: EntryKind) -> usize {
    cage.trail()
        .entries()
        .unwrap()
        .iter()
        .filter(|e| e.kind == kind)
        .count()
}
