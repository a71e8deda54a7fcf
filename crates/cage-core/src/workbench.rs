//! Guarded storage gate
//!
//! The only path through which workspace files are read or written. Every
//! operation resolves its target through the referee first; writes also need
//! the referee's write permission.

use crate::error::{CageError, Result};
use crate::referee::Referee;
use crate::sandbox::Sandbox;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy)]
pub struct Workbench<'a> {
    referee: Referee<'a>,
    sandbox: &'a Sandbox,
}

impl<'a> Workbench<'a> {
    #[must_use]
    pub fn new(referee: Referee<'a>, sandbox: &'a Sandbox) -> Self {
        Self { referee, sandbox }
    }

    /// Read a workspace file; an absent file reads as empty
    ///
    /// # Errors
    /// Refuses paths outside the sandbox; propagates other I/O failures
    pub fn read(&self, path: impl AsRef<Path>) -> Result<String> {
        let resolved = self.referee.require_in_sandbox(path)?;
        match fs::read_to_string(&resolved) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    /// Refuses paths outside the sandbox
    pub fn exists(&self, path: impl AsRef<Path>) -> Result<bool> {
        let resolved = self.referee.require_in_sandbox(path)?;
        Ok(resolved.is_file())
    }

    /// Create a file that must not exist yet
    ///
    /// # Errors
    /// Refuses without write permission; [`CageError::AlreadyExists`] if the
    /// file appeared between the check and the create.
    pub fn create_only_write(&self, path: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        let resolved = self.referee.require_in_sandbox(path)?;
        self.referee.require_write_permitted(&resolved)?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&resolved)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(CageError::AlreadyExists(resolved));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        tracing::debug!(path = %resolved.display(), bytes = content.len(), "created");
        Ok(resolved)
    }

    /// Truncate and rewrite a file
    ///
    /// # Errors
    /// Refuses without write permission; propagates I/O failures
    pub fn guarded_overwrite(&self, path: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        let resolved = self.referee.require_in_sandbox(path)?;
        self.referee.require_write_permitted(&resolved)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&resolved)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        tracing::debug!(path = %resolved.display(), bytes = content.len(), "overwritten");
        Ok(resolved)
    }

    /// Every file under the sandbox, relative to the root, sorted
    ///
    /// # Errors
    /// Propagates directory traversal failures
    pub fn list(&self) -> Result<Vec<String>> {
        let root = self.sandbox.root();
        let mut files = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(root) {
                    files.push(rel.to_string_lossy().into_owned());
                }
            }
        }
        Ok(files)
    }
}
