//! Sandbox path resolution
//!
//! A target is resolved by joining it onto the root, canonicalizing its parent
//! (which must exist) and, when the target itself exists, canonicalizing the
//! target too so a symlink pointing outside is caught. The result must stay
//! under the canonical root.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Why a path failed to resolve inside the sandbox
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("path escapes sandbox: {}", .0.display())]
    Escape(PathBuf),

    #[error("path has no file name: {}", .0.display())]
    NoFileName(PathBuf),

    #[error("cannot resolve {}: {source}", path.display())]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Bind to an existing directory
    ///
    /// # Errors
    /// Returns error if `root` does not exist or cannot be canonicalized
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::other(format!(
                "sandbox root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// Canonical sandbox root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` (relative to the root, or absolute) to a location inside the sandbox
    ///
    /// # Errors
    /// Returns error if the path escapes the root, lacks a file name, or its
    /// parent directory cannot be resolved.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let joined = self.root.join(path.as_ref());

        let file_name = match joined.components().next_back() {
            Some(Component::Normal(name)) => name.to_os_string(),
            _ => return Err(SandboxError::NoFileName(joined)),
        };
        let parent = joined
            .parent()
            .ok_or_else(|| SandboxError::NoFileName(joined.clone()))?;

        let parent = parent
            .canonicalize()
            .map_err(|source| SandboxError::Unresolvable {
                path: parent.to_path_buf(),
                source,
            })?;
        let mut resolved = parent.join(&file_name);

        // Follow a symlinked leaf; a dangling link has nowhere to point.
        match std::fs::symlink_metadata(&resolved) {
            Ok(meta) if meta.file_type().is_symlink() => {
                resolved = resolved
                    .canonicalize()
                    .map_err(|source| SandboxError::Unresolvable {
                        path: resolved.clone(),
                        source,
                    })?;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(SandboxError::Unresolvable {
                    path: resolved,
                    source,
                })
            }
        }

        if resolved.starts_with(&self.root) && resolved != self.root {
            Ok(resolved)
        } else {
            Err(SandboxError::Escape(resolved))
        }
    }

    /// Express an absolute in-sandbox path relative to the root
    #[must_use]
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok()
    }
}
