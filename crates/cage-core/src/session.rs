//! Session context and scoped permissions
//!
//! The flags live on one [`Session`] value owned by the cage, not in globals.
//! Diff-mode and bootstrap-mode are only ever raised through a
//! [`PermissionGuard`], which puts the flag back when it is dropped, so an
//! early return or `?` inside the window cannot leak write permission into a
//! later call.

use parking_lot::Mutex;

/// Snapshot of the session flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub rehydrated: bool,
    pub diff_mode_active: bool,
    pub bootstrap_mode: bool,
}

/// A transient write permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Exactly one guarded overwrite
    DiffMode,
    /// Create-only writes of absent files
    Bootstrap,
}

#[derive(Debug, Default)]
pub struct Session {
    flags: Mutex<SessionFlags>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn flags(&self) -> SessionFlags {
        *self.flags.lock()
    }

    #[must_use]
    pub fn is_rehydrated(&self) -> bool {
        self.flags.lock().rehydrated
    }

    #[must_use]
    pub fn diff_mode_active(&self) -> bool {
        self.flags.lock().diff_mode_active
    }

    #[must_use]
    pub fn bootstrap_mode(&self) -> bool {
        self.flags.lock().bootstrap_mode
    }

    pub fn mark_rehydrated(&self) {
        self.flags.lock().rehydrated = true;
    }

    /// Clear every flag. Only tests should need this.
    pub fn reset(&self) {
        *self.flags.lock() = SessionFlags::default();
    }

    /// Raise `permission` until the returned guard is dropped
    #[must_use = "the permission is released as soon as the guard is dropped"]
    pub fn acquire(&self, permission: Permission) -> PermissionGuard<'_> {
        let previous = self.set(permission, true);
        tracing::debug!(?permission, "permission acquired");
        PermissionGuard {
            session: self,
            permission,
            previous,
        }
    }

    fn set(&self, permission: Permission, value: bool) -> bool {
        let mut flags = self.flags.lock();
        let slot = match permission {
            Permission::DiffMode => &mut flags.diff_mode_active,
            Permission::Bootstrap => &mut flags.bootstrap_mode,
        };
        std::mem::replace(slot, value)
    }
}

/// Holds a [`Permission`] open; restores the prior flag value on drop
#[derive(Debug)]
pub struct PermissionGuard<'a> {
    session: &'a Session,
    permission: Permission,
    previous: bool,
}

impl PermissionGuard<'_> {
    #[must_use]
    pub fn permission(&self) -> Permission {
        self.permission
    }
}

impl Drop for PermissionGuard<'_> {
    fn drop(&mut self) {
        self.session.set(self.permission, self.previous);
        tracing::debug!(permission = ?self.permission, "permission released");
    }
}
