//! Late-resolving user identity supplied by the host application.
//!
//! Events may be recorded before sign-in completes. The handle is read at
//! send time, not just at record time, so a batch created anonymously is
//! attributed once the user resolves.

use std::sync::{Arc, RwLock};

use crate::types::UserId;

/// Shared, cloneable view of the currently resolved user.
#[derive(Debug, Clone, Default)]
pub struct IdentityHandle {
    current: Arc<RwLock<Option<UserId>>>,
}

impl IdentityHandle {
    /// Creates a handle with no resolved user.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle already resolved to `user`.
    pub fn resolved(user: UserId) -> Self {
        IdentityHandle {
            current: Arc::new(RwLock::new(Some(user))),
        }
    }

    /// Returns the current user, if resolved.
    pub fn current(&self) -> Option<UserId> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replaces the current user and returns the previous one.
    pub fn set(&self, user: Option<UserId>) -> Option<UserId> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, user)
    }

    pub fn is_resolved(&self) -> bool {
        self.current().is_some()
    }
}
