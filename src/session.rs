//! Session identifier management.
//!
//! A session id is generated once per install (when no persisted id exists)
//! and reused across background/foreground cycles and restarts. It only
//! changes on an explicit [`SessionManager::reset`] or, under
//! [`SessionPolicy::RotateOnIdentityChange`], when the signed-in user
//! changes.
//!
//! # Format
//!
//! `sess_<epoch millis>_<9 random base36 chars>`. Uniqueness is probabilistic;
//! a collision only merges two analytics buckets.

use std::sync::{Arc, Mutex};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SessionPolicy;
use crate::store::PersistentStore;
use crate::types::{SessionId, UserId};

const SESSION_PREFIX: &str = "sess_";
const RANDOM_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub struct SessionManager {
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    key: String,
    policy: SessionPolicy,
    current: Mutex<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    id: Option<SessionId>,

    /// Whether `id` is known to be in the store.
    persisted: bool,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
        policy: SessionPolicy,
    ) -> Self {
        SessionManager {
            store,
            clock,
            key: key.into(),
            policy,
            current: Mutex::new(SessionState::default()),
        }
    }

    /// Returns the session id, loading or generating it on first use.
    ///
    /// A store failure still yields a usable id. The write is retried on
    /// later calls until it succeeds.
    pub fn get_or_create_session_id(&self) -> SessionId {
        let mut current = self.lock();
        if let Some(id) = current.id.clone() {
            if !current.persisted {
                current.persisted = self.persist(&id);
            }
            return id;
        }

        let (id, persisted) = match self.store.get_item(&self.key) {
            Ok(Some(stored)) if !stored.trim().is_empty() => {
                debug!(session = %stored, "Restored persisted session");
                (SessionId::new(stored), true)
            }
            Ok(_) => self.generate_and_persist(),
            Err(e) => {
                warn!(error = %e, key = %self.key, "Failed to read session id, starting a new one");
                self.generate_and_persist()
            }
        };
        current.id = Some(id.clone());
        current.persisted = persisted;
        id
    }

    /// Discards the current session and starts a new one.
    pub fn reset(&self) -> SessionId {
        let mut current = self.lock();
        let (id, persisted) = self.generate_and_persist();
        info!(session = %id, "Session reset");
        current.id = Some(id.clone());
        current.persisted = persisted;
        id
    }

    /// Applies the session policy to a change of signed-in user.
    ///
    /// Returns the new session id if the session was rotated.
    pub fn on_identity_change(
        &self,
        previous: Option<&UserId>,
        current: Option<&UserId>,
    ) -> Option<SessionId> {
        if previous == current {
            return None;
        }
        match self.policy {
            SessionPolicy::DeviceLifetime => None,
            SessionPolicy::RotateOnIdentityChange => Some(self.reset()),
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn generate_and_persist(&self) -> (SessionId, bool) {
        let id = generate_session_id(self.clock.now().timestamp_millis());
        let persisted = self.persist(&id);
        (id, persisted)
    }

    /// Writes the id to the store, returning whether the write succeeded.
    fn persist(&self, id: &SessionId) -> bool {
        match self.store.set_item(&self.key, id.as_str()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, key = %self.key, "Failed to persist session id");
                false
            }
        }
    }
}

/// Builds a session id for the given creation time.
pub fn generate_session_id(now_millis: i64) -> SessionId {
    let mut rng = rand::rng();
    let suffix: String = (0..RANDOM_SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    SessionId::new(format!("{SESSION_PREFIX}{now_millis}_{suffix}"))
}
