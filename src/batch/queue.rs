//! Bounded, persisted FIFO of low-weight events.
//!
//! # Flush Protocol
//!
//! 1. Take the send lock; only one batch is on the wire at a time
//! 2. Under the state lock, swap the pending queue for an empty one and
//!    record the taken events as the in-flight batch
//! 3. Release the state lock and await `send_batch`
//! 4. Re-lock and settle: on success drop the in-flight batch, on failure
//!    prepend it to whatever is pending now
//!
//! Events enqueued while step 3 is suspended land in the fresh queue, so no
//! event is ever part of two batches. A second flush waits at step 1, so a
//! retried batch is always sent ahead of events recorded after it.
//!
//! # Persisted Image
//!
//! The queue slot always holds the in-flight batch followed by pending
//! events, trimmed to the offline cap (oldest dropped first). A successful
//! flush only removes its own batch from that image; events enqueued during
//! the network call are never cleared by it.
//!
//! The slot is loaded on first access, whichever operation comes first, so
//! events recorded before [`BatchQueue::hydrate`] never overwrite the
//! backlog of a previous run.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::identity::IdentityHandle;
use crate::outcome::{DeferReason, FlushOutcome};
use crate::session::SessionManager;
use crate::store::{PersistentStore, read_json, write_json};
use crate::transport::TransportClient;
use crate::types::BehaviorEvent;

#[derive(Debug, Default)]
struct QueueState {
    /// Events waiting for the next flush, oldest first.
    pending: VecDeque<BehaviorEvent>,

    /// The batch awaiting a `send_batch` response, if any.
    in_flight: Vec<BehaviorEvent>,

    hydrated: bool,
}

/// Size limits for a [`BatchQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Pending length that triggers a flush from `enqueue`.
    pub max_queue_size: usize,

    /// Maximum number of events kept on device.
    pub max_offline_queue_size: usize,
}

pub struct BatchQueue<T> {
    store: Arc<dyn PersistentStore>,
    transport: Arc<T>,
    identity: IdentityHandle,
    sessions: Arc<SessionManager>,
    key: String,
    limits: QueueLimits,
    state: Mutex<QueueState>,
    send_lock: tokio::sync::Mutex<()>,
}

impl<T: TransportClient> BatchQueue<T> {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        transport: Arc<T>,
        identity: IdentityHandle,
        sessions: Arc<SessionManager>,
        key: impl Into<String>,
        limits: QueueLimits,
    ) -> Self {
        BatchQueue {
            store,
            transport,
            identity,
            sessions,
            key: key.into(),
            limits,
            state: Mutex::new(QueueState::default()),
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Loads events persisted by a previous run.
    ///
    /// Only the first access to the queue reads the store; this merely makes
    /// that access explicit. Loaded events are trimmed to the offline cap.
    ///
    /// Returns the number of events restored, or 0 if the queue was already
    /// loaded.
    pub fn hydrate(&self) -> usize {
        let mut state = self.lock();
        self.hydrate_locked(&mut state)
    }

    /// Appends an event, flushing in the same call once the queue reaches
    /// `max_queue_size`.
    ///
    /// Returns the outcome of that flush, if one was triggered.
    pub async fn enqueue(&self, event: BehaviorEvent) -> Option<FlushOutcome> {
        let should_flush = {
            let mut state = self.lock_hydrated();
            state.pending.push_back(event);
            self.trim_pending(&mut state);
            self.persist(&state);
            state.pending.len() >= self.limits.max_queue_size
        };

        if should_flush {
            debug!(threshold = self.limits.max_queue_size, "Queue full, flushing");
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Sends everything pending as one batch.
    ///
    /// Never fails: an empty queue is a no-op, and an unresolved identity or
    /// a transport error leaves the events at the front of the queue. A flush
    /// started while another is sending waits for it to settle.
    pub async fn flush(&self) -> FlushOutcome {
        let Some(user) = self.identity.current() else {
            let state = self.lock_hydrated();
            if state.pending.is_empty() {
                return FlushOutcome::Empty;
            }
            debug!(count = state.pending.len(), "No signed-in user, deferring flush");
            return FlushOutcome::Requeued {
                count: state.pending.len(),
                reason: DeferReason::IdentityUnresolved,
            };
        };

        let _sending = self.send_lock.lock().await;

        let batch = {
            let mut state = self.lock_hydrated();
            if state.pending.is_empty() {
                return FlushOutcome::Empty;
            }
            let mut batch: Vec<BehaviorEvent> = std::mem::take(&mut state.pending).into();
            for event in &mut batch {
                if event.user_id.is_none() {
                    event.user_id = Some(user.clone());
                }
            }
            state.in_flight = batch.clone();
            batch
        };

        let count = batch.len();
        let session = self.sessions.get_or_create_session_id();
        match self.transport.send_batch(&batch, &session).await {
            Ok(()) => {
                let mut state = self.lock();
                state.in_flight.clear();
                self.persist(&state);
                info!(count, "Flushed event batch");
                FlushOutcome::Sent { count }
            }
            Err(e) => {
                warn!(error = %e, count, retriable = e.is_retriable(), "Batch send failed, requeueing");
                let mut state = self.lock();
                let batch = std::mem::take(&mut state.in_flight);
                for event in batch.into_iter().rev() {
                    state.pending.push_front(event);
                }
                self.trim_pending(&mut state);
                self.persist(&state);
                FlushOutcome::Requeued {
                    count,
                    reason: DeferReason::TransportFailed,
                }
            }
        }
    }

    /// Number of pending events (not counting the in-flight batch).
    pub fn len(&self) -> usize {
        self.lock_hydrated().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_hydrated().pending.is_empty()
    }

    /// Copy of the pending events, oldest first.
    pub fn snapshot(&self) -> Vec<BehaviorEvent> {
        self.lock_hydrated().pending.iter().cloned().collect()
    }

    pub fn limits(&self) -> QueueLimits {
        self.limits
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Locks the state, loading the persisted queue first if needed.
    fn lock_hydrated(&self) -> MutexGuard<'_, QueueState> {
        let mut state = self.lock();
        self.hydrate_locked(&mut state);
        state
    }

    fn hydrate_locked(&self, state: &mut QueueState) -> usize {
        if state.hydrated {
            return 0;
        }
        state.hydrated = true;

        let stored = match read_json::<Vec<BehaviorEvent>>(self.store.as_ref(), &self.key) {
            Ok(Some(events)) => events,
            Ok(None) => return 0,
            Err(e) => {
                warn!(error = %e, key = %self.key, "Failed to load persisted queue");
                return 0;
            }
        };

        let skip = stored.len().saturating_sub(self.limits.max_offline_queue_size);
        let restored: Vec<BehaviorEvent> = stored.into_iter().skip(skip).collect();
        let count = restored.len();
        for event in restored.into_iter().rev() {
            state.pending.push_front(event);
        }

        if skip > 0 {
            warn!(
                dropped = skip,
                cap = self.limits.max_offline_queue_size,
                "Persisted queue exceeded cap, dropped oldest events"
            );
            self.persist(state);
        }
        info!(restored = count, "Hydrated event queue");
        count
    }

    /// Drops the oldest pending events beyond the offline cap.
    fn trim_pending(&self, state: &mut QueueState) {
        let cap = self.limits.max_offline_queue_size;
        if state.pending.len() <= cap {
            return;
        }
        let dropped = state.pending.len() - cap;
        state.pending.drain(..dropped);
        warn!(dropped, cap, "Event queue over capacity, dropped oldest events");
    }

    /// Writes the in-flight batch followed by pending events, capped.
    fn persist(&self, state: &QueueState) {
        let total = state.in_flight.len() + state.pending.len();
        if total == 0 {
            if let Err(e) = self.store.remove_item(&self.key) {
                warn!(error = %e, key = %self.key, "Failed to clear persisted queue");
            }
            return;
        }

        let skip = total.saturating_sub(self.limits.max_offline_queue_size);
        let image: Vec<&BehaviorEvent> = state
            .in_flight
            .iter()
            .chain(state.pending.iter())
            .skip(skip)
            .collect();
        if let Err(e) = write_json(self.store.as_ref(), &self.key, &image) {
            warn!(error = %e, key = %self.key, "Failed to persist event queue");
        }
    }
}
