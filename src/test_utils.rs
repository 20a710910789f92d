//! Shared test fixtures: fake collaborators, event builders and generators.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use tokio::sync::Notify;

use crate::store::{PersistentStore, StoreError};
use crate::transport::{TransportClient, TransportError};
use crate::types::{BehaviorEvent, EventPayload, EventType, SessionId};

/// Fixed starting instant for manual clocks.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn event(event_type: EventType, product_id: &str) -> BehaviorEvent {
    BehaviorEvent::new(
        event_type,
        EventPayload::product(product_id),
        SessionId::new("sess_test"),
        "test",
        epoch(),
    )
}

pub fn click_event(product_id: &str) -> BehaviorEvent {
    event(EventType::Click, product_id)
}

pub fn view_event(product_id: &str, duration_ms: u64) -> BehaviorEvent {
    BehaviorEvent::new(
        EventType::View,
        EventPayload::view(product_id, duration_ms),
        SessionId::new("sess_test"),
        "test",
        epoch(),
    )
}

/// Product ids of `events`, in order. Events without one map to `""`.
pub fn product_ids(events: &[BehaviorEvent]) -> Vec<&str> {
    events
        .iter()
        .map(|e| e.payload.product_id.as_ref().map_or("", |id| id.as_str()))
        .collect()
}

pub fn arb_event_type() -> impl Strategy<Value = EventType> {
    prop_oneof![
        Just(EventType::View),
        Just(EventType::Search),
        Just(EventType::CartAdd),
        Just(EventType::Favorite),
        Just(EventType::Purchase),
        Just(EventType::Click),
        Just(EventType::Exposure),
    ]
}

/// A store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

impl PersistentStore for FailingStore {
    fn get_item(&self, _key: &str) -> crate::store::Result<Option<String>> {
        Err(StoreError::Unavailable("storage disabled".into()))
    }

    fn set_item(&self, _key: &str, _value: &str) -> crate::store::Result<()> {
        Err(StoreError::Unavailable("storage disabled".into()))
    }

    fn remove_item(&self, _key: &str) -> crate::store::Result<()> {
        Err(StoreError::Unavailable("storage disabled".into()))
    }
}

#[derive(Debug, Default)]
struct Recorded {
    singles: Vec<BehaviorEvent>,
    batches: Vec<Vec<BehaviorEvent>>,
    batch_sessions: Vec<SessionId>,
    batch_calls: usize,
    fail_singles: usize,
    fail_batches: usize,
}

/// In-memory transport that records successful deliveries.
///
/// Clones share the same record, so a test can keep one clone and hand the
/// other to the code under test. Failed calls are counted but not recorded
/// as delivered.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` `send_single` calls fail with a transient error.
    pub fn fail_next_singles(&self, n: usize) {
        self.inner.lock().unwrap().fail_singles = n;
    }

    /// Makes the next `n` `send_batch` calls fail with a transient error.
    pub fn fail_next_batches(&self, n: usize) {
        self.inner.lock().unwrap().fail_batches = n;
    }

    pub fn singles(&self) -> Vec<BehaviorEvent> {
        self.inner.lock().unwrap().singles.clone()
    }

    pub fn batches(&self) -> Vec<Vec<BehaviorEvent>> {
        self.inner.lock().unwrap().batches.clone()
    }

    pub fn batch_sessions(&self) -> Vec<SessionId> {
        self.inner.lock().unwrap().batch_sessions.clone()
    }

    /// Number of `send_batch` calls, including failed ones.
    pub fn batch_calls(&self) -> usize {
        self.inner.lock().unwrap().batch_calls
    }
}

impl TransportClient for RecordingTransport {
    async fn send_single(&self, event: &BehaviorEvent) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_singles > 0 {
            inner.fail_singles -= 1;
            return Err(TransportError::transient("simulated outage"));
        }
        inner.singles.push(event.clone());
        Ok(())
    }

    async fn send_batch(
        &self,
        events: &[BehaviorEvent],
        session_id: &SessionId,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.batch_calls += 1;
        if inner.fail_batches > 0 {
            inner.fail_batches -= 1;
            return Err(TransportError::from_status(503, "simulated outage"));
        }
        inner.batches.push(events.to_vec());
        inner.batch_sessions.push(session_id.clone());
        Ok(())
    }
}

/// Transport whose `send_batch` blocks until [`GatedTransport::release`],
/// for observing state while a batch is in flight.
#[derive(Debug, Clone, Default)]
pub struct GatedTransport {
    record: RecordingTransport,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until a `send_batch` call is parked at the gate.
    pub async fn wait_until_in_flight(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn batches(&self) -> Vec<Vec<BehaviorEvent>> {
        self.record.batches()
    }

    /// Makes the next `n` released `send_batch` calls fail.
    pub fn fail_next_batches(&self, n: usize) {
        self.record.fail_next_batches(n);
    }
}

impl TransportClient for GatedTransport {
    async fn send_single(&self, event: &BehaviorEvent) -> Result<(), TransportError> {
        self.record.send_single(event).await
    }

    async fn send_batch(
        &self,
        events: &[BehaviorEvent],
        session_id: &SessionId,
    ) -> Result<(), TransportError> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.record.send_batch(events, session_id).await
    }
}
