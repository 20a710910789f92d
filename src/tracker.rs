//! The host-facing tracking facade.
//!
//! A [`Tracker`] wires one instance of each component around an injected
//! store, transport and clock:
//!
//! ```text
//!  track_*() ──► EventRouter ──► send_single            (immediate)
//!                    │
//!                    └────────► BatchQueue ──► send_batch (batched)
//!                                   ▲
//!                          FlushScheduler (every batch_interval)
//! ```
//!
//! Nothing here is global; independent trackers can coexist, each with its
//! own store keys.
//!
//! # Lifecycle
//!
//! Hosts call [`Tracker::start`] once, then forward app lifecycle changes to
//! [`Tracker::on_background`] and [`Tracker::on_foreground`]. Going to the
//! background stops the timer and flushes what is queued; coming back
//! restarts the timer. The session id is unaffected by either.

use std::sync::Arc;

use tracing::{info, warn};

use crate::batch::{BatchQueue, FlushScheduler, QueueLimits, SchedulerState};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, TrackerConfig};
use crate::exposure::ExposureDeduplicator;
use crate::identity::IdentityHandle;
use crate::outcome::{FlushOutcome, RecordOutcome};
use crate::router::EventRouter;
use crate::session::SessionManager;
use crate::store::PersistentStore;
use crate::transport::TransportClient;
use crate::types::{BehaviorEvent, EventPayload, EventType, ItemId, SessionId, UserId};

pub struct Tracker<T> {
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    identity: IdentityHandle,
    sessions: Arc<SessionManager>,
    exposures: ExposureDeduplicator,
    queue: Arc<BatchQueue<T>>,
    router: EventRouter<T>,
    scheduler: FlushScheduler<BatchQueue<T>>,
}

impl<T: TransportClient> Tracker<T> {
    /// Builds a tracker on the system clock.
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn PersistentStore>,
        transport: T,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(config, store, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: TrackerConfig,
        store: Arc<dyn PersistentStore>,
        transport: T,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let transport = Arc::new(transport);
        let identity = IdentityHandle::new();
        let keys = &config.storage_keys;
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            clock.clone(),
            keys.session.clone(),
            config.session_policy,
        ));
        let exposures = ExposureDeduplicator::new(
            store.clone(),
            clock.clone(),
            keys.exposures.clone(),
            config.exposure_ttl,
            config.max_exposure_records,
        );
        let queue = Arc::new(BatchQueue::new(
            store,
            transport.clone(),
            identity.clone(),
            sessions.clone(),
            keys.queue.clone(),
            QueueLimits {
                max_queue_size: config.max_queue_size,
                max_offline_queue_size: config.max_offline_queue_size,
            },
        ));
        let router = EventRouter::new(
            transport,
            queue.clone(),
            identity.clone(),
            config.view_threshold,
        );
        let scheduler = FlushScheduler::new(queue.clone(), config.batch_interval);

        Ok(Tracker {
            config,
            clock,
            identity,
            sessions,
            exposures,
            queue,
            router,
            scheduler,
        })
    }

    /// Restores the persisted queue and starts the flush timer.
    pub fn start(&self) {
        let restored = self.queue.hydrate();
        self.scheduler.start();
        info!(
            restored,
            session = %self.sessions.get_or_create_session_id(),
            "Tracker started"
        );
    }

    /// Updates the signed-in user.
    ///
    /// Returns the new session id if the session policy rotated it.
    pub fn identify(&self, user: Option<UserId>) -> Option<SessionId> {
        let previous = self.identity.set(user.clone());
        let rotated = self
            .sessions
            .on_identity_change(previous.as_ref(), user.as_ref());
        if previous != user {
            info!(signed_in = user.is_some(), rotated = rotated.is_some(), "Identity changed");
        }
        rotated
    }

    pub fn identity(&self) -> &IdentityHandle {
        &self.identity
    }

    /// Builds an event of `event_type` stamped with the current session,
    /// device, user and time, then routes it.
    pub async fn record(&self, event_type: EventType, payload: EventPayload) -> RecordOutcome {
        let event = self.build_event(event_type, payload);
        self.router.record(event).await
    }

    pub async fn track_view(
        &self,
        product_id: impl Into<ItemId>,
        duration_ms: u64,
    ) -> RecordOutcome {
        self.record(EventType::View, EventPayload::view(product_id, duration_ms))
            .await
    }

    pub async fn track_search(
        &self,
        keyword: impl Into<String>,
        result_count: u32,
    ) -> RecordOutcome {
        self.record(EventType::Search, EventPayload::search(keyword, result_count))
            .await
    }

    pub async fn track_cart_add(&self, product_id: impl Into<ItemId>) -> RecordOutcome {
        self.record(EventType::CartAdd, EventPayload::product(product_id))
            .await
    }

    pub async fn track_favorite(&self, product_id: impl Into<ItemId>) -> RecordOutcome {
        self.record(EventType::Favorite, EventPayload::product(product_id))
            .await
    }

    pub async fn track_purchase(&self, product_id: impl Into<ItemId>) -> RecordOutcome {
        self.record(EventType::Purchase, EventPayload::product(product_id))
            .await
    }

    pub async fn track_click(
        &self,
        product_id: impl Into<ItemId>,
        source: Option<&str>,
    ) -> RecordOutcome {
        let mut payload = EventPayload::product(product_id);
        if let Some(source) = source {
            payload = payload.with_source(source);
        }
        self.record(EventType::Click, payload).await
    }

    /// Records exposure events for the ids not already seen within the TTL.
    ///
    /// Returns the ids that were forwarded.
    pub async fn track_exposures(&self, ids: &[ItemId]) -> Vec<ItemId> {
        let fresh = self.exposures.mark_exposed(ids);
        for id in &fresh {
            self.record(EventType::Exposure, EventPayload::product(id.clone()))
                .await;
        }
        fresh
    }

    pub fn clear_exposures(&self) {
        self.exposures.clear_exposures();
    }

    pub fn reset_session(&self) -> SessionId {
        self.sessions.reset()
    }

    pub fn session_id(&self) -> SessionId {
        self.sessions.get_or_create_session_id()
    }

    pub async fn flush(&self) -> FlushOutcome {
        self.queue.flush().await
    }

    /// Stops the timer and flushes what is queued.
    pub async fn on_background(&self) -> FlushOutcome {
        // A tick already flushing finishes first; this flush waits for it.
        drop(self.scheduler.stop());
        self.queue.flush().await
    }

    pub fn on_foreground(&self) {
        self.scheduler.start();
    }

    /// Stops the timer, waits for it to exit, then makes a final flush.
    pub async fn shutdown(&self) -> FlushOutcome {
        if let Some(handle) = self.scheduler.stop()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Flush timer task ended abnormally");
        }
        let outcome = self.queue.flush().await;
        info!(?outcome, pending = self.queue.len(), "Tracker shut down");
        outcome
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn build_event(&self, event_type: EventType, payload: EventPayload) -> BehaviorEvent {
        BehaviorEvent::new(
            event_type,
            payload,
            self.sessions.get_or_create_session_id(),
            self.config.device_type.clone(),
            self.clock.now(),
        )
        .with_user(self.identity.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SessionPolicy;
    use crate::store::{MemoryStore, read_json};
    use crate::test_utils::{RecordingTransport, epoch, product_ids};
    use std::time::Duration;

    struct Harness {
        store: MemoryStore,
        transport: RecordingTransport,
        clock: ManualClock,
        tracker: Tracker<RecordingTransport>,
    }

    fn harness(config: TrackerConfig) -> Harness {
        harness_on(MemoryStore::new(), config)
    }

    fn harness_on(store: MemoryStore, config: TrackerConfig) -> Harness {
        let transport = RecordingTransport::new();
        let clock = ManualClock::new(epoch());
        let tracker = Tracker::with_clock(
            config.with_device_type("ios"),
            Arc::new(store.clone()),
            transport.clone(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        Harness {
            store,
            transport,
            clock,
            tracker,
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = TrackerConfig {
            max_queue_size: 0,
            ..TrackerConfig::default()
        };
        let result = Tracker::new(config, Arc::new(MemoryStore::new()), RecordingTransport::new());
        assert!(matches!(result, Err(ConfigError::Zero(_))));
    }

    #[tokio::test]
    async fn events_carry_session_device_user_and_time() {
        let h = harness(TrackerConfig::default());
        h.tracker.identify(Some(UserId::new("u-7")));
        h.clock.advance_ms(1_500);

        h.tracker.track_purchase("sku-1").await;

        let sent = &h.transport.singles()[0];
        assert_eq!(sent.event_type, EventType::Purchase);
        assert_eq!(sent.session_id, h.tracker.session_id());
        assert_eq!(sent.device_type, "ios");
        assert_eq!(sent.user_id, Some(UserId::new("u-7")));
        assert_eq!(sent.event_time, epoch() + chrono::Duration::milliseconds(1_500));
        assert_eq!(sent.weight, Some(10));
    }

    #[tokio::test]
    async fn exposures_are_deduplicated_and_batched() {
        let h = harness(TrackerConfig::default());
        h.tracker.identify(Some(UserId::new("u")));
        let ids: Vec<ItemId> = ["A", "B"].into_iter().map(ItemId::from).collect();

        assert_eq!(h.tracker.track_exposures(&ids).await, ids);
        assert!(h.tracker.track_exposures(&ids).await.is_empty());

        assert!(h.transport.singles().is_empty());
        assert_eq!(h.tracker.pending_events(), 2);

        h.tracker.clear_exposures();
        assert_eq!(h.tracker.track_exposures(&ids[..1]).await, ids[..1].to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn session_survives_background_foreground_cycles() {
        let h = harness(TrackerConfig::default());
        h.tracker.start();
        let before = h.tracker.session_id();

        for _ in 0..2 {
            h.tracker.on_background().await;
            assert_eq!(h.tracker.scheduler_state(), SchedulerState::Stopped);
            h.tracker.on_foreground();
            assert_eq!(h.tracker.scheduler_state(), SchedulerState::Running);
        }

        assert_eq!(h.tracker.session_id().as_str(), before.as_str());
        h.tracker.shutdown().await;
    }

    #[tokio::test]
    async fn background_flushes_queued_events() {
        let h = harness(TrackerConfig::default());
        h.tracker.identify(Some(UserId::new("u")));
        h.tracker.track_click("c1", Some("home")).await;
        h.tracker.track_view("v1", 2_000).await;

        let outcome = h.tracker.on_background().await;

        assert_eq!(outcome, FlushOutcome::Sent { count: 2 });
        assert_eq!(product_ids(&h.transport.batches()[0]), vec!["c1", "v1"]);
        assert_eq!(h.transport.batch_sessions()[0], h.tracker.session_id());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_after_interval() {
        let config = TrackerConfig {
            batch_interval: Duration::from_millis(5_000),
            ..TrackerConfig::default()
        };
        let h = harness(config);
        h.tracker.identify(Some(UserId::new("u")));
        h.tracker.start();
        settle().await;
        h.tracker.track_click("c1", None).await;

        tokio::time::advance(Duration::from_millis(5_000)).await;
        settle().await;

        assert_eq!(h.transport.batches().len(), 1);
        assert_eq!(h.tracker.pending_events(), 0);
        h.tracker.shutdown().await;
    }

    #[tokio::test]
    async fn anonymous_events_persist_across_restart() {
        let store = MemoryStore::new();
        {
            let h = harness_on(store.clone(), TrackerConfig::default());
            h.tracker.track_cart_add("sku-5").await;
            h.tracker.track_search("shoes", 12).await;
            assert!(h.transport.singles().is_empty());
        }

        let h = harness_on(store.clone(), TrackerConfig::default());
        h.tracker.start();
        assert_eq!(h.tracker.pending_events(), 2);

        h.tracker.identify(Some(UserId::new("u")));
        assert_eq!(h.tracker.shutdown().await, FlushOutcome::Sent { count: 2 });
        let persisted: Option<Vec<BehaviorEvent>> =
            read_json(&h.store, "behavior_event_queue").unwrap();
        assert!(persisted.is_none());
    }

    #[tokio::test]
    async fn recording_before_start_keeps_previous_backlog() {
        let store = MemoryStore::new();
        {
            let h = harness_on(store.clone(), TrackerConfig::default());
            h.tracker.track_click("old1", None).await;
            h.tracker.track_click("old2", None).await;
        }

        let h = harness_on(store.clone(), TrackerConfig::default());
        h.tracker.track_click("new", None).await;
        h.tracker.start();

        assert_eq!(
            product_ids(&h.tracker.queue.snapshot()),
            vec!["old1", "old2", "new"]
        );

        h.tracker.identify(Some(UserId::new("u")));
        assert_eq!(h.tracker.shutdown().await, FlushOutcome::Sent { count: 3 });
        assert_eq!(h.transport.batches().len(), 1);
    }

    #[tokio::test]
    async fn rotate_policy_changes_session_on_login() {
        let h = harness(
            TrackerConfig::default().with_session_policy(SessionPolicy::RotateOnIdentityChange),
        );
        let anonymous = h.tracker.session_id();

        let rotated = h.tracker.identify(Some(UserId::new("u"))).unwrap();

        assert_ne!(rotated, anonymous);
        assert_eq!(h.tracker.session_id(), rotated);
        assert_eq!(h.tracker.identify(Some(UserId::new("u"))), None);
    }
}
