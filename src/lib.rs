//! Storefront Tracker - client-side behavior event collection with resilient delivery.
//!
//! Events are classified by weight: high-value events are sent immediately,
//! the rest are batched, persisted across restarts and flushed on a timer.
//! Product impressions are deduplicated within a TTL window, and a session id
//! is kept stable across app lifecycle changes.

pub mod batch;
pub mod clock;
pub mod config;
pub mod exposure;
pub mod identity;
pub mod outcome;
pub mod router;
pub mod session;
pub mod store;
pub mod tracker;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use batch::{BatchQueue, FlushScheduler, QueueLimits, SchedulerState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SessionPolicy, StorageKeys, TrackerConfig};
pub use exposure::ExposureDeduplicator;
pub use identity::IdentityHandle;
pub use outcome::{DeferReason, FlushOutcome, RecordOutcome};
pub use router::{DeliveryPolicy, EventRouter, Route};
pub use session::SessionManager;
pub use store::{FileStore, MemoryStore, PersistentStore, StoreError};
pub use tracker::Tracker;
pub use transport::{HttpTransport, TransportClient, TransportError, TransportErrorKind};
pub use types::{BehaviorEvent, EventPayload, EventType, ItemId, SessionId, UserId};
