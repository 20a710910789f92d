//! Tracker configuration.
//!
//! # Defaults
//!
//! - **Batch interval**: 5 seconds between timer-driven flushes
//! - **Queue size**: 20 in-memory events force an eager flush
//! - **Offline queue size**: at most 100 events are kept on device
//! - **View threshold**: views of 10 seconds or more are high-weight
//! - **Exposure TTL**: an impression is counted once per 30 minutes
//!
//! Every value can be overridden with a `STOREFRONT_TRACKER_*` environment
//! variable via [`TrackerConfig::from_env`].

use std::time::Duration;

use thiserror::Error;

/// Default flush timer period (5 seconds).
const DEFAULT_BATCH_INTERVAL_MS: u64 = 5_000;

/// Default in-memory size that forces an eager flush.
const DEFAULT_MAX_QUEUE_SIZE: usize = 20;

/// Default cap on the persisted offline queue.
const DEFAULT_MAX_OFFLINE_QUEUE_SIZE: usize = 100;

/// Default boundary between low- and high-weight views (10 seconds).
const DEFAULT_VIEW_THRESHOLD_MS: u64 = 10_000;

/// Default impression dedup window (30 minutes).
const DEFAULT_EXPOSURE_TTL_MS: u64 = 30 * 60 * 1_000;

/// Default cap on persisted exposure records.
const DEFAULT_MAX_EXPOSURE_RECORDS: usize = 1_000;

const DEFAULT_DEVICE_TYPE: &str = "unknown";

/// Errors from [`TrackerConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A size or interval that must be positive was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// The persisted cap is smaller than the eager-flush threshold.
    #[error(
        "max_offline_queue_size ({offline}) must be at least max_queue_size ({in_memory})"
    )]
    OfflineCapTooSmall { offline: usize, in_memory: usize },

    /// Two storage keys collide.
    #[error("storage key `{0}` is used for more than one slot")]
    DuplicateStorageKey(String),
}

/// Whether the session id changes when the signed-in user changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPolicy {
    /// One session per install lifetime; login/logout keep the id.
    #[default]
    DeviceLifetime,

    /// A new session starts whenever the resolved user id changes.
    RotateOnIdentityChange,
}

/// Names of the store slots owned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub queue: String,
    pub exposures: String,
    pub session: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        StorageKeys {
            queue: "behavior_event_queue".to_string(),
            exposures: "behavior_exposed_items".to_string(),
            session: "behavior_session_id".to_string(),
        }
    }
}

/// Configuration for a tracker instance.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Period of the flush timer.
    pub batch_interval: Duration,

    /// In-memory queue length that triggers an immediate flush.
    pub max_queue_size: usize,

    /// Maximum number of events kept in the persisted queue.
    /// Oldest events are dropped first.
    pub max_offline_queue_size: usize,

    /// Views at least this long are sent immediately with a higher weight.
    pub view_threshold: Duration,

    /// Window during which a repeated impression is not counted again.
    pub exposure_ttl: Duration,

    /// Maximum number of persisted exposure records.
    pub max_exposure_records: usize,

    /// Device type stamped on every event (e.g. `ios`, `android`).
    pub device_type: String,

    pub session_policy: SessionPolicy,

    pub storage_keys: StorageKeys,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerConfig {
    /// Creates a `TrackerConfig` with default values.
    pub fn new() -> Self {
        TrackerConfig {
            batch_interval: Duration::from_millis(DEFAULT_BATCH_INTERVAL_MS),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_offline_queue_size: DEFAULT_MAX_OFFLINE_QUEUE_SIZE,
            view_threshold: Duration::from_millis(DEFAULT_VIEW_THRESHOLD_MS),
            exposure_ttl: Duration::from_millis(DEFAULT_EXPOSURE_TTL_MS),
            max_exposure_records: DEFAULT_MAX_EXPOSURE_RECORDS,
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            session_policy: SessionPolicy::default(),
            storage_keys: StorageKeys::default(),
        }
    }

    /// Creates a `TrackerConfig` from environment variables.
    ///
    /// Recognized variables (all optional, unparsable values are ignored):
    /// `STOREFRONT_TRACKER_BATCH_INTERVAL_MS`, `STOREFRONT_TRACKER_MAX_QUEUE_SIZE`,
    /// `STOREFRONT_TRACKER_MAX_OFFLINE_QUEUE_SIZE`, `STOREFRONT_TRACKER_VIEW_THRESHOLD_MS`,
    /// `STOREFRONT_TRACKER_EXPOSURE_TTL_MS`, `STOREFRONT_TRACKER_DEVICE_TYPE`,
    /// `STOREFRONT_TRACKER_ROTATE_SESSION_ON_LOGIN` (`1`/`true`).
    pub fn from_env() -> Self {
        let defaults = Self::new();

        TrackerConfig {
            batch_interval: env_millis("STOREFRONT_TRACKER_BATCH_INTERVAL_MS")
                .unwrap_or(defaults.batch_interval),
            max_queue_size: env_parse("STOREFRONT_TRACKER_MAX_QUEUE_SIZE")
                .unwrap_or(defaults.max_queue_size),
            max_offline_queue_size: env_parse("STOREFRONT_TRACKER_MAX_OFFLINE_QUEUE_SIZE")
                .unwrap_or(defaults.max_offline_queue_size),
            view_threshold: env_millis("STOREFRONT_TRACKER_VIEW_THRESHOLD_MS")
                .unwrap_or(defaults.view_threshold),
            exposure_ttl: env_millis("STOREFRONT_TRACKER_EXPOSURE_TTL_MS")
                .unwrap_or(defaults.exposure_ttl),
            device_type: std::env::var("STOREFRONT_TRACKER_DEVICE_TYPE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.device_type),
            session_policy: match env_parse::<String>("STOREFRONT_TRACKER_ROTATE_SESSION_ON_LOGIN")
                .as_deref()
            {
                Some("1") | Some("true") => SessionPolicy::RotateOnIdentityChange,
                _ => defaults.session_policy,
            },
            ..defaults
        }
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    pub fn with_session_policy(mut self, policy: SessionPolicy) -> Self {
        self.session_policy = policy;
        self
    }

    /// Checks that sizes and intervals are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_interval.is_zero() {
            return Err(ConfigError::Zero("batch_interval"));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Zero("max_queue_size"));
        }
        if self.max_exposure_records == 0 {
            return Err(ConfigError::Zero("max_exposure_records"));
        }
        if self.max_offline_queue_size < self.max_queue_size {
            return Err(ConfigError::OfflineCapTooSmall {
                offline: self.max_offline_queue_size,
                in_memory: self.max_queue_size,
            });
        }

        let keys = &self.storage_keys;
        for (a, b) in [
            (&keys.queue, &keys.exposures),
            (&keys.queue, &keys.session),
            (&keys.exposures, &keys.session),
        ] {
            if a == b {
                return Err(ConfigError::DuplicateStorageKey(a.clone()));
            }
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}
