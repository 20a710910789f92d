//! Impression deduplication with TTL-based expiry.
//!
//! List screens re-render often, and every render would otherwise count the
//! visible items as shown again. An item is counted at most once per
//! exposure TTL (default 30 minutes), or until [`ExposureDeduplicator::clear_exposures`]
//! is called after an explicit content refresh.
//!
//! # Persistence
//!
//! Records are stored as a JSON object `{ "<item id>": <epoch millis> }`.
//! Expired entries are purged when the map is loaded and before every save;
//! if more than the cap remain, the entries with the oldest timestamps are
//! evicted first. A time-ordered index makes that eviction exact.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::store::{PersistentStore, read_json, write_json};
use crate::types::ItemId;

/// Last-exposure times with an index ordered by time.
#[derive(Debug, Default, Clone)]
pub struct ExposureRecords {
    last_seen: HashMap<ItemId, DateTime<Utc>>,
    by_time: BTreeSet<(DateTime<Utc>, ItemId)>,
}

impl ExposureRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    pub fn last_exposed(&self, id: &ItemId) -> Option<DateTime<Utc>> {
        self.last_seen.get(id).copied()
    }

    /// Records `id` as exposed at `at`, replacing any earlier record.
    pub fn insert(&mut self, id: ItemId, at: DateTime<Utc>) {
        if let Some(previous) = self.last_seen.insert(id.clone(), at) {
            self.by_time.remove(&(previous, id.clone()));
        }
        self.by_time.insert((at, id));
    }

    /// Removes records whose age is at least `ttl`.
    ///
    /// Returns the number of records removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let mut removed = 0;
        while let Some((at, _)) = self.by_time.first() {
            if now - *at < ttl {
                break;
            }
            if let Some((_, id)) = self.by_time.pop_first() {
                self.last_seen.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    /// Evicts the oldest records until at most `cap` remain.
    ///
    /// Returns the number of records evicted.
    pub fn evict_oldest(&mut self, cap: usize) -> usize {
        let mut evicted = 0;
        while self.last_seen.len() > cap {
            match self.by_time.pop_first() {
                Some((_, id)) => {
                    self.last_seen.remove(&id);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
        self.by_time.clear();
    }

    fn to_persisted(&self) -> HashMap<&str, i64> {
        self.last_seen
            .iter()
            .map(|(id, at)| (id.as_str(), at.timestamp_millis()))
            .collect()
    }

    fn from_persisted(raw: HashMap<String, i64>) -> Self {
        let mut records = ExposureRecords::new();
        for (id, millis) in raw {
            if let Some(at) = DateTime::<Utc>::from_timestamp_millis(millis) {
                records.insert(ItemId::new(id), at);
            }
        }
        records
    }
}

#[derive(Debug, Default)]
struct DedupState {
    loaded: bool,
    records: ExposureRecords,
}

/// Filters impressions that were already counted within the TTL window.
pub struct ExposureDeduplicator {
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    key: String,
    ttl: Duration,
    max_records: usize,
    state: Mutex<DedupState>,
}

impl ExposureDeduplicator {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
        ttl: std::time::Duration,
        max_records: usize,
    ) -> Self {
        ExposureDeduplicator {
            store,
            clock,
            key: key.into(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(36_500)),
            max_records,
            state: Mutex::new(DedupState::default()),
        }
    }

    /// Returns the subset of `ids` not already counted within the TTL, and
    /// records them as exposed now.
    ///
    /// Order follows `ids`; an id repeated within one call is returned once.
    pub fn mark_exposed(&self, ids: &[ItemId]) -> Vec<ItemId> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_loaded(&mut state, now);

        let mut fresh = Vec::new();
        for id in ids {
            let suppressed = state
                .records
                .last_exposed(id)
                .is_some_and(|at| now - at < self.ttl);
            if suppressed {
                continue;
            }
            state.records.insert(id.clone(), now);
            fresh.push(id.clone());
        }

        if !fresh.is_empty() {
            self.save(&mut state, now);
        }
        debug!(
            requested = ids.len(),
            fresh = fresh.len(),
            "Filtered exposures"
        );
        fresh
    }

    /// Forgets every recorded exposure, in memory and in the store.
    pub fn clear_exposures(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.records.clear();
        state.loaded = true;
        if let Err(e) = self.store.remove_item(&self.key) {
            warn!(error = %e, key = %self.key, "Failed to clear persisted exposures");
        }
    }

    /// Number of live records (loading them if necessary).
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_loaded(&mut state, now);
        state.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_loaded(&self, state: &mut DedupState, now: DateTime<Utc>) {
        if state.loaded {
            return;
        }
        state.loaded = true;

        match read_json::<HashMap<String, i64>>(self.store.as_ref(), &self.key) {
            Ok(Some(raw)) => {
                let mut records = ExposureRecords::from_persisted(raw);
                let expired = records.purge_expired(now, self.ttl);
                debug!(loaded = records.len(), expired, "Loaded exposure records");
                state.records = records;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, key = %self.key, "Failed to load exposure records");
            }
        }
    }

    fn save(&self, state: &mut DedupState, now: DateTime<Utc>) {
        state.records.purge_expired(now, self.ttl);
        let evicted = state.records.evict_oldest(self.max_records);
        if evicted > 0 {
            debug!(evicted, cap = self.max_records, "Evicted oldest exposure records");
        }

        let persisted = state.records.to_persisted();
        if let Err(e) = write_json(self.store.as_ref(), &self.key, &persisted) {
            warn!(error = %e, key = %self.key, "Failed to persist exposure records");
        }
    }
}
