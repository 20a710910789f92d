//! Key-value persistence used by the tracker.
//!
//! The tracker owns three slots in a [`PersistentStore`] that it shares with
//! the host application:
//!
//! ```text
//! <queue key>      - JSON array of pending BehaviorEvents (oldest first)
//! <exposures key>  - JSON object of item id -> last exposure (epoch millis)
//! <session key>    - the session id, as a plain string
//! ```
//!
//! # Failure Model
//!
//! Store failures are never fatal to tracking. Callers log the error and
//! carry on with in-memory state, accepting that an abrupt process exit while
//! the store is unavailable may lose the unsaved part.

pub mod file;
pub mod memory;

use std::io;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A stored value could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key is not usable by this store (e.g. contains path separators).
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// The backing storage refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// String key-value storage that survives process restarts.
///
/// Implementations must provide last-write-wins durability per key. No
/// multi-key atomicity is required.
pub trait PersistentStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// Reads and deserializes a JSON value stored under `key`.
pub fn read_json<T: DeserializeOwned>(store: &dyn PersistentStore, key: &str) -> Result<Option<T>> {
    match store.get_item(key)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

/// Serializes `value` as JSON and stores it under `key`.
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn PersistentStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let text = serde_json::to_string(value)?;
    store.set_item(key, &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_helpers_store_plain_json_text() {
        let store = MemoryStore::new();

        write_json(&store, "k", &vec![1, 2, 3]).unwrap();

        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("[1,2,3]"));
        let back: Option<Vec<i32>> = read_json(&store, "k").unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
    }

    #[test]
    fn read_json_of_missing_key_is_none() {
        let store = MemoryStore::new();
        let value: Option<Vec<i32>> = read_json(&store, "absent").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn read_json_of_corrupt_value_is_json_error() {
        let store = MemoryStore::new();
        store.set_item("k", "{not json").unwrap();

        let result: Result<Option<Vec<i32>>> = read_json(&store, "k");
        assert!(matches!(result, Err(StoreError::Json(_))));
    }
}
