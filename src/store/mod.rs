//! Persisted key-value store.
//!
//! All state that must survive a restart lives here: the reconciliation
//! snapshot, confirmation dedup markers, and pending tasks. Values are
//! strings (JSON for structured data); a key may carry an expiry after which
//! it reads as absent.
//!
//! Two implementations:
//! - [`FileStore`]: one JSON document on disk, replaced atomically on every write
//! - [`MemoryStore`]: process-local, for tests and dry runs

use std::collections::BTreeMap;
use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

mod file;
pub mod fsync;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Current on-disk schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },

    #[error("value under {key:?} does not decode: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A string key-value store with optional per-key expiry.
///
/// Expiry is evaluated against the store's own clock: an expired key is
/// indistinguishable from a missing one.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn set_with_expiry(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn delete(&self, key: &str) -> Result<()>;
}

/// Reads and decodes a JSON value.
pub fn load_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Decode {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encodes and writes a JSON value without expiry.
pub fn save_json<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// A stored value and its optional expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// The map both implementations operate on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Entries {
    schema_version: u32,
    entries: BTreeMap<String, StoredValue>,
}

impl Entries {
    fn new() -> Self {
        Entries {
            schema_version: SCHEMA_VERSION,
            entries: BTreeMap::new(),
        }
    }

    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        self.entries
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.value.clone())
    }

    fn insert(&mut self, key: &str, value: &str, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.purge_expired(now);
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, v| v.is_live(now));
    }
}
