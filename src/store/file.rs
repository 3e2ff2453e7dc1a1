//! File-backed store.
//!
//! The whole store is one JSON document. Reads are served from memory; every
//! write produces the next document, persists it with [`write_atomic`], and
//! only then becomes visible. A failed write leaves both disk and memory at
//! the previous state.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};

use super::fsync::write_atomic;
use super::{Entries, KvStore, Result, SCHEMA_VERSION, StoreError};

pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Entries>,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.into();
        let entries = match load(&path) {
            Ok(entries) => entries,
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Entries::new(),
            Err(e) => return Err(e),
        };
        tracing::debug!(path = %path.display(), keys = entries.entries.len(), "opened store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            clock,
        })
    }

    fn update(&self, mutate: impl FnOnce(&mut Entries)) -> Result<()> {
        let mut current = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = current.clone();
        mutate(&mut next);
        let bytes = serde_json::to_vec_pretty(&next)?;
        write_atomic(&self.path, &bytes)?;
        *current = next;
        Ok(())
    }
}

fn load(path: &Path) -> Result<Entries> {
    let bytes = std::fs::read(path)?;
    let entries: Entries = serde_json::from_slice(&bytes)?;
    if entries.schema_version != SCHEMA_VERSION {
        return Err(StoreError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: entries.schema_version,
        });
    }
    Ok(entries)
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key, self.clock.now()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = self.clock.now();
        self.update(|entries| entries.insert(key, value, None, now))
    }

    fn set_with_expiry(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let now = self.clock.now();
        self.update(|entries| entries.insert(key, value, Some(expires_at), now))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.set("change_requests", "{}").unwrap();
        store.set("other", "x").unwrap();
        store.delete("other").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("change_requests").unwrap().as_deref(), Some("{}"));
        assert_eq!(reopened.get("other").unwrap(), None);
    }

    #[test]
    fn expiry_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let store = FileStore::open_with_clock(&path, clock.clone()).unwrap();
        store
            .set_with_expiry("confirm:acme/app:42", "1", clock.now() + Duration::seconds(10))
            .unwrap();
        drop(store);

        let reopened = FileStore::open_with_clock(&path, clock.clone()).unwrap();
        assert!(reopened.exists("confirm:acme/app:42").unwrap());
        clock.advance(Duration::seconds(11));
        assert!(!reopened.exists("confirm:acme/app:42").unwrap());
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.get("anything").unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(FileStore::open(&path), Err(StoreError::Json(_))));
    }

    #[test]
    fn future_schema_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, br#"{"schema_version": 99, "entries": {}}"#).unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::SchemaMismatch { expected: 1, got: 99 })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn last_write_wins_after_reopen(
            writes in prop::collection::vec(("[a-c]", "[a-z0-9]{0,8}"), 1..12)
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("store.json");
            let store = FileStore::open(&path).unwrap();
            let mut expected = std::collections::BTreeMap::new();
            for (k, v) in &writes {
                store.set(k, v).unwrap();
                expected.insert(k.clone(), v.clone());
            }
            drop(store);

            let reopened = FileStore::open(&path).unwrap();
            for (k, v) in expected {
                prop_assert_eq!(reopened.get(&k).unwrap(), Some(v));
            }
        }
    }
}
