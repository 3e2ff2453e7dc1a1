//! The persisted view of every change request the poller has seen.
//!
//! Pure data: the differ in the parent module loads it, folds listings into
//! it and saves it back. Nothing else writes it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::{self, KvStore};
use crate::types::{ChangeRequest, ChangeRequestId, CrNumber, CrState, RepoId};

pub const SNAPSHOT_KEY: &str = "change_requests";

/// Entries created this many days ago or earlier are dropped.
pub const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub id: ChangeRequestId,
    pub state: CrState,
    /// False until side effects for the current state have been dispatched.
    pub processed: bool,
    pub project: RepoId,
    pub number: CrNumber,
    pub created_at: NaiveDate,
}

/// What folding one observation into the snapshot did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First time this change request was seen.
    New,
    /// The state differs from the recorded one; the entry is unprocessed again.
    Changed { from: CrState },
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeRequestSnapshot {
    entries: BTreeMap<ChangeRequestId, SnapshotEntry>,
}

impl ChangeRequestSnapshot {
    pub fn load(store: &dyn KvStore) -> store::Result<Self> {
        Ok(store::load_json(store, SNAPSHOT_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, store: &dyn KvStore) -> store::Result<()> {
        store::save_json(store, SNAPSHOT_KEY, self)
    }

    /// Folds one observed change request in.
    pub fn observe(&mut self, cr: &ChangeRequest) -> Observation {
        match self.entries.get_mut(&cr.id) {
            None => {
                self.entries.insert(
                    cr.id,
                    SnapshotEntry {
                        id: cr.id,
                        state: cr.state,
                        processed: false,
                        project: cr.target_repo.clone(),
                        number: cr.number,
                        created_at: cr.created_at.date_naive(),
                    },
                );
                Observation::New
            }
            Some(entry) if entry.state != cr.state => {
                let from = entry.state;
                entry.state = cr.state;
                entry.processed = false;
                Observation::Changed { from }
            }
            Some(_) => Observation::Unchanged,
        }
    }

    /// Copies of the entries still awaiting dispatch, in id order.
    pub fn unprocessed(&self) -> Vec<SnapshotEntry> {
        self.entries.values().filter(|e| !e.processed).cloned().collect()
    }

    pub fn mark_processed(&mut self, id: ChangeRequestId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.processed = true;
        }
    }

    /// Drops entries created [`RETENTION_DAYS`] or more days before `today`,
    /// processed or not. Returns how many were dropped.
    pub fn prune(&mut self, today: NaiveDate) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| (today - e.created_at).num_days() < RETENTION_DAYS);
        before - self.entries.len()
    }

    pub fn get(&self, id: ChangeRequestId) -> Option<&SnapshotEntry> {
        self.entries.get(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
