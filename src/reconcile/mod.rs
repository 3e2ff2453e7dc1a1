//! Snapshot differ.
//!
//! The host offers no change request events here, so every tick lists the
//! change requests of each configured project, folds them into the persisted
//! snapshot, and dispatches side effects for every entry whose state changed
//! since the last dispatch:
//!
//! - projects with ticket linking get a [`Task::Link`] queued
//! - merged change requests by people (not automation) get a chat notification
//!
//! One broken change request or project never stops the others: failures
//! are logged and the entry stays unprocessed for the next tick.

pub mod snapshot;

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::chat::ChatClient;
use crate::effects::{HostConnector, StateFilter, ops};
use crate::engine::Engine;
use crate::store;
use crate::tracker::IssueTracker;
use crate::types::{ChangeRequest, ChangeRequestId, CrState};
use crate::worker::Task;

pub use snapshot::{ChangeRequestSnapshot, Observation, SnapshotEntry};

/// Counters from one tick, for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub observed: usize,
    pub dispatched: usize,
    /// Entries left unprocessed because dispatch failed.
    pub deferred: usize,
    pub pruned: usize,
    /// Projects whose listing failed this tick.
    pub skipped_projects: usize,
}

impl<H, T, C> Engine<H, T, C>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    /// One poll over every configured project. Only a store failure while
    /// loading or saving the snapshot is returned.
    #[instrument(skip(self))]
    pub async fn reconcile_tick(&self) -> store::Result<TickSummary> {
        let mut snapshot = ChangeRequestSnapshot::load(self.store())?;
        let mut summary = TickSummary::default();
        let mut listed: HashMap<ChangeRequestId, ChangeRequest> = HashMap::new();

        for project in &self.config().projects {
            let client = self.host().connect(&project.repo);
            match ops::list_change_requests(
                &client,
                StateFilter::All,
                None,
                None,
                self.config().listing_max_pages,
            )
            .await
            {
                Ok(crs) => {
                    for cr in crs {
                        if let Observation::Changed { from } = snapshot.observe(&cr) {
                            debug!(repo = %project.repo, number = %cr.number, %from, to = %cr.state, "state changed");
                        }
                        summary.observed += 1;
                        listed.insert(cr.id, cr);
                    }
                }
                Err(e) => {
                    warn!(repo = %project.repo, error = %e, "listing failed, skipping project this tick");
                    summary.skipped_projects += 1;
                }
            }
        }

        for entry in snapshot.unprocessed() {
            let cr = match listed.remove(&entry.id) {
                Some(cr) => cr,
                None => {
                    let client = self.host().connect(&entry.project);
                    match ops::get_change_request(&client, entry.number).await {
                        Ok(cr) => {
                            snapshot.observe(&cr);
                            cr
                        }
                        Err(e) => {
                            warn!(repo = %entry.project, number = %entry.number, error = %e, "could not fetch change request");
                            summary.deferred += 1;
                            continue;
                        }
                    }
                }
            };

            match self.dispatch(&cr).await {
                Ok(()) => {
                    snapshot.mark_processed(entry.id);
                    summary.dispatched += 1;
                }
                Err(e) => {
                    warn!(repo = %entry.project, number = %entry.number, error = %e, "dispatch failed");
                    summary.deferred += 1;
                }
            }
        }

        summary.pruned = snapshot.prune(self.today());
        snapshot.save(self.store())?;

        if summary.dispatched > 0 || summary.deferred > 0 || summary.skipped_projects > 0 {
            info!(?summary, "reconcile tick finished");
        } else {
            debug!(?summary, "reconcile tick finished");
        }
        Ok(summary)
    }

    /// Side effects for a change request whose state changed. Change requests
    /// of projects that are no longer configured are marked done silently.
    async fn dispatch(&self, cr: &ChangeRequest) -> store::Result<()> {
        let Some(project) = self.config().project(&cr.target_repo) else {
            debug!(repo = %cr.target_repo, number = %cr.number, "project no longer configured");
            return Ok(());
        };

        if project.ticket_linking {
            self.schedule(
                Task::Link {
                    repo: project.repo.clone(),
                    number: cr.number,
                },
                Duration::ZERO,
            )?;
        }
        if cr.state == CrState::Merged && !self.config().is_automation(&cr.author) {
            self.notify_merged(project, cr).await;
        }
        Ok(())
    }

    /// The persisted snapshot, for inspection.
    pub fn snapshot(&self) -> store::Result<ChangeRequestSnapshot> {
        ChangeRequestSnapshot::load(self.store())
    }
}
