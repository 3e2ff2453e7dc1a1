//! Confirmation backoff loop.
//!
//! After the engine acts on an open change request it needs to do one more
//! thing once the change request merges: move the linked tickets to `Fixed`,
//! or create the release tag. Each check is one queued task; while the
//! change request is still open the task schedules its successor with a
//! linearly growing delay, capped at 30 minutes.
//!
//! A dedup marker in the store (`confirm:{owner}/{repo}:{number}:{action}`)
//! lives for slightly less than the scheduled delay. A second chain for the
//! same change request and action that fires while the marker is live does
//! nothing, so duplicate deliveries collapse into one chain. Chains with
//! different actions on one change request run independently.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::chat::ChatClient;
use crate::effects::{HostConnector, ops};
use crate::engine::Engine;
use crate::host::HostApiError;
use crate::linker::labels::ticket_keys;
use crate::store;
use crate::tracker::{IssueTracker, TicketStatus, transition_all};
use crate::types::{ChangeRequest, CrNumber, CrState, RepoId};
use crate::worker::Task;

/// Delay schedule for a confirmation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Added to the delay after every check that finds the change request open.
    /// Also the delay of the first check.
    pub step: Duration,
    pub cap: Duration,
    /// The dedup marker expires this long before the next check is due.
    pub marker_margin: Duration,
}

impl BackoffPolicy {
    pub const DEFAULT: BackoffPolicy = BackoffPolicy {
        step: Duration::from_secs(10),
        cap: Duration::from_secs(1800),
        marker_margin: Duration::from_secs(10),
    };

    pub fn initial(&self) -> Duration {
        self.step
    }

    pub fn next(&self, delay: Duration) -> Duration {
        (delay + self.step).min(self.cap)
    }

    pub fn marker_ttl(&self, next: Duration) -> Duration {
        next.saturating_sub(self.marker_margin)
    }
}

/// What to do once the change request is merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalAction {
    /// Move the tickets named in the title to `Fixed`.
    TransitionTickets,

    /// Create the release tag at `target_ref`.
    CreateTag {
        tag: String,
        target_ref: String,
        description: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmTarget {
    pub repo: RepoId,
    pub number: CrNumber,
    pub action: TerminalAction,
}

impl TerminalAction {
    pub fn kind(&self) -> &'static str {
        match self {
            TerminalAction::TransitionTickets => "tickets",
            TerminalAction::CreateTag { .. } => "tag",
        }
    }
}

impl ConfirmTarget {
    pub fn marker_key(&self) -> String {
        format!("confirm:{}:{}:{}", self.repo, self.number.0, self.action.kind())
    }
}

/// Result of one confirmation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Another chain holds the marker.
    Suppressed,
    /// Still open; the next check is due after `delay`.
    Rescheduled { delay: Duration },
    /// This attempt could not finish; retried after `delay`.
    Retrying { delay: Duration },
    /// Closed without merging; the chain ends.
    Closed,
    /// The change request no longer exists; the chain ends.
    Abandoned,
    /// Merged and the terminal action ran.
    Completed,
    /// Merged but the terminal action failed permanently.
    Failed,
}

#[derive(Debug, thiserror::Error)]
enum TerminalError {
    #[error("{0} ticket transition(s) failed transiently")]
    Tracker(usize),

    #[error(transparent)]
    Host(#[from] HostApiError),
}

impl TerminalError {
    fn is_transient(&self) -> bool {
        match self {
            TerminalError::Tracker(_) => true,
            TerminalError::Host(e) => e.kind.is_retriable(),
        }
    }
}

impl<H, T, C> Engine<H, T, C>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    /// Starts a confirmation chain with the policy's initial delay.
    pub fn start_confirmation(&self, target: ConfirmTarget) -> store::Result<()> {
        let delay = self.backoff().initial();
        self.schedule(Task::confirm(target, delay), delay)?;
        Ok(())
    }

    /// One step of the chain. `delay` is the delay this step was scheduled
    /// with.
    #[instrument(skip(self, target), fields(repo = %target.repo, number = %target.number))]
    pub async fn confirm(&self, target: &ConfirmTarget, delay: Duration) -> store::Result<ConfirmOutcome> {
        let marker = target.marker_key();
        if self.store().exists(&marker)? {
            return Ok(ConfirmOutcome::Suppressed);
        }

        let client = self.host().connect(&target.repo);
        let cr = match ops::get_change_request(&client, target.number).await {
            Ok(cr) => cr,
            Err(e) if e.is_not_found() => {
                warn!(error = %e, "change request is gone, ending confirmation");
                return Ok(ConfirmOutcome::Abandoned);
            }
            Err(e) => {
                warn!(error = %e, "could not fetch change request, will retry");
                self.schedule(Task::confirm(target.clone(), delay), delay)?;
                return Ok(ConfirmOutcome::Retrying { delay });
            }
        };

        match cr.state {
            CrState::Closed => {
                info!("change request closed without merging");
                Ok(ConfirmOutcome::Closed)
            }
            CrState::Open => {
                let next = self.backoff().next(delay);
                let expires_at = self.now()
                    + chrono::Duration::from_std(self.backoff().marker_ttl(next))
                        .unwrap_or(chrono::Duration::zero());
                self.store().set_with_expiry(&marker, "1", expires_at)?;
                self.schedule(Task::confirm(target.clone(), next), next)?;
                Ok(ConfirmOutcome::Rescheduled { delay: next })
            }
            CrState::Merged => match self.finish(&client, &target.action, &cr).await {
                Ok(()) => Ok(ConfirmOutcome::Completed),
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "terminal action failed, will retry");
                    self.schedule(Task::confirm(target.clone(), delay), delay)?;
                    Ok(ConfirmOutcome::Retrying { delay })
                }
                Err(e) => {
                    warn!(error = %e, "terminal action failed");
                    Ok(ConfirmOutcome::Failed)
                }
            },
        }
    }

    async fn finish(
        &self,
        client: &H::Client,
        action: &TerminalAction,
        cr: &ChangeRequest,
    ) -> Result<(), TerminalError> {
        match action {
            TerminalAction::TransitionTickets => {
                let keys = ticket_keys(&cr.title);
                match transition_all(self.tracker(), &keys, TicketStatus::Fixed).await {
                    0 => Ok(()),
                    failed => Err(TerminalError::Tracker(failed)),
                }
            }
            TerminalAction::CreateTag {
                tag,
                target_ref,
                description,
            } => {
                let message = format!("release {tag} at {}", cr.web_url);
                match ops::create_tag(client, tag, target_ref, &message, description).await {
                    Ok(()) => {
                        info!(%tag, "created release tag");
                        Ok(())
                    }
                    Err(e) if e.is_already_exists() => {
                        info!(%tag, "release tag already exists");
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}
