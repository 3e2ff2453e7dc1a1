//! Label & ticket linker.
//!
//! Runs as a queued task whenever the snapshot differ sees a change request
//! change state. It labels the change request from its title and new files,
//! checks that the title names valid tickets (commenting when it does not),
//! moves those tickets to `In Progress` and starts a confirmation chain that
//! moves them to `Fixed` once the change request merges.
//!
//! Every remote write is best-effort: a failed label or comment is logged
//! and processing continues with the next item.

pub mod labels;

use tracing::{debug, info, instrument, warn};

use crate::chat::ChatClient;
use crate::confirm::{ConfirmTarget, TerminalAction};
use crate::effects::{HostConnector, HostInterpreter, ops};
use crate::engine::Engine;
use crate::tracker::{IssueTracker, Ticket, TicketStatus, transition_all};
use crate::types::{ChangeRequest, CrNumber, RepoId};

use labels::{BUGFIX_LABEL, missing_labels, ticket_keys};

/// Why the linker stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The change request could not be fetched.
    Unavailable,
    /// A release change request (from the release branch).
    ReleaseBranch,
    /// The description opts out of ticket checks. Labels were still applied.
    SkipMarker,
    /// Opened by an automation account. Labels were still applied.
    Automation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Skipped(SkipReason),
    /// No valid ticket. `reminded` says whether a reminder comment was
    /// posted, which only happens when the title names no ticket key at all.
    NoTickets { reminded: bool },
    /// Tickets moved to `In Progress` and a confirmation chain started.
    Linked { tickets: Vec<String> },
}

fn reminder_text(skip_marker: &str) -> String {
    format!(
        "Please start the title with a ticket key, for example `QA-25(feat): do something`.\n\n\
         Add `{skip_marker}` to the description to skip this check."
    )
}

fn lookup_failed_text(key: &str, error: &str) -> String {
    format!("`{key}` could not be checked in the tracker: `{error}`")
}

fn foreign_assignee_text(key: &str, assignee: &str) -> String {
    format!("`{key}` is assigned to {assignee}. Please link your own ticket.")
}

fn epic_text(key: &str) -> String {
    format!("Linking an Epic directly (`{key}`) is discouraged. Please link a Story or Sub-task instead.")
}

async fn comment<I: HostInterpreter + Sync>(client: &I, number: CrNumber, body: String) {
    if let Err(e) = ops::post_comment(client, number, body).await {
        warn!(%number, error = %e, "failed to post comment");
    }
}

async fn label<I: HostInterpreter + Sync>(client: &I, number: CrNumber, labels: Vec<String>) {
    if labels.is_empty() {
        return;
    }
    match ops::add_labels(client, number, labels.clone()).await {
        Ok(()) => debug!(%number, ?labels, "added labels"),
        Err(e) => warn!(%number, ?labels, error = %e, "failed to add labels"),
    }
}

impl<H, T, C> Engine<H, T, C>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    #[instrument(skip(self), fields(repo = %repo, number = %number))]
    pub async fn link(&self, repo: &RepoId, number: CrNumber) -> LinkOutcome {
        let client = self.host().connect(repo);
        let cr = match ops::get_change_request(&client, number).await {
            Ok(cr) => cr,
            Err(e) => {
                warn!(error = %e, "could not fetch change request");
                return LinkOutcome::Skipped(SkipReason::Unavailable);
            }
        };
        let config = self.config();

        if cr.source_branch == config.release_branch {
            return LinkOutcome::Skipped(SkipReason::ReleaseBranch);
        }

        self.apply_labels(&client, &cr).await;

        if cr
            .description_text()
            .to_lowercase()
            .contains(&config.skip_marker.to_lowercase())
        {
            return LinkOutcome::Skipped(SkipReason::SkipMarker);
        }
        if config.is_automation(&cr.author) {
            return LinkOutcome::Skipped(SkipReason::Automation);
        }

        let keys = ticket_keys(&cr.title);
        if keys.is_empty() {
            let protected_merge = cr.is_same_repo()
                && config.is_protected(&cr.source_branch)
                && config.is_protected(&cr.target_branch);
            if protected_merge {
                return LinkOutcome::NoTickets { reminded: false };
            }
            comment(&client, number, reminder_text(&config.skip_marker)).await;
            return LinkOutcome::NoTickets { reminded: true };
        }

        // Keys that fail to resolve were already commented on.
        let tickets = self.check_tickets(&client, &cr, &keys).await;
        if tickets.is_empty() {
            return LinkOutcome::NoTickets { reminded: false };
        }

        let linked: Vec<String> = tickets.into_iter().map(|t| t.key).collect();
        transition_all(self.tracker(), &linked, TicketStatus::InProgress).await;

        let target = ConfirmTarget {
            repo: repo.clone(),
            number,
            action: TerminalAction::TransitionTickets,
        };
        if let Err(e) = self.start_confirmation(target) {
            warn!(error = %e, "failed to schedule confirmation");
        }
        info!(tickets = ?linked, "linked change request");
        LinkOutcome::Linked { tickets: linked }
    }

    async fn apply_labels(&self, client: &H::Client, cr: &ChangeRequest) {
        let files = match ops::list_changed_files(client, cr.number).await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "could not list changed files, labelling from title only");
                Vec::new()
            }
        };
        label(client, cr.number, missing_labels(&cr.title, &files, &cr.labels)).await;
    }

    /// Looks up every ticket key and posts advisory comments. Returns the
    /// tickets that exist.
    async fn check_tickets(&self, client: &H::Client, cr: &ChangeRequest, keys: &[String]) -> Vec<Ticket> {
        let mut found = Vec::new();
        let mut bugfix_labelled = cr.has_label(BUGFIX_LABEL);

        for key in keys {
            let ticket = match self.tracker().get_ticket(key).await {
                Ok(ticket) => ticket,
                Err(e) => {
                    comment(client, cr.number, lookup_failed_text(key, &e.user_text())).await;
                    continue;
                }
            };

            if ticket.is_bug() && !bugfix_labelled {
                label(client, cr.number, vec![BUGFIX_LABEL.to_string()]).await;
                bugfix_labelled = true;
            }
            if let Some(assignee) = &ticket.assignee
                && assignee != &cr.author
            {
                comment(client, cr.number, foreign_assignee_text(key, assignee)).await;
            }
            if ticket.is_epic() {
                comment(client, cr.number, epic_text(key)).await;
            }
            found.push(ticket);
        }
        found
    }
}
