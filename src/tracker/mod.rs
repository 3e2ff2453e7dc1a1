//! Issue tracker integration.
//!
//! The engine needs two things from the tracker: read a ticket (type,
//! assignee, status) and move it to a named status. Transitions are
//! discovered at call time by matching the target status name, since
//! workflow transition ids differ between projects.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod jira;

pub use jira::JiraClient;

/// A ticket as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub key: String,
    /// Issue type name, e.g. `Bug`, `Epic`, `Story`.
    pub issue_type: String,
    /// Login of the assignee, if any.
    pub assignee: Option<String>,
    pub status: String,
}

impl Ticket {
    pub fn is_bug(&self) -> bool {
        self.issue_type.eq_ignore_ascii_case("bug")
    }

    pub fn is_epic(&self) -> bool {
        self.issue_type.eq_ignore_ascii_case("epic")
    }
}

/// Statuses the engine moves tickets into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    InProgress,
    Fixed,
}

impl TicketStatus {
    /// Status names that count as this status, compared case-insensitively
    /// against a transition's target.
    pub fn names(self) -> &'static [&'static str] {
        match self {
            TicketStatus::InProgress => &["In Progress"],
            TicketStatus::Fixed => &["Fixed", "Resolved"],
        }
    }

    pub fn matches(self, status_name: &str) -> bool {
        self.names()
            .iter()
            .any(|n| n.eq_ignore_ascii_case(status_name.trim()))
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.names()[0])
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    /// The tracker answered with an error. `text` is its message verbatim, fit
    /// for quoting back to a user.
    #[error("tracker returned HTTP {status}: {text}")]
    Remote { status: u16, text: String },

    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected tracker response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TrackerError {
    /// The message to show a person: the tracker's own text when it sent one.
    pub fn user_text(&self) -> String {
        match self {
            TrackerError::Remote { text, .. } => text.clone(),
            other => other.to_string(),
        }
    }

    /// Server-side and network failures may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            TrackerError::Remote { status, .. } => *status == 429 || *status >= 500,
            TrackerError::Http(e) => e.is_timeout() || e.is_connect(),
            TrackerError::Decode(_) => false,
        }
    }
}

pub trait IssueTracker: Send + Sync + 'static {
    fn get_ticket(&self, key: &str) -> impl Future<Output = Result<Ticket, TrackerError>> + Send;

    /// Moves the ticket to `status`. Returns `false` when no transition leads
    /// there from the ticket's current state (including when it is already in
    /// that state).
    fn transition(
        &self,
        key: &str,
        status: TicketStatus,
    ) -> impl Future<Output = Result<bool, TrackerError>> + Send;
}

/// Transitions every key, isolating failures per key. Returns how many keys
/// hit a transient failure.
pub async fn transition_all<T: IssueTracker>(tracker: &T, keys: &[String], status: TicketStatus) -> usize {
    let mut transient = 0;
    for key in keys {
        match tracker.transition(key, status).await {
            Ok(true) => tracing::info!(ticket = %key, %status, "transitioned ticket"),
            Ok(false) => tracing::debug!(ticket = %key, %status, "no matching transition"),
            Err(e) => {
                if e.is_transient() {
                    transient += 1;
                }
                tracing::warn!(ticket = %key, %status, error = %e, "ticket transition failed");
            }
        }
    }
    transient
}
