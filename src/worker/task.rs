//! Units of deferred work.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::confirm::ConfirmTarget;
use crate::types::{CrNumber, RepoId};

/// A task the queue delivers to the engine.
///
/// Tasks are persisted while pending, so every variant must stay
/// deserializable across upgrades: add variants, do not rename them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// Label a change request and link it to its tickets.
    Link { repo: RepoId, number: CrNumber },

    /// One step of a confirmation chain. `delay_secs` is the delay this step
    /// was scheduled with; the next step's delay grows from it.
    Confirm { target: ConfirmTarget, delay_secs: u64 },
}

impl Task {
    pub fn confirm(target: ConfirmTarget, delay: Duration) -> Self {
        Task::Confirm {
            target,
            delay_secs: delay.as_secs(),
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Link { .. } => "link",
            Task::Confirm { .. } => "confirm",
        }
    }
}
