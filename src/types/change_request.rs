//! Change request types as observed on the host.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ChangeRequestId, CrNumber, RepoId};

/// The lifecycle state of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrState {
    Open,
    Merged,
    Closed,
}

impl CrState {
    pub fn as_str(self) -> &'static str {
        match self {
            CrState::Open => "open",
            CrState::Merged => "merged",
            CrState::Closed => "closed",
        }
    }

    pub fn is_merged(self) -> bool {
        matches!(self, CrState::Merged)
    }
}

impl fmt::Display for CrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change request as returned by the host.
///
/// The engine only ever adds labels and comments to a change request; every
/// other field is read-only from its point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: ChangeRequestId,
    pub number: CrNumber,
    pub title: String,
    pub description: Option<String>,
    pub source_branch: String,
    pub target_branch: String,
    /// Repository holding the source branch. `None` when the fork was deleted.
    pub source_repo: Option<RepoId>,
    pub target_repo: RepoId,
    pub author: String,
    pub labels: Vec<String>,
    pub state: CrState,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub web_url: String,
}

impl ChangeRequest {
    /// True when source and target branches live in the same repository.
    pub fn is_same_repo(&self) -> bool {
        self.source_repo.as_ref().is_some_and(|r| r.same_as(&self.target_repo))
    }

    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// A file touched by a change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    /// True when the change request adds the file.
    pub is_new: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChangeRequest {
        ChangeRequest {
            id: ChangeRequestId(1),
            number: CrNumber(7),
            title: "feat: thing".to_string(),
            description: None,
            source_branch: "feature".to_string(),
            target_branch: "dev".to_string(),
            source_repo: Some(RepoId::new("acme", "app")),
            target_repo: RepoId::new("acme", "app"),
            author: "alice".to_string(),
            labels: vec!["feature".to_string()],
            state: CrState::Open,
            created_at: Utc::now(),
            merged_at: None,
            web_url: "https://example.invalid/acme/app/pull/7".to_string(),
        }
    }

    #[test]
    fn same_repo_requires_matching_source() {
        let mut cr = sample();
        assert!(cr.is_same_repo());
        cr.source_repo = Some(RepoId::new("fork", "app"));
        assert!(!cr.is_same_repo());
        cr.source_repo = None;
        assert!(!cr.is_same_repo());
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&CrState::Merged).unwrap(), "\"merged\"");
        assert_eq!(CrState::Closed.to_string(), "closed");
    }

    #[test]
    fn label_lookup_is_exact() {
        let cr = sample();
        assert!(cr.has_label("feature"));
        assert!(!cr.has_label("feat"));
    }
}
