//! Host API effect types.
//!
//! These types describe source-control host operations as data, without
//! executing them. The interpreter in `crate::host` executes them against the
//! GitHub API; tests execute them against an in-memory mock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChangeRequest, ChangedFile, CommentId, CrNumber};

/// Which change requests a listing should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFilter {
    Open,
    /// Closed and merged change requests.
    Closed,
    All,
}

/// How a change request is merged into its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    /// Move the target branch to the source head. Only valid when the target
    /// is an ancestor of the source.
    FastForward,
    /// Create a merge commit.
    Merge,
}

/// Required status checks on a protected branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusChecks {
    /// Whether the source branch must be up to date with the target.
    pub strict: bool,
    pub contexts: Vec<String>,
}

/// The merge gates of a branch: the settings that can block a merge.
///
/// `None` for a field means the gate is not configured at all, which is
/// distinct from a configured gate with a permissive value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergeGates {
    /// Status checks that must pass before merging.
    pub required_status_checks: Option<StatusChecks>,
    /// Number of approving reviews required. `None` when reviews are not
    /// required.
    pub required_approvals: Option<u32>,
    /// Whether the person who pushed last may count as an approver.
    pub allow_author_approval: bool,
}

impl MergeGates {
    /// The gates with every blocking setting relaxed: no required checks, no
    /// required approvals, author approval allowed.
    ///
    /// A gate that is absent stays absent, so restoring the captured value
    /// never introduces protection that was not there before.
    pub fn relaxed(&self) -> MergeGates {
        MergeGates {
            required_status_checks: None,
            required_approvals: self.required_approvals.map(|_| 0),
            allow_author_approval: true,
        }
    }

    /// True when relaxing would change nothing.
    pub fn is_relaxed(&self) -> bool {
        *self == self.relaxed()
    }
}

/// Data about a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagData {
    pub name: String,
    /// SHA of the commit the tag points at.
    pub commit_sha: String,
}

/// A host API effect.
///
/// Effects are repo-scoped: the interpreter is constructed with a `RepoId`,
/// so effects don't include it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEffect {
    // ─── Change Request Queries ───────────────────────────────────────────────
    /// List change requests, most recently updated first.
    ListChangeRequests {
        state: StateFilter,
        /// Only change requests targeting this branch.
        base: Option<String>,
        /// Stop paging once entries were last updated before this instant.
        updated_after: Option<DateTime<Utc>>,
        max_pages: u32,
    },

    /// Fetch a single change request by number.
    GetChangeRequest { number: CrNumber },

    /// Find the open change request from `source` into `target`, if any.
    FindOpenChangeRequest { source: String, target: String },

    /// List the files a change request touches.
    ListChangedFiles { number: CrNumber },

    // ─── Change Request Mutations ─────────────────────────────────────────────
    CreateChangeRequest {
        source: String,
        target: String,
        title: String,
        body: String,
    },

    MergeChangeRequest { number: CrNumber, method: MergeMethod },

    /// Add labels. Existing labels are kept.
    AddLabels { number: CrNumber, labels: Vec<String> },

    PostComment { number: CrNumber, body: String },

    // ─── Branch Settings ──────────────────────────────────────────────────────
    GetMergeGates { branch: String },

    SetMergeGates { branch: String, gates: MergeGates },

    /// Forbid direct pushes to a branch.
    ProtectBranch { branch: String },

    UnprotectBranch { branch: String },

    // ─── Tags ─────────────────────────────────────────────────────────────────
    /// List tags, most recent first.
    ListTags { per_page: u8 },

    /// Commit timestamp of a SHA.
    GetCommitTime { sha: String },

    /// Create an annotated tag and a release carrying `release_body`.
    CreateTag {
        name: String,
        target_ref: String,
        message: String,
        release_body: String,
    },
}

/// Response from a host effect.
///
/// Each variant corresponds to the response from a particular effect type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HostResponse {
    /// Response to `ListChangeRequests`.
    ChangeRequests(Vec<ChangeRequest>),

    /// Response to `GetChangeRequest` and `CreateChangeRequest`.
    ChangeRequest(ChangeRequest),

    /// Response to `FindOpenChangeRequest`.
    MaybeChangeRequest(Option<ChangeRequest>),

    /// Response to `ListChangedFiles`.
    ChangedFiles(Vec<ChangedFile>),

    /// Response to `MergeChangeRequest`.
    Merged,

    /// Response to `AddLabels`.
    LabelsAdded,

    /// Response to `PostComment`.
    CommentPosted { id: CommentId },

    /// Response to `GetMergeGates`.
    MergeGates(MergeGates),

    /// Response to `SetMergeGates`, `ProtectBranch` and `UnprotectBranch`.
    BranchUpdated,

    /// Response to `ListTags`.
    Tags(Vec<TagData>),

    /// Response to `GetCommitTime`.
    CommitTime(DateTime<Utc>),

    /// Response to `CreateTag`.
    TagCreated,
}

impl HostResponse {
    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            HostResponse::ChangeRequests(_) => "change_requests",
            HostResponse::ChangeRequest(_) => "change_request",
            HostResponse::MaybeChangeRequest(_) => "maybe_change_request",
            HostResponse::ChangedFiles(_) => "changed_files",
            HostResponse::Merged => "merged",
            HostResponse::LabelsAdded => "labels_added",
            HostResponse::CommentPosted { .. } => "comment_posted",
            HostResponse::MergeGates(_) => "merge_gates",
            HostResponse::BranchUpdated => "branch_updated",
            HostResponse::Tags(_) => "tags",
            HostResponse::CommitTime(_) => "commit_time",
            HostResponse::TagCreated => "tag_created",
        }
    }
}
