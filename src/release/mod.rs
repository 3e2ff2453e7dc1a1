//! Release orchestration: tags, release change requests, and branch
//! housekeeping commands.

pub mod gates;
pub mod orchestrator;
pub mod tag;

use thiserror::Error;

use crate::config::ProjectLookupError;
use crate::git::GitError;
use crate::host::{HostApiError, HostErrorKind};
use crate::store::StoreError;

pub use gates::MergeGateGuard;
pub use orchestrator::{ReleaseOptions, ReleaseOutcome};

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("nothing to release: no merged change requests and no difference between the branches")]
    NothingToRelease,

    #[error("branch {branch} does not exist on the remote")]
    BranchNotFound { branch: String },

    #[error("no configured project matches {0:?}")]
    ProjectNotFound(String),

    #[error("{name:?} matches several projects, use one of: {}", .candidates.join(", "))]
    AmbiguousProjectMatch { name: String, candidates: Vec<String> },

    #[error("{branch} is a long-lived branch and cannot be unprotected")]
    ProtectedBranchViolation { branch: String },

    #[error("{source_branch} and {target_branch} conflict, resolve manually: {}", .paths.join(", "))]
    MergeConflict {
        source_branch: String,
        target_branch: String,
        paths: Vec<String>,
    },

    #[error("the automation account lacks access to the repository, grant it at {settings_url}")]
    PermissionDenied { settings_url: String },

    #[error(transparent)]
    Host(#[from] HostApiError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReleaseError {
    /// Errors the operator can fix by changing the request.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            ReleaseError::NothingToRelease
                | ReleaseError::BranchNotFound { .. }
                | ReleaseError::ProjectNotFound(_)
                | ReleaseError::AmbiguousProjectMatch { .. }
                | ReleaseError::ProtectedBranchViolation { .. }
        )
    }

    /// Failures that may go away on their own. Local git failures other than
    /// conflicts count, since they are almost always network or lock trouble.
    pub fn is_transient(&self) -> bool {
        match self {
            ReleaseError::Host(e) => e.kind == HostErrorKind::Transient,
            ReleaseError::Git(_) => true,
            _ => false,
        }
    }
}

impl From<ProjectLookupError> for ReleaseError {
    fn from(err: ProjectLookupError) -> Self {
        match err {
            ProjectLookupError::NotFound(name) => ReleaseError::ProjectNotFound(name),
            ProjectLookupError::Ambiguous { name, candidates } => {
                ReleaseError::AmbiguousProjectMatch { name, candidates }
            }
        }
    }
}
