//! Core domain types.
//!
//! Identifiers and the host-side view of a change request.

pub mod change_request;
pub mod ids;

pub use change_request::{ChangeRequest, ChangedFile, CrState};
pub use ids::{ChangeRequestId, CommentId, CrNumber, InvalidRepoId, RepoId};
