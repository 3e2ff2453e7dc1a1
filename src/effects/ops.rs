//! Typed wrappers around [`HostInterpreter::interpret`].
//!
//! Each function issues one effect and unpacks the matching response variant.
//! A response of the wrong shape is an interpreter bug and surfaces as a
//! permanent error.

use chrono::{DateTime, Utc};

use crate::host::HostApiError;
use crate::types::{ChangeRequest, ChangedFile, CommentId, CrNumber};

use super::host::{HostEffect, HostResponse, MergeGates, MergeMethod, StateFilter, TagData};
use super::interpreter::HostInterpreter;

macro_rules! expect_response {
    ($effect:literal, $response:expr, $pattern:pat => $value:expr) => {
        match $response {
            $pattern => Ok($value),
            other => Err(HostApiError::unexpected_response($effect, other.kind())),
        }
    };
}

pub async fn list_change_requests<I: HostInterpreter + Sync>(
    host: &I,
    state: StateFilter,
    base: Option<&str>,
    updated_after: Option<DateTime<Utc>>,
    max_pages: u32,
) -> Result<Vec<ChangeRequest>, HostApiError> {
    let response = host
        .interpret(HostEffect::ListChangeRequests {
            state,
            base: base.map(str::to_string),
            updated_after,
            max_pages,
        })
        .await?;
    expect_response!("list_change_requests", response, HostResponse::ChangeRequests(crs) => crs)
}

pub async fn get_change_request<I: HostInterpreter + Sync>(
    host: &I,
    number: CrNumber,
) -> Result<ChangeRequest, HostApiError> {
    let response = host
        .interpret(HostEffect::GetChangeRequest { number })
        .await?;
    expect_response!("get_change_request", response, HostResponse::ChangeRequest(cr) => cr)
}

pub async fn find_open_change_request<I: HostInterpreter + Sync>(
    host: &I,
    source: &str,
    target: &str,
) -> Result<Option<ChangeRequest>, HostApiError> {
    let response = host
        .interpret(HostEffect::FindOpenChangeRequest {
            source: source.to_string(),
            target: target.to_string(),
        })
        .await?;
    expect_response!("find_open_change_request", response, HostResponse::MaybeChangeRequest(cr) => cr)
}

pub async fn list_changed_files<I: HostInterpreter + Sync>(
    host: &I,
    number: CrNumber,
) -> Result<Vec<ChangedFile>, HostApiError> {
    let response = host
        .interpret(HostEffect::ListChangedFiles { number })
        .await?;
    expect_response!("list_changed_files", response, HostResponse::ChangedFiles(files) => files)
}

pub async fn create_change_request<I: HostInterpreter + Sync>(
    host: &I,
    source: &str,
    target: &str,
    title: &str,
    body: &str,
) -> Result<ChangeRequest, HostApiError> {
    let response = host
        .interpret(HostEffect::CreateChangeRequest {
            source: source.to_string(),
            target: target.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        })
        .await?;
    expect_response!("create_change_request", response, HostResponse::ChangeRequest(cr) => cr)
}

pub async fn merge_change_request<I: HostInterpreter + Sync>(
    host: &I,
    number: CrNumber,
    method: MergeMethod,
) -> Result<(), HostApiError> {
    let response = host
        .interpret(HostEffect::MergeChangeRequest { number, method })
        .await?;
    expect_response!("merge_change_request", response, HostResponse::Merged => ())
}

pub async fn add_labels<I: HostInterpreter + Sync>(
    host: &I,
    number: CrNumber,
    labels: Vec<String>,
) -> Result<(), HostApiError> {
    let response = host
        .interpret(HostEffect::AddLabels { number, labels })
        .await?;
    expect_response!("add_labels", response, HostResponse::LabelsAdded => ())
}

pub async fn post_comment<I: HostInterpreter + Sync>(
    host: &I,
    number: CrNumber,
    body: impl Into<String>,
) -> Result<CommentId, HostApiError> {
    let response = host
        .interpret(HostEffect::PostComment {
            number,
            body: body.into(),
        })
        .await?;
    expect_response!("post_comment", response, HostResponse::CommentPosted { id } => id)
}

pub async fn get_merge_gates<I: HostInterpreter + Sync>(
    host: &I,
    branch: &str,
) -> Result<MergeGates, HostApiError> {
    let response = host
        .interpret(HostEffect::GetMergeGates {
            branch: branch.to_string(),
        })
        .await?;
    expect_response!("get_merge_gates", response, HostResponse::MergeGates(gates) => gates)
}

pub async fn set_merge_gates<I: HostInterpreter + Sync>(
    host: &I,
    branch: &str,
    gates: MergeGates,
) -> Result<(), HostApiError> {
    let response = host
        .interpret(HostEffect::SetMergeGates {
            branch: branch.to_string(),
            gates,
        })
        .await?;
    expect_response!("set_merge_gates", response, HostResponse::BranchUpdated => ())
}

pub async fn set_branch_protection<I: HostInterpreter + Sync>(
    host: &I,
    branch: &str,
    protected: bool,
) -> Result<(), HostApiError> {
    let branch = branch.to_string();
    let effect = if protected {
        HostEffect::ProtectBranch { branch }
    } else {
        HostEffect::UnprotectBranch { branch }
    };
    let response = host.interpret(effect).await?;
    expect_response!("set_branch_protection", response, HostResponse::BranchUpdated => ())
}

pub async fn list_tags<I: HostInterpreter + Sync>(
    host: &I,
    per_page: u8,
) -> Result<Vec<TagData>, HostApiError> {
    let response = host.interpret(HostEffect::ListTags { per_page }).await?;
    expect_response!("list_tags", response, HostResponse::Tags(tags) => tags)
}

pub async fn commit_time<I: HostInterpreter + Sync>(
    host: &I,
    sha: &str,
) -> Result<DateTime<Utc>, HostApiError> {
    let response = host
        .interpret(HostEffect::GetCommitTime {
            sha: sha.to_string(),
        })
        .await?;
    expect_response!("get_commit_time", response, HostResponse::CommitTime(at) => at)
}

pub async fn create_tag<I: HostInterpreter + Sync>(
    host: &I,
    name: &str,
    target_ref: &str,
    message: &str,
    release_body: &str,
) -> Result<(), HostApiError> {
    let response = host
        .interpret(HostEffect::CreateTag {
            name: name.to_string(),
            target_ref: target_ref.to_string(),
            message: message.to_string(),
            release_body: release_body.to_string(),
        })
        .await?;
    expect_response!("create_tag", response, HostResponse::TagCreated => ())
}
