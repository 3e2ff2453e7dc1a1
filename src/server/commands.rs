//! Operator command endpoints: release, hotfix, protect and merge.
//!
//! Every request body is JSON signed with the shared command secret (see
//! [`super::signature`]). Commands run synchronously: the response carries
//! the outcome, and anything deferred (tag creation) is already queued when
//! it is sent.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use super::AppState;
use super::signature::{SIGNATURE_HEADER, verify_signature};
use crate::chat::ChatClient;
use crate::effects::HostConnector;
use crate::release::{ReleaseError, ReleaseOptions, ReleaseOutcome};
use crate::store::StoreError;
use crate::tracker::IssueTracker;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("command API is disabled: no command secret is configured")]
    Disabled,

    #[error("missing required header: x-signature-256")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error("failed to read state: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Disabled | ApiError::MissingSignature | ApiError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Release(e) => release_status(e),
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn release_status(err: &ReleaseError) -> StatusCode {
    match err {
        ReleaseError::NothingToRelease
        | ReleaseError::ProtectedBranchViolation { .. }
        | ReleaseError::MergeConflict { .. } => StatusCode::CONFLICT,
        ReleaseError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        e if e.is_user_correctable() => StatusCode::BAD_REQUEST,
        e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "command failed");
        } else {
            warn!(%status, error = %self, "command rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub project: String,
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub options: ReleaseOptions,
}

#[derive(Debug, Deserialize)]
pub struct HotfixRequest {
    pub project: String,
    pub target: String,
    #[serde(flatten)]
    pub options: ReleaseOptions,
}

#[derive(Debug, Deserialize)]
pub struct ProtectRequest {
    pub project: String,
    pub branch: String,
    pub protect: bool,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub project: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeResponse {
    pub url: String,
}

/// Checks the signature over the raw body, then parses it.
fn verified<B: DeserializeOwned>(secret: Option<&[u8]>, headers: &HeaderMap, body: &[u8]) -> Result<B, ApiError> {
    let secret = secret.ok_or(ApiError::Disabled)?;
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingSignature)?;
    if !verify_signature(body, header, secret) {
        return Err(ApiError::InvalidSignature);
    }
    Ok(serde_json::from_slice(body)?)
}

pub async fn release_handler<H, T, C>(
    State(state): State<AppState<H, T, C>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReleaseOutcome>, ApiError>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    let request: ReleaseRequest = verified(state.command_secret(), &headers, &body)?;
    info!(project = %request.project, source = %request.source, target = %request.target, "release requested");
    let outcome = state
        .engine()
        .release_with(&request.project, &request.source, &request.target, &request.options)
        .await?;
    Ok(Json(outcome))
}

pub async fn hotfix_handler<H, T, C>(
    State(state): State<AppState<H, T, C>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReleaseOutcome>, ApiError>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    let request: HotfixRequest = verified(state.command_secret(), &headers, &body)?;
    info!(project = %request.project, target = %request.target, "hotfix requested");
    let outcome = state
        .engine()
        .hotfix_with(&request.project, &request.target, &request.options)
        .await?;
    Ok(Json(outcome))
}

pub async fn protect_handler<H, T, C>(
    State(state): State<AppState<H, T, C>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    let request: ProtectRequest = verified(state.command_secret(), &headers, &body)?;
    state
        .engine()
        .protect_branch(&request.project, &request.branch, request.protect)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn merge_handler<H, T, C>(
    State(state): State<AppState<H, T, C>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MergeResponse>, ApiError>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    let request: MergeRequest = verified(state.command_secret(), &headers, &body)?;
    info!(project = %request.project, source = %request.source, target = %request.target, "merge requested");
    let url = state
        .engine()
        .merge_branches(&request.project, &request.source, &request.target)
        .await?;
    Ok(Json(MergeResponse { url }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostApiError;

    #[test]
    fn release_errors_map_to_statuses() {
        let cases = [
            (ReleaseError::NothingToRelease, StatusCode::CONFLICT),
            (
                ReleaseError::BranchNotFound {
                    branch: "staging".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (ReleaseError::ProjectNotFound("web".to_string()), StatusCode::BAD_REQUEST),
            (
                ReleaseError::PermissionDenied {
                    settings_url: "https://github.com/acme/app/settings/access".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                ReleaseError::Host(HostApiError::transient_without_source("502")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ReleaseError::Host(HostApiError::permanent_without_source("422")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::Release(err).status(), status);
        }
    }

    #[test]
    fn request_options_are_optional() {
        let request: ReleaseRequest =
            serde_json::from_str(r#"{"project":"app","source":"dev","target":"master"}"#).unwrap();
        assert_eq!(request.options, ReleaseOptions::default());

        let request: HotfixRequest = serde_json::from_str(
            r#"{"project":"app","target":"master","approve":true,"change_log":"notes"}"#,
        )
        .unwrap();
        assert!(request.options.approve);
        assert_eq!(request.options.change_log.as_deref(), Some("notes"));
    }
}
