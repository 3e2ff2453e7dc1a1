//! Read-only view of the change request snapshot.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use super::AppState;
use super::commands::ApiError;
use crate::chat::ChatClient;
use crate::effects::HostConnector;
use crate::reconcile::snapshot::SnapshotEntry;
use crate::tracker::IssueTracker;

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    /// Only entries of this repository (`owner/repo`).
    pub project: Option<String>,
    /// Only entries still awaiting dispatch.
    #[serde(default)]
    pub unprocessed: bool,
}

/// `GET /api/v1/snapshot`: every tracked change request, in id order.
pub async fn snapshot_handler<H, T, C>(
    State(state): State<AppState<H, T, C>>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<Vec<SnapshotEntry>>, ApiError>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    let snapshot = state.engine().snapshot()?;
    let entries = snapshot
        .entries()
        .filter(|e| !query.unprocessed || !e.processed)
        .filter(|e| {
            query
                .project
                .as_deref()
                .is_none_or(|p| e.project.to_string().eq_ignore_ascii_case(p))
        })
        .cloned()
        .collect();
    Ok(Json(entries))
}
