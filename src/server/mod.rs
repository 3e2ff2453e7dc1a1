//! HTTP surface.
//!
//! # Endpoints
//!
//! - `GET /health` - 200 while the process is serving
//! - `GET /api/v1/snapshot` - tracked change requests as JSON
//!   (`?project=owner/repo`, `?unprocessed=true`)
//! - `POST /api/v1/release` - prepare a release from `source` into `target`
//! - `POST /api/v1/hotfix` - tag changes merged straight into `target`
//! - `POST /api/v1/protect` - protect or unprotect a branch
//! - `POST /api/v1/merge` - merge one branch into another
//!
//! `POST` bodies must carry an `X-Signature-256` HMAC of the body made with
//! the command secret. Without a configured secret the command endpoints
//! answer 401.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::chat::ChatClient;
use crate::effects::HostConnector;
use crate::engine::Engine;
use crate::tracker::IssueTracker;

pub mod commands;
pub mod health;
pub mod signature;
pub mod snapshot;

pub use commands::{ApiError, hotfix_handler, merge_handler, protect_handler, release_handler};
pub use health::health_handler;
pub use snapshot::snapshot_handler;

/// Shared handler state.
pub struct AppState<H, T, C> {
    inner: Arc<AppStateInner<H, T, C>>,
}

struct AppStateInner<H, T, C> {
    engine: Engine<H, T, C>,
    command_secret: Option<Vec<u8>>,
}

impl<H, T, C> Clone for AppState<H, T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H, T, C> AppState<H, T, C> {
    pub fn new(engine: Engine<H, T, C>, command_secret: Option<Vec<u8>>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { engine, command_secret }),
        }
    }

    pub fn engine(&self) -> &Engine<H, T, C> {
        &self.inner.engine
    }

    pub fn command_secret(&self) -> Option<&[u8]> {
        self.inner.command_secret.as_deref()
    }
}

pub fn build_router<H, T, C>(app_state: AppState<H, T, C>) -> Router
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/snapshot", get(snapshot_handler::<H, T, C>))
        .route("/api/v1/release", post(release_handler::<H, T, C>))
        .route("/api/v1/hotfix", post(hotfix_handler::<H, T, C>))
        .route("/api/v1/protect", post(protect_handler::<H, T, C>))
        .route("/api/v1/merge", post(merge_handler::<H, T, C>))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
