//! Effect interpreter traits.
//!
//! The trait-based design keeps orchestration logic independent of the host:
//! production code runs effects through octocrab, tests through an in-memory
//! mock that records every effect it saw.

use std::future::Future;

use crate::host::HostApiError;
use crate::types::RepoId;

use super::host::{HostEffect, HostResponse};

/// Interprets host effects against a source-control host.
///
/// Implementations are constructed with a `RepoId`, so all effects executed
/// through a single interpreter instance are scoped to that repository.
pub trait HostInterpreter {
    /// Execute a host effect and return its response.
    fn interpret(
        &self,
        effect: HostEffect,
    ) -> impl Future<Output = Result<HostResponse, HostApiError>> + Send;
}

/// Produces repository-scoped interpreters.
///
/// The engine serves many repositories; it holds one connector and asks it
/// for an interpreter whenever it acts on a particular repository.
pub trait HostConnector: Clone + Send + Sync + 'static {
    type Client: HostInterpreter + Send + Sync + 'static;

    fn connect(&self, repo: &RepoId) -> Self::Client;
}
