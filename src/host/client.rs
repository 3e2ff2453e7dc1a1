//! Octocrab client wrapper scoped to a specific repository.
//!
//! Effects are repo-scoped (the `HostEffect` enum doesn't include repo info),
//! so every interpreter instance carries the repository it talks to.
//! `OctocrabConnector` hands out such instances for any configured repository.

use octocrab::Octocrab;

use crate::effects::HostConnector;
use crate::types::RepoId;

use super::retry::{RetryConfig, RetryPolicy};

/// A GitHub API client scoped to a specific repository.
#[derive(Clone)]
pub struct OctocrabClient {
    client: Octocrab,
    repo: RepoId,
    pub(super) retry_config: RetryConfig,
    pub(super) retry_policy: RetryPolicy,
}

impl OctocrabClient {
    pub fn new(client: Octocrab, repo: RepoId) -> Self {
        Self {
            client,
            repo,
            retry_config: RetryConfig::DEFAULT,
            retry_policy: RetryPolicy::RetryTransient,
        }
    }

    pub fn inner(&self) -> &Octocrab {
        &self.client
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn owner(&self) -> &str {
        &self.repo.owner
    }

    pub fn repo_name(&self) -> &str {
        &self.repo.repo
    }

    /// `/repos/{owner}/{repo}` followed by `suffix`.
    pub(super) fn route(&self, suffix: &str) -> String {
        format!(
            "/repos/{}/{}{}",
            urlencoding::encode(self.owner()),
            urlencoding::encode(self.repo_name()),
            suffix
        )
    }
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabClient")
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

/// Produces repository-scoped [`OctocrabClient`]s sharing one authenticated
/// octocrab instance.
#[derive(Clone)]
pub struct OctocrabConnector {
    client: Octocrab,
}

impl OctocrabConnector {
    pub fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Creates a connector authenticated with a personal access token.
    pub fn from_token(token: impl Into<String>) -> Result<Self, octocrab::Error> {
        let client = Octocrab::builder().personal_token(token.into()).build()?;
        Ok(Self::new(client))
    }
}

impl HostConnector for OctocrabConnector {
    type Client = OctocrabClient;

    fn connect(&self, repo: &RepoId) -> OctocrabClient {
        OctocrabClient::new(self.client.clone(), repo.clone())
    }
}

impl std::fmt::Debug for OctocrabConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabConnector").finish_non_exhaustive()
    }
}
