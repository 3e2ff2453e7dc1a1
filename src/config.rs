//! Runtime configuration.
//!
//! Non-secret settings come from a JSON file (`MERGE_WARDEN_CONFIG`, default
//! `merge-warden.json`); every field has a default so a minimal file only
//! lists projects. Secrets come from the environment and never touch disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::git::{CommitIdentity, GitConfig};
use crate::types::RepoId;

pub const CONFIG_PATH_ENV: &str = "MERGE_WARDEN_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "merge-warden.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Chat rooms that receive a project's merge notifications.
///
/// A rule matches when `target_branch` is a substring of the change
/// request's target branch and `source_branch` is empty or a substring of
/// its source branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRule {
    pub room: String,
    pub target_branch: String,
    #[serde(default)]
    pub source_branch: String,
}

impl RoomRule {
    pub fn matches(&self, source: &str, target: &str) -> bool {
        target.contains(&self.target_branch)
            && (self.source_branch.is_empty() || source.contains(&self.source_branch))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub repo: RepoId,
    /// Label change requests and link them to tickets.
    #[serde(default)]
    pub ticket_linking: bool,
    #[serde(default)]
    pub rooms: Vec<RoomRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub base_url: String,
    pub user: String,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            base_url: "https://jira.example.com".to_string(),
            user: "merge-warden".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub base_url: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            base_url: "https://open.feishu.cn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    /// Clone URL prefix; `{remote_base}/{owner}/{repo}.git`.
    pub remote_base: String,
    pub committer_name: String,
    pub committer_email: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            remote_base: "https://github.com".to_string(),
            committer_name: "merge-warden".to_string(),
            committer_email: "merge-warden@users.noreply.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,

    /// Holds the store file and the repository clones.
    pub state_dir: PathBuf,

    /// Logins of bot accounts. Their change requests get no ticket checks and
    /// no notifications; the first entry is the identity that opens release
    /// change requests.
    pub automation_users: Vec<String>,

    /// Long-lived branches. They cannot be unprotected, and merges between
    /// two of them in the same repository need no ticket.
    pub protected_branches: Vec<String>,

    /// Change requests from this branch are releases and are not linked.
    pub release_branch: String,

    /// Case-insensitive text in a description that skips ticket checks.
    pub skip_marker: String,

    /// Page limit for the per-tick change request listing.
    pub listing_max_pages: u32,

    /// How far back release notes look when there is no previous release.
    pub release_window_days: i64,

    pub projects: Vec<ProjectConfig>,

    /// Host login to chat user id, for mentions.
    pub directory: BTreeMap<String, String>,

    /// Template lines stripped from descriptions before they go into a card.
    pub description_noise: Vec<String>,

    pub tracker: TrackerSettings,
    pub chat: ChatSettings,
    pub git: GitSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            state_dir: PathBuf::from("/var/lib/merge-warden"),
            automation_users: vec!["merge-warden[bot]".to_string()],
            protected_branches: vec!["dev".to_string(), "freeze".to_string(), "master".to_string()],
            release_branch: "master".to_string(),
            skip_marker: "skip ticket-check".to_string(),
            listing_max_pages: 3,
            release_window_days: 14,
            projects: Vec::new(),
            directory: BTreeMap::new(),
            description_noise: Vec::new(),
            tracker: TrackerSettings::default(),
            chat: ChatSettings::default(),
            git: GitSettings::default(),
        }
    }
}

/// Failure to resolve a user-supplied project name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectLookupError {
    #[error("no configured project matches {0:?}")]
    NotFound(String),

    #[error("{name:?} matches several projects: {candidates:?}")]
    Ambiguous { name: String, candidates: Vec<String> },
}

impl Config {
    /// Loads from `MERGE_WARDEN_CONFIG` or `merge-warden.json`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(Path::new(&path))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.automation_users.is_empty() {
            return Err(ConfigError::Invalid(
                "automation_users must name at least the bot account".to_string(),
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for project in &self.projects {
            if !seen.insert(&project.repo) {
                return Err(ConfigError::Invalid(format!(
                    "project {} is listed twice",
                    project.repo
                )));
            }
        }
        if self.listing_max_pages == 0 {
            return Err(ConfigError::Invalid("listing_max_pages must be positive".to_string()));
        }
        Ok(())
    }

    /// The project for a repository as the host reports it, ignoring case.
    pub fn project(&self, repo: &RepoId) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.repo.same_as(repo))
    }

    /// Finds a project by `owner/repo` or by bare repository name, ignoring
    /// case. A bare name shared by several owners is ambiguous.
    pub fn resolve_project(&self, name: &str) -> Result<&ProjectConfig, ProjectLookupError> {
        let name = name.trim();
        if let Some(exact) = self
            .projects
            .iter()
            .find(|p| p.repo.to_string().eq_ignore_ascii_case(name))
        {
            return Ok(exact);
        }

        let matches: Vec<&ProjectConfig> = self
            .projects
            .iter()
            .filter(|p| p.repo.repo.eq_ignore_ascii_case(name))
            .collect();
        match matches.as_slice() {
            [] => Err(ProjectLookupError::NotFound(name.to_string())),
            [only] => Ok(only),
            many => Err(ProjectLookupError::Ambiguous {
                name: name.to_string(),
                candidates: many.iter().map(|p| p.repo.to_string()).collect(),
            }),
        }
    }

    pub fn is_automation(&self, login: &str) -> bool {
        self.automation_users
            .iter()
            .any(|u| u.eq_ignore_ascii_case(login))
    }

    /// The identity release change requests are opened as.
    pub fn bot_login(&self) -> &str {
        self.automation_users.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_protected(&self, branch: &str) -> bool {
        self.protected_branches.iter().any(|b| b == branch)
    }

    pub fn store_path(&self) -> PathBuf {
        self.state_dir.join("store.json")
    }

    /// Git settings for the clone directory, authenticating HTTPS remotes
    /// with the host token.
    pub fn git_config(&self, host_token: Option<&str>) -> GitConfig {
        let remote_base = match (host_token, self.git.remote_base.strip_prefix("https://")) {
            (Some(token), Some(rest)) => format!("https://x-access-token:{token}@{rest}"),
            _ => self.git.remote_base.clone(),
        };
        GitConfig {
            base_dir: self.state_dir.join("repos"),
            remote_base,
            commit_identity: CommitIdentity {
                name: self.git.committer_name.clone(),
                email: self.git.committer_email.clone(),
            },
        }
    }
}

/// Credentials read from the environment.
#[derive(Clone)]
pub struct Secrets {
    pub github_token: String,
    pub tracker_token: String,
    pub chat_token: String,
    /// HMAC key for the command endpoints. Commands are rejected when unset.
    pub command_secret: Option<Vec<u8>>,
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        let required = |name: &'static str| std::env::var(name).map_err(|_| ConfigError::MissingEnv(name));
        Ok(Self {
            github_token: required("GITHUB_TOKEN")?,
            tracker_token: std::env::var("TRACKER_TOKEN").unwrap_or_default(),
            chat_token: std::env::var("CHAT_TOKEN").unwrap_or_default(),
            command_secret: std::env::var("MERGE_WARDEN_COMMAND_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .map(String::into_bytes),
        })
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("command_secret_set", &self.command_secret.is_some())
            .finish_non_exhaustive()
    }
}
