//! Local git operations for release orchestration.
//!
//! Each configured repository has one working clone under
//! `GitConfig::base_dir`. Release preparation fetches into it, inspects
//! remote-tracking branches, and runs a trial merge that is always rolled
//! back. Nothing is ever pushed from here; the host performs the real merge.
//!
//! Commands run with system and user configuration disabled so behaviour
//! does not depend on the machine.

pub mod clone;
pub mod merge;

use std::path::{Path, PathBuf};
use std::process::Output;

use thiserror::Error;

use crate::types::RepoId;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking git task could not be joined.
    #[error("git task failed: {0}")]
    Join(String),
}

pub type GitResult<T> = Result<T, GitError>;

/// Identity used for merge operations, passed via `-c` flags so commits work
/// with global config disabled.
#[derive(Debug, Clone)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct GitConfig {
    /// Directory holding one clone per repository.
    pub base_dir: PathBuf,

    /// Prefix of clone URLs: `{remote_base}/{owner}/{repo}.git`. May carry
    /// credentials, so it is never logged.
    pub remote_base: String,

    pub commit_identity: CommitIdentity,
}

impl GitConfig {
    pub fn clone_dir(&self, repo: &RepoId) -> PathBuf {
        self.base_dir.join(format!("{}-{}", repo.owner, repo.repo))
    }

    pub fn remote_url(&self, repo: &RepoId) -> String {
        format!(
            "{}/{}/{}.git",
            self.remote_base.trim_end_matches('/'),
            repo.owner,
            repo.repo
        )
    }
}

/// `refs/remotes/origin/{branch}` shorthand.
pub fn remote_ref(branch: &str) -> String {
    format!("origin/{branch}")
}

/// Create a git Command with clean environment (no system/user config).
pub(crate) fn git_command(workdir: &Path) -> std::process::Command {
    use std::process::Command;

    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);
    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    // Output is parsed; keep it untranslated.
    cmd.env("LC_ALL", "C");
    cmd
}

/// [`git_command`] with identity configuration for operations that may
/// create commits.
pub(crate) fn git_commit_command(
    workdir: &Path,
    identity: &CommitIdentity,
) -> std::process::Command {
    let mut cmd = git_command(workdir);
    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));
    cmd
}

/// Run a git command in the given working directory.
pub fn run_git_sync(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    let output = git_command(workdir).args(args).output()?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(GitError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Run a git command and return trimmed stdout.
pub fn run_git_stdout(workdir: &Path, args: &[&str]) -> GitResult<String> {
    let output = run_git_sync(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Runs a command whose exit status is a yes/no answer: 0 is `yes`, 1 is
/// `no`, anything else an error.
fn run_git_predicate(workdir: &Path, args: &[&str]) -> GitResult<bool> {
    let output = git_command(workdir).args(args).output()?;
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => Err(GitError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }),
    }
}

/// Check if one commit is an ancestor of another.
pub fn is_ancestor(workdir: &Path, potential_ancestor: &str, descendant: &str) -> GitResult<bool> {
    run_git_predicate(
        workdir,
        &["merge-base", "--is-ancestor", potential_ancestor, descendant],
    )
}

/// True when the trees of `a` and `b` differ.
pub fn has_diff(workdir: &Path, a: &str, b: &str) -> GitResult<bool> {
    // `diff --quiet` exits 1 when there are differences.
    run_git_predicate(workdir, &["diff", "--quiet", a, b]).map(|same| !same)
}

pub fn rev_parse(workdir: &Path, rev: &str) -> GitResult<String> {
    run_git_stdout(workdir, &["rev-parse", rev])
}

/// Runs blocking git work on the blocking thread pool.
pub async fn run_blocking<T, F>(work: F) -> GitResult<T>
where
    F: FnOnce() -> GitResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| GitError::Join(e.to_string()))?
}
