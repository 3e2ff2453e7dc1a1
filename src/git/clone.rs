//! Per-repository working clones.

use std::path::{Path, PathBuf};

use crate::types::RepoId;

use super::{GitConfig, GitError, GitResult, git_command, run_git_predicate, run_git_sync};

/// Makes sure the repository's clone exists and points at the configured
/// remote, cloning on first use. Returns the clone's path.
pub fn ensure_clone(config: &GitConfig, repo: &RepoId) -> GitResult<PathBuf> {
    let dir = config.clone_dir(repo);
    let url = config.remote_url(repo);

    if dir.join(".git").exists() {
        run_git_sync(&dir, &["remote", "set-url", "origin", &url])
            .map_err(|e| redact(e, &url))?;
        return Ok(dir);
    }

    std::fs::create_dir_all(&config.base_dir)?;
    let Some(dir_str) = dir.to_str() else {
        return Err(GitError::CommandFailed {
            command: "git clone".to_string(),
            stderr: format!("clone path is not valid UTF-8: {}", dir.display()),
        });
    };
    let output = git_command(&config.base_dir)
        .args(["clone", "--quiet", &url, dir_str])
        .output()?;
    if !output.status.success() {
        return Err(GitError::CommandFailed {
            command: format!("git clone <{}>", repo),
            stderr: String::from_utf8_lossy(&output.stderr).replace(&url, "<remote>"),
        });
    }

    tracing::info!(repo = %repo, path = %dir.display(), "cloned repository");
    Ok(dir)
}

/// The remote URL can carry a token; keep it out of error messages.
fn redact(err: GitError, url: &str) -> GitError {
    match err {
        GitError::CommandFailed { stderr, .. } => GitError::CommandFailed {
            command: "git remote set-url origin <remote>".to_string(),
            stderr: stderr.replace(url, "<remote>"),
        },
        other => other,
    }
}

/// Fetches every branch from origin, dropping remote-tracking refs for
/// branches that no longer exist.
pub fn fetch_prune(workdir: &Path) -> GitResult<()> {
    run_git_sync(workdir, &["fetch", "--prune", "--quiet", "origin"])?;
    Ok(())
}

/// True when `origin/{branch}` exists after the last fetch.
pub fn remote_branch_exists(workdir: &Path, branch: &str) -> GitResult<bool> {
    run_git_predicate(
        workdir,
        &[
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/remotes/origin/{branch}"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_repo::create_remote;
    use super::*;

    #[test]
    fn clones_once_then_reuses() {
        let remote = create_remote();

        let first = ensure_clone(&remote.config, &remote.repo).unwrap();
        assert!(first.join(".git").exists());
        let second = ensure_clone(&remote.config, &remote.repo).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fetch_sees_new_and_deleted_branches() {
        let remote = create_remote();
        let clone = ensure_clone(&remote.config, &remote.repo).unwrap();

        assert!(remote_branch_exists(&clone, "master").unwrap());
        assert!(!remote_branch_exists(&clone, "dev").unwrap());

        remote.branch_from("dev", "master");
        fetch_prune(&clone).unwrap();
        assert!(remote_branch_exists(&clone, "dev").unwrap());

        run_git_sync(&remote.work, &["push", "origin", "--delete", "dev"]).unwrap();
        fetch_prune(&clone).unwrap();
        assert!(!remote_branch_exists(&clone, "dev").unwrap());
    }

    #[test]
    fn clone_failure_does_not_leak_url() {
        let mut remote = create_remote();
        remote.config.remote_base = "/definitely/not/here?token=secret".to_string();
        let err = ensure_clone(&remote.config, &remote.repo).unwrap_err();
        assert!(!err.to_string().contains("secret"), "{err}");
    }
}
