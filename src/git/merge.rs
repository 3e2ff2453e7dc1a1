//! Trial merges.
//!
//! A trial merge answers "would merging `source` into `target` conflict?"
//! without leaving any trace: the clone is restored to the recorded HEAD on
//! every exit path, including early returns and panics.

use std::path::{Path, PathBuf};

use super::{CommitIdentity, GitError, GitResult, git_command, git_commit_command, rev_parse, run_git_stdout, run_git_sync};

/// Outcome of a trial merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialMerge {
    /// The merge applies cleanly (or there is nothing to merge).
    Clean,
    Conflict { paths: Vec<String> },
}

/// Restores the clone when dropped: aborts any in-progress merge, then hard
/// resets to the HEAD recorded before the merge started.
struct RestoreOnDrop {
    workdir: PathBuf,
    head: String,
}

impl Drop for RestoreOnDrop {
    fn drop(&mut self) {
        // Fails harmlessly when no merge is in progress.
        let _ = git_command(&self.workdir).args(["merge", "--abort"]).output();

        if let Err(e) = run_git_sync(&self.workdir, &["reset", "--hard", "--quiet", &self.head]) {
            tracing::error!(
                workdir = %self.workdir.display(),
                head = %self.head,
                error = %e,
                "failed to restore clone after trial merge"
            );
        }
    }
}

/// Merges `source_ref` into a detached checkout of `target_ref` with
/// `--no-ff --no-commit` and reports whether it conflicts.
///
/// Any failure other than a conflict is returned as an error.
pub fn trial_merge(
    workdir: &Path,
    target_ref: &str,
    source_ref: &str,
    identity: &CommitIdentity,
) -> GitResult<TrialMerge> {
    // Leftovers from an interrupted process would make the checkout fail.
    let _ = git_command(workdir).args(["merge", "--abort"]).output();
    run_git_sync(workdir, &["reset", "--hard", "--quiet"])?;
    run_git_sync(workdir, &["checkout", "--quiet", "--force", "--detach", target_ref])?;

    let head = rev_parse(workdir, "HEAD")?;
    let _restore = RestoreOnDrop {
        workdir: workdir.to_path_buf(),
        head,
    };

    let args = ["merge", "--no-ff", "--no-commit", "--no-edit", source_ref];
    let output = git_commit_command(workdir, identity).args(args).output()?;

    if output.status.success() {
        return Ok(TrialMerge::Clean);
    }

    // Unmerged index entries mark a conflict whatever language git speaks.
    let paths = conflicting_files(workdir)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !paths.is_empty() || stdout.contains("CONFLICT") {
        return Ok(TrialMerge::Conflict { paths });
    }

    Err(GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        stderr: format!("{stdout}{stderr}"),
    })
}

/// Files with unresolved conflicts in the current merge.
fn conflicting_files(workdir: &Path) -> GitResult<Vec<String>> {
    match run_git_stdout(workdir, &["diff", "--name-only", "--diff-filter=U"]) {
        Ok(output) => Ok(output.lines().map(str::to_string).collect()),
        Err(_) => {
            let output = run_git_stdout(workdir, &["ls-files", "-u"])?;
            let mut files: Vec<String> = output
                .lines()
                .filter_map(|line| line.split('\t').nth(1))
                .map(str::to_string)
                .collect();
            files.dedup();
            Ok(files)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::clone::{ensure_clone, fetch_prune};
    use super::super::test_repo::{create_remote, identity};
    use super::*;

    fn status_porcelain(workdir: &Path) -> String {
        run_git_stdout(workdir, &["status", "--porcelain"]).unwrap()
    }

    #[test]
    fn clean_merge_leaves_no_residue() {
        let remote = create_remote();
        remote.branch_from("dev", "master");
        remote.commit_to("dev", "dev", "feature.txt", "new\n");

        let clone = ensure_clone(&remote.config, &remote.repo).unwrap();
        fetch_prune(&clone).unwrap();
        let master = rev_parse(&clone, "origin/master").unwrap();

        let result = trial_merge(&clone, "origin/master", "origin/dev", &identity()).unwrap();

        assert_eq!(result, TrialMerge::Clean);
        assert_eq!(rev_parse(&clone, "HEAD").unwrap(), master);
        assert_eq!(status_porcelain(&clone), "");
        assert!(!clone.join("feature.txt").exists());
        assert!(!clone.join(".git").join("MERGE_HEAD").exists());
    }

    #[test]
    fn conflict_is_reported_and_leaves_no_residue() {
        let remote = create_remote();
        remote.commit_to("master", "master", "shared.txt", "base\n");
        remote.branch_from("dev", "master");
        remote.commit_to("dev", "dev", "shared.txt", "dev side\n");
        remote.commit_to("master", "master", "shared.txt", "master side\n");

        let clone = ensure_clone(&remote.config, &remote.repo).unwrap();
        fetch_prune(&clone).unwrap();
        let master = rev_parse(&clone, "origin/master").unwrap();

        let result = trial_merge(&clone, "origin/master", "origin/dev", &identity()).unwrap();

        assert_eq!(
            result,
            TrialMerge::Conflict {
                paths: vec!["shared.txt".to_string()]
            }
        );
        assert_eq!(rev_parse(&clone, "HEAD").unwrap(), master);
        assert_eq!(status_porcelain(&clone), "");
        assert_eq!(
            std::fs::read_to_string(clone.join("shared.txt")).unwrap(),
            "master side\n"
        );
        assert!(!clone.join(".git").join("MERGE_HEAD").exists());
    }

    #[test]
    fn nothing_to_merge_is_clean() {
        let remote = create_remote();
        remote.branch_from("dev", "master");
        let clone = ensure_clone(&remote.config, &remote.repo).unwrap();
        fetch_prune(&clone).unwrap();

        let result = trial_merge(&clone, "origin/master", "origin/dev", &identity()).unwrap();
        assert_eq!(result, TrialMerge::Clean);
    }

    #[test]
    fn unknown_ref_is_an_error_not_a_conflict() {
        let remote = create_remote();
        let clone = ensure_clone(&remote.config, &remote.repo).unwrap();
        fetch_prune(&clone).unwrap();

        let result = trial_merge(&clone, "origin/master", "origin/missing", &identity());
        assert!(matches!(result, Err(GitError::CommandFailed { .. })));
        assert_eq!(status_porcelain(&clone), "");
    }
}
