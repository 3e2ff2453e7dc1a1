//! Release, hotfix, branch merge and protection commands.
//!
//! A release merges `source` into `target` through a change request and tags
//! the result once it lands:
//!
//! 1. fetch the project's clone and check both branches exist
//! 2. collect release notes from change requests merged into `source` since
//!    the previous release
//! 3. trial-merge locally so conflicts are reported before anything is
//!    created on the host
//! 4. allocate the tag, open (or reuse) the release change request
//! 5. optionally merge it with the target's gates relaxed
//! 6. start a confirmation chain that creates the tag once merged
//!
//! Git work runs on the blocking pool while holding the engine's git lock.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::chat::ChatClient;
use crate::config::ProjectConfig;
use crate::confirm::{ConfirmTarget, TerminalAction};
use crate::effects::{HostConnector, HostInterpreter, MergeMethod, StateFilter, ops};
use crate::engine::Engine;
use crate::git::{self, clone, merge::TrialMerge, remote_ref};
use crate::host::{HostApiError, HostErrorKind};
use crate::tracker::IssueTracker;
use crate::types::{ChangeRequest, RepoId};

use super::gates::MergeGateGuard;
use super::{ReleaseError, tag};

/// Release notes body when the branches differ only by direct pushes.
pub const NO_CHANGE_REQUESTS_NOTE: &str = "> This release contains no change requests";

/// Tags fetched when allocating a name; enough to cover any one day.
const TAG_PAGE: u8 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReleaseOptions {
    /// Merge the release change request immediately, relaxing the target's
    /// merge gates for the duration of the merge.
    #[serde(default)]
    pub approve: bool,
    /// Release notes to use instead of the generated ones.
    #[serde(default)]
    pub change_log: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseOutcome {
    pub tag: String,
    pub url: String,
}

fn release_title(tag: &str, at: DateTime<Utc>, source: &str, target: &str) -> String {
    format!(
        "Release {tag} at {} ({source} to {target})",
        at.format("%Y-%m-%d %H:%M")
    )
}

fn note_line(cr: &ChangeRequest) -> String {
    format!("- {} (#{} @{})", cr.title, cr.number.0, cr.author)
}

fn settings_url(repo: &RepoId) -> String {
    format!("https://github.com/{repo}/settings/access")
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

impl<H, T, C> Engine<H, T, C>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    pub async fn release(
        &self,
        project: &str,
        source: &str,
        target: &str,
        approve: bool,
    ) -> Result<ReleaseOutcome, ReleaseError> {
        let options = ReleaseOptions {
            approve,
            change_log: None,
        };
        self.release_with(project, source, target, &options).await
    }

    #[instrument(skip(self, options), fields(approve = options.approve))]
    pub async fn release_with(
        &self,
        project: &str,
        source: &str,
        target: &str,
        options: &ReleaseOptions,
    ) -> Result<ReleaseOutcome, ReleaseError> {
        let project = self.config().resolve_project(project)?.clone();
        let _git = self.lock_git().await;
        let workdir = self.fetch_branches(&project.repo, &[source, target]).await?;
        let client = Arc::new(self.host().connect(&project.repo));

        let description = match non_empty(options.change_log.as_deref()) {
            Some(notes) => notes,
            None => {
                let since = self.last_release_by_change_request(client.as_ref(), target).await?;
                let merged = self.merged_since(client.as_ref(), source, since).await?;
                let lines: Vec<String> = merged.iter().map(note_line).collect();
                if lines.is_empty() {
                    let (source_ref, target_ref) = (remote_ref(source), remote_ref(target));
                    let dir = workdir.clone();
                    let differs = git::run_blocking(move || git::has_diff(&dir, &source_ref, &target_ref)).await?;
                    if !differs {
                        return Err(ReleaseError::NothingToRelease);
                    }
                    NO_CHANGE_REQUESTS_NOTE.to_string()
                } else {
                    lines.join("\n")
                }
            }
        };

        let method = self.check_mergeable(&workdir, source, target).await?;

        let tag = self.allocate_tag(client.as_ref()).await?;
        let title = release_title(&tag, self.now(), source, target);
        let cr = self
            .open_change_request(client.as_ref(), &project, source, target, &title, &description)
            .await?;

        if options.approve
            && let Err(e) = self.force_merge(Arc::clone(&client), &cr, method).await
        {
            warn!(number = %cr.number, error = %e, "approved merge failed, tag waits for a manual merge");
        }

        self.start_confirmation(ConfirmTarget {
            repo: project.repo.clone(),
            number: cr.number,
            action: TerminalAction::CreateTag {
                tag: tag.clone(),
                target_ref: target.to_string(),
                description,
            },
        })?;

        info!(repo = %project.repo, %tag, number = %cr.number, "release prepared");
        Ok(ReleaseOutcome { tag, url: cr.web_url })
    }

    /// Tags changes that were merged straight into `target`. The most
    /// recently merged of them anchors the confirmation; no change request is
    /// created. `approve` is accepted for symmetry with [`Self::release`].
    pub async fn hotfix(&self, project: &str, target: &str, approve: bool) -> Result<ReleaseOutcome, ReleaseError> {
        let options = ReleaseOptions {
            approve,
            change_log: None,
        };
        self.hotfix_with(project, target, &options).await
    }

    #[instrument(skip(self, options))]
    pub async fn hotfix_with(
        &self,
        project: &str,
        target: &str,
        options: &ReleaseOptions,
    ) -> Result<ReleaseOutcome, ReleaseError> {
        let project = self.config().resolve_project(project)?.clone();
        {
            let _git = self.lock_git().await;
            self.fetch_branches(&project.repo, &[target]).await?;
        }
        let client = self.host().connect(&project.repo);

        let tags = ops::list_tags(&client, TAG_PAGE).await?;
        let latest = tags
            .iter()
            .filter_map(|t| tag::parse(&t.name).map(|key| (key, t)))
            .max_by_key(|(key, _)| *key)
            .map(|(_, t)| t)
            .or_else(|| tags.first());
        let since = match latest {
            Some(t) => ops::commit_time(&client, &t.commit_sha).await?,
            None => self.release_window_start(),
        };

        let merged = self.merged_since(&client, target, since).await?;
        let Some(anchor) = merged.iter().max_by_key(|cr| cr.merged_at) else {
            return Err(ReleaseError::NothingToRelease);
        };
        let description = non_empty(options.change_log.as_deref())
            .unwrap_or_else(|| merged.iter().map(note_line).collect::<Vec<_>>().join("\n"));

        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        let tag = tag::allocate(&names, self.today());

        self.start_confirmation(ConfirmTarget {
            repo: project.repo.clone(),
            number: anchor.number,
            action: TerminalAction::CreateTag {
                tag: tag.clone(),
                target_ref: target.to_string(),
                description,
            },
        })?;

        info!(repo = %project.repo, %tag, anchor = %anchor.number, "hotfix tag scheduled");
        Ok(ReleaseOutcome {
            tag,
            url: anchor.web_url.clone(),
        })
    }

    /// Merges `source` into `target` through a change request, relaxing the
    /// target's gates for the merge. Returns the change request's URL.
    #[instrument(skip(self))]
    pub async fn merge_branches(&self, project: &str, source: &str, target: &str) -> Result<String, ReleaseError> {
        let project = self.config().resolve_project(project)?.clone();
        let _git = self.lock_git().await;
        let workdir = self.fetch_branches(&project.repo, &[source, target]).await?;

        let (source_ref, target_ref) = (remote_ref(source), remote_ref(target));
        let dir = workdir.clone();
        let up_to_date = git::run_blocking(move || git::is_ancestor(&dir, &source_ref, &target_ref)).await?;
        if up_to_date {
            return Err(ReleaseError::NothingToRelease);
        }

        let method = self.check_mergeable(&workdir, source, target).await?;
        let client = Arc::new(self.host().connect(&project.repo));
        let title = format!("Merge {source} into {target}");
        let cr = self
            .open_change_request(client.as_ref(), &project, source, target, &title, "")
            .await?;
        self.force_merge(client, &cr, method).await?;

        info!(repo = %project.repo, number = %cr.number, ?method, "merged branches");
        Ok(cr.web_url)
    }

    /// Protects or unprotects a branch. Long-lived branches cannot be
    /// unprotected.
    #[instrument(skip(self))]
    pub async fn protect_branch(&self, project: &str, branch: &str, protect: bool) -> Result<(), ReleaseError> {
        let project = self.config().resolve_project(project)?;
        if !protect && self.config().is_protected(branch) {
            return Err(ReleaseError::ProtectedBranchViolation {
                branch: branch.to_string(),
            });
        }
        let client = self.host().connect(&project.repo);
        ops::set_branch_protection(&client, branch, protect)
            .await
            .map_err(|e| permission_or(e, &project.repo))?;
        info!(repo = %project.repo, %branch, protect, "updated branch protection");
        Ok(())
    }

    fn release_window_start(&self) -> DateTime<Utc> {
        self.now() - chrono::Duration::days(self.config().release_window_days)
    }

    /// Clones if needed, fetches, and checks that every branch exists.
    async fn fetch_branches(&self, repo: &RepoId, branches: &[&str]) -> Result<PathBuf, ReleaseError> {
        let config = self.git().clone();
        let repo = repo.clone();
        let wanted: Vec<String> = branches.iter().map(|b| b.to_string()).collect();

        let (workdir, missing) = git::run_blocking(move || {
            let workdir = clone::ensure_clone(&config, &repo)?;
            clone::fetch_prune(&workdir)?;
            let mut missing = None;
            for branch in wanted {
                if !clone::remote_branch_exists(&workdir, &branch)? {
                    missing = Some(branch);
                    break;
                }
            }
            Ok((workdir, missing))
        })
        .await?;

        match missing {
            Some(branch) => Err(ReleaseError::BranchNotFound { branch }),
            None => Ok(workdir),
        }
    }

    /// Trial-merges `source` into `target` and picks the merge method: fast
    /// forward when `target` is an ancestor of `source`.
    async fn check_mergeable(
        &self,
        workdir: &std::path::Path,
        source: &str,
        target: &str,
    ) -> Result<MergeMethod, ReleaseError> {
        let dir = workdir.to_path_buf();
        let identity = self.git().commit_identity.clone();
        let (source_ref, target_ref) = (remote_ref(source), remote_ref(target));

        let (trial, fast_forward) = git::run_blocking(move || {
            let trial = git::merge::trial_merge(&dir, &target_ref, &source_ref, &identity)?;
            let fast_forward = git::is_ancestor(&dir, &target_ref, &source_ref)?;
            Ok((trial, fast_forward))
        })
        .await?;

        if let TrialMerge::Conflict { paths } = trial {
            return Err(ReleaseError::MergeConflict {
                source_branch: source.to_string(),
                target_branch: target.to_string(),
                paths,
            });
        }
        Ok(if fast_forward {
            MergeMethod::FastForward
        } else {
            MergeMethod::Merge
        })
    }

    /// Creation time of the newest merged release change request into
    /// `target`, or the start of the default window.
    async fn last_release_by_change_request(
        &self,
        client: &H::Client,
        target: &str,
    ) -> Result<DateTime<Utc>, ReleaseError> {
        let bot = self.config().bot_login();
        let previous = ops::list_change_requests(
            client,
            StateFilter::Closed,
            Some(target),
            None,
            self.config().listing_max_pages,
        )
        .await?
        .into_iter()
        .filter(|cr| cr.state.is_merged() && cr.author.eq_ignore_ascii_case(bot))
        .map(|cr| cr.created_at)
        .max();
        Ok(previous.unwrap_or_else(|| self.release_window_start()))
    }

    /// Human-authored change requests merged into `base` after `since`.
    async fn merged_since(
        &self,
        client: &H::Client,
        base: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChangeRequest>, ReleaseError> {
        let merged = ops::list_change_requests(
            client,
            StateFilter::Closed,
            Some(base),
            Some(since),
            self.config().listing_max_pages,
        )
        .await?
        .into_iter()
        .filter(|cr| cr.merged_at.is_some_and(|at| at > since))
        .filter(|cr| !self.config().is_automation(&cr.author))
        .collect();
        Ok(merged)
    }

    async fn allocate_tag(&self, client: &H::Client) -> Result<String, ReleaseError> {
        let tags = ops::list_tags(client, TAG_PAGE).await?;
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        Ok(tag::allocate(&names, self.today()))
    }

    /// Opens a change request, reusing the open one for the same branch pair
    /// when the host reports a duplicate.
    async fn open_change_request(
        &self,
        client: &H::Client,
        project: &ProjectConfig,
        source: &str,
        target: &str,
        title: &str,
        body: &str,
    ) -> Result<ChangeRequest, ReleaseError> {
        match ops::create_change_request(client, source, target, title, body).await {
            Ok(cr) => Ok(cr),
            Err(e) if e.is_already_exists() => {
                match ops::find_open_change_request(client, source, target).await? {
                    Some(existing) => {
                        info!(number = %existing.number, "reusing open change request");
                        Ok(existing)
                    }
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(permission_or(e, &project.repo)),
        }
    }

    /// Merges with the target branch's gates relaxed, restoring them whether
    /// or not the merge succeeds.
    async fn force_merge<I>(&self, client: Arc<I>, cr: &ChangeRequest, method: MergeMethod) -> Result<(), HostApiError>
    where
        I: HostInterpreter + Send + Sync + 'static,
    {
        let guard = MergeGateGuard::relax(Arc::clone(&client), &cr.target_branch).await?;
        let merged = ops::merge_change_request(client.as_ref(), cr.number, method).await;
        let restored = guard.restore().await;
        merged?;
        restored
    }
}

fn permission_or(err: HostApiError, repo: &RepoId) -> ReleaseError {
    if err.kind == HostErrorKind::PermissionDenied {
        ReleaseError::PermissionDenied {
            settings_url: settings_url(repo),
        }
    } else {
        ReleaseError::Host(err)
    }
}
