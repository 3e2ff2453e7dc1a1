//! Host effect interpreter using octocrab.
//!
//! Every effect is executed against the GitHub REST API through octocrab's
//! raw request helpers, decoding responses into the schema structs below.
//! A payload that does not match its schema is a permanent error, never a
//! silently defaulted value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::effects::{
    HostEffect, HostInterpreter, HostResponse, MergeGates, MergeMethod, StateFilter, StatusChecks,
    TagData,
};
use crate::types::{ChangeRequest, ChangeRequestId, ChangedFile, CommentId, CrNumber, CrState, RepoId};

use super::client::OctocrabClient;
use super::error::HostApiError;
use super::retry::{RetryConfig, RetryPolicy, retry_with_backoff};

const PER_PAGE: u8 = 100;

// ─── Response Schemas ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PullSchema {
    id: u64,
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    user: Option<UserSchema>,
    #[serde(default)]
    labels: Vec<LabelSchema>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    html_url: String,
    head: BranchRefSchema,
    base: BranchRefSchema,
}

#[derive(Debug, Deserialize)]
struct UserSchema {
    login: String,
}

#[derive(Debug, Deserialize)]
struct LabelSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BranchRefSchema {
    #[serde(rename = "ref")]
    ref_field: String,
    sha: String,
    repo: Option<RepoSchema>,
}

#[derive(Debug, Deserialize)]
struct RepoSchema {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct FileSchema {
    filename: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct CommentSchema {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct MergeResultSchema {
    merged: bool,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProtectionSchema {
    required_status_checks: Option<StatusChecksSchema>,
    required_pull_request_reviews: Option<ReviewsSchema>,
}

#[derive(Debug, Deserialize)]
struct StatusChecksSchema {
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    contexts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewsSchema {
    #[serde(default)]
    required_approving_review_count: u32,
    #[serde(default)]
    require_last_push_approval: bool,
}

#[derive(Debug, Deserialize)]
struct TagSchema {
    name: String,
    commit: ShaSchema,
}

#[derive(Debug, Deserialize)]
struct ShaSchema {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitSchema {
    sha: String,
    commit: CommitDetailSchema,
}

#[derive(Debug, Deserialize)]
struct CommitDetailSchema {
    committer: Option<SignatureSchema>,
}

#[derive(Debug, Deserialize)]
struct SignatureSchema {
    date: DateTime<Utc>,
}

impl PullSchema {
    /// `target_repo` is the repository the request was scoped to; its
    /// spelling is kept even when the host reports different casing.
    fn into_change_request(self, target_repo: &RepoId) -> ChangeRequest {
        let state = match (self.merged_at, self.state.as_str()) {
            (Some(_), _) => CrState::Merged,
            (None, "closed") => CrState::Closed,
            (None, _) => CrState::Open,
        };
        let source_repo = self
            .head
            .repo
            .as_ref()
            .and_then(|r| RepoId::parse(&r.full_name).ok());

        ChangeRequest {
            id: ChangeRequestId(self.id),
            number: CrNumber(self.number),
            title: self.title,
            description: self.body,
            source_branch: self.head.ref_field,
            target_branch: self.base.ref_field,
            source_repo,
            target_repo: target_repo.clone(),
            author: self.user.map(|u| u.login).unwrap_or_default(),
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            state,
            created_at: self.created_at,
            merged_at: self.merged_at,
            web_url: self.html_url,
        }
    }
}

// ─── Interpreter Implementation ───────────────────────────────────────────────

impl HostInterpreter for OctocrabClient {
    async fn interpret(&self, effect: HostEffect) -> Result<HostResponse, HostApiError> {
        interpret_host_effect(self, effect, self.retry_config, self.retry_policy).await
    }
}

/// Interprets a host effect with retry of transient failures.
pub async fn interpret_host_effect(
    client: &OctocrabClient,
    effect: HostEffect,
    retry_config: RetryConfig,
    retry_policy: RetryPolicy,
) -> Result<HostResponse, HostApiError> {
    retry_with_backoff(retry_config, retry_policy, || {
        execute_effect(client, effect.clone())
    })
    .await
    .into_result()
}

async fn execute_effect(
    client: &OctocrabClient,
    effect: HostEffect,
) -> Result<HostResponse, HostApiError> {
    match effect {
        HostEffect::ListChangeRequests {
            state,
            base,
            updated_after,
            max_pages,
        } => list_change_requests(client, state, base, updated_after, max_pages).await,
        HostEffect::GetChangeRequest { number } => {
            let pull = get_pull(client, number).await?;
            Ok(HostResponse::ChangeRequest(
                pull.into_change_request(client.repo()),
            ))
        }
        HostEffect::FindOpenChangeRequest { source, target } => {
            find_open_change_request(client, source, target).await
        }
        HostEffect::ListChangedFiles { number } => list_changed_files(client, number).await,
        HostEffect::CreateChangeRequest {
            source,
            target,
            title,
            body,
        } => create_change_request(client, source, target, title, body).await,
        HostEffect::MergeChangeRequest { number, method } => {
            merge_change_request(client, number, method).await
        }
        HostEffect::AddLabels { number, labels } => add_labels(client, number, labels).await,
        HostEffect::PostComment { number, body } => post_comment(client, number, body).await,
        HostEffect::GetMergeGates { branch } => get_merge_gates(client, branch).await,
        HostEffect::SetMergeGates { branch, gates } => {
            set_merge_gates(client, branch, gates).await
        }
        HostEffect::ProtectBranch { branch } => protect_branch(client, branch).await,
        HostEffect::UnprotectBranch { branch } => unprotect_branch(client, branch).await,
        HostEffect::ListTags { per_page } => list_tags(client, per_page).await,
        HostEffect::GetCommitTime { sha } => get_commit_time(client, sha).await,
        HostEffect::CreateTag {
            name,
            target_ref,
            message,
            release_body,
        } => create_tag(client, name, target_ref, message, release_body).await,
    }
}

// ─── Change Requests ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ListParams<'a> {
    state: &'static str,
    sort: &'static str,
    direction: &'static str,
    per_page: u8,
    page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    head: Option<&'a str>,
}

fn state_param(state: StateFilter) -> &'static str {
    match state {
        StateFilter::Open => "open",
        StateFilter::Closed => "closed",
        StateFilter::All => "all",
    }
}

async fn list_change_requests(
    client: &OctocrabClient,
    state: StateFilter,
    base: Option<String>,
    updated_after: Option<DateTime<Utc>>,
    max_pages: u32,
) -> Result<HostResponse, HostApiError> {
    let route = client.route("/pulls");
    let mut page = 1u32;
    let mut found = Vec::new();

    loop {
        let params = ListParams {
            state: state_param(state),
            sort: "updated",
            direction: "desc",
            per_page: PER_PAGE,
            page,
            base: base.as_deref(),
            head: None,
        };
        let items: Vec<PullSchema> = client
            .inner()
            .get(&route, Some(&params))
            .await
            .map_err(HostApiError::from_octocrab)?;

        let is_last_page = items.len() < usize::from(PER_PAGE);
        let mut reached_cutoff = false;

        for pull in items {
            // Sorted by update time, so everything after the first stale entry
            // is stale too.
            if let Some(cutoff) = updated_after
                && pull.updated_at < cutoff
            {
                reached_cutoff = true;
                break;
            }
            found.push(pull.into_change_request(client.repo()));
        }

        if is_last_page || reached_cutoff {
            break;
        }
        if page >= max_pages {
            tracing::debug!(
                repo = %client.repo(),
                pages = page,
                "stopping change request listing at page limit"
            );
            break;
        }
        page += 1;
    }

    Ok(HostResponse::ChangeRequests(found))
}

async fn get_pull(client: &OctocrabClient, number: CrNumber) -> Result<PullSchema, HostApiError> {
    client
        .inner()
        .get(client.route(&format!("/pulls/{}", number.0)), None::<&()>)
        .await
        .map_err(HostApiError::from_octocrab)
}

async fn find_open_change_request(
    client: &OctocrabClient,
    source: String,
    target: String,
) -> Result<HostResponse, HostApiError> {
    let head = format!("{}:{}", client.owner(), source);
    let params = ListParams {
        state: "open",
        sort: "created",
        direction: "desc",
        per_page: 1,
        page: 1,
        base: Some(&target),
        head: Some(&head),
    };
    let items: Vec<PullSchema> = client
        .inner()
        .get(client.route("/pulls"), Some(&params))
        .await
        .map_err(HostApiError::from_octocrab)?;

    Ok(HostResponse::MaybeChangeRequest(
        items
            .into_iter()
            .next()
            .map(|p| p.into_change_request(client.repo())),
    ))
}

async fn list_changed_files(
    client: &OctocrabClient,
    number: CrNumber,
) -> Result<HostResponse, HostApiError> {
    #[derive(Serialize)]
    struct PageParams {
        per_page: u8,
        page: u32,
    }

    let route = client.route(&format!("/pulls/{}/files", number.0));
    let mut page = 1u32;
    let mut files = Vec::new();

    loop {
        let items: Vec<FileSchema> = client
            .inner()
            .get(
                &route,
                Some(&PageParams {
                    per_page: PER_PAGE,
                    page,
                }),
            )
            .await
            .map_err(HostApiError::from_octocrab)?;

        let is_last_page = items.len() < usize::from(PER_PAGE);
        files.extend(items.into_iter().map(|f| ChangedFile {
            is_new: f.status == "added",
            path: f.filename,
        }));

        // GitHub caps this listing at 3000 files (30 pages).
        if is_last_page || page >= 30 {
            break;
        }
        page += 1;
    }

    Ok(HostResponse::ChangedFiles(files))
}

async fn create_change_request(
    client: &OctocrabClient,
    source: String,
    target: String,
    title: String,
    body: String,
) -> Result<HostResponse, HostApiError> {
    #[derive(Serialize)]
    struct CreateRequest {
        title: String,
        head: String,
        base: String,
        body: String,
    }

    let pull: PullSchema = client
        .inner()
        .post(
            client.route("/pulls"),
            Some(&CreateRequest {
                title,
                head: source,
                base: target,
                body,
            }),
        )
        .await
        .map_err(HostApiError::from_octocrab)?;

    Ok(HostResponse::ChangeRequest(
        pull.into_change_request(client.repo()),
    ))
}

async fn merge_change_request(
    client: &OctocrabClient,
    number: CrNumber,
    method: MergeMethod,
) -> Result<HostResponse, HostApiError> {
    match method {
        MergeMethod::FastForward => {
            // GitHub has no fast-forward merge button. Moving the base ref to the
            // head commit (without force) is a fast-forward, and GitHub then marks
            // the pull request merged on its own.
            let pull = get_pull(client, number).await?;

            #[derive(Serialize)]
            struct UpdateRef<'a> {
                sha: &'a str,
                force: bool,
            }

            let route = client.route(&format!(
                "/git/refs/heads/{}",
                urlencoding::encode(&pull.base.ref_field)
            ));
            let _: serde_json::Value = client
                .inner()
                .patch(
                    route,
                    Some(&UpdateRef {
                        sha: &pull.head.sha,
                        force: false,
                    }),
                )
                .await
                .map_err(HostApiError::from_octocrab)?;
            Ok(HostResponse::Merged)
        }
        MergeMethod::Merge => {
            #[derive(Serialize)]
            struct MergeRequest {
                merge_method: &'static str,
            }

            let result: MergeResultSchema = client
                .inner()
                .put(
                    client.route(&format!("/pulls/{}/merge", number.0)),
                    Some(&MergeRequest {
                        merge_method: "merge",
                    }),
                )
                .await
                .map_err(HostApiError::from_octocrab)?;

            if result.merged {
                Ok(HostResponse::Merged)
            } else {
                Err(HostApiError::permanent_without_source(format!(
                    "merge of {} returned merged=false: {}",
                    number,
                    result.message.as_deref().unwrap_or("unknown reason")
                )))
            }
        }
    }
}

async fn add_labels(
    client: &OctocrabClient,
    number: CrNumber,
    labels: Vec<String>,
) -> Result<HostResponse, HostApiError> {
    #[derive(Serialize)]
    struct LabelsRequest {
        labels: Vec<String>,
    }

    let _: Vec<LabelSchema> = client
        .inner()
        .post(
            client.route(&format!("/issues/{}/labels", number.0)),
            Some(&LabelsRequest { labels }),
        )
        .await
        .map_err(HostApiError::from_octocrab)?;

    Ok(HostResponse::LabelsAdded)
}

async fn post_comment(
    client: &OctocrabClient,
    number: CrNumber,
    body: String,
) -> Result<HostResponse, HostApiError> {
    #[derive(Serialize)]
    struct CommentRequest {
        body: String,
    }

    let comment: CommentSchema = client
        .inner()
        .post(
            client.route(&format!("/issues/{}/comments", number.0)),
            Some(&CommentRequest { body }),
        )
        .await
        .map_err(HostApiError::from_octocrab)?;

    Ok(HostResponse::CommentPosted {
        id: CommentId(comment.id),
    })
}

// ─── Branch Settings ──────────────────────────────────────────────────────────

fn protection_route(client: &OctocrabClient, branch: &str, suffix: &str) -> String {
    client.route(&format!(
        "/branches/{}/protection{}",
        urlencoding::encode(branch),
        suffix
    ))
}

async fn get_merge_gates(
    client: &OctocrabClient,
    branch: String,
) -> Result<HostResponse, HostApiError> {
    let result: Result<ProtectionSchema, _> = client
        .inner()
        .get(protection_route(client, &branch, ""), None::<&()>)
        .await;

    match result {
        Ok(protection) => Ok(HostResponse::MergeGates(MergeGates {
            required_status_checks: protection.required_status_checks.map(|c| StatusChecks {
                strict: c.strict,
                contexts: c.contexts,
            }),
            required_approvals: protection
                .required_pull_request_reviews
                .as_ref()
                .map(|r| r.required_approving_review_count),
            allow_author_approval: !protection
                .required_pull_request_reviews
                .is_some_and(|r| r.require_last_push_approval),
        })),
        Err(e) => {
            let err = HostApiError::from_octocrab(e);
            if err.is_not_found() {
                // "Branch not protected": nothing gates a merge.
                Ok(HostResponse::MergeGates(MergeGates {
                    required_status_checks: None,
                    required_approvals: None,
                    allow_author_approval: true,
                }))
            } else {
                Err(err)
            }
        }
    }
}

async fn set_merge_gates(
    client: &OctocrabClient,
    branch: String,
    gates: MergeGates,
) -> Result<HostResponse, HostApiError> {
    match &gates.required_status_checks {
        Some(checks) => {
            let _: serde_json::Value = client
                .inner()
                .patch(
                    protection_route(client, &branch, "/required_status_checks"),
                    Some(&serde_json::json!({
                        "strict": checks.strict,
                        "contexts": checks.contexts,
                    })),
                )
                .await
                .map_err(HostApiError::from_octocrab)?;
        }
        None => {
            delete_ignoring_missing(
                client,
                protection_route(client, &branch, "/required_status_checks"),
            )
            .await?;
        }
    }

    match gates.required_approvals {
        Some(count) => {
            let _: serde_json::Value = client
                .inner()
                .patch(
                    protection_route(client, &branch, "/required_pull_request_reviews"),
                    Some(&serde_json::json!({
                        "required_approving_review_count": count,
                        "require_last_push_approval": !gates.allow_author_approval,
                    })),
                )
                .await
                .map_err(HostApiError::from_octocrab)?;
        }
        None => {
            delete_ignoring_missing(
                client,
                protection_route(client, &branch, "/required_pull_request_reviews"),
            )
            .await?;
        }
    }

    Ok(HostResponse::BranchUpdated)
}

async fn protect_branch(
    client: &OctocrabClient,
    branch: String,
) -> Result<HostResponse, HostApiError> {
    // Requiring a pull request (with zero approvals) forbids direct pushes
    // while leaving merges through change requests possible.
    let _: serde_json::Value = client
        .inner()
        .put(
            protection_route(client, &branch, ""),
            Some(&serde_json::json!({
                "required_status_checks": null,
                "enforce_admins": false,
                "required_pull_request_reviews": { "required_approving_review_count": 0 },
                "restrictions": null,
                "allow_force_pushes": false,
                "allow_deletions": false,
            })),
        )
        .await
        .map_err(HostApiError::from_octocrab)?;

    Ok(HostResponse::BranchUpdated)
}

async fn unprotect_branch(
    client: &OctocrabClient,
    branch: String,
) -> Result<HostResponse, HostApiError> {
    delete_ignoring_missing(client, protection_route(client, &branch, "")).await?;
    Ok(HostResponse::BranchUpdated)
}

/// DELETE that treats 404 as success: removing an absent setting is a no-op.
async fn delete_ignoring_missing(client: &OctocrabClient, route: String) -> Result<(), HostApiError> {
    let response = client
        .inner()
        ._delete(route.as_str(), None::<&()>)
        .await
        .map_err(HostApiError::from_octocrab)?;

    match octocrab::map_github_error(response).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let err = HostApiError::from_octocrab(e);
            if err.is_not_found() { Ok(()) } else { Err(err) }
        }
    }
}

// ─── Tags ─────────────────────────────────────────────────────────────────────

async fn list_tags(client: &OctocrabClient, per_page: u8) -> Result<HostResponse, HostApiError> {
    #[derive(Serialize)]
    struct TagParams {
        per_page: u8,
    }

    let tags: Vec<TagSchema> = client
        .inner()
        .get(client.route("/tags"), Some(&TagParams { per_page }))
        .await
        .map_err(HostApiError::from_octocrab)?;

    Ok(HostResponse::Tags(
        tags.into_iter()
            .map(|t| TagData {
                name: t.name,
                commit_sha: t.commit.sha,
            })
            .collect(),
    ))
}

async fn get_commit(client: &OctocrabClient, reference: &str) -> Result<CommitSchema, HostApiError> {
    client
        .inner()
        .get(
            client.route(&format!("/commits/{}", urlencoding::encode(reference))),
            None::<&()>,
        )
        .await
        .map_err(HostApiError::from_octocrab)
}

async fn get_commit_time(client: &OctocrabClient, sha: String) -> Result<HostResponse, HostApiError> {
    let commit = get_commit(client, &sha).await?;
    let committer = commit.commit.committer.ok_or_else(|| {
        HostApiError::permanent_without_source(format!("commit {sha} has no committer"))
    })?;
    Ok(HostResponse::CommitTime(committer.date))
}

async fn create_tag(
    client: &OctocrabClient,
    name: String,
    target_ref: String,
    message: String,
    release_body: String,
) -> Result<HostResponse, HostApiError> {
    let target = get_commit(client, &target_ref).await?;

    let tag_object: ShaSchema = client
        .inner()
        .post(
            client.route("/git/tags"),
            Some(&serde_json::json!({
                "tag": name,
                "message": message,
                "object": target.sha,
                "type": "commit",
            })),
        )
        .await
        .map_err(HostApiError::from_octocrab)?;

    // A duplicate ref surfaces as AlreadyExists; the release below is only
    // attempted once the ref exists.
    let _: serde_json::Value = client
        .inner()
        .post(
            client.route("/git/refs"),
            Some(&serde_json::json!({
                "ref": format!("refs/tags/{name}"),
                "sha": tag_object.sha,
            })),
        )
        .await
        .map_err(HostApiError::from_octocrab)?;

    let _: serde_json::Value = client
        .inner()
        .post(
            client.route("/releases"),
            Some(&serde_json::json!({
                "tag_name": name,
                "name": name,
                "body": release_body,
            })),
        )
        .await
        .map_err(HostApiError::from_octocrab)?;

    Ok(HostResponse::TagCreated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pull_json(state: &str, merged_at: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "id": 9001,
            "number": 42,
            "title": "feat(api): add endpoint PROJ-123",
            "body": null,
            "state": state,
            "user": { "login": "alice" },
            "labels": [{ "name": "feature" }],
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-02T10:00:00Z",
            "merged_at": merged_at,
            "html_url": "https://github.com/acme/app/pull/42",
            "head": { "ref": "feature", "sha": "abc", "repo": { "full_name": "acme/app" } },
            "base": { "ref": "dev", "sha": "def", "repo": { "full_name": "acme/app" } }
        })
    }

    #[test]
    fn pull_schema_maps_merged_state() {
        let pull: PullSchema =
            serde_json::from_value(pull_json("closed", Some("2024-05-02T09:00:00Z"))).unwrap();
        let cr = pull.into_change_request(&RepoId::new("acme", "app"));
        assert_eq!(cr.state, CrState::Merged);
        assert_eq!(cr.number, CrNumber(42));
        assert_eq!(cr.id, ChangeRequestId(9001));
        assert_eq!(cr.author, "alice");
        assert_eq!(cr.labels, vec!["feature".to_string()]);
        assert!(cr.is_same_repo());
    }

    #[test]
    fn pull_schema_maps_closed_and_open() {
        let repo = RepoId::new("acme", "app");
        let closed: PullSchema = serde_json::from_value(pull_json("closed", None)).unwrap();
        assert_eq!(closed.into_change_request(&repo).state, CrState::Closed);
        let open: PullSchema = serde_json::from_value(pull_json("open", None)).unwrap();
        assert_eq!(open.into_change_request(&repo).state, CrState::Open);
    }

    #[test]
    fn target_repo_keeps_configured_casing() {
        let mut json = pull_json("open", None);
        json["head"]["repo"]["full_name"] = serde_json::json!("Acme/App");
        json["base"]["repo"]["full_name"] = serde_json::json!("Acme/App");
        let pull: PullSchema = serde_json::from_value(json).unwrap();
        let cr = pull.into_change_request(&RepoId::new("acme", "app"));
        assert_eq!(cr.target_repo, RepoId::new("acme", "app"));
        assert!(cr.is_same_repo());
    }

    #[test]
    fn deleted_fork_has_no_source_repo() {
        let mut json = pull_json("open", None);
        json["head"]["repo"] = serde_json::Value::Null;
        let pull: PullSchema = serde_json::from_value(json).unwrap();
        let cr = pull.into_change_request(&RepoId::new("acme", "app"));
        assert_eq!(cr.source_repo, None);
        assert!(!cr.is_same_repo());
    }

    /// A local stand-in for the branch protection API: `master` is
    /// protected, every other branch answers 404.
    async fn protection_server() -> OctocrabClient {
        use axum::http::StatusCode;
        use axum::routing::delete;

        let app = axum::Router::new()
            .route(
                "/repos/acme/app/branches/master/protection",
                delete(|| async { StatusCode::NO_CONTENT }),
            )
            .fallback(|| async {
                (
                    StatusCode::NOT_FOUND,
                    axum::Json(serde_json::json!({
                        "message": "Branch not protected",
                        "documentation_url": "https://docs.github.com/rest",
                    })),
                )
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let octocrab = octocrab::Octocrab::builder()
            .base_uri(format!("http://{addr}"))
            .unwrap()
            .build()
            .unwrap();
        OctocrabClient::new(octocrab, RepoId::new("acme", "app"))
    }

    #[tokio::test]
    async fn unprotect_deletes_protection_and_ignores_missing() {
        let client = protection_server().await;

        let response = unprotect_branch(&client, "master".to_string()).await.unwrap();
        assert!(matches!(response, HostResponse::BranchUpdated));

        let response = unprotect_branch(&client, "feature/x".to_string()).await.unwrap();
        assert!(matches!(response, HostResponse::BranchUpdated));
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let mut json = pull_json("open", None);
        json["created_at"] = serde_json::json!("yesterday");
        assert!(serde_json::from_value::<PullSchema>(json).is_err());
    }

    #[test]
    fn list_params_omit_absent_filters() {
        let params = ListParams {
            state: "all",
            sort: "updated",
            direction: "desc",
            per_page: 100,
            page: 1,
            base: None,
            head: None,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("base").is_none());
        assert!(json.get("head").is_none());
        assert_eq!(json["state"], "all");
    }
}
