//! Shared test utilities: in-memory collaborators and an engine wired to
//! them.
//!
//! The mocks record every write so tests can assert on what the engine did,
//! and expose knobs that make individual operations fail.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::{Future, ready};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::chat::{Card, ChatClient, ChatError};
use crate::clock::{Clock, ManualClock};
use crate::config::{Config, ProjectConfig, RoomRule};
use crate::effects::{
    HostConnector, HostEffect, HostInterpreter, HostResponse, MergeGates, MergeMethod,
    StateFilter, TagData,
};
use crate::engine::{Collaborators, Engine};
use crate::git::GitConfig;
use crate::git::test_repo::identity;
use crate::host::{HostApiError, HostErrorKind};
use crate::store::{KvStore, MemoryStore};
use crate::tracker::{IssueTracker, Ticket, TicketStatus, TrackerError};
use crate::types::{
    ChangeRequest, ChangeRequestId, ChangedFile, CommentId, CrNumber, CrState, RepoId,
};

/// Login the mock host reports as the author of change requests it creates.
pub const BOT_LOGIN: &str = "merge-warden[bot]";

/// Where every harness clock starts.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap()
}

fn default_repo() -> RepoId {
    RepoId::new("acme", "app")
}

/// A change request in `acme/app` from `feature/x` into `dev`.
pub fn change_request(number: u64, title: &str, author: &str, state: CrState) -> ChangeRequest {
    let repo = default_repo();
    ChangeRequest {
        id: ChangeRequestId(number + 100_000),
        number: CrNumber(number),
        title: title.to_string(),
        description: None,
        source_branch: "feature/x".to_string(),
        target_branch: "dev".to_string(),
        source_repo: Some(repo.clone()),
        web_url: format!("https://github.com/{repo}/pull/{number}"),
        target_repo: repo,
        author: author.to_string(),
        labels: Vec::new(),
        state,
        created_at: start_time(),
        merged_at: state.is_merged().then(start_time),
    }
}

pub fn ticket(key: &str, issue_type: &str, assignee: Option<&str>) -> Ticket {
    Ticket {
        key: key.to_string(),
        issue_type: issue_type.to_string(),
        assignee: assignee.map(str::to_string),
        status: "Open".to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ─── Host ─────────────────────────────────────────────────────────────────────

/// A tag creation the mock host accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTag {
    pub name: String,
    pub target_ref: String,
    pub message: String,
    pub release_body: String,
}

#[derive(Debug, Default)]
struct RepoState {
    change_requests: BTreeMap<CrNumber, ChangeRequest>,
    hidden: HashSet<CrNumber>,
    files: HashMap<CrNumber, Vec<ChangedFile>>,
    comments: BTreeMap<CrNumber, Vec<String>>,
    fetches: HashMap<CrNumber, usize>,
    created: Vec<ChangeRequest>,
    merges: Vec<(CrNumber, MergeMethod)>,
    gates_at_merge: Vec<MergeGates>,
    gates: HashMap<String, MergeGates>,
    gate_writes: usize,
    protected: BTreeSet<String>,
    /// Oldest first; listed newest first.
    tags: Vec<TagData>,
    commit_times: HashMap<String, DateTime<Utc>>,
    created_tags: Vec<CreatedTag>,
}

#[derive(Debug, Default)]
struct HostState {
    repos: HashMap<RepoId, RepoState>,
    failing_listings: HashSet<RepoId>,
    failing_fetches: usize,
    failing_gate_writes: usize,
    fail_labels: bool,
    fail_merges: bool,
    deny_writes: bool,
    next_comment: u64,
}

impl HostState {
    fn repo(&mut self, repo: &RepoId) -> &mut RepoState {
        self.repos.entry(repo.clone()).or_default()
    }
}

/// An in-memory host shared between the test and every client it hands out.
/// Accessors taking a number act on `acme/app`.
#[derive(Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<HostState>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_default<R>(&self, f: impl FnOnce(&mut RepoState) -> R) -> R {
        let mut state = lock(&self.state);
        f(state.repo(&default_repo()))
    }

    pub fn insert(&self, cr: ChangeRequest) {
        let mut state = lock(&self.state);
        state.repo(&cr.target_repo).change_requests.insert(cr.number, cr);
    }

    pub fn get(&self, number: u64) -> ChangeRequest {
        self.with_default(|r| r.change_requests[&CrNumber(number)].clone())
    }

    pub fn set_state(&self, number: u64, state: CrState) {
        self.with_default(|r| {
            if let Some(cr) = r.change_requests.get_mut(&CrNumber(number)) {
                cr.state = state;
                cr.merged_at = state.is_merged().then(start_time);
            }
        });
    }

    pub fn set_files(&self, number: u64, files: Vec<ChangedFile>) {
        self.with_default(|r| r.files.insert(CrNumber(number), files));
    }

    /// Keeps the change request out of listings while it stays fetchable.
    pub fn hide_from_listing(&self, number: u64) {
        self.with_default(|r| r.hidden.insert(CrNumber(number)));
    }

    pub fn fail_listing(&self, repo: &RepoId, fail: bool) {
        let mut state = lock(&self.state);
        if fail {
            state.failing_listings.insert(repo.clone());
        } else {
            state.failing_listings.remove(repo);
        }
    }

    /// The next `n` single fetches fail with a transient error.
    pub fn fail_next_fetches(&self, n: usize) {
        lock(&self.state).failing_fetches = n;
    }

    /// The next `n` gate writes fail with a 502.
    pub fn fail_next_gate_writes(&self, n: usize) {
        lock(&self.state).failing_gate_writes = n;
    }

    pub fn fetch_count(&self, number: u64) -> usize {
        self.with_default(|r| r.fetches.get(&CrNumber(number)).copied().unwrap_or(0))
    }

    pub fn labels(&self, number: u64) -> Vec<String> {
        self.with_default(|r| {
            r.change_requests
                .get(&CrNumber(number))
                .map(|cr| cr.labels.clone())
                .unwrap_or_default()
        })
    }

    pub fn fail_labels(&self, fail: bool) {
        lock(&self.state).fail_labels = fail;
    }

    pub fn comments(&self, number: u64) -> Vec<String> {
        self.with_default(|r| r.comments.get(&CrNumber(number)).cloned().unwrap_or_default())
    }

    pub fn set_gates(&self, branch: &str, gates: MergeGates) {
        self.with_default(|r| r.gates.insert(branch.to_string(), gates));
    }

    pub fn gates(&self, branch: &str) -> MergeGates {
        self.with_default(|r| gates_of(r, branch))
    }

    pub fn gate_writes(&self) -> usize {
        self.with_default(|r| r.gate_writes)
    }

    /// Gates of the target branch at the moment of each merge.
    pub fn gates_at_merge(&self) -> Vec<MergeGates> {
        self.with_default(|r| r.gates_at_merge.clone())
    }

    pub fn is_protected(&self, branch: &str) -> bool {
        self.with_default(|r| r.protected.contains(branch))
    }

    pub fn add_tag(&self, name: &str, commit_sha: &str) {
        self.with_default(|r| {
            r.tags.push(TagData {
                name: name.to_string(),
                commit_sha: commit_sha.to_string(),
            })
        });
    }

    pub fn set_commit_time(&self, sha: &str, at: DateTime<Utc>) {
        self.with_default(|r| r.commit_times.insert(sha.to_string(), at));
    }

    pub fn created_tags(&self) -> Vec<CreatedTag> {
        self.with_default(|r| r.created_tags.clone())
    }

    pub fn created_change_requests(&self) -> Vec<ChangeRequest> {
        self.with_default(|r| r.created.clone())
    }

    pub fn merges(&self) -> Vec<(CrNumber, MergeMethod)> {
        self.with_default(|r| r.merges.clone())
    }

    pub fn fail_merges(&self, fail: bool) {
        lock(&self.state).fail_merges = fail;
    }

    /// Creating change requests and changing protection answer 403.
    pub fn deny_writes(&self, deny: bool) {
        lock(&self.state).deny_writes = deny;
    }
}

fn gates_of(repo: &RepoState, branch: &str) -> MergeGates {
    repo.gates.get(branch).cloned().unwrap_or(MergeGates {
        required_status_checks: None,
        required_approvals: None,
        allow_author_approval: true,
    })
}

fn error(kind: HostErrorKind, status: u16, message: &str) -> HostApiError {
    HostApiError {
        status_code: Some(status),
        ..HostApiError::without_source(kind, message)
    }
}

fn not_found(what: impl std::fmt::Display) -> HostApiError {
    error(HostErrorKind::NotFound, 404, &format!("{what} not found"))
}

fn forbidden() -> HostApiError {
    error(HostErrorKind::PermissionDenied, 403, "Resource not accessible by integration")
}

fn listed(cr: &ChangeRequest, filter: StateFilter) -> bool {
    match filter {
        StateFilter::Open => cr.state == CrState::Open,
        StateFilter::Closed => cr.state != CrState::Open,
        StateFilter::All => true,
    }
}

impl HostConnector for MockHost {
    type Client = MockClient;

    fn connect(&self, repo: &RepoId) -> MockClient {
        MockClient {
            repo: repo.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

pub struct MockClient {
    repo: RepoId,
    state: Arc<Mutex<HostState>>,
}

impl MockClient {
    fn apply(&self, effect: HostEffect) -> Result<HostResponse, HostApiError> {
        let mut host = lock(&self.state);
        let listing_fails = host.failing_listings.contains(&self.repo);
        let (fail_labels, fail_merges, deny_writes) = (host.fail_labels, host.fail_merges, host.deny_writes);

        match effect {
            HostEffect::ListChangeRequests { state, base, .. } => {
                if listing_fails {
                    return Err(error(HostErrorKind::Transient, 502, "Bad Gateway"));
                }
                let repo = host.repo(&self.repo);
                let crs = repo
                    .change_requests
                    .values()
                    .rev()
                    .filter(|cr| !repo.hidden.contains(&cr.number))
                    .filter(|cr| listed(cr, state))
                    .filter(|cr| base.as_deref().is_none_or(|b| cr.target_branch == b))
                    .cloned()
                    .collect();
                Ok(HostResponse::ChangeRequests(crs))
            }

            HostEffect::GetChangeRequest { number } => {
                let failing = host.failing_fetches > 0;
                if failing {
                    host.failing_fetches -= 1;
                }
                let repo = host.repo(&self.repo);
                *repo.fetches.entry(number).or_default() += 1;
                if failing {
                    return Err(error(HostErrorKind::Transient, 503, "Service Unavailable"));
                }
                repo.change_requests
                    .get(&number)
                    .cloned()
                    .map(HostResponse::ChangeRequest)
                    .ok_or_else(|| not_found(number))
            }

            HostEffect::FindOpenChangeRequest { source, target } => {
                let found = host
                    .repo(&self.repo)
                    .change_requests
                    .values()
                    .find(|cr| cr.state == CrState::Open && cr.source_branch == source && cr.target_branch == target)
                    .cloned();
                Ok(HostResponse::MaybeChangeRequest(found))
            }

            HostEffect::ListChangedFiles { number } => {
                let files = host.repo(&self.repo).files.get(&number).cloned().unwrap_or_default();
                Ok(HostResponse::ChangedFiles(files))
            }

            HostEffect::CreateChangeRequest {
                source,
                target,
                title,
                body,
            } => {
                if deny_writes {
                    return Err(forbidden());
                }
                let repo_id = self.repo.clone();
                let repo = host.repo(&repo_id);
                let duplicate = repo
                    .change_requests
                    .values()
                    .any(|cr| cr.state == CrState::Open && cr.source_branch == source && cr.target_branch == target);
                if duplicate {
                    return Err(error(
                        HostErrorKind::AlreadyExists,
                        422,
                        "A pull request already exists",
                    ));
                }
                let number = repo.change_requests.keys().last().map_or(1000, |n| n.0.max(999) + 1);
                let cr = ChangeRequest {
                    id: ChangeRequestId(number + 100_000),
                    number: CrNumber(number),
                    title,
                    description: (!body.is_empty()).then_some(body),
                    source_branch: source,
                    target_branch: target,
                    source_repo: Some(repo_id.clone()),
                    web_url: format!("https://github.com/{repo_id}/pull/{number}"),
                    target_repo: repo_id,
                    author: BOT_LOGIN.to_string(),
                    labels: Vec::new(),
                    state: CrState::Open,
                    created_at: start_time(),
                    merged_at: None,
                };
                repo.change_requests.insert(cr.number, cr.clone());
                repo.created.push(cr.clone());
                Ok(HostResponse::ChangeRequest(cr))
            }

            HostEffect::MergeChangeRequest { number, method } => {
                if fail_merges {
                    return Err(error(
                        HostErrorKind::Permanent,
                        405,
                        "Required status check \"ci\" is expected",
                    ));
                }
                let repo = host.repo(&self.repo);
                let Some(target) = repo.change_requests.get(&number).map(|cr| cr.target_branch.clone()) else {
                    return Err(not_found(number));
                };
                let gates = gates_of(repo, &target);
                repo.gates_at_merge.push(gates);
                repo.merges.push((number, method));
                if let Some(cr) = repo.change_requests.get_mut(&number) {
                    cr.state = CrState::Merged;
                    cr.merged_at = Some(start_time());
                }
                Ok(HostResponse::Merged)
            }

            HostEffect::AddLabels { number, labels } => {
                if fail_labels {
                    return Err(error(HostErrorKind::Transient, 502, "Bad Gateway"));
                }
                let cr = host
                    .repo(&self.repo)
                    .change_requests
                    .get_mut(&number)
                    .ok_or_else(|| not_found(number))?;
                for label in labels {
                    if !cr.labels.contains(&label) {
                        cr.labels.push(label);
                    }
                }
                Ok(HostResponse::LabelsAdded)
            }

            HostEffect::PostComment { number, body } => {
                host.next_comment += 1;
                let id = CommentId(host.next_comment);
                host.repo(&self.repo).comments.entry(number).or_default().push(body);
                Ok(HostResponse::CommentPosted { id })
            }

            HostEffect::GetMergeGates { branch } => {
                Ok(HostResponse::MergeGates(gates_of(host.repo(&self.repo), &branch)))
            }

            HostEffect::SetMergeGates { branch, gates } => {
                if host.failing_gate_writes > 0 {
                    host.failing_gate_writes -= 1;
                    return Err(error(HostErrorKind::Transient, 502, "Bad Gateway"));
                }
                let repo = host.repo(&self.repo);
                repo.gate_writes += 1;
                repo.gates.insert(branch, gates);
                Ok(HostResponse::BranchUpdated)
            }

            HostEffect::ProtectBranch { branch } => {
                if deny_writes {
                    return Err(forbidden());
                }
                host.repo(&self.repo).protected.insert(branch);
                Ok(HostResponse::BranchUpdated)
            }

            HostEffect::UnprotectBranch { branch } => {
                if deny_writes {
                    return Err(forbidden());
                }
                host.repo(&self.repo).protected.remove(&branch);
                Ok(HostResponse::BranchUpdated)
            }

            HostEffect::ListTags { per_page } => {
                let tags = host
                    .repo(&self.repo)
                    .tags
                    .iter()
                    .rev()
                    .take(usize::from(per_page))
                    .cloned()
                    .collect();
                Ok(HostResponse::Tags(tags))
            }

            HostEffect::GetCommitTime { sha } => host
                .repo(&self.repo)
                .commit_times
                .get(&sha)
                .copied()
                .map(HostResponse::CommitTime)
                .ok_or_else(|| not_found(format!("commit {sha}"))),

            HostEffect::CreateTag {
                name,
                target_ref,
                message,
                release_body,
            } => {
                let repo = host.repo(&self.repo);
                if repo.tags.iter().any(|t| t.name == name) {
                    return Err(error(HostErrorKind::AlreadyExists, 422, "Reference already exists"));
                }
                repo.tags.push(TagData {
                    name: name.clone(),
                    commit_sha: format!("sha-{name}"),
                });
                repo.created_tags.push(CreatedTag {
                    name,
                    target_ref,
                    message,
                    release_body,
                });
                Ok(HostResponse::TagCreated)
            }
        }
    }
}

impl HostInterpreter for MockClient {
    fn interpret(&self, effect: HostEffect) -> impl Future<Output = Result<HostResponse, HostApiError>> + Send {
        ready(self.apply(effect))
    }
}

// ─── Tracker ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TrackerState {
    tickets: HashMap<String, Ticket>,
    transitions: Vec<(String, TicketStatus)>,
}

#[derive(Clone, Default)]
pub struct MockTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl MockTracker {
    pub fn insert(&self, ticket: Ticket) {
        lock(&self.state).tickets.insert(ticket.key.clone(), ticket);
    }

    pub fn transitions(&self) -> Vec<(String, TicketStatus)> {
        lock(&self.state).transitions.clone()
    }
}

fn missing_issue() -> TrackerError {
    TrackerError::Remote {
        status: 404,
        text: "Issue Does Not Exist".to_string(),
    }
}

impl IssueTracker for MockTracker {
    fn get_ticket(&self, key: &str) -> impl Future<Output = Result<Ticket, TrackerError>> + Send {
        let found = lock(&self.state).tickets.get(key).cloned();
        ready(found.ok_or_else(missing_issue))
    }

    fn transition(&self, key: &str, status: TicketStatus) -> impl Future<Output = Result<bool, TrackerError>> + Send {
        let mut state = lock(&self.state);
        let result = if state.tickets.contains_key(key) {
            state.transitions.push((key.to_string(), status));
            Ok(true)
        } else {
            Err(missing_issue())
        };
        ready(result)
    }
}

// ─── Chat ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ChatState {
    sent: Vec<(String, Card)>,
    failing_rooms: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MockChat {
    state: Arc<Mutex<ChatState>>,
}

impl MockChat {
    pub fn sent(&self) -> Vec<(String, Card)> {
        lock(&self.state).sent.clone()
    }

    pub fn fail_room(&self, room: &str) {
        lock(&self.state).failing_rooms.insert(room.to_string());
    }
}

impl ChatClient for MockChat {
    fn send_card(&self, room: &str, card: &Card) -> impl Future<Output = Result<(), ChatError>> + Send {
        let mut state = lock(&self.state);
        let result = if state.failing_rooms.contains(room) {
            Err(ChatError::Remote {
                code: 232_011,
                message: "bot is not in the chat".to_string(),
            })
        } else {
            state.sent.push((room.to_string(), card.clone()));
            Ok(())
        };
        ready(result)
    }
}

// ─── Harness ──────────────────────────────────────────────────────────────────

pub type TestEngine = Engine<MockHost, MockTracker, MockChat>;

pub struct TestHarness {
    pub engine: TestEngine,
    pub host: MockHost,
    pub tracker: MockTracker,
    pub chat: MockChat,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    _scratch: Option<TempDir>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Self::default_config())
    }

    /// `acme/app` with ticket linking on and merges into `dev` announced in
    /// `oc_dev`.
    pub fn default_config() -> Config {
        Config {
            projects: vec![ProjectConfig {
                repo: default_repo(),
                ticket_linking: true,
                rooms: vec![RoomRule {
                    room: "oc_dev".to_string(),
                    target_branch: "dev".to_string(),
                    source_branch: String::new(),
                }],
            }],
            ..Config::default()
        }
    }

    /// A harness whose git configuration points at an empty scratch
    /// directory; anything touching a clone fails.
    pub fn with_config(config: Config) -> Self {
        let scratch = TempDir::new().unwrap();
        let git = GitConfig {
            base_dir: scratch.path().join("clones"),
            remote_base: scratch.path().join("remotes").to_str().unwrap().to_string(),
            commit_identity: identity(),
        };
        let mut harness = Self::with_git(config, git);
        harness._scratch = Some(scratch);
        harness
    }

    pub fn with_git(config: Config, git: GitConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = Arc::new(MemoryStore::with_clock(Arc::clone(&clock) as Arc<dyn Clock>));
        let host = MockHost::new();
        let tracker = MockTracker::default();
        let chat = MockChat::default();

        let engine = Engine::new(
            config,
            Collaborators {
                host: host.clone(),
                tracker: tracker.clone(),
                chat: chat.clone(),
            },
            Arc::clone(&store) as Arc<dyn KvStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            git,
        )
        .unwrap();

        Self {
            engine,
            host,
            tracker,
            chat,
            store,
            clock,
            _scratch: None,
        }
    }
}
