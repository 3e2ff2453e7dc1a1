//! The engine: configuration plus collaborators, shared by the runner and
//! the HTTP surface.
//!
//! Behaviour lives in the component modules as `impl Engine` blocks:
//! [`crate::reconcile`] (the snapshot differ), [`crate::linker`],
//! [`crate::confirm`], [`crate::notify`] and [`crate::release`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::chat::ChatClient;
use crate::clock::Clock;
use crate::config::Config;
use crate::confirm::BackoffPolicy;
use crate::effects::HostConnector;
use crate::git::GitConfig;
use crate::store::{self, KvStore};
use crate::tracker::IssueTracker;
use crate::worker::{Task, TaskId, TaskQueue};

/// The three remote systems the engine talks to.
pub struct Collaborators<H, T, C> {
    pub host: H,
    pub tracker: T,
    pub chat: C,
}

struct Inner<H, T, C> {
    config: Config,
    host: H,
    tracker: T,
    chat: C,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    queue: TaskQueue,
    git: GitConfig,
    backoff: BackoffPolicy,
    /// Local clones are not safe for concurrent use.
    git_lock: tokio::sync::Mutex<()>,
}

pub struct Engine<H, T, C> {
    inner: Arc<Inner<H, T, C>>,
}

impl<H, T, C> Clone for Engine<H, T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H, T, C> Engine<H, T, C>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    /// Builds the engine and restores pending tasks from `store`.
    pub fn new(
        config: Config,
        collaborators: Collaborators<H, T, C>,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        git: GitConfig,
    ) -> store::Result<Self> {
        let queue = TaskQueue::load(Arc::clone(&store), Arc::clone(&clock))?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                host: collaborators.host,
                tracker: collaborators.tracker,
                chat: collaborators.chat,
                store,
                clock,
                queue,
                git,
                backoff: BackoffPolicy::DEFAULT,
                git_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    pub fn tracker(&self) -> &T {
        &self.inner.tracker
    }

    pub fn chat(&self) -> &C {
        &self.inner.chat
    }

    pub fn store(&self) -> &dyn KvStore {
        self.inner.store.as_ref()
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    pub fn git(&self) -> &GitConfig {
        &self.inner.git
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.inner.backoff
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    pub(crate) async fn lock_git(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.git_lock.lock().await
    }

    pub fn schedule(&self, task: Task, delay: Duration) -> store::Result<TaskId> {
        self.inner.queue.schedule(task, delay)
    }

    /// Runs one delivered task. Failures are logged here; handlers that want
    /// another attempt schedule it themselves.
    pub async fn execute(&self, task: Task) {
        match task {
            Task::Link { repo, number } => {
                let outcome = self.link(&repo, number).await;
                info!(%repo, %number, ?outcome, "link task finished");
            }
            Task::Confirm { target, delay_secs } => {
                match self.confirm(&target, Duration::from_secs(delay_secs)).await {
                    Ok(outcome) => info!(
                        repo = %target.repo,
                        number = %target.number,
                        ?outcome,
                        "confirmation step finished"
                    ),
                    Err(e) => warn!(
                        repo = %target.repo,
                        number = %target.number,
                        error = %e,
                        "confirmation step failed"
                    ),
                }
            }
        }
    }
}
