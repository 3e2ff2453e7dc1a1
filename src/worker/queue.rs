//! Delayed task queue.
//!
//! Tasks become due at a wall-clock instant. Pending tasks are persisted
//! under [`PENDING_TASKS_KEY`] on every change, so a restart re-delivers
//! whatever had not completed (at-least-once). A task is removed only after
//! its handler returns; handlers that need a retry schedule a new task.
//!
//! Tasks taken by the runner are marked in flight so a later `take_due` does
//! not hand them out twice within the same process.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::clock::Clock;
use crate::store::{self, KvStore};

use super::task::Task;

pub const PENDING_TASKS_KEY: &str = "tasks:pending";

pub type TaskId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTask {
    pub id: TaskId,
    pub due_at: DateTime<Utc>,
    pub task: Task,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedQueue {
    next_id: TaskId,
    tasks: Vec<PendingTask>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: BTreeMap<TaskId, PendingTask>,
    in_flight: BTreeSet<TaskId>,
    next_id: TaskId,
}

impl QueueState {
    fn persisted(&self) -> PersistedQueue {
        PersistedQueue {
            next_id: self.next_id,
            tasks: self.pending.values().cloned().collect(),
        }
    }
}

pub struct TaskQueue {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl TaskQueue {
    /// Restores pending tasks from the store. Tasks that were in flight when
    /// the previous process stopped are pending again.
    pub fn load(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> store::Result<Self> {
        let persisted: PersistedQueue = store::load_json(store.as_ref(), PENDING_TASKS_KEY)?.unwrap_or_default();
        let next_id = persisted
            .tasks
            .iter()
            .map(|t| t.id + 1)
            .max()
            .unwrap_or(0)
            .max(persisted.next_id);

        if !persisted.tasks.is_empty() {
            tracing::info!(count = persisted.tasks.len(), "restored pending tasks");
        }

        let state = QueueState {
            pending: persisted.tasks.into_iter().map(|t| (t.id, t)).collect(),
            in_flight: BTreeSet::new(),
            next_id,
        };
        Ok(TaskQueue {
            store,
            clock,
            state: Mutex::new(state),
            notify: Notify::new(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, state: &QueueState) -> store::Result<()> {
        store::save_json(self.store.as_ref(), PENDING_TASKS_KEY, &state.persisted())
    }

    /// Adds a task due after `delay` and wakes the runner.
    pub fn schedule(&self, task: Task, delay: Duration) -> store::Result<TaskId> {
        let due_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| self.clock.now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.pending.insert(id, PendingTask { id, due_at, task });
            if let Err(e) = self.persist(&state) {
                state.pending.remove(&id);
                return Err(e);
            }
            id
        };
        tracing::debug!(task_id = id, %due_at, "scheduled task");
        self.notify.notify_one();
        Ok(id)
    }

    /// Marks every due task in flight and returns them, oldest first.
    pub fn take_due(&self) -> Vec<PendingTask> {
        let now = self.clock.now();
        let mut state = self.lock();
        let mut due: Vec<PendingTask> = state
            .pending
            .values()
            .filter(|t| t.due_at <= now && !state.in_flight.contains(&t.id))
            .cloned()
            .collect();
        due.sort_by_key(|t| (t.due_at, t.id));
        for task in &due {
            state.in_flight.insert(task.id);
        }
        due
    }

    /// Removes a delivered task.
    pub fn complete(&self, id: TaskId) -> store::Result<()> {
        let mut state = self.lock();
        state.in_flight.remove(&id);
        if state.pending.remove(&id).is_some() {
            self.persist(&state)?;
        }
        Ok(())
    }

    /// Time until the earliest task that is not in flight becomes due. Zero
    /// when one is already due; `None` when nothing is waiting.
    pub fn next_due_in(&self) -> Option<Duration> {
        let now = self.clock.now();
        let state = self.lock();
        state
            .pending
            .values()
            .filter(|t| !state.in_flight.contains(&t.id))
            .map(|t| t.due_at)
            .min()
            .map(|due| (due - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Resolves when a task is scheduled.
    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.notify.notified()
    }

    /// All pending tasks (including in-flight ones), oldest first.
    pub fn pending(&self) -> Vec<PendingTask> {
        let state = self.lock();
        let mut tasks: Vec<PendingTask> = state.pending.values().cloned().collect();
        tasks.sort_by_key(|t| (t.due_at, t.id));
        tasks
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("TaskQueue")
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}
