//! Background processing: the poll loop and the delayed task queue.
//!
//! The engine has two sources of work. The snapshot differ runs on a fixed
//! interval; everything it (or an HTTP command) decides to do later goes
//! through the persisted [`TaskQueue`], which the [`Runner`] drains as tasks
//! come due.
//!
//! # Module Structure
//!
//! - [`task`]: the task variants
//! - [`queue`]: persisted, clock-driven delay queue
//! - [`poll`]: polling configuration
//! - [`runner`]: the loop tying them together

mod poll;
mod queue;
mod runner;
mod task;

pub use poll::{POLL_INTERVAL_ENV, PollConfig};
pub use queue::{PENDING_TASKS_KEY, PendingTask, TaskId, TaskQueue};
pub use runner::Runner;
pub use task::Task;
