//! The background loop: reconciliation ticks plus queued task delivery.
//!
//! One loop owns both sources of work. Ticks fire on the poll interval and
//! never overlap; a tick still running when the next one is due is skipped.
//! Due tasks are spawned as independent tokio tasks, bounded by a semaphore,
//! and removed from the queue once their handler returns.

use std::future::pending;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::chat::ChatClient;
use crate::effects::HostConnector;
use crate::engine::Engine;
use crate::tracker::IssueTracker;

use super::poll::PollConfig;
use super::queue::PendingTask;

pub struct Runner<H, T, C> {
    engine: Engine<H, T, C>,
    config: PollConfig,
}

impl<H, T, C> Runner<H, T, C>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    pub fn new(engine: Engine<H, T, C>, config: PollConfig) -> Self {
        Self { engine, config }
    }

    /// Runs until `shutdown` fires, then waits for in-flight work. Tasks that
    /// never started stay persisted for the next process.
    #[instrument(skip_all, fields(poll_interval = ?self.config.poll_interval))]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(pending = self.engine.queue().len(), "runner started");

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_tasks.max(1)));
        let ticking = Arc::new(AtomicBool::new(false));
        let mut work = JoinSet::new();

        loop {
            for task in self.engine.queue().take_due() {
                self.spawn_task(&mut work, Arc::clone(&permits), task);
            }
            let next_due = self.engine.queue().next_due_in();
            let mut tick_due = false;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, stopping runner");
                    break;
                }

                _ = ticker.tick() => tick_due = true,

                _ = self.engine.queue().notified() => {}

                _ = async {
                    match next_due {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => pending().await,
                    }
                } => {}

                Some(joined) = work.join_next(), if !work.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "background work panicked");
                    }
                }
            }

            if tick_due {
                self.spawn_tick(&mut work, &ticking);
            }
        }

        let remaining = work.len();
        if remaining > 0 {
            info!(remaining, "waiting for in-flight work");
        }
        while let Some(joined) = work.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "background work panicked");
            }
        }
        info!("runner stopped");
    }

    fn spawn_tick(&self, work: &mut JoinSet<()>, ticking: &Arc<AtomicBool>) {
        if ticking.swap(true, Ordering::AcqRel) {
            warn!("previous reconciliation tick still running, skipping");
            return;
        }
        let engine = self.engine.clone();
        let ticking = Arc::clone(ticking);
        work.spawn(async move {
            match engine.reconcile_tick().await {
                Ok(summary) => debug!(?summary, "reconciliation tick finished"),
                Err(e) => error!(error = %e, "reconciliation tick failed"),
            }
            ticking.store(false, Ordering::Release);
        });
    }

    fn spawn_task(&self, work: &mut JoinSet<()>, permits: Arc<Semaphore>, pending: PendingTask) {
        let engine = self.engine.clone();
        work.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            debug!(id = pending.id, kind = pending.task.kind(), "running task");
            engine.execute(pending.task).await;
            if let Err(e) = engine.queue().complete(pending.id) {
                error!(id = pending.id, error = %e, "failed to remove completed task");
            }
        });
    }
}
