use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::{Notify, watch};

use crate::error::SchedulerError;
use crate::queue::JobQueue;
use crate::store::{JobStore, QueuedJob};
use crate::task::{JobHandler, JobKind, ScheduledTask};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    store: JobStore,
    handlers: HashMap<String, Box<dyn JobHandler>>,
    shutdown_rx: watch::Receiver<bool>,
    notify: Arc<Notify>,
    poll_interval: Duration,
}

impl Scheduler {
    #[must_use]
    pub fn new(store: JobStore, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            tasks: Vec::new(),
            store,
            handlers: HashMap::new(),
            shutdown_rx,
            notify: Arc::new(Notify::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Handle for enqueueing jobs that this scheduler will pick up.
    #[must_use]
    pub fn queue(&self) -> JobQueue {
        JobQueue::with_notify(self.store.clone(), self.notify.clone())
    }

    pub fn add_task(&mut self, task: ScheduledTask) {
        self.tasks.push(task);
    }

    pub fn register_handler(&mut self, kind: &JobKind, handler: Box<dyn JobHandler>) {
        self.handlers.insert(kind.as_str().to_owned(), handler);
    }

    /// Initialize the store, recover interrupted jobs and sync task definitions.
    ///
    /// A task seen for the first time gets the current time as its last run, so
    /// it first fires at its next cron occurrence rather than on startup.
    ///
    /// # Errors
    ///
    /// Returns an error if DB init or upsert fails.
    pub async fn init(&self) -> Result<(), SchedulerError> {
        self.store.init().await?;
        let recovered = self.store.reset_running().await?;
        if recovered > 0 {
            tracing::warn!(recovered, "re-queued jobs interrupted while running");
        }
        let now = timestamp(Utc::now());
        for task in &self.tasks {
            self.store
                .upsert_job(&task.name, &task.schedule.to_string(), task.kind.as_str())
                .await?;
            if self.store.seed_last_run(&task.name, &now).await? {
                tracing::debug!(task = %task.name, "new task waits for its next occurrence");
            }
        }
        Ok(())
    }

    /// Run the scheduler loop until shutdown is signalled.
    ///
    /// Wakes every poll interval, or immediately when a job is enqueued.
    pub async fn run(&mut self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let notify = self.notify.clone();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                () = notify.notified() => {
                    self.tick().await;
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        tracing::info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub(crate) async fn tick(&self) {
        self.run_due_tasks().await;
        self.drain_queue().await;
    }

    async fn run_due_tasks(&self) {
        for task in &self.tasks {
            let should_run = match self.store.last_run(&task.name).await {
                Ok(last_run) => is_task_due(&task.schedule, last_run.as_deref()),
                Err(e) => {
                    tracing::warn!(task = %task.name, "failed to check last_run: {e}");
                    false
                }
            };
            if !should_run {
                continue;
            }

            let Some(handler) = self.handlers.get(task.kind.as_str()) else {
                tracing::debug!(task = %task.name, kind = task.kind.as_str(), "no handler registered");
                continue;
            };
            tracing::info!(task = %task.name, kind = task.kind.as_str(), "executing task");
            match handler.execute(&task.args).await {
                Ok(()) => {
                    let now = timestamp(Utc::now());
                    if let Err(e) = self.store.record_run(&task.name, &now).await {
                        tracing::warn!(task = %task.name, "failed to record run: {e}");
                    }
                }
                Err(e) => {
                    tracing::warn!(task = %task.name, "task execution failed: {e}");
                }
            }
        }
    }

    async fn drain_queue(&self) {
        loop {
            let now = timestamp(Utc::now());
            let job = match self.store.claim_due(&now).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("failed to claim queued job: {e}");
                    break;
                }
            };
            self.execute_queued(job).await;
        }
    }

    async fn execute_queued(&self, job: QueuedJob) {
        let result = match self.handlers.get(&job.kind) {
            Some(handler) => {
                tracing::info!(job_id = job.id, kind = %job.kind, attempt = job.attempts, "executing queued job");
                handler.execute(&job.args).await
            }
            None => Err(SchedulerError::TaskFailed(format!(
                "no handler registered for {}",
                job.kind
            ))),
        };

        let finished_at = timestamp(Utc::now());
        let recorded = match result {
            Ok(()) => {
                tracing::info!(job_id = job.id, kind = %job.kind, "queued job completed");
                self.store.mark_completed(job.id, &finished_at).await
            }
            Err(e) => {
                tracing::warn!(job_id = job.id, kind = %job.kind, "queued job failed: {e}");
                self.store
                    .mark_failed(job.id, &e.to_string(), &finished_at)
                    .await
            }
        };
        if let Err(e) = recorded {
            tracing::warn!(job_id = job.id, "failed to record job outcome: {e}");
        }
    }
}

/// Fixed-width UTC timestamp; lexical order matches time order.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Check if a task is due by finding the first cron occurrence after `last_run`
/// and verifying it is <= `now`.
fn is_task_due(schedule: &cron::Schedule, last_run: Option<&str>) -> bool {
    let now = Utc::now();
    let Some(after) = last_run.and_then(|s| s.parse::<DateTime<Utc>>().ok()) else {
        return true;
    };
    schedule.after(&after).take(1).any(|dt| dt <= now)
}
