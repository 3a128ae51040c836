use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, TimeDelta, Utc};
use tokio::sync::Notify;

use crate::error::SchedulerError;
use crate::scheduler::timestamp;
use crate::store::JobStore;
use crate::task::JobKind;

/// Last year whose RFC 3339 form has a four-digit year.
const MAX_RUN_AT_YEAR: i32 = 9999;

/// Handle for enqueueing delayed jobs. Cloned handles share the scheduler's
/// wake-up signal.
#[derive(Clone)]
pub struct JobQueue {
    store: JobStore,
    notify: Arc<Notify>,
}

impl JobQueue {
    /// Queue handle for a process that does not run the scheduler itself.
    /// A scheduler polling the same database picks the jobs up.
    #[must_use]
    pub fn new(store: JobStore) -> Self {
        Self::with_notify(store, Arc::new(Notify::new()))
    }

    pub(crate) fn with_notify(store: JobStore, notify: Arc<Notify>) -> Self {
        Self { store, notify }
    }

    /// Persist a job of `kind` to run after `delay` and wake the scheduler.
    ///
    /// # Errors
    ///
    /// Returns `DelayOutOfRange` if the run time falls after year 9999, where
    /// stored timestamps stop sorting in time order, or an error if the job
    /// cannot be stored.
    pub async fn enqueue(
        &self,
        delay: Duration,
        kind: &JobKind,
        args: serde_json::Value,
    ) -> Result<i64, SchedulerError> {
        let now = Utc::now();
        let run_at = TimeDelta::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .filter(|at| at.year() <= MAX_RUN_AT_YEAR)
            .ok_or(SchedulerError::DelayOutOfRange(delay))?;
        let id = self
            .store
            .insert_job(kind.as_str(), &args, &timestamp(run_at))
            .await?;
        tracing::info!(job_id = id, kind = kind.as_str(), delay_secs = delay.as_secs(), "job enqueued");
        self.notify.notify_one();
        Ok(id)
    }

    #[must_use]
    pub fn store(&self) -> &JobStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JobStatus;
    use crate::store::tests::test_pool;

    async fn queue() -> (JobQueue, Arc<Notify>) {
        let store = JobStore::new(test_pool().await);
        store.init().await.unwrap();
        let notify = Arc::new(Notify::new());
        (JobQueue::with_notify(store, notify.clone()), notify)
    }

    #[tokio::test]
    async fn enqueue_persists_pending_job() {
        let (queue, _) = queue().await;
        let id = queue
            .enqueue(
                Duration::ZERO,
                &JobKind::SummaryBackfill,
                serde_json::json!({"dryRun": false}),
            )
            .await
            .unwrap();

        let job = queue.store().job(id).await.unwrap().unwrap();
        assert_eq!(job.kind, "summary_backfill");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.args["dryRun"], false);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn delayed_job_is_not_due_yet() {
        let (queue, _) = queue().await;
        queue
            .enqueue(
                Duration::from_secs(3600),
                &JobKind::FingerprintBackfill,
                serde_json::Value::Null,
            )
            .await
            .unwrap();

        let now = timestamp(Utc::now());
        assert!(queue.store().claim_due(&now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overflowing_delay_is_rejected() {
        let (queue, _) = queue().await;
        for delay in [Duration::MAX, Duration::from_secs(10_000 * 366 * 24 * 3600)] {
            let err = queue
                .enqueue(delay, &JobKind::SummaryBackfill, serde_json::Value::Null)
                .await
                .unwrap_err();
            assert!(matches!(err, SchedulerError::DelayOutOfRange(_)));
        }

        let far_future = "9999-12-31T23:59:59.999Z";
        assert!(queue.store().claim_due(far_future).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_wakes_waiter() {
        let (queue, notify) = queue().await;
        queue
            .enqueue(Duration::ZERO, &JobKind::SummaryBackfill, serde_json::Value::Null)
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), notify.notified())
            .await
            .expect("stored permit should wake the waiter");
    }
}
