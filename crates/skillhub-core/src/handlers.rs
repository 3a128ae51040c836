//! Scheduler handlers that run the backfill jobs from queued or cron arguments.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use skillhub_backfill::{BackfillParams, FingerprintBackfill, SummaryBackfill};
use skillhub_scheduler::{JobHandler, SchedulerError};

/// Arguments stored with a scheduled backfill job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobArgs {
    pub dry_run: bool,
}

impl JobArgs {
    /// Decode stored arguments; `null` means defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is neither `null` nor a matching object.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, SchedulerError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(Self::deserialize(value)?)
    }

    #[must_use]
    pub fn to_value(self) -> serde_json::Value {
        serde_json::json!({ "dryRun": self.dry_run })
    }
}

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SchedulerError>> + Send + 'a>>;

pub struct SummaryBackfillHandler {
    job: Arc<SummaryBackfill>,
}

impl SummaryBackfillHandler {
    #[must_use]
    pub fn new(job: Arc<SummaryBackfill>) -> Self {
        Self { job }
    }
}

impl JobHandler for SummaryBackfillHandler {
    fn execute(&self, args: &serde_json::Value) -> HandlerFuture<'_> {
        let args = JobArgs::from_value(args);
        Box::pin(async move {
            let params = BackfillParams::scheduled(args?.dry_run);
            let stats = self
                .job
                .run(params)
                .await
                .map_err(|e| SchedulerError::TaskFailed(e.to_string()))?;
            tracing::info!(
                dry_run = params.dry_run,
                skills_patched = stats.skills_patched,
                versions_patched = stats.versions_patched,
                "scheduled summary backfill finished"
            );
            Ok(())
        })
    }
}

pub struct FingerprintBackfillHandler {
    job: Arc<FingerprintBackfill>,
}

impl FingerprintBackfillHandler {
    #[must_use]
    pub fn new(job: Arc<FingerprintBackfill>) -> Self {
        Self { job }
    }
}

impl JobHandler for FingerprintBackfillHandler {
    fn execute(&self, args: &serde_json::Value) -> HandlerFuture<'_> {
        let args = JobArgs::from_value(args);
        Box::pin(async move {
            let params = BackfillParams::scheduled(args?.dry_run);
            let stats = self
                .job
                .run(params)
                .await
                .map_err(|e| SchedulerError::TaskFailed(e.to_string()))?;
            tracing::info!(
                dry_run = params.dry_run,
                versions_patched = stats.versions_patched,
                fingerprints_inserted = stats.fingerprints_inserted,
                "scheduled fingerprint backfill finished"
            );
            Ok(())
        })
    }
}
