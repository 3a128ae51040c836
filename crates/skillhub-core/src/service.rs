use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skillhub_backfill::{
    BackfillError, BackfillParams, FingerprintBackfill, FingerprintStats, SummaryBackfill,
    SummaryStats,
};
use skillhub_scheduler::{JobKind, JobQueue, SchedulerError};
use thiserror::Error;

use crate::auth::{AuthError, Identity, Role, require_role};
use crate::handlers::JobArgs;

const BACKFILL_ROLES: &[Role] = &[Role::Admin];

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Backfill(#[from] BackfillError),
    #[error("failed to schedule job: {0}")]
    Schedule(#[from] SchedulerError),
}

/// Raw run parameters as a caller sends them; sizes are clamped before use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub dry_run: Option<bool>,
    #[serde(default)]
    pub batch_size: Option<f64>,
    #[serde(default)]
    pub max_batches: Option<f64>,
}

impl RunRequest {
    #[must_use]
    pub fn params(&self) -> BackfillParams {
        BackfillParams::from_raw(self.dry_run, self.batch_size, self.max_batches)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    #[serde(default)]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse<S> {
    pub ok: bool,
    pub stats: S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub ok: bool,
    pub job_id: i64,
}

/// Authorized entry points for running or scheduling the backfill jobs.
pub struct BackfillService {
    summary: Arc<SummaryBackfill>,
    fingerprint: Arc<FingerprintBackfill>,
    queue: JobQueue,
    schedule_delay: Duration,
}

impl BackfillService {
    #[must_use]
    pub fn new(
        summary: Arc<SummaryBackfill>,
        fingerprint: Arc<FingerprintBackfill>,
        queue: JobQueue,
    ) -> Self {
        Self {
            summary,
            fingerprint,
            queue,
            schedule_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_schedule_delay(mut self, delay: Duration) -> Self {
        self.schedule_delay = delay;
        self
    }

    /// Check that `caller` may run or schedule backfills, before any request
    /// input is looked at.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` without a caller and `Forbidden` for non-admins.
    pub fn authorize(caller: Option<&Identity>) -> Result<&Identity, ServiceError> {
        Ok(require_role(caller, BACKFILL_ROLES)?)
    }

    /// Run the summary backfill now.
    ///
    /// # Errors
    ///
    /// Fails if the caller is not an admin, if the scan does not finish within
    /// `maxBatches`, or on a store error.
    pub async fn run_summary_backfill(
        &self,
        caller: Option<&Identity>,
        request: RunRequest,
    ) -> Result<RunResponse<SummaryStats>, ServiceError> {
        let identity = Self::authorize(caller)?;
        let params = request.params();
        tracing::info!(
            caller = %identity.name,
            dry_run = params.dry_run,
            batch_size = params.batch_size,
            max_batches = params.max_batches,
            "summary backfill requested"
        );
        let stats = self.summary.run(params).await?;
        Ok(RunResponse { ok: true, stats })
    }

    /// Run the fingerprint backfill now.
    ///
    /// # Errors
    ///
    /// Fails if the caller is not an admin, if the scan does not finish within
    /// `maxBatches`, or on a store error.
    pub async fn run_fingerprint_backfill(
        &self,
        caller: Option<&Identity>,
        request: RunRequest,
    ) -> Result<RunResponse<FingerprintStats>, ServiceError> {
        let identity = Self::authorize(caller)?;
        let params = request.params();
        tracing::info!(
            caller = %identity.name,
            dry_run = params.dry_run,
            batch_size = params.batch_size,
            max_batches = params.max_batches,
            "fingerprint backfill requested"
        );
        let stats = self.fingerprint.run(params).await?;
        Ok(RunResponse { ok: true, stats })
    }

    /// Queue a summary backfill with default batch sizes.
    ///
    /// # Errors
    ///
    /// Fails if the caller is not an admin or the job cannot be stored.
    pub async fn schedule_summary_backfill(
        &self,
        caller: Option<&Identity>,
        request: ScheduleRequest,
    ) -> Result<ScheduleResponse, ServiceError> {
        self.schedule(caller, JobKind::SummaryBackfill, request)
            .await
    }

    /// Queue a fingerprint backfill with default batch sizes.
    ///
    /// # Errors
    ///
    /// Fails if the caller is not an admin or the job cannot be stored.
    pub async fn schedule_fingerprint_backfill(
        &self,
        caller: Option<&Identity>,
        request: ScheduleRequest,
    ) -> Result<ScheduleResponse, ServiceError> {
        self.schedule(caller, JobKind::FingerprintBackfill, request)
            .await
    }

    async fn schedule(
        &self,
        caller: Option<&Identity>,
        kind: JobKind,
        request: ScheduleRequest,
    ) -> Result<ScheduleResponse, ServiceError> {
        let identity = Self::authorize(caller)?;
        let args = JobArgs {
            dry_run: request.dry_run.unwrap_or(false),
        };
        let job_id = self
            .queue
            .enqueue(self.schedule_delay, &kind, args.to_value())
            .await?;
        tracing::info!(caller = %identity.name, job_id, kind = kind.as_str(), "backfill scheduled");
        Ok(ScheduleResponse { ok: true, job_id })
    }
}
