//! Wiring from [`Config`] to stores, jobs, the scheduler and the service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use skillhub_backfill::{Blake3FileHasher, FingerprintBackfill, FrontmatterPatcher, SummaryBackfill};
use skillhub_scheduler::{JobKind, JobQueue, JobStore, ScheduledTask, Scheduler};
use skillhub_store::{BlobStore, FsBlobStore, SqliteStore};
use tokio::sync::watch;

use crate::config::{BlobBackend, Config, SchedulerConfig, StoreConfig};
use crate::handlers::{FingerprintBackfillHandler, JobArgs, SummaryBackfillHandler};
use crate::service::BackfillService;

/// Open store handles shared by every entry point.
#[derive(Clone)]
pub struct Stores {
    pub registry: Arc<SqliteStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub jobs: JobStore,
}

impl Stores {
    /// Open the registry database, the configured blob backend and the job tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated, or the
    /// blob directory is missing from the config.
    pub async fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(
            SqliteStore::new(&config.sqlite_path)
                .await
                .with_context(|| format!("failed to open registry at {}", config.sqlite_path))?,
        );
        let blobs: Arc<dyn BlobStore> = match config.blob_backend {
            BlobBackend::Sqlite => registry.clone(),
            BlobBackend::Fs => {
                let dir = config
                    .blob_dir
                    .as_deref()
                    .context("store.blob_dir is required for the fs blob backend")?;
                Arc::new(FsBlobStore::new(dir))
            }
        };
        let jobs = JobStore::new(registry.pool().clone());
        jobs.init().await.context("failed to initialize job tables")?;
        tracing::info!(
            sqlite_path = %config.sqlite_path,
            blob_backend = config.blob_backend.as_str(),
            "stores opened"
        );
        Ok(Self {
            registry,
            blobs,
            jobs,
        })
    }
}

/// The two backfill jobs with the default README patcher and file hasher.
#[derive(Clone)]
pub struct Jobs {
    pub summary: Arc<SummaryBackfill>,
    pub fingerprint: Arc<FingerprintBackfill>,
}

impl Jobs {
    #[must_use]
    pub fn new(stores: &Stores) -> Self {
        Self {
            summary: Arc::new(SummaryBackfill::new(
                stores.registry.clone(),
                stores.blobs.clone(),
                Arc::new(FrontmatterPatcher),
            )),
            fingerprint: Arc::new(FingerprintBackfill::new(
                stores.registry.clone(),
                Arc::new(Blake3FileHasher),
            )),
        }
    }
}

/// Build a scheduler with both backfill handlers and the configured cron tasks.
///
/// # Errors
///
/// Returns an error if a task has an invalid cron expression.
pub fn build_scheduler(
    config: &SchedulerConfig,
    stores: &Stores,
    jobs: &Jobs,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<Scheduler> {
    let mut scheduler = Scheduler::new(stores.jobs.clone(), shutdown_rx)
        .with_poll_interval(Duration::from_secs(config.poll_interval_secs.max(1)));
    scheduler.register_handler(
        &JobKind::SummaryBackfill,
        Box::new(SummaryBackfillHandler::new(jobs.summary.clone())),
    );
    scheduler.register_handler(
        &JobKind::FingerprintBackfill,
        Box::new(FingerprintBackfillHandler::new(jobs.fingerprint.clone())),
    );
    for task in &config.tasks {
        let args = JobArgs {
            dry_run: task.dry_run,
        };
        scheduler.add_task(
            ScheduledTask::new(
                task.name.clone(),
                &task.cron,
                JobKind::from_str_kind(&task.kind),
                args.to_value(),
            )
            .with_context(|| format!("invalid scheduler task '{}'", task.name))?,
        );
    }
    Ok(scheduler)
}

/// Build the service on top of `queue`, applying the configured schedule delay.
#[must_use]
pub fn build_service(config: &Config, jobs: &Jobs, queue: JobQueue) -> BackfillService {
    BackfillService::new(jobs.summary.clone(), jobs.fingerprint.clone(), queue)
        .with_schedule_delay(Duration::from_secs(config.backfill.schedule_delay_secs))
}
