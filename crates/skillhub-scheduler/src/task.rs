use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use cron::Schedule as CronSchedule;

use crate::error::SchedulerError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobKind {
    SummaryBackfill,
    FingerprintBackfill,
    Custom(String),
}

impl JobKind {
    #[must_use]
    pub fn from_str_kind(s: &str) -> Self {
        match s {
            "summary_backfill" => Self::SummaryBackfill,
            "fingerprint_backfill" => Self::FingerprintBackfill,
            other => Self::Custom(other.to_owned()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SummaryBackfill => "summary_backfill",
            Self::FingerprintBackfill => "fingerprint_backfill",
            Self::Custom(s) => s,
        }
    }
}

pub struct ScheduledTask {
    pub name: String,
    pub schedule: CronSchedule,
    pub kind: JobKind,
    pub args: serde_json::Value,
}

impl ScheduledTask {
    /// Create a new scheduled task from a cron expression string.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidCron` if the expression is not valid.
    pub fn new(
        name: impl Into<String>,
        cron_expr: &str,
        kind: JobKind,
        args: serde_json::Value,
    ) -> Result<Self, SchedulerError> {
        let schedule = parse_cron(cron_expr)?;
        Ok(Self {
            name: name.into(),
            schedule,
            kind,
            args,
        })
    }
}

/// Parse a six-field (seconds first) cron expression.
///
/// # Errors
///
/// Returns `SchedulerError::InvalidCron` if the expression is not valid.
pub fn parse_cron(cron_expr: &str) -> Result<CronSchedule, SchedulerError> {
    CronSchedule::from_str(cron_expr)
        .map_err(|e| SchedulerError::InvalidCron(format!("{cron_expr}: {e}")))
}

/// Executes one job of a registered kind with its stored arguments.
pub trait JobHandler: Send + Sync {
    fn execute(
        &self,
        args: &serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), SchedulerError>> + Send + '_>>;
}
