use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid job arguments: {0}")]
    Args(#[from] serde_json::Error),
    #[error("delay of {0:?} puts the job past the latest schedulable time")]
    DelayOutOfRange(std::time::Duration),
    #[error("job execution failed: {0}")]
    TaskFailed(String),
}
