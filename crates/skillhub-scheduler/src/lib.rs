//! Persistent delayed-job queue and cron tasks with `SQLite` storage.

mod error;
mod queue;
mod scheduler;
mod store;
mod task;

pub use error::SchedulerError;
pub use queue::JobQueue;
pub use scheduler::{DEFAULT_POLL_INTERVAL, Scheduler};
pub use store::{JobStatus, JobStore, QueuedJob};
pub use task::{JobHandler, JobKind, ScheduledTask, parse_cron};
