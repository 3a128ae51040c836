//! Configuration, caller roles, backfill entry points, and scheduler wiring.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod handlers;
pub mod service;

pub use auth::{AuthError, Identity, Role, require_role};
pub use config::Config;
pub use service::{
    BackfillService, RunRequest, RunResponse, ScheduleRequest, ScheduleResponse, ServiceError,
};
