use serde::{Deserialize, Serialize};

use crate::auth::Role;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    #[default]
    Sqlite,
    Fs,
}

impl BlobBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Fs => "fs",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default)]
    pub blob_backend: BlobBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_dir: Option<String>,
}

pub(crate) fn default_sqlite_path() -> String {
    "./data/skillhub.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            blob_backend: BlobBackend::default(),
            blob_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct BackfillConfig {
    /// Delay applied to jobs enqueued through the `schedule` entry points.
    #[serde(default)]
    pub schedule_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default = "default_gateway_max_body")]
    pub max_body_size: usize,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

fn default_gateway_bind() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8090
}

fn default_gateway_max_body() -> usize {
    65_536
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            max_body_size: default_gateway_max_body(),
            tokens: Vec::new(),
        }
    }
}

/// A bearer token and the identity it authenticates as.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenConfig {
    pub name: String,
    pub token: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub tasks: Vec<ScheduledTaskConfig>,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
            tasks: Vec::new(),
        }
    }
}

/// A recurring backfill run, e.g. `cron = "0 0 3 * * *"`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduledTaskConfig {
    pub name: String,
    pub cron: String,
    pub kind: String,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}
