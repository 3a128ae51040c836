mod env;
mod types;


pub use env::ENV_ADMIN_NAME;
pub use types::*;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, bail};
use skillhub_scheduler::{JobKind, parse_cron};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the services cannot start with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.sqlite_path.trim().is_empty() {
            bail!("store.sqlite_path must not be empty");
        }
        if self.store.blob_backend == BlobBackend::Fs
            && self
                .store
                .blob_dir
                .as_deref()
                .is_none_or(|d| d.trim().is_empty())
        {
            bail!("store.blob_dir is required when store.blob_backend = \"fs\"");
        }

        let mut seen = HashSet::new();
        for token in &self.gateway.tokens {
            if token.token.trim().is_empty() {
                bail!("gateway token for '{}' must not be empty", token.name);
            }
            if !seen.insert(token.token.as_str()) {
                bail!("gateway token for '{}' duplicates another token", token.name);
            }
        }

        if self.scheduler.poll_interval_secs == 0 {
            bail!("scheduler.poll_interval_secs must be greater than zero");
        }
        let mut names = HashSet::new();
        for task in &self.scheduler.tasks {
            if !names.insert(task.name.as_str()) {
                bail!("scheduler task name '{}' is used more than once", task.name);
            }
            parse_cron(&task.cron).with_context(|| format!("scheduler task '{}'", task.name))?;
            if matches!(JobKind::from_str_kind(&task.kind), JobKind::Custom(_)) {
                bail!(
                    "scheduler task '{}' has unknown kind '{}'",
                    task.name,
                    task.kind
                );
            }
        }
        Ok(())
    }
}
