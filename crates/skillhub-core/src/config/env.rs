use super::{BlobBackend, Config, TokenConfig};
use crate::auth::Role;

/// Identity name given to the token supplied through `SKILLHUB_ADMIN_TOKEN`.
pub const ENV_ADMIN_NAME: &str = "env-admin";

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_store();
        self.apply_env_overrides_services();
    }

    fn apply_env_overrides_store(&mut self) {
        if let Ok(v) = std::env::var("SKILLHUB_SQLITE_PATH") {
            self.store.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("SKILLHUB_BLOB_BACKEND") {
            if let Ok(backend) = serde_json::from_value::<BlobBackend>(serde_json::Value::String(
                v.to_lowercase(),
            )) {
                self.store.blob_backend = backend;
            } else {
                tracing::warn!("ignoring invalid SKILLHUB_BLOB_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SKILLHUB_BLOB_DIR") {
            self.store.blob_dir = Some(v);
        }
    }

    fn apply_env_overrides_services(&mut self) {
        if let Ok(v) = std::env::var("SKILLHUB_GATEWAY_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.gateway.enabled = enabled;
        }
        if let Ok(v) = std::env::var("SKILLHUB_GATEWAY_BIND") {
            self.gateway.bind = v;
        }
        if let Ok(v) = std::env::var("SKILLHUB_GATEWAY_PORT")
            && let Ok(port) = v.parse::<u16>()
        {
            self.gateway.port = port;
        }
        if let Ok(v) = std::env::var("SKILLHUB_ADMIN_TOKEN") {
            self.gateway.tokens.retain(|t| t.name != ENV_ADMIN_NAME);
            self.gateway.tokens.push(TokenConfig {
                name: ENV_ADMIN_NAME.into(),
                token: v,
                role: Role::Admin,
            });
        }
        if let Ok(v) = std::env::var("SKILLHUB_SCHEDULER_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.scheduler.enabled = enabled;
        }
        if let Ok(v) = std::env::var("SKILLHUB_SCHEDULER_POLL_SECS")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.scheduler.poll_interval_secs = secs;
        }
        if let Ok(v) = std::env::var("SKILLHUB_LOG") {
            self.log.filter = v;
        }
    }
}
