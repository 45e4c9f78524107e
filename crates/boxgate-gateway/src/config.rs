//! Gateway configuration

use boxgate_core::{BridgeConfig, EngineConfig, LongPollConfig, RetryConfig, StorageConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage backend selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory store (data is lost on restart)
    #[default]
    Memory,
    /// Plain files below `data_dir`
    Local,
}

/// Gateway server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Storage backend
    pub backend: BackendKind,
    /// Root directory of the local backend
    pub data_dir: PathBuf,
    /// JWT secret for authentication
    pub jwt_secret: Option<String>,
    /// Enable authentication
    pub auth_enabled: bool,
    /// Rate limit (requests per second per user)
    pub rate_limit_rps: u32,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Parallel driver calls per bulk operation
    pub bulk_concurrency: usize,
    /// Item ceiling for single (non-batch) folder operations
    pub max_interactive_items: usize,
    /// Attempts made when a fresh write is not visible yet
    pub retry_max_retries: u32,
    /// First retry delay (milliseconds)
    pub retry_base_delay_ms: u64,
    /// Retry delay cap (milliseconds)
    pub retry_max_delay_ms: u64,
    /// Where upload segments are kept on backends without native multipart
    pub upload_root: String,
    /// Long-poll check interval (milliseconds)
    pub poll_interval_ms: u64,
    /// Finished jobs and abandoned upload sessions are dropped after this
    pub job_expiry_secs: u64,
    /// How often expired jobs and sessions are swept
    pub cleanup_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            backend: BackendKind::Memory,
            data_dir: PathBuf::from("./data"),
            jwt_secret: None,
            auth_enabled: true,
            rate_limit_rps: 100,
            max_body_size: 150 * 1024 * 1024, // 150 MB, the Dropbox single-request cap
            cors_enabled: true,
            bulk_concurrency: EngineConfig::default().concurrency,
            max_interactive_items: 10_000,
            retry_max_retries: 5,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 30_000,
            upload_root: "/uploads".to_string(),
            poll_interval_ms: 1_000,
            job_expiry_secs: 24 * 60 * 60, // 24 hours
            cleanup_interval_secs: 60,
        }
    }
}

impl GatewayConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Layer an optional config file and `BOXGATE_*` environment variables
    /// over the defaults
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file));
        }
        let loaded = builder
            .add_source(config::Environment::with_prefix("BOXGATE").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(loaded)
    }

    pub fn job_expiry(&self) -> chrono::Duration {
        i64::try_from(self.job_expiry_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Settings of the storage layer
    pub fn storage_config(&self) -> StorageConfig {
        let defaults = StorageConfig::default();
        StorageConfig {
            bridge: BridgeConfig {
                retry: RetryConfig {
                    max_retries: self.retry_max_retries,
                    base_delay: Duration::from_millis(self.retry_base_delay_ms),
                    max_delay: Duration::from_millis(self.retry_max_delay_ms),
                },
                upload_root: self.upload_root.clone(),
            },
            engine: EngineConfig {
                concurrency: self.bulk_concurrency.max(1),
            },
            max_interactive_items: self.max_interactive_items,
            long_poll: LongPollConfig {
                poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
                ..defaults.long_poll
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_storage_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.storage_config(), StorageConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:8787");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "port = 9999\nbackend = \"local\"\ndata_dir = \"/srv/boxgate\"\nmax_interactive_items = 50"
        )
        .unwrap();

        let config = GatewayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.data_dir, PathBuf::from("/srv/boxgate"));
        assert_eq!(config.storage_config().max_interactive_items, 50);
        // Untouched keys keep their defaults
        assert_eq!(config.rate_limit_rps, 100);
    }
}
