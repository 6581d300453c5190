//! Configuration management with validation and defaults
//!
//! One TOML document covers storage, settlement, the HTTP API and logging.
//! Every section has sensible defaults so a partial file is enough.

use crate::errors::{ConfigurationError, RaspadinhaResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root platform configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RaspadinhaConfig {
    pub storage: StorageConfig,
    pub settlement: SettlementConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

/// RocksDB storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: usize,
    pub compression_type: CompressionType,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./DB/raspadinha_data".to_string(),
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            compression_type: CompressionType::Lz4,
            clear_on_start: false,
        }
    }
}

/// Settlement engine tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Upper bound on waiting for a user's balance lock before a play is
    /// reported as a transient conflict
    pub lock_timeout_ms: u64,
    /// Largest page served by history queries
    pub max_history_page: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            max_history_page: 200,
        }
    }
}

/// HTTP API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    pub enable_metrics: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            enable_metrics: true,
        }
    }
}

impl RaspadinhaConfig {
    /// Local development: throwaway database, verbose logs
    pub fn development() -> Self {
        Self {
            storage: StorageConfig {
                data_directory: "./DB/raspadinha_dev".to_string(),
                clear_on_start: true,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Production deployment with persistence and tighter lock waits
    pub fn production() -> Self {
        Self {
            storage: StorageConfig {
                write_buffer_size_mb: 128,
                max_write_buffer_number: 6,
                clear_on_start: false,
                ..Default::default()
            },
            settlement: SettlementConfig {
                lock_timeout_ms: 1_000,
                ..Default::default()
            },
            api: ApiConfig {
                request_timeout_secs: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> RaspadinhaResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.storage.data_directory.trim().is_empty() {
            return Err(ConfigurationError::ValidationFailed(
                "storage.data_directory must not be empty".to_string(),
            ));
        }

        if self.storage.write_buffer_size_mb == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "storage.write_buffer_size_mb must be > 0".to_string(),
            ));
        }

        if self.settlement.lock_timeout_ms == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "settlement.lock_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.settlement.max_history_page == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "settlement.max_history_page must be > 0".to_string(),
            ));
        }

        // A play waiting on a lock must give up before the HTTP layer does
        if self.lock_timeout() >= self.request_timeout() {
            return Err(ConfigurationError::ValidationFailed(
                "settlement.lock_timeout_ms must be shorter than api.request_timeout_secs"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.settlement.lock_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}
