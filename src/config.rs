//! Configuration management with validation and defaults
//!
//! `RgsConfig` is loaded from TOML, overridden from `RGS_*` environment
//! variables and validated before anything is started.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgsConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub game: GameConfig,
    pub ledger: LedgerConfig,
    pub rng: RngConfig,
    pub monitoring: MonitoringConfig,
}

/// HTTP surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Deadline for a single play; expiry interrupts the cycle.
    pub play_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            play_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: i32,
    pub compression: CompressionType,
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: "./rgs_data".to_string(),
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            compression: CompressionType::Lz4,
            clear_on_start: false,
        }
    }
}

/// What `play` does when outcome generation fails after the wager debit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeFailurePolicy {
    /// Credit the wager back immediately and void the cycle.
    Compensate,
    /// Hold the wager and leave the cycle interrupted for an operator.
    Interrupt,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub currency: String,
    /// Denominator of paytable values
    pub unit_stake: i64,
    /// Wins at or above this many minor units are audited as large wins
    pub large_win_threshold: i64,
    pub min_rtp: f64,
    pub outcome_failure_policy: OutcomeFailurePolicy,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            unit_stake: 100,
            large_win_threshold: 10_000,
            min_rtp: 0.75,
            outcome_failure_policy: OutcomeFailurePolicy::Compensate,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub default_history_limit: usize,
    pub max_history_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_history_limit: 50,
            max_history_limit: 500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RngConfig {
    pub health_check_on_startup: bool,
    /// 0 disables the background monitor
    pub health_check_interval_secs: u64,
    pub disable_gaming_on_health_failure: bool,
}

impl Default for RngConfig {
    fn default() -> Self {
        Self {
            health_check_on_startup: true,
            health_check_interval_secs: 300,
            disable_gaming_on_health_failure: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub enable_metrics: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "rgs_core=info,tower_http=info".to_string(),
            enable_metrics: true,
        }
    }
}

impl RgsConfig {
    /// Local development: in-memory storage and a chatty monitor.
    pub fn development() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..Default::default()
            },
            rng: RngConfig {
                health_check_interval_secs: 30,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: "rgs_core=debug,tower_http=debug".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Persistent deployment
    pub fn production() -> Self {
        Self {
            server: ServerConfig {
                allowed_origins: vec!["https://casino.example.com".to_string()],
                ..Default::default()
            },
            storage: StorageConfig {
                backend: StorageBackend::RocksDb,
                data_directory: "./DB/rgs_data".to_string(),
                write_buffer_size_mb: 128,
                max_write_buffer_number: 4,
                compression: CompressionType::Zstd,
                clear_on_start: false,
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be > 0"));
        }
        if self.server.play_timeout_ms == 0 {
            return Err(invalid("server.play_timeout_ms must be > 0"));
        }
        if self.game.currency.trim().is_empty() {
            return Err(invalid("game.currency must not be empty"));
        }
        if self.game.unit_stake <= 0 {
            return Err(invalid("game.unit_stake must be > 0"));
        }
        if self.game.large_win_threshold < 0 {
            return Err(invalid("game.large_win_threshold must be >= 0"));
        }
        if !(self.game.min_rtp > 0.0 && self.game.min_rtp <= 1.0) {
            return Err(invalid("game.min_rtp must be in (0, 1]"));
        }
        if self.ledger.default_history_limit == 0 || self.ledger.max_history_limit == 0 {
            return Err(invalid("ledger history limits must be > 0"));
        }
        if self.ledger.default_history_limit > self.ledger.max_history_limit {
            return Err(invalid(
                "ledger.default_history_limit must not exceed ledger.max_history_limit",
            ));
        }
        Ok(())
    }

    pub fn play_timeout(&self) -> Duration {
        Duration::from_millis(self.server.play_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Option<Duration> {
        match self.rng.health_check_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn invalid(msg: &str) -> ConfigurationError {
    ConfigurationError::ValidationFailed(msg.to_string())
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load from file (or defaults), apply `RGS_*` overrides, validate.
    pub fn load(&self) -> Result<RgsConfig, ConfigurationError> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Same as `load` with an injectable environment lookup.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<RgsConfig, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.config_path {
            Some(path) if path.exists() => Self::load_from_file(path)?,
            _ => RgsConfig::default(),
        };

        apply_env_overrides(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<RgsConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    pub fn save<P: AsRef<Path>>(config: &RgsConfig, path: P) -> Result<(), ConfigurationError> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            ConfigurationError::SaveFailed(format!(
                "Failed to write {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String, reason: &str) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: key.to_string(),
        value,
        reason: reason.to_string(),
    })
}

fn apply_env_overrides<F>(config: &mut RgsConfig, lookup: F) -> Result<(), ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("RGS_HOST") {
        config.server.host = host;
    }
    if let Some(port) = lookup("RGS_PORT") {
        config.server.port = parse_var("RGS_PORT", port, "Invalid port number")?;
    }
    if let Some(currency) = lookup("RGS_CURRENCY") {
        config.game.currency = currency.to_uppercase();
    }
    if let Some(dir) = lookup("RGS_DATA_DIR") {
        config.storage.data_directory = dir;
    }
    if let Some(backend) = lookup("RGS_STORAGE_BACKEND") {
        config.storage.backend = match backend.to_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "rocksdb" => StorageBackend::RocksDb,
            _ => {
                return Err(ConfigurationError::InvalidValue {
                    field: "RGS_STORAGE_BACKEND".to_string(),
                    value: backend,
                    reason: "expected memory or rocksdb".to_string(),
                })
            }
        };
    }
    if let Some(threshold) = lookup("RGS_LARGE_WIN_THRESHOLD") {
        config.game.large_win_threshold =
            parse_var("RGS_LARGE_WIN_THRESHOLD", threshold, "Invalid minor-unit amount")?;
    }
    if let Some(level) = lookup("RGS_LOG_LEVEL") {
        config.monitoring.log_level = level;
    }
    Ok(())
}
