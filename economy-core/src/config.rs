//! Configuration for the economy core

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Economy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Account credited with platform fees
    pub platform_account: String,

    /// Operation limits
    pub limits: LimitsConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/economy"),
            service_name: "economy-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            platform_account: "platform".to_string(),
            limits: LimitsConfig::default(),
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// Operation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum gross amount a single operation may move
    pub max_transaction_amount: Decimal,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            // Fat-finger ceiling, not a business rule
            max_transaction_amount: Decimal::new(1_000_000, 0),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Level 0 file num compaction trigger
    pub level0_file_num_compaction_trigger: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            level0_file_num_compaction_trigger: 4,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("ECONOMY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(account) = std::env::var("ECONOMY_PLATFORM_ACCOUNT") {
            config.platform_account = account;
        }

        if let Ok(max) = std::env::var("ECONOMY_MAX_TRANSACTION_AMOUNT") {
            config.limits.max_transaction_amount = Decimal::from_str(&max).map_err(|e| {
                crate::Error::Config(format!("Invalid ECONOMY_MAX_TRANSACTION_AMOUNT: {}", e))
            })?;
        }

        Ok(config)
    }
}
