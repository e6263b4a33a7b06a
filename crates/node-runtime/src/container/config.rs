//! # Node Configuration
//!
//! Unified configuration for the LLMQ subsystem and the runtime around it.
//!
//! ## Sources
//!
//! Defaults, then an optional TOML file named by `QC_CONFIG`, then the
//! environment overrides listed on [`NodeConfig::apply_env_overrides`].
//!
//! ## Security Requirements
//!
//! - The operator key and the pro-tx hash are set together or not at all
//! - The operator key is never logged

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use qc_18_llmq::domain::BlsSecretKey;
use qc_18_llmq::{ActiveMasternodeInfo, LlmqConfig, LlmqError};

/// Complete node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// LLMQ subsystem configuration.
    pub llmq: LlmqConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Peer-to-peer bridge configuration.
    pub network: NetworkConfig,
    /// Masternode identity; empty on a plain node.
    pub masternode: MasternodeConfig,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`NodeConfig`].
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },

    /// Masternode identity is incomplete or malformed.
    #[error("invalid masternode identity: {0}")]
    InvalidMasternode(String),

    /// LLMQ settings rejected.
    #[error(transparent)]
    Llmq(#[from] LlmqError),
}

impl NodeConfig {
    /// Parse a TOML document. Missing sections keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Apply environment overrides read through `lookup`:
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `QC_LLMQ_NETWORK` | `llmq.network` |
    /// | `QC_LLMQ_DATA_RECOVERY` | `llmq.data_recovery_enabled` |
    /// | `QC_LLMQ_QVVEC_SYNC` | `llmq.qvvec_sync` (comma separated) |
    /// | `QC_WATCH_QUORUMS` | `llmq.watch_quorums` |
    /// | `QC_DATA_DIR` | `storage.data_dir` |
    /// | `QC_LOG_LEVEL` | `logging.level` |
    /// | `QC_OPERATOR_KEY` | `masternode.operator_key` |
    /// | `QC_PRO_TX_HASH` | `masternode.pro_tx_hash` |
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(network) = lookup("QC_LLMQ_NETWORK") {
            self.llmq.network = network;
        }
        if let Some(value) = lookup("QC_LLMQ_DATA_RECOVERY") {
            self.llmq.data_recovery_enabled = parse_bool("QC_LLMQ_DATA_RECOVERY", value)?;
        }
        if let Some(value) = lookup("QC_LLMQ_QVVEC_SYNC") {
            self.llmq.qvvec_sync = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = lookup("QC_WATCH_QUORUMS") {
            self.llmq.watch_quorums = parse_bool("QC_WATCH_QUORUMS", value)?;
        }
        if let Some(dir) = lookup("QC_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("QC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(key) = lookup("QC_OPERATOR_KEY") {
            self.masternode.operator_key = Some(key);
        }
        if let Some(hash) = lookup("QC_PRO_TX_HASH") {
            self.masternode.pro_tx_hash = Some(hash);
        }
        Ok(())
    }

    /// Check everything that can be checked without opening storage.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let consensus = self.llmq.consensus_params()?;
        self.llmq.qvvec_sync_modes(&consensus)?;
        self.active_masternode()?;
        Ok(())
    }

    /// Masternode identity, if configured.
    pub fn active_masternode(&self) -> Result<Option<ActiveMasternodeInfo>, ConfigError> {
        let (pro_tx_hash, operator_key) =
            match (&self.masternode.pro_tx_hash, &self.masternode.operator_key) {
                (None, None) => return Ok(None),
                (Some(pro_tx_hash), Some(operator_key)) => (pro_tx_hash, operator_key),
                _ => {
                    return Err(ConfigError::InvalidMasternode(
                        "pro_tx_hash and operator_key must be set together".into(),
                    ))
                }
            };
        Ok(Some(ActiveMasternodeInfo {
            pro_tx_hash: decode_32("pro_tx_hash", pro_tx_hash)?,
            operator_key: BlsSecretKey(decode_32("operator_key", operator_key)?),
        }))
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { var, value }),
    }
}

fn decode_32(field: &str, value: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| ConfigError::InvalidMasternode(format!("{field}: {e}")))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        ConfigError::InvalidMasternode(format!("{field} must be 32 bytes (64 hex chars)"))
    })
}

/// Quorum store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile store; quorum material is rebuilt or recovered after restart.
    #[default]
    Memory,
    /// RocksDB under `data_dir` (requires the `rocksdb` feature).
    Rocksdb,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Backend of the quorum store.
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            backend: StorageBackend::Memory,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Peer-to-peer bridge configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Misbehavior score at which a peer is disconnected.
    pub ban_score: u32,
    /// Capacity of the quorum event queue.
    pub event_queue: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ban_score: 100,
            event_queue: 1024,
        }
    }
}

/// Masternode identity as hex strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MasternodeConfig {
    /// Provider registration hash.
    pub pro_tx_hash: Option<String>,
    /// Operator BLS secret key.
    pub operator_key: Option<String>,
}
