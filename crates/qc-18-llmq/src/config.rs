//! Configuration for the LLMQ subsystem.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::{ConsensusParams, LlmqType};
use crate::error::{LlmqError, LlmqResult};

/// Minimum peer protocol version that understands `qgetdata` / `qdata`.
pub const LLMQ_DATA_MESSAGES_VERSION: u32 = 70219;

/// When to fetch the verification vector of quorums we are not a member of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QvvecSyncMode {
    /// Not configured.
    Invalid = -1,
    /// Always fetch.
    Always = 0,
    /// Fetch only if we are a member of any recent quorum of the same type.
    OnlyIfTypeMember = 1,
}

impl QvvecSyncMode {
    fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Always,
            1 => Self::OnlyIfTypeMember,
            _ => Self::Invalid,
        }
    }
}

/// Misbehavior scores applied to peers violating the data protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MisbehaviorScores {
    /// Unrequested, mismatched or invalid data, and requests from unverified peers.
    pub default: u32,
    /// Second request while the previous one is still fresh.
    pub rate_limit: u32,
}

impl Default for MisbehaviorScores {
    fn default() -> Self {
        Self {
            default: 10,
            rate_limit: 25,
        }
    }
}

/// LLMQ subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmqConfig {
    /// Network preset (`mainnet`, `testnet`, `devnet`, `regtest`).
    pub network: String,
    /// Recover missing quorum data from other members.
    pub data_recovery_enabled: bool,
    /// Verification vector sync entries, `"<llmq name>:<mode>"`.
    pub qvvec_sync: Vec<String>,
    /// Accept quorum data as a non-masternode watching quorums.
    pub watch_quorums: bool,
    /// Seconds before recovery moves on to the next member.
    pub request_timeout_secs: u64,
    /// Seconds a data request entry stays alive.
    pub request_expiry_secs: u64,
    /// Concurrent CPU jobs; derived from the core count when unset.
    pub worker_threads: Option<usize>,
    /// Peer penalties.
    pub misbehavior: MisbehaviorScores,
}

impl Default for LlmqConfig {
    fn default() -> Self {
        Self {
            network: "mainnet".to_string(),
            data_recovery_enabled: true,
            qvvec_sync: Vec::new(),
            watch_quorums: false,
            request_timeout_secs: 10,
            request_expiry_secs: 300,
            worker_threads: None,
            misbehavior: MisbehaviorScores::default(),
        }
    }
}

impl LlmqConfig {
    /// Quorum types of the configured network.
    pub fn consensus_params(&self) -> LlmqResult<ConsensusParams> {
        ConsensusParams::for_network(&self.network).ok_or_else(|| LlmqError::Config {
            reason: format!("unknown network '{}'", self.network),
        })
    }

    /// Parsed `qvvec_sync` entries. Every entry must name a quorum type
    /// enabled on the network, at most once, with a valid mode.
    pub fn qvvec_sync_modes(
        &self,
        consensus: &ConsensusParams,
    ) -> LlmqResult<HashMap<LlmqType, QvvecSyncMode>> {
        let mut modes = HashMap::new();
        for entry in &self.qvvec_sync {
            let invalid = |why: &str| LlmqError::Config {
                reason: format!("invalid qvvec_sync entry '{entry}': {why}"),
            };
            let (name, mode) = entry
                .split_once(':')
                .ok_or_else(|| invalid("expected <llmq name>:<mode>"))?;
            let llmq_type = LlmqType::from_name(name)
                .filter(|t| consensus.has_llmq(*t))
                .ok_or_else(|| invalid("unknown quorum type"))?;
            let mode = mode
                .parse::<i32>()
                .map(QvvecSyncMode::from_i32)
                .ok()
                .filter(|m| *m != QvvecSyncMode::Invalid)
                .ok_or_else(|| invalid("mode must be 0 or 1"))?;
            if modes.insert(llmq_type, mode).is_some() {
                return Err(invalid("duplicate quorum type"));
            }
        }
        Ok(modes)
    }

    /// Recovery request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Data request lifetime.
    pub fn request_expiry(&self) -> Duration {
        Duration::from_secs(self.request_expiry_secs)
    }
}
