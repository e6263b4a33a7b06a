//! # Quorum Types and Parameters
//!
//! Every quorum type fixes the committee size, the signing threshold and the
//! DKG schedule. The presets below are consensus constants: changing any of
//! them forks the network.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::LlmqError;

/// Quorum type identifier (one byte on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum LlmqType {
    /// 50 members, 60% threshold, hourly.
    Llmq50_60 = 1,
    /// 400 members, 60% threshold, every 12 hours.
    Llmq400_60 = 2,
    /// 400 members, 85% threshold, daily.
    Llmq400_85 = 3,
    /// 100 members, 67% threshold, hourly.
    Llmq100_67 = 4,
    /// Regression test quorum.
    LlmqTest = 100,
    /// Devnet quorum.
    LlmqDevnet = 101,
    /// Regression test quorum with the 0.17 parameters.
    LlmqTestV17 = 102,
}

impl LlmqType {
    /// Wire representation.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Canonical name, as used in configuration.
    pub fn name(self) -> &'static str {
        match self {
            Self::Llmq50_60 => "llmq_50_60",
            Self::Llmq400_60 => "llmq_400_60",
            Self::Llmq400_85 => "llmq_400_85",
            Self::Llmq100_67 => "llmq_100_67",
            Self::LlmqTest => "llmq_test",
            Self::LlmqDevnet => "llmq_devnet",
            Self::LlmqTestV17 => "llmq_test_v17",
        }
    }

    /// Parse a canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Every known type.
    pub const ALL: [LlmqType; 7] = [
        Self::Llmq50_60,
        Self::Llmq400_60,
        Self::Llmq400_85,
        Self::Llmq100_67,
        Self::LlmqTest,
        Self::LlmqDevnet,
        Self::LlmqTestV17,
    ];
}

impl TryFrom<u8> for LlmqType {
    type Error = LlmqError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_u8() == value)
            .ok_or(LlmqError::UnknownQuorumType(value))
    }
}

impl fmt::Display for LlmqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Committee and DKG schedule parameters for one quorum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmqParams {
    /// The quorum type these parameters belong to.
    pub llmq_type: LlmqType,
    /// Human readable name.
    pub name: &'static str,
    /// Committee size; bitset lengths in commitments equal this value.
    pub size: usize,
    /// Minimum number of valid members and of signers for a commitment.
    pub min_size: usize,
    /// Signature shares needed to recover a quorum signature.
    pub threshold: usize,
    /// Blocks between two DKG rounds; anchor heights are multiples of it.
    pub dkg_interval: u64,
    /// Blocks per DKG phase.
    pub dkg_phase_blocks: u64,
    /// First block (offset into the round) at which the commitment may be mined.
    pub dkg_mining_window_start: u64,
    /// Last block (offset into the round) at which the commitment may be mined.
    pub dkg_mining_window_end: u64,
    /// Complaints needed to mark a member bad.
    pub dkg_bad_votes_threshold: usize,
    /// Number of recent quorums eligible for signing.
    pub signing_active_quorum_count: usize,
    /// Number of recent quorums whose connections are kept.
    pub keep_old_connections: usize,
    /// Members contacted for recovery of quorum data.
    pub recovery_members: usize,
}

impl LlmqParams {
    /// Regression test quorum.
    pub fn llmq_test() -> Self {
        Self {
            llmq_type: LlmqType::LlmqTest,
            name: "llmq_test",
            size: 3,
            min_size: 2,
            threshold: 2,
            dkg_interval: 24,
            dkg_phase_blocks: 2,
            dkg_mining_window_start: 10,
            dkg_mining_window_end: 18,
            dkg_bad_votes_threshold: 2,
            signing_active_quorum_count: 2,
            keep_old_connections: 3,
            recovery_members: 3,
        }
    }

    /// Regression test quorum with the 0.17 parameters.
    pub fn llmq_test_v17() -> Self {
        Self {
            llmq_type: LlmqType::LlmqTestV17,
            name: "llmq_test_v17",
            ..Self::llmq_test()
        }
    }

    /// Devnet quorum.
    pub fn llmq_devnet() -> Self {
        Self {
            llmq_type: LlmqType::LlmqDevnet,
            name: "llmq_devnet",
            size: 10,
            min_size: 7,
            threshold: 6,
            dkg_interval: 24,
            dkg_phase_blocks: 2,
            dkg_mining_window_start: 10,
            dkg_mining_window_end: 18,
            dkg_bad_votes_threshold: 7,
            signing_active_quorum_count: 3,
            keep_old_connections: 4,
            recovery_members: 6,
        }
    }

    /// 50 member quorum, hourly.
    pub fn llmq_50_60() -> Self {
        Self {
            llmq_type: LlmqType::Llmq50_60,
            name: "llmq_50_60",
            size: 50,
            min_size: 40,
            threshold: 30,
            dkg_interval: 24,
            dkg_phase_blocks: 2,
            dkg_mining_window_start: 10,
            dkg_mining_window_end: 18,
            dkg_bad_votes_threshold: 40,
            signing_active_quorum_count: 24,
            keep_old_connections: 25,
            recovery_members: 25,
        }
    }

    /// 400 member quorum, every 12 hours.
    pub fn llmq_400_60() -> Self {
        Self {
            llmq_type: LlmqType::Llmq400_60,
            name: "llmq_400_60",
            size: 400,
            min_size: 300,
            threshold: 240,
            dkg_interval: 24 * 12,
            dkg_phase_blocks: 4,
            dkg_mining_window_start: 20,
            dkg_mining_window_end: 28,
            dkg_bad_votes_threshold: 300,
            signing_active_quorum_count: 4,
            keep_old_connections: 5,
            recovery_members: 100,
        }
    }

    /// 400 member supermajority quorum, daily.
    pub fn llmq_400_85() -> Self {
        Self {
            llmq_type: LlmqType::Llmq400_85,
            name: "llmq_400_85",
            size: 400,
            min_size: 350,
            threshold: 340,
            dkg_interval: 24 * 24,
            dkg_phase_blocks: 4,
            dkg_mining_window_start: 20,
            dkg_mining_window_end: 48,
            dkg_bad_votes_threshold: 300,
            signing_active_quorum_count: 4,
            keep_old_connections: 5,
            recovery_members: 100,
        }
    }

    /// 100 member quorum, hourly.
    pub fn llmq_100_67() -> Self {
        Self {
            llmq_type: LlmqType::Llmq100_67,
            name: "llmq_100_67",
            size: 100,
            min_size: 80,
            threshold: 67,
            dkg_interval: 24,
            dkg_phase_blocks: 2,
            dkg_mining_window_start: 10,
            dkg_mining_window_end: 18,
            dkg_bad_votes_threshold: 80,
            signing_active_quorum_count: 24,
            keep_old_connections: 25,
            recovery_members: 50,
        }
    }

    /// Preset for a type.
    pub fn for_type(llmq_type: LlmqType) -> Self {
        match llmq_type {
            LlmqType::Llmq50_60 => Self::llmq_50_60(),
            LlmqType::Llmq400_60 => Self::llmq_400_60(),
            LlmqType::Llmq400_85 => Self::llmq_400_85(),
            LlmqType::Llmq100_67 => Self::llmq_100_67(),
            LlmqType::LlmqTest => Self::llmq_test(),
            LlmqType::LlmqDevnet => Self::llmq_devnet(),
            LlmqType::LlmqTestV17 => Self::llmq_test_v17(),
        }
    }

    /// Capacity of the per-type quorum and scan caches.
    pub fn cache_capacity(&self) -> usize {
        self.signing_active_quorum_count + 1
    }

    /// Height of the DKG round that is in progress at `height`.
    pub fn dkg_round_start(&self, height: u64) -> u64 {
        height - (height % self.dkg_interval)
    }

    /// True if `height` can anchor a quorum of this type.
    pub fn is_anchor_height(&self, height: u64) -> bool {
        height % self.dkg_interval == 0
    }
}

/// The set of quorum types enabled on a network.
#[derive(Debug, Clone, Default)]
pub struct ConsensusParams {
    llmqs: BTreeMap<LlmqType, LlmqParams>,
}

impl ConsensusParams {
    /// Build from an explicit list.
    pub fn new(params: impl IntoIterator<Item = LlmqParams>) -> Self {
        Self {
            llmqs: params.into_iter().map(|p| (p.llmq_type, p)).collect(),
        }
    }

    /// Production network.
    pub fn mainnet() -> Self {
        Self::new([
            LlmqParams::llmq_50_60(),
            LlmqParams::llmq_400_60(),
            LlmqParams::llmq_400_85(),
            LlmqParams::llmq_100_67(),
        ])
    }

    /// Developer network.
    pub fn devnet() -> Self {
        Self::new([
            LlmqParams::llmq_devnet(),
            LlmqParams::llmq_50_60(),
            LlmqParams::llmq_400_60(),
            LlmqParams::llmq_400_85(),
            LlmqParams::llmq_100_67(),
        ])
    }

    /// Regression test network.
    pub fn regtest() -> Self {
        Self::new([LlmqParams::llmq_test(), LlmqParams::llmq_test_v17()])
    }

    /// Preset by network name (`mainnet`, `testnet`, `devnet`, `regtest`).
    pub fn for_network(name: &str) -> Option<Self> {
        match name {
            "mainnet" | "main" | "testnet" | "test" => Some(Self::mainnet()),
            "devnet" => Some(Self::devnet()),
            "regtest" => Some(Self::regtest()),
            _ => None,
        }
    }

    /// Parameters of a configured type.
    pub fn params(&self, llmq_type: LlmqType) -> Option<&LlmqParams> {
        self.llmqs.get(&llmq_type)
    }

    /// Parameters for a raw wire byte, if it names a configured type.
    pub fn params_for_byte(&self, llmq_type: u8) -> Option<&LlmqParams> {
        LlmqType::try_from(llmq_type)
            .ok()
            .and_then(|t| self.params(t))
    }

    /// True if the type is enabled on this network.
    pub fn has_llmq(&self, llmq_type: LlmqType) -> bool {
        self.llmqs.contains_key(&llmq_type)
    }

    /// Enabled types with their parameters, in type order.
    pub fn iter(&self) -> impl Iterator<Item = &LlmqParams> {
        self.llmqs.values()
    }
}
