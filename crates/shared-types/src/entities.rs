//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Chain**: `Hash`, `BlockIndex`
//! - **Masternodes**: `ProTxHash`
//! - **Networking**: `NodeId`, `PeerId`

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// A 32-byte hash (SHA-256d for every consensus digest in this workspace).
pub type Hash = [u8; 32];

/// The all-zero hash, used as the "null" marker on the wire.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Returns true if the hash is the all-zero null marker.
pub fn is_null_hash(hash: &Hash) -> bool {
    hash.iter().all(|b| *b == 0)
}

/// Abbreviated hex rendering used in log lines.
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}

/// Non-owning handle to a block on the chain.
///
/// Carries enough data to walk backwards (`prev_hash`) and to reason about
/// DKG windows (`height`) without holding on to chain-index memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockIndex {
    /// Block hash.
    pub hash: Hash,
    /// Block height in the chain.
    pub height: u64,
    /// Hash of the parent block. `ZERO_HASH` for genesis.
    pub prev_hash: Hash,
}

impl BlockIndex {
    /// Create a new block handle.
    pub fn new(hash: Hash, height: u64, prev_hash: Hash) -> Self {
        Self {
            hash,
            height,
            prev_hash,
        }
    }

    /// True for the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", short_hex(&self.hash), self.height)
    }
}

// =============================================================================
// CLUSTER B: MASTERNODES
// =============================================================================

/// Hash of the provider registration transaction; the stable identity of a
/// masternode.
pub type ProTxHash = Hash;

// =============================================================================
// CLUSTER C: NETWORKING
// =============================================================================

/// Unique identifier for a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 32]);

/// A peer identifier (alias for `NodeId` in peer contexts).
pub type PeerId = NodeId;

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", short_hex(&self.0))
    }
}
