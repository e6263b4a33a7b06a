//! # Adapters
//!
//! Implementations of the quorum manager's outbound ports that need more
//! than the in-memory versions shipped with `qc-18-llmq`.

pub mod network;
pub mod storage;

pub use network::{ChannelNetwork, NetworkCommand};
pub use storage::InMemoryQuorumStore;

#[cfg(feature = "rocksdb")]
pub use storage::{RocksDbConfig, RocksDbQuorumStore};
