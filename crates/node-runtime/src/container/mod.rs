//! # Node Container
//!
//! Holds the quorum manager together with the adapters it runs on.
//!
//! ## Wiring
//!
//! - chain, masternode list and commitment index: in-memory views fed by
//!   the block processing layer
//! - DKG sessions: the local session manager
//! - network: [`ChannelNetwork`](crate::adapters::ChannelNetwork)
//! - store: in-memory or RocksDB, per `storage.backend`

pub mod config;
pub mod node;

pub use config::{ConfigError, NodeConfig, StorageBackend};
pub use node::NodeContainer;
