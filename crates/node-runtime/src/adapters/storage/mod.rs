//! # Production Storage Adapters
//!
//! Durable quorum store using RocksDB.
//!
//! ## Usage
//!
//! Enable the `rocksdb` feature to use these adapters:
//!
//! ```toml
//! node-runtime = { path = "...", features = ["rocksdb"] }
//! ```
//!
//! Without it the node keeps quorum material in memory and rebuilds or
//! recovers it after a restart.

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbQuorumStore, CF_LLMQ, COLUMN_FAMILIES};

pub use qc_18_llmq::InMemoryQuorumStore;
