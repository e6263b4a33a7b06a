//! # Node Runtime Library
//!
//! Hosts the LLMQ subsystem: configuration, adapters for the quorum
//! manager's outbound ports and the runtime driving its event loop.
//! The main entry point is the `main.rs` binary.

pub mod adapters;
pub mod container;
pub mod runtime;

pub use container::{ConfigError, NodeConfig, NodeContainer};
pub use runtime::NodeRuntime;
