//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the outbound ports. The in-memory adapters back the
//! tests and single-process nodes; `BlstWorker` is the production BLS
//! capability.

mod bls;
mod chain;
mod commitments;
mod masternodes;
mod store;

pub use bls::BlstWorker;
pub use chain::InMemoryChain;
pub use commitments::InMemoryCommitmentIndex;
pub use masternodes::InMemoryMasternodeList;
pub use store::InMemoryQuorumStore;
