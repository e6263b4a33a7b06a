//! # qc-18-llmq
//!
//! Long-living masternode quorums (LLMQ) for Quantum-Chain.
//!
//! ## Architecture
//!
//! For every configured quorum type this subsystem decides which masternodes
//! form the committee anchored at a DKG block, validates the final
//! commitment the DKG agrees on, and keeps the threshold material of mined
//! quorums: the quorum verification vector and, for members, the local
//! secret key share.
//!
//! ```text
//! FinalCommitment ─→ MemberSelector ─→ DkgSession ─→ Quorum
//!                                                      │
//!       chain tip ─→ QuorumManager ──(qgetdata/qdata)──┘
//! ```
//!
//! Missing material is recovered from other members over the `qgetdata` /
//! `qdata` protocol. Everything outside the subsystem (chain, masternode
//! list, p2p, storage, BLS arithmetic) sits behind the traits in [`ports`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qc_18_llmq::{LlmqConfig, QuorumDependencies, QuorumEventLoop, QuorumManager};
//!
//! let manager = Arc::new(QuorumManager::new(deps, LlmqConfig::default())?);
//! let (event_loop, events) = QuorumEventLoop::new(Arc::clone(&manager), 1024);
//! tokio::spawn(event_loop.run());
//!
//! events.send(QuorumEvent::TipUpdated(tip)).await?;
//! let quorums = manager.scan_quorums_from_tip(LlmqType::Llmq50_60, 24);
//! ```
//!
//! ## Security
//!
//! - Commitments are verified against the deterministic committee and both
//!   aggregate signatures before they are accepted.
//! - Received verification vectors must hash to the mined commitment and
//!   received secret key shares must match the member's public key share.
//! - Data is served only to verified masternodes or watch connections, one
//!   outstanding request per peer; violations are scored.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

pub use adapters::{
    BlstWorker, InMemoryChain, InMemoryCommitmentIndex, InMemoryMasternodeList,
    InMemoryQuorumStore,
};
pub use config::{LlmqConfig, MisbehaviorScores, QvvecSyncMode, LLMQ_DATA_MESSAGES_VERSION};
pub use domain::{
    check_commitment_payload, CommitmentTxPayload, ConsensusParams, DataRequestError,
    FinalCommitment, LlmqMessage, LlmqParams, LlmqType, MasternodeEntry, Quorum,
    QuorumDataRequest,
};
pub use error::{LlmqError, LlmqResult};
pub use handler::{QuorumEvent, QuorumEventLoop};
pub use ports::{
    BlsWorker, ChainView, CommitmentIndex, DkgContributionSource, MasternodeListProvider,
    PeerInfo, QuorumManagerApi, QuorumNetwork, QuorumStore,
};
pub use service::{ActiveMasternodeInfo, QuorumDependencies, QuorumManager};
pub use workers::{Interrupt, WorkerPool};
