//! Driving ports (Inbound API)

use async_trait::async_trait;
use std::sync::Arc;

use shared_types::{BlockIndex, Hash, PeerId, ProTxHash};

use crate::domain::{LlmqType, Quorum};

/// Query API of the quorum manager, used by signing, RPC and wallet code.
#[async_trait]
pub trait QuorumManagerApi: Send + Sync {
    /// Quorum anchored at `quorum_hash`, if its commitment is mined.
    async fn get_quorum(&self, llmq_type: LlmqType, quorum_hash: Hash) -> Option<Arc<Quorum>>;

    /// Up to `count` quorums mined at or below `start`, most recent first.
    async fn scan_quorums(
        &self,
        llmq_type: LlmqType,
        start: BlockIndex,
        count: usize,
    ) -> Vec<Arc<Quorum>>;

    /// Up to `count` quorums from the chain tip, most recent first.
    async fn scan_quorums_from_tip(&self, llmq_type: LlmqType, count: usize) -> Vec<Arc<Quorum>>;

    /// True if the quorum's commitment is mined.
    async fn has_quorum(&self, llmq_type: LlmqType, quorum_hash: Hash) -> bool;

    /// Ask a peer for quorum data. `false` if the request was not sent.
    async fn request_quorum_data(
        &self,
        peer: PeerId,
        llmq_type: LlmqType,
        quorum_hash: Hash,
        data_mask: u16,
        pro_tx_hash: ProTxHash,
    ) -> bool;
}
