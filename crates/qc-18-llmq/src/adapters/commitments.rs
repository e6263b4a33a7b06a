//! In-memory index of mined final commitments.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use shared_types::{BlockIndex, Hash};

use crate::domain::{FinalCommitment, LlmqType};
use crate::ports::CommitmentIndex;

#[derive(Debug, Clone)]
struct MinedCommitment {
    anchor: BlockIndex,
    commitment: Arc<FinalCommitment>,
    mined_block: BlockIndex,
}

/// Mined commitments per quorum type, in mining order.
#[derive(Default)]
pub struct InMemoryCommitmentIndex {
    mined: RwLock<HashMap<LlmqType, Vec<MinedCommitment>>>,
}

impl InMemoryCommitmentIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commitment for the quorum anchored at `anchor`, mined in
    /// `mined_block`. Replaces an earlier record for the same quorum.
    pub fn add(&self, anchor: BlockIndex, commitment: FinalCommitment, mined_block: BlockIndex) {
        let mut mined = self.mined.write();
        let entries = mined.entry(commitment.llmq_type).or_default();
        entries.retain(|e| e.anchor.hash != anchor.hash);
        entries.push(MinedCommitment {
            anchor,
            commitment: Arc::new(commitment),
            mined_block,
        });
        entries.sort_by_key(|e| e.mined_block.height);
    }

    /// Forget a commitment, as when its block is disconnected.
    pub fn remove(&self, llmq_type: LlmqType, quorum_hash: &Hash) -> bool {
        let mut mined = self.mined.write();
        let Some(entries) = mined.get_mut(&llmq_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| &e.anchor.hash != quorum_hash);
        before != entries.len()
    }
}

impl CommitmentIndex for InMemoryCommitmentIndex {
    fn mined_commitment(
        &self,
        llmq_type: LlmqType,
        quorum_hash: &Hash,
    ) -> Option<(Arc<FinalCommitment>, Hash)> {
        self.mined
            .read()
            .get(&llmq_type)?
            .iter()
            .find(|e| &e.anchor.hash == quorum_hash)
            .map(|e| (Arc::clone(&e.commitment), e.mined_block.hash))
    }

    fn has_mined_commitment(&self, llmq_type: LlmqType, quorum_hash: &Hash) -> bool {
        self.mined_commitment(llmq_type, quorum_hash).is_some()
    }

    fn mined_commitments_until_block(
        &self,
        llmq_type: LlmqType,
        start: &BlockIndex,
        max_count: usize,
    ) -> Vec<BlockIndex> {
        let mined = self.mined.read();
        let Some(entries) = mined.get(&llmq_type) else {
            return Vec::new();
        };
        entries
            .iter()
            .rev()
            .filter(|e| e.mined_block.height <= start.height)
            .take(max_count)
            .map(|e| e.anchor)
            .collect()
    }
}
