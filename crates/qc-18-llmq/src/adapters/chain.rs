//! In-memory block index and active chain.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use shared_crypto::Sha256dHasher;
use shared_types::{BlockIndex, Hash, ZERO_HASH};

use crate::ports::ChainView;

/// Block index holding every known block plus the active chain by height.
pub struct InMemoryChain {
    blocks: RwLock<HashMap<Hash, BlockIndex>>,
    active: RwLock<Vec<BlockIndex>>,
    synced: AtomicBool,
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::linear(0)
    }
}

impl InMemoryChain {
    /// Synced chain of heights `0..=tip_height` with deterministic hashes.
    pub fn linear(tip_height: u64) -> Self {
        let chain = Self {
            blocks: RwLock::new(HashMap::new()),
            active: RwLock::new(Vec::new()),
            synced: AtomicBool::new(true),
        };
        chain.connect(BlockIndex::new(block_hash(0, &ZERO_HASH), 0, ZERO_HASH));
        chain.extend(tip_height);
        chain
    }

    /// Append `count` blocks to the active chain. Returns the new tip.
    pub fn extend(&self, count: u64) -> Option<BlockIndex> {
        for _ in 0..count {
            let Some(tip) = self.tip() else { break };
            let height = tip.height + 1;
            self.connect(BlockIndex::new(block_hash(height, &tip.hash), height, tip.hash));
        }
        self.tip()
    }

    /// Make `block` the tip. Its parent must be known; the active chain is
    /// rewound to the parent first, so this also models a reorg.
    pub fn connect(&self, block: BlockIndex) -> bool {
        let mut active = self.active.write();
        if block.height > 0 {
            let parent_on_chain = active
                .get(block.height as usize - 1)
                .is_some_and(|p| p.hash == block.prev_hash);
            if !parent_on_chain {
                return false;
            }
        }
        active.truncate(block.height as usize);
        active.push(block);
        self.blocks.write().insert(block.hash, block);
        true
    }

    /// Block of the active chain at `height`.
    pub fn at_height(&self, height: u64) -> Option<BlockIndex> {
        self.active.read().get(height as usize).copied()
    }

    /// Toggle the initial-sync flag.
    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Release);
    }
}

#[cfg(test)]
impl InMemoryChain {
    /// Active block at `height`; panics when out of range.
    pub fn block_at(&self, height: u64) -> BlockIndex {
        self.at_height(height)
            .unwrap_or_else(|| panic!("no block at height {height}"))
    }
}

impl ChainView for InMemoryChain {
    fn tip(&self) -> Option<BlockIndex> {
        self.active.read().last().copied()
    }

    fn lookup_block(&self, hash: &Hash) -> Option<BlockIndex> {
        self.blocks.read().get(hash).copied()
    }

    fn ancestor(&self, block: &BlockIndex, height: u64) -> Option<BlockIndex> {
        if height > block.height {
            return None;
        }
        let blocks = self.blocks.read();
        let mut current = *block;
        while current.height > height {
            current = *blocks.get(&current.prev_hash)?;
        }
        Some(current)
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

fn block_hash(height: u64, prev: &Hash) -> Hash {
    let mut hasher = Sha256dHasher::new();
    hasher.update(prev).update(&height.to_le_bytes());
    hasher.finalize()
}
