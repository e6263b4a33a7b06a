//! In-memory deterministic masternode list.

use parking_lot::RwLock;
use std::collections::HashMap;

use shared_types::Hash;

use crate::domain::MasternodeEntry;
use crate::ports::MasternodeListProvider;

/// Masternode list with a default snapshot and optional per-block snapshots.
#[derive(Default)]
pub struct InMemoryMasternodeList {
    current: RwLock<Vec<MasternodeEntry>>,
    at_block: RwLock<HashMap<Hash, Vec<MasternodeEntry>>>,
}

impl InMemoryMasternodeList {
    /// List that reports `entries` at every block.
    pub fn new(entries: Vec<MasternodeEntry>) -> Self {
        Self {
            current: RwLock::new(entries),
            at_block: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the default snapshot.
    pub fn set(&self, entries: Vec<MasternodeEntry>) {
        *self.current.write() = entries;
    }

    /// Pin the snapshot reported at one block.
    pub fn set_at(&self, block_hash: Hash, entries: Vec<MasternodeEntry>) {
        self.at_block.write().insert(block_hash, entries);
    }
}

impl MasternodeListProvider for InMemoryMasternodeList {
    fn valid_members_at(&self, block_hash: &Hash) -> Vec<MasternodeEntry> {
        let pinned = self.at_block.read();
        let current = self.current.read();
        pinned
            .get(block_hash)
            .unwrap_or(&current)
            .iter()
            .filter(|mn| mn.is_valid)
            .cloned()
            .collect()
    }
}
