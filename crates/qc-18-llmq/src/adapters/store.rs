//! In-memory quorum store.

use parking_lot::RwLock;
use std::collections::HashMap;

use shared_types::StorageError;

use crate::ports::QuorumStore;

/// Volatile key-value store, used by tests and nodes without a data dir.
#[derive(Debug, Default)]
pub struct InMemoryQuorumStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryQuorumStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QuorumStore for InMemoryQuorumStore {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}
