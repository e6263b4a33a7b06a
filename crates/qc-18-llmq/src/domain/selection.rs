//! # Membership Selection
//!
//! Deterministic committee selection: every node computes the same member
//! list for a (quorum type, anchor block) pair from the masternode list valid
//! at that block.
//!
//! ## Algorithm
//!
//! 1. `modifier = sha256d(llmq_type || anchor_hash)`
//! 2. candidates are valid masternodes with a confirmed registration
//! 3. `score = sha256d(sha256d(pro_tx_hash || confirmed_hash) || modifier)`
//! 4. sort by score (256-bit little-endian) descending, take `size`
//!
//! Equal scores are ordered by pro-tx hash, descending. Entries here carry no
//! collateral outpoint, so this differs from ordering ties by collateral. A
//! tie needs two distinct registrations hashing to the same score, so the
//! selected committee is the same in practice.

use lru::LruCache;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use shared_crypto::Sha256dHasher;
use shared_types::{is_null_hash, BlockIndex, Hash};

use super::params::{LlmqParams, LlmqType};
use super::roster::MasternodeEntry;
use crate::ports::{ChainView, MasternodeListProvider};

/// Compare two digests as little-endian 256-bit integers.
fn cmp_uint256(a: &Hash, b: &Hash) -> Ordering {
    a.iter().rev().cmp(b.iter().rev())
}

fn selection_modifier(llmq_type: LlmqType, anchor_hash: &Hash) -> Hash {
    let mut hasher = Sha256dHasher::new();
    hasher.update(&[llmq_type.as_u8()]).update(anchor_hash);
    hasher.finalize()
}

fn member_score(mn: &MasternodeEntry, modifier: &Hash) -> Hash {
    let mut inner = Sha256dHasher::new();
    inner.update(&mn.pro_tx_hash).update(&mn.confirmed_hash);
    let mut outer = Sha256dHasher::new();
    outer.update(&inner.finalize()).update(modifier);
    outer.finalize()
}

/// Higher score first, then higher pro-tx hash.
fn rank_order(a: (&Hash, &MasternodeEntry), b: (&Hash, &MasternodeEntry)) -> Ordering {
    cmp_uint256(b.0, a.0).then_with(|| cmp_uint256(&b.1.pro_tx_hash, &a.1.pro_tx_hash))
}

/// Pure selection over an already resolved masternode list.
pub fn select_members(
    params: &LlmqParams,
    anchor: &BlockIndex,
    mn_list: &[MasternodeEntry],
) -> Vec<MasternodeEntry> {
    let modifier = selection_modifier(params.llmq_type, &anchor.hash);

    let mut scored: Vec<(Hash, &MasternodeEntry)> = mn_list
        .iter()
        .filter(|mn| mn.is_valid && !is_null_hash(&mn.confirmed_hash))
        .map(|mn| (member_score(mn, &modifier), mn))
        .collect();

    scored.sort_by(|x, y| rank_order((&x.0, x.1), (&y.0, y.1)));

    scored
        .into_iter()
        .take(params.size)
        .map(|(_, mn)| mn.clone())
        .collect()
}

/// Memoizing front-end of [`select_members`] that also validates the anchor.
pub struct MemberSelector {
    caches: Mutex<HashMap<LlmqType, LruCache<Hash, Arc<Vec<MasternodeEntry>>>>>,
}

impl Default for MemberSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberSelector {
    /// Create an empty selector.
    pub fn new() -> Self {
        Self {
            caches: Mutex::new(HashMap::new()),
        }
    }

    fn capacity(params: &LlmqParams) -> NonZeroUsize {
        let n = params.keep_old_connections.max(params.cache_capacity()) + 1;
        NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
    }

    /// Committee for `anchor`. Returns an empty list if the anchor is not an
    /// anchor height of this type or not on the active chain.
    pub fn members(
        &self,
        params: &LlmqParams,
        anchor: &BlockIndex,
        chain: &dyn ChainView,
        mn_list: &dyn MasternodeListProvider,
    ) -> Arc<Vec<MasternodeEntry>> {
        if let Some(cached) = self
            .caches
            .lock()
            .get_mut(&params.llmq_type)
            .and_then(|c| c.get(&anchor.hash).cloned())
        {
            return cached;
        }

        if !params.is_anchor_height(anchor.height) {
            debug!(
                "[qc-18] Block {} is not an anchor height for {}",
                anchor, params.llmq_type
            );
            return Arc::new(Vec::new());
        }

        let on_active_chain = chain
            .tip()
            .and_then(|tip| chain.ancestor(&tip, anchor.height))
            .is_some_and(|b| b.hash == anchor.hash);
        if !on_active_chain {
            debug!("[qc-18] Block {} is not on the active chain", anchor);
            return Arc::new(Vec::new());
        }

        let members = Arc::new(select_members(
            params,
            anchor,
            &mn_list.valid_members_at(&anchor.hash),
        ));

        self.caches
            .lock()
            .entry(params.llmq_type)
            .or_insert_with(|| LruCache::new(Self::capacity(params)))
            .put(anchor.hash, Arc::clone(&members));

        members
    }
}
