//! # Quorum Manager
//!
//! The context object of the LLMQ subsystem. It owns the per-type quorum
//! and scan caches, the data request tracker and the background worker pool,
//! and talks to the rest of the node only through the outbound ports.
//!
//! ## Submodules
//!
//! - `tip`: chain-tip reaction (connections, request sweep, recovery trigger)
//! - `data`: the `qgetdata` / `qdata` protocol
//! - `recovery`: quorum data recovery and cache populator tasks
//!
//! ## Locks
//!
//! The quorum cache, the scan cache and the build lock are separate mutexes.
//! No cache lock is held while a quorum is built, and the build lock is
//! never taken while a cache lock is held.

mod data;
mod recovery;
mod tip;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use shared_types::{short_hex, BlockIndex, Hash, PeerId, ProTxHash};

use crate::config::{LlmqConfig, QvvecSyncMode};
use crate::domain::{
    BlsSecretKey, ConsensusParams, DataRequestTracker, FinalCommitment, LlmqParams, LlmqType,
    MemberSelector, Quorum,
};
use crate::error::LlmqResult;
use crate::metrics::{self, ScanCacheHit};
use crate::ports::{
    BlsWorker, ChainView, CommitmentIndex, DkgContributionSource, MasternodeListProvider,
    QuorumManagerApi, QuorumNetwork, QuorumStore,
};
use crate::workers::{Interrupt, WorkerPool};

/// Outbound ports the manager depends on.
#[derive(Clone)]
pub struct QuorumDependencies {
    pub chain: Arc<dyn ChainView>,
    pub masternodes: Arc<dyn MasternodeListProvider>,
    pub commitments: Arc<dyn CommitmentIndex>,
    pub dkg: Arc<dyn DkgContributionSource>,
    pub network: Arc<dyn QuorumNetwork>,
    pub store: Arc<dyn QuorumStore>,
    pub worker: Arc<dyn BlsWorker>,
}

/// Identity of the local masternode.
#[derive(Debug, Clone)]
pub struct ActiveMasternodeInfo {
    /// Registration hash.
    pub pro_tx_hash: ProTxHash,
    /// Operator secret key; decrypts contributions addressed to us.
    pub operator_key: BlsSecretKey,
}

type QuorumCache = LruCache<Hash, Arc<Quorum>>;
type ScanCache = LruCache<Hash, Vec<Arc<Quorum>>>;

/// LLMQ quorum lifecycle manager.
pub struct QuorumManager {
    deps: QuorumDependencies,
    config: LlmqConfig,
    consensus: ConsensusParams,
    qvvec_sync: HashMap<LlmqType, QvvecSyncMode>,
    active_masternode: RwLock<Option<ActiveMasternodeInfo>>,
    quorums: Mutex<HashMap<LlmqType, QuorumCache>>,
    scans: Mutex<HashMap<LlmqType, ScanCache>>,
    build_lock: Mutex<()>,
    requests: DataRequestTracker,
    selector: MemberSelector,
    pool: WorkerPool,
    interrupt: Interrupt,
}

fn cache_size(params: &LlmqParams) -> NonZeroUsize {
    NonZeroUsize::new(params.cache_capacity()).unwrap_or(NonZeroUsize::MIN)
}

impl QuorumManager {
    /// Manager for the network named in `config`.
    pub fn new(deps: QuorumDependencies, config: LlmqConfig) -> LlmqResult<Self> {
        let consensus = config.consensus_params()?;
        Self::with_consensus(deps, config, consensus)
    }

    /// Manager for an explicit set of quorum types.
    pub fn with_consensus(
        deps: QuorumDependencies,
        config: LlmqConfig,
        consensus: ConsensusParams,
    ) -> LlmqResult<Self> {
        let qvvec_sync = config.qvvec_sync_modes(&consensus)?;
        let quorums = consensus
            .iter()
            .map(|p| (p.llmq_type, LruCache::new(cache_size(p))))
            .collect();
        let scans = consensus
            .iter()
            .map(|p| (p.llmq_type, LruCache::new(cache_size(p))))
            .collect();
        info!(
            "[qc-18] Quorum manager for {} quorum types, recovery {}",
            consensus.iter().count(),
            if config.data_recovery_enabled { "on" } else { "off" }
        );
        Ok(Self {
            requests: DataRequestTracker::new(config.request_expiry()),
            pool: WorkerPool::new(config.worker_threads),
            deps,
            config,
            consensus,
            qvvec_sync,
            active_masternode: RwLock::new(None),
            quorums: Mutex::new(quorums),
            scans: Mutex::new(scans),
            build_lock: Mutex::new(()),
            selector: MemberSelector::new(),
            interrupt: Interrupt::new(),
        })
    }

    /// Run as the given masternode, or as a plain node with `None`.
    pub fn set_active_masternode(&self, info: Option<ActiveMasternodeInfo>) {
        if let Some(info) = &info {
            info!("[qc-18] Masternode mode as {}", short_hex(&info.pro_tx_hash));
        }
        *self.active_masternode.write() = info;
    }

    /// Identity of the local masternode, if any.
    pub fn active_masternode(&self) -> Option<ActiveMasternodeInfo> {
        self.active_masternode.read().clone()
    }

    fn local_pro_tx_hash(&self) -> Option<ProTxHash> {
        self.active_masternode.read().as_ref().map(|mn| mn.pro_tx_hash)
    }

    /// Quorum types this manager serves.
    pub fn consensus(&self) -> &ConsensusParams {
        &self.consensus
    }

    /// Active configuration.
    pub fn config(&self) -> &LlmqConfig {
        &self.config
    }

    /// Data request bookkeeping.
    pub fn requests(&self) -> &DataRequestTracker {
        &self.requests
    }

    /// Shutdown signal shared by every background task.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Stop background tasks at their next checkpoint.
    pub fn shutdown(&self) {
        info!("[qc-18] Interrupting quorum background tasks");
        self.interrupt.raise();
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Quorum anchored at `quorum_hash`, if its commitment is mined.
    pub fn get_quorum(&self, llmq_type: LlmqType, quorum_hash: &Hash) -> Option<Arc<Quorum>> {
        let anchor = self.deps.chain.lookup_block(quorum_hash)?;
        self.get_quorum_at(llmq_type, &anchor)
    }

    /// Quorum anchored at `anchor`, built on first use.
    pub fn get_quorum_at(&self, llmq_type: LlmqType, anchor: &BlockIndex) -> Option<Arc<Quorum>> {
        let params = self.consensus.params(llmq_type)?;

        // Checked before the cache so a disconnected commitment hides the quorum.
        if !self
            .deps
            .commitments
            .has_mined_commitment(llmq_type, &anchor.hash)
        {
            return None;
        }
        if let Some(quorum) = self.cached_quorum(llmq_type, &anchor.hash) {
            metrics::record_quorum_cache_hit();
            return Some(quorum);
        }
        self.build_quorum(params, anchor)
    }

    /// True if the quorum's commitment is mined.
    pub fn has_quorum(&self, llmq_type: LlmqType, quorum_hash: &Hash) -> bool {
        self.deps
            .commitments
            .has_mined_commitment(llmq_type, quorum_hash)
    }

    /// Quorum from the cache only.
    pub(crate) fn cached_quorum(&self, llmq_type: LlmqType, quorum_hash: &Hash) -> Option<Arc<Quorum>> {
        self.quorums
            .lock()
            .get_mut(&llmq_type)?
            .get(quorum_hash)
            .cloned()
    }

    /// Up to `count` quorums whose commitments were mined at or below
    /// `start`, most recent first.
    pub fn scan_quorums(
        &self,
        llmq_type: LlmqType,
        start: &BlockIndex,
        count: usize,
    ) -> Vec<Arc<Quorum>> {
        let Some(params) = self.consensus.params(llmq_type) else {
            return Vec::new();
        };
        if count == 0 {
            return Vec::new();
        }
        let capacity = params.cache_capacity();

        let mut result = Vec::new();
        let mut scan_from = Some(*start);
        let mut scan_count = count;
        let cache_exists = {
            let mut scans = self.scans.lock();
            match scans.get_mut(&llmq_type).and_then(|c| c.get(&start.hash)) {
                Some(cached) if cached.len() >= count => {
                    metrics::record_scan_cache_hit(ScanCacheHit::Full);
                    return cached[..count].to_vec();
                }
                Some(cached) => {
                    metrics::record_scan_cache_hit(ScanCacheHit::Partial);
                    result = cached.clone();
                    if let Some(oldest) = result.last() {
                        scan_count -= result.len();
                        scan_from = self.deps.chain.lookup_block(&oldest.anchor().prev_hash);
                    }
                    true
                }
                None => {
                    scan_count = count.max(capacity);
                    false
                }
            }
        };

        if let Some(scan_from) = scan_from {
            let anchors = self
                .deps
                .commitments
                .mined_commitments_until_block(llmq_type, &scan_from, scan_count);
            result.extend(
                anchors
                    .iter()
                    .filter_map(|anchor| self.get_quorum_at(llmq_type, anchor)),
            );
        }

        if !result.is_empty() && !cache_exists {
            if let Some(cache) = self.scans.lock().get_mut(&llmq_type) {
                cache.put(start.hash, result[..result.len().min(capacity)].to_vec());
            }
        }
        result.truncate(count);
        result
    }

    /// Up to `count` quorums from the chain tip, most recent first.
    pub fn scan_quorums_from_tip(&self, llmq_type: LlmqType, count: usize) -> Vec<Arc<Quorum>> {
        match self.deps.chain.tip() {
            Some(tip) => self.scan_quorums(llmq_type, &tip, count),
            None => Vec::new(),
        }
    }

    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    fn build_quorum(&self, params: &LlmqParams, anchor: &BlockIndex) -> Option<Arc<Quorum>> {
        let _build = self.build_lock.lock();
        if let Some(quorum) = self.cached_quorum(params.llmq_type, &anchor.hash) {
            return Some(quorum);
        }

        let (commitment, mined_block_hash) = self
            .deps
            .commitments
            .mined_commitment(params.llmq_type, &anchor.hash)?;
        let members = self.selector.members(
            params,
            anchor,
            self.deps.chain.as_ref(),
            self.deps.masternodes.as_ref(),
        );
        if members.is_empty() {
            warn!(
                llmq_type = %params.llmq_type,
                quorum_hash = %short_hex(&anchor.hash),
                "[qc-18] No members for mined quorum"
            );
            return None;
        }

        let quorum = Arc::new(Quorum::new(
            params.clone(),
            Arc::clone(&commitment),
            *anchor,
            mined_block_hash,
            members.as_ref().clone(),
            Arc::clone(&self.deps.worker),
        ));

        let has_vvec = match quorum.read_contributions(self.deps.store.as_ref()) {
            Ok(true) => true,
            Ok(false) => {
                if self.build_quorum_contributions(&commitment, &quorum) {
                    if let Err(e) = quorum.write_contributions(self.deps.store.as_ref()) {
                        warn!("[qc-18] Failed to persist quorum contributions: {}", e);
                    }
                    true
                } else {
                    debug!(
                        "[qc-18] No contributions for quorum {} ({}), non-member mode",
                        short_hex(&anchor.hash),
                        params.llmq_type
                    );
                    false
                }
            }
            Err(e) => {
                warn!("[qc-18] Failed to read quorum contributions: {}", e);
                false
            }
        };
        if has_vvec {
            self.start_cache_populator(Arc::clone(&quorum));
        }

        let mut quorums = self.quorums.lock();
        let cache = quorums.get_mut(&params.llmq_type)?;
        if let Some(existing) = cache.get(&anchor.hash) {
            return Some(Arc::clone(existing));
        }
        cache.put(anchor.hash, Arc::clone(&quorum));
        metrics::record_quorum_built();
        Some(quorum)
    }

    /// Rebuild the quorum material from the local DKG session. `false` when
    /// the node did not take part or the verification vector is unusable;
    /// a bad secret key share leaves the quorum with the vector only.
    fn build_quorum_contributions(&self, commitment: &FinalCommitment, quorum: &Quorum) -> bool {
        let Some(contributions) = self.deps.dkg.verified_contributions(
            commitment.llmq_type,
            quorum.anchor(),
            &commitment.valid_members,
        ) else {
            return false;
        };

        let vvec = match self
            .deps
            .worker
            .build_quorum_verification_vector(&contributions.vvecs)
        {
            Ok(vvec) => vvec,
            Err(e) => {
                warn!("[qc-18] Failed to build quorum verification vector: {}", e);
                return false;
            }
        };
        if let Err(e) = quorum.set_verification_vector(vvec) {
            warn!("[qc-18] {}", e);
            return false;
        }

        let Some(local) = self.local_pro_tx_hash() else {
            return true;
        };
        match self
            .deps
            .worker
            .aggregate_secret_keys(&contributions.sk_contributions)
        {
            Ok(sk_share) => {
                if let Err(e) = quorum.set_secret_key_share(sk_share, &local) {
                    warn!(
                        "[qc-18] Quorum {} keeps its verification vector only: {}",
                        short_hex(&quorum.quorum_hash()),
                        e
                    );
                }
            }
            Err(e) => warn!("[qc-18] Failed to aggregate secret key share: {}", e),
        }
        true
    }
}

#[async_trait]
impl QuorumManagerApi for QuorumManager {
    async fn get_quorum(&self, llmq_type: LlmqType, quorum_hash: Hash) -> Option<Arc<Quorum>> {
        QuorumManager::get_quorum(self, llmq_type, &quorum_hash)
    }

    async fn scan_quorums(
        &self,
        llmq_type: LlmqType,
        start: BlockIndex,
        count: usize,
    ) -> Vec<Arc<Quorum>> {
        QuorumManager::scan_quorums(self, llmq_type, &start, count)
    }

    async fn scan_quorums_from_tip(&self, llmq_type: LlmqType, count: usize) -> Vec<Arc<Quorum>> {
        QuorumManager::scan_quorums_from_tip(self, llmq_type, count)
    }

    async fn has_quorum(&self, llmq_type: LlmqType, quorum_hash: Hash) -> bool {
        QuorumManager::has_quorum(self, llmq_type, &quorum_hash)
    }

    async fn request_quorum_data(
        &self,
        peer: PeerId,
        llmq_type: LlmqType,
        quorum_hash: Hash,
        data_mask: u16,
        pro_tx_hash: ProTxHash,
    ) -> bool {
        QuorumManager::request_quorum_data(self, peer, llmq_type, &quorum_hash, data_mask, pro_tx_hash)
    }
}

#[cfg(test)]
mod tests;
