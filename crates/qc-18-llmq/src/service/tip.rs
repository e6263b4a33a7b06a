//! Chain-tip reaction.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace};

use shared_types::{short_hex, BlockIndex, ProTxHash};

use super::QuorumManager;
use crate::config::QvvecSyncMode;
use crate::domain::{LlmqParams, Quorum, ENCRYPTED_CONTRIBUTIONS, QUORUM_VERIFICATION_VECTOR};

impl QuorumManager {
    /// React to a new chain tip: keep quorum connections current, drop
    /// expired data requests and start recovery where data is missing.
    /// Does nothing before the chain is synced.
    pub fn updated_block_tip(self: &Arc<Self>, tip: &BlockIndex) {
        if !self.deps.chain.is_synced() {
            return;
        }
        for params in self.consensus.iter() {
            self.ensure_quorum_connections(params, tip);
        }
        let swept = self.requests.sweep_expired();
        if swept > 0 {
            debug!("[qc-18] Dropped {} expired data requests", swept);
        }
        self.trigger_quorum_data_recovery(tip);
        self.deps.dkg.updated_block_tip(tip);
    }

    /// Register connections for the last `keep_old_connections` quorums we
    /// belong to (or watch) and drop every other registered quorum of the
    /// type, except the one of the DKG round in progress.
    pub fn ensure_quorum_connections(&self, params: &LlmqParams, tip: &BlockIndex) {
        let llmq_type = params.llmq_type;
        let last = self.scan_quorums(llmq_type, tip, params.keep_old_connections);
        let mut to_delete = self.deps.network.quorum_nodes(llmq_type);
        if let Some(dkg_block) = self
            .deps
            .chain
            .ancestor(tip, params.dkg_round_start(tip.height))
        {
            to_delete.remove(&dkg_block.hash);
        }

        let local = self.local_pro_tx_hash();
        for quorum in &last {
            if self.ensure_connections_for(quorum, local.as_ref()) {
                to_delete.remove(&quorum.quorum_hash());
            }
        }
        for quorum_hash in to_delete {
            debug!(
                "[qc-18] Removing masternode connections for quorum {} ({})",
                short_hex(&quorum_hash),
                llmq_type
            );
            self.deps.network.remove_quorum_nodes(llmq_type, &quorum_hash);
        }
    }

    /// `false` if we neither belong to the quorum nor watch quorums.
    fn ensure_connections_for(&self, quorum: &Quorum, local: Option<&ProTxHash>) -> bool {
        let is_member = local.is_some_and(|p| quorum.is_member(p));
        if !is_member && !self.config.watch_quorums {
            return false;
        }
        let connections: BTreeSet<ProTxHash> = quorum
            .roster()
            .members()
            .map(|m| m.pro_tx_hash)
            .filter(|p| Some(p) != local)
            .collect();
        if connections.is_empty() {
            return true;
        }
        let quorum_hash = quorum.quorum_hash();
        if !self
            .deps
            .network
            .has_quorum_nodes(quorum.llmq_type(), &quorum_hash)
        {
            debug!(
                "[qc-18] Connecting to {} members of quorum {} ({}){}",
                connections.len(),
                short_hex(&quorum_hash),
                quorum.llmq_type(),
                if is_member { "" } else { " as watcher" }
            );
        }
        self.deps
            .network
            .set_quorum_nodes(quorum.llmq_type(), quorum_hash, connections);
        true
    }

    /// Start a recovery task for every recent quorum missing data we need.
    /// Only runs as a masternode with recovery enabled.
    pub fn trigger_quorum_data_recovery(self: &Arc<Self>, block: &BlockIndex) {
        let Some(local) = self.local_pro_tx_hash() else {
            return;
        };
        if !self.config.data_recovery_enabled {
            return;
        }
        trace!("[qc-18] Checking quorum data at {}", block);

        for params in self.consensus.iter() {
            let quorums =
                self.scan_quorums(params.llmq_type, block, params.signing_active_quorum_count + 1);
            let type_member = quorums.iter().any(|q| q.is_valid_member(&local));
            let sync_mode = self
                .qvvec_sync
                .get(&params.llmq_type)
                .copied()
                .unwrap_or(QvvecSyncMode::Invalid);
            let sync_vvec = sync_mode == QvvecSyncMode::Always
                || (sync_mode == QvvecSyncMode::OnlyIfTypeMember && type_member);

            for quorum in quorums {
                if quorum.is_recovery_in_progress() {
                    continue;
                }
                let member = quorum.is_valid_member(&local);
                let mut data_mask = 0;
                if (member || sync_vvec) && !quorum.has_verification_vector() {
                    data_mask |= QUORUM_VERIFICATION_VECTOR;
                }
                if member && !quorum.has_secret_key_share() {
                    data_mask |= ENCRYPTED_CONTRIBUTIONS;
                }
                if data_mask == 0 {
                    trace!(
                        "[qc-18] No data needed for quorum {}",
                        short_hex(&quorum.quorum_hash())
                    );
                    continue;
                }
                self.start_quorum_data_recovery(quorum, block, data_mask);
            }
        }
    }
}
