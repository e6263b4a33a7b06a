//! Quorum data recovery and public key share cache population.
//!
//! A recovery task asks the other valid members of a quorum, one at a time,
//! for whatever the local node is missing. Members are tried in ascending
//! pro-tx order starting at an offset derived from our position in the
//! masternode list, so concurrent recoveries spread over different members.

use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use shared_types::{short_hex, BlockIndex, ProTxHash};

use super::QuorumManager;
use crate::metrics::{self, RecoveryOutcome};
use crate::domain::{
    OutgoingState, Quorum, RecoveryGuard, ENCRYPTED_CONTRIBUTIONS, QUORUM_VERIFICATION_VECTOR,
};

/// Pause between two iterations of the recovery loop.
const RECOVERY_TICK: Duration = Duration::from_secs(1);
/// Per-offset delay before connecting to a new member.
const OFFSET_BACKOFF: Duration = Duration::from_millis(100);

impl QuorumManager {
    /// Claim the quorum's recovery flag and spawn the recovery task.
    pub(crate) fn start_quorum_data_recovery(
        self: &Arc<Self>,
        quorum: Arc<Quorum>,
        block: &BlockIndex,
        data_mask: u16,
    ) {
        let Some(local) = self.local_pro_tx_hash() else {
            return;
        };
        let Some(guard) = quorum.try_begin_recovery() else {
            debug!(
                "[qc-18] Recovery already running for quorum {}",
                short_hex(&quorum.quorum_hash())
            );
            return;
        };
        let offset = self.recovery_start_offset(&quorum, block, &local);
        let manager = Arc::clone(self);
        if self
            .pool
            .spawn(async move { manager.recover_quorum_data(guard, local, offset, data_mask).await })
            .is_none()
        {
            debug!("[qc-18] No runtime for quorum data recovery");
            return;
        }
        metrics::record_recovery(RecoveryOutcome::Started);
    }

    /// Our index in the sorted list of valid masternodes at `block`, modulo
    /// the committee size.
    pub(crate) fn recovery_start_offset(
        &self,
        quorum: &Quorum,
        block: &BlockIndex,
        local: &ProTxHash,
    ) -> usize {
        let mut pro_tx_hashes: Vec<ProTxHash> = self
            .deps
            .masternodes
            .valid_members_at(&block.hash)
            .into_iter()
            .map(|mn| mn.pro_tx_hash)
            .collect();
        pro_tx_hashes.sort_unstable();
        let index = pro_tx_hashes
            .iter()
            .position(|p| p == local)
            .unwrap_or(0);
        index % quorum.commitment().valid_members.len().max(1)
    }

    async fn recover_quorum_data(
        self: Arc<Self>,
        guard: RecoveryGuard,
        local: ProTxHash,
        offset: usize,
        mut data_mask: u16,
    ) {
        let quorum = Arc::clone(guard.quorum());
        let quorum_hash = quorum.quorum_hash();
        let llmq_type = quorum.llmq_type();
        let log = |step: &str, data_mask: u16| {
            debug!(
                llmq_type = %llmq_type,
                quorum_hash = %short_hex(&quorum_hash),
                data_mask,
                "[qc-18] Quorum data recovery: {}",
                step
            );
        };
        let timeout = self.config.request_timeout();
        log("start", data_mask);

        while !self.deps.chain.is_synced() {
            if !self.interrupt.sleep(timeout).await {
                log("aborted", data_mask);
                metrics::record_recovery(RecoveryOutcome::Aborted);
                return;
            }
        }

        let mut targets: Vec<ProTxHash> = quorum
            .roster()
            .valid_members()
            .map(|(_, m)| m.pro_tx_hash)
            .filter(|p| *p != local)
            .collect();
        targets.sort_unstable();

        let mut tries = 0usize;
        let mut last_success: Option<Instant> = None;
        let mut current: Option<ProTxHash> = None;

        while data_mask != 0 && !self.interrupt.is_raised() {
            if data_mask & QUORUM_VERIFICATION_VECTOR != 0 && quorum.has_verification_vector() {
                data_mask &= !QUORUM_VERIFICATION_VECTOR;
                log("received verification vector", data_mask);
            }
            if data_mask & ENCRYPTED_CONTRIBUTIONS != 0 && quorum.has_secret_key_share() {
                data_mask &= !ENCRYPTED_CONTRIBUTIONS;
                log("received secret key share", data_mask);
            }
            if data_mask == 0 {
                info!(
                    quorum_hash = %short_hex(&quorum_hash),
                    "[qc-18] Quorum data recovered"
                );
                metrics::record_recovery(RecoveryOutcome::Succeeded);
                break;
            }

            if last_success.map_or(true, |t| t.elapsed() > timeout) {
                if tries >= targets.len() {
                    log("all members tried", data_mask);
                    metrics::record_recovery(RecoveryOutcome::Exhausted);
                    break;
                }
                let target = targets[(offset + tries) % targets.len()];
                tries += 1;
                current = Some(target);
                if self.requests.has_unexpired_outgoing(&target) {
                    log("already asked", data_mask);
                    continue;
                }
                if !self
                    .interrupt
                    .sleep(OFFSET_BACKOFF * offset as u32)
                    .await
                {
                    break;
                }
                last_success = Some(Instant::now());
                self.deps.network.add_pending_masternode(target);
                trace!("[qc-18] Connecting to {}", short_hex(&target));
            }

            if let Some(target) = current {
                for peer in self.deps.network.connected_peers() {
                    if peer.verified_pro_tx_hash != Some(target) {
                        continue;
                    }
                    if self.request_quorum_data(
                        peer.id,
                        quorum.llmq_type(),
                        &quorum_hash,
                        data_mask,
                        local,
                    ) {
                        last_success = Some(Instant::now());
                        log("requested", data_mask);
                        continue;
                    }
                    match self.requests.outgoing_state(&target) {
                        OutgoingState::Missing => {
                            log("request failed", data_mask);
                            self.deps.network.disconnect(peer.id);
                            current = None;
                        }
                        OutgoingState::Processed => {
                            log("request processed", data_mask);
                            self.deps.network.disconnect(peer.id);
                            current = None;
                        }
                        OutgoingState::Pending => log("waiting", data_mask),
                    }
                }
            }

            if !self.interrupt.sleep(RECOVERY_TICK).await {
                break;
            }
        }
        if self.interrupt.is_raised() {
            metrics::record_recovery(RecoveryOutcome::Aborted);
        }
        log("done", data_mask);
        drop(guard);
    }

    /// Derive every valid member's public key share in the background.
    pub(crate) fn start_cache_populator(&self, quorum: Arc<Quorum>) {
        if !quorum.has_verification_vector() {
            return;
        }
        let interrupt = self.interrupt.clone();
        self.pool.execute(move || {
            let started = StdInstant::now();
            let derived = quorum.populate_public_key_share_cache(&interrupt);
            debug!(
                "[qc-18] Cached {} public key shares for quorum {} in {:?}",
                derived,
                short_hex(&quorum.quorum_hash()),
                started.elapsed()
            );
        });
    }
}
