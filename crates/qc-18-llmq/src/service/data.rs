//! `qgetdata` / `qdata` handling.
//!
//! Requests are served only by masternodes and only to peers that proved a
//! masternode identity or connected in watch mode. Replies are accepted only
//! if they match an outstanding request sent by this node. Every rejected
//! message is scored through `QuorumNetwork::misbehaving`.

use std::sync::Arc;
use tracing::{debug, info, warn};

use shared_types::{short_hex, Hash, PeerId, ProTxHash, ZERO_HASH};

use super::QuorumManager;
use crate::config::LLMQ_DATA_MESSAGES_VERSION;
use crate::metrics;
use crate::domain::{
    DataRequestError, LlmqMessage, LlmqType, Quorum, QuorumDataReply, QuorumDataRequest,
    ReplyMismatch,
};
use crate::ports::PeerInfo;

/// Tracker key of a peer: its masternode identity, or the null hash for
/// watch connections.
fn request_key(peer: &PeerInfo) -> ProTxHash {
    peer.verified_pro_tx_hash.unwrap_or(ZERO_HASH)
}

fn is_verified_or_watch(peer: &PeerInfo) -> bool {
    peer.verified_pro_tx_hash.is_some() || peer.is_watch
}

impl QuorumManager {
    /// Send a `qgetdata` for the quorum anchored at `quorum_hash` to `peer`.
    ///
    /// `false` when the peer cannot serve it, the quorum is unknown, or an
    /// unexpired request to the same peer is outstanding.
    pub fn request_quorum_data(
        &self,
        peer: PeerId,
        llmq_type: LlmqType,
        quorum_hash: &Hash,
        data_mask: u16,
        pro_tx_hash: ProTxHash,
    ) -> bool {
        let Some(info) = self.deps.network.peer(peer) else {
            debug!("[qc-18] Data request to unknown peer");
            return false;
        };
        if info.version < LLMQ_DATA_MESSAGES_VERSION {
            debug!(
                "[qc-18] Peer version {} below {}",
                info.version, LLMQ_DATA_MESSAGES_VERSION
            );
            return false;
        }
        if !is_verified_or_watch(&info) {
            debug!("[qc-18] Peer is neither a verified masternode nor a watch connection");
            return false;
        }
        if !self.consensus.has_llmq(llmq_type) {
            debug!("[qc-18] Quorum type {} not configured", llmq_type);
            return false;
        }
        if self.get_quorum(llmq_type, quorum_hash).is_none() {
            debug!("[qc-18] Quorum {} not found", short_hex(quorum_hash));
            return false;
        }

        let request = QuorumDataRequest::new(llmq_type.as_u8(), *quorum_hash, data_mask, pro_tx_hash);
        if !self
            .requests
            .try_insert(request_key(&info), true, request.clone())
        {
            debug!(
                "[qc-18] Quorum data already requested from {}",
                short_hex(&request_key(&info))
            );
            return false;
        }
        debug!(
            llmq_type = %llmq_type,
            quorum_hash = %short_hex(quorum_hash),
            pro_tx_hash = %short_hex(&pro_tx_hash),
            "[qc-18] Sending qgetdata"
        );
        self.deps.network.send(peer, LlmqMessage::GetData(request));
        true
    }

    /// Handle a decoded quorum data message from `peer`.
    pub fn process_message(&self, peer: PeerId, message: LlmqMessage) {
        match message {
            LlmqMessage::GetData(request) => self.process_get_data(peer, request),
            LlmqMessage::Data(reply) => self.process_data(peer, reply),
        }
    }

    /// Score a protocol violation. A zero score only logs.
    pub(crate) fn misbehaving(&self, peer: PeerId, score: u32, reason: &str) {
        if score == 0 {
            debug!("[qc-18] Quorum data from peer ignored: {}", reason);
            return;
        }
        warn!(score, "[qc-18] Peer misbehaving: {}", reason);
        self.deps.network.misbehaving(peer, score);
    }

    fn process_get_data(&self, peer: PeerId, request: QuorumDataRequest) {
        let scores = self.config.misbehavior;
        let info = self.deps.network.peer(peer);
        let info = match info {
            Some(info) if self.local_pro_tx_hash().is_some() && is_verified_or_watch(&info) => info,
            _ => {
                metrics::record_qgetdata_rejected("unverified");
                self.misbehaving(peer, scores.default, "qgetdata from unverified peer");
                return;
            }
        };

        if !self.requests.try_insert(request_key(&info), false, request.clone()) {
            metrics::record_qgetdata_rejected("rate_limited");
            self.misbehaving(peer, scores.rate_limit, "qgetdata request limit exceeded");
            return;
        }

        let reply = self.serve(&request);
        debug!(
            error = ?reply.request.error,
            quorum_hash = %short_hex(&request.quorum_hash),
            "[qc-18] Sending qdata"
        );
        metrics::record_qgetdata_reply(reply.request.error);
        self.deps.network.send(peer, LlmqMessage::Data(reply));
    }

    fn serve(&self, request: &QuorumDataRequest) -> QuorumDataReply {
        let fail = |error| QuorumDataReply::error(request.clone(), error);

        let Some(llmq_type) = self
            .consensus
            .params_for_byte(request.llmq_type)
            .map(|p| p.llmq_type)
        else {
            return fail(DataRequestError::QuorumTypeInvalid);
        };
        let Some(anchor) = self.deps.chain.lookup_block(&request.quorum_hash) else {
            return fail(DataRequestError::QuorumBlockNotFound);
        };
        let Some(quorum) = self.get_quorum_at(llmq_type, &anchor) else {
            return fail(DataRequestError::QuorumNotFound);
        };

        let mut reply = fail(DataRequestError::None);
        if request.wants_vvec() {
            let Some(vvec) = quorum.verification_vector() else {
                return fail(DataRequestError::QuorumVerificationVectorMissing);
            };
            reply.vvec = Some(vvec.as_ref().clone());
        }
        if request.wants_contributions() {
            if quorum.member_index(&request.pro_tx_hash).is_none() {
                return fail(DataRequestError::MasternodeIsNoMember);
            }
            let Some(contributions) = self.deps.dkg.encrypted_contributions(
                llmq_type,
                &anchor,
                &quorum.commitment().valid_members,
                &request.pro_tx_hash,
            ) else {
                return fail(DataRequestError::EncryptedContributionsMissing);
            };
            reply.contributions = Some(contributions);
        }
        reply
    }

    fn process_data(&self, peer: PeerId, reply: QuorumDataReply) {
        let scores = self.config.misbehavior;
        let may_receive = self.local_pro_tx_hash().is_some() || self.config.watch_quorums;
        let info = match self.deps.network.peer(peer) {
            Some(info) if may_receive && is_verified_or_watch(&info) => info,
            _ => {
                self.reject_data(peer, scores.default, "qdata from unverified peer");
                return;
            }
        };

        if let Err(mismatch) = self
            .requests
            .mark_processed_if_matches(&request_key(&info), &reply.request)
        {
            let reason = match mismatch {
                ReplyMismatch::NotRequested => "qdata not requested",
                ReplyMismatch::AlreadyReceived => "qdata already received",
                ReplyMismatch::NotLikeRequested => "qdata not like requested",
            };
            self.reject_data(peer, scores.default, reason);
            return;
        }

        let request = &reply.request;
        if request.error != DataRequestError::None {
            self.reject_data(peer, 0, &format!("error reply {:?}", request.error));
            return;
        }

        let quorum = LlmqType::try_from(request.llmq_type)
            .ok()
            .and_then(|t| self.cached_quorum(t, &request.quorum_hash));
        let Some(quorum) = quorum else {
            self.reject_data(peer, 0, "quorum not found");
            return;
        };

        if request.wants_vvec() {
            let Some(vvec) = reply.vvec.clone() else {
                self.reject_data(peer, scores.default, "missing quorum verification vector");
                return;
            };
            if let Err(e) = quorum.set_verification_vector(vvec) {
                self.reject_data(peer, scores.default, &e.to_string());
                return;
            }
            self.start_cache_populator(Arc::clone(&quorum));
        }

        if request.wants_contributions() {
            let contributions = reply.contributions.as_deref().unwrap_or_default();
            if let Err((score, reason)) = self.apply_contributions(&quorum, request, contributions) {
                self.reject_data(peer, score, reason);
                return;
            }
        }

        if let Err(e) = quorum.write_contributions(self.deps.store.as_ref()) {
            warn!("[qc-18] Failed to persist received quorum data: {}", e);
            return;
        }
        metrics::record_qdata_accepted();
        info!(
            quorum_hash = %short_hex(&quorum.quorum_hash()),
            "[qc-18] Stored quorum data received from peer"
        );
    }

    fn reject_data(&self, peer: PeerId, score: u32, reason: &str) {
        metrics::record_qdata_rejected(score);
        self.misbehaving(peer, score, reason);
    }

    /// Decrypt, aggregate and install the secret key share. On failure
    /// returns the misbehavior score and the reason.
    fn apply_contributions(
        &self,
        quorum: &Quorum,
        request: &QuorumDataRequest,
        contributions: &[Vec<u8>],
    ) -> Result<(), (u32, &'static str)> {
        let default = self.config.misbehavior.default;
        let has_vvec = quorum
            .verification_vector()
            .is_some_and(|v| v.len() == quorum.params().threshold);
        if !has_vvec {
            return Err((0, "no valid quorum verification vector available"));
        }
        if quorum.member_index(&request.pro_tx_hash).is_none() {
            return Err((0, "not a member of the quorum"));
        }
        let Some(local) = self.active_masternode() else {
            return Err((0, "no operator key to decrypt contributions"));
        };

        let shares = contributions
            .iter()
            .map(|blob| {
                self.deps
                    .worker
                    .decrypt_for_member(&local.operator_key, blob)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| (default, "failed to decrypt"))?;
        let sk_share = self
            .deps
            .worker
            .aggregate_secret_keys(&shares)
            .map_err(|_| (default, "invalid secret key share received"))?;
        quorum
            .set_secret_key_share(sk_share, &local.pro_tx_hash)
            .map_err(|_| (default, "invalid secret key share received"))
    }
}
