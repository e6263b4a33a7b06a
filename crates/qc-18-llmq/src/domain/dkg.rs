//! # DKG Session
//!
//! Local participant view of one distributed key generation round.
//!
//! ## Phases
//!
//! ```text
//! Initialized -> Contribute -> Complain -> Justify -> Commit -> Finalize
//! ```
//!
//! Each phase lasts `dkg_phase_blocks` blocks, counted from the anchor
//! block. Members broadcast a contribution (verification vector plus one
//! encrypted secret share per member), complain about missing or invalid
//! shares, justify by revealing shares, and finally sign a premature
//! commitment. Premature commitments agreeing on the outcome are aggregated
//! into the [`FinalCommitment`] that gets mined.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use shared_types::{short_hex, BlockIndex, Hash, ProTxHash};

use super::commitment::{build_commitment_hash, FinalCommitment};
use super::keys::{vvec_hash, BlsPublicKey, BlsSecretKey, BlsSignature, VerificationVector};
use super::params::{ConsensusParams, LlmqParams, LlmqType};
use super::roster::MasternodeEntry;
use super::serialize::MemberBitset;
use crate::error::{LlmqError, LlmqResult};
use crate::ports::{BlsWorker, DkgContributionSource, VerifiedContributions};

/// DKG phase derived from the block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DkgPhase {
    /// Between rounds.
    Idle,
    /// Session created at the anchor block.
    Initialized,
    /// Members broadcast contributions.
    Contribute,
    /// Members complain about missing or invalid contributions.
    Complain,
    /// Accused members reveal shares.
    Justify,
    /// Members broadcast premature commitments.
    Commit,
    /// Final commitment is built and mined.
    Finalize,
}

impl DkgPhase {
    /// Phase of the round in progress at `height`. Sessions are advanced by
    /// the DKG driver that owns the p2p side of the round; this crate only
    /// reads their results.
    pub fn at_height(params: &LlmqParams, height: u64) -> Self {
        let offset = height % params.dkg_interval;
        match offset / params.dkg_phase_blocks.max(1) {
            0 => Self::Initialized,
            1 => Self::Contribute,
            2 => Self::Complain,
            3 => Self::Justify,
            4 => Self::Commit,
            5 => Self::Finalize,
            _ => Self::Idle,
        }
    }
}

/// Contribution broadcast in the `Contribute` phase.
#[derive(Debug, Clone)]
pub struct DkgContribution {
    /// Quorum type.
    pub llmq_type: LlmqType,
    /// Anchor block hash.
    pub quorum_hash: Hash,
    /// Contributing member.
    pub pro_tx_hash: ProTxHash,
    /// Commitments to the member's secret polynomial.
    pub vvec: Arc<VerificationVector>,
    /// One encrypted share per committee member, in committee order.
    pub encrypted: Vec<Vec<u8>>,
}

/// Complaint broadcast in the `Complain` phase.
#[derive(Debug, Clone)]
pub struct DkgComplaint {
    /// Anchor block hash.
    pub quorum_hash: Hash,
    /// Complaining member.
    pub pro_tx_hash: ProTxHash,
    /// Members that sent nothing.
    pub bad_members: MemberBitset,
    /// Members whose share for the complainer did not verify.
    pub complain_for: MemberBitset,
}

/// Justification broadcast in the `Justify` phase.
#[derive(Debug, Clone)]
pub struct DkgJustification {
    /// Anchor block hash.
    pub quorum_hash: Hash,
    /// Justifying member.
    pub pro_tx_hash: ProTxHash,
    /// Revealed shares, keyed by the complainer's committee index.
    pub contributions: Vec<(usize, BlsSecretKey)>,
}

/// Premature commitment broadcast in the `Commit` phase.
#[derive(Debug, Clone)]
pub struct DkgPrematureCommitment {
    /// Anchor block hash.
    pub quorum_hash: Hash,
    /// Signing member.
    pub pro_tx_hash: ProTxHash,
    /// Members the signer considers valid.
    pub valid_members: MemberBitset,
    /// Resulting quorum public key.
    pub quorum_public_key: BlsPublicKey,
    /// Hash of the resulting quorum verification vector.
    pub quorum_vvec_hash: Hash,
    /// Signer's threshold signature share over the commitment hash.
    pub quorum_sig: BlsSignature,
    /// Signer's operator signature over the commitment hash.
    pub sig: BlsSignature,
}

#[derive(Default)]
struct MemberState {
    vvec: Option<Arc<VerificationVector>>,
    encrypted: Option<Vec<Vec<u8>>>,
    sk_contribution: Option<BlsSecretKey>,
    we_complain: bool,
    bad: bool,
    bad_votes: BTreeSet<usize>,
    complaints_from: BTreeSet<usize>,
}

/// One DKG round from the point of view of the local node.
pub struct DkgSession {
    params: LlmqParams,
    anchor: BlockIndex,
    members: Vec<MasternodeEntry>,
    local: Option<(usize, BlsSecretKey)>,
    worker: Arc<dyn BlsWorker>,
    state: Vec<MemberState>,
    own_shares: Vec<BlsSecretKey>,
    premature: HashMap<usize, DkgPrematureCommitment>,
}

impl DkgSession {
    /// Start a session. `local` carries the node's identity and operator key
    /// when it runs a masternode; the session is passive otherwise.
    pub fn new(
        params: LlmqParams,
        anchor: BlockIndex,
        members: Vec<MasternodeEntry>,
        local: Option<(ProTxHash, BlsSecretKey)>,
        worker: Arc<dyn BlsWorker>,
    ) -> Self {
        let local = local.and_then(|(pro_tx_hash, key)| {
            members
                .iter()
                .position(|m| m.pro_tx_hash == pro_tx_hash)
                .map(|idx| (idx, key))
        });
        let state = members.iter().map(|_| MemberState::default()).collect();
        Self {
            params,
            anchor,
            members,
            local,
            worker,
            state,
            own_shares: Vec::new(),
            premature: HashMap::new(),
        }
    }

    /// Anchor block of the round.
    pub fn anchor(&self) -> &BlockIndex {
        &self.anchor
    }

    /// Committee of the round.
    pub fn members(&self) -> &[MasternodeEntry] {
        &self.members
    }

    /// Local committee index, if the node is a member.
    pub fn my_index(&self) -> Option<usize> {
        self.local.as_ref().map(|(idx, _)| *idx)
    }

    fn index_of(&self, pro_tx_hash: &ProTxHash) -> LlmqResult<usize> {
        self.members
            .iter()
            .position(|m| &m.pro_tx_hash == pro_tx_hash)
            .ok_or_else(|| LlmqError::Dkg {
                reason: format!("{} is not a member", short_hex(pro_tx_hash)),
            })
    }

    fn require_local(&self) -> LlmqResult<(usize, BlsSecretKey)> {
        self.local.clone().ok_or_else(|| LlmqError::Dkg {
            reason: "local node is not a member".into(),
        })
    }

    fn ids(&self) -> Vec<ProTxHash> {
        self.members.iter().map(|m| m.pro_tx_hash).collect()
    }

    // =========================================================================
    // CONTRIBUTE
    // =========================================================================

    /// Generate the local contribution and record it as received.
    pub fn contribute(&mut self) -> LlmqResult<DkgContribution> {
        let (my_idx, _) = self.require_local()?;
        let (vvec, shares) = self
            .worker
            .generate_contribution(self.params.threshold, &self.ids())?;

        let encrypted = self
            .members
            .iter()
            .zip(&shares)
            .map(|(m, share)| self.worker.encrypt_for_member(&m.operator_public_key, share))
            .collect::<Result<Vec<_>, _>>()?;

        let vvec = Arc::new(vvec);
        let own = &mut self.state[my_idx];
        own.vvec = Some(Arc::clone(&vvec));
        own.encrypted = Some(encrypted.clone());
        own.sk_contribution = Some(shares[my_idx].clone());
        self.own_shares = shares;

        debug!(
            "[qc-18] DKG {} contribution generated for {}",
            self.params.llmq_type, self.anchor
        );
        Ok(DkgContribution {
            llmq_type: self.params.llmq_type,
            quorum_hash: self.anchor.hash,
            pro_tx_hash: self.members[my_idx].pro_tx_hash,
            vvec,
            encrypted,
        })
    }

    /// Record a contribution and verify the share addressed to us.
    pub fn receive_contribution(&mut self, contribution: &DkgContribution) -> LlmqResult<()> {
        let idx = self.index_of(&contribution.pro_tx_hash)?;
        if self.state[idx].vvec.is_some() {
            return Err(LlmqError::Dkg {
                reason: "duplicate contribution".into(),
            });
        }
        if contribution.vvec.len() != self.params.threshold
            || contribution.encrypted.len() != self.members.len()
        {
            warn!(
                "[qc-18] DKG malformed contribution from {}",
                short_hex(&contribution.pro_tx_hash)
            );
            self.state[idx].bad = true;
            return Ok(());
        }

        self.state[idx].vvec = Some(Arc::clone(&contribution.vvec));
        self.state[idx].encrypted = Some(contribution.encrypted.clone());

        let Some((my_idx, operator_key)) = self.local.clone() else {
            return Ok(());
        };
        let my_id = self.members[my_idx].pro_tx_hash;
        let share = self
            .worker
            .decrypt_for_member(&operator_key, &contribution.encrypted[my_idx])
            .ok()
            .filter(|share| {
                self.worker
                    .verify_contribution_share(&my_id, share, &contribution.vvec)
            });
        match share {
            Some(share) => self.state[idx].sk_contribution = Some(share),
            None => {
                debug!(
                    "[qc-18] DKG invalid share from {}, will complain",
                    short_hex(&contribution.pro_tx_hash)
                );
                self.state[idx].we_complain = true;
            }
        }
        Ok(())
    }

    // =========================================================================
    // COMPLAIN
    // =========================================================================

    /// Complaint about missing and invalid contributions.
    pub fn build_complaint(&self) -> LlmqResult<DkgComplaint> {
        let (my_idx, _) = self.require_local()?;
        let n = self.members.len();
        let mut bad_members = MemberBitset::repeat(false, n);
        let mut complain_for = MemberBitset::repeat(false, n);
        for (i, s) in self.state.iter().enumerate() {
            if s.vvec.is_none() {
                bad_members.set(i, true);
            }
            if s.we_complain {
                complain_for.set(i, true);
            }
        }
        Ok(DkgComplaint {
            quorum_hash: self.anchor.hash,
            pro_tx_hash: self.members[my_idx].pro_tx_hash,
            bad_members,
            complain_for,
        })
    }

    /// Count bad votes and remember accusations.
    pub fn receive_complaint(&mut self, complaint: &DkgComplaint) -> LlmqResult<()> {
        let from = self.index_of(&complaint.pro_tx_hash)?;
        let n = self.members.len();
        if complaint.bad_members.len() != n || complaint.complain_for.len() != n {
            return Err(LlmqError::Dkg {
                reason: "complaint bitset size mismatch".into(),
            });
        }
        for i in complaint.bad_members.iter_ones() {
            let s = &mut self.state[i];
            s.bad_votes.insert(from);
            if s.bad_votes.len() >= self.params.dkg_bad_votes_threshold {
                s.bad = true;
            }
        }
        for i in complaint.complain_for.iter_ones() {
            self.state[i].complaints_from.insert(from);
        }
        Ok(())
    }

    // =========================================================================
    // JUSTIFY
    // =========================================================================

    /// Reveal our shares for every member that complained about us. `None`
    /// when nobody did.
    pub fn build_justification(&self) -> LlmqResult<Option<DkgJustification>> {
        let (my_idx, _) = self.require_local()?;
        let complainers = &self.state[my_idx].complaints_from;
        if complainers.is_empty() {
            return Ok(None);
        }
        let contributions = complainers
            .iter()
            .filter_map(|&i| self.own_shares.get(i).map(|s| (i, s.clone())))
            .collect();
        Ok(Some(DkgJustification {
            quorum_hash: self.anchor.hash,
            pro_tx_hash: self.members[my_idx].pro_tx_hash,
            contributions,
        }))
    }

    /// Check revealed shares. A valid reveal clears the accusation; an
    /// invalid one marks the justifying member bad.
    pub fn receive_justification(&mut self, justification: &DkgJustification) -> LlmqResult<()> {
        let from = self.index_of(&justification.pro_tx_hash)?;
        let Some(vvec) = self.state[from].vvec.clone() else {
            self.state[from].bad = true;
            return Ok(());
        };
        let my_idx = self.my_index();

        for (idx, share) in &justification.contributions {
            let Some(member) = self.members.get(*idx) else {
                self.state[from].bad = true;
                return Ok(());
            };
            if !self
                .worker
                .verify_contribution_share(&member.pro_tx_hash, share, &vvec)
            {
                warn!(
                    "[qc-18] DKG invalid justification from {}",
                    short_hex(&justification.pro_tx_hash)
                );
                self.state[from].bad = true;
                return Ok(());
            }
            self.state[from].complaints_from.remove(idx);
            if Some(*idx) == my_idx && self.state[from].we_complain {
                self.state[from].sk_contribution = Some(share.clone());
                self.state[from].we_complain = false;
            }
        }
        Ok(())
    }

    // =========================================================================
    // COMMIT
    // =========================================================================

    /// Members that contributed, were not voted bad and face no open
    /// accusation.
    pub fn valid_members(&self) -> MemberBitset {
        let mut bits = MemberBitset::repeat(false, self.params.size);
        for (i, s) in self.state.iter().enumerate() {
            if s.vvec.is_some() && !s.bad && s.complaints_from.is_empty() {
                bits.set(i, true);
            }
        }
        bits
    }

    /// Aggregate the valid contributions and sign the outcome.
    pub fn build_premature_commitment(&mut self) -> LlmqResult<DkgPrematureCommitment> {
        let (my_idx, operator_key) = self.require_local()?;
        let valid_members = self.valid_members();
        if valid_members.count_ones() < self.params.min_size {
            return Err(LlmqError::Dkg {
                reason: format!("only {} valid members", valid_members.count_ones()),
            });
        }
        let contributions = self
            .collect_verified(&valid_members)
            .ok_or_else(|| LlmqError::Dkg {
                reason: "missing contribution from a valid member".into(),
            })?;

        let quorum_vvec = self
            .worker
            .build_quorum_verification_vector(&contributions.vvecs)?;
        let sk_share = self
            .worker
            .aggregate_secret_keys(&contributions.sk_contributions)?;
        let quorum_public_key = *quorum_vvec.first().ok_or_else(|| LlmqError::Dkg {
            reason: "empty quorum verification vector".into(),
        })?;
        let quorum_vvec_hash = vvec_hash(&quorum_vvec);
        let hash = build_commitment_hash(
            self.params.llmq_type,
            &self.anchor.hash,
            &valid_members,
            &quorum_public_key,
            &quorum_vvec_hash,
        );

        let pc = DkgPrematureCommitment {
            quorum_hash: self.anchor.hash,
            pro_tx_hash: self.members[my_idx].pro_tx_hash,
            valid_members,
            quorum_public_key,
            quorum_vvec_hash,
            quorum_sig: self.worker.sign(&sk_share, &hash)?,
            sig: self.worker.sign(&operator_key, &hash)?,
        };
        self.premature.insert(my_idx, pc.clone());
        Ok(pc)
    }

    /// Record a premature commitment after checking the member signature.
    pub fn receive_premature_commitment(&mut self, pc: &DkgPrematureCommitment) -> LlmqResult<()> {
        let from = self.index_of(&pc.pro_tx_hash)?;
        if self.premature.contains_key(&from) {
            return Err(LlmqError::Dkg {
                reason: "duplicate premature commitment".into(),
            });
        }
        if pc.valid_members.len() != self.params.size {
            return Err(LlmqError::Dkg {
                reason: "premature commitment bitset size mismatch".into(),
            });
        }
        let hash = build_commitment_hash(
            self.params.llmq_type,
            &self.anchor.hash,
            &pc.valid_members,
            &pc.quorum_public_key,
            &pc.quorum_vvec_hash,
        );
        if !self
            .worker
            .verify_insecure(&self.members[from].operator_public_key, &hash, &pc.sig)
        {
            return Err(LlmqError::Dkg {
                reason: "invalid premature commitment signature".into(),
            });
        }
        self.premature.insert(from, pc.clone());
        Ok(())
    }

    // =========================================================================
    // FINALIZE
    // =========================================================================

    /// Aggregate agreeing premature commitments into final commitments,
    /// best supported outcome first. Outcomes without `min_size` signers or
    /// whose aggregate does not verify are dropped.
    pub fn finalize(&self) -> Vec<FinalCommitment> {
        let mut groups: HashMap<(Vec<usize>, BlsPublicKey, Hash), Vec<usize>> = HashMap::new();
        for (&signer, pc) in &self.premature {
            let key = (
                pc.valid_members.iter_ones().collect::<Vec<_>>(),
                pc.quorum_public_key,
                pc.quorum_vvec_hash,
            );
            groups.entry(key).or_default().push(signer);
        }

        let consensus = ConsensusParams::new([self.params.clone()]);
        let mut finals: Vec<FinalCommitment> = Vec::new();
        for ((_, quorum_public_key, quorum_vvec_hash), mut signers) in groups {
            if signers.len() < self.params.min_size {
                continue;
            }
            signers.sort_unstable();
            let first = &self.premature[&signers[0]];

            let mut signer_bits = MemberBitset::repeat(false, self.params.size);
            for &i in &signers {
                signer_bits.set(i, true);
            }
            let member_sigs: Vec<BlsSignature> =
                signers.iter().map(|i| self.premature[i].sig).collect();
            let shares: Vec<(ProTxHash, BlsSignature)> = signers
                .iter()
                .map(|&i| (self.members[i].pro_tx_hash, self.premature[&i].quorum_sig))
                .collect();

            let (Ok(members_sig), Ok(quorum_sig)) = (
                self.worker.aggregate_signatures(&member_sigs),
                self.worker.recover_threshold_signature(&shares),
            ) else {
                warn!("[qc-18] DKG failed to aggregate signatures for {}", self.anchor);
                continue;
            };

            let commitment = FinalCommitment {
                version: FinalCommitment::CURRENT_VERSION,
                llmq_type: self.params.llmq_type,
                quorum_hash: self.anchor.hash,
                signers: signer_bits,
                valid_members: first.valid_members.clone(),
                quorum_public_key,
                quorum_vvec_hash,
                quorum_sig,
                members_sig,
            };
            if commitment.verify(&consensus, &self.members, true, self.worker.as_ref()) {
                finals.push(commitment);
            } else {
                warn!("[qc-18] DKG aggregated commitment does not verify for {}", self.anchor);
            }
        }

        finals.sort_by_key(|c| std::cmp::Reverse(c.count_signers()));
        if let Some(best) = finals.first() {
            info!(
                "[qc-18] DKG {} final commitment for {}: {} signers, {} valid members",
                self.params.llmq_type,
                self.anchor,
                best.count_signers(),
                best.count_valid_members()
            );
        }
        finals
    }

    // =========================================================================
    // CONTRIBUTION ACCESS
    // =========================================================================

    fn collect_verified(&self, valid_members: &MemberBitset) -> Option<VerifiedContributions> {
        let mut out = VerifiedContributions {
            member_indexes: Vec::new(),
            vvecs: Vec::new(),
            sk_contributions: Vec::new(),
        };
        for i in valid_members.iter_ones() {
            let s = self.state.get(i)?;
            out.member_indexes.push(i);
            out.vvecs.push(s.vvec.clone()?);
            out.sk_contributions.push(s.sk_contribution.clone()?);
        }
        Some(out)
    }

    fn collect_encrypted(
        &self,
        valid_members: &MemberBitset,
        pro_tx_hash: &ProTxHash,
    ) -> Option<Vec<Vec<u8>>> {
        let target = self.index_of(pro_tx_hash).ok()?;
        valid_members
            .iter_ones()
            .map(|i| {
                self.state
                    .get(i)?
                    .encrypted
                    .as_ref()
                    .and_then(|e| e.get(target).cloned())
            })
            .collect()
    }
}

/// Rounds a session outlives its own before it is dropped on a tip update.
pub const SESSION_KEEP_ROUNDS: u64 = 2;

/// Sessions of the node, keyed by quorum type and anchor hash.
///
/// Filled by the external DKG driver through [`insert`](Self::insert) and
/// [`with_session`](Self::with_session). Finished sessions are dropped when
/// the quorum manager reports a new tip.
#[derive(Default)]
pub struct DkgSessionManager {
    sessions: Mutex<HashMap<(LlmqType, Hash), DkgSession>>,
}

impl DkgSessionManager {
    /// Empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any previous one for the same round.
    pub fn insert(&self, session: DkgSession) {
        let key = (session.params.llmq_type, session.anchor.hash);
        self.sessions.lock().insert(key, session);
    }

    /// Run `f` on the session of a round.
    pub fn with_session<R>(
        &self,
        llmq_type: LlmqType,
        quorum_hash: &Hash,
        f: impl FnOnce(&mut DkgSession) -> R,
    ) -> Option<R> {
        self.sessions
            .lock()
            .get_mut(&(llmq_type, *quorum_hash))
            .map(f)
    }

    /// Drop sessions whose round ended more than [`SESSION_KEEP_ROUNDS`]
    /// intervals before `tip_height`.
    pub fn prune_finished(&self, tip_height: u64) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| {
            tip_height < s.anchor.height + SESSION_KEEP_ROUNDS * s.params.dkg_interval
        });
        before - sessions.len()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// True if no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DkgContributionSource for DkgSessionManager {
    fn verified_contributions(
        &self,
        llmq_type: LlmqType,
        anchor: &BlockIndex,
        valid_members: &MemberBitset,
    ) -> Option<VerifiedContributions> {
        let sessions = self.sessions.lock();
        let session = sessions.get(&(llmq_type, anchor.hash))?;
        session.my_index()?;
        session.collect_verified(valid_members)
    }

    fn encrypted_contributions(
        &self,
        llmq_type: LlmqType,
        anchor: &BlockIndex,
        valid_members: &MemberBitset,
        pro_tx_hash: &ProTxHash,
    ) -> Option<Vec<Vec<u8>>> {
        let sessions = self.sessions.lock();
        sessions
            .get(&(llmq_type, anchor.hash))?
            .collect_encrypted(valid_members, pro_tx_hash)
    }

    fn updated_block_tip(&self, tip: &BlockIndex) {
        let pruned = self.prune_finished(tip.height);
        if pruned > 0 {
            debug!("[qc-18] Dropped {} finished DKG sessions at height {}", pruned, tip.height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_member, mock_operator_key, MockBlsWorker};

    fn committee(n: u8) -> Vec<MasternodeEntry> {
        (1..=n).map(mock_member).collect()
    }

    fn sessions(params: &LlmqParams, members: &[MasternodeEntry]) -> Vec<DkgSession> {
        let anchor = BlockIndex::new([0xaa; 32], 48, [0xab; 32]);
        members
            .iter()
            .enumerate()
            .map(|(i, m)| {
                DkgSession::new(
                    params.clone(),
                    anchor,
                    members.to_vec(),
                    Some((m.pro_tx_hash, mock_operator_key(i as u8 + 1))),
                    Arc::new(MockBlsWorker),
                )
            })
            .collect()
    }

    fn run_contributions(sessions: &mut [DkgSession], skip: &[usize]) {
        let contributions: Vec<_> = sessions
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| !skip.contains(i))
            .map(|(_, s)| s.contribute().unwrap())
            .collect();
        for s in sessions.iter_mut() {
            for c in &contributions {
                if s.my_index().map(|i| s.members()[i].pro_tx_hash) != Some(c.pro_tx_hash) {
                    s.receive_contribution(c).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_phase_schedule() {
        let params = LlmqParams::llmq_test();
        assert_eq!(DkgPhase::at_height(&params, 48), DkgPhase::Initialized);
        assert_eq!(DkgPhase::at_height(&params, 50), DkgPhase::Contribute);
        assert_eq!(DkgPhase::at_height(&params, 57), DkgPhase::Commit);
        assert_eq!(DkgPhase::at_height(&params, 58), DkgPhase::Finalize);
        assert_eq!(DkgPhase::at_height(&params, 60), DkgPhase::Idle);
    }

    #[test]
    fn test_full_round_produces_verifiable_commitment() {
        let params = LlmqParams::llmq_test();
        let members = committee(3);
        let mut sessions = sessions(&params, &members);
        run_contributions(&mut sessions, &[]);

        let complaints: Vec<_> = sessions.iter().map(|s| s.build_complaint().unwrap()).collect();
        for s in sessions.iter_mut() {
            for c in &complaints {
                s.receive_complaint(c).unwrap();
            }
            assert!(s.build_justification().unwrap().is_none());
        }

        let pcs: Vec<_> = sessions
            .iter_mut()
            .map(|s| s.build_premature_commitment().unwrap())
            .collect();
        let aggregator = &mut sessions[0];
        for pc in &pcs[1..] {
            aggregator.receive_premature_commitment(pc).unwrap();
        }

        let finals = aggregator.finalize();
        assert_eq!(finals.len(), 1);
        let fc = &finals[0];
        assert_eq!(fc.count_signers(), 3);
        assert_eq!(fc.count_valid_members(), 3);
        assert!(fc.verify(
            &ConsensusParams::regtest(),
            &members,
            true,
            &MockBlsWorker
        ));
    }

    #[test]
    fn test_silent_member_is_voted_bad() {
        let params = LlmqParams::llmq_test();
        let members = committee(3);
        let mut sessions = sessions(&params, &members);
        run_contributions(&mut sessions, &[2]);

        let complaints: Vec<_> = sessions[..2]
            .iter()
            .map(|s| s.build_complaint().unwrap())
            .collect();
        assert!(complaints[0].bad_members[2]);
        for c in &complaints {
            sessions[0].receive_complaint(c).unwrap();
        }
        let valid = sessions[0].valid_members();
        assert_eq!(valid.iter_ones().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_invalid_share_is_justified() {
        let params = LlmqParams::llmq_test();
        let members = committee(3);
        let mut sessions = sessions(&params, &members);

        let mut c0 = sessions[0].contribute().unwrap();
        // Corrupt the share addressed to member 1.
        c0.encrypted[1] = MockBlsWorker
            .encrypt_for_member(&members[1].operator_public_key, &BlsSecretKey([7u8; 32]))
            .unwrap();
        sessions[1].receive_contribution(&c0).unwrap();

        let complaint = sessions[1].build_complaint().unwrap();
        assert!(complaint.complain_for[0]);
        sessions[0].receive_complaint(&complaint).unwrap();
        sessions[1].receive_complaint(&complaint).unwrap();
        assert!(!sessions[1].valid_members()[0]);

        let justification = sessions[0].build_justification().unwrap().unwrap();
        assert_eq!(justification.contributions.len(), 1);
        sessions[1].receive_justification(&justification).unwrap();
        assert!(sessions[1].valid_members()[0]);
    }

    #[test]
    fn test_manager_serves_contributions() {
        let params = LlmqParams::llmq_test();
        let members = committee(3);
        let mut all = sessions(&params, &members);
        run_contributions(&mut all, &[]);
        let anchor = *all[0].anchor();
        let valid = all[0].valid_members();

        let manager = DkgSessionManager::new();
        manager.insert(all.remove(0));
        assert_eq!(manager.len(), 1);

        let verified = manager
            .verified_contributions(LlmqType::LlmqTest, &anchor, &valid)
            .unwrap();
        assert_eq!(verified.member_indexes, vec![0, 1, 2]);

        let encrypted = manager
            .encrypted_contributions(LlmqType::LlmqTest, &anchor, &valid, &members[2].pro_tx_hash)
            .unwrap();
        assert_eq!(encrypted.len(), 3);

        assert_eq!(manager.prune_finished(anchor.height + 1), 0);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_sessions_dropped_after_keep_rounds() {
        let params = LlmqParams::llmq_test();
        let members = committee(3);
        let session = sessions(&params, &members).remove(0);
        let anchor = *session.anchor();
        let manager = DkgSessionManager::new();
        manager.insert(session);

        let last_kept = anchor.height + SESSION_KEEP_ROUNDS * params.dkg_interval - 1;
        manager.updated_block_tip(&BlockIndex::new([1u8; 32], last_kept, [2u8; 32]));
        assert_eq!(manager.len(), 1);
        assert_eq!(DkgPhase::at_height(&params, last_kept), DkgPhase::Idle);

        manager.updated_block_tip(&BlockIndex::new([3u8; 32], last_kept + 1, [1u8; 32]));
        assert!(manager.is_empty());
    }
}
