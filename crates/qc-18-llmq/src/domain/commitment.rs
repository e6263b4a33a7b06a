//! # Final Commitment
//!
//! The mined outcome of a DKG round: who took part, the quorum public key and
//! a hash of the quorum verification vector, signed by the members and by the
//! quorum itself.
//!
//! ## Wire layout
//!
//! ```text
//! version u16 | llmq_type u8 | quorum_hash 32 | signers bitset | valid bitset
//! | quorum_public_key 48 | quorum_vvec_hash 32 | quorum_sig 96 | members_sig 96
//! ```

use tracing::debug;

use shared_crypto::Sha256dHasher;
use shared_types::{is_null_hash, BlockIndex, Hash, ZERO_HASH};

use super::keys::{BlsPublicKey, BlsSignature};
use super::params::{ConsensusParams, LlmqParams, LlmqType};
use super::roster::MasternodeEntry;
use super::serialize::{MemberBitset, Reader, WireError, Writer};
use crate::ports::{BlsWorker, ChainView};

/// Agreed, immutable outcome of one DKG round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalCommitment {
    /// Format version, `1..=CURRENT_VERSION`.
    pub version: u16,
    /// Quorum type.
    pub llmq_type: LlmqType,
    /// Hash of the anchor block.
    pub quorum_hash: Hash,
    /// Members that contributed to `members_sig`.
    pub signers: MemberBitset,
    /// Members whose contributions were verified.
    pub valid_members: MemberBitset,
    /// Threshold public key of the quorum.
    pub quorum_public_key: BlsPublicKey,
    /// SHA-256d of the serialized quorum verification vector.
    pub quorum_vvec_hash: Hash,
    /// Recovered threshold signature over the commitment hash.
    pub quorum_sig: BlsSignature,
    /// Aggregated operator signatures of all signers.
    pub members_sig: BlsSignature,
}

impl FinalCommitment {
    /// Highest supported version.
    pub const CURRENT_VERSION: u16 = 1;

    /// Empty commitment marking a round that produced no quorum.
    pub fn null(params: &LlmqParams, quorum_hash: Hash) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            llmq_type: params.llmq_type,
            quorum_hash,
            signers: MemberBitset::repeat(false, params.size),
            valid_members: MemberBitset::repeat(false, params.size),
            quorum_public_key: BlsPublicKey::NULL,
            quorum_vvec_hash: ZERO_HASH,
            quorum_sig: BlsSignature::NULL,
            members_sig: BlsSignature::NULL,
        }
    }

    /// Number of signer bits set.
    pub fn count_signers(&self) -> usize {
        self.signers.count_ones()
    }

    /// Number of valid member bits set.
    pub fn count_valid_members(&self) -> usize {
        self.valid_members.count_ones()
    }

    /// True if nothing but the type, hash and bitset lengths is populated.
    pub fn is_null(&self) -> bool {
        self.signers.not_any()
            && self.valid_members.not_any()
            && self.quorum_public_key.is_null()
            && is_null_hash(&self.quorum_vvec_hash)
            && self.quorum_sig.is_null()
            && self.members_sig.is_null()
    }

    /// True if both bitsets have the committee size of `params`.
    pub fn verify_sizes(&self, params: &LlmqParams) -> bool {
        if self.signers.len() != params.size {
            debug!("[qc-18] Invalid signers size {}", self.signers.len());
            return false;
        }
        if self.valid_members.len() != params.size {
            debug!("[qc-18] Invalid valid_members size {}", self.valid_members.len());
            return false;
        }
        true
    }

    /// Digest signed by members and by the quorum.
    pub fn commitment_hash(&self) -> Hash {
        build_commitment_hash(
            self.llmq_type,
            &self.quorum_hash,
            &self.valid_members,
            &self.quorum_public_key,
            &self.quorum_vvec_hash,
        )
    }

    /// Full structural validation against the resolved member list, plus the
    /// member and quorum signatures when `check_sigs` is set.
    pub fn verify(
        &self,
        consensus: &ConsensusParams,
        members: &[MasternodeEntry],
        check_sigs: bool,
        worker: &dyn BlsWorker,
    ) -> bool {
        if self.version == 0 || self.version > Self::CURRENT_VERSION {
            debug!("[qc-18] Invalid commitment version {}", self.version);
            return false;
        }

        let Some(params) = consensus.params(self.llmq_type) else {
            debug!("[qc-18] Invalid llmq_type={}", self.llmq_type.as_u8());
            return false;
        };

        if !self.verify_sizes(params) {
            return false;
        }

        if self.count_valid_members() < params.min_size {
            debug!(
                "[qc-18] Invalid valid_members count {}",
                self.count_valid_members()
            );
            return false;
        }
        if self.count_signers() < params.min_size {
            debug!("[qc-18] Invalid signers count {}", self.count_signers());
            return false;
        }
        if self.quorum_public_key.is_null() || !worker.is_valid_public_key(&self.quorum_public_key)
        {
            debug!("[qc-18] Invalid quorum_public_key");
            return false;
        }
        if is_null_hash(&self.quorum_vvec_hash) {
            debug!("[qc-18] Invalid quorum_vvec_hash");
            return false;
        }
        if self.members_sig.is_null() || !worker.is_valid_signature(&self.members_sig) {
            debug!("[qc-18] Invalid members_sig");
            return false;
        }
        if self.quorum_sig.is_null() || !worker.is_valid_signature(&self.quorum_sig) {
            debug!("[qc-18] Invalid quorum_sig");
            return false;
        }

        if members.len() > params.size {
            debug!(
                "[qc-18] {} members for a committee of {}",
                members.len(),
                params.size
            );
            return false;
        }
        for i in members.len()..params.size {
            if self.valid_members[i] {
                debug!("[qc-18] Invalid valid_members bitset, bit {i} should not be set");
                return false;
            }
            if self.signers[i] {
                debug!("[qc-18] Invalid signers bitset, bit {i} should not be set");
                return false;
            }
        }

        // Signatures are only checked when the containing block is processed.
        if check_sigs {
            let hash = self.commitment_hash();
            let signer_keys: Vec<BlsPublicKey> = members
                .iter()
                .enumerate()
                .filter(|(i, _)| self.signers[*i])
                .map(|(_, m)| m.operator_public_key)
                .collect();

            if !worker.verify_secure_aggregated(&signer_keys, &hash, &self.members_sig) {
                debug!("[qc-18] Invalid aggregated members signature");
                return false;
            }
            if !worker.verify_insecure(&self.quorum_public_key, &hash, &self.quorum_sig) {
                debug!("[qc-18] Invalid quorum signature");
                return false;
            }
        }

        true
    }

    /// Validation of an empty-quorum marker.
    pub fn verify_null(&self, consensus: &ConsensusParams) -> bool {
        let Some(params) = consensus.params(self.llmq_type) else {
            debug!("[qc-18] Invalid llmq_type={}", self.llmq_type.as_u8());
            return false;
        };
        self.is_null() && self.verify_sizes(params)
    }

    /// Append the consensus encoding.
    pub fn write(&self, w: &mut Writer) {
        w.u16(self.version)
            .u8(self.llmq_type.as_u8())
            .hash(&self.quorum_hash)
            .bitset(&self.signers)
            .bitset(&self.valid_members)
            .bytes(&self.quorum_public_key.0)
            .hash(&self.quorum_vvec_hash)
            .bytes(&self.quorum_sig.0)
            .bytes(&self.members_sig.0);
    }

    /// Read the consensus encoding.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let version = r.u16()?;
        let type_byte = r.u8()?;
        let llmq_type = LlmqType::try_from(type_byte).map_err(|_| WireError::InvalidValue {
            field: "llmq_type",
            value: u64::from(type_byte),
        })?;
        Ok(Self {
            version,
            llmq_type,
            quorum_hash: r.hash()?,
            signers: r.bitset()?,
            valid_members: r.bitset()?,
            quorum_public_key: BlsPublicKey(r.array()?),
            quorum_vvec_hash: r.hash()?,
            quorum_sig: BlsSignature(r.array()?),
            members_sig: BlsSignature(r.array()?),
        })
    }

    /// Standalone encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.write(&mut w);
        w.finish()
    }

    /// Decode a standalone encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(bytes);
        let c = Self::read(&mut r)?;
        r.finish()?;
        Ok(c)
    }
}

/// `sha256d(type || quorum_hash || valid_members || public_key || vvec_hash)`.
pub fn build_commitment_hash(
    llmq_type: LlmqType,
    quorum_hash: &Hash,
    valid_members: &MemberBitset,
    public_key: &BlsPublicKey,
    vvec_hash: &Hash,
) -> Hash {
    let mut w = Writer::new();
    w.u8(llmq_type.as_u8())
        .hash(quorum_hash)
        .bitset(valid_members)
        .bytes(&public_key.0)
        .hash(vvec_hash);
    let mut hasher = Sha256dHasher::new();
    hasher.update(&w.finish());
    hasher.finalize()
}

// =============================================================================
// COMMITMENT SPECIAL TRANSACTION
// =============================================================================

/// Payload of the special transaction that mines a commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentTxPayload {
    /// Payload version, `1..=CURRENT_VERSION`.
    pub version: u16,
    /// Height of the block containing the transaction.
    pub height: u32,
    /// The mined commitment.
    pub commitment: FinalCommitment,
}

impl CommitmentTxPayload {
    /// Highest supported payload version.
    pub const CURRENT_VERSION: u16 = 1;

    /// Consensus encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u16(self.version).u32(self.height);
        self.commitment.write(&mut w);
        w.finish()
    }

    /// Decode a payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(bytes);
        let version = r.u16()?;
        let height = r.u32()?;
        let commitment = FinalCommitment::read(&mut r)?;
        r.finish()?;
        Ok(Self {
            version,
            height,
            commitment,
        })
    }
}

/// Rejection of a commitment transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentRejection {
    /// Reject reason (`bad-qc-*`).
    pub reason: &'static str,
    /// Misbehavior score for the relaying peer.
    pub dos_score: u32,
}

impl CommitmentRejection {
    fn invalid(reason: &'static str) -> Self {
        Self {
            reason,
            dos_score: 100,
        }
    }
}

/// Contextual validation of a commitment transaction included in the block
/// following `prev`.
pub fn check_commitment_payload(
    payload: &CommitmentTxPayload,
    prev: &BlockIndex,
    chain: &dyn ChainView,
    consensus: &ConsensusParams,
    members: impl FnOnce(&LlmqParams, &BlockIndex) -> Vec<MasternodeEntry>,
    worker: &dyn BlsWorker,
) -> Result<(), CommitmentRejection> {
    if payload.version == 0 || payload.version > CommitmentTxPayload::CURRENT_VERSION {
        return Err(CommitmentRejection::invalid("bad-qc-version"));
    }

    if u64::from(payload.height) != prev.height + 1 {
        return Err(CommitmentRejection::invalid("bad-qc-height"));
    }

    let commitment = &payload.commitment;
    let anchor = chain
        .lookup_block(&commitment.quorum_hash)
        .ok_or(CommitmentRejection::invalid("bad-qc-quorum-hash"))?;

    // Not part of the active chain.
    if chain.ancestor(prev, anchor.height) != Some(anchor) {
        return Err(CommitmentRejection::invalid("bad-qc-quorum-hash"));
    }

    let Some(params) = consensus.params(commitment.llmq_type) else {
        return Err(CommitmentRejection::invalid("bad-qc-type"));
    };

    if commitment.is_null() {
        if !commitment.verify_null(consensus) {
            return Err(CommitmentRejection::invalid("bad-qc-invalid-null"));
        }
        return Ok(());
    }

    let members = members(params, &anchor);
    if !commitment.verify(consensus, &members, false, worker) {
        return Err(CommitmentRejection::invalid("bad-qc-invalid"));
    }

    Ok(())
}
