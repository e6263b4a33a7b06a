//! # Quorum
//!
//! Runtime view of one mined quorum: the commitment, the committee and the
//! threshold material this node holds for it.
//!
//! A `Quorum` is shared as `Arc<Quorum>` between the manager's caches,
//! recovery tasks and callers. Mutable material sits behind internal locks so
//! a handle stays usable after the quorum was evicted from every cache.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use shared_crypto::Sha256dHasher;
use shared_types::{short_hex, BlockIndex, Hash, ProTxHash};

use super::commitment::FinalCommitment;
use super::keys::{decode_vvec, encode_vvec, vvec_hash, BlsPublicKey, BlsSecretKey, VerificationVector};
use super::params::{LlmqParams, LlmqType};
use super::roster::{CommitteeRoster, MasternodeEntry};
use crate::error::{LlmqError, LlmqResult};
use crate::ports::{BlsWorker, QuorumStore};
use crate::workers::Interrupt;

/// Storage prefix of persisted verification vectors.
pub const DB_QUORUM_VVEC: &[u8] = b"q_Qqvvec";
/// Storage prefix of persisted secret key shares.
pub const DB_QUORUM_SK_SHARE: &[u8] = b"q_Qsk";

#[derive(Default)]
struct Contributions {
    vvec: Option<Arc<VerificationVector>>,
    sk_share: Option<BlsSecretKey>,
}

/// A mined quorum and the local threshold material for it.
pub struct Quorum {
    params: LlmqParams,
    commitment: Arc<FinalCommitment>,
    anchor: BlockIndex,
    mined_block_hash: Hash,
    roster: CommitteeRoster,
    storage_key: Hash,
    worker: Arc<dyn BlsWorker>,
    contributions: RwLock<Contributions>,
    pk_shares: Mutex<HashMap<usize, BlsPublicKey>>,
    recovery_in_progress: AtomicBool,
}

impl std::fmt::Debug for Quorum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quorum")
            .field("llmq_type", &self.params.llmq_type)
            .field("anchor", &self.anchor)
            .field("members", &self.roster.len())
            .field("has_vvec", &self.has_verification_vector())
            .finish()
    }
}

impl Quorum {
    /// Build the runtime object for a mined commitment.
    pub fn new(
        params: LlmqParams,
        commitment: Arc<FinalCommitment>,
        anchor: BlockIndex,
        mined_block_hash: Hash,
        members: Vec<MasternodeEntry>,
        worker: Arc<dyn BlsWorker>,
    ) -> Self {
        let storage_key = make_storage_key(params.llmq_type, &commitment.quorum_hash, &members);
        let roster = CommitteeRoster::new(members, &commitment);
        Self {
            params,
            commitment,
            anchor,
            mined_block_hash,
            roster,
            storage_key,
            worker,
            contributions: RwLock::new(Contributions::default()),
            pk_shares: Mutex::new(HashMap::new()),
            recovery_in_progress: AtomicBool::new(false),
        }
    }

    /// Quorum type.
    pub fn llmq_type(&self) -> LlmqType {
        self.params.llmq_type
    }

    /// Parameters of the quorum type.
    pub fn params(&self) -> &LlmqParams {
        &self.params
    }

    /// The mined commitment.
    pub fn commitment(&self) -> &Arc<FinalCommitment> {
        &self.commitment
    }

    /// Anchor block handle.
    pub fn anchor(&self) -> &BlockIndex {
        &self.anchor
    }

    /// Hash of the anchor block.
    pub fn quorum_hash(&self) -> Hash {
        self.commitment.quorum_hash
    }

    /// Hash of the block the commitment was mined in.
    pub fn mined_block_hash(&self) -> Hash {
        self.mined_block_hash
    }

    /// Committee with commitment flags.
    pub fn roster(&self) -> &CommitteeRoster {
        &self.roster
    }

    /// Digest identifying this quorum in storage.
    pub fn storage_key(&self) -> Hash {
        self.storage_key
    }

    /// Index of a member in the committee.
    pub fn member_index(&self, pro_tx_hash: &ProTxHash) -> Option<usize> {
        self.roster.member_index(pro_tx_hash)
    }

    /// True if the masternode is on the committee.
    pub fn is_member(&self, pro_tx_hash: &ProTxHash) -> bool {
        self.roster.is_member(pro_tx_hash)
    }

    /// True if the masternode is on the committee with a verified contribution.
    pub fn is_valid_member(&self, pro_tx_hash: &ProTxHash) -> bool {
        self.roster.is_valid_member(pro_tx_hash)
    }

    // =========================================================================
    // THRESHOLD MATERIAL
    // =========================================================================

    /// True once the quorum verification vector is known.
    pub fn has_verification_vector(&self) -> bool {
        self.contributions.read().vvec.is_some()
    }

    /// The quorum verification vector, if known.
    pub fn verification_vector(&self) -> Option<Arc<VerificationVector>> {
        self.contributions.read().vvec.clone()
    }

    /// Install the verification vector. Rejects vectors that do not hash to
    /// the commitment's `quorum_vvec_hash`.
    pub fn set_verification_vector(&self, vvec: VerificationVector) -> LlmqResult<()> {
        if vvec_hash(&vvec) != self.commitment.quorum_vvec_hash {
            return Err(LlmqError::VerificationVectorMismatch {
                expected: short_hex(&self.commitment.quorum_vvec_hash),
            });
        }
        self.contributions.write().vvec = Some(Arc::new(vvec));
        Ok(())
    }

    /// The local secret key share, if known.
    pub fn secret_key_share(&self) -> Option<BlsSecretKey> {
        self.contributions.read().sk_share.clone()
    }

    /// True once the local secret key share is known.
    pub fn has_secret_key_share(&self) -> bool {
        self.contributions.read().sk_share.is_some()
    }

    /// Install the local secret key share. Its public key must equal the
    /// public key share of `local_pro_tx_hash`.
    pub fn set_secret_key_share(
        &self,
        sk_share: BlsSecretKey,
        local_pro_tx_hash: &ProTxHash,
    ) -> LlmqResult<()> {
        let expected = self
            .member_index(local_pro_tx_hash)
            .and_then(|idx| self.public_key_share(idx))
            .ok_or(LlmqError::InvalidSecretKeyShare)?;
        let actual = self
            .worker
            .public_key(&sk_share)
            .map_err(|_| LlmqError::InvalidSecretKeyShare)?;
        if actual != expected {
            return Err(LlmqError::InvalidSecretKeyShare);
        }
        self.contributions.write().sk_share = Some(sk_share);
        Ok(())
    }

    /// Public key share of the member at `idx`. `None` without a verification
    /// vector, for an out-of-range index or for a member that is not valid.
    pub fn public_key_share(&self, idx: usize) -> Option<BlsPublicKey> {
        let vvec = self.verification_vector()?;
        let entry = self.roster.get(idx)?;
        if !entry.valid {
            return None;
        }
        if let Some(pk) = self.pk_shares.lock().get(&idx) {
            return Some(*pk);
        }
        let pk = self
            .worker
            .build_public_key_share(&vvec, &entry.member.pro_tx_hash)
            .ok()?;
        self.pk_shares.lock().insert(idx, pk);
        Some(pk)
    }

    /// Derive the public key share of every valid member, stopping early when
    /// `interrupt` is raised. Returns the number of shares derived.
    pub fn populate_public_key_share_cache(&self, interrupt: &Interrupt) -> usize {
        let mut derived = 0;
        for (idx, _) in self.roster.valid_members() {
            if interrupt.is_raised() {
                break;
            }
            if self.public_key_share(idx).is_some() {
                derived += 1;
            }
        }
        derived
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    fn db_key(&self, prefix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(prefix.len() + 32);
        key.extend_from_slice(prefix);
        key.extend_from_slice(&self.storage_key);
        key
    }

    /// Persist whatever material is present.
    pub fn write_contributions(&self, store: &dyn QuorumStore) -> LlmqResult<()> {
        let contributions = self.contributions.read();
        if let Some(vvec) = &contributions.vvec {
            store.write(&self.db_key(DB_QUORUM_VVEC), &encode_vvec(vvec))?;
        }
        if let Some(sk) = &contributions.sk_share {
            store.write(&self.db_key(DB_QUORUM_SK_SHARE), &sk.0)?;
        }
        Ok(())
    }

    /// Load persisted material. Returns `false` when no usable verification
    /// vector is stored; a missing secret key share is not an error since
    /// non-members only ever hold the vector.
    pub fn read_contributions(&self, store: &dyn QuorumStore) -> LlmqResult<bool> {
        let Some(raw) = store.read(&self.db_key(DB_QUORUM_VVEC))? else {
            return Ok(false);
        };
        let vvec = match decode_vvec(&raw) {
            Ok(vvec) => vvec,
            Err(e) => {
                warn!(
                    "[qc-18] Stored verification vector for {} is corrupt: {}",
                    short_hex(&self.quorum_hash()),
                    e
                );
                return Ok(false);
            }
        };
        if let Err(e) = self.set_verification_vector(vvec) {
            warn!("[qc-18] Ignoring stored verification vector: {}", e);
            return Ok(false);
        }

        if let Some(raw) = store.read(&self.db_key(DB_QUORUM_SK_SHARE))? {
            match <[u8; 32]>::try_from(raw.as_slice()) {
                Ok(bytes) => self.contributions.write().sk_share = Some(BlsSecretKey(bytes)),
                Err(_) => debug!("[qc-18] Stored secret key share has {} bytes", raw.len()),
            }
        }
        Ok(true)
    }

    // =========================================================================
    // RECOVERY FLAG
    // =========================================================================

    /// True while a data recovery task runs for this quorum.
    pub fn is_recovery_in_progress(&self) -> bool {
        self.recovery_in_progress.load(Ordering::Acquire)
    }

    /// Claim the recovery flag. `None` if a task already holds it.
    pub fn try_begin_recovery(self: &Arc<Self>) -> Option<RecoveryGuard> {
        self.recovery_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RecoveryGuard {
                quorum: Arc::clone(self),
            })
    }

    /// Release the recovery flag.
    pub fn end_recovery(&self) {
        self.recovery_in_progress.store(false, Ordering::Release);
    }
}

/// Holds the recovery flag of a quorum; releases it on drop.
pub struct RecoveryGuard {
    quorum: Arc<Quorum>,
}

impl RecoveryGuard {
    /// The guarded quorum.
    pub fn quorum(&self) -> &Arc<Quorum> {
        &self.quorum
    }
}

impl Drop for RecoveryGuard {
    fn drop(&mut self) {
        self.quorum.end_recovery();
    }
}

/// `sha256d(llmq_type || quorum_hash || pro_tx_hash_0 || ... || pro_tx_hash_n)`.
pub fn make_storage_key(
    llmq_type: LlmqType,
    quorum_hash: &Hash,
    members: &[MasternodeEntry],
) -> Hash {
    let mut hasher = Sha256dHasher::new();
    hasher.update(&[llmq_type.as_u8()]).update(quorum_hash);
    for member in members {
        hasher.update(&member.pro_tx_hash);
    }
    hasher.finalize()
}
