//! Driven ports (Outbound dependencies)
//!
//! Everything the quorum manager needs from the rest of the node: the chain,
//! the deterministic masternode list, mined commitments, the local DKG
//! sessions, BLS primitives, the p2p layer and durable storage.

use std::collections::BTreeSet;
use std::sync::Arc;

use shared_crypto::CryptoResult;
use shared_types::{BlockIndex, Hash, PeerId, ProTxHash, StorageError};

use crate::domain::{
    BlsPublicKey, BlsSecretKey, BlsSignature, FinalCommitment, LlmqMessage, LlmqType,
    MasternodeEntry, MemberBitset, VerificationVector,
};

/// Read access to the block index and active chain.
pub trait ChainView: Send + Sync {
    /// Tip of the active chain.
    fn tip(&self) -> Option<BlockIndex>;

    /// Resolve a block hash, on any branch.
    fn lookup_block(&self, hash: &Hash) -> Option<BlockIndex>;

    /// Ancestor of `block` at `height` (the block itself at its own height).
    fn ancestor(&self, block: &BlockIndex, height: u64) -> Option<BlockIndex>;

    /// True once initial block download finished.
    fn is_synced(&self) -> bool;
}

/// Deterministic masternode list.
pub trait MasternodeListProvider: Send + Sync {
    /// Valid (non-banned) masternodes as of `block_hash`.
    fn valid_members_at(&self, block_hash: &Hash) -> Vec<MasternodeEntry>;
}

/// Index of commitments mined into the active chain.
pub trait CommitmentIndex: Send + Sync {
    /// Mined commitment for a quorum, with the hash of the block that mined it.
    fn mined_commitment(
        &self,
        llmq_type: LlmqType,
        quorum_hash: &Hash,
    ) -> Option<(Arc<FinalCommitment>, Hash)>;

    /// True if a commitment for the quorum is mined on the active chain.
    fn has_mined_commitment(&self, llmq_type: LlmqType, quorum_hash: &Hash) -> bool;

    /// Anchor blocks of up to `max_count` quorums whose commitments were mined
    /// at or below `start`, most recent first.
    fn mined_commitments_until_block(
        &self,
        llmq_type: LlmqType,
        start: &BlockIndex,
        max_count: usize,
    ) -> Vec<BlockIndex>;
}

/// Contributions the local node verified during a DKG round.
#[derive(Debug, Clone)]
pub struct VerifiedContributions {
    /// Committee indexes of the contributing members.
    pub member_indexes: Vec<usize>,
    /// Verification vector of each contributor.
    pub vvecs: Vec<Arc<VerificationVector>>,
    /// Secret contribution of each contributor for the local member.
    pub sk_contributions: Vec<BlsSecretKey>,
}

/// Access to DKG session data.
pub trait DkgContributionSource: Send + Sync {
    /// Contributions of all `valid_members` as verified by the local node.
    /// `None` unless the node took part in the round.
    fn verified_contributions(
        &self,
        llmq_type: LlmqType,
        anchor: &BlockIndex,
        valid_members: &MemberBitset,
    ) -> Option<VerifiedContributions>;

    /// Encrypted contributions every valid member addressed to `pro_tx_hash`,
    /// in committee order.
    fn encrypted_contributions(
        &self,
        llmq_type: LlmqType,
        anchor: &BlockIndex,
        valid_members: &MemberBitset,
        pro_tx_hash: &ProTxHash,
    ) -> Option<Vec<Vec<u8>>>;

    /// Called by the quorum manager on every synced tip, after the quorums
    /// it needs have been built and persisted.
    fn updated_block_tip(&self, _tip: &BlockIndex) {}
}

/// BLS primitives. Implementations may batch or offload work.
pub trait BlsWorker: Send + Sync {
    /// Public key of a secret key.
    fn public_key(&self, sk: &BlsSecretKey) -> CryptoResult<BlsPublicKey>;

    /// Sign a 32-byte digest.
    fn sign(&self, sk: &BlsSecretKey, msg: &Hash) -> CryptoResult<BlsSignature>;

    /// True if the bytes decode to a usable public key.
    fn is_valid_public_key(&self, pk: &BlsPublicKey) -> bool;

    /// True if the bytes decode to a usable signature.
    fn is_valid_signature(&self, sig: &BlsSignature) -> bool;

    /// Verify a signature without proof-of-possession protection.
    fn verify_insecure(&self, pk: &BlsPublicKey, msg: &Hash, sig: &BlsSignature) -> bool;

    /// Verify an aggregated signature of `pks` over the same digest.
    fn verify_secure_aggregated(
        &self,
        pks: &[BlsPublicKey],
        msg: &Hash,
        sig: &BlsSignature,
    ) -> bool;

    /// Aggregate signatures.
    fn aggregate_signatures(&self, sigs: &[BlsSignature]) -> CryptoResult<BlsSignature>;

    /// Sum secret keys.
    fn aggregate_secret_keys(&self, sks: &[BlsSecretKey]) -> CryptoResult<BlsSecretKey>;

    /// Sum member verification vectors coefficient-wise.
    fn build_quorum_verification_vector(
        &self,
        vvecs: &[Arc<VerificationVector>],
    ) -> CryptoResult<VerificationVector>;

    /// Evaluate a verification vector at the id derived from `id`.
    fn build_public_key_share(
        &self,
        vvec: &[BlsPublicKey],
        id: &ProTxHash,
    ) -> CryptoResult<BlsPublicKey>;

    /// Fresh secret polynomial of degree `threshold - 1`: its verification
    /// vector and one secret share per id.
    fn generate_contribution(
        &self,
        threshold: usize,
        ids: &[ProTxHash],
    ) -> CryptoResult<(VerificationVector, Vec<BlsSecretKey>)>;

    /// True if `share` is the evaluation of the polynomial behind `vvec` at `id`.
    fn verify_contribution_share(
        &self,
        id: &ProTxHash,
        share: &BlsSecretKey,
        vvec: &[BlsPublicKey],
    ) -> bool {
        match (self.build_public_key_share(vvec, id), self.public_key(share)) {
            (Ok(expected), Ok(actual)) => expected == actual,
            _ => false,
        }
    }

    /// Lagrange-recover the threshold signature from `(id, share)` pairs.
    fn recover_threshold_signature(
        &self,
        shares: &[(ProTxHash, BlsSignature)],
    ) -> CryptoResult<BlsSignature>;

    /// Encrypt a secret contribution to a member's operator key.
    fn encrypt_for_member(
        &self,
        recipient: &BlsPublicKey,
        contribution: &BlsSecretKey,
    ) -> CryptoResult<Vec<u8>>;

    /// Decrypt a contribution addressed to the holder of `operator_key`.
    fn decrypt_for_member(
        &self,
        operator_key: &BlsSecretKey,
        sealed: &[u8],
    ) -> CryptoResult<BlsSecretKey>;
}

/// What the p2p layer knows about a connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Connection id.
    pub id: PeerId,
    /// Negotiated protocol version.
    pub version: u32,
    /// Provider registration hash, once the peer proved it runs a masternode.
    pub verified_pro_tx_hash: Option<ProTxHash>,
    /// Peer connected in quorum-watch mode.
    pub is_watch: bool,
}

/// Peer-to-peer layer. Calls never block on network I/O.
pub trait QuorumNetwork: Send + Sync {
    /// Queue a message for a peer.
    fn send(&self, peer: PeerId, message: LlmqMessage);

    /// Connection details of a peer.
    fn peer(&self, peer: PeerId) -> Option<PeerInfo>;

    /// All fully connected peers.
    fn connected_peers(&self) -> Vec<PeerInfo>;

    /// Ask the connection manager to open a connection to a masternode.
    fn add_pending_masternode(&self, pro_tx_hash: ProTxHash);

    /// Keep connections to `members` for the given quorum.
    fn set_quorum_nodes(&self, llmq_type: LlmqType, quorum_hash: Hash, members: BTreeSet<ProTxHash>);

    /// True if connections are registered for the quorum.
    fn has_quorum_nodes(&self, llmq_type: LlmqType, quorum_hash: &Hash) -> bool;

    /// Quorums of a type with registered connections.
    fn quorum_nodes(&self, llmq_type: LlmqType) -> BTreeSet<Hash>;

    /// Drop the registered connections of a quorum.
    fn remove_quorum_nodes(&self, llmq_type: LlmqType, quorum_hash: &Hash);

    /// Close a connection.
    fn disconnect(&self, peer: PeerId);

    /// Increase a peer's misbehavior score.
    fn misbehaving(&self, peer: PeerId, score: u32);
}

/// Durable key-value map.
pub trait QuorumStore: Send + Sync {
    /// Read a value.
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a value, replacing any previous one.
    fn write(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
}
