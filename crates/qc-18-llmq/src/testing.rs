//! Test doubles: a linear stand-in for BLS and fixtures that produce
//! internally consistent quorums.
//!
//! `MockBlsWorker` works in the prime field `2^61 - 1`. Keys, signatures and
//! shares carry a field element in their first eight bytes (little-endian);
//! a public key equals its secret key and a signature is `H(m) * sk`. Every
//! algebraic relation the quorum code relies on (aggregation, polynomial
//! evaluation, Lagrange recovery) holds, at a fraction of the cost.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;

use shared_crypto::{CryptoError, CryptoResult};
use shared_types::{BlockIndex, Hash, NodeId, PeerId, ProTxHash};

use crate::adapters::{
    InMemoryChain, InMemoryCommitmentIndex, InMemoryMasternodeList, InMemoryQuorumStore,
};
use crate::config::LlmqConfig;
use crate::domain::{
    select_members, vvec_hash, BlsPublicKey, BlsSecretKey, BlsSignature, ConsensusParams,
    FinalCommitment, LlmqMessage, LlmqParams, LlmqType, MasternodeEntry, MemberBitset, Quorum,
    VerificationVector,
};
use crate::ports::{
    BlsWorker, ChainView, DkgContributionSource, MasternodeListProvider, PeerInfo, QuorumNetwork,
    VerifiedContributions,
};
use crate::service::{ActiveMasternodeInfo, QuorumDependencies, QuorumManager};

const P: u64 = (1 << 61) - 1;

fn add(a: u64, b: u64) -> u64 {
    ((a as u128 + b as u128) % P as u128) as u64
}

fn sub(a: u64, b: u64) -> u64 {
    add(a, P - b % P)
}

fn mul(a: u64, b: u64) -> u64 {
    ((a as u128 * b as u128) % P as u128) as u64
}

fn pow(mut base: u64, mut exp: u64) -> u64 {
    let mut acc = 1;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul(acc, base);
        }
        base = mul(base, base);
        exp >>= 1;
    }
    acc
}

fn inv(a: u64) -> u64 {
    pow(a, P - 2)
}

fn fe(bytes: &[u8]) -> u64 {
    let mut le = [0u8; 8];
    le.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(le) % P
}

fn nonzero(v: u64) -> u64 {
    if v == 0 {
        1
    } else {
        v
    }
}

fn id(pro_tx_hash: &ProTxHash) -> u64 {
    nonzero(fe(pro_tx_hash))
}

fn msg_scalar(msg: &Hash) -> u64 {
    nonzero(fe(msg))
}

fn sk(v: u64) -> BlsSecretKey {
    let mut b = [0u8; 32];
    b[..8].copy_from_slice(&v.to_le_bytes());
    BlsSecretKey(b)
}

fn pk(v: u64) -> BlsPublicKey {
    let mut b = [0u8; 48];
    b[..8].copy_from_slice(&v.to_le_bytes());
    BlsPublicKey(b)
}

fn sig(v: u64) -> BlsSignature {
    let mut b = [0u8; 96];
    b[..8].copy_from_slice(&v.to_le_bytes());
    BlsSignature(b)
}

fn eval(coefficients: &[u64], x: u64) -> u64 {
    coefficients
        .iter()
        .rev()
        .fold(0, |acc, c| add(mul(acc, x), *c))
}

/// Linear stand-in for the BLS worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBlsWorker;

impl BlsWorker for MockBlsWorker {
    fn public_key(&self, key: &BlsSecretKey) -> CryptoResult<BlsPublicKey> {
        match fe(&key.0) {
            0 => Err(CryptoError::InvalidPrivateKey),
            v => Ok(pk(v)),
        }
    }

    fn sign(&self, key: &BlsSecretKey, msg: &Hash) -> CryptoResult<BlsSignature> {
        Ok(sig(mul(msg_scalar(msg), fe(&key.0))))
    }

    fn is_valid_public_key(&self, key: &BlsPublicKey) -> bool {
        !key.is_null()
    }

    fn is_valid_signature(&self, s: &BlsSignature) -> bool {
        !s.is_null()
    }

    fn verify_insecure(&self, key: &BlsPublicKey, msg: &Hash, s: &BlsSignature) -> bool {
        fe(&s.0) == mul(msg_scalar(msg), fe(&key.0))
    }

    fn verify_secure_aggregated(&self, keys: &[BlsPublicKey], msg: &Hash, s: &BlsSignature) -> bool {
        let sum = keys.iter().fold(0, |acc, k| add(acc, fe(&k.0)));
        !keys.is_empty() && fe(&s.0) == mul(msg_scalar(msg), sum)
    }

    fn aggregate_signatures(&self, sigs: &[BlsSignature]) -> CryptoResult<BlsSignature> {
        if sigs.is_empty() {
            return Err(CryptoError::AggregationFailed);
        }
        Ok(sig(sigs.iter().fold(0, |acc, s| add(acc, fe(&s.0)))))
    }

    fn aggregate_secret_keys(&self, keys: &[BlsSecretKey]) -> CryptoResult<BlsSecretKey> {
        if keys.is_empty() {
            return Err(CryptoError::AggregationFailed);
        }
        Ok(sk(keys.iter().fold(0, |acc, k| add(acc, fe(&k.0)))))
    }

    fn build_quorum_verification_vector(
        &self,
        vvecs: &[Arc<VerificationVector>],
    ) -> CryptoResult<VerificationVector> {
        let len = vvecs.first().map(|v| v.len()).ok_or(CryptoError::AggregationFailed)?;
        if vvecs.iter().any(|v| v.len() != len) {
            return Err(CryptoError::AggregationFailed);
        }
        Ok((0..len)
            .map(|k| pk(vvecs.iter().fold(0, |acc, v| add(acc, fe(&v[k].0)))))
            .collect())
    }

    fn build_public_key_share(
        &self,
        vvec: &[BlsPublicKey],
        member: &ProTxHash,
    ) -> CryptoResult<BlsPublicKey> {
        if vvec.is_empty() {
            return Err(CryptoError::InvalidInput("empty verification vector".into()));
        }
        let coefficients: Vec<u64> = vvec.iter().map(|k| fe(&k.0)).collect();
        Ok(pk(eval(&coefficients, id(member))))
    }

    fn generate_contribution(
        &self,
        threshold: usize,
        ids: &[ProTxHash],
    ) -> CryptoResult<(VerificationVector, Vec<BlsSecretKey>)> {
        let coefficients: Vec<u64> = (0..threshold)
            .map(|_| nonzero(rand::random::<u64>() % P))
            .collect();
        let vvec = coefficients.iter().map(|c| pk(*c)).collect();
        let shares = ids.iter().map(|i| sk(eval(&coefficients, id(i)))).collect();
        Ok((vvec, shares))
    }

    fn recover_threshold_signature(
        &self,
        shares: &[(ProTxHash, BlsSignature)],
    ) -> CryptoResult<BlsSignature> {
        if shares.is_empty() {
            return Err(CryptoError::AggregationFailed);
        }
        let xs: Vec<u64> = shares.iter().map(|(i, _)| id(i)).collect();
        let mut acc = 0;
        for (j, (_, s)) in shares.iter().enumerate() {
            let mut lambda = 1;
            for (m, xm) in xs.iter().enumerate() {
                if m == j {
                    continue;
                }
                let denom = sub(*xm, xs[j]);
                if denom == 0 {
                    return Err(CryptoError::InvalidInput("duplicate id".into()));
                }
                lambda = mul(lambda, mul(*xm, inv(denom)));
            }
            acc = add(acc, mul(lambda, fe(&s.0)));
        }
        Ok(sig(acc))
    }

    fn encrypt_for_member(
        &self,
        recipient: &BlsPublicKey,
        contribution: &BlsSecretKey,
    ) -> CryptoResult<Vec<u8>> {
        let mut blob = recipient.0[..8].to_vec();
        blob.extend_from_slice(&contribution.0);
        Ok(blob)
    }

    fn decrypt_for_member(
        &self,
        operator_key: &BlsSecretKey,
        sealed: &[u8],
    ) -> CryptoResult<BlsSecretKey> {
        if sealed.len() != 40 || sealed[..8] != operator_key.0[..8] {
            return Err(CryptoError::DecryptionFailed("wrong recipient".into()));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&sealed[8..]);
        Ok(BlsSecretKey(out))
    }
}

/// Operator key of the mock masternode `seed`.
pub fn mock_operator_key(seed: u8) -> BlsSecretKey {
    sk(1_000 + u64::from(seed))
}

/// Registered, confirmed masternode whose operator key is
/// [`mock_operator_key`]`(seed)`.
pub fn mock_member(seed: u8) -> MasternodeEntry {
    MasternodeEntry {
        pro_tx_hash: [seed; 32],
        confirmed_hash: [seed.wrapping_add(0x80); 32],
        operator_public_key: pk(1_000 + u64::from(seed)),
        is_valid: true,
    }
}

// =============================================================================
// QUORUM FIXTURE
// =============================================================================

/// Consistent quorum material: per-member polynomials, the resulting quorum
/// verification vector and a fully signed commitment.
#[derive(Clone)]
pub struct QuorumFixture {
    pub params: LlmqParams,
    pub anchor: BlockIndex,
    pub members: Vec<MasternodeEntry>,
    pub polynomials: Vec<Vec<u64>>,
    pub vvec: VerificationVector,
    pub commitment: FinalCommitment,
}

impl QuorumFixture {
    /// Members `1..=size` anchored at a detached block of height 24.
    pub fn new(params: LlmqParams) -> Self {
        let members = (1..=params.size as u8).map(mock_member).collect();
        let anchor = BlockIndex::new([0x24; 32], 24, [0x23; 32]);
        Self::with_members(params, anchor, members)
    }

    /// Fixture for a given anchor and committee.
    pub fn with_members(
        params: LlmqParams,
        anchor: BlockIndex,
        members: Vec<MasternodeEntry>,
    ) -> Self {
        let polynomials = (0..members.len() as u64)
            .map(|j| {
                (0..params.threshold as u64)
                    .map(|k| 17 + 31 * j + 7 * k)
                    .collect()
            })
            .collect();
        let mut commitment = FinalCommitment::null(&params, anchor.hash);
        for i in 0..members.len() {
            commitment.valid_members.set(i, true);
            commitment.signers.set(i, true);
        }
        let mut fx = Self {
            params,
            anchor,
            members,
            polynomials,
            vvec: Vec::new(),
            commitment,
        };
        fx.rebuild();
        fx
    }

    /// Mark a member invalid (it neither contributed nor signed).
    pub fn with_invalid_member(mut self, idx: usize) -> Self {
        self.commitment.valid_members.set(idx, false);
        self.commitment.signers.set(idx, false);
        self.rebuild();
        self
    }

    fn quorum_coefficients(&self) -> Vec<u64> {
        (0..self.params.threshold)
            .map(|k| {
                self.commitment
                    .valid_members
                    .iter_ones()
                    .filter(|j| *j < self.polynomials.len())
                    .fold(0, |acc, j| add(acc, self.polynomials[j][k]))
            })
            .collect()
    }

    fn rebuild(&mut self) {
        let coefficients = self.quorum_coefficients();
        self.vvec = coefficients.iter().map(|c| pk(*c)).collect();
        let c = &mut self.commitment;
        c.quorum_public_key = self.vvec[0];
        c.quorum_vvec_hash = vvec_hash(&self.vvec);
        let hash = c.commitment_hash();
        let worker = MockBlsWorker;
        c.quorum_sig = sig(mul(msg_scalar(&hash), coefficients[0]));
        let signer_keys: Vec<u64> = c
            .signers
            .iter_ones()
            .map(|i| fe(&self.members[i].operator_public_key.0))
            .collect();
        c.members_sig = sig(mul(
            msg_scalar(&hash),
            signer_keys.iter().fold(0, |acc, k| add(acc, *k)),
        ));
        debug_assert!(worker.verify_insecure(&c.quorum_public_key, &hash, &c.quorum_sig));
    }

    /// Secret key share of member `idx`.
    pub fn sk_share(&self, idx: usize) -> BlsSecretKey {
        let x = id(&self.members[idx].pro_tx_hash);
        sk(eval(&self.quorum_coefficients(), x))
    }

    /// Public key share of member `idx`.
    pub fn public_key_share(&self, idx: usize) -> BlsPublicKey {
        pk(fe(&self.sk_share(idx).0))
    }

    /// Verification vector of member `j`'s own polynomial.
    pub fn member_vvec(&self, j: usize) -> Arc<VerificationVector> {
        Arc::new(self.polynomials[j].iter().map(|c| pk(*c)).collect())
    }

    /// Secret contribution of member `from` to member `to`.
    pub fn contribution(&self, from: usize, to: usize) -> BlsSecretKey {
        sk(eval(
            &self.polynomials[from],
            id(&self.members[to].pro_tx_hash),
        ))
    }

    /// Contributions of every valid member for `to`, encrypted to `to`'s operator key.
    pub fn encrypted_for(&self, to: usize) -> Vec<Vec<u8>> {
        self.commitment
            .valid_members
            .iter_ones()
            .map(|from| {
                let mut blob = self.members[to].operator_public_key.0[..8].to_vec();
                blob.extend_from_slice(&self.contribution(from, to).0);
                blob
            })
            .collect()
    }

    /// Seed of the [`mock_member`] at committee index `idx`.
    pub fn seed(&self, idx: usize) -> u8 {
        self.members[idx].pro_tx_hash[0]
    }

    /// Committee index of `pro_tx_hash`.
    pub fn index_of(&self, pro_tx_hash: &ProTxHash) -> Option<usize> {
        self.members.iter().position(|m| &m.pro_tx_hash == pro_tx_hash)
    }

    /// Fresh runtime object without any material.
    pub fn quorum(&self) -> Quorum {
        Quorum::new(
            self.params.clone(),
            Arc::new(self.commitment.clone()),
            self.anchor,
            [0xee; 32],
            self.members.clone(),
            Arc::new(MockBlsWorker),
        )
    }
}

/// DKG source backed by fixtures, as if the node took part in every round.
#[derive(Default)]
pub struct FixtureDkgSource {
    fixtures: Mutex<HashMap<Hash, (QuorumFixture, Option<usize>)>>,
}

impl FixtureDkgSource {
    /// Serve a round. `local` is the committee index of this node, if any.
    pub fn add(&self, fixture: QuorumFixture, local: Option<usize>) {
        self.fixtures
            .lock()
            .insert(fixture.anchor.hash, (fixture, local));
    }
}

impl DkgContributionSource for FixtureDkgSource {
    fn verified_contributions(
        &self,
        _llmq_type: LlmqType,
        anchor: &BlockIndex,
        valid_members: &MemberBitset,
    ) -> Option<VerifiedContributions> {
        let fixtures = self.fixtures.lock();
        let (fx, local) = fixtures.get(&anchor.hash)?;
        let to = (*local)?;
        let member_indexes: Vec<usize> = valid_members.iter_ones().collect();
        Some(VerifiedContributions {
            vvecs: member_indexes.iter().map(|j| fx.member_vvec(*j)).collect(),
            sk_contributions: member_indexes
                .iter()
                .map(|j| fx.contribution(*j, to))
                .collect(),
            member_indexes,
        })
    }

    fn encrypted_contributions(
        &self,
        _llmq_type: LlmqType,
        anchor: &BlockIndex,
        _valid_members: &MemberBitset,
        pro_tx_hash: &ProTxHash,
    ) -> Option<Vec<Vec<u8>>> {
        let fixtures = self.fixtures.lock();
        let (fx, _) = fixtures.get(&anchor.hash)?;
        let to = fx.index_of(pro_tx_hash)?;
        Some(fx.encrypted_for(to))
    }
}

// =============================================================================
// NETWORK
// =============================================================================

/// Recording p2p layer. Sent messages go to an unbounded channel so tests
/// can await them.
pub struct MockNetwork {
    peers: Mutex<Vec<PeerInfo>>,
    outbox: mpsc::UnboundedSender<(PeerId, LlmqMessage)>,
    pub pending: Mutex<Vec<ProTxHash>>,
    pub quorum_nodes: Mutex<HashMap<(LlmqType, Hash), BTreeSet<ProTxHash>>>,
    pub disconnected: Mutex<Vec<PeerId>>,
    pub scores: Mutex<HashMap<PeerId, u32>>,
    auto_connect: bool,
}

impl MockNetwork {
    /// Network whose pending masternodes never connect.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(PeerId, LlmqMessage)>) {
        Self::build(false)
    }

    /// Network that connects every pending masternode at once.
    pub fn auto_connecting() -> (Arc<Self>, mpsc::UnboundedReceiver<(PeerId, LlmqMessage)>) {
        Self::build(true)
    }

    fn build(auto_connect: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<(PeerId, LlmqMessage)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let net = Arc::new(Self {
            peers: Mutex::new(Vec::new()),
            outbox: tx,
            pending: Mutex::new(Vec::new()),
            quorum_nodes: Mutex::new(HashMap::new()),
            disconnected: Mutex::new(Vec::new()),
            scores: Mutex::new(HashMap::new()),
            auto_connect,
        });
        (net, rx)
    }

    /// Peer id used for the masternode `pro_tx_hash`.
    pub fn peer_id_for(pro_tx_hash: &ProTxHash) -> PeerId {
        NodeId(*pro_tx_hash)
    }

    /// Add a connected masternode peer.
    pub fn connect_masternode(&self, pro_tx_hash: ProTxHash, version: u32) -> PeerId {
        let id = Self::peer_id_for(&pro_tx_hash);
        self.peers.lock().push(PeerInfo {
            id,
            version,
            verified_pro_tx_hash: Some(pro_tx_hash),
            is_watch: false,
        });
        id
    }

    /// Add a connected peer without masternode proof.
    pub fn connect_plain(&self, id: PeerId, is_watch: bool) {
        self.peers.lock().push(PeerInfo {
            id,
            version: crate::config::LLMQ_DATA_MESSAGES_VERSION,
            verified_pro_tx_hash: None,
            is_watch,
        });
    }

    /// Current misbehavior score of a peer.
    pub fn score(&self, peer: PeerId) -> u32 {
        self.scores.lock().get(&peer).copied().unwrap_or(0)
    }
}

impl QuorumNetwork for MockNetwork {
    fn send(&self, peer: PeerId, message: LlmqMessage) {
        let _ = self.outbox.send((peer, message));
    }

    fn peer(&self, peer: PeerId) -> Option<PeerInfo> {
        self.peers.lock().iter().find(|p| p.id == peer).cloned()
    }

    fn connected_peers(&self) -> Vec<PeerInfo> {
        self.peers.lock().clone()
    }

    fn add_pending_masternode(&self, pro_tx_hash: ProTxHash) {
        self.pending.lock().push(pro_tx_hash);
        if self.auto_connect && self.peer(Self::peer_id_for(&pro_tx_hash)).is_none() {
            self.connect_masternode(pro_tx_hash, crate::config::LLMQ_DATA_MESSAGES_VERSION);
        }
    }

    fn set_quorum_nodes(&self, llmq_type: LlmqType, quorum_hash: Hash, members: BTreeSet<ProTxHash>) {
        self.quorum_nodes
            .lock()
            .insert((llmq_type, quorum_hash), members);
    }

    fn has_quorum_nodes(&self, llmq_type: LlmqType, quorum_hash: &Hash) -> bool {
        self.quorum_nodes
            .lock()
            .contains_key(&(llmq_type, *quorum_hash))
    }

    fn quorum_nodes(&self, llmq_type: LlmqType) -> BTreeSet<Hash> {
        self.quorum_nodes
            .lock()
            .keys()
            .filter(|(t, _)| *t == llmq_type)
            .map(|(_, h)| *h)
            .collect()
    }

    fn remove_quorum_nodes(&self, llmq_type: LlmqType, quorum_hash: &Hash) {
        self.quorum_nodes.lock().remove(&(llmq_type, *quorum_hash));
    }

    fn disconnect(&self, peer: PeerId) {
        self.disconnected.lock().push(peer);
        self.peers.lock().retain(|p| p.id != peer);
    }

    fn misbehaving(&self, peer: PeerId, score: u32) {
        *self.scores.lock().entry(peer).or_default() += score;
    }
}

// =============================================================================
// NODE HARNESS
// =============================================================================

/// A quorum manager wired to in-memory adapters, the fixture DKG source
/// and the recording network.
pub struct TestNode {
    pub params: LlmqParams,
    pub chain: Arc<InMemoryChain>,
    pub masternodes: Arc<InMemoryMasternodeList>,
    pub commitments: Arc<InMemoryCommitmentIndex>,
    pub dkg: Arc<FixtureDkgSource>,
    pub network: Arc<MockNetwork>,
    pub outbox: mpsc::UnboundedReceiver<(PeerId, LlmqMessage)>,
    pub store: Arc<InMemoryQuorumStore>,
    pub manager: Arc<QuorumManager>,
}

impl TestNode {
    /// Node serving `params` only, with masternodes `1..=masternodes` and
    /// a synced chain of `tip_height` blocks.
    pub fn new(params: LlmqParams, masternodes: u8, tip_height: u64, config: LlmqConfig) -> Self {
        Self::build(params, masternodes, tip_height, config, MockNetwork::new())
    }

    /// Same as [`TestNode::new`] on an auto-connecting network.
    pub fn auto_connecting(
        params: LlmqParams,
        masternodes: u8,
        tip_height: u64,
        config: LlmqConfig,
    ) -> Self {
        Self::build(params, masternodes, tip_height, config, MockNetwork::auto_connecting())
    }

    fn build(
        params: LlmqParams,
        masternodes: u8,
        tip_height: u64,
        config: LlmqConfig,
        (network, outbox): (Arc<MockNetwork>, mpsc::UnboundedReceiver<(PeerId, LlmqMessage)>),
    ) -> Self {
        let chain = Arc::new(InMemoryChain::linear(tip_height));
        let masternodes = Arc::new(InMemoryMasternodeList::new(
            (1..=masternodes).map(mock_member).collect(),
        ));
        let commitments = Arc::new(InMemoryCommitmentIndex::new());
        let dkg = Arc::new(FixtureDkgSource::default());
        let store = Arc::new(InMemoryQuorumStore::new());
        let deps = QuorumDependencies {
            chain: chain.clone(),
            masternodes: masternodes.clone(),
            commitments: commitments.clone(),
            dkg: dkg.clone(),
            network: network.clone(),
            store: store.clone(),
            worker: Arc::new(MockBlsWorker),
        };
        let manager = QuorumManager::with_consensus(
            deps,
            config,
            ConsensusParams::new([params.clone()]),
        )
        .expect("test manager");
        Self {
            params,
            chain,
            masternodes,
            commitments,
            dkg,
            network,
            outbox,
            store,
            manager: Arc::new(manager),
        }
    }

    /// Run as masternode `seed`.
    pub fn set_local(&self, seed: u8) {
        self.manager.set_active_masternode(Some(ActiveMasternodeInfo {
            pro_tx_hash: mock_member(seed).pro_tx_hash,
            operator_key: mock_operator_key(seed),
        }));
    }

    /// Mine the quorum anchored at `anchor_height`, its commitment included
    /// `mined_after` blocks later. The DKG source serves it with the local
    /// node at committee index `local`, if any.
    pub fn mine_quorum(
        &self,
        anchor_height: u64,
        mined_after: u64,
        local: Option<usize>,
    ) -> QuorumFixture {
        let anchor = self.chain.block_at(anchor_height);
        let list = self.masternodes.valid_members_at(&anchor.hash);
        let members = select_members(&self.params, &anchor, &list);
        let fixture = QuorumFixture::with_members(self.params.clone(), anchor, members);
        self.commitments.add(
            anchor,
            fixture.commitment.clone(),
            self.chain.block_at(anchor_height + mined_after),
        );
        self.dkg.add(fixture.clone(), local);
        fixture
    }

    /// Current tip.
    pub fn tip(&self) -> BlockIndex {
        self.chain.tip().expect("chain has a tip")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_inverse() {
        for a in [1u64, 2, 12345, P - 1] {
            assert_eq!(mul(a, inv(a)), 1);
        }
    }

    #[test]
    fn test_fixture_shares_match_public_key_shares() {
        let fx = QuorumFixture::new(LlmqParams::llmq_test());
        let worker = MockBlsWorker;
        for i in 0..fx.members.len() {
            let expected = worker
                .build_public_key_share(&fx.vvec, &fx.members[i].pro_tx_hash)
                .unwrap();
            assert_eq!(worker.public_key(&fx.sk_share(i)).unwrap(), expected);

            let contributions: Vec<_> = (0..fx.members.len())
                .map(|j| fx.contribution(j, i))
                .collect();
            assert_eq!(
                worker.aggregate_secret_keys(&contributions).unwrap(),
                fx.sk_share(i)
            );
        }
    }

    #[test]
    fn test_threshold_recovery() {
        let fx = QuorumFixture::new(LlmqParams::llmq_devnet());
        let worker = MockBlsWorker;
        let msg = [42u8; 32];
        let shares: Vec<_> = (2..2 + fx.params.threshold)
            .map(|i| {
                (
                    fx.members[i].pro_tx_hash,
                    worker.sign(&fx.sk_share(i), &msg).unwrap(),
                )
            })
            .collect();
        let recovered = worker.recover_threshold_signature(&shares).unwrap();
        assert!(worker.verify_insecure(&fx.commitment.quorum_public_key, &msg, &recovered));
    }

    #[test]
    fn test_fixture_commitment_verifies() {
        let fx = QuorumFixture::new(LlmqParams::llmq_devnet()).with_invalid_member(3);
        assert!(fx.commitment.verify(
            &crate::domain::ConsensusParams::devnet(),
            &fx.members,
            true,
            &MockBlsWorker
        ));
    }
}
