use super::*;
use std::collections::BTreeSet;
use std::time::Duration;

use shared_types::{NodeId, ZERO_HASH};

use crate::adapters::InMemoryQuorumStore;
use crate::config::LLMQ_DATA_MESSAGES_VERSION;
use crate::domain::{
    DataRequestError, LlmqMessage, QuorumDataReply, QuorumDataRequest, VerificationVector,
    ENCRYPTED_CONTRIBUTIONS, QUORUM_VERIFICATION_VECTOR,
};
use crate::ports::ChainView;
use crate::testing::{mock_member, FixtureDkgSource, MockBlsWorker, QuorumFixture, TestNode};

const BOTH: u16 = QUORUM_VERIFICATION_VECTOR | ENCRYPTED_CONTRIBUTIONS;
const TEST: LlmqType = LlmqType::LlmqTest;

fn node() -> TestNode {
    TestNode::new(LlmqParams::llmq_test(), 5, 60, LlmqConfig::default())
}

/// Committee of five so recovery has four other members to walk through.
fn wide_params() -> LlmqParams {
    LlmqParams {
        size: 5,
        min_size: 3,
        threshold: 3,
        ..LlmqParams::llmq_test()
    }
}

fn sk_bytes(sk: Option<BlsSecretKey>) -> Option<[u8; 32]> {
    sk.map(|sk| sk.0)
}

fn reply(
    request: &QuorumDataRequest,
    vvec: Option<VerificationVector>,
    contributions: Option<Vec<Vec<u8>>>,
) -> LlmqMessage {
    let mut reply = QuorumDataReply::error(request.clone(), DataRequestError::None);
    reply.vvec = vvec;
    reply.contributions = contributions;
    LlmqMessage::Data(reply)
}

fn next_sent(node: &mut TestNode) -> Option<(PeerId, LlmqMessage)> {
    node.outbox.try_recv().ok()
}

fn sent_request(node: &mut TestNode) -> QuorumDataRequest {
    match next_sent(node) {
        Some((_, LlmqMessage::GetData(request))) => request,
        other => panic!("expected qgetdata, got {other:?}"),
    }
}

fn sent_reply(node: &mut TestNode) -> QuorumDataReply {
    match next_sent(node) {
        Some((_, LlmqMessage::Data(reply))) => reply,
        other => panic!("expected qdata, got {other:?}"),
    }
}

// =============================================================================
// LOOKUP
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_get_quorum_builds_member_material_from_dkg() {
    let node = node();
    let fx = node.mine_quorum(24, 12, Some(0));
    node.set_local(fx.seed(0));

    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert_eq!(quorum.quorum_hash(), fx.anchor.hash);
    assert_eq!(quorum.mined_block_hash(), node.chain.block_at(36).hash);
    assert_eq!(quorum.verification_vector().unwrap().as_ref(), &fx.vvec);
    assert_eq!(sk_bytes(quorum.secret_key_share()), Some(fx.sk_share(0).0));
    assert_eq!(node.store.len(), 2);

    let again = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(Arc::ptr_eq(&quorum, &again));
}

#[tokio::test(start_paused = true)]
async fn test_get_quorum_without_dkg_material_is_non_member() {
    let node = node();
    let fx = node.mine_quorum(24, 12, None);

    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(!quorum.has_verification_vector());
    assert!(!quorum.has_secret_key_share());
    assert!(node.store.is_empty());
}

#[cfg(feature = "metrics")]
#[tokio::test(start_paused = true)]
async fn test_lookup_counts_builds_and_cache_hits() {
    use crate::metrics::{QUORUMS_BUILT, QUORUM_CACHE_HITS};

    let node = node();
    let fx = node.mine_quorum(24, 12, None);
    let built = QUORUMS_BUILT.get();
    node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(QUORUMS_BUILT.get() > built);

    let hits = QUORUM_CACHE_HITS.get();
    node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(QUORUM_CACHE_HITS.get() > hits);
}

#[tokio::test(start_paused = true)]
async fn test_get_quorum_reads_persisted_material() {
    let node = node();
    let fx = node.mine_quorum(24, 12, Some(1));
    node.set_local(fx.seed(1));
    node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();

    // Second manager over the same store, without any DKG session.
    let deps = QuorumDependencies {
        chain: node.chain.clone(),
        masternodes: node.masternodes.clone(),
        commitments: node.commitments.clone(),
        dkg: Arc::new(FixtureDkgSource::default()),
        network: node.network.clone(),
        store: node.store.clone(),
        worker: Arc::new(MockBlsWorker),
    };
    let restarted = QuorumManager::with_consensus(
        deps,
        LlmqConfig::default(),
        ConsensusParams::new([LlmqParams::llmq_test()]),
    )
    .unwrap();

    let quorum = restarted.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert_eq!(quorum.verification_vector().unwrap().as_ref(), &fx.vvec);
    assert_eq!(sk_bytes(quorum.secret_key_share()), Some(fx.sk_share(1).0));
}

#[tokio::test(start_paused = true)]
async fn test_unmined_and_unknown_quorums() {
    let node = node();
    node.mine_quorum(24, 12, None);
    let unmined = node.chain.block_at(48);

    assert!(node.manager.get_quorum(TEST, &unmined.hash).is_none());
    assert!(node.manager.get_quorum(TEST, &[0x99; 32]).is_none());
    assert!(node
        .manager
        .get_quorum(LlmqType::Llmq50_60, &node.chain.block_at(24).hash)
        .is_none());
    assert!(!node.manager.has_quorum(TEST, &unmined.hash));
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_commitment_hides_cached_quorum() {
    let node = node();
    let fx = node.mine_quorum(24, 12, None);
    assert!(node.manager.get_quorum(TEST, &fx.anchor.hash).is_some());
    assert!(node.manager.has_quorum(TEST, &fx.anchor.hash));

    assert!(node.commitments.remove(TEST, &fx.anchor.hash));
    assert!(node.manager.get_quorum(TEST, &fx.anchor.hash).is_none());
    assert!(!node.manager.has_quorum(TEST, &fx.anchor.hash));
}

#[tokio::test(start_paused = true)]
async fn test_quorum_with_empty_committee_is_not_built() {
    let node = node();
    let fx = node.mine_quorum(24, 12, None);
    node.masternodes.set_at(fx.anchor.hash, Vec::new());

    // The selector memoizes committees, so use a fresh manager.
    let deps = QuorumDependencies {
        chain: node.chain.clone(),
        masternodes: node.masternodes.clone(),
        commitments: node.commitments.clone(),
        dkg: node.dkg.clone(),
        network: node.network.clone(),
        store: Arc::new(InMemoryQuorumStore::new()),
        worker: Arc::new(MockBlsWorker),
    };
    let manager = QuorumManager::with_consensus(
        deps,
        LlmqConfig::default(),
        ConsensusParams::new([LlmqParams::llmq_test()]),
    )
    .unwrap();
    assert!(manager.get_quorum(TEST, &fx.anchor.hash).is_none());
}

// =============================================================================
// SCANNING
// =============================================================================

fn heights(quorums: &[Arc<Quorum>]) -> Vec<u64> {
    quorums.iter().map(|q| q.anchor().height).collect()
}

#[tokio::test(start_paused = true)]
async fn test_scan_quorums_most_recent_first() {
    let node = TestNode::new(LlmqParams::llmq_test(), 5, 140, LlmqConfig::default());
    for h in [24, 48, 72, 96, 120] {
        node.mine_quorum(h, 12, None);
    }

    assert_eq!(heights(&node.manager.scan_quorums_from_tip(TEST, 2)), vec![120, 96]);
    // Commitment of 120 is mined at 132, not yet at 130.
    let at_130 = node.chain.block_at(130);
    assert_eq!(
        heights(&node.manager.scan_quorums(TEST, &at_130, 3)),
        vec![96, 72, 48]
    );
    assert!(node.manager.scan_quorums(TEST, &at_130, 0).is_empty());
    assert!(node
        .manager
        .scan_quorums(TEST, &node.chain.block_at(30), 4)
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scan_quorums_extends_partial_cache_hit() {
    let node = TestNode::new(LlmqParams::llmq_test(), 5, 140, LlmqConfig::default());
    for h in [24, 48, 72, 96, 120] {
        node.mine_quorum(h, 12, None);
    }
    let tip = node.tip();

    // A cold scan caches a full cache's worth of quorums.
    assert_eq!(heights(&node.manager.scan_quorums(TEST, &tip, 1)), vec![120]);
    let cached = node.manager.scan_quorums(TEST, &tip, 3);
    assert_eq!(heights(&cached), vec![120, 96, 72]);

    // More than cached continues below the oldest cached anchor.
    let all = node.manager.scan_quorums(TEST, &tip, 5);
    assert_eq!(heights(&all), vec![120, 96, 72, 48, 24]);
    assert!(Arc::ptr_eq(&all[0], &cached[0]));
}

fn scan_node() -> TestNode {
    let node = TestNode::new(LlmqParams::llmq_test(), 5, 140, LlmqConfig::default());
    for h in [24, 48, 72, 96, 120] {
        node.mine_quorum(h, 12, None);
    }
    node
}

#[tokio::test(start_paused = true)]
async fn test_scan_quorums_warm_matches_cold() {
    let warm = scan_node();
    let tip = warm.tip();
    warm.manager.scan_quorums(TEST, &tip, 2);
    warm.manager.scan_quorums(TEST, &tip, 5);
    let warm_scan = warm.manager.scan_quorums(TEST, &tip, 4);

    let cold = scan_node();
    let cold_scan = cold.manager.scan_quorums(TEST, &cold.tip(), 5);
    assert_eq!(heights(&cold_scan), vec![120, 96, 72, 48, 24]);

    let hashes = |quorums: &[Arc<Quorum>]| -> Vec<Hash> {
        quorums.iter().map(|q| q.quorum_hash()).collect()
    };
    assert_eq!(hashes(&warm_scan), hashes(&cold_scan[..4]));
    assert_eq!(heights(&warm_scan), vec![120, 96, 72, 48]);
    assert_eq!(
        hashes(&warm.manager.scan_quorums(TEST, &tip, 5)),
        hashes(&cold_scan)
    );
}

#[tokio::test(start_paused = true)]
async fn test_scan_quorums_repeat_returns_same_quorums() {
    let node = scan_node();
    let tip = node.tip();
    let first = node.manager.scan_quorums(TEST, &tip, 3);
    let second = node.manager.scan_quorums(TEST, &tip, 3);
    assert_eq!(first.len(), 3);
    assert_eq!(first.len(), second.len());
    assert!(first.iter().zip(&second).all(|(a, b)| Arc::ptr_eq(a, b)));
}

#[tokio::test(start_paused = true)]
async fn test_scan_quorums_unknown_type() {
    let node = node();
    node.mine_quorum(24, 12, None);
    assert!(node
        .manager
        .scan_quorums_from_tip(LlmqType::Llmq400_60, 4)
        .is_empty());
}

// =============================================================================
// QGETDATA / QDATA
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_request_quorum_data_gates() {
    let mut node = node();
    let fx = node.mine_quorum(24, 12, None);
    let target = fx.members[1].pro_tx_hash;

    let old = node.network.connect_masternode([0x71; 32], LLMQ_DATA_MESSAGES_VERSION - 1);
    assert!(!node.manager.request_quorum_data(old, TEST, &fx.anchor.hash, BOTH, target));

    let plain = NodeId([0x72; 32]);
    node.network.connect_plain(plain, false);
    assert!(!node.manager.request_quorum_data(plain, TEST, &fx.anchor.hash, BOTH, target));

    let unknown = NodeId([0x73; 32]);
    assert!(!node.manager.request_quorum_data(unknown, TEST, &fx.anchor.hash, BOTH, target));

    let peer = node.network.connect_masternode(target, LLMQ_DATA_MESSAGES_VERSION);
    assert!(!node.manager.request_quorum_data(peer, TEST, &[0x99; 32], BOTH, target));
    assert!(next_sent(&mut node).is_none());

    assert!(node.manager.request_quorum_data(peer, TEST, &fx.anchor.hash, BOTH, target));
    let request = sent_request(&mut node);
    assert_eq!(request.quorum_hash, fx.anchor.hash);
    assert_eq!(request.data_mask, BOTH);

    // One outstanding request per peer until it expires.
    assert!(!node.manager.request_quorum_data(peer, TEST, &fx.anchor.hash, BOTH, target));
    tokio::time::advance(node.manager.config().request_expiry()).await;
    assert!(node.manager.request_quorum_data(peer, TEST, &fx.anchor.hash, BOTH, target));
}

#[tokio::test(start_paused = true)]
async fn test_watch_peer_can_be_asked() {
    let mut node = node();
    let fx = node.mine_quorum(24, 12, None);
    let watcher = NodeId([0x74; 32]);
    node.network.connect_plain(watcher, true);

    assert!(node.manager.request_quorum_data(
        watcher,
        TEST,
        &fx.anchor.hash,
        QUORUM_VERIFICATION_VECTOR,
        ZERO_HASH
    ));
    assert_eq!(sent_request(&mut node).data_mask, QUORUM_VERIFICATION_VECTOR);
}

/// Masternode node holding full material for the quorum at 24.
fn serving_node() -> (TestNode, QuorumFixture) {
    let node = node();
    let fx = node.mine_quorum(24, 12, Some(0));
    node.set_local(fx.seed(0));
    (node, fx)
}

#[tokio::test(start_paused = true)]
async fn test_serve_vvec_and_contributions() {
    let (mut node, fx) = serving_node();
    let member = fx.members[1].pro_tx_hash;
    let peer = node.network.connect_masternode(member, LLMQ_DATA_MESSAGES_VERSION);

    let request = QuorumDataRequest::new(TEST.as_u8(), fx.anchor.hash, BOTH, member);
    node.manager.process_message(peer, LlmqMessage::GetData(request));

    let reply = sent_reply(&mut node);
    assert_eq!(reply.request.error, DataRequestError::None);
    assert_eq!(reply.vvec.as_ref(), Some(&fx.vvec));
    assert_eq!(reply.contributions, Some(fx.encrypted_for(1)));
    assert_eq!(node.network.score(peer), 0);
}

#[tokio::test(start_paused = true)]
async fn test_serve_error_codes() {
    let (mut node, fx) = serving_node();
    let member = fx.members[1].pro_tx_hash;
    let outsider = (1..=5u8)
        .map(|s| mock_member(s).pro_tx_hash)
        .find(|p| fx.index_of(p).is_none())
        .unwrap();
    let unmined = node.chain.block_at(48).hash;

    let cases = [
        (
            QuorumDataRequest::new(0xfe, fx.anchor.hash, BOTH, member),
            DataRequestError::QuorumTypeInvalid,
        ),
        (
            QuorumDataRequest::new(TEST.as_u8(), [0x99; 32], BOTH, member),
            DataRequestError::QuorumBlockNotFound,
        ),
        (
            QuorumDataRequest::new(TEST.as_u8(), unmined, BOTH, member),
            DataRequestError::QuorumNotFound,
        ),
        (
            QuorumDataRequest::new(TEST.as_u8(), fx.anchor.hash, ENCRYPTED_CONTRIBUTIONS, outsider),
            DataRequestError::MasternodeIsNoMember,
        ),
    ];
    for (i, (request, expected)) in cases.into_iter().enumerate() {
        let peer = node
            .network
            .connect_masternode([0x60 + i as u8; 32], LLMQ_DATA_MESSAGES_VERSION);
        node.manager.process_message(peer, LlmqMessage::GetData(request));
        let reply = sent_reply(&mut node);
        assert_eq!(reply.request.error, expected);
        assert!(reply.vvec.is_none());
        assert!(reply.contributions.is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn test_serve_without_vvec() {
    let mut node = node();
    let fx = node.mine_quorum(24, 12, None);
    node.set_local(fx.seed(0));
    let peer = node
        .network
        .connect_masternode(fx.members[1].pro_tx_hash, LLMQ_DATA_MESSAGES_VERSION);

    let request = QuorumDataRequest::new(TEST.as_u8(), fx.anchor.hash, QUORUM_VERIFICATION_VECTOR, ZERO_HASH);
    node.manager.process_message(peer, LlmqMessage::GetData(request));
    assert_eq!(
        sent_reply(&mut node).request.error,
        DataRequestError::QuorumVerificationVectorMissing
    );
}

#[tokio::test(start_paused = true)]
async fn test_get_data_rate_limited_per_peer() {
    let (mut node, fx) = serving_node();
    let peer = node
        .network
        .connect_masternode(fx.members[2].pro_tx_hash, LLMQ_DATA_MESSAGES_VERSION);
    let request = QuorumDataRequest::new(TEST.as_u8(), fx.anchor.hash, QUORUM_VERIFICATION_VECTOR, ZERO_HASH);

    node.manager.process_message(peer, LlmqMessage::GetData(request.clone()));
    node.manager.process_message(peer, LlmqMessage::GetData(request.clone()));
    sent_reply(&mut node);
    assert!(next_sent(&mut node).is_none());
    assert_eq!(node.network.score(peer), 25);

    tokio::time::advance(node.manager.config().request_expiry()).await;
    node.manager.process_message(peer, LlmqMessage::GetData(request));
    sent_reply(&mut node);
}

#[tokio::test(start_paused = true)]
async fn test_get_data_rejected_from_unverified_or_as_non_masternode() {
    let (mut node, fx) = serving_node();
    let request = QuorumDataRequest::new(TEST.as_u8(), fx.anchor.hash, QUORUM_VERIFICATION_VECTOR, ZERO_HASH);

    let plain = NodeId([0x75; 32]);
    node.network.connect_plain(plain, false);
    node.manager.process_message(plain, LlmqMessage::GetData(request.clone()));
    assert_eq!(node.network.score(plain), 10);

    node.manager.set_active_masternode(None);
    let peer = node
        .network
        .connect_masternode(fx.members[1].pro_tx_hash, LLMQ_DATA_MESSAGES_VERSION);
    node.manager.process_message(peer, LlmqMessage::GetData(request));
    assert_eq!(node.network.score(peer), 10);
    assert!(next_sent(&mut node).is_none());
}

/// Member 0 without material, with an outstanding request to member 1.
fn requesting_node() -> (TestNode, QuorumFixture, PeerId, QuorumDataRequest) {
    let mut node = node();
    let fx = node.mine_quorum(24, 12, None);
    node.set_local(fx.seed(0));
    let peer = node
        .network
        .connect_masternode(fx.members[1].pro_tx_hash, LLMQ_DATA_MESSAGES_VERSION);
    assert!(node
        .manager
        .request_quorum_data(peer, TEST, &fx.anchor.hash, BOTH, fx.members[0].pro_tx_hash));
    let request = sent_request(&mut node);
    (node, fx, peer, request)
}

#[tokio::test(start_paused = true)]
async fn test_data_reply_installs_material() {
    let (node, fx, peer, request) = requesting_node();
    node.manager.process_message(
        peer,
        reply(&request, Some(fx.vvec.clone()), Some(fx.encrypted_for(0))),
    );

    assert_eq!(node.network.score(peer), 0);
    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert_eq!(quorum.verification_vector().unwrap().as_ref(), &fx.vvec);
    assert_eq!(sk_bytes(quorum.secret_key_share()), Some(fx.sk_share(0).0));
    assert_eq!(node.store.len(), 2);

    // A second copy of the same reply is unsolicited.
    node.manager.process_message(
        peer,
        reply(&request, Some(fx.vvec.clone()), Some(fx.encrypted_for(0))),
    );
    assert_eq!(node.network.score(peer), 10);
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_and_altered_replies_score() {
    let (node, fx, peer, request) = requesting_node();

    let stranger = node
        .network
        .connect_masternode(fx.members[2].pro_tx_hash, LLMQ_DATA_MESSAGES_VERSION);
    node.manager
        .process_message(stranger, reply(&request, Some(fx.vvec.clone()), None));
    assert_eq!(node.network.score(stranger), 10);

    let mut altered = request.clone();
    altered.data_mask = QUORUM_VERIFICATION_VECTOR;
    node.manager
        .process_message(peer, reply(&altered, Some(fx.vvec.clone()), None));
    assert_eq!(node.network.score(peer), 10);

    let plain = NodeId([0x76; 32]);
    node.network.connect_plain(plain, false);
    node.manager
        .process_message(plain, reply(&request, Some(fx.vvec.clone()), None));
    assert_eq!(node.network.score(plain), 10);
}

#[tokio::test(start_paused = true)]
async fn test_error_reply_is_not_scored() {
    let (node, fx, peer, request) = requesting_node();
    let error = QuorumDataReply::error(request, DataRequestError::QuorumVerificationVectorMissing);
    node.manager.process_message(peer, LlmqMessage::Data(error));

    assert_eq!(node.network.score(peer), 0);
    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(!quorum.has_verification_vector());
}

#[tokio::test(start_paused = true)]
async fn test_bad_vvec_reply_scores() {
    let (node, fx, peer, request) = requesting_node();
    let mut vvec = fx.vvec.clone();
    vvec.swap(0, 1);
    node.manager
        .process_message(peer, reply(&request, Some(vvec), Some(fx.encrypted_for(0))));

    assert_eq!(node.network.score(peer), 10);
    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(!quorum.has_verification_vector());
    assert!(node.store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_undecryptable_contributions_score() {
    let (node, fx, peer, request) = requesting_node();
    node.manager.process_message(
        peer,
        reply(&request, Some(fx.vvec.clone()), Some(fx.encrypted_for(2))),
    );

    assert_eq!(node.network.score(peer), 10);
    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(quorum.has_verification_vector());
    assert!(!quorum.has_secret_key_share());
}

#[tokio::test(start_paused = true)]
async fn test_contributions_without_vvec_are_ignored() {
    let mut node = node();
    let fx = node.mine_quorum(24, 12, None);
    node.set_local(fx.seed(0));
    let peer = node
        .network
        .connect_masternode(fx.members[1].pro_tx_hash, LLMQ_DATA_MESSAGES_VERSION);
    assert!(node.manager.request_quorum_data(
        peer,
        TEST,
        &fx.anchor.hash,
        ENCRYPTED_CONTRIBUTIONS,
        fx.members[0].pro_tx_hash
    ));
    let request = sent_request(&mut node);

    node.manager
        .process_message(peer, reply(&request, None, Some(fx.encrypted_for(0))));
    assert_eq!(node.network.score(peer), 0);
    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(!quorum.has_secret_key_share());
}

// =============================================================================
// CHAIN TIP
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_tip_update_keeps_member_connections() {
    let node = node();
    let fx = node.mine_quorum(24, 12, Some(0));
    let local = fx.members[0].pro_tx_hash;
    node.set_local(fx.seed(0));

    let stale = [0xde; 32];
    let dkg_round = node.chain.block_at(48).hash;
    node.network.set_quorum_nodes(TEST, stale, [[1; 32]].into());
    node.network.set_quorum_nodes(TEST, dkg_round, [[2; 32]].into());

    node.manager.updated_block_tip(&node.tip());

    let nodes = node.network.quorum_nodes.lock().clone();
    let expected: BTreeSet<_> = fx
        .members
        .iter()
        .map(|m| m.pro_tx_hash)
        .filter(|p| *p != local)
        .collect();
    assert_eq!(nodes.get(&(TEST, fx.anchor.hash)), Some(&expected));
    assert!(nodes.contains_key(&(TEST, dkg_round)));
    assert!(!nodes.contains_key(&(TEST, stale)));
}

#[tokio::test(start_paused = true)]
async fn test_tip_update_watch_mode_connects_all_members() {
    let config = LlmqConfig {
        watch_quorums: true,
        ..LlmqConfig::default()
    };
    let node = TestNode::new(LlmqParams::llmq_test(), 5, 60, config);
    let fx = node.mine_quorum(24, 12, None);

    node.manager.updated_block_tip(&node.tip());

    let nodes = node.network.quorum_nodes.lock().clone();
    assert_eq!(nodes.get(&(TEST, fx.anchor.hash)).map(|n| n.len()), Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_tip_update_non_member_drops_connections() {
    let node = node();
    let fx = node.mine_quorum(24, 12, None);
    node.network
        .set_quorum_nodes(TEST, fx.anchor.hash, [[1; 32]].into());

    node.manager.updated_block_tip(&node.tip());
    assert!(node.network.quorum_nodes.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tip_update_ignored_while_syncing() {
    let node = node();
    let fx = node.mine_quorum(24, 12, Some(0));
    node.set_local(fx.seed(0));
    node.chain.set_synced(false);

    node.manager.updated_block_tip(&node.tip());
    assert!(node.network.quorum_nodes.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tip_update_sweeps_expired_requests() {
    let (node, _fx, _peer, _request) = requesting_node();
    assert_eq!(node.manager.requests().len(), 1);

    tokio::time::advance(node.manager.config().request_expiry()).await;
    node.manager.updated_block_tip(&node.tip());
    // The member recovery started by the tip may already have asked again.
    assert!(node.manager.requests().len() <= 1);
}

// =============================================================================
// RECOVERY
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_recovery_walks_members_from_offset() {
    let node = TestNode::new(wide_params(), 5, 60, LlmqConfig::default());
    let fx = node.mine_quorum(24, 12, None);
    let local_seed = fx.seed(2);
    node.set_local(local_seed);

    node.manager.updated_block_tip(&node.tip());
    tokio::time::sleep(Duration::from_secs(120)).await;

    let mut others: Vec<ProTxHash> = (1..=5u8)
        .filter(|s| *s != local_seed)
        .map(|s| mock_member(s).pro_tx_hash)
        .collect();
    others.sort_unstable();
    // Masternodes 1..=5 sort by seed, so our offset is seed - 1.
    let offset = usize::from(local_seed - 1);
    let expected: Vec<ProTxHash> = (0..others.len())
        .map(|i| others[(offset + i) % others.len()])
        .collect();
    assert_eq!(*node.network.pending.lock(), expected);

    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(!quorum.is_recovery_in_progress());
}

#[tokio::test(start_paused = true)]
async fn test_recovery_installs_requested_data() {
    let mut node = TestNode::auto_connecting(wide_params(), 5, 60, LlmqConfig::default());
    let fx = node.mine_quorum(24, 12, None);
    let local = fx.members[0].pro_tx_hash;
    node.set_local(fx.seed(0));

    node.manager.updated_block_tip(&node.tip());
    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(quorum.is_recovery_in_progress());

    let (peer, message) = node.outbox.recv().await.unwrap();
    let LlmqMessage::GetData(request) = message else {
        panic!("expected qgetdata");
    };
    assert_eq!(request.data_mask, BOTH);
    assert_eq!(request.pro_tx_hash, local);

    node.manager.process_message(
        peer,
        reply(&request, Some(fx.vvec.clone()), Some(fx.encrypted_for(0))),
    );
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(sk_bytes(quorum.secret_key_share()), Some(fx.sk_share(0).0));
    assert!(!quorum.is_recovery_in_progress());
    assert_eq!(node.network.pending.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_tries_each_member_once() {
    let mut node = TestNode::auto_connecting(wide_params(), 5, 60, LlmqConfig::default());
    let fx = node.mine_quorum(24, 12, None);
    let local = fx.members[0].pro_tx_hash;
    node.set_local(fx.seed(0));

    node.manager.updated_block_tip(&node.tip());
    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();

    // The first three members never answer, the fourth does.
    let mut asked = Vec::new();
    let mut last = None;
    for _ in 0..4 {
        let (peer, message) = node.outbox.recv().await.unwrap();
        let LlmqMessage::GetData(request) = message else {
            panic!("expected qgetdata");
        };
        asked.push(peer.0);
        last = Some((peer, request));
    }
    let (peer, request) = last.unwrap();
    node.manager.process_message(
        peer,
        reply(&request, Some(fx.vvec.clone()), Some(fx.encrypted_for(0))),
    );
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert!(next_sent(&mut node).is_none());
    assert_eq!(sk_bytes(quorum.secret_key_share()), Some(fx.sk_share(0).0));
    assert!(!quorum.is_recovery_in_progress());

    let mut others: Vec<ProTxHash> = fx.members[1..].iter().map(|m| m.pro_tx_hash).collect();
    others.sort_unstable();
    let offset = node
        .manager
        .recovery_start_offset(&quorum, &node.tip(), &local);
    let expected: Vec<ProTxHash> = (0..others.len())
        .map(|i| others[(offset + i) % others.len()])
        .collect();
    assert_eq!(asked, expected);
    assert_eq!(asked.iter().collect::<BTreeSet<_>>().len(), 4);
    assert_eq!(*node.network.pending.lock(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_disabled() {
    let config = LlmqConfig {
        data_recovery_enabled: false,
        ..LlmqConfig::default()
    };
    let node = TestNode::new(wide_params(), 5, 60, config);
    let fx = node.mine_quorum(24, 12, None);
    node.set_local(fx.seed(0));

    node.manager.updated_block_tip(&node.tip());
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(node.network.pending.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_qvvec_sync_recovers_vvec_as_non_member() {
    let config = LlmqConfig {
        qvvec_sync: vec!["llmq_test:0".into()],
        ..LlmqConfig::default()
    };
    let mut node = TestNode::auto_connecting(LlmqParams::llmq_test(), 5, 60, config);
    let fx = node.mine_quorum(24, 12, None);
    let outsider = (1..=5u8)
        .find(|s| fx.index_of(&mock_member(*s).pro_tx_hash).is_none())
        .unwrap();
    node.set_local(outsider);

    node.manager.updated_block_tip(&node.tip());
    let (peer, message) = node.outbox.recv().await.unwrap();
    let LlmqMessage::GetData(request) = message else {
        panic!("expected qgetdata");
    };
    assert_eq!(request.data_mask, QUORUM_VERIFICATION_VECTOR);

    node.manager
        .process_message(peer, reply(&request, Some(fx.vvec.clone()), None));
    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(quorum.has_verification_vector());
    assert!(!quorum.has_secret_key_share());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_recovery() {
    let node = TestNode::new(wide_params(), 5, 60, LlmqConfig::default());
    let fx = node.mine_quorum(24, 12, None);
    node.set_local(fx.seed(0));

    node.manager.updated_block_tip(&node.tip());
    let quorum = node.manager.get_quorum(TEST, &fx.anchor.hash).unwrap();
    assert!(quorum.is_recovery_in_progress());

    node.manager.shutdown();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!quorum.is_recovery_in_progress());
    assert!(node.network.pending.lock().len() <= 1);
}

#[test]
fn test_recovery_offset_wraps_at_committee_size() {
    let node = TestNode::new(LlmqParams::llmq_test(), 5, 60, LlmqConfig::default());
    let fx = node.mine_quorum(24, 12, None);
    let quorum = fx.quorum();
    let tip = node.chain.tip().unwrap();

    // Sorted index 4 wraps around the three committee slots.
    let offset = node
        .manager
        .recovery_start_offset(&quorum, &tip, &mock_member(5).pro_tx_hash);
    assert_eq!(offset, 1);
    assert_eq!(
        node.manager
            .recovery_start_offset(&quorum, &tip, &mock_member(2).pro_tx_hash),
        1
    );
}
