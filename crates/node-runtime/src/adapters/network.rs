//! # Channel Network Adapter
//!
//! Implements the quorum manager's `QuorumNetwork` port on top of a command
//! channel. The p2p layer drains [`NetworkCommand`]s and reports connection
//! changes back through [`ChannelNetwork::peer_connected`] and
//! [`ChannelNetwork::peer_disconnected`].
//!
//! ## Peer Scoring
//!
//! Misbehavior scores accumulate per connection. A peer reaching the ban
//! score is disconnected.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use qc_18_llmq::domain::LlmqMessage;
use qc_18_llmq::{LlmqType, PeerInfo, QuorumNetwork};
use shared_types::{Hash, PeerId, ProTxHash};

/// Instruction for the p2p layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCommand {
    /// Send an encoded message.
    Send {
        peer: PeerId,
        command: &'static str,
        body: Vec<u8>,
    },
    /// Open a connection to a masternode.
    Connect(ProTxHash),
    /// Close a connection.
    Disconnect(PeerId),
}

/// `QuorumNetwork` backed by an unbounded command channel.
pub struct ChannelNetwork {
    commands: mpsc::UnboundedSender<NetworkCommand>,
    peers: RwLock<HashMap<PeerId, PeerInfo>>,
    pending: RwLock<BTreeSet<ProTxHash>>,
    quorum_nodes: RwLock<HashMap<(LlmqType, Hash), BTreeSet<ProTxHash>>>,
    scores: RwLock<HashMap<PeerId, u32>>,
    ban_score: u32,
}

impl ChannelNetwork {
    /// Adapter plus the receiving end of its command channel.
    pub fn new(ban_score: u32) -> (Self, mpsc::UnboundedReceiver<NetworkCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                commands: tx,
                peers: RwLock::new(HashMap::new()),
                pending: RwLock::new(BTreeSet::new()),
                quorum_nodes: RwLock::new(HashMap::new()),
                scores: RwLock::new(HashMap::new()),
                ban_score,
            },
            rx,
        )
    }

    fn command(&self, command: NetworkCommand) {
        if self.commands.send(command).is_err() {
            debug!("[qc-18] Network command dropped, p2p layer gone");
        }
    }

    /// A connection finished its handshake.
    pub fn peer_connected(&self, info: PeerInfo) {
        if let Some(pro_tx_hash) = info.verified_pro_tx_hash {
            self.pending.write().remove(&pro_tx_hash);
        }
        self.peers.write().insert(info.id, info);
    }

    /// A connection closed.
    pub fn peer_disconnected(&self, peer: PeerId) {
        self.peers.write().remove(&peer);
        self.scores.write().remove(&peer);
    }

    /// Masternodes waiting for an outbound connection.
    pub fn pending_masternodes(&self) -> Vec<ProTxHash> {
        self.pending.read().iter().copied().collect()
    }

    /// Every masternode some registered quorum wants a connection to.
    pub fn quorum_connections(&self) -> BTreeSet<ProTxHash> {
        self.quorum_nodes
            .read()
            .values()
            .flat_map(|members| members.iter().copied())
            .collect()
    }

    /// Accumulated misbehavior score of a connected peer.
    pub fn score(&self, peer: PeerId) -> u32 {
        self.scores.read().get(&peer).copied().unwrap_or(0)
    }
}

impl QuorumNetwork for ChannelNetwork {
    fn send(&self, peer: PeerId, message: LlmqMessage) {
        self.command(NetworkCommand::Send {
            peer,
            command: message.command(),
            body: message.encode(),
        });
    }

    fn peer(&self, peer: PeerId) -> Option<PeerInfo> {
        self.peers.read().get(&peer).cloned()
    }

    fn connected_peers(&self) -> Vec<PeerInfo> {
        self.peers.read().values().cloned().collect()
    }

    fn add_pending_masternode(&self, pro_tx_hash: ProTxHash) {
        let connected = self
            .peers
            .read()
            .values()
            .any(|p| p.verified_pro_tx_hash == Some(pro_tx_hash));
        if connected || !self.pending.write().insert(pro_tx_hash) {
            return;
        }
        self.command(NetworkCommand::Connect(pro_tx_hash));
    }

    fn set_quorum_nodes(&self, llmq_type: LlmqType, quorum_hash: Hash, members: BTreeSet<ProTxHash>) {
        self.quorum_nodes
            .write()
            .insert((llmq_type, quorum_hash), members);
    }

    fn has_quorum_nodes(&self, llmq_type: LlmqType, quorum_hash: &Hash) -> bool {
        self.quorum_nodes
            .read()
            .contains_key(&(llmq_type, *quorum_hash))
    }

    fn quorum_nodes(&self, llmq_type: LlmqType) -> BTreeSet<Hash> {
        self.quorum_nodes
            .read()
            .keys()
            .filter(|(t, _)| *t == llmq_type)
            .map(|(_, h)| *h)
            .collect()
    }

    fn remove_quorum_nodes(&self, llmq_type: LlmqType, quorum_hash: &Hash) {
        self.quorum_nodes
            .write()
            .remove(&(llmq_type, *quorum_hash));
    }

    fn disconnect(&self, peer: PeerId) {
        self.peer_disconnected(peer);
        self.command(NetworkCommand::Disconnect(peer));
    }

    fn misbehaving(&self, peer: PeerId, score: u32) {
        let total = {
            let mut scores = self.scores.write();
            let entry = scores.entry(peer).or_default();
            *entry = entry.saturating_add(score);
            *entry
        };
        if total >= self.ban_score {
            warn!(peer = %peer, score = total, "[qc-18] Disconnecting misbehaving peer");
            self.disconnect(peer);
        } else {
            debug!(peer = %peer, score = total, "[qc-18] Peer misbehavior score increased");
        }
    }
}
