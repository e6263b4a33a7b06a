//! # Event Loop
//!
//! Feeds chain-tip updates and raw p2p messages into the quorum manager on a
//! single task. Decoding happens here; a body that does not parse scores
//! the sender like any other protocol violation.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use shared_types::{BlockIndex, PeerId};

use crate::domain::LlmqMessage;
use crate::service::QuorumManager;

/// Input of the event loop.
#[derive(Debug, Clone)]
pub enum QuorumEvent {
    /// The active chain has a new tip.
    TipUpdated(BlockIndex),
    /// A p2p message arrived.
    Message {
        peer: PeerId,
        command: String,
        body: Vec<u8>,
    },
}

/// Single consumer of [`QuorumEvent`]s.
pub struct QuorumEventLoop {
    manager: Arc<QuorumManager>,
    events: mpsc::Receiver<QuorumEvent>,
}

impl QuorumEventLoop {
    /// Loop for `manager` with a bounded inbox.
    pub fn new(manager: Arc<QuorumManager>, capacity: usize) -> (Self, mpsc::Sender<QuorumEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                manager,
                events: rx,
            },
            tx,
        )
    }

    /// Process events until every sender is dropped or the manager's
    /// interrupt is raised.
    pub async fn run(mut self) {
        info!("[qc-18] Quorum event loop started");
        let interrupt = self.manager.interrupt().clone();
        loop {
            tokio::select! {
                _ = interrupt.raised() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        info!("[qc-18] Quorum event loop stopped");
    }

    /// Process one event.
    pub fn handle(&self, event: QuorumEvent) {
        match event {
            QuorumEvent::TipUpdated(tip) => {
                trace!("[qc-18] New tip {}", tip);
                self.manager.updated_block_tip(&tip);
            }
            QuorumEvent::Message {
                peer,
                command,
                body,
            } => match LlmqMessage::decode(&command, &body) {
                Ok(Some(message)) => self.manager.process_message(peer, message),
                Ok(None) => trace!("[qc-18] Ignoring '{}' message", command),
                Err(e) => {
                    debug!("[qc-18] Malformed '{}' message: {}", command, e);
                    let score = self.manager.config().misbehavior.default;
                    self.manager
                        .misbehaving(peer, score, "malformed quorum data message");
                }
            },
        }
    }
}
