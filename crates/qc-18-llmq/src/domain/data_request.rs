//! # Quorum Data Requests
//!
//! Bookkeeping for `qgetdata` / `qdata` exchanges. Every request, outgoing or
//! served, is remembered per peer until it expires; this both enforces one
//! outstanding request per peer and direction, and lets the requester detect
//! unsolicited or altered replies.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use shared_types::{Hash, ProTxHash};

use super::serialize::{Reader, WireError, Writer};

/// Request bit: quorum verification vector.
pub const QUORUM_VERIFICATION_VECTOR: u16 = 0x0001;
/// Request bit: encrypted contributions addressed to a member.
pub const ENCRYPTED_CONTRIBUTIONS: u16 = 0x0002;

/// Default lifetime of a request entry.
pub const DEFAULT_REQUEST_EXPIRY: Duration = Duration::from_secs(300);

/// Error code carried by a `qdata` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataRequestError {
    /// Request served.
    None = 0x00,
    /// Quorum type not configured on the responder.
    QuorumTypeInvalid = 0x01,
    /// Anchor block unknown to the responder.
    QuorumBlockNotFound = 0x02,
    /// No mined commitment for the quorum.
    QuorumNotFound = 0x03,
    /// Requested member is not on the committee.
    MasternodeIsNoMember = 0x04,
    /// Responder has no verification vector.
    QuorumVerificationVectorMissing = 0x05,
    /// Responder has no encrypted contributions for the member.
    EncryptedContributionsMissing = 0x06,
    /// Anything else.
    Undefined = 0xff,
}

impl From<u8> for DataRequestError {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::None,
            0x01 => Self::QuorumTypeInvalid,
            0x02 => Self::QuorumBlockNotFound,
            0x03 => Self::QuorumNotFound,
            0x04 => Self::MasternodeIsNoMember,
            0x05 => Self::QuorumVerificationVectorMissing,
            0x06 => Self::EncryptedContributionsMissing,
            _ => Self::Undefined,
        }
    }
}

impl DataRequestError {
    /// Snake-case name, used as a metric label.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::QuorumTypeInvalid => "quorum_type_invalid",
            Self::QuorumBlockNotFound => "quorum_block_not_found",
            Self::QuorumNotFound => "quorum_not_found",
            Self::MasternodeIsNoMember => "masternode_is_no_member",
            Self::QuorumVerificationVectorMissing => "quorum_verification_vector_missing",
            Self::EncryptedContributionsMissing => "encrypted_contributions_missing",
            Self::Undefined => "undefined",
        }
    }
}

/// One `qgetdata` request and its local state.
#[derive(Debug, Clone)]
pub struct QuorumDataRequest {
    /// Raw quorum type; may name a type the receiver does not know.
    pub llmq_type: u8,
    /// Anchor block hash.
    pub quorum_hash: Hash,
    /// Requested items.
    pub data_mask: u16,
    /// Member whose encrypted contributions are requested.
    pub pro_tx_hash: ProTxHash,
    /// Reply error code.
    pub error: DataRequestError,
    created_at: Instant,
    processed: bool,
}

impl PartialEq for QuorumDataRequest {
    fn eq(&self, other: &Self) -> bool {
        self.llmq_type == other.llmq_type
            && self.quorum_hash == other.quorum_hash
            && self.data_mask == other.data_mask
            && self.pro_tx_hash == other.pro_tx_hash
    }
}

impl Eq for QuorumDataRequest {}

impl QuorumDataRequest {
    /// New request, timestamped now.
    pub fn new(llmq_type: u8, quorum_hash: Hash, data_mask: u16, pro_tx_hash: ProTxHash) -> Self {
        Self {
            llmq_type,
            quorum_hash,
            data_mask,
            pro_tx_hash,
            error: DataRequestError::Undefined,
            created_at: Instant::now(),
            processed: false,
        }
    }

    /// True if the request asks for the verification vector.
    pub fn wants_vvec(&self) -> bool {
        self.data_mask & QUORUM_VERIFICATION_VECTOR != 0
    }

    /// True if the request asks for encrypted contributions.
    pub fn wants_contributions(&self) -> bool {
        self.data_mask & ENCRYPTED_CONTRIBUTIONS != 0
    }

    /// True once a matching reply arrived.
    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// True once `expiry` has passed since creation.
    pub fn is_expired(&self, expiry: Duration) -> bool {
        self.created_at.elapsed() >= expiry
    }

    /// Append the four request fields.
    pub fn write(&self, w: &mut Writer) {
        w.u8(self.llmq_type)
            .hash(&self.quorum_hash)
            .u16(self.data_mask)
            .hash(&self.pro_tx_hash);
    }

    /// Read the four request fields.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self::new(r.u8()?, r.hash()?, r.u16()?, r.hash()?))
    }
}

/// Why a reply was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMismatch {
    /// No outgoing request to the peer.
    NotRequested,
    /// The request was already answered.
    AlreadyReceived,
    /// The reply echoes different request fields.
    NotLikeRequested,
}

/// State of the outgoing request to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutgoingState {
    /// No entry.
    Missing,
    /// Sent, no reply yet.
    Pending,
    /// Reply received.
    Processed,
}

/// Requests keyed by `(peer pro-tx hash, outgoing)`.
#[derive(Debug)]
pub struct DataRequestTracker {
    requests: Mutex<HashMap<(ProTxHash, bool), QuorumDataRequest>>,
    expiry: Duration,
}

impl Default for DataRequestTracker {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_EXPIRY)
    }
}

impl DataRequestTracker {
    /// Empty tracker with the given entry lifetime.
    pub fn new(expiry: Duration) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            expiry,
        }
    }

    /// Entry lifetime.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Record a request unless an unexpired one exists for the same key.
    /// Expired entries are replaced.
    pub fn try_insert(&self, peer: ProTxHash, outgoing: bool, request: QuorumDataRequest) -> bool {
        let mut requests = self.requests.lock();
        match requests.get(&(peer, outgoing)) {
            Some(existing) if !existing.is_expired(self.expiry) => false,
            _ => {
                requests.insert((peer, outgoing), request);
                true
            }
        }
    }

    /// True if an unexpired outgoing request to the peer exists.
    pub fn has_unexpired_outgoing(&self, peer: &ProTxHash) -> bool {
        self.requests
            .lock()
            .get(&(*peer, true))
            .is_some_and(|r| !r.is_expired(self.expiry))
    }

    /// State of the outgoing request to the peer, ignoring expiry.
    pub fn outgoing_state(&self, peer: &ProTxHash) -> OutgoingState {
        match self.requests.lock().get(&(*peer, true)) {
            None => OutgoingState::Missing,
            Some(r) if r.is_processed() => OutgoingState::Processed,
            Some(_) => OutgoingState::Pending,
        }
    }

    /// Match a reply against the outgoing request to the peer and mark the
    /// request processed. Nothing changes on mismatch.
    pub fn mark_processed_if_matches(
        &self,
        peer: &ProTxHash,
        reply: &QuorumDataRequest,
    ) -> Result<(), ReplyMismatch> {
        let mut requests = self.requests.lock();
        let entry = requests
            .get_mut(&(*peer, true))
            .ok_or(ReplyMismatch::NotRequested)?;
        if entry.processed {
            return Err(ReplyMismatch::AlreadyReceived);
        }
        if entry != reply {
            return Err(ReplyMismatch::NotLikeRequested);
        }
        entry.processed = true;
        Ok(())
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut requests = self.requests.lock();
        let before = requests.len();
        requests.retain(|_, r| !r.is_expired(self.expiry));
        before - requests.len()
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    /// True if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
