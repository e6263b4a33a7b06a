//! Domain layer: quorum types, commitments, membership, DKG and the data
//! request protocol. Nothing in here performs I/O.

pub mod commitment;
pub mod data_request;
pub mod dkg;
pub mod keys;
pub mod messages;
pub mod params;
pub mod quorum;
pub mod roster;
pub mod selection;
pub mod serialize;

pub use commitment::{
    build_commitment_hash, check_commitment_payload, CommitmentRejection, CommitmentTxPayload,
    FinalCommitment,
};
pub use data_request::{
    DataRequestError, DataRequestTracker, OutgoingState, QuorumDataRequest, ReplyMismatch,
    ENCRYPTED_CONTRIBUTIONS, QUORUM_VERIFICATION_VECTOR,
};
pub use dkg::{
    DkgComplaint, DkgContribution, DkgJustification, DkgPhase, DkgPrematureCommitment,
    DkgSession, DkgSessionManager, SESSION_KEEP_ROUNDS,
};
pub use keys::{
    decode_vvec, encode_vvec, vvec_hash, BlsPublicKey, BlsSecretKey, BlsSignature,
    VerificationVector,
};
pub use messages::{LlmqMessage, QuorumDataReply, QDATA, QGETDATA};
pub use params::{ConsensusParams, LlmqParams, LlmqType};
pub use quorum::{Quorum, RecoveryGuard};
pub use roster::{CommitteeRoster, MasternodeEntry, MemberStatus, RosterEntry};
pub use selection::{select_members, MemberSelector};
pub use serialize::{MemberBitset, WireError};
