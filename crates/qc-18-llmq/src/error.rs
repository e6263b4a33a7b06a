//! Error types for the LLMQ subsystem

use shared_crypto::CryptoError;
use shared_types::StorageError;
use thiserror::Error;

use crate::domain::serialize::WireError;

/// LLMQ subsystem errors
#[derive(Debug, Error)]
pub enum LlmqError {
    /// Quorum type byte does not name a known type
    #[error("Unknown quorum type: {0}")]
    UnknownQuorumType(u8),

    /// Quorum type is known but not enabled on this network
    #[error("Quorum type {0} is not configured")]
    QuorumTypeNotConfigured(u8),

    /// Referenced block is not known to the chain view
    #[error("Block not found: {hash}")]
    BlockNotFound { hash: String },

    /// No mined commitment for the quorum
    #[error("Quorum not found: type {llmq_type}, hash {hash}")]
    QuorumNotFound { llmq_type: u8, hash: String },

    /// Verification vector rejected
    #[error("Verification vector does not match commitment hash {expected}")]
    VerificationVectorMismatch { expected: String },

    /// Secret key share rejected
    #[error("Secret key share is invalid or does not match the member public key share")]
    InvalidSecretKeyShare,

    /// DKG step failed
    #[error("DKG error: {reason}")]
    Dkg { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Wire (de)serialization failure
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Cryptographic failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Durable storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for LLMQ operations
pub type LlmqResult<T> = Result<T, LlmqError>;
