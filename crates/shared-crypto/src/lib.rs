//! # Shared Crypto - Quorum Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `bls` | BLS12-381 (min_pk) | Operator keys, member and quorum signatures |
//! | `threshold` | Shamir over Fr, G1/G2 Lagrange | Verification vectors, key shares, signature recovery |
//! | `ies` | G1 Diffie-Hellman + XChaCha20-Poly1305 | Encrypted secret contributions |
//! | `hashing` | SHA-256d | Consensus digests |
//!
//! ## Security Properties
//!
//! - **BLS**: proof-of-possession ciphersuite, so plain aggregation of
//!   registered operator keys is safe against rogue-key attacks
//! - **IES**: fresh ephemeral key per message, AEAD-authenticated payload
//! - **Secret material** is zeroized on drop where this crate owns the bytes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bls;
pub mod errors;
pub mod hashing;
pub mod ies;
pub mod threshold;

// Re-exports
pub use bls::{BlsPublicKey, BlsSecretKey, BlsSignature};
pub use errors::{CryptoError, CryptoResult};
pub use hashing::{sha256, sha256d, Sha256dHasher};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
