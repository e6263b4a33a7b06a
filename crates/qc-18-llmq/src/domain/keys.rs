//! # BLS Key Material
//!
//! Byte-level containers for BLS values as they appear in commitments, on
//! the wire and in storage. Parsing and curve checks happen behind the
//! [`BlsWorker`](crate::ports::BlsWorker) port; the domain only
//! moves bytes around and hashes them.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use shared_crypto::Sha256dHasher;
use shared_types::Hash;

use super::serialize::{Reader, WireError, Writer};

/// Compressed G1 public key (48 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlsPublicKey(pub [u8; 48]);

/// Compressed G2 signature (96 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlsSignature(pub [u8; 96]);

/// Secret scalar (32 bytes, big-endian). Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BlsSecretKey(pub [u8; 32]);

/// Public commitments to a secret polynomial, lowest coefficient first.
pub type VerificationVector = Vec<BlsPublicKey>;

impl BlsPublicKey {
    /// The all-zero placeholder used by null commitments.
    pub const NULL: Self = Self([0u8; 48]);

    /// True for the all-zero placeholder.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl BlsSignature {
    /// The all-zero placeholder used by null commitments.
    pub const NULL: Self = Self([0u8; 96]);

    /// True for the all-zero placeholder.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey({}..)", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSignature({}..)", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for BlsSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlsSecretKey(..)")
    }
}

/// Append a verification vector (count, then 48-byte keys).
pub fn write_vvec(w: &mut Writer, vvec: &[BlsPublicKey]) {
    w.compact_size(vvec.len() as u64);
    for key in vvec {
        w.bytes(&key.0);
    }
}

/// Read a verification vector.
pub fn read_vvec(r: &mut Reader<'_>) -> Result<VerificationVector, WireError> {
    let n = r.compact_size()? as usize;
    (0..n).map(|_| r.array().map(BlsPublicKey)).collect()
}

/// Serialize a verification vector on its own.
pub fn encode_vvec(vvec: &[BlsPublicKey]) -> Vec<u8> {
    let mut w = Writer::new();
    write_vvec(&mut w, vvec);
    w.finish()
}

/// Decode a standalone verification vector.
pub fn decode_vvec(bytes: &[u8]) -> Result<VerificationVector, WireError> {
    let mut r = Reader::new(bytes);
    let vvec = read_vvec(&mut r)?;
    r.finish()?;
    Ok(vvec)
}

/// Hash committed to by `quorum_vvec_hash`: SHA-256d of the serialized vector.
pub fn vvec_hash(vvec: &[BlsPublicKey]) -> Hash {
    let mut hasher = Sha256dHasher::new();
    hasher.update(&encode_vvec(vvec));
    hasher.finalize()
}
