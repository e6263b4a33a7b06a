//! # BLS-IES Encryption
//!
//! Integrated encryption to a BLS operator public key, used to ship each
//! member's secret key contribution during DKG and in quorum data replies.
//!
//! ## Construction
//!
//! 1. Fresh ephemeral secret `e`, ephemeral public key `E = e G`.
//! 2. Shared point `S = e P` for recipient key `P`; the receiver computes
//!    the same point as `s E`.
//! 3. Symmetric key `k = SHA256(compress(S))`.
//! 4. Payload sealed with XChaCha20-Poly1305 under a random 24-byte nonce.
//!
//! Wire layout: `E (48) || nonce (24) || ciphertext+tag`.

use blst::{
    blst_p1, blst_p1_affine, blst_p1_affine_compress, blst_p1_from_affine, blst_p1_mult,
    blst_p1_to_affine, blst_p1_uncompress, blst_scalar, blst_scalar_from_bendian, BLST_ERROR,
};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::bls::{BlsPublicKey, BlsSecretKey};
use crate::hashing::sha256;
use crate::{CryptoError, CryptoResult};

const EPHEMERAL_KEY_LEN: usize = 48;
const NONCE_LEN: usize = 24;

/// Minimum size of a sealed blob (header plus the Poly1305 tag).
pub const OVERHEAD: usize = EPHEMERAL_KEY_LEN + NONCE_LEN + 16;

fn shared_key(secret: &BlsSecretKey, public: &BlsPublicKey) -> CryptoResult<Zeroizing<[u8; 32]>> {
    let public_bytes = public.to_bytes();
    let secret_bytes = Zeroizing::new(secret.to_bytes());
    let mut affine = blst_p1_affine::default();
    let mut point = blst_p1::default();
    let mut scalar = blst_scalar::default();
    let mut shared = blst_p1::default();
    let mut compressed = Zeroizing::new([0u8; 48]);

    let err = unsafe { blst_p1_uncompress(&mut affine, public_bytes.as_ptr()) };
    if err != BLST_ERROR::BLST_SUCCESS {
        return Err(CryptoError::InvalidPublicKey);
    }
    unsafe {
        blst_p1_from_affine(&mut point, &affine);
        blst_scalar_from_bendian(&mut scalar, secret_bytes.as_ptr());
        blst_p1_mult(&mut shared, &point, scalar.b.as_ptr(), 255);
        blst_p1_to_affine(&mut affine, &shared);
        blst_p1_affine_compress(compressed.as_mut_ptr(), &affine);
    }
    Ok(Zeroizing::new(sha256(&compressed[..])))
}

/// Seal `plaintext` so that only the holder of `recipient`'s secret key can open it.
pub fn encrypt(recipient: &BlsPublicKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let ephemeral = BlsSecretKey::generate()?;
    let key = shared_key(&ephemeral, recipient)?;
    let key_bytes: &[u8; 32] = &key;
    let cipher = XChaCha20Poly1305::new(key_bytes.into());

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(OVERHEAD + plaintext.len());
    out.extend_from_slice(&ephemeral.public_key().to_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a blob produced by [`encrypt`].
pub fn decrypt(secret: &BlsSecretKey, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    if sealed.len() < OVERHEAD {
        return Err(CryptoError::DecryptionFailed(format!(
            "blob too short: {} bytes",
            sealed.len()
        )));
    }
    let (ephemeral, rest) = sealed.split_at(EPHEMERAL_KEY_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let mut ephemeral_bytes = [0u8; EPHEMERAL_KEY_LEN];
    ephemeral_bytes.copy_from_slice(ephemeral);
    let ephemeral = BlsPublicKey::from_bytes(&ephemeral_bytes)?;

    let key = shared_key(secret, &ephemeral)?;
    let key_bytes: &[u8; 32] = &key;
    let cipher = XChaCha20Poly1305::new(key_bytes.into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}
