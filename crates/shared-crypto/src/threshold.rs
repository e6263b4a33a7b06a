//! # Threshold BLS
//!
//! Shamir secret sharing over the BLS12-381 scalar field, lifted to G1 for
//! verification vectors and to G2 for signature recovery.
//!
//! - A contributor's secret polynomial `f(x) = a_0 + a_1 x + ... + a_{t-1} x^{t-1}`
//!   is published as its verification vector `[a_0 G, a_1 G, ...]`.
//! - Member `m` with id `x_m` receives `f(x_m)`; anyone holding the vector can
//!   derive the matching public key share `f(x_m) G`.
//! - Member ids are derived from 32-byte hashes reduced modulo the group order.
//! - Any `t` signature shares over the same message recover the signature of
//!   `a_0` by Lagrange interpolation at zero.
//!
//! The blst crate exposes curve and field arithmetic only through its C
//! bindings; every `unsafe` block below calls one of those functions with
//! pointers to initialized, correctly sized locals.

use blst::{
    blst_bendian_from_scalar, blst_fr, blst_fr_add, blst_fr_from_scalar, blst_fr_inverse,
    blst_fr_mul, blst_fr_sub, blst_p1, blst_p1_add_or_double, blst_p1_affine,
    blst_p1_affine_compress, blst_p1_from_affine, blst_p1_mult, blst_p1_to_affine,
    blst_p1_uncompress, blst_p2, blst_p2_add_or_double, blst_p2_affine, blst_p2_affine_compress,
    blst_p2_from_affine, blst_p2_mult, blst_p2_to_affine, blst_p2_uncompress, blst_scalar,
    blst_scalar_from_be_bytes, blst_scalar_from_bendian, blst_scalar_from_fr, BLST_ERROR,
};

use crate::bls::{BlsPublicKey, BlsSecretKey, BlsSignature};
use crate::{CryptoError, CryptoResult};

/// Bit length of a reduced scalar.
const SCALAR_BITS: usize = 255;

/// Element of the scalar field Fr.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
struct Fr(blst_fr);

impl Fr {
    /// Interpret 32 canonical big-endian bytes (a serialized secret key).
    fn from_secret(key: &BlsSecretKey) -> Self {
        let bytes = zeroize::Zeroizing::new(key.to_bytes());
        let mut scalar = blst_scalar::default();
        let mut fr = blst_fr::default();
        unsafe {
            blst_scalar_from_bendian(&mut scalar, bytes.as_ptr());
            blst_fr_from_scalar(&mut fr, &scalar);
        }
        Self(fr)
    }

    /// Reduce an arbitrary 32-byte hash modulo the group order.
    fn from_id(id: &[u8; 32]) -> CryptoResult<Self> {
        let mut scalar = blst_scalar::default();
        let mut fr = blst_fr::default();
        let non_zero = unsafe { blst_scalar_from_be_bytes(&mut scalar, id.as_ptr(), id.len()) };
        if !non_zero {
            return Err(CryptoError::InvalidInput("member id reduces to zero".into()));
        }
        unsafe { blst_fr_from_scalar(&mut fr, &scalar) };
        Ok(Self(fr))
    }

    fn one() -> Self {
        let mut le = [0u8; 32];
        le[0] = 1;
        let scalar = blst_scalar { b: le };
        let mut fr = blst_fr::default();
        unsafe { blst_fr_from_scalar(&mut fr, &scalar) };
        Self(fr)
    }

    fn to_scalar(self) -> blst_scalar {
        let mut scalar = blst_scalar::default();
        unsafe { blst_scalar_from_fr(&mut scalar, &self.0) };
        scalar
    }

    fn to_secret(self) -> CryptoResult<BlsSecretKey> {
        let mut bytes = zeroize::Zeroizing::new([0u8; 32]);
        let scalar = self.to_scalar();
        unsafe { blst_bendian_from_scalar(bytes.as_mut_ptr(), &scalar) };
        BlsSecretKey::from_bytes(&bytes)
    }

    fn is_zero(&self) -> bool {
        self.0 == blst_fr::default()
    }

    fn add(self, other: Self) -> Self {
        let mut out = blst_fr::default();
        unsafe { blst_fr_add(&mut out, &self.0, &other.0) };
        Self(out)
    }

    fn sub(self, other: Self) -> Self {
        let mut out = blst_fr::default();
        unsafe { blst_fr_sub(&mut out, &self.0, &other.0) };
        Self(out)
    }

    fn mul(self, other: Self) -> Self {
        let mut out = blst_fr::default();
        unsafe { blst_fr_mul(&mut out, &self.0, &other.0) };
        Self(out)
    }

    fn inverse(self) -> Self {
        let mut out = blst_fr::default();
        unsafe { blst_fr_inverse(&mut out, &self.0) };
        Self(out)
    }
}

fn g1_from_key(key: &BlsPublicKey) -> CryptoResult<blst_p1> {
    let bytes = key.to_bytes();
    let mut affine = blst_p1_affine::default();
    let mut point = blst_p1::default();
    let err = unsafe { blst_p1_uncompress(&mut affine, bytes.as_ptr()) };
    if err != BLST_ERROR::BLST_SUCCESS {
        return Err(CryptoError::InvalidPublicKey);
    }
    unsafe { blst_p1_from_affine(&mut point, &affine) };
    Ok(point)
}

fn g1_to_key(point: &blst_p1) -> CryptoResult<BlsPublicKey> {
    let mut affine = blst_p1_affine::default();
    let mut bytes = [0u8; 48];
    unsafe {
        blst_p1_to_affine(&mut affine, point);
        blst_p1_affine_compress(bytes.as_mut_ptr(), &affine);
    }
    BlsPublicKey::from_bytes(&bytes)
}

fn g1_mul(point: &blst_p1, scalar: Fr) -> blst_p1 {
    let s = scalar.to_scalar();
    let mut out = blst_p1::default();
    unsafe { blst_p1_mult(&mut out, point, s.b.as_ptr(), SCALAR_BITS) };
    out
}

fn g1_add(a: &blst_p1, b: &blst_p1) -> blst_p1 {
    let mut out = blst_p1::default();
    unsafe { blst_p1_add_or_double(&mut out, a, b) };
    out
}

fn g2_from_signature(sig: &BlsSignature) -> CryptoResult<blst_p2> {
    let bytes = sig.to_bytes();
    let mut affine = blst_p2_affine::default();
    let mut point = blst_p2::default();
    let err = unsafe { blst_p2_uncompress(&mut affine, bytes.as_ptr()) };
    if err != BLST_ERROR::BLST_SUCCESS {
        return Err(CryptoError::InvalidSignature);
    }
    unsafe { blst_p2_from_affine(&mut point, &affine) };
    Ok(point)
}

fn g2_to_signature(point: &blst_p2) -> CryptoResult<BlsSignature> {
    let mut affine = blst_p2_affine::default();
    let mut bytes = [0u8; 96];
    unsafe {
        blst_p2_to_affine(&mut affine, point);
        blst_p2_affine_compress(bytes.as_mut_ptr(), &affine);
    }
    BlsSignature::from_bytes(&bytes)
}

/// Generate a random secret polynomial with `threshold` coefficients.
pub fn generate_polynomial(threshold: usize) -> CryptoResult<Vec<BlsSecretKey>> {
    if threshold == 0 {
        return Err(CryptoError::InvalidInput("threshold must be positive".into()));
    }
    (0..threshold).map(|_| BlsSecretKey::generate()).collect()
}

/// Public commitments to each polynomial coefficient.
pub fn verification_vector(coefficients: &[BlsSecretKey]) -> Vec<BlsPublicKey> {
    coefficients.iter().map(BlsSecretKey::public_key).collect()
}

/// Evaluate the polynomial at the member id (Horner's method).
pub fn secret_share(coefficients: &[BlsSecretKey], id: &[u8; 32]) -> CryptoResult<BlsSecretKey> {
    if coefficients.is_empty() {
        return Err(CryptoError::InvalidInput("empty polynomial".into()));
    }
    let x = Fr::from_id(id)?;
    let mut acc = Fr::default();
    for coefficient in coefficients.iter().rev() {
        acc = acc.mul(x).add(Fr::from_secret(coefficient));
    }
    acc.to_secret()
}

/// Derive the public key share of member `id` from a verification vector.
pub fn public_key_share(vvec: &[BlsPublicKey], id: &[u8; 32]) -> CryptoResult<BlsPublicKey> {
    let (last, rest) = vvec
        .split_last()
        .ok_or_else(|| CryptoError::InvalidInput("empty verification vector".into()))?;
    let x = Fr::from_id(id)?;
    let mut acc = g1_from_key(last)?;
    for commitment in rest.iter().rev() {
        acc = g1_add(&g1_mul(&acc, x), &g1_from_key(commitment)?);
    }
    g1_to_key(&acc)
}

/// True if `share` is the evaluation at `id` of the polynomial committed to by `vvec`.
pub fn verify_secret_share(vvec: &[BlsPublicKey], id: &[u8; 32], share: &BlsSecretKey) -> bool {
    match public_key_share(vvec, id) {
        Ok(expected) => expected == share.public_key(),
        Err(_) => false,
    }
}

/// Element-wise sum of several verification vectors of equal length.
pub fn aggregate_verification_vectors(vvecs: &[Vec<BlsPublicKey>]) -> CryptoResult<Vec<BlsPublicKey>> {
    let first = vvecs
        .first()
        .ok_or_else(|| CryptoError::InvalidInput("no verification vectors".into()))?;
    if vvecs.iter().any(|v| v.len() != first.len()) {
        return Err(CryptoError::InvalidInput("verification vector length mismatch".into()));
    }
    (0..first.len())
        .map(|i| {
            let column: Vec<BlsPublicKey> = vvecs.iter().map(|v| v[i].clone()).collect();
            BlsPublicKey::aggregate(&column)
        })
        .collect()
}

/// Sum of secret key contributions.
pub fn aggregate_secret_keys(keys: &[BlsSecretKey]) -> CryptoResult<BlsSecretKey> {
    if keys.is_empty() {
        return Err(CryptoError::InvalidInput("no secret keys".into()));
    }
    keys.iter()
        .fold(Fr::default(), |acc, key| acc.add(Fr::from_secret(key)))
        .to_secret()
}

/// Recover the group signature from `(member id, signature share)` pairs.
///
/// The caller is responsible for supplying at least `threshold` shares;
/// fewer shares interpolate to an unrelated signature.
pub fn recover_signature(shares: &[([u8; 32], BlsSignature)]) -> CryptoResult<BlsSignature> {
    if shares.is_empty() {
        return Err(CryptoError::InvalidInput("no signature shares".into()));
    }
    let ids = shares
        .iter()
        .map(|(id, _)| Fr::from_id(id))
        .collect::<CryptoResult<Vec<Fr>>>()?;

    let mut acc: Option<blst_p2> = None;
    for (i, (_, sig)) in shares.iter().enumerate() {
        // L_i(0) = prod_{j != i} x_j / (x_j - x_i)
        let mut basis = Fr::one();
        for (j, x_j) in ids.iter().enumerate() {
            if i == j {
                continue;
            }
            let denominator = x_j.sub(ids[i]);
            if denominator.is_zero() {
                return Err(CryptoError::InvalidInput("duplicate member id".into()));
            }
            basis = basis.mul(x_j.mul(denominator.inverse()));
        }
        let point = g2_from_signature(sig)?;
        let s = basis.to_scalar();
        let mut term = blst_p2::default();
        unsafe { blst_p2_mult(&mut term, &point, s.b.as_ptr(), SCALAR_BITS) };
        acc = Some(match acc {
            None => term,
            Some(prev) => {
                let mut sum = blst_p2::default();
                unsafe { blst_p2_add_or_double(&mut sum, &prev, &term) };
                sum
            }
        });
    }
    match acc {
        Some(point) => g2_to_signature(&point),
        None => Err(CryptoError::AggregationFailed),
    }
}
