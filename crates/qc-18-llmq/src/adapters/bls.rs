//! `BlsWorker` backed by the workspace BLS12-381 implementation.

use std::sync::Arc;

use shared_crypto::{ies, threshold, CryptoError, CryptoResult};
use shared_types::{Hash, ProTxHash};

use crate::domain::{BlsPublicKey, BlsSecretKey, BlsSignature, VerificationVector};
use crate::ports::BlsWorker;

type CurveSecretKey = shared_crypto::BlsSecretKey;
type CurvePublicKey = shared_crypto::BlsPublicKey;
type CurveSignature = shared_crypto::BlsSignature;

fn secret(sk: &BlsSecretKey) -> CryptoResult<CurveSecretKey> {
    CurveSecretKey::from_bytes(&sk.0)
}

fn public(pk: &BlsPublicKey) -> CryptoResult<CurvePublicKey> {
    CurvePublicKey::from_bytes(&pk.0)
}

fn signature(sig: &BlsSignature) -> CryptoResult<CurveSignature> {
    CurveSignature::from_bytes(&sig.0)
}

fn publics(pks: &[BlsPublicKey]) -> CryptoResult<Vec<CurvePublicKey>> {
    pks.iter().map(public).collect()
}

fn to_vvec(keys: Vec<CurvePublicKey>) -> VerificationVector {
    keys.iter().map(|k| BlsPublicKey(k.to_bytes())).collect()
}

/// Stateless worker; every call decodes its inputs, so malformed points are
/// rejected where they are used.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlstWorker;

impl BlstWorker {
    /// Shared handle.
    pub fn shared() -> Arc<dyn BlsWorker> {
        Arc::new(Self)
    }
}

impl BlsWorker for BlstWorker {
    fn public_key(&self, sk: &BlsSecretKey) -> CryptoResult<BlsPublicKey> {
        Ok(BlsPublicKey(secret(sk)?.public_key().to_bytes()))
    }

    fn sign(&self, sk: &BlsSecretKey, msg: &Hash) -> CryptoResult<BlsSignature> {
        Ok(BlsSignature(secret(sk)?.sign(msg).to_bytes()))
    }

    fn is_valid_public_key(&self, pk: &BlsPublicKey) -> bool {
        !pk.is_null() && public(pk).is_ok()
    }

    fn is_valid_signature(&self, sig: &BlsSignature) -> bool {
        !sig.is_null() && signature(sig).is_ok()
    }

    fn verify_insecure(&self, pk: &BlsPublicKey, msg: &Hash, sig: &BlsSignature) -> bool {
        match (public(pk), signature(sig)) {
            (Ok(pk), Ok(sig)) => pk.verify(msg, &sig),
            _ => false,
        }
    }

    fn verify_secure_aggregated(
        &self,
        pks: &[BlsPublicKey],
        msg: &Hash,
        sig: &BlsSignature,
    ) -> bool {
        match (publics(pks), signature(sig)) {
            (Ok(pks), Ok(sig)) => sig.verify_aggregate(&pks, msg),
            _ => false,
        }
    }

    fn aggregate_signatures(&self, sigs: &[BlsSignature]) -> CryptoResult<BlsSignature> {
        let sigs = sigs.iter().map(signature).collect::<CryptoResult<Vec<_>>>()?;
        Ok(BlsSignature(CurveSignature::aggregate(&sigs)?.to_bytes()))
    }

    fn aggregate_secret_keys(&self, sks: &[BlsSecretKey]) -> CryptoResult<BlsSecretKey> {
        let sks = sks.iter().map(secret).collect::<CryptoResult<Vec<_>>>()?;
        Ok(BlsSecretKey(threshold::aggregate_secret_keys(&sks)?.to_bytes()))
    }

    fn build_quorum_verification_vector(
        &self,
        vvecs: &[Arc<VerificationVector>],
    ) -> CryptoResult<VerificationVector> {
        let vvecs = vvecs
            .iter()
            .map(|v| publics(v))
            .collect::<CryptoResult<Vec<_>>>()?;
        Ok(to_vvec(threshold::aggregate_verification_vectors(&vvecs)?))
    }

    fn build_public_key_share(
        &self,
        vvec: &[BlsPublicKey],
        id: &ProTxHash,
    ) -> CryptoResult<BlsPublicKey> {
        let share = threshold::public_key_share(&publics(vvec)?, id)?;
        Ok(BlsPublicKey(share.to_bytes()))
    }

    fn generate_contribution(
        &self,
        threshold: usize,
        ids: &[ProTxHash],
    ) -> CryptoResult<(VerificationVector, Vec<BlsSecretKey>)> {
        let coefficients = threshold::generate_polynomial(threshold)?;
        let shares = ids
            .iter()
            .map(|id| {
                threshold::secret_share(&coefficients, id).map(|s| BlsSecretKey(s.to_bytes()))
            })
            .collect::<CryptoResult<Vec<_>>>()?;
        Ok((to_vvec(threshold::verification_vector(&coefficients)), shares))
    }

    fn recover_threshold_signature(
        &self,
        shares: &[(ProTxHash, BlsSignature)],
    ) -> CryptoResult<BlsSignature> {
        let shares = shares
            .iter()
            .map(|(id, sig)| signature(sig).map(|s| (*id, s)))
            .collect::<CryptoResult<Vec<_>>>()?;
        Ok(BlsSignature(threshold::recover_signature(&shares)?.to_bytes()))
    }

    fn encrypt_for_member(
        &self,
        recipient: &BlsPublicKey,
        contribution: &BlsSecretKey,
    ) -> CryptoResult<Vec<u8>> {
        ies::encrypt(&public(recipient)?, &contribution.0)
    }

    fn decrypt_for_member(
        &self,
        operator_key: &BlsSecretKey,
        sealed: &[u8],
    ) -> CryptoResult<BlsSecretKey> {
        let plain = zeroize::Zeroizing::new(ies::decrypt(&secret(operator_key)?, sealed)?);
        let bytes = <[u8; 32]>::try_from(plain.as_slice()).map_err(|_| {
            CryptoError::DecryptionFailed(format!("contribution has {} bytes", plain.len()))
        })?;
        CurveSecretKey::from_bytes(&bytes)?;
        Ok(BlsSecretKey(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> BlsSecretKey {
        BlsSecretKey(CurveSecretKey::generate().unwrap().to_bytes())
    }

    #[test]
    fn test_contribution_shares_match_vvec() {
        let worker = BlstWorker;
        let ids = [[1u8; 32], [2u8; 32], [3u8; 32]];
        let (vvec, shares) = worker.generate_contribution(2, &ids).unwrap();
        assert_eq!(vvec.len(), 2);
        for (id, share) in ids.iter().zip(&shares) {
            assert!(worker.verify_contribution_share(id, share, &vvec));
        }
        assert!(!worker.verify_contribution_share(&ids[0], &shares[1], &vvec));
    }

    #[test]
    fn test_threshold_signature_recovers_quorum_signature() {
        let worker = BlstWorker;
        let ids = [[1u8; 32], [2u8; 32], [3u8; 32]];
        let (vvec_a, shares_a) = worker.generate_contribution(2, &ids).unwrap();
        let (vvec_b, shares_b) = worker.generate_contribution(2, &ids).unwrap();
        let quorum_vvec = worker
            .build_quorum_verification_vector(&[Arc::new(vvec_a), Arc::new(vvec_b)])
            .unwrap();

        let msg = [9u8; 32];
        let sig_shares: Vec<_> = [0usize, 2]
            .iter()
            .map(|&i| {
                let sk = worker
                    .aggregate_secret_keys(&[shares_a[i].clone(), shares_b[i].clone()])
                    .unwrap();
                assert_eq!(
                    worker.public_key(&sk).unwrap(),
                    worker.build_public_key_share(&quorum_vvec, &ids[i]).unwrap()
                );
                (ids[i], worker.sign(&sk, &msg).unwrap())
            })
            .collect();
        let recovered = worker.recover_threshold_signature(&sig_shares).unwrap();
        assert!(worker.verify_insecure(&quorum_vvec[0], &msg, &recovered));
    }

    #[test]
    fn test_contribution_encryption_roundtrip() {
        let worker = BlstWorker;
        let operator = key();
        let operator_pk = worker.public_key(&operator).unwrap();
        let contribution = key();

        let sealed = worker.encrypt_for_member(&operator_pk, &contribution).unwrap();
        assert_eq!(worker.decrypt_for_member(&operator, &sealed).unwrap(), contribution);
        assert!(worker.decrypt_for_member(&key(), &sealed).is_err());
    }

    #[test]
    fn test_null_points_rejected() {
        let worker = BlstWorker;
        assert!(!worker.is_valid_public_key(&BlsPublicKey::NULL));
        assert!(!worker.is_valid_signature(&BlsSignature::NULL));
    }
}
