//! Schnorr proof of discrete log and the client's hash commitment

use crate::types::{point_from_bytes, point_to_bytes};
use crate::{Error, Result};
use k256::{
    elliptic_curve::{bigint::U256, ops::Reduce, Field, PrimeField},
    FieldBytes, ProjectivePoint, Scalar,
};
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Proof of knowledge of `x` such that `P = x·G`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DLogProof {
    /// `T = t·G` (compressed)
    pub commitment: Vec<u8>,
    /// `z = t + c·x`
    pub response: Vec<u8>,
}

impl DLogProof {
    pub fn prove<R: RngCore + CryptoRng>(
        label: &'static [u8],
        secret: &Scalar,
        public: &ProjectivePoint,
        rng: &mut R,
    ) -> Self {
        let t = Scalar::random(rng);
        let commitment = point_to_bytes(&(ProjectivePoint::GENERATOR * t));
        let c = challenge(label, public, &commitment);
        let z = t + c * secret;

        Self {
            commitment,
            response: z.to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, label: &'static [u8], public: &ProjectivePoint) -> Result<()> {
        let t_point = point_from_bytes(&self.commitment)
            .map_err(|_| Error::InvalidPeerProof("proof commitment is not a curve point".into()))?;
        if self.response.len() != 32 {
            return Err(Error::InvalidPeerProof("proof response has wrong length".into()));
        }
        let z = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(&self.response)))
            .ok_or_else(|| Error::InvalidPeerProof("proof response out of range".into()))?;

        let c = challenge(label, public, &self.commitment);
        let lhs = ProjectivePoint::GENERATOR * z;
        let rhs = t_point + *public * c;

        if lhs != rhs {
            return Err(Error::InvalidPeerProof("discrete log proof does not verify".into()));
        }
        Ok(())
    }
}

fn challenge(label: &'static [u8], public: &ProjectivePoint, commitment: &[u8]) -> Scalar {
    let mut transcript = Transcript::new(b"lindell-dlog");
    transcript.append_message(b"role", label);
    transcript.append_message(b"public", &point_to_bytes(public));
    transcript.append_message(b"commitment", commitment);

    let mut bytes = [0u8; 32];
    transcript.challenge_bytes(b"challenge", &mut bytes);
    <Scalar as Reduce<U256>>::reduce_bytes(&bytes.into())
}

/// Opening of the client's commitment to `R2`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decommitment {
    /// `R2` (compressed)
    pub public_share: Vec<u8>,
    pub blinding: Vec<u8>,
    pub proof: DLogProof,
}

impl Decommitment {
    pub fn new<R: RngCore + CryptoRng>(public_share: Vec<u8>, proof: DLogProof, rng: &mut R) -> Self {
        let mut blinding = [0u8; 32];
        rng.fill_bytes(&mut blinding);
        Self {
            public_share,
            blinding: blinding.to_vec(),
            proof,
        }
    }

    /// `SHA-256` over length-prefixed fields
    pub fn commit(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"lindell-commitment");
        for field in [
            self.public_share.as_slice(),
            self.proof.commitment.as_slice(),
            self.proof.response.as_slice(),
            self.blinding.as_slice(),
        ] {
            hasher.update((field.len() as u32).to_be_bytes());
            hasher.update(field);
        }
        hasher.finalize().into()
    }

    pub fn opens(&self, commitment: &[u8]) -> bool {
        bool::from(self.commit()[..].ct_eq(commitment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    const LABEL: &[u8] = b"test";

    #[test]
    fn test_proof_verifies() {
        let x = Scalar::random(&mut OsRng);
        let p = ProjectivePoint::GENERATOR * x;
        let proof = DLogProof::prove(LABEL, &x, &p, &mut OsRng);

        assert!(proof.verify(LABEL, &p).is_ok());
    }

    #[test]
    fn test_proof_bound_to_statement() {
        let x = Scalar::random(&mut OsRng);
        let p = ProjectivePoint::GENERATOR * x;
        let proof = DLogProof::prove(LABEL, &x, &p, &mut OsRng);

        let other = ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng);
        assert!(matches!(proof.verify(LABEL, &other), Err(Error::InvalidPeerProof(_))));
        assert!(proof.verify(b"other", &p).is_err());

        let mut forged = proof.clone();
        forged.response[31] ^= 1;
        assert!(forged.verify(LABEL, &p).is_err());

        let mut short = proof;
        short.response.pop();
        assert!(short.verify(LABEL, &p).is_err());
    }

    #[test]
    fn test_commitment_opens_only_to_itself() {
        let x = Scalar::random(&mut OsRng);
        let p = ProjectivePoint::GENERATOR * x;
        let proof = DLogProof::prove(LABEL, &x, &p, &mut OsRng);
        let decommitment = Decommitment::new(point_to_bytes(&p), proof, &mut OsRng);
        let commitment = decommitment.commit();

        assert!(decommitment.opens(&commitment));
        assert!(!decommitment.opens(&commitment[..31]));

        let mut tampered = decommitment.clone();
        tampered.blinding[0] ^= 0xff;
        assert!(!tampered.opens(&commitment));
    }
}
