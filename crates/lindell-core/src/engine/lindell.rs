//! Two-party ECDSA engine (Lindell 2017) over secp256k1

use super::{
    ClientShare, Decommitment, DLogProof, EphemeralKeyPair, PartialSignatureInput, RawSignature,
    Round1Result, Round2Result, ServerFirstMessage, SigningEngine,
};
use crate::paillier::EncryptionKey;
use crate::types::{point_from_bytes, point_to_bytes, scalar_from_biguint, scalar_to_biguint, Curve};
use crate::{Error, Result};
use k256::{
    elliptic_curve::{bigint::U256, ops::Reduce, point::AffineCoordinates, Field},
    AffinePoint, ProjectivePoint, Scalar,
};
use num_bigint::{BigUint, RandBigInt};
use rand::rngs::OsRng;
use tracing::debug;

const SERVER_PROOF_LABEL: &[u8] = b"server-ephemeral";
const CLIENT_PROOF_LABEL: &[u8] = b"client-ephemeral";

/// `r = x(R) mod q`
pub(crate) fn r_scalar(point: &AffinePoint) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&point.x())
}

/// Production engine, drawing all randomness from the OS
#[derive(Debug, Clone, Copy)]
pub struct LindellEngine {
    curve: Curve,
}

impl LindellEngine {
    pub fn new() -> Self {
        Self {
            curve: Curve::Secp256k1,
        }
    }
}

impl Default for LindellEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningEngine for LindellEngine {
    fn generate_ephemeral(&self) -> Result<Round1Result> {
        let secret = Scalar::random(&mut OsRng);
        let public = ProjectivePoint::GENERATOR * secret;
        let proof = DLogProof::prove(SERVER_PROOF_LABEL, &secret, &public, &mut OsRng);

        Ok(Round1Result {
            first_message: ServerFirstMessage {
                public_share: point_to_bytes(&public),
                proof,
            },
            key_pair: EphemeralKeyPair { secret, public },
        })
    }

    fn compute_partial_signature(&self, input: &PartialSignatureInput<'_>) -> Result<Round2Result> {
        let ek = EncryptionKey::from_bytes(input.paillier_n)
            .map_err(|e| Error::MalformedMessage(format!("Paillier modulus: {}", e)))?;
        let encrypted_share = BigUint::from_bytes_be(input.encrypted_share);
        if !ek.is_valid_ciphertext(&encrypted_share) {
            return Err(Error::MalformedMessage("encrypted share is not a valid ciphertext".into()));
        }

        let server_first = input.server_first_message;
        let r1 = point_from_bytes(&server_first.public_share)
            .map_err(|_| Error::InvalidPeerProof("server ephemeral share is not a curve point".into()))?;
        server_first.proof.verify(SERVER_PROOF_LABEL, &r1)?;

        let k2 = Scalar::random(&mut OsRng);
        let r2 = ProjectivePoint::GENERATOR * k2;
        let proof = DLogProof::prove(CLIENT_PROOF_LABEL, &k2, &r2, &mut OsRng);
        let decommitment = Decommitment::new(point_to_bytes(&r2), proof, &mut OsRng);
        let commitment = decommitment.commit().to_vec();

        let r = r_scalar(&(r1 * k2).to_affine());
        let k2_inv = Option::<Scalar>::from(k2.invert())
            .ok_or_else(|| Error::Internal("zero ephemeral nonce".into()))?;
        let m = input.message.to_scalar();

        // c3 = Enc(ρ·q + k2⁻¹(m + r·w2)) ⊕ Enc(w1)^(k2⁻¹·r)
        let q = self.curve.order();
        let rho = OsRng.gen_biguint_below(&(&q * &q));
        let partial = rho * &q + scalar_to_biguint(&(k2_inv * (m + r * input.client_share.secret)));
        let c1 = ek
            .encrypt(&partial, &mut OsRng)
            .map_err(|e| Error::MalformedMessage(format!("Paillier modulus too small: {}", e)))?;
        let v = scalar_to_biguint(&(k2_inv * r));
        let c2 = ek
            .mul_plain(&encrypted_share, &v)
            .map_err(|e| Error::MalformedMessage(e.to_string()))?;
        let c3 = ek
            .add(&c1, &c2)
            .map_err(|e| Error::MalformedMessage(e.to_string()))?;

        debug!(
            modulus_bits = ek.bits(),
            client_public = hex::encode(point_to_bytes(&input.client_share.public)),
            "Computed encrypted partial signature"
        );

        Ok(Round2Result {
            commitment,
            decommitment,
            partial_signature: c3.to_bytes_be(),
        })
    }

    fn finalize_signature(
        &self,
        plain_partial_signature: &BigUint,
        round1: &Round1Result,
        round2: &Round2Result,
    ) -> Result<RawSignature> {
        let decommitment = &round2.decommitment;
        if !decommitment.opens(&round2.commitment) {
            return Err(Error::MalformedCombination("commitment does not open".into()));
        }

        let r2 = point_from_bytes(&decommitment.public_share).map_err(|_| {
            Error::MalformedCombination("client ephemeral share is not a curve point".into())
        })?;
        decommitment
            .proof
            .verify(CLIENT_PROOF_LABEL, &r2)
            .map_err(|e| Error::MalformedCombination(e.to_string()))?;

        let k1 = round1.key_pair.secret;
        let k1_inv = Option::<Scalar>::from(k1.invert())
            .ok_or_else(|| Error::MalformedCombination("zero ephemeral nonce".into()))?;

        let r_point = (r2 * k1).to_affine();
        let s = k1_inv * scalar_from_biguint(plain_partial_signature, self.curve);
        if bool::from(s.is_zero()) {
            return Err(Error::MalformedCombination("partial signature reduces to zero".into()));
        }

        Ok(RawSignature { r_point, s })
    }
}
