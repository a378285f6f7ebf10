//! Turns the engine's raw `(R, s)` into a canonical, verified signature

use crate::engine::RawSignature;
use crate::types::{scalar_to_biguint, Curve, MessageDigest, SignatureResult};
use crate::{Error, Result};
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey},
    elliptic_curve::point::AffineCoordinates,
    AffinePoint, ProjectivePoint,
};
use num_bigint::BigUint;
use num_traits::Zero;

/// Low-S form: `s > q/2` becomes `q - s`. Returns whether it flipped.
pub fn normalize_s(s: &BigUint, order: &BigUint) -> (BigUint, bool) {
    let half: BigUint = order >> 1;
    if s > &half {
        (order - s, true)
    } else {
        (s.clone(), false)
    }
}

/// Recovery id of an ephemeral point before normalization.
/// Bit 0 is the parity of `y(R)`, bit 1 is set when `x(R) >= q`.
pub fn recovery_id(r_point: &AffinePoint, order: &BigUint) -> u8 {
    let x = BigUint::from_bytes_be(r_point.x().as_slice());

    let mut id = r_point.y_is_odd().unwrap_u8();
    if &x >= order {
        id |= 2;
    }
    id
}

/// Left-pad a big-endian integer to `len` bytes
pub fn pad_to_length(bytes: &[u8], len: usize) -> Result<Vec<u8>> {
    if bytes.len() > len {
        return Err(Error::Internal(format!(
            "{} bytes do not fit in {}",
            bytes.len(),
            len
        )));
    }
    let mut out = vec![0u8; len];
    out[len - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

fn fixed_width(value: &BigUint, curve: Curve) -> Result<[u8; 32]> {
    let padded = pad_to_length(&value.to_bytes_be(), curve.byte_len())?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&padded);
    Ok(out)
}

/// Normalize, attach the recovery id and verify against `public_key`
pub fn finish_signature(
    raw: &RawSignature,
    digest: &MessageDigest,
    public_key: &ProjectivePoint,
    curve: Curve,
) -> Result<SignatureResult> {
    let order = curve.order();

    let r = BigUint::from_bytes_be(raw.r_point.x().as_slice()) % &order;
    let s = scalar_to_biguint(&raw.s);
    if r.is_zero() || s.is_zero() {
        return Err(Error::InvalidSignature);
    }

    let mut recovery = recovery_id(&raw.r_point, &order);
    let (s, flipped) = normalize_s(&s, &order);
    if flipped {
        recovery ^= 1;
    }

    let result = SignatureResult {
        r: fixed_width(&r, curve)?,
        s: fixed_width(&s, curve)?,
        recovery_id: recovery,
        message: *digest,
    };

    verify(&result, public_key)?;
    Ok(result)
}

/// Standard ECDSA verification of a finished signature
pub fn verify(signature: &SignatureResult, public_key: &ProjectivePoint) -> Result<()> {
    let verifying_key =
        VerifyingKey::from_affine(public_key.to_affine()).map_err(|_| Error::InvalidSignature)?;
    let ecdsa = signature.to_ecdsa()?;
    verifying_key
        .verify_prehash(signature.message.as_bytes(), &ecdsa)
        .map_err(|_| Error::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::scalar_from_biguint;
    use k256::{elliptic_curve::Field, Scalar};
    use rand::rngs::OsRng;

    #[test]
    fn test_normalize_s() {
        let q = Curve::Secp256k1.order();
        let half: BigUint = &q >> 1;

        assert_eq!(normalize_s(&half, &q), (half.clone(), false));
        assert_eq!(normalize_s(&(&half + 1u32), &q), (half.clone(), true));
        assert_eq!(normalize_s(&(&q - 1u32), &q), (BigUint::from(1u32), true));
        assert_eq!(normalize_s(&BigUint::from(1u32), &q), (BigUint::from(1u32), false));
    }

    #[test]
    fn test_pad_to_length() {
        assert_eq!(pad_to_length(&[1, 2], 4).unwrap(), vec![0, 0, 1, 2]);
        assert_eq!(pad_to_length(&[], 2).unwrap(), vec![0, 0]);
        assert!(pad_to_length(&[1, 2, 3], 2).is_err());
    }

    /// What a single signer holding `secret` would produce with nonce `k`
    fn raw_signature(secret: Scalar, k: Scalar, digest: &MessageDigest) -> RawSignature {
        let r_point = (ProjectivePoint::GENERATOR * k).to_affine();
        let r = scalar_from_biguint(
            &BigUint::from_bytes_be(r_point.x().as_slice()),
            Curve::Secp256k1,
        );
        let k_inv = Option::<Scalar>::from(k.invert()).unwrap();
        let s = k_inv * (digest.to_scalar() + r * secret);
        RawSignature { r_point, s }
    }

    #[test]
    fn test_finish_recovers_public_key() {
        let digest = MessageDigest::from_u64(42);
        for _ in 0..8 {
            let secret = Scalar::random(&mut OsRng);
            let public = ProjectivePoint::GENERATOR * secret;
            let raw = raw_signature(secret, Scalar::random(&mut OsRng), &digest);

            let result = finish_signature(&raw, &digest, &public, Curve::Secp256k1).unwrap();
            let s = BigUint::from_bytes_be(&result.s);
            assert!(s <= Curve::Secp256k1.order() >> 1);

            let recovered = result.recover_verifying_key().unwrap();
            assert_eq!(recovered, VerifyingKey::from_affine(public.to_affine()).unwrap());
        }
    }

    #[test]
    fn test_finish_rejects_wrong_key() {
        let digest = MessageDigest::from_u64(7);
        let secret = Scalar::random(&mut OsRng);
        let raw = raw_signature(secret, Scalar::random(&mut OsRng), &digest);
        let other = ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng);

        assert!(matches!(
            finish_signature(&raw, &digest, &other, Curve::Secp256k1),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn test_finish_rejects_identity_point() {
        let digest = MessageDigest::from_u64(3);
        let raw = RawSignature {
            r_point: AffinePoint::IDENTITY,
            s: Scalar::ONE,
        };
        let public = ProjectivePoint::GENERATOR * Scalar::from(5u64);

        assert_eq!(recovery_id(&AffinePoint::IDENTITY, &Curve::Secp256k1.order()), 0);
        assert!(matches!(
            finish_signature(&raw, &digest, &public, Curve::Secp256k1),
            Err(Error::InvalidSignature)
        ));
    }
}
