//! Non-hardened BIP32 derivation of the joint key
//!
//! Both parties only know the joint public key, so derivation is limited to
//! non-hardened indices. The result is a public scalar offset that each party
//! adds to its share before signing.

use crate::types::{point_from_bytes, point_to_bytes};
use crate::{Error, Result};
use derivation_path::{ChildIndex, DerivationPath};
use hmac::{Hmac, Mac};
use k256::{
    elliptic_curve::{bigint::U256, ops::Reduce},
    ProjectivePoint, Scalar,
};
use sha2::Sha512;

/// A derived child of the joint key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    /// Offset to add to the parent secret
    pub delta: Scalar,
    /// Child public key (compressed)
    pub public_key: Vec<u8>,
    /// Child chain code
    pub chain_code: [u8; 32],
}

impl DerivedKey {
    pub fn public_key_point(&self) -> Result<ProjectivePoint> {
        point_from_bytes(&self.public_key)
    }
}

/// Derive the child of `public_key` along `path` (e.g. `m/0/7`)
pub fn derive_child(public_key: &[u8], chain_code: [u8; 32], path: &str) -> Result<DerivedKey> {
    let derivation_path: DerivationPath = path
        .parse()
        .map_err(|e| Error::Derivation(format!("Invalid path: {}", e)))?;

    let mut point = point_from_bytes(public_key)?;
    let mut current_chain_code = chain_code;
    let mut delta = Scalar::ZERO;

    for child_index in derivation_path.path().iter() {
        let index = match child_index {
            ChildIndex::Normal(idx) => *idx,
            ChildIndex::Hardened(_) => {
                return Err(Error::Derivation(
                    "Hardened derivation not supported in threshold setting".into(),
                ));
            }
        };

        let (tweak, next_chain_code) = derive_non_hardened(&point, current_chain_code, index)?;
        point += ProjectivePoint::GENERATOR * tweak;
        delta += tweak;
        current_chain_code = next_chain_code;
    }

    Ok(DerivedKey {
        delta,
        public_key: point_to_bytes(&point),
        chain_code: current_chain_code,
    })
}

/// One CKDpub step: `HMAC-SHA512(chain_code, ser_P(parent) || index)`
fn derive_non_hardened(
    parent: &ProjectivePoint,
    chain_code: [u8; 32],
    index: u32,
) -> Result<(Scalar, [u8; 32])> {
    let mut hmac = Hmac::<Sha512>::new_from_slice(&chain_code)
        .map_err(|e| Error::Derivation(e.to_string()))?;

    hmac.update(&point_to_bytes(parent));
    hmac.update(&index.to_be_bytes());

    let result = hmac.finalize().into_bytes();

    let mut secret_bytes = [0u8; 32];
    secret_bytes.copy_from_slice(&result[..32]);
    let tweak = <Scalar as Reduce<U256>>::reduce_bytes(&secret_bytes.into());

    let mut next_chain_code = [0u8; 32];
    next_chain_code.copy_from_slice(&result[32..]);

    Ok((tweak, next_chain_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> (Scalar, Vec<u8>) {
        let secret = Scalar::from(0x5eed_u64);
        (secret, point_to_bytes(&(ProjectivePoint::GENERATOR * secret)))
    }

    #[test]
    fn test_child_matches_tweaked_secret() {
        let (secret, public_key) = parent();
        let child = derive_child(&public_key, [4u8; 32], "m/0/7").unwrap();

        let expected = ProjectivePoint::GENERATOR * (secret + child.delta);
        assert_eq!(child.public_key_point().unwrap(), expected);
        assert_ne!(child.chain_code, [4u8; 32]);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let (_, public_key) = parent();
        let a = derive_child(&public_key, [1u8; 32], "m/44/60").unwrap();
        let b = derive_child(&public_key, [1u8; 32], "m/44/60").unwrap();
        let c = derive_child(&public_key, [1u8; 32], "m/44/61").unwrap();

        assert_eq!(a, b);
        assert_ne!(a.delta, c.delta);
    }

    #[test]
    fn test_hardened_rejected() {
        let (_, public_key) = parent();
        assert!(matches!(
            derive_child(&public_key, [0u8; 32], "m/44'/0"),
            Err(Error::Derivation(_))
        ));
        assert!(derive_child(&public_key, [0u8; 32], "not a path").is_err());
    }
}
