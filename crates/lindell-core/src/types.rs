//! Core types for the two-party signing ceremony

use crate::paillier::DecryptionKey;
use crate::{Error, Result};
use k256::{
    ecdsa::{self, RecoveryId, VerifyingKey},
    elliptic_curve::{
        bigint::U256,
        ops::Reduce,
        sec1::{FromEncodedPoint, ToEncodedPoint},
    },
    AffinePoint, ProjectivePoint, Scalar,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use msg_relay::SessionId;

/// Index of a party in the ceremony
pub type PartyId = usize;

/// Order of the secp256k1 group, big-endian hex
const SECP256K1_ORDER_HEX: &[u8] =
    b"FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141";

/// The single curve the ceremony signs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    Secp256k1,
}

impl Curve {
    pub fn name(&self) -> &'static str {
        match self {
            Curve::Secp256k1 => "secp256k1",
        }
    }

    /// Width of an encoded scalar
    pub fn byte_len(&self) -> usize {
        match self {
            Curve::Secp256k1 => 32,
        }
    }

    /// Group order `q`
    pub fn order(&self) -> BigUint {
        match self {
            Curve::Secp256k1 => BigUint::parse_bytes(SECP256K1_ORDER_HEX, 16)
                .unwrap_or_default(),
        }
    }
}

/// A 32-byte message digest, read as a big-endian integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageDigest([u8; 32]);

impl MessageDigest {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Left-pads a short big-endian integer to 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > 32 {
            return Err(Error::InvalidConfig(format!(
                "digest is {} bytes, expected at most 32",
                bytes.len()
            )));
        }
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn from_u64(value: u64) -> Self {
        let mut out = [0u8; 32];
        out[24..].copy_from_slice(&value.to_be_bytes());
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Digest as a field element. Only meaningful once `is_in_range` holds.
    pub fn to_scalar(&self) -> Scalar {
        <Scalar as Reduce<U256>>::reduce_bytes(&self.0.into())
    }

    /// `m < q`
    pub fn is_in_range(&self, curve: Curve) -> bool {
        self.to_biguint() < curve.order()
    }
}

/// Final ECDSA signature produced by the server role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResult {
    /// R component
    pub r: [u8; 32],
    /// S component, always in low-S form
    pub s: [u8; 32],
    /// Recovery ID (0..=3)
    pub recovery_id: u8,
    /// The digest that was signed
    pub message: MessageDigest,
}

impl SignatureResult {
    /// Convert to bytes (r || s)
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }

    pub fn to_ecdsa(&self) -> Result<ecdsa::Signature> {
        ecdsa::Signature::from_scalars(
            *k256::FieldBytes::from_slice(&self.r),
            *k256::FieldBytes::from_slice(&self.s),
        )
        .map_err(|_| Error::InvalidSignature)
    }

    /// Convert to DER format
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_ecdsa()?.to_der().as_bytes().to_vec())
    }

    /// Recover the signer's verifying key from the recovery id
    pub fn recover_verifying_key(&self) -> Result<VerifyingKey> {
        let recovery_id = RecoveryId::from_byte(self.recovery_id)
            .ok_or_else(|| Error::Crypto(format!("invalid recovery id {}", self.recovery_id)))?;
        VerifyingKey::recover_from_prehash(self.message.as_bytes(), &self.to_ecdsa()?, recovery_id)
            .map_err(|e| Error::Crypto(e.to_string()))
    }
}

/// What a party's terminal channel yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningOutput {
    /// Server role: the finished signature
    Signature(SignatureResult),
    /// Client role: the ceremony finished, the signature lives with the server
    Completed,
}

impl SigningOutput {
    pub fn signature(&self) -> Option<&SignatureResult> {
        match self {
            SigningOutput::Signature(sig) => Some(sig),
            SigningOutput::Completed => None,
        }
    }

    pub fn into_signature(self) -> Option<SignatureResult> {
        match self {
            SigningOutput::Signature(sig) => Some(sig),
            SigningOutput::Completed => None,
        }
    }
}

/// Key share held by a party after key generation
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    /// This party's index
    pub party_id: PartyId,

    /// Share identifiers (interpolation points) of every party, by index
    #[zeroize(skip)]
    #[serde(with = "scalar_vec_serde")]
    pub share_ids: Vec<Scalar>,

    /// This party's secret share (x_i)
    #[serde(with = "scalar_serde")]
    pub secret_share: Scalar,

    /// Joint public key (compressed)
    pub public_key: Vec<u8>,

    /// Chain code for BIP32 derivation
    pub chain_code: [u8; 32],

    /// Paillier decryption key, held by the server role only
    #[zeroize(skip)]
    pub paillier: Option<DecryptionKey>,
}

impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShare")
            .field("party_id", &self.party_id)
            .field("public_key", &hex::encode(&self.public_key))
            .field("has_paillier", &self.paillier.is_some())
            .finish_non_exhaustive()
    }
}

mod scalar_serde {
    use k256::{elliptic_curve::{bigint::U256, ops::Reduce}, Scalar};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes = scalar.to_bytes();
        serializer.serialize_bytes(bytes.as_slice())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Scalar, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid scalar length"))?;
        Ok(<Scalar as Reduce<U256>>::reduce_bytes(&array.into()))
    }
}

mod scalar_vec_serde {
    use k256::{elliptic_curve::{bigint::U256, ops::Reduce}, Scalar};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(scalars: &[Scalar], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: Vec<Vec<u8>> = scalars.iter().map(|s| s.to_bytes().to_vec()).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Scalar>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Vec<Vec<u8>> = Vec::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|bytes| {
                let array: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("Invalid scalar length"))?;
                Ok(<Scalar as Reduce<U256>>::reduce_bytes(&array.into()))
            })
            .collect()
    }
}

impl KeyShare {
    /// Get the public key as a ProjectivePoint
    pub fn public_key_point(&self) -> Result<ProjectivePoint> {
        point_from_bytes(&self.public_key)
    }

    /// Parse a key share from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Derive a non-hardened child of the joint key (see [`crate::derivation`])
    pub fn derive_child(&self, path: &str) -> Result<crate::derivation::DerivedKey> {
        crate::derivation::derive_child(&self.public_key, self.chain_code, path)
    }
}

/// Which side of the ceremony a party plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Holds the Paillier key, decrypts and finishes the signature
    Server,
    /// Computes the encrypted partial signature
    Client,
}

/// Ceremony-wide, read-only parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningParameters {
    /// Curve identifier
    pub curve: Curve,
    /// Session identifier, agreed by both parties
    pub session_id: SessionId,
    /// Participating party IDs, in order
    pub parties: Vec<PartyId>,
    /// Number of parties
    pub party_count: usize,
    /// Threshold (t, so t + 1 shares sign)
    pub threshold: usize,
    /// This party's ID
    pub party_id: PartyId,
    /// This party's role
    pub role: Role,
}

impl SigningParameters {
    /// Validated two-party parameters
    pub fn new(
        curve: Curve,
        session_id: SessionId,
        parties: Vec<PartyId>,
        party_count: usize,
        threshold: usize,
        party_id: PartyId,
        role: Role,
    ) -> Result<Self> {
        if party_count != 2 {
            return Err(Error::InvalidConfig(format!(
                "exactly two parties sign, got {}",
                party_count
            )));
        }
        if parties.len() != party_count {
            return Err(Error::InvalidConfig(format!(
                "party list has {} entries, party count is {}",
                parties.len(),
                party_count
            )));
        }
        if threshold != 1 {
            return Err(Error::InvalidConfig(format!(
                "threshold must be 1 for two parties, got {}",
                threshold
            )));
        }
        if parties[0] == parties[1] {
            return Err(Error::InvalidConfig("duplicate party ID".into()));
        }
        if let Some(bad) = parties.iter().find(|p| **p >= party_count) {
            return Err(Error::InvalidPartyId(*bad));
        }
        if !parties.contains(&party_id) {
            return Err(Error::InvalidPartyId(party_id));
        }

        Ok(Self {
            curve,
            session_id,
            parties,
            party_count,
            threshold,
            party_id,
            role,
        })
    }

    /// Two-party secp256k1 parameters with party 0 as the server
    pub fn two_party(session_id: SessionId, party_id: PartyId) -> Result<Self> {
        let role = if party_id == 0 { Role::Server } else { Role::Client };
        Self::new(Curve::Secp256k1, session_id, vec![0, 1], 2, 1, party_id, role)
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    /// The peer's ID
    pub fn other_party(&self) -> PartyId {
        self.parties
            .iter()
            .copied()
            .find(|p| *p != self.party_id)
            .unwrap_or(self.party_id)
    }
}

/// Decode a SEC1 point
pub fn point_from_bytes(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded = k256::EncodedPoint::from_bytes(bytes)
        .map_err(|e| Error::Deserialization(e.to_string()))?;
    let affine_opt = AffinePoint::from_encoded_point(&encoded);
    let affine: AffinePoint = Option::<AffinePoint>::from(affine_opt)
        .ok_or_else(|| Error::Deserialization("Invalid curve point".into()))?;
    if affine == AffinePoint::IDENTITY {
        return Err(Error::Deserialization("Identity point".into()));
    }
    Ok(ProjectivePoint::from(affine))
}

/// Compressed SEC1 encoding
pub fn point_to_bytes(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

pub fn scalar_to_biguint(scalar: &Scalar) -> BigUint {
    BigUint::from_bytes_be(scalar.to_bytes().as_slice())
}

/// Reduce an arbitrary integer modulo `q`
pub fn scalar_from_biguint(value: &BigUint, curve: Curve) -> Scalar {
    let reduced = value % curve.order();
    let bytes = reduced.to_bytes_be();
    let mut array = [0u8; 32];
    array[32 - bytes.len()..].copy_from_slice(&bytes);
    <Scalar as Reduce<U256>>::reduce_bytes(&array.into())
}
