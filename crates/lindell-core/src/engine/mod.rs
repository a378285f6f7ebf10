//! Cryptographic engine behind the round state machine
//!
//! Rounds never touch nonces, proofs or the homomorphic evaluation directly.
//! They call the three operations of [`SigningEngine`] and ship the results
//! around as opaque byte strings (see [`wire`]).

mod lindell;
pub mod proof;
pub mod wire;

pub use lindell::LindellEngine;
pub use proof::{Decommitment, DLogProof};

use crate::types::MessageDigest;
use crate::Result;
use k256::{AffinePoint, ProjectivePoint, Scalar};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Server's ephemeral nonce `k1` and `R1 = k1·G`
#[derive(Clone)]
pub struct EphemeralKeyPair {
    pub secret: Scalar,
    pub public: ProjectivePoint,
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &self.public.to_affine())
            .finish_non_exhaustive()
    }
}

/// What the server publishes in round 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFirstMessage {
    /// `R1` (compressed)
    pub public_share: Vec<u8>,
    /// Knowledge of `k1`
    pub proof: DLogProof,
}

/// Server-side output of [`SigningEngine::generate_ephemeral`]
#[derive(Debug, Clone)]
pub struct Round1Result {
    pub first_message: ServerFirstMessage,
    pub key_pair: EphemeralKeyPair,
}

/// The client's signing share `w2` and `w2·G`
#[derive(Clone)]
pub struct ClientShare {
    pub secret: Scalar,
    pub public: ProjectivePoint,
}

impl ClientShare {
    pub fn new(secret: Scalar) -> Self {
        Self {
            secret,
            public: ProjectivePoint::GENERATOR * secret,
        }
    }
}

/// Inputs to [`SigningEngine::compute_partial_signature`]
pub struct PartialSignatureInput<'a> {
    /// Paillier modulus, big-endian
    pub paillier_n: &'a [u8],
    /// `Enc(w1)`, big-endian
    pub encrypted_share: &'a [u8],
    pub client_share: &'a ClientShare,
    pub message: &'a MessageDigest,
    pub server_first_message: &'a ServerFirstMessage,
}

/// What the client sends back in round 2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round2Result {
    /// Hash commitment to the decommitment
    pub commitment: Vec<u8>,
    pub decommitment: Decommitment,
    /// Encrypted partial signature `c3`, big-endian
    pub partial_signature: Vec<u8>,
}

/// Ephemeral point and unnormalized `s`
#[derive(Debug, Clone)]
pub struct RawSignature {
    pub r_point: AffinePoint,
    pub s: Scalar,
}

/// The three cryptographic steps of a signing ceremony
pub trait SigningEngine: Send + Sync {
    /// Fresh ephemeral nonce for the server, with proof of knowledge
    fn generate_ephemeral(&self) -> Result<Round1Result>;

    /// Client step: verify the server's proof, commit to a nonce, and
    /// evaluate the encrypted partial signature
    fn compute_partial_signature(&self, input: &PartialSignatureInput<'_>) -> Result<Round2Result>;

    /// Server step: open the client's commitment and produce `(R, s)`
    fn finalize_signature(
        &self,
        plain_partial_signature: &BigUint,
        round1: &Round1Result,
        round2: &Round2Result,
    ) -> Result<RawSignature>;
}
