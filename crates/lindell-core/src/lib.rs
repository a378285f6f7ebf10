//! # Lindell Core
//!
//! Round state machine for two-party threshold ECDSA signing over secp256k1.
//!
//! A server (holding a Paillier key) and a client each hold an additive share
//! of the signing key. They exchange three messages and the server ends up
//! with an ordinary, low-S, recoverable ECDSA signature:
//!
//! - Round 1: the server publishes its ephemeral share and `Enc(w1)`
//! - Round 2: the client answers with an encrypted partial signature
//! - Round 3: the server decrypts, finishes and verifies the signature
//!
//! ## Example
//!
//! ```rust,ignore
//! use lindell_core::{mpc::MemoryBus, party::{start_signing, SigningOptions}};
//!
//! let bus = MemoryBus::new();
//! let transport = bus.connect(session_id, 0, &[0, 1])?;
//! let handle = start_signing(digest, params, key_share, transport, SigningOptions::default())?;
//! let signature = handle.wait().await?.into_signature();
//! ```

pub mod config;
pub mod derivation;
pub mod engine;
pub mod error;
pub mod mpc;
pub mod paillier;
pub mod party;
pub mod sign;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CeremonyConfig;
pub use error::{Error, ErrorClass, Result, RoundError, RoundResult};
pub use party::{start_signing, SigningHandle, SigningOptions};
pub use types::{
    Curve, KeyShare, MessageDigest, PartyId, Role, SessionId, SignatureResult, SigningOutput,
    SigningParameters,
};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Task name carried by every round error
pub const TASK_NAME: &str = "lindell-signing";
