//! Error types for the signing ceremony

use crate::PartyId;
use thiserror::Error;

/// Result type alias for ceremony operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for round operations
pub type RoundResult<T> = std::result::Result<T, RoundError>;

/// Errors that can occur while running the signing ceremony
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid party configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Threshold requirements not met
    #[error("Threshold not met: required {required}, got {actual}")]
    ThresholdNotMet { required: usize, actual: usize },

    /// Invalid party ID
    #[error("Invalid party ID: {0}")]
    InvalidPartyId(usize),

    /// `Start()` called on a round that already ran
    #[error("round already started")]
    RoundAlreadyStarted,

    /// A round was driven before its inputs were complete
    #[error("Out of order: {0}")]
    OutOfOrder(String),

    /// A second message for an already filled slot
    #[error("Duplicate message from party {0}")]
    DuplicateMessage(PartyId),

    /// The digest to sign is not below the curve order
    #[error("message not in range")]
    MessageNotInRange,

    /// Message failed basic validation or could not be decoded
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Message was well-formed but not acceptable from this sender
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    /// The peer's zero-knowledge proof did not verify
    #[error("Invalid peer proof: {0}")]
    InvalidPeerProof(String),

    /// Engine inputs do not fit together
    #[error("Malformed combination: {0}")]
    MalformedCombination(String),

    /// Paillier decryption failed
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Final signature failed verification
    #[error("Signature verification failed")]
    InvalidSignature,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Network/relay error
    #[error("Relay error: {0}")]
    Relay(String),

    /// Timeout waiting for a peer
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    Derivation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// How a failure should be handled by whoever runs the ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller or implementation bug; never retried
    Ordering,
    /// Bad input, usually attributable to a peer
    Validation,
    /// Decryption or final verification failed; nothing is emitted
    Cryptographic,
    /// Peer unreachable; retry with a fresh ceremony
    Transport,
    /// Setup or internal failure
    Internal,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::RoundAlreadyStarted | Error::OutOfOrder(_) | Error::DuplicateMessage(_) => {
                ErrorClass::Ordering
            }
            Error::MessageNotInRange
            | Error::MalformedMessage(_)
            | Error::UnexpectedMessage(_)
            | Error::InvalidPeerProof(_)
            | Error::MalformedCombination(_)
            | Error::Deserialization(_) => ErrorClass::Validation,
            Error::Decryption(_) | Error::Crypto(_) | Error::InvalidSignature => {
                ErrorClass::Cryptographic
            }
            Error::Relay(_) | Error::Timeout(_) => ErrorClass::Transport,
            Error::InvalidConfig(_)
            | Error::ThresholdNotMet { .. }
            | Error::InvalidPartyId(_)
            | Error::Serialization(_)
            | Error::Derivation(_)
            | Error::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Only transport failures may be retried, and only with a new ceremony
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transport
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(e: bincode::error::EncodeError) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(e: bincode::error::DecodeError) -> Self {
        Error::Deserialization(e.to_string())
    }
}

impl From<msg_relay::RelayError> for Error {
    fn from(e: msg_relay::RelayError) -> Self {
        match e {
            msg_relay::RelayError::InvalidFormat(msg) => Error::MalformedMessage(msg),
            other => Error::Relay(other.to_string()),
        }
    }
}

/// A failure tagged with where it happened and who is to blame
#[derive(Debug, Error)]
#[error("task {task}, party {party}, round {round}, culprits {culprits:?}: {source}")]
pub struct RoundError {
    pub task: &'static str,
    pub round: u32,
    pub party: PartyId,
    pub culprits: Vec<PartyId>,
    #[source]
    pub source: Error,
}

impl RoundError {
    pub fn new(source: Error, round: u32, party: PartyId, culprits: Vec<PartyId>) -> Self {
        Self {
            task: crate::TASK_NAME,
            round,
            party,
            culprits,
            source,
        }
    }

    pub fn error(&self) -> &Error {
        &self.source
    }

    pub fn class(&self) -> ErrorClass {
        self.source.class()
    }

    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(Error::RoundAlreadyStarted.class(), ErrorClass::Ordering);
        assert_eq!(Error::MessageNotInRange.class(), ErrorClass::Validation);
        assert_eq!(Error::InvalidSignature.class(), ErrorClass::Cryptographic);
        assert_eq!(Error::Decryption("bad".into()).class(), ErrorClass::Cryptographic);
        assert!(Error::Timeout("party 0".into()).is_retryable());
        assert!(!Error::InvalidPeerProof("bad".into()).is_retryable());
    }

    #[test]
    fn test_round_error_display() {
        let err = RoundError::new(Error::InvalidSignature, 3, 0, vec![1]);
        let text = err.to_string();

        assert!(text.contains("round 3"));
        assert!(text.contains("[1]"));
        assert!(text.contains("Signature verification failed"));
        assert_eq!(err.class(), ErrorClass::Cryptographic);
    }
}
