//! Message Relay Library
//!
//! Wire envelopes for the two-party signing ceremony and the bookkeeping a
//! transport needs to honour at-most-once delivery. Envelopes are either
//! broadcast (no recipient) or addressed to a single party.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Relay error types
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),
    #[error("Mailbox closed: {0}")]
    Closed(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// 32-byte session identifier shared by both parties of a ceremony
pub type SessionId = [u8; 32];

/// Message identifier
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageId {
    /// Session identifier (hex)
    pub session_id: String,
    /// Round number
    pub round: u32,
    /// Sender party ID
    pub from: usize,
    /// Receiver party ID (None for broadcasts)
    pub to: Option<usize>,
    /// Message tag
    pub tag: String,
}

impl MessageId {
    /// Create a new message ID
    pub fn new(session_id: &SessionId, round: u32, from: usize, to: Option<usize>, tag: &str) -> Self {
        Self {
            session_id: hex::encode(session_id),
            round,
            from,
            to,
            tag: tag.to_string(),
        }
    }

    /// Broadcast messages carry no recipient
    pub fn is_broadcast(&self) -> bool {
        self.to.is_none()
    }

    /// Compute hash for lookup
    pub fn hash(&self) -> String {
        let data = format!(
            "{}:{}:{}:{}:{}",
            self.session_id,
            self.round,
            self.from,
            self.to.map(|v| v.to_string()).unwrap_or_default(),
            self.tag
        );
        hex::encode(blake3::hash(data.as_bytes()).as_bytes())
    }
}

/// A routed message as it travels over the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing information
    pub id: MessageId,
    /// Unique per send; receivers drop repeats
    pub delivery_id: Uuid,
    /// Encoded message content
    pub payload: Vec<u8>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Envelope {
    /// Wrap a payload for sending
    pub fn new(id: MessageId, payload: Vec<u8>) -> Self {
        Self {
            id,
            delivery_id: Uuid::new_v4(),
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.id.is_broadcast()
    }

    /// Short hex digest of the payload, for logs and audit trails
    pub fn fingerprint(&self) -> String {
        hex::encode(&blake3::hash(&self.payload).as_bytes()[..8])
    }

    /// Encode for the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| RelayError::InvalidFormat(e.to_string()))
    }

    /// Decode from the wire
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| RelayError::InvalidFormat(e.to_string()))
    }
}

/// Remembers which deliveries a receiver has already accepted
#[derive(Clone)]
pub struct DeliveryLog {
    /// Delivery id -> expiry
    seen: Arc<DashMap<Uuid, DateTime<Utc>>>,
    /// Default TTL in seconds
    ttl_seconds: i64,
}

impl DeliveryLog {
    /// Create a new delivery log
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            seen: Arc::new(DashMap::new()),
            ttl_seconds,
        }
    }

    /// Record a delivery. Returns `false` if it was already recorded.
    pub fn record(&self, envelope: &Envelope) -> bool {
        let expires_at = Utc::now() + chrono::Duration::seconds(self.ttl_seconds);
        let fresh = self.seen.insert(envelope.delivery_id, expires_at).is_none();
        if !fresh {
            debug!(
                delivery_id = %envelope.delivery_id,
                message = envelope.id.hash(),
                "Dropping repeated delivery"
            );
        }
        fresh
    }

    /// Remove expired entries
    pub fn cleanup(&self) {
        let now = Utc::now();
        self.seen.retain(|_, expires_at| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DeliveryLog {
    fn default() -> Self {
        Self::new(3600) // 1 hour default TTL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_hash() {
        let session = [7u8; 32];
        let id1 = MessageId::new(&session, 1, 0, None, "round1");
        let id2 = MessageId::new(&session, 1, 0, None, "round1");
        let id3 = MessageId::new(&session, 2, 1, None, "round2");

        assert_eq!(id1.hash(), id2.hash());
        assert_ne!(id1.hash(), id3.hash());
        assert!(id1.is_broadcast());
        assert!(!MessageId::new(&session, 1, 0, Some(1), "round1").is_broadcast());
    }

    #[test]
    fn test_envelope_wire_bytes() {
        let id = MessageId::new(&[1u8; 32], 2, 1, None, "round2");
        let envelope = Envelope::new(id, vec![1, 2, 3]);

        let bytes = envelope.to_bytes().unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.fingerprint(), envelope.fingerprint());
        assert!(Envelope::from_bytes(b"not json").is_err());
    }

    #[test]
    fn test_delivery_log_drops_repeats() {
        let log = DeliveryLog::new(3600);
        let envelope = Envelope::new(MessageId::new(&[0u8; 32], 1, 0, None, "round1"), vec![9]);
        let other = Envelope::new(envelope.id.clone(), vec![9]);

        assert!(log.record(&envelope));
        assert!(!log.record(&envelope));
        assert!(log.record(&other));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_delivery_log_cleanup() {
        let log = DeliveryLog::new(-1);
        let envelope = Envelope::new(MessageId::new(&[0u8; 32], 1, 0, None, "round1"), vec![]);

        assert!(log.record(&envelope));
        log.cleanup();
        assert!(log.is_empty());
    }
}
