//! Message transport between the two parties

use crate::Result;
use msg_relay::Envelope;

pub use ::async_trait::async_trait;

/// Point-to-point or broadcast delivery of envelopes.
///
/// Delivery is at most once per send and unordered across senders. A
/// broadcast envelope (no recipient) reaches every other party of the session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an envelope
    async fn send(&self, envelope: Envelope) -> Result<()>;

    /// Wait for the next envelope addressed to this party
    async fn receive(&mut self) -> Result<Envelope>;
}

/// In-memory bus for tests and single-process ceremonies
pub mod memory;

pub use memory::{MemoryBus, MemoryEndpoint};
