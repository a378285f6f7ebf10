//! In-memory message bus

use super::{async_trait, Transport};
use crate::{Error, PartyId, Result, SessionId};
use dashmap::DashMap;
use msg_relay::{DeliveryLog, Envelope, RelayError};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

struct Mailbox {
    tx: UnboundedSender<Vec<u8>>,
    /// Taken by the endpoint that connects
    rx: Option<UnboundedReceiver<Vec<u8>>>,
}

impl Mailbox {
    fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

/// Seconds a receiver remembers a delivery id
const DEFAULT_DELIVERY_TTL_SECS: i64 = 3600;

/// Shared mailboxes keyed by `(session, party)`.
///
/// A mailbox lives until its endpoint is dropped.
#[derive(Clone)]
pub struct MemoryBus {
    mailboxes: Arc<DashMap<(SessionId, PartyId), Mailbox>>,
    delivery_ttl_secs: i64,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self {
            mailboxes: Arc::new(DashMap::new()),
            delivery_ttl_secs: DEFAULT_DELIVERY_TTL_SECS,
        }
    }
}

impl MemoryBus {
    /// Create a new in-memory bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget delivery ids after `secs` seconds
    pub fn with_delivery_ttl(mut self, secs: i64) -> Self {
        self.delivery_ttl_secs = secs;
        self
    }

    /// Claim `party_id`'s mailbox in `session_id`
    pub fn connect(
        &self,
        session_id: SessionId,
        party_id: PartyId,
        parties: &[PartyId],
    ) -> Result<MemoryEndpoint> {
        if !parties.contains(&party_id) {
            return Err(Error::InvalidPartyId(party_id));
        }

        let inbox = self
            .mailboxes
            .entry((session_id, party_id))
            .or_insert_with(Mailbox::new)
            .rx
            .take()
            .ok_or_else(|| {
                Error::Relay(format!(
                    "party {} already connected to session {}",
                    party_id,
                    hex::encode(&session_id[..8])
                ))
            })?;

        Ok(MemoryEndpoint {
            bus: self.clone(),
            session_id,
            party_id,
            parties: parties.to_vec(),
            inbox,
            log: DeliveryLog::new(self.delivery_ttl_secs),
        })
    }

    /// Push raw bytes into a mailbox, bypassing routing
    pub fn deliver(&self, session_id: SessionId, to: PartyId, bytes: Vec<u8>) -> Result<()> {
        self.mailboxes
            .entry((session_id, to))
            .or_insert_with(Mailbox::new)
            .tx
            .send(bytes)
            .map_err(|_| RelayError::Closed(format!("mailbox of party {}", to)).into())
    }

    pub fn session_count(&self) -> usize {
        let mut sessions: Vec<SessionId> = self.mailboxes.iter().map(|e| e.key().0).collect();
        sessions.sort_unstable();
        sessions.dedup();
        sessions.len()
    }
}

/// One party's connection to a [`MemoryBus`]
pub struct MemoryEndpoint {
    bus: MemoryBus,
    session_id: SessionId,
    party_id: PartyId,
    parties: Vec<PartyId>,
    inbox: UnboundedReceiver<Vec<u8>>,
    log: DeliveryLog,
}

impl MemoryEndpoint {
    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Delivery ids still remembered for dedup
    pub fn remembered_deliveries(&self) -> usize {
        self.log.len()
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.bus.mailboxes.remove(&(self.session_id, self.party_id));
        debug!(
            party_id = self.party_id,
            session = %hex::encode(&self.session_id[..8]),
            "Mailbox released"
        );
    }
}

#[async_trait]
impl Transport for MemoryEndpoint {
    async fn send(&self, envelope: Envelope) -> Result<()> {
        let bytes = envelope.to_bytes()?;

        match envelope.id.to {
            Some(to) => {
                if !self.parties.contains(&to) {
                    return Err(RelayError::UnknownRecipient(to.to_string()).into());
                }
                self.bus.deliver(self.session_id, to, bytes)?;
            }
            None => {
                for &to in self.parties.iter().filter(|p| **p != self.party_id) {
                    self.bus.deliver(self.session_id, to, bytes.clone())?;
                }
            }
        }

        debug!(
            from = self.party_id,
            to = ?envelope.id.to,
            tag = %envelope.id.tag,
            fingerprint = %envelope.fingerprint(),
            "Envelope sent"
        );
        Ok(())
    }

    async fn receive(&mut self) -> Result<Envelope> {
        loop {
            let bytes = self
                .inbox
                .recv()
                .await
                .ok_or_else(|| Error::Relay("mailbox closed".into()))?;
            let envelope = Envelope::from_bytes(&bytes)?;
            self.log.cleanup();
            if self.log.record(&envelope) {
                return Ok(envelope);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msg_relay::MessageId;
    use std::time::Duration;

    fn envelope(session: &SessionId, from: PartyId, to: Option<PartyId>) -> Envelope {
        Envelope::new(MessageId::new(session, 1, from, to, "test"), vec![from as u8])
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let bus = MemoryBus::new();
        let session = [1u8; 32];
        let mut a = bus.connect(session, 0, &[0, 1]).unwrap();
        let mut b = bus.connect(session, 1, &[0, 1]).unwrap();

        a.send(envelope(&session, 0, None)).await.unwrap();

        let received = b.receive().await.unwrap();
        assert_eq!(received.id.from, 0);
        assert!(tokio::time::timeout(Duration::from_millis(20), a.receive())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_direct_delivery() {
        let bus = MemoryBus::new();
        let session = [2u8; 32];
        let a = bus.connect(session, 0, &[0, 1]).unwrap();
        let mut b = bus.connect(session, 1, &[0, 1]).unwrap();

        a.send(envelope(&session, 0, Some(1))).await.unwrap();
        assert_eq!(b.receive().await.unwrap().id.to, Some(1));

        assert!(a.send(envelope(&session, 0, Some(5))).await.is_err());
    }

    #[tokio::test]
    async fn test_repeated_delivery_dropped() {
        let bus = MemoryBus::new();
        let session = [3u8; 32];
        let mut b = bus.connect(session, 1, &[0, 1]).unwrap();

        let first = envelope(&session, 0, None);
        let second = envelope(&session, 0, None);
        let bytes = first.to_bytes().unwrap();
        bus.deliver(session, 1, bytes.clone()).unwrap();
        bus.deliver(session, 1, bytes).unwrap();
        bus.deliver(session, 1, second.to_bytes().unwrap()).unwrap();

        assert_eq!(b.receive().await.unwrap().delivery_id, first.delivery_id);
        assert_eq!(b.receive().await.unwrap().delivery_id, second.delivery_id);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let bus = MemoryBus::new();
        let a = bus.connect([4u8; 32], 0, &[0, 1]).unwrap();
        let mut other = bus.connect([5u8; 32], 1, &[0, 1]).unwrap();
        let mut b = bus.connect([4u8; 32], 1, &[0, 1]).unwrap();

        a.send(envelope(&[4u8; 32], 0, None)).await.unwrap();

        assert!(b.receive().await.is_ok());
        assert!(tokio::time::timeout(Duration::from_millis(20), other.receive())
            .await
            .is_err());
        assert_eq!(bus.session_count(), 2);
    }

    #[test]
    fn test_connect_twice_fails() {
        let bus = MemoryBus::new();
        let session = [6u8; 32];
        let _first = bus.connect(session, 0, &[0, 1]).unwrap();
        assert!(matches!(bus.connect(session, 0, &[0, 1]), Err(Error::Relay(_))));
        assert!(bus.connect(session, 3, &[0, 1]).is_err());
    }

    #[test]
    fn test_dropped_endpoint_releases_mailbox() {
        let bus = MemoryBus::new();
        let session = [7u8; 32];
        let a = bus.connect(session, 0, &[0, 1]).unwrap();
        let b = bus.connect(session, 1, &[0, 1]).unwrap();
        assert_eq!(bus.session_count(), 1);

        drop(a);
        assert_eq!(bus.session_count(), 1);
        drop(b);
        assert_eq!(bus.session_count(), 0);

        assert!(bus.connect(session, 0, &[0, 1]).is_ok());
    }

    #[tokio::test]
    async fn test_expired_deliveries_forgotten() {
        let bus = MemoryBus::new().with_delivery_ttl(-1);
        let session = [8u8; 32];
        let mut b = bus.connect(session, 1, &[0, 1]).unwrap();

        for _ in 0..3 {
            let env = envelope(&session, 0, None);
            bus.deliver(session, 1, env.to_bytes().unwrap()).unwrap();
            assert_eq!(b.receive().await.unwrap().delivery_id, env.delivery_id);
            assert_eq!(b.remembered_deliveries(), 1);
        }
    }
}
