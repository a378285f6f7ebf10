//! Round messages exchanged between the two parties

use crate::{Error, PartyId, Result, SessionId};
use msg_relay::{Envelope, MessageId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub const ROUND1_TAG: &str = "lindell-signing/round1";
pub const ROUND2_TAG: &str = "lindell-signing/round2";

/// Round 1 message: server's Paillier key, encrypted share and ephemeral share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRound1Message {
    /// Paillier modulus, big-endian
    pub paillier_n: Vec<u8>,
    /// `Enc(w1)`, big-endian
    pub encrypted_share: Vec<u8>,
    /// Encoded server first message
    pub first_message: Vec<u8>,
}

/// Round 2 message: client's commitment and encrypted partial signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRound2Message {
    /// Encoded client round result
    pub result: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Round1(SignRound1Message),
    Round2(SignRound2Message),
}

impl MessageContent {
    pub fn round(&self) -> u32 {
        match self {
            MessageContent::Round1(_) => 1,
            MessageContent::Round2(_) => 2,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            MessageContent::Round1(_) => ROUND1_TAG,
            MessageContent::Round2(_) => ROUND2_TAG,
        }
    }

    /// All fields present
    pub fn validate_basic(&self) -> bool {
        match self {
            MessageContent::Round1(msg) => {
                !msg.paillier_n.is_empty()
                    && !msg.encrypted_share.is_empty()
                    && !msg.first_message.is_empty()
            }
            MessageContent::Round2(msg) => !msg.result.is_empty(),
        }
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let config = bincode::config::standard();
        let bytes = match self {
            MessageContent::Round1(msg) => bincode::serde::encode_to_vec(msg, config)?,
            MessageContent::Round2(msg) => bincode::serde::encode_to_vec(msg, config)?,
        };
        Ok(bytes)
    }

    fn decode(tag: &str, payload: &[u8]) -> Result<Self> {
        match tag {
            ROUND1_TAG => Ok(MessageContent::Round1(decode_payload(tag, payload)?)),
            ROUND2_TAG => Ok(MessageContent::Round2(decode_payload(tag, payload)?)),
            other => Err(Error::MalformedMessage(format!("unknown message tag {}", other))),
        }
    }
}

/// Decode a whole payload; leftover bytes are an error
fn decode_payload<T: DeserializeOwned>(tag: &str, payload: &[u8]) -> Result<T> {
    let (msg, read) = bincode::serde::decode_from_slice(payload, bincode::config::standard())
        .map_err(|e| Error::MalformedMessage(format!("{}: {}", tag, e)))?;
    if read != payload.len() {
        return Err(Error::MalformedMessage(format!(
            "{}: {} trailing bytes",
            tag,
            payload.len() - read
        )));
    }
    Ok(msg)
}

/// Who sent a message and to whom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRouting {
    pub from: PartyId,
    pub to: Option<PartyId>,
    pub is_broadcast: bool,
}

/// A routed round message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignMessage {
    pub routing: MessageRouting,
    pub content: MessageContent,
}

impl SignMessage {
    pub fn broadcast(from: PartyId, content: MessageContent) -> Self {
        Self {
            routing: MessageRouting {
                from,
                to: None,
                is_broadcast: true,
            },
            content,
        }
    }

    pub fn direct(from: PartyId, to: PartyId, content: MessageContent) -> Self {
        Self {
            routing: MessageRouting {
                from,
                to: Some(to),
                is_broadcast: false,
            },
            content,
        }
    }

    pub fn round(&self) -> u32 {
        self.content.round()
    }

    pub fn validate_basic(&self) -> bool {
        self.routing.is_broadcast == self.routing.to.is_none() && self.content.validate_basic()
    }

    pub fn to_envelope(&self, session_id: &SessionId) -> Result<Envelope> {
        let id = MessageId::new(
            session_id,
            self.round(),
            self.routing.from,
            self.routing.to,
            self.content.tag(),
        );
        Ok(Envelope::new(id, self.content.encode()?))
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        let content = MessageContent::decode(&envelope.id.tag, &envelope.payload)?;
        if content.round() != envelope.id.round {
            return Err(Error::MalformedMessage(format!(
                "tag {} does not belong to round {}",
                envelope.id.tag, envelope.id.round
            )));
        }

        Ok(Self {
            routing: MessageRouting {
                from: envelope.id.from,
                to: envelope.id.to,
                is_broadcast: envelope.is_broadcast(),
            },
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round1() -> SignMessage {
        SignMessage::broadcast(
            0,
            MessageContent::Round1(SignRound1Message {
                paillier_n: vec![0xc3; 256],
                encrypted_share: vec![0x11; 512],
                first_message: vec![1, 1, 9],
            }),
        )
    }

    #[test]
    fn test_validate_basic() {
        assert!(round1().validate_basic());

        let empty = SignMessage::broadcast(1, MessageContent::Round2(SignRound2Message { result: vec![] }));
        assert!(!empty.validate_basic());

        let mut inconsistent = round1();
        inconsistent.routing.to = Some(1);
        assert!(!inconsistent.validate_basic());
    }

    #[test]
    fn test_envelope_conversion() {
        let session = [5u8; 32];
        let msg = round1();
        let envelope = msg.to_envelope(&session).unwrap();

        assert_eq!(envelope.id.tag, ROUND1_TAG);
        assert_eq!(envelope.id.round, 1);
        assert!(envelope.is_broadcast());
        assert_eq!(SignMessage::from_envelope(&envelope).unwrap(), msg);

        let direct = SignMessage::direct(1, 0, MessageContent::Round2(SignRound2Message { result: vec![4; 8] }));
        let envelope = direct.to_envelope(&session).unwrap();
        assert_eq!(SignMessage::from_envelope(&envelope).unwrap(), direct);
    }

    #[test]
    fn test_envelope_rejects_mismatched_tag() {
        let mut envelope = round1().to_envelope(&[0u8; 32]).unwrap();
        envelope.id.round = 2;
        assert!(matches!(
            SignMessage::from_envelope(&envelope),
            Err(Error::MalformedMessage(_))
        ));

        envelope.id.tag = "unknown".into();
        assert!(SignMessage::from_envelope(&envelope).is_err());
    }

    #[test]
    fn test_envelope_rejects_trailing_bytes() {
        let mut envelope = round1().to_envelope(&[0u8; 32]).unwrap();
        envelope.payload.push(0);

        assert!(matches!(
            SignMessage::from_envelope(&envelope),
            Err(Error::MalformedMessage(_))
        ));
    }
}
