//! Signing ceremony round state machine
//!
//! Each role walks three rounds: `Round1 → Round2 → Round3`. A round starts
//! once, collects acknowledgements for the peer contributions it needs, and
//! hands over to the next round when complete.
//!
//! | round | server                              | client                              |
//! |-------|-------------------------------------|-------------------------------------|
//! | 1     | ephemeral share, `Enc(w1)`, emit    | wait for round 1 message            |
//! | 2     | wait for round 2 message            | encrypted partial signature, emit   |
//! | 3     | decrypt, finish, verify, output     | output completion                   |

pub mod client;
mod finisher;
mod messages;
mod prepare;
pub mod server;

pub use finisher::{finish_signature, normalize_s, pad_to_length, recovery_id, verify};
pub use messages::*;
pub use prepare::{lagrange_coefficient, prepare_for_signing, PreparedShare};

use crate::config::CeremonyConfig;
use crate::engine::{Round1Result, SigningEngine};
use crate::error::{RoundError, RoundResult};
use crate::types::{KeyShare, MessageDigest, Role, SigningOutput, SigningParameters};
use crate::{Error, PartyId};
use k256::{ProjectivePoint, Scalar};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Which parties a round has heard from, by party index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckSet {
    acked: Vec<bool>,
}

impl AckSet {
    pub fn new(party_count: usize) -> Self {
        Self {
            acked: vec![false; party_count],
        }
    }

    pub fn reset(&mut self) {
        self.acked.iter_mut().for_each(|a| *a = false);
    }

    pub fn ack(&mut self, party: PartyId) {
        if let Some(slot) = self.acked.get_mut(party) {
            *slot = true;
        }
    }

    pub fn ack_all(&mut self) {
        self.acked.iter_mut().for_each(|a| *a = true);
    }

    pub fn len(&self) -> usize {
        self.acked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acked.is_empty()
    }

    pub fn is_acked(&self, party: PartyId) -> bool {
        self.acked.get(party).copied().unwrap_or(false)
    }

    pub fn is_complete(&self) -> bool {
        self.acked.iter().all(|a| *a)
    }

    pub fn pending(&self) -> Vec<PartyId> {
        self.acked
            .iter()
            .enumerate()
            .filter(|(_, a)| !**a)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Ceremony-scoped mutable state
pub struct TempData {
    /// Digest being signed
    pub m: MessageDigest,
    /// `w_i`
    pub signing_share: Scalar,
    /// Key the finished signature must verify under
    pub public_key: ProjectivePoint,
    /// Server only: ephemeral material from round 1
    pub round1_result: Option<Round1Result>,
    /// Inbound round 1 messages, by sender
    pub round1_messages: Vec<Option<SignMessage>>,
    /// Inbound round 2 messages, by sender
    pub round2_messages: Vec<Option<SignMessage>>,
}

impl TempData {
    pub fn new(m: MessageDigest, prepared: PreparedShare, party_count: usize) -> Self {
        Self {
            m,
            signing_share: prepared.signing_share,
            public_key: prepared.public_key,
            round1_result: None,
            round1_messages: vec![None; party_count],
            round2_messages: vec![None; party_count],
        }
    }

    pub fn slots(&self, round: u32) -> Option<&Vec<Option<SignMessage>>> {
        match round {
            1 => Some(&self.round1_messages),
            2 => Some(&self.round2_messages),
            _ => None,
        }
    }

    pub fn slots_mut(&mut self, round: u32) -> Option<&mut Vec<Option<SignMessage>>> {
        match round {
            1 => Some(&mut self.round1_messages),
            2 => Some(&mut self.round2_messages),
            _ => None,
        }
    }
}

/// Everything a round may read or write
pub struct SignContext {
    pub params: SigningParameters,
    pub key: KeyShare,
    pub temp: TempData,
    pub engine: Arc<dyn SigningEngine>,
    pub config: CeremonyConfig,
    pub out: UnboundedSender<SignMessage>,
    pub end: UnboundedSender<SigningOutput>,
}

impl SignContext {
    pub fn party_id(&self) -> PartyId {
        self.params.party_id
    }

    /// The peer playing `role`
    pub fn party_with_role(&self, role: Role) -> PartyId {
        if self.params.role == role {
            self.params.party_id
        } else {
            self.params.other_party()
        }
    }

    pub(crate) fn send(&self, msg: SignMessage) -> crate::Result<()> {
        self.out
            .send(msg)
            .map_err(|_| Error::Internal("outbound channel closed".into()))
    }

    pub(crate) fn finish(&self, output: SigningOutput) -> crate::Result<()> {
        self.end
            .send(output)
            .map_err(|_| Error::Internal("end channel closed".into()))
    }
}

/// One step of a role's ceremony
pub trait Round: Send {
    fn number(&self) -> u32;

    /// Run this round's local computation and emit its messages. At most once.
    fn start(&mut self, ctx: &mut SignContext) -> RoundResult<()>;

    /// Acknowledge buffered peer messages; `true` once nothing is missing
    fn update(&mut self, ctx: &SignContext) -> RoundResult<bool>;

    /// Whether `msg` is the kind of message this round waits for
    fn can_accept(&self, msg: &SignMessage) -> bool;

    fn can_proceed(&self) -> bool;

    /// Parties this round is still waiting on
    fn waiting_for(&self) -> Vec<PartyId>;

    fn is_final(&self) -> bool {
        false
    }

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round>>;
}

/// State shared by every round implementation
pub(crate) struct RoundBase {
    number: u32,
    started: bool,
    acks: AckSet,
}

impl RoundBase {
    pub(crate) fn new(number: u32, party_count: usize) -> Self {
        Self {
            number,
            started: false,
            acks: AckSet::new(party_count),
        }
    }

    /// Entry check shared by all rounds
    pub(crate) fn begin(&mut self, ctx: &SignContext) -> RoundResult<()> {
        if self.started {
            return Err(self.wrap_error(ctx, Error::RoundAlreadyStarted, vec![]));
        }
        self.started = true;
        self.acks.reset();
        self.acks.ack(ctx.party_id());
        Ok(())
    }

    /// Ack every party whose slot for `round` holds an acceptable message
    pub(crate) fn collect(
        &mut self,
        ctx: &SignContext,
        round: u32,
        accept: fn(&SignMessage) -> bool,
    ) -> bool {
        let Some(slots) = ctx.temp.slots(round) else {
            return false;
        };
        for party in ctx.params.parties.iter().copied() {
            if self.acks.is_acked(party) {
                continue;
            }
            match slots.get(party).and_then(|slot| slot.as_ref()) {
                Some(msg) if accept(msg) => self.acks.ack(party),
                _ => return false,
            }
        }
        self.acks.is_complete()
    }

    pub(crate) fn ack_all(&mut self) {
        self.acks.ack_all();
    }

    pub(crate) fn can_proceed(&self) -> bool {
        self.started && self.acks.is_complete()
    }

    pub(crate) fn waiting_for(&self) -> Vec<PartyId> {
        if !self.started {
            return Vec::new();
        }
        self.acks.pending()
    }

    pub(crate) fn number(&self) -> u32 {
        self.number
    }

    pub(crate) fn party_count(&self) -> usize {
        self.acks.len()
    }

    pub(crate) fn wrap_error(
        &self,
        ctx: &SignContext,
        err: Error,
        culprits: Vec<PartyId>,
    ) -> RoundError {
        RoundError::new(err, self.number, ctx.party_id(), culprits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_set() {
        let mut acks = AckSet::new(2);
        assert!(!acks.is_complete());
        assert_eq!(acks.pending(), vec![0, 1]);

        acks.ack(1);
        assert!(acks.is_acked(1));
        assert_eq!(acks.pending(), vec![0]);

        acks.ack(7);
        acks.ack(0);
        assert!(acks.is_complete());

        acks.reset();
        assert_eq!(acks.pending(), vec![0, 1]);
        acks.ack_all();
        assert!(acks.is_complete());
    }
}
