//! Client role: evaluates the partial signature under the server's Paillier key

use super::{MessageContent, Round, RoundBase, SignContext, SignMessage, SignRound2Message};
use crate::engine::{wire, ClientShare, PartialSignatureInput, ServerFirstMessage};
use crate::error::RoundResult;
use crate::types::{Role, SigningOutput};
use crate::{Error, PartyId};
use num_bigint::BigUint;
use tracing::{debug, info, warn};

/// Wait for the server's round 1 message
pub struct Round1 {
    base: RoundBase,
}

impl Round1 {
    pub fn new(party_count: usize) -> Self {
        Self {
            base: RoundBase::new(1, party_count),
        }
    }
}

fn accepts_round1(msg: &SignMessage) -> bool {
    matches!(msg.content, MessageContent::Round1(_)) && msg.routing.is_broadcast
}

impl Round for Round1 {
    fn number(&self) -> u32 {
        self.base.number()
    }

    fn start(&mut self, ctx: &mut SignContext) -> RoundResult<()> {
        self.base.begin(ctx)?;

        if !ctx.temp.m.is_in_range(ctx.params.curve) {
            return Err(self.base.wrap_error(ctx, Error::MessageNotInRange, vec![]));
        }
        Ok(())
    }

    fn update(&mut self, ctx: &SignContext) -> RoundResult<bool> {
        Ok(self.base.collect(ctx, 1, accepts_round1))
    }

    fn can_accept(&self, msg: &SignMessage) -> bool {
        accepts_round1(msg)
    }

    fn can_proceed(&self) -> bool {
        self.base.can_proceed()
    }

    fn waiting_for(&self) -> Vec<PartyId> {
        self.base.waiting_for()
    }

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round>> {
        Some(Box::new(Round2::new(self.base.party_count())))
    }
}

/// Compute and send the encrypted partial signature
pub struct Round2 {
    base: RoundBase,
}

impl Round2 {
    pub fn new(party_count: usize) -> Self {
        Self {
            base: RoundBase::new(2, party_count),
        }
    }
}

impl Round for Round2 {
    fn number(&self) -> u32 {
        self.base.number()
    }

    fn start(&mut self, ctx: &mut SignContext) -> RoundResult<()> {
        self.base.begin(ctx)?;

        let server = ctx.party_with_role(Role::Server);
        let culprits = vec![server];

        let round1 = match ctx.temp.round1_messages.get(server).and_then(|m| m.as_ref()) {
            Some(SignMessage {
                content: MessageContent::Round1(msg),
                ..
            }) => msg.clone(),
            _ => {
                return Err(self.base.wrap_error(
                    ctx,
                    Error::OutOfOrder("round 2 started without the server's round 1 message".into()),
                    vec![],
                ));
            }
        };

        let modulus_bits = BigUint::from_bytes_be(&round1.paillier_n).bits();
        if modulus_bits < ctx.config.min_paillier_modulus_bits {
            warn!(
                party_id = ctx.party_id(),
                modulus_bits,
                minimum = ctx.config.min_paillier_modulus_bits,
                "Rejecting short Paillier modulus"
            );
            return Err(self.base.wrap_error(
                ctx,
                Error::MalformedMessage(format!(
                    "Paillier modulus has {} bits, minimum is {}",
                    modulus_bits, ctx.config.min_paillier_modulus_bits
                )),
                culprits,
            ));
        }

        let server_first: ServerFirstMessage = wire::decode(&round1.first_message)
            .map_err(|e| self.base.wrap_error(ctx, e, culprits.clone()))?;

        let client_share = ClientShare::new(ctx.temp.signing_share);
        let round2 = ctx
            .engine
            .compute_partial_signature(&PartialSignatureInput {
                paillier_n: &round1.paillier_n,
                encrypted_share: &round1.encrypted_share,
                client_share: &client_share,
                message: &ctx.temp.m,
                server_first_message: &server_first,
            })
            .map_err(|e| self.base.wrap_error(ctx, e, culprits.clone()))?;

        let result = wire::encode(&round2).map_err(|e| self.base.wrap_error(ctx, e, vec![]))?;
        let msg = SignMessage::broadcast(
            ctx.party_id(),
            MessageContent::Round2(SignRound2Message { result }),
        );
        ctx.send(msg).map_err(|e| self.base.wrap_error(ctx, e, vec![]))?;

        debug!(party_id = ctx.party_id(), modulus_bits, "Sent round 2 message");

        // Nothing to wait for in this round
        self.base.ack_all();
        Ok(())
    }

    fn update(&mut self, _ctx: &SignContext) -> RoundResult<bool> {
        Ok(self.base.can_proceed())
    }

    fn can_accept(&self, _msg: &SignMessage) -> bool {
        false
    }

    fn can_proceed(&self) -> bool {
        self.base.can_proceed()
    }

    fn waiting_for(&self) -> Vec<PartyId> {
        self.base.waiting_for()
    }

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round>> {
        Some(Box::new(Round3::new(self.base.party_count())))
    }
}

/// Report completion; the signature itself stays with the server
pub struct Round3 {
    base: RoundBase,
}

impl Round3 {
    pub fn new(party_count: usize) -> Self {
        Self {
            base: RoundBase::new(3, party_count),
        }
    }
}

impl Round for Round3 {
    fn number(&self) -> u32 {
        self.base.number()
    }

    fn start(&mut self, ctx: &mut SignContext) -> RoundResult<()> {
        self.base.begin(ctx)?;
        ctx.finish(SigningOutput::Completed)
            .map_err(|e| self.base.wrap_error(ctx, e, vec![]))?;
        info!(party_id = ctx.party_id(), "Client finished");
        Ok(())
    }

    fn update(&mut self, _ctx: &SignContext) -> RoundResult<bool> {
        Ok(false)
    }

    fn can_accept(&self, _msg: &SignMessage) -> bool {
        false
    }

    fn can_proceed(&self) -> bool {
        false
    }

    fn waiting_for(&self) -> Vec<PartyId> {
        Vec::new()
    }

    fn is_final(&self) -> bool {
        true
    }

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round>> {
        None
    }
}
