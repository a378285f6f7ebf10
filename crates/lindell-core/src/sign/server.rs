//! Server role: holds the Paillier key and finishes the signature

use super::{
    finish_signature, MessageContent, Round, RoundBase, SignContext, SignMessage, SignRound1Message,
};
use crate::engine::{wire, Round2Result};
use crate::error::RoundResult;
use crate::types::{scalar_to_biguint, Role, SigningOutput};
use crate::{Error, PartyId};
use num_bigint::BigUint;
use rand::rngs::OsRng;
use tracing::{debug, info};

/// Publish the ephemeral share and the encrypted signing share
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

impl Round for Round1 {
    fn number(&self) -> u32 {
        self.base.number()
    }

    fn start(&mut self, ctx: &mut SignContext) -> RoundResult<()> {
        self.base.begin(ctx)?;

        if !ctx.temp.m.is_in_range(ctx.params.curve) {
            return Err(self.base.wrap_error(ctx, Error::MessageNotInRange, vec![]));
        }

        let paillier = ctx.key.paillier.clone().ok_or_else(|| {
            self.base.wrap_error(
                ctx,
                Error::InvalidConfig("server key share has no Paillier key".into()),
                vec![],
            )
        })?;

        let round1 = ctx
            .engine
            .generate_ephemeral()
            .map_err(|e| self.base.wrap_error(ctx, e, vec![]))?;

        let ek = paillier.encryption_key();
        let encrypted_share = ek
            .encrypt(&scalar_to_biguint(&ctx.temp.signing_share), &mut OsRng)
            .map_err(|e| self.base.wrap_error(ctx, e, vec![]))?;
        let first_message = wire::encode(&round1.first_message)
            .map_err(|e| self.base.wrap_error(ctx, e, vec![]))?;

        let msg = SignMessage::broadcast(
            ctx.party_id(),
            MessageContent::Round1(SignRound1Message {
                paillier_n: ek.to_bytes(),
                encrypted_share: encrypted_share.to_bytes_be(),
                first_message,
            }),
        );

        ctx.temp.round1_result = Some(round1);
        ctx.send(msg).map_err(|e| self.base.wrap_error(ctx, e, vec![]))?;

        debug!(party_id = ctx.party_id(), modulus_bits = ek.bits(), "Sent round 1 message");

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
        Some(Box::new(Round2::new(self.base.party_count())))
    }
}

/// Wait for the client's encrypted partial signature
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
        if ctx.temp.round1_result.is_none() {
            return Err(self.base.wrap_error(
                ctx,
                Error::OutOfOrder("round 2 started before round 1 completed".into()),
                vec![],
            ));
        }
        Ok(())
    }

    fn update(&mut self, ctx: &SignContext) -> RoundResult<bool> {
        Ok(self.base.collect(ctx, 2, accepts_round2))
    }

    fn can_accept(&self, msg: &SignMessage) -> bool {
        accepts_round2(msg)
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

fn accepts_round2(msg: &SignMessage) -> bool {
    matches!(msg.content, MessageContent::Round2(_)) && msg.routing.is_broadcast
}

/// Decrypt, finish and verify the signature
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

        let client = ctx.party_with_role(Role::Client);
        let culprits = vec![client];

        let result = match ctx.temp.round2_messages.get(client).and_then(|m| m.as_ref()) {
            Some(SignMessage {
                content: MessageContent::Round2(msg),
                ..
            }) => msg.result.clone(),
            _ => {
                return Err(self.base.wrap_error(
                    ctx,
                    Error::OutOfOrder("round 3 started without the client's round 2 message".into()),
                    vec![],
                ));
            }
        };
        let round1 = ctx.temp.round1_result.as_ref().ok_or_else(|| {
            self.base.wrap_error(
                ctx,
                Error::OutOfOrder("round 3 started before round 1 completed".into()),
                vec![],
            )
        })?;
        let paillier = ctx.key.paillier.as_ref().ok_or_else(|| {
            self.base.wrap_error(
                ctx,
                Error::InvalidConfig("server key share has no Paillier key".into()),
                vec![],
            )
        })?;

        let round2: Round2Result = wire::decode(&result)
            .map_err(|e| self.base.wrap_error(ctx, e, culprits.clone()))?;

        let ciphertext = BigUint::from_bytes_be(&round2.partial_signature);
        let plain = paillier
            .decrypt(&ciphertext)
            .map_err(|e| self.base.wrap_error(ctx, e, culprits.clone()))?;

        let raw = ctx
            .engine
            .finalize_signature(&plain, round1, &round2)
            .map_err(|e| self.base.wrap_error(ctx, e, culprits.clone()))?;

        let signature = finish_signature(&raw, &ctx.temp.m, &ctx.temp.public_key, ctx.params.curve)
            .map_err(|e| self.base.wrap_error(ctx, e, culprits.clone()))?;

        info!(
            party_id = ctx.party_id(),
            r = hex::encode(signature.r),
            s = hex::encode(signature.s),
            recovery_id = signature.recovery_id,
            "Signature finished"
        );

        ctx.finish(SigningOutput::Signature(signature))
            .map_err(|e| self.base.wrap_error(ctx, e, vec![]))?;
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
