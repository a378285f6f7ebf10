//! Party controller: drives one role's rounds over a transport

use crate::config::CeremonyConfig;
use crate::engine::{LindellEngine, SigningEngine};
use crate::error::{RoundError, RoundResult};
use crate::mpc::Transport;
use crate::sign::{self, prepare_for_signing, Round, SignContext, SignMessage, TempData};
use crate::types::{KeyShare, MessageDigest, Role, SigningOutput, SigningParameters};
use crate::{Error, PartyId, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Per-ceremony knobs
#[derive(Clone)]
pub struct SigningOptions {
    pub engine: Arc<dyn SigningEngine>,
    pub config: CeremonyConfig,
    /// Sign under this non-hardened child of the joint key
    pub derivation_path: Option<String>,
}

impl Default for SigningOptions {
    fn default() -> Self {
        Self {
            engine: Arc::new(LindellEngine::new()),
            config: CeremonyConfig::default(),
            derivation_path: None,
        }
    }
}

impl SigningOptions {
    pub fn with_engine(mut self, engine: Arc<dyn SigningEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_config(mut self, config: CeremonyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_derivation_path(mut self, path: impl Into<String>) -> Self {
        self.derivation_path = Some(path.into());
        self
    }
}

/// One party's round state machine and the context it runs in
pub struct LocalParty {
    ctx: SignContext,
    round: Option<Box<dyn Round>>,
    finished: bool,
}

impl LocalParty {
    pub fn new(
        digest: MessageDigest,
        params: SigningParameters,
        key: KeyShare,
        options: &SigningOptions,
        out: UnboundedSender<SignMessage>,
        end: UnboundedSender<SigningOutput>,
    ) -> Result<Self> {
        options.config.validate()?;
        let prepared = prepare_for_signing(&key, &params, options.derivation_path.as_deref())?;
        let party_count = params.party_count;

        let round: Box<dyn Round> = match params.role {
            Role::Server => Box::new(sign::server::Round1::new(party_count)),
            Role::Client => Box::new(sign::client::Round1::new(party_count)),
        };

        Ok(Self {
            ctx: SignContext {
                temp: TempData::new(digest, prepared, party_count),
                params,
                key,
                engine: options.engine.clone(),
                config: options.config.clone(),
                out,
                end,
            },
            round: Some(round),
            finished: false,
        })
    }

    pub fn party_id(&self) -> PartyId {
        self.ctx.party_id()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of the round currently running
    pub fn current_round(&self) -> u32 {
        self.round.as_ref().map(|r| r.number()).unwrap_or(0)
    }

    pub fn waiting_for(&self) -> Vec<PartyId> {
        self.round.as_ref().map(|r| r.waiting_for()).unwrap_or_default()
    }

    fn error(&self, err: Error, culprits: Vec<PartyId>) -> RoundError {
        RoundError::new(err, self.current_round(), self.party_id(), culprits)
    }

    /// Start the first round
    pub fn start(&mut self) -> RoundResult<()> {
        let round = self
            .round
            .as_mut()
            .ok_or_else(|| RoundError::new(Error::RoundAlreadyStarted, 0, self.ctx.party_id(), vec![]))?;

        info!(
            party_id = self.ctx.party_id(),
            role = ?self.ctx.params.role,
            digest = hex::encode(self.ctx.temp.m.as_bytes()),
            "Starting signing ceremony"
        );
        round.start(&mut self.ctx)?;
        self.advance()
    }

    /// Validate and buffer an inbound message, then advance as far as possible
    pub fn update(&mut self, msg: SignMessage) -> RoundResult<()> {
        let from = msg.routing.from;

        if self.finished {
            debug!(party_id = self.party_id(), from, "Ignoring message after completion");
            return Ok(());
        }
        if from >= self.ctx.params.party_count || !self.ctx.params.parties.contains(&from) {
            return Err(self.error(Error::InvalidPartyId(from), vec![]));
        }
        if from == self.party_id() {
            return Err(self.error(
                Error::UnexpectedMessage("message from self".into()),
                vec![from],
            ));
        }
        if let Some(to) = msg.routing.to {
            if to != self.party_id() {
                return Err(self.error(
                    Error::UnexpectedMessage(format!("message addressed to party {}", to)),
                    vec![from],
                ));
            }
        }
        if !msg.validate_basic() {
            return Err(self.error(
                Error::MalformedMessage(format!("round {} message failed validation", msg.round())),
                vec![from],
            ));
        }

        let expected_role = match msg.round() {
            1 => Role::Server,
            _ => Role::Client,
        };
        if self.ctx.party_with_role(expected_role) != from {
            return Err(self.error(
                Error::UnexpectedMessage(format!(
                    "round {} message from the wrong role",
                    msg.round()
                )),
                vec![from],
            ));
        }

        let round = msg.round();
        let occupied = match self.ctx.temp.slots(round) {
            Some(slots) => slots[from].is_some(),
            None => {
                return Err(self.error(
                    Error::MalformedMessage(format!("no slot for round {}", round)),
                    vec![from],
                ));
            }
        };
        if occupied {
            return Err(self.error(Error::DuplicateMessage(from), vec![from]));
        }
        if let Some(current) = self.round.as_ref() {
            if !current.can_accept(&msg) {
                return Err(self.error(
                    Error::OutOfOrder(format!(
                        "round {} message while in round {}",
                        round,
                        current.number()
                    )),
                    vec![from],
                ));
            }
        }
        if let Some(slots) = self.ctx.temp.slots_mut(round) {
            slots[from] = Some(msg);
        }

        debug!(party_id = self.party_id(), from, round, "Stored message");
        self.advance()
    }

    /// Move through every round whose inputs are complete
    fn advance(&mut self) -> RoundResult<()> {
        loop {
            let Some(round) = self.round.as_mut() else {
                return Ok(());
            };
            if !round.update(&self.ctx)? || !round.can_proceed() {
                return Ok(());
            }

            let Some(current) = self.round.take() else {
                return Ok(());
            };
            let Some(mut next) = current.next_round() else {
                self.finished = true;
                return Ok(());
            };

            debug!(party_id = self.party_id(), round = next.number(), "Advancing");
            let started = next.start(&mut self.ctx);
            let is_final = next.is_final();
            self.round = Some(next);
            started?;

            if is_final {
                self.finished = true;
                return Ok(());
            }
        }
    }
}

/// Runs a [`LocalParty`] against a [`Transport`]
pub struct PartyController<T: Transport> {
    party: LocalParty,
    transport: T,
    outbound: UnboundedReceiver<SignMessage>,
    params: SigningParameters,
    config: CeremonyConfig,
}

impl<T: Transport> PartyController<T> {
    pub fn new(
        digest: MessageDigest,
        params: SigningParameters,
        key: KeyShare,
        transport: T,
        options: &SigningOptions,
        end: UnboundedSender<SigningOutput>,
    ) -> Result<Self> {
        let (out_tx, out_rx) = unbounded_channel();
        let party = LocalParty::new(digest, params.clone(), key, options, out_tx, end)?;

        Ok(Self {
            party,
            transport,
            outbound: out_rx,
            params,
            config: options.config.clone(),
        })
    }

    /// Drive the ceremony to completion or to the first fatal error
    #[instrument(skip(self), fields(party_id = self.params.party_id, session = %hex::encode(&self.params.session_id[..8])))]
    pub async fn run(mut self) -> RoundResult<()> {
        self.party.start()?;
        self.flush().await?;

        while !self.party.is_finished() {
            let received = match self.config.peer_timeout() {
                Some(limit) => match tokio::time::timeout(limit, self.transport.receive()).await {
                    Ok(received) => received,
                    Err(_) => {
                        let waiting = self.party.waiting_for();
                        warn!(
                            round = self.party.current_round(),
                            waiting_for = ?waiting,
                            "Peer timeout"
                        );
                        return Err(self.party.error(
                            Error::Timeout(format!("parties {:?}", waiting)),
                            waiting,
                        ));
                    }
                },
                None => self.transport.receive().await,
            };

            let envelope = received.map_err(|e| self.party.error(e, vec![]))?;
            if envelope.id.session_id != hex::encode(self.params.session_id) {
                warn!(message = envelope.id.hash(), "Dropping envelope from another session");
                continue;
            }

            let msg = SignMessage::from_envelope(&envelope)
                .map_err(|e| self.party.error(e, vec![envelope.id.from]))?;
            self.party.update(msg)?;
            self.flush().await?;
        }

        info!("Ceremony finished");
        Ok(())
    }

    async fn flush(&mut self) -> RoundResult<()> {
        while let Ok(msg) = self.outbound.try_recv() {
            let envelope = msg
                .to_envelope(&self.params.session_id)
                .map_err(|e| self.party.error(e, vec![]))?;
            self.transport
                .send(envelope)
                .await
                .map_err(|e| self.party.error(e, vec![]))?;
        }
        Ok(())
    }
}

/// A running ceremony
pub struct SigningHandle {
    party_id: PartyId,
    output: UnboundedReceiver<SigningOutput>,
    task: JoinHandle<RoundResult<()>>,
}

impl SigningHandle {
    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    /// Wait for the party's output or its first fatal error
    pub async fn wait(mut self) -> RoundResult<SigningOutput> {
        let joined = self.task.await.map_err(|e| {
            RoundError::new(Error::Internal(e.to_string()), 0, self.party_id, vec![])
        })?;
        joined?;

        self.output.recv().await.ok_or_else(|| {
            RoundError::new(
                Error::Internal("ceremony ended without output".into()),
                3,
                self.party_id,
                vec![],
            )
        })
    }
}

/// Spawn one party's side of a signing ceremony
pub fn start_signing<T>(
    digest: MessageDigest,
    params: SigningParameters,
    key: KeyShare,
    transport: T,
    options: SigningOptions,
) -> Result<SigningHandle>
where
    T: Transport + 'static,
{
    let party_id = params.party_id;
    let (end_tx, end_rx) = unbounded_channel();
    let controller = PartyController::new(digest, params, key, transport, &options, end_tx)?;

    Ok(SigningHandle {
        party_id,
        output: end_rx,
        task: tokio::spawn(controller.run()),
    })
}
