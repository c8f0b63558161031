//! The simulation driver — start/resume protocol over durable sessions.
//!
//! STATE MACHINE (per session, stored in the checkpoint):
//!
//!   Created ──react──▶ AwaitingCompanyResponse ──resume──▶ Evaluating
//!      ▲                                                      │
//!      └──────────── ongoing ◀──────── evaluate ──────────────┤
//!                                                             ▼
//!                                                  Terminal (closed)
//!
//! RULES:
//!   - A checkpoint is written after every state-producing step.
//!   - Exactly one suspension is outstanding while AwaitingCompanyResponse.
//!   - A paused session is not a blocked thread: control returns to the
//!     caller and the pending suspension lives in the store.
//!   - Protocol misuse is rejected before anything is written.
//!   - A fatal error leaves the last written checkpoint in place; `advance`
//!     picks the session up from there.

use crate::{
    checkpoint::{Checkpoint, CheckpointStore, DriverPhase},
    config::{GeneratorConfig, SimConfig},
    error::{SimError, SimResult},
    event::SessionEvent,
    generator::{ChatCompletionsGenerator, NarrativeGenerator},
    reputation::anger_from_reputation,
    round::{RoundEngine, Suspension},
    state::{Evaluation, SimState, Status},
    store::SimStore,
    types::{Round, Score, SessionId},
};
use serde::Serialize;

/// Returned by `start`: the new session and its first suspension.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StartView {
    pub session_id: SessionId,
    pub suspension: Suspension,
}

/// Returned by `resume` and `advance`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundResultView {
    /// The session is waiting for the next company response.
    Suspended {
        session_id:       SessionId,
        suspension:       Suspension,
        reputation_score: Score,
        iteration:        Round,
        last_eval:        Option<Evaluation>,
    },
    /// The session reached a terminal status and is closed.
    Final {
        session_id:       SessionId,
        status:           Status,
        reputation_score: Score,
        iteration:        Round,
        last_eval:        Option<Evaluation>,
    },
}

impl RoundResultView {
    pub fn is_final(&self) -> bool {
        matches!(self, RoundResultView::Final { .. })
    }

    pub fn suspension(&self) -> Option<&Suspension> {
        match self {
            RoundResultView::Suspended { suspension, .. } => Some(suspension),
            RoundResultView::Final { .. } => None,
        }
    }

    fn suspended(checkpoint: &Checkpoint, suspension: Suspension) -> Self {
        RoundResultView::Suspended {
            session_id:       checkpoint.session_id.clone(),
            suspension,
            reputation_score: checkpoint.state.reputation_score,
            iteration:        checkpoint.state.iteration,
            last_eval:        checkpoint.state.last_eval.clone(),
        }
    }

    fn finished(checkpoint: &Checkpoint) -> Self {
        RoundResultView::Final {
            session_id:       checkpoint.session_id.clone(),
            status:           checkpoint.state.status,
            reputation_score: checkpoint.state.reputation_score,
            iteration:        checkpoint.state.iteration,
            last_eval:        checkpoint.state.last_eval.clone(),
        }
    }
}

pub struct SimulationDriver<G, S> {
    config: GeneratorConfig,
    engine: RoundEngine<G>,
    store:  S,
}

impl SimulationDriver<ChatCompletionsGenerator, SimStore> {
    /// Build a fully wired driver: migrated SQLite store + HTTP generator.
    pub fn build(config: &SimConfig) -> SimResult<Self> {
        config.validate().map_err(|e| SimError::Config(e.to_string()))?;
        let store = SimStore::open_or_memory(&config.store.path)?;
        store.migrate()?;
        let generator = ChatCompletionsGenerator::from_config(config.generator.clone())?;
        Ok(Self::new(config.generator.clone(), generator, store))
    }
}

impl<G: NarrativeGenerator> SimulationDriver<G, SimStore> {
    /// Driver over a fresh in-memory store (tests and dry runs).
    pub fn build_test(generator: G) -> SimResult<Self> {
        let store = SimStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(SimConfig::default_test().generator, generator, store))
    }
}

impl<G: NarrativeGenerator, S: CheckpointStore> SimulationDriver<G, S> {
    pub fn new(config: GeneratorConfig, generator: G, store: S) -> Self {
        Self {
            config,
            engine: RoundEngine::new(generator),
            store,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn generator(&self) -> &G {
        self.engine.generator()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Start a new session under a fresh id and run it to its first suspension.
    ///
    /// If the session was stored but its first reaction failed, the error is
    /// `RoundFailed` carrying the generated id so the caller can `advance` it.
    pub fn start(&mut self, cause: &str) -> SimResult<StartView> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let checkpoint = self.create_session(&session_id, cause)?;
        match self.react_and_suspend(checkpoint) {
            Ok(suspension) => Ok(StartView { session_id, suspension }),
            Err(e) => Err(SimError::RoundFailed { session_id, source: Box::new(e) }),
        }
    }

    /// Start a session under a caller-chosen id. Fails if the id is taken.
    /// A failed first reaction is returned as is; the id is already known.
    pub fn start_with_id(&mut self, session_id: &str, cause: &str) -> SimResult<StartView> {
        let checkpoint = self.create_session(session_id, cause)?;
        let suspension = self.react_and_suspend(checkpoint)?;
        Ok(StartView {
            session_id: session_id.to_string(),
            suspension,
        })
    }

    fn create_session(&mut self, session_id: &str, cause: &str) -> SimResult<Checkpoint> {
        let checkpoint = Checkpoint::new(session_id.to_string(), SimState::new(cause));
        self.store.create(&checkpoint)?;
        self.audit(
            session_id,
            0,
            &SessionEvent::SessionStarted {
                session_id: session_id.to_string(),
                cause:      cause.to_string(),
            },
        );
        log::info!(
            "session={session_id} started (generator={}, model={}, temperature={})",
            self.engine.generator().name(),
            self.config.model,
            self.config.temperature
        );
        Ok(checkpoint)
    }

    /// Fold the human's reply into the session, evaluate the round, and
    /// either close the session or run the next reaction phase.
    pub fn resume(&mut self, session_id: &str, reply: &str) -> SimResult<RoundResultView> {
        let mut checkpoint = self.load_open(session_id)?;
        if checkpoint.phase != DriverPhase::AwaitingCompanyResponse || checkpoint.pending.is_none() {
            return Err(SimError::NoPendingSuspension {
                session_id: session_id.to_string(),
                phase:      checkpoint.phase.to_string(),
            });
        }

        let round = checkpoint.state.iteration + 1;
        checkpoint.pending = None;
        checkpoint.state.company_response = Some(reply.to_string());
        checkpoint.phase = DriverPhase::Evaluating;
        self.store.save(&checkpoint)?;
        self.audit(session_id, round, &SessionEvent::ResponseReceived { round, chars: reply.len() });

        self.finish_round(checkpoint)
    }

    /// Continue a session that stopped between steps after a failure.
    ///
    /// - Created: runs the reaction phase.
    /// - Evaluating: evaluates the stored reply.
    /// - AwaitingCompanyResponse: returns the outstanding suspension unchanged.
    pub fn advance(&mut self, session_id: &str) -> SimResult<RoundResultView> {
        let checkpoint = self.load_open(session_id)?;
        match checkpoint.phase {
            DriverPhase::Created => {
                let view_base = checkpoint.clone();
                let suspension = self.react_and_suspend(checkpoint)?;
                Ok(RoundResultView::suspended(&view_base, suspension))
            }
            DriverPhase::Evaluating => self.finish_round(checkpoint),
            DriverPhase::AwaitingCompanyResponse => match checkpoint.pending.clone() {
                Some(suspension) => Ok(RoundResultView::suspended(&checkpoint, suspension)),
                None => Err(SimError::NoPendingSuspension {
                    session_id: session_id.to_string(),
                    phase:      checkpoint.phase.to_string(),
                }),
            },
            DriverPhase::Terminal => Err(SimError::SessionClosed {
                session_id: session_id.to_string(),
            }),
        }
    }

    /// The outstanding suspension, if the session is waiting for a reply.
    pub fn pending(&self, session_id: &str) -> SimResult<Option<Suspension>> {
        Ok(self.checkpoint(session_id)?.pending)
    }

    /// The latest stored checkpoint, open or closed.
    pub fn checkpoint(&self, session_id: &str) -> SimResult<Checkpoint> {
        self.store
            .load(session_id)?
            .ok_or_else(|| SimError::SessionNotFound { session_id: session_id.to_string() })
    }

    /// The final view of a closed session, `None` while it is still open.
    pub fn final_view(&self, session_id: &str) -> SimResult<Option<RoundResultView>> {
        let checkpoint = self.checkpoint(session_id)?;
        Ok(checkpoint.is_closed().then(|| RoundResultView::finished(&checkpoint)))
    }

    /// Audit events trail the checkpoint. A failed append is logged and the
    /// already-saved step stands.
    fn audit(&mut self, session_id: &str, round: Round, event: &SessionEvent) {
        if let Err(e) = self.store.append_event(session_id, round, event) {
            log::warn!("session={session_id} could not record {}: {e}", event.type_name());
        }
    }

    fn load_open(&self, session_id: &str) -> SimResult<Checkpoint> {
        let checkpoint = self.checkpoint(session_id)?;
        if checkpoint.is_closed() {
            return Err(SimError::SessionClosed { session_id: session_id.to_string() });
        }
        Ok(checkpoint)
    }

    /// Reaction phase + suspension. Nothing is written if the generator fails.
    fn react_and_suspend(&mut self, mut checkpoint: Checkpoint) -> SimResult<Suspension> {
        let session_id = checkpoint.session_id.clone();
        let round = checkpoint.state.iteration + 1;
        let anger = anger_from_reputation(checkpoint.state.reputation_score);

        let (state, suspension) = match self.engine.react(&checkpoint.state) {
            Ok(out) => out,
            Err(e) => {
                log::error!("session={session_id} round={round} reaction failed: {e}");
                self.audit(&session_id, round, &SessionEvent::ReactionFailed { round, error: e.to_string() });
                return Err(e);
            }
        };

        checkpoint.state = state;
        checkpoint.pending = Some(suspension.clone());
        checkpoint.phase = DriverPhase::AwaitingCompanyResponse;
        self.store.save(&checkpoint)?;
        self.audit(
            &session_id,
            round,
            &SessionEvent::WaveGenerated {
                round,
                anger,
                chars: suspension.community_wave.len(),
            },
        );
        log::debug!("session={session_id} round={round} awaiting company response");
        Ok(suspension)
    }

    /// Evaluation + decision for a checkpoint in the Evaluating phase.
    fn finish_round(&mut self, mut checkpoint: Checkpoint) -> SimResult<RoundResultView> {
        let session_id = checkpoint.session_id.clone();
        let reply = checkpoint.state.company_response.clone().ok_or_else(|| {
            anyhow::anyhow!("session {session_id} is evaluating without a stored reply")
        })?;

        let before = checkpoint.state.reputation_score;
        checkpoint.state = self.engine.evaluate(&checkpoint.state, reply);
        let after = checkpoint.state.reputation_score;
        let round = checkpoint.state.iteration;
        let status = checkpoint.state.status;

        if after < before {
            log::warn!("session={session_id} round={round} reputation drop: {before} -> {after}");
        }

        let eval = checkpoint.state.last_eval.clone().unwrap_or_else(Evaluation::fallback);
        let evaluated = SessionEvent::RoundEvaluated {
            round,
            label:             eval.label,
            eval_score:        eval.score,
            reputation_before: before,
            reputation_after:  after,
            status,
        };

        if status.is_terminal() {
            checkpoint.phase = DriverPhase::Terminal;
            self.store.save(&checkpoint)?;
            self.audit(&session_id, round, &evaluated);
            self.audit(
                &session_id,
                round,
                &SessionEvent::SessionClosed { status, reputation_score: after, rounds: round },
            );
            log::info!("session={session_id} closed: {status} after {round} rounds (reputation {after})");
            return Ok(RoundResultView::finished(&checkpoint));
        }

        checkpoint.phase = DriverPhase::Created;
        self.store.save(&checkpoint)?;
        self.audit(&session_id, round, &evaluated);

        let view_base = checkpoint.clone();
        let suspension = self.react_and_suspend(checkpoint)?;
        Ok(RoundResultView::suspended(&view_base, suspension))
    }
}
