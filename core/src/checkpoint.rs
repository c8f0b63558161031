//! Checkpoints — the durable record of one session.
//!
//! A checkpoint captures the full `SimState` plus the driver's phase and
//! the pending suspension, if any. It is written after every
//! state-producing step so that a session can be resumed after a restart
//! from exactly where it stopped.

use crate::{
    error::SimResult,
    event::SessionEvent,
    round::Suspension,
    state::SimState,
    types::{Round, SessionId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverPhase {
    /// No round in flight; the next step is a reaction phase.
    Created,
    /// One suspension is outstanding.
    AwaitingCompanyResponse,
    /// The reply is stored; its evaluation is not.
    Evaluating,
    /// Status is resolved or catastrophe. The session is closed.
    Terminal,
}

impl DriverPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverPhase::Created                 => "created",
            DriverPhase::AwaitingCompanyResponse => "awaiting_company_response",
            DriverPhase::Evaluating              => "evaluating",
            DriverPhase::Terminal                => "terminal",
        }
    }
}

impl fmt::Display for DriverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub session_id: SessionId,
    pub phase:      DriverPhase,
    pub state:      SimState,
    pub pending:    Option<Suspension>,
}

impl Checkpoint {
    pub fn new(session_id: SessionId, state: SimState) -> Self {
        Self { session_id, phase: DriverPhase::Created, state, pending: None }
    }

    pub fn is_closed(&self) -> bool {
        self.phase == DriverPhase::Terminal
    }
}

/// Durable, per-session key-value storage for checkpoints.
///
/// Implementations must give read-your-writes per session: a `load` issued
/// after a successful `save` for the same session sees that save.
pub trait CheckpointStore {
    /// Insert a new session. Fails with `SessionExists` if the id is taken.
    fn create(&mut self, checkpoint: &Checkpoint) -> SimResult<()>;

    /// Overwrite an existing session's checkpoint.
    fn save(&mut self, checkpoint: &Checkpoint) -> SimResult<()>;

    fn load(&self, session_id: &str) -> SimResult<Option<Checkpoint>>;

    /// Append an audit event. Stores without an audit trail ignore it.
    fn append_event(
        &mut self,
        _session_id: &str,
        _round:      Round,
        _event:      &SessionEvent,
    ) -> SimResult<()> {
        Ok(())
    }
}
