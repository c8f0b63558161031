//! Session audit events.
//!
//! Every state-producing step of the driver appends one event. The log is
//! never read back by the simulation itself; it exists for replay tooling
//! and post-mortems once a session is closed.

use crate::{
    state::{EvalLabel, Status},
    types::{Round, Score, SessionId},
};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        session_id: SessionId,
        cause:      String,
    },
    WaveGenerated {
        round: Round,
        anger: Score,
        chars: usize,
    },
    ReactionFailed {
        round: Round,
        error: String,
    },
    ResponseReceived {
        round: Round,
        chars: usize,
    },
    RoundEvaluated {
        round:             Round,
        label:             EvalLabel,
        eval_score:        Score,
        reputation_before: Score,
        reputation_after:  Score,
        status:            Status,
    },
    SessionClosed {
        status:           Status,
        reputation_score: Score,
        rounds:           Round,
    },
}

impl SessionEvent {
    /// Stable name for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. }   => "session_started",
            SessionEvent::WaveGenerated { .. }    => "wave_generated",
            SessionEvent::ReactionFailed { .. }   => "reaction_failed",
            SessionEvent::ResponseReceived { .. } => "response_received",
            SessionEvent::RoundEvaluated { .. }   => "round_evaluated",
            SessionEvent::SessionClosed { .. }    => "session_closed",
        }
    }
}

/// A persisted event log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub session_id: SessionId,
    pub round:      Round,
    pub event_type: String,
    pub payload:    String,
    pub created_at: String,
}
