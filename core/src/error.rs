use thiserror::Error;

use crate::generator::GeneratorError;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Narrative generator failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Session '{session_id}' already exists")]
    SessionExists { session_id: String },

    #[error("Session '{session_id}' not found")]
    SessionNotFound { session_id: String },

    #[error("Session '{session_id}' has no pending suspension (phase: {phase})")]
    NoPendingSuspension { session_id: String, phase: String },

    #[error("Session '{session_id}' is closed")]
    SessionClosed { session_id: String },

    #[error("No further rounds: session state is already {status}")]
    TerminalState { status: String },

    #[error("Session '{session_id}' was created but its first round failed: {source}")]
    RoundFailed {
        session_id: String,
        #[source]
        source: Box<SimError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    /// True for errors caused by calling the driver out of protocol.
    /// These never touch stored state.
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(
            self,
            SimError::SessionExists { .. }
                | SimError::SessionNotFound { .. }
                | SimError::NoPendingSuspension { .. }
                | SimError::SessionClosed { .. }
                | SimError::TerminalState { .. }
        )
    }

    /// Session id carried by the error, when the session was persisted
    /// before the failure and can be resumed with `advance`.
    pub fn recoverable_session(&self) -> Option<&str> {
        match self {
            SimError::RoundFailed { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
