//! Store methods for session checkpoints.

use super::{now_rfc3339, SimStore};
use crate::{
    checkpoint::{Checkpoint, CheckpointStore, DriverPhase},
    error::{SimError, SimResult},
    event::SessionEvent,
    types::{Round, Score, SessionId},
};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::Serialize;

/// One row of the session listing, without the full checkpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id:       SessionId,
    pub cause:            String,
    pub phase:            String,
    pub status:           String,
    pub iteration:        Round,
    pub reputation_score: Score,
    pub updated_at:       String,
}

impl CheckpointStore for SimStore {
    fn create(&mut self, checkpoint: &Checkpoint) -> SimResult<()> {
        let json = serde_json::to_string(checkpoint)?;
        let now = now_rfc3339();
        // Immediate: take the write lock up front so the existence check and
        // the insert see the same database state.
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM session WHERE session_id = ?1",
                params![&checkpoint.session_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(SimError::SessionExists {
                session_id: checkpoint.session_id.clone(),
            });
        }

        tx.execute(
            "INSERT INTO session (
                session_id, cause, phase, status, iteration, reputation_score,
                checkpoint_json, created_at, updated_at, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, NULL)",
            params![
                &checkpoint.session_id,
                &checkpoint.state.cause,
                checkpoint.phase.as_str(),
                checkpoint.state.status.as_str(),
                checkpoint.state.iteration,
                checkpoint.state.reputation_score,
                json,
                now,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> SimResult<()> {
        let json = serde_json::to_string(checkpoint)?;
        let now = now_rfc3339();
        let closed_at = (checkpoint.phase == DriverPhase::Terminal).then(|| now.clone());

        let updated = self.conn.execute(
            "UPDATE session
             SET phase = ?2, status = ?3, iteration = ?4, reputation_score = ?5,
                 checkpoint_json = ?6, updated_at = ?7,
                 closed_at = COALESCE(closed_at, ?8)
             WHERE session_id = ?1",
            params![
                &checkpoint.session_id,
                checkpoint.phase.as_str(),
                checkpoint.state.status.as_str(),
                checkpoint.state.iteration,
                checkpoint.state.reputation_score,
                json,
                now,
                closed_at,
            ],
        )?;
        if updated == 0 {
            return Err(SimError::SessionNotFound {
                session_id: checkpoint.session_id.clone(),
            });
        }
        Ok(())
    }

    fn load(&self, session_id: &str) -> SimResult<Option<Checkpoint>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT checkpoint_json FROM session WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    fn append_event(&mut self, session_id: &str, round: Round, event: &SessionEvent) -> SimResult<()> {
        self.insert_event(session_id, round, event)
    }
}

impl SimStore {
    /// All sessions, most recently updated first.
    pub fn list_sessions(&self) -> SimResult<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, cause, phase, status, iteration, reputation_score, updated_at
             FROM session ORDER BY updated_at DESC, session_id ASC",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(SessionSummary {
                    session_id:       r.get(0)?,
                    cause:            r.get(1)?,
                    phase:            r.get(2)?,
                    status:           r.get(3)?,
                    iteration:        r.get(4)?,
                    reputation_score: r.get(5)?,
                    updated_at:       r.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Raw checkpoint JSON as stored (for tests and tooling).
    pub fn checkpoint_json(&self, session_id: &str) -> SimResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT checkpoint_json FROM session WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Timestamp at which the session reached a terminal status, if it has.
    pub fn session_closed_at(&self, session_id: &str) -> SimResult<Option<String>> {
        let closed: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT closed_at FROM session WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(closed.flatten())
    }
}
