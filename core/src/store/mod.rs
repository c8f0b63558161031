//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! The driver calls store methods and never executes SQL directly.

use crate::{
    error::{SimError, SimResult},
    event::{EventLogEntry, SessionEvent},
    types::Round,
};
use rusqlite::{params, Connection};
use std::time::Duration;

mod checkpoint;

pub use checkpoint::SessionSummary;

/// How long a writer waits on another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SimStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl SimStore {
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open `path`, treating ":memory:" as a private in-memory database.
    pub fn open_or_memory(path: &str) -> SimResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::open(path)
        }
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> SimResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_sessions.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn insert_event(
        &self,
        session_id: &str,
        round:      Round,
        event:      &SessionEvent,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (session_id, round, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                round,
                event.type_name(),
                serde_json::to_string(event)?,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn events_for_session(&self, session_id: &str) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, round, event_type, payload, created_at
             FROM event_log WHERE session_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![session_id], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    session_id: row.get(1)?,
                    round:      row.get(2)?,
                    event_type: row.get(3)?,
                    payload:    row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Decoded events for a session, in append order.
    pub fn session_events(&self, session_id: &str) -> SimResult<Vec<SessionEvent>> {
        self.events_for_session(session_id)?
            .iter()
            .map(|e| serde_json::from_str::<SessionEvent>(&e.payload).map_err(SimError::from))
            .collect()
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
