//! Shared primitive types used across the entire simulation.

/// The opaque identifier of one simulation run (a session).
pub type SessionId = String;

/// A round counter. One round = one wave, one reply, one evaluation.
pub type Round = u32;

/// Reputation score on the integer scale [0, 100].
pub type Score = i64;
