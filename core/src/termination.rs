//! Termination policy — decides whether a session continues.
//!
//! ORDER (fixed): resolved is checked before catastrophe. A response
//! flagged both resolved and catastrophic resolves the session.

use crate::{state::Status, types::{Round, Score}};

/// Score at or above which the crisis is over.
pub const RESOLVED_SCORE: Score = 80;
/// Score at or below which the crisis is lost.
pub const CATASTROPHE_SCORE: Score = 15;
/// Rounds after which a middling score counts as lost.
pub const LATE_ROUND: Round = 6;
/// Scores below this are lost once `LATE_ROUND` is reached.
pub const LATE_ROUND_FLOOR: Score = 60;

/// `iteration` is the number of rounds completed before the one being decided.
pub fn decide(
    resolved_flag:    bool,
    catastrophe_flag: bool,
    new_score:        Score,
    iteration:        Round,
) -> Status {
    if resolved_flag || new_score >= RESOLVED_SCORE {
        Status::Resolved
    } else if catastrophe_flag
        || new_score <= CATASTROPHE_SCORE
        || (iteration >= LATE_ROUND && new_score < LATE_ROUND_FLOOR)
    {
        Status::Catastrophe
    } else {
        Status::Ongoing
    }
}
