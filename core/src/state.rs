//! Simulation state — the single record carried from round to round.
//!
//! RULES:
//!   - `cause` never changes after creation.
//!   - `community_reactions` is append-only, one wave per round.
//!   - `reputation_score` only changes through `reputation::apply_delta`.
//!   - A terminal `status` is never reverted to `Ongoing`.

use crate::types::{Round, Score};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reputation every session starts with.
pub const INITIAL_REPUTATION: Score = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimState {
    pub cause:               String,
    pub company_response:    Option<String>,
    pub community_reactions: Vec<String>,
    pub reputation_score:    Score,
    pub iteration:           Round,
    pub status:              Status,
    pub last_eval:           Option<Evaluation>,
}

impl SimState {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause:               cause.into(),
            company_response:    None,
            community_reactions: Vec::new(),
            reputation_score:    INITIAL_REPUTATION,
            iteration:           0,
            status:              Status::Ongoing,
            last_eval:           None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The most recent `n` waves, oldest first.
    pub fn recent_reactions(&self, n: usize) -> &[String] {
        let start = self.community_reactions.len().saturating_sub(n);
        &self.community_reactions[start..]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ongoing,
    Resolved,
    Catastrophe,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Ongoing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ongoing     => "ongoing",
            Status::Resolved    => "resolved",
            Status::Catastrophe => "catastrophe",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rubric label attached to an evaluation.
/// Anything the generator returns outside the three known labels is `Unknown`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvalLabel {
    Poor,
    Mixed,
    Good,
    Unknown,
}

impl EvalLabel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "poor"  => EvalLabel::Poor,
            "mixed" => EvalLabel::Mixed,
            "good"  => EvalLabel::Good,
            _       => EvalLabel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvalLabel::Poor    => "poor",
            EvalLabel::Mixed   => "mixed",
            EvalLabel::Good    => "good",
            EvalLabel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EvalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured rubric result for one company response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Evaluation {
    pub score:       Score,
    pub label:       EvalLabel,
    pub reasons:     Vec<String>,
    pub suggestions: Vec<String>,
    pub resolved:    bool,
    pub catastrophe: bool,
}

impl Evaluation {
    /// Substituted whenever the generator's evaluation cannot be used.
    pub fn fallback() -> Self {
        Self {
            score:       40,
            label:       EvalLabel::Mixed,
            reasons:     vec!["could not parse evaluation".to_string()],
            suggestions: vec![
                "clearer apology".to_string(),
                "name concrete remedial actions".to_string(),
            ],
            resolved:    false,
            catastrophe: false,
        }
    }
}
