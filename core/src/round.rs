//! The round engine — one community wave, one reply, one evaluation.
//!
//! PHASES (fixed order):
//!   1. Reaction:   generate a wave of comments, append it to the log.
//!   2. Suspend:    hand the wave to the caller and stop.
//!   3. Evaluation: score the caller's reply against the rubric.
//!   4. Decide:     apply the reputation delta and the termination policy.
//!
//! RULES:
//!   - Every phase works on a copy. A failed phase leaves its input untouched.
//!   - Reaction-phase generator errors propagate; there is no stand-in wave.
//!   - Evaluation-phase errors never propagate; the fallback evaluation is used.
//!   - No generator call is ever retried.

use crate::{
    error::{SimError, SimResult},
    evaluation::evaluation_or_fallback,
    generator::NarrativeGenerator,
    prompts::{EvaluationPrompt, ReactionPrompt, EVALUATION_SYSTEM, REACTION_SYSTEM},
    reputation::{anger_from_reputation, apply_delta},
    state::{Evaluation, SimState},
    termination::decide,
    types::Round,
};
use serde::{Deserialize, Serialize};

/// How many earlier waves the reaction prompt quotes back.
pub const REACTION_CONTEXT_WAVES: usize = 2;

const SUSPENSION_MESSAGE: &str =
    "Write your company response (tweet, statement or post) to this wave of comments.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionKind {
    CompanyResponseRequired,
}

/// What the caller is shown while the round waits for a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suspension {
    pub kind:           SuspensionKind,
    pub message:        String,
    pub community_wave: String,
    /// 1-based number of the round awaiting the reply.
    pub round:          Round,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    Suspended { state: SimState, suspension: Suspension },
    Completed(SimState),
}

pub struct RoundEngine<G> {
    generator: G,
}

impl<G: NarrativeGenerator> RoundEngine<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Drive a round up to its next stop.
    /// Without a reply this runs the reaction phase and suspends; with a
    /// reply it runs the evaluation phase and completes.
    pub fn run_round(&self, state: &SimState, reply: Option<String>) -> SimResult<RoundOutcome> {
        match reply {
            None => {
                let (state, suspension) = self.react(state)?;
                Ok(RoundOutcome::Suspended { state, suspension })
            }
            Some(reply) => Ok(RoundOutcome::Completed(self.evaluate(state, reply))),
        }
    }

    /// Reaction phase. Returns the state with the new wave appended.
    /// A terminal state is rejected with `TerminalState` and nothing is generated.
    pub fn react(&self, state: &SimState) -> SimResult<(SimState, Suspension)> {
        if state.is_terminal() {
            return Err(SimError::TerminalState { status: state.status.to_string() });
        }

        let anger = anger_from_reputation(state.reputation_score);
        let prompt = ReactionPrompt {
            cause:            &state.cause,
            company_response: state.company_response.as_deref(),
            prior_waves:      state.recent_reactions(REACTION_CONTEXT_WAVES),
            anger,
        }
        .render();

        let wave = self.generator.generate(REACTION_SYSTEM, &prompt)?.trim().to_string();
        log::debug!(
            "round={} wave generated by {} (anger={anger}, {} chars)",
            state.iteration + 1,
            self.generator.name(),
            wave.len()
        );

        let mut next = state.clone();
        next.community_reactions.push(wave.clone());

        let suspension = Suspension {
            kind:           SuspensionKind::CompanyResponseRequired,
            message:        SUSPENSION_MESSAGE.to_string(),
            community_wave: wave,
            round:          state.iteration + 1,
        };
        Ok((next, suspension))
    }

    /// Evaluation and decision phases. Never fails.
    pub fn evaluate(&self, state: &SimState, reply: String) -> SimState {
        let mut next = state.clone();

        let prompt = EvaluationPrompt {
            cause:       &state.cause,
            latest_wave: state.community_reactions.last().map(String::as_str),
            reply:       &reply,
        }
        .render();

        let eval = match self.generator.generate(EVALUATION_SYSTEM, &prompt) {
            Ok(raw) => evaluation_or_fallback(&raw),
            Err(e) => {
                log::warn!("evaluation call failed ({e}), using fallback");
                Evaluation::fallback()
            }
        };

        let new_score = apply_delta(state.reputation_score, eval.label);
        let status = decide(eval.resolved, eval.catastrophe, new_score, state.iteration);

        log::debug!(
            "round={} label={} score {} -> {new_score}, status={status}",
            state.iteration + 1,
            eval.label,
            state.reputation_score
        );

        next.company_response = Some(reply);
        next.reputation_score = new_score;
        next.iteration = state.iteration + 1;
        next.status = status;
        next.last_eval = Some(eval);
        next
    }
}
