//! Round engine tests.
//!
//! Tests cover: reaction phase bookkeeping, bounded prompt context,
//! reaction failures, terminal-state rejection, evaluation fallback, reputation and status updates.

use crisis_core::{
    error::SimError,
    generator::{GeneratorError, ScriptedGenerator},
    round::{RoundEngine, RoundOutcome, SuspensionKind},
    state::{EvalLabel, Evaluation, SimState, Status},
};

const GOOD_RESOLVED: &str =
    r#"{"score": 90, "label": "good", "reasons": ["took ownership"], "suggestions": [], "resolved": true, "catastrophe": false}"#;
const POOR: &str =
    r#"{"score": 20, "label": "poor", "reasons": ["defensive"], "suggestions": ["apologise"], "resolved": false, "catastrophe": false}"#;

fn engine(generator: ScriptedGenerator) -> RoundEngine<ScriptedGenerator> {
    RoundEngine::new(generator)
}

/// The reaction phase appends exactly one wave and suspends for a reply.
#[test]
fn reaction_appends_wave_and_suspends() {
    let engine = engine(ScriptedGenerator::new().reply("  1. outrage\n2. more outrage  "));
    let state = SimState::new("product defect");

    let outcome = engine.run_round(&state, None).unwrap();
    let (next, suspension) = match outcome {
        RoundOutcome::Suspended { state, suspension } => (state, suspension),
        other => panic!("expected a suspension, got {other:?}"),
    };

    assert_eq!(next.community_reactions, ["1. outrage\n2. more outrage"]);
    assert_eq!(suspension.community_wave, "1. outrage\n2. more outrage");
    assert_eq!(suspension.kind, SuspensionKind::CompanyResponseRequired);
    assert_eq!(suspension.round, 1);
    assert_eq!(next.iteration, 0, "iteration only moves when a round completes");
    assert_eq!(next.reputation_score, 50);
    assert!(state.community_reactions.is_empty(), "input state must not be touched");
}

/// A generator failure in the reaction phase propagates and appends nothing.
#[test]
fn reaction_failure_propagates_without_partial_state() {
    let engine = engine(ScriptedGenerator::new().fail(GeneratorError::Cancelled));
    let state = SimState::new("data leak");

    let err = engine.react(&state).unwrap_err();
    assert!(err.to_string().contains("cancelled"), "unexpected error: {err}");
    assert!(state.community_reactions.is_empty());
}

/// A terminal state cannot start another round and never reaches the generator.
#[test]
fn terminal_state_is_rejected_without_generating() {
    let generator = ScriptedGenerator::new().reply("should never be used");
    let engine = engine(generator);
    let mut state = SimState::new("recall");
    state.status = Status::Catastrophe;

    let err = engine.run_round(&state, None).unwrap_err();
    assert!(
        matches!(&err, SimError::TerminalState { status } if status == "catastrophe"),
        "unexpected error: {err}"
    );
    assert!(err.is_protocol_misuse());
    assert_eq!(engine.generator().calls().len(), 0, "no generator call for a closed state");
    assert_eq!(engine.generator().remaining(), 1);
}

/// The reaction prompt quotes at most the two most recent waves.
#[test]
fn reaction_prompt_context_is_bounded() {
    let engine = engine(ScriptedGenerator::new().reply("wave-four"));
    let mut state = SimState::new("data leak");
    state.community_reactions = vec![
        "wave-one-marker".into(),
        "wave-two-marker".into(),
        "wave-three-marker".into(),
    ];
    state.iteration = 3;
    state.reputation_score = 30;
    state.company_response = Some("we are investigating".into());

    engine.react(&state).unwrap();

    let calls = engine.generator().calls();
    assert_eq!(calls.len(), 1);
    let prompt = &calls[0].user;
    assert!(!prompt.contains("wave-one-marker"), "oldest wave must be dropped");
    assert!(prompt.contains("wave-two-marker"));
    assert!(prompt.contains("wave-three-marker"));
    assert!(prompt.contains("Current anger level (0-100): 70"));
    assert!(prompt.contains("we are investigating"));
}

/// The evaluation prompt carries only the latest wave and the reply.
#[test]
fn evaluation_prompt_uses_latest_wave_only() {
    let engine = engine(ScriptedGenerator::new().reply(POOR));
    let mut state = SimState::new("data leak");
    state.community_reactions = vec!["older-wave".into(), "latest-wave".into()];
    state.iteration = 1;

    engine.evaluate(&state, "sorry for the inconvenience".into());

    let prompt = &engine.generator().calls()[0].user;
    assert!(prompt.contains("latest-wave"));
    assert!(!prompt.contains("older-wave"));
    assert!(prompt.contains("sorry for the inconvenience"));
}

/// A resolved flag resolves the round even though 70 < 80.
#[test]
fn resolved_flag_resolves_below_threshold() {
    let engine = engine(ScriptedGenerator::new().reply(GOOD_RESOLVED));
    let mut state = SimState::new("product defect");
    state.community_reactions.push("1. angry".into());

    let outcome = engine.run_round(&state, Some("We are recalling the product.".into())).unwrap();
    let next = match outcome {
        RoundOutcome::Completed(state) => state,
        other => panic!("expected completion, got {other:?}"),
    };

    assert_eq!(next.reputation_score, 70);
    assert_eq!(next.status, Status::Resolved);
    assert_eq!(next.iteration, 1);
    assert_eq!(next.company_response.as_deref(), Some("We are recalling the product."));
    assert_eq!(next.last_eval.as_ref().map(|e| e.label), Some(EvalLabel::Good));
}

/// Non-JSON evaluation output yields the exact fallback, with no retry.
#[test]
fn malformed_evaluation_uses_fallback() {
    let engine = engine(ScriptedGenerator::new().reply("The response was decent overall."));
    let mut state = SimState::new("price hike");
    state.community_reactions.push("1. meh".into());

    let next = engine.evaluate(&state, String::new());

    assert_eq!(next.last_eval, Some(Evaluation::fallback()));
    assert_eq!(next.reputation_score, 50, "mixed fallback leaves the score alone");
    assert_eq!(next.status, Status::Ongoing);
    assert_eq!(next.company_response.as_deref(), Some(""));
    assert_eq!(engine.generator().calls().len(), 1, "no retry");
}

/// A generator error during evaluation is absorbed by the fallback.
#[test]
fn evaluation_generator_error_uses_fallback() {
    let engine = engine(ScriptedGenerator::new().fail(GeneratorError::Timeout));
    let mut state = SimState::new("price hike");
    state.community_reactions.push("1. meh".into());

    let next = engine.evaluate(&state, "we hear you".into());

    assert_eq!(next.last_eval, Some(Evaluation::fallback()));
    assert_eq!(next.iteration, 1);
}

/// Community waves stay in step with completed rounds.
#[test]
fn reactions_track_iterations() {
    let engine = engine(
        ScriptedGenerator::new()
            .reply("w1").reply(POOR)
            .reply("w2").reply(POOR),
    );
    let mut state = SimState::new("strike");
    for round in 1..=2 {
        let (reacted, _) = engine.react(&state).unwrap();
        state = engine.evaluate(&reacted, "no comment".into());
        assert_eq!(state.community_reactions.len(), state.iteration as usize);
        assert_eq!(state.iteration, round);
    }
    assert_eq!(state.reputation_score, 10);
    assert_eq!(state.status, Status::Catastrophe);
}
