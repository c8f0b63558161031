//! Reputation model — maps a rubric label to a score delta.
//!
//! The score lives on the integer scale [0, 100]. Every result is clamped,
//! so no sequence of labels can push it out of range.

use crate::{state::EvalLabel, types::Score};

pub const MIN_SCORE: Score = 0;
pub const MAX_SCORE: Score = 100;

pub fn clamp_score(n: Score) -> Score {
    n.clamp(MIN_SCORE, MAX_SCORE)
}

pub fn label_delta(label: EvalLabel) -> Score {
    match label {
        EvalLabel::Good    =>  20,
        EvalLabel::Mixed   =>   0,
        EvalLabel::Poor    => -20,
        EvalLabel::Unknown =>   0,
    }
}

/// Apply the label's delta to `score` and clamp.
pub fn apply_delta(score: Score, label: EvalLabel) -> Score {
    clamp_score(score.saturating_add(label_delta(label)))
}

/// Low reputation means an angrier community.
pub fn anger_from_reputation(score: Score) -> Score {
    clamp_score(100 - score)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELS: [EvalLabel; 4] = [
        EvalLabel::Poor, EvalLabel::Mixed, EvalLabel::Good, EvalLabel::Unknown,
    ];

    #[test]
    fn output_always_in_range() {
        for start in -50..=150 {
            for label in LABELS {
                let out = apply_delta(start, label);
                assert!(
                    (MIN_SCORE..=MAX_SCORE).contains(&out),
                    "apply_delta({start}, {label}) = {out} out of range"
                );
            }
        }
    }

    #[test]
    fn delta_table() {
        assert_eq!(apply_delta(50, EvalLabel::Good), 70);
        assert_eq!(apply_delta(50, EvalLabel::Mixed), 50);
        assert_eq!(apply_delta(50, EvalLabel::Poor), 30);
        assert_eq!(apply_delta(50, EvalLabel::Unknown), 50);
        assert_eq!(apply_delta(90, EvalLabel::Good), 100);
        assert_eq!(apply_delta(10, EvalLabel::Poor), 0);
    }

    #[test]
    fn anger_mirrors_reputation() {
        assert_eq!(anger_from_reputation(50), 50);
        assert_eq!(anger_from_reputation(0), 100);
        assert_eq!(anger_from_reputation(100), 0);
    }
}
