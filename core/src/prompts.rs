//! Prompt construction for both generator call sites.

use crate::types::Score;

/// Separator between prior waves quoted back to the generator.
const WAVE_SEPARATOR: &str = "\n\n---\n";

pub const REACTION_SYSTEM: &str = "You simulate the broad social media community during a PR crisis. \
Write realistic, critical comments that are never discriminatory. \
Avoid insults, threats and slurs. Give the company no advice.";

pub const EVALUATION_SYSTEM: &str = "Rate the company's response on a scale of 0-100 (0 very poor, 100 excellent) \
against these criteria: (1) taking responsibility, (2) empathy, (3) concrete remedial actions, \
(4) transparency and clarity, (5) tone (not defensive, not downplaying). \
Return JSON with the fields: score (int), label ('poor'|'mixed'|'good'), \
reasons (array of short strings), suggestions (array of short strings), \
resolved (bool, true if the response would realistically calm things down), \
catastrophe (bool, only if the response makes the situation massively worse). \
No text outside the JSON.";

/// Inputs for one community wave.
#[derive(Debug, Clone)]
pub struct ReactionPrompt<'a> {
    pub cause:            &'a str,
    pub company_response: Option<&'a str>,
    pub prior_waves:      &'a [String],
    pub anger:            Score,
}

impl ReactionPrompt<'_> {
    pub fn render(&self) -> String {
        let company = match self.company_response {
            Some(r) if !r.is_empty() => r,
            _ => "(none so far)",
        };
        let prior = if self.prior_waves.is_empty() {
            "(none yet)".to_string()
        } else {
            self.prior_waves.join(WAVE_SEPARATOR)
        };
        format!(
            "Cause: {cause}\n\n\
             Latest company response (if any):\n{company}\n\n\
             Excerpts of previous reactions:\n{prior}\n\n\
             Current anger level (0-100): {anger}\n\n\
             Task:\n\
             - Write 5 very short, distinct social media comments (1-2 sentences each).\n\
             - Tone: clearly more critical and outraged at a high anger level; mixed or cooling down at a low one.\n\
             - Format as a numbered list 1.-5.\n\
             - No advice, no insulting language.\n",
            cause = self.cause,
            anger = self.anger,
        )
    }
}

/// Inputs for one rubric evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationPrompt<'a> {
    pub cause:       &'a str,
    pub latest_wave: Option<&'a str>,
    pub reply:       &'a str,
}

impl EvaluationPrompt<'_> {
    pub fn render(&self) -> String {
        format!(
            "Cause: {cause}\n\n\
             Most recent community reactions:\n{wave}\n\n\
             Company response (to be rated):\n\"\"\"{reply}\"\"\"\n\n\
             Apply the rubric and answer with JSON only.\n",
            cause = self.cause,
            wave = self.latest_wave.unwrap_or("(none)"),
            reply = self.reply,
        )
    }
}
