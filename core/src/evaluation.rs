//! Parsing of the generator's rubric output.
//!
//! The generator is asked for a bare JSON object but models wrap it in
//! code fences or prose often enough that we try a few candidates before
//! giving up. Giving up is never an error: the caller substitutes
//! `Evaluation::fallback()`.

use crate::state::{EvalLabel, Evaluation};
use serde_json::{Map, Value};

const DEFAULT_SCORE: i64 = 50;

/// Parse rubric output, or `None` if no candidate is a JSON object.
pub fn parse_evaluation(raw: &str) -> Option<Evaluation> {
    candidates(raw)
        .into_iter()
        .find_map(|text| match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(from_object(&map)),
            _ => None,
        })
}

/// Parse rubric output, substituting the fallback evaluation on failure.
pub fn evaluation_or_fallback(raw: &str) -> Evaluation {
    parse_evaluation(raw).unwrap_or_else(|| {
        log::warn!("could not parse evaluation ({} chars), using fallback", raw.len());
        Evaluation::fallback()
    })
}

/// The whole text first, then fenced segments from last to first.
fn candidates(raw: &str) -> Vec<&str> {
    let trimmed = raw.trim();
    let mut out = vec![trimmed];
    if trimmed.contains("```") {
        out.extend(
            trimmed
                .rsplit("```")
                .map(|seg| seg.trim())
                .map(|seg| seg.strip_prefix("json").unwrap_or(seg).trim())
                .filter(|seg| !seg.is_empty()),
        );
    }
    out
}

fn from_object(map: &Map<String, Value>) -> Evaluation {
    let score = match map.get("score") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(DEFAULT_SCORE),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_SCORE),
        _ => DEFAULT_SCORE,
    };
    let label = match map.get("label") {
        None | Some(Value::Null) => EvalLabel::Mixed,
        Some(Value::String(s))   => EvalLabel::parse(s),
        Some(_)                  => EvalLabel::Unknown,
    };
    Evaluation {
        score,
        label,
        reasons:     string_list(map.get("reasons")),
        suggestions: string_list(map.get("suggestions")),
        resolved:    flag(map.get("resolved")),
        catastrophe: flag(map.get("catastrophe")),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Truthy the way a loosely typed model output means it: booleans,
/// "true"/"yes" strings and nonzero numbers.
fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b))   => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1"
        ),
        _ => false,
    }
}
