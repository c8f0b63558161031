//! Narrative generator — the only door to the outside world.
//!
//! The round engine asks for text in two places: a wave of community
//! comments, and a rubric evaluation of the company's reply. Both go
//! through `NarrativeGenerator::generate`. Calls are synchronous and may
//! block for as long as the backend takes.

use crate::config::GeneratorConfig;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, sync::Mutex, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("backend returned no content")]
    EmptyResponse,

    #[error("API key variable '{0}' is not set")]
    MissingApiKey(String),

    #[error("scripted generator: {0}")]
    Script(String),
}

/// Produce text for a system instruction and a user prompt.
pub trait NarrativeGenerator {
    /// Stable backend name, used in logs.
    fn name(&self) -> &str;

    fn generate(&self, system: &str, user: &str) -> Result<String, GeneratorError>;
}

impl<T: NarrativeGenerator + ?Sized> NarrativeGenerator for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn generate(&self, system: &str, user: &str) -> Result<String, GeneratorError> {
        (**self).generate(system, user)
    }
}

impl<T: NarrativeGenerator + ?Sized> NarrativeGenerator for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn generate(&self, system: &str, user: &str) -> Result<String, GeneratorError> {
        (**self).generate(system, user)
    }
}

// ── OpenAI-compatible chat completions ─────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role:    String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model:       &'a str,
    messages:    Vec<Message>,
    temperature: f32,
    max_tokens:  u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Blocking client for any backend speaking the chat completions protocol.
pub struct ChatCompletionsGenerator {
    config:  GeneratorConfig,
    api_key: String,
    client:  reqwest::blocking::Client,
}

impl ChatCompletionsGenerator {
    /// Build a client from config. The API key is read once, here.
    pub fn from_config(config: GeneratorConfig) -> Result<Self, GeneratorError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| GeneratorError::MissingApiKey(config.api_key_env.clone()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, api_key, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }
}

impl NarrativeGenerator for ChatCompletionsGenerator {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn generate(&self, system: &str, user: &str) -> Result<String, GeneratorError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                Message { role: "system".into(), content: system.to_string() },
                Message { role: "user".into(),   content: user.to_string() },
            ],
            temperature: self.config.temperature,
            max_tokens:  self.config.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| if e.is_timeout() { GeneratorError::Timeout } else { e.into() })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GeneratorError::Api { status: status.as_u16(), body });
        }

        let parsed: ChatResponse = response.json()?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(GeneratorError::EmptyResponse)?;
        log::debug!("{} returned {} chars", self.config.model, content.len());
        Ok(content)
    }
}

// ── Scripted stub ──────────────────────────────────────────────

/// One recorded `generate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorCall {
    pub system: String,
    pub user:   String,
}

/// Deterministic generator that replays queued responses in FIFO order.
/// Used in tests and for offline dry runs.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, GeneratorError>>>,
    calls:     Mutex<Vec<GeneratorCall>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    /// Queue a failure.
    pub fn fail(self, err: GeneratorError) -> Self {
        self.push(Err(err));
        self
    }

    pub fn push(&self, response: Result<String, GeneratorError>) {
        self.lock_responses().push_back(response);
    }

    pub fn remaining(&self) -> usize {
        self.lock_responses().len()
    }

    pub fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, GeneratorError>>> {
        self.responses.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl NarrativeGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, system: &str, user: &str) -> Result<String, GeneratorError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(GeneratorCall { system: system.to_string(), user: user.to_string() });
        self.lock_responses()
            .pop_front()
            .unwrap_or_else(|| Err(GeneratorError::Script("no scripted response left".into())))
    }
}
