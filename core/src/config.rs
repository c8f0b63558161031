//! Run configuration.
//!
//! Loaded once by the front end and injected into the driver. Nothing in
//! the core reads the environment on its own.

use serde::{Deserialize, Serialize};

pub const ENV_MODEL:       &str = "CRISIS_SIM_MODEL";
pub const ENV_TEMPERATURE: &str = "CRISIS_SIM_TEMPERATURE";
pub const ENV_API_BASE:    &str = "CRISIS_SIM_API_BASE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Backend model identifier.
    pub model: String,
    /// Sampling variability passed through to the backend.
    pub temperature: f32,
    /// Base URL of an OpenAI-compatible chat completions API.
    pub api_base: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model:        "gpt-4o-mini".to_string(),
            temperature:  0.7,
            api_base:     "https://api.openai.com/v1".to_string(),
            api_key_env:  "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
            max_tokens:   600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: "crisis_sim.sqlite".to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub generator: GeneratorConfig,
    pub store:     StoreConfig,
}

impl SimConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SimConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `CRISIS_SIM_*` environment variables.
    pub fn with_env_overrides(mut self) -> anyhow::Result<Self> {
        if let Ok(model) = std::env::var(ENV_MODEL) {
            self.generator.model = model;
        }
        if let Ok(raw) = std::env::var(ENV_TEMPERATURE) {
            self.generator.temperature = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("{ENV_TEMPERATURE}={raw}: {e}"))?;
        }
        if let Ok(base) = std::env::var(ENV_API_BASE) {
            self.generator.api_base = base;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.generator.model.trim().is_empty() {
            anyhow::bail!("generator.model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            anyhow::bail!(
                "generator.temperature must be in [0, 2], got {}",
                self.generator.temperature
            );
        }
        Ok(())
    }

    /// Configuration for tests: in-memory store, deterministic sampling.
    pub fn default_test() -> Self {
        Self {
            generator: GeneratorConfig {
                model: "scripted".to_string(),
                temperature: 0.0,
                ..GeneratorConfig::default()
            },
            store: StoreConfig { path: ":memory:".to_string() },
        }
    }
}
