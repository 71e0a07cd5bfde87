use crate::failover::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Which LLM API shape a model speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Claude,
    OpenAi,
}

/// Reasoning models (o1-style) take `max_completion_tokens` and ignore a
/// custom `temperature`; general models take `max_tokens` and a low
/// `temperature` for determinism. The Orchestrator picks the class per
/// role (spec §4.7: Planner/Reviewer lean reasoning, Developer/QA lean
/// general).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    Reasoning,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: LlmProvider,
    pub model_id: String,
    pub api_key: String,
    pub api_base_url: Option<String>,
    pub class: ModelClass,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Ignored by reasoning-class models.
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    /// OpenAI `reasoning_effort`; ignored outside the reasoning class.
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_temperature() -> Option<f32> {
    Some(0.2)
}

fn default_max_tokens() -> u32 {
    4096
}

impl ModelConfig {
    pub fn base_url(&self) -> &str {
        match &self.api_base_url {
            Some(url) => url,
            None => match self.provider {
                LlmProvider::Claude => "https://api.anthropic.com",
                LlmProvider::OpenAi => "https://api.openai.com",
            },
        }
    }
}

/// An ordered list of models to try for one logical call. The
/// Orchestrator builds one chain per role per spec §4.7 ("model
/// fallback chain"); the first entry is the preferred model, later
/// entries are progressively cheaper or more available fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelChain {
    pub models: Vec<ModelConfig>,
}

impl ModelChain {
    pub fn new(models: Vec<ModelConfig>) -> Self {
        Self { models }
    }

    pub fn single(model: ModelConfig) -> Self {
        Self {
            models: vec![model],
        }
    }
}
