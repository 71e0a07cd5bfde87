//! The LLM oracle contract (spec §6.1): a single system/user prompt pair
//! in, free text (plus optional usage accounting) out. No multi-turn
//! history, no tool calling — that belongs to whatever builds the
//! prompt, not to this crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token accounting reported by the provider, when it reports one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A completed oracle call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<LlmUsage>,
}

/// Per-call parameters layered on top of the model's own defaults.
#[derive(Debug, Clone)]
pub struct LlmParams {
    pub timeout: Duration,
}

impl Default for LlmParams {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}
