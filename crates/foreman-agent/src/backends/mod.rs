pub mod claude;
pub mod openai;

use crate::config::ModelConfig;
use crate::llm::{LlmParams, LlmResponse};
use async_trait::async_trait;
use foreman_core::ForemanResult;

/// One provider's HTTP transport. Each backend speaks exactly one wire
/// protocol (Claude Messages or OpenAI Chat Completions); model
/// fallback across backends is [`crate::failover::LlmOracle`]'s job, not
/// this trait's.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(
        &self,
        model: &ModelConfig,
        system_prompt: &str,
        user_prompt: &str,
        params: &LlmParams,
    ) -> ForemanResult<LlmResponse>;
}
