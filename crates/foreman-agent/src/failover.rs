//! Model fallback chain execution (spec §4.7): try the chain's models in
//! order, retrying transient failures with exponential backoff before
//! demoting to the next model.

use crate::backends::claude::ClaudeBackend;
use crate::backends::openai::OpenAiBackend;
use crate::backends::LlmBackend;
use crate::config::{LlmProvider, ModelChain};
use crate::llm::{LlmParams, LlmResponse};
use foreman_core::{ForemanError, ForemanResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries per model before moving to the next one.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Transient failures (rate limit, timeout, 5xx) are worth retrying on
/// the same model; anything else (bad request, unparseable response)
/// means the model itself rejected the call and retrying won't help.
pub fn is_retryable(err: &ForemanError) -> bool {
    match err {
        ForemanError::LlmRateLimited(_) | ForemanError::LlmTimeout(_) => true,
        ForemanError::Http(msg) => {
            let lower = msg.to_lowercase();
            if lower.contains("400") {
                false
            } else {
                lower.contains("429")
                    || lower.contains("500")
                    || lower.contains("502")
                    || lower.contains("503")
                    || lower.contains("504")
                    || lower.contains("timeout")
            }
        }
        _ => false,
    }
}

fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// Resolves each [`ModelConfig`](crate::config::ModelConfig)'s provider
/// to a concrete backend and walks a [`ModelChain`], retrying transient
/// errors within a model before demoting to the next one. Returns the
/// last error if every model in the chain fails.
pub struct LlmOracle {
    claude: ClaudeBackend,
    openai: OpenAiBackend,
    policy: RetryPolicy,
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl LlmOracle {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            claude: ClaudeBackend::new(),
            openai: OpenAiBackend::new(),
            policy,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }

    pub async fn complete(
        &self,
        chain: &ModelChain,
        system_prompt: &str,
        user_prompt: &str,
        params: &LlmParams,
    ) -> ForemanResult<LlmResponse> {
        let mut last_err: Option<ForemanError> = None;

        for (idx, model) in chain.models.iter().enumerate() {
            let backend: &dyn LlmBackend = match model.provider {
                LlmProvider::Claude => &self.claude,
                LlmProvider::OpenAi => &self.openai,
            };

            for attempt in 0..=self.policy.max_retries {
                match backend
                    .complete(model, system_prompt, user_prompt, params)
                    .await
                {
                    Ok(resp) => return Ok(resp),
                    Err(e) => {
                        if !is_retryable(&e) {
                            warn!(model = idx, attempt, error = %e, "non-retryable, demoting model");
                            last_err = Some(e);
                            break;
                        }
                        if attempt < self.policy.max_retries {
                            let delay = compute_backoff(&self.policy, attempt);
                            info!(model = idx, attempt, delay_ms = delay, error = %e, "retrying");
                            self.do_sleep(delay).await;
                        }
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ForemanError::LlmUnavailable("model chain is empty".into())
        }))
    }
}
