use super::LlmBackend;
use crate::config::{ModelClass, ModelConfig};
use crate::llm::{LlmParams, LlmResponse, LlmUsage};
use async_trait::async_trait;
use foreman_core::{ForemanError, ForemanResult};

/// Anthropic Messages API backend.
pub struct ClaudeBackend {
    http: reqwest::Client,
}

impl ClaudeBackend {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for ClaudeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn complete(
        &self,
        model: &ModelConfig,
        system_prompt: &str,
        user_prompt: &str,
        params: &LlmParams,
    ) -> ForemanResult<LlmResponse> {
        let url = format!("{}/v1/messages", model.base_url());

        let mut body = serde_json::json!({
            "model": model.model_id,
            "max_tokens": model.max_tokens,
            "system": system_prompt,
            "messages": [{ "role": "user", "content": user_prompt }],
        });
        if model.class == ModelClass::General {
            if let Some(temperature) = model.temperature {
                body["temperature"] = serde_json::json!(temperature);
            }
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &model.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .timeout(params.timeout)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ForemanError::LlmInvalidResponse(e.to_string()))?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ForemanError::LlmRateLimited(resp_body.to_string()));
        }
        if !status.is_success() {
            return Err(ForemanError::Http(format!(
                "Claude API error {status}: {resp_body}"
            )));
        }

        parse_response(&resp_body)
    }
}

fn classify_transport_error(err: reqwest::Error) -> ForemanError {
    if err.is_timeout() {
        ForemanError::LlmTimeout(std::time::Duration::from_secs(0))
    } else {
        ForemanError::Http(err.to_string())
    }
}

fn parse_response(body: &serde_json::Value) -> ForemanResult<LlmResponse> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| ForemanError::LlmInvalidResponse("missing content array".into()))?;

    let text = content
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let usage = body.get("usage").map(|u| LlmUsage {
        prompt_tokens: u["input_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: u["output_tokens"].as_u64().unwrap_or(0) as u32,
    });

    Ok(LlmResponse { text, usage })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_blocks_and_usage() {
        let body = serde_json::json!({
            "content": [
                { "type": "text", "text": "hello" },
                { "type": "text", "text": "world" },
            ],
            "usage": { "input_tokens": 10, "output_tokens": 4 },
        });
        let response = parse_response(&body).unwrap();
        assert_eq!(response.text, "hello\nworld");
        assert_eq!(response.usage.unwrap().completion_tokens, 4);
    }

    #[test]
    fn missing_content_is_invalid_response() {
        let body = serde_json::json!({ "usage": {} });
        assert!(parse_response(&body).is_err());
    }
}
