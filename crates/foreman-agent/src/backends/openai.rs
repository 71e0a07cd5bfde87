use super::LlmBackend;
use crate::config::{ModelClass, ModelConfig};
use crate::llm::{LlmParams, LlmResponse, LlmUsage};
use async_trait::async_trait;
use foreman_core::{ForemanError, ForemanResult};

/// OpenAI-compatible Chat Completions backend.
pub struct OpenAiBackend {
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for OpenAiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(
        &self,
        model: &ModelConfig,
        system_prompt: &str,
        user_prompt: &str,
        params: &LlmParams,
    ) -> ForemanResult<LlmResponse> {
        let url = format!("{}/v1/chat/completions", model.base_url());

        let messages = serde_json::json!([
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_prompt },
        ]);

        let mut body = serde_json::json!({
            "model": model.model_id,
            "messages": messages,
        });

        match model.class {
            ModelClass::Reasoning => {
                body["max_completion_tokens"] = serde_json::json!(model.max_tokens);
                if let Some(effort) = &model.reasoning_effort {
                    body["reasoning_effort"] = serde_json::json!(effort);
                }
            }
            ModelClass::General => {
                body["max_tokens"] = serde_json::json!(model.max_tokens);
                if let Some(temperature) = model.temperature {
                    body["temperature"] = serde_json::json!(temperature);
                }
            }
        }

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", model.api_key))
            .header("Content-Type", "application/json")
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
                "OpenAI API error {status}: {resp_body}"
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
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ForemanError::LlmInvalidResponse("missing choice content".into()))?
        .to_string();

    let usage = body.get("usage").map(|u| LlmUsage {
        prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
    });

    Ok(LlmResponse {
        text: content,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_choice_content() {
        let body = serde_json::json!({
            "choices": [{ "message": { "content": "ok" } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3 },
        });
        let response = parse_response(&body).unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(response.usage.unwrap().prompt_tokens, 12);
    }

    #[test]
    fn missing_choices_is_invalid_response() {
        let body = serde_json::json!({});
        assert!(parse_response(&body).is_err());
    }
}
