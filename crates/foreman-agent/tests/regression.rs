//! Integration tests for `foreman-agent`'s provider configuration and
//! oracle fallback, exercised against a mock HTTP server rather than a
//! live API.

use foreman_agent::{
    LlmOracle, LlmParams, LlmProvider, ModelChain, ModelClass, ModelConfig, RetryPolicy,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn claude_model(base_url: &str) -> ModelConfig {
    ModelConfig {
        provider: LlmProvider::Claude,
        model_id: "claude-test".to_string(),
        api_key: "test-key".to_string(),
        api_base_url: Some(base_url.to_string()),
        class: ModelClass::General,
        max_tokens: 256,
        temperature: Some(0.2),
        reasoning_effort: None,
        retry_policy: None,
    }
}

#[test]
fn provider_serializes_lowercase() {
    let json = serde_json::to_string(&LlmProvider::Claude).unwrap();
    assert_eq!(json, "\"claude\"");
    let json = serde_json::to_string(&LlmProvider::OpenAi).unwrap();
    assert_eq!(json, "\"openai\"");
}

#[test]
fn base_url_defaults_and_override() {
    let claude = claude_model("");
    assert_eq!(
        ModelConfig {
            api_base_url: None,
            ..claude
        }
        .base_url(),
        "https://api.anthropic.com"
    );

    let custom = claude_model("http://localhost:9999");
    assert_eq!(custom.base_url(), "http://localhost:9999");
}

#[tokio::test]
async fn oracle_completes_against_mock_claude_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{ "type": "text", "text": "hello from claude" }],
            "usage": { "input_tokens": 5, "output_tokens": 2 },
        })))
        .mount(&server)
        .await;

    let oracle = LlmOracle::new(RetryPolicy::default());
    let chain = ModelChain::single(claude_model(&server.uri()));
    let response = oracle
        .complete(&chain, "system", "user", &LlmParams::default())
        .await
        .unwrap();

    assert_eq!(response.text, "hello from claude");
    assert_eq!(response.usage.unwrap().completion_tokens, 2);
}

#[tokio::test]
async fn oracle_demotes_to_second_model_on_rate_limit() {
    let failing = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({})))
        .mount(&failing)
        .await;

    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{ "type": "text", "text": "fallback" }],
        })))
        .mount(&healthy)
        .await;

    let oracle = LlmOracle::new(RetryPolicy {
        max_retries: 0,
        backoff_base_ms: 0,
        backoff_max_ms: 0,
    });
    let chain = ModelChain::new(vec![
        claude_model(&failing.uri()),
        claude_model(&healthy.uri()),
    ]);
    let response = oracle
        .complete(&chain, "system", "user", &LlmParams::default())
        .await
        .unwrap();

    assert_eq!(response.text, "fallback");
}
