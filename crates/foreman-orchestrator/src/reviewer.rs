//! The Reviewer (spec §4.5): asks the LLM oracle to judge a proposed
//! `CodeEdit`, parses a strict JSON schema, and falls back to a keyword
//! heuristic when the model doesn't return parseable JSON.

use foreman_agent::{LlmOracle, LlmParams, ModelChain};
use foreman_core::ForemanResult;
use serde::Deserialize;
use tracing::warn;

use crate::types::{AgentRole, ReviewDecision, ReviewOutcome};

/// `approve` below this confidence is demoted to `request_changes`
/// (spec §4.5).
pub const AUTO_APPROVE_THRESHOLD: f32 = 0.85;

const SYSTEM_PROMPT: &str = "\
You are a code reviewer evaluating a proposed change. Judge code \
quality, security, maintainability, adherence to best practices, and \
whether the change does what its stated intent describes.

Respond with a strict JSON object and nothing else: \
{\"decision\": \"approve\"|\"request_changes\"|\"reject\", \
\"confidence\": <0.0-1.0>, \"reasoning\": <string>, \
\"suggestions\": [<string>...], \"security_concerns\": [<string>...], \
\"maintainability_score\": <0.0-1.0>}.";

#[derive(Debug, Deserialize)]
struct RawReview {
    decision: ReviewDecision,
    confidence: f32,
    reasoning: String,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    security_concerns: Vec<String>,
    #[serde(default)]
    maintainability_score: Option<f32>,
}

pub struct Reviewer<'a> {
    oracle: &'a LlmOracle,
    chain: &'a ModelChain,
}

impl<'a> Reviewer<'a> {
    pub fn new(oracle: &'a LlmOracle, chain: &'a ModelChain) -> Self {
        Self { oracle, chain }
    }

    /// Review a proposed change to `path`. `original` is `None` for a
    /// new file.
    pub async fn review(
        &self,
        original: Option<&str>,
        modified: &str,
        path: &str,
        description: &str,
        role: AgentRole,
    ) -> ForemanResult<ReviewOutcome> {
        let prompt = build_prompt(original, modified, path, description, role);
        let response = self
            .oracle
            .complete(self.chain, SYSTEM_PROMPT, &prompt, &LlmParams::default())
            .await?;

        Ok(parse_review(&response.text))
    }
}

fn build_prompt(
    original: Option<&str>,
    modified: &str,
    path: &str,
    description: &str,
    role: AgentRole,
) -> String {
    let original_block = original.unwrap_or("(new file)");
    format!(
        "Path: {path}\nProposed by: {role}\nIntent: {description}\n\n\
         --- ORIGINAL ---\n{original_block}\n\n--- PROPOSED ---\n{modified}\n"
    )
}

/// Parse the model's strict JSON schema; on failure fall back to the
/// keyword heuristic from spec §4.5: "approve"/"lgtm" -> approve (0.7),
/// "reject"/"dangerous"/"security risk" -> reject (0.8), else
/// request_changes (0.5). A technically-valid but low-confidence
/// `approve` is demoted to `request_changes`, matching the Worker
/// pool's contract (it only ever sees a decision it should act on).
fn parse_review(text: &str) -> ReviewOutcome {
    if let Some(candidate) = extract_json_object(text) {
        if let Ok(raw) = serde_json::from_str::<RawReview>(candidate) {
            let decision = if raw.decision == ReviewDecision::Approve
                && raw.confidence < AUTO_APPROVE_THRESHOLD
            {
                ReviewDecision::RequestChanges
            } else {
                raw.decision
            };
            return ReviewOutcome {
                decision,
                confidence: raw.confidence,
                reasoning: raw.reasoning,
                suggestions: raw.suggestions,
                security_concerns: raw.security_concerns,
                maintainability_score: raw.maintainability_score,
            };
        }
    }

    warn!("reviewer response was not parseable JSON, falling back to keyword heuristic");
    keyword_heuristic(text)
}

fn keyword_heuristic(text: &str) -> ReviewOutcome {
    let lower = text.to_lowercase();
    if lower.contains("reject") || lower.contains("dangerous") || lower.contains("security risk") {
        ReviewOutcome {
            decision: ReviewDecision::Reject,
            confidence: 0.8,
            reasoning: text.to_string(),
            suggestions: vec![],
            security_concerns: vec![],
            maintainability_score: None,
        }
    } else if lower.contains("approve") || lower.contains("lgtm") {
        ReviewOutcome {
            decision: ReviewDecision::Approve,
            confidence: 0.7,
            reasoning: text.to_string(),
            suggestions: vec![],
            security_concerns: vec![],
            maintainability_score: None,
        }
    } else {
        ReviewOutcome {
            decision: ReviewDecision::RequestChanges,
            confidence: 0.5,
            reasoning: text.to_string(),
            suggestions: vec![],
            security_concerns: vec![],
            maintainability_score: None,
        }
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}
