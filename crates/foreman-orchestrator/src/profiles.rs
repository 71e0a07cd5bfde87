//! Default agent profiles (spec §3 "AgentRole", §4.7 "LLM fallback
//! chain"): one [`AgentProfile`] per role, binding a system-prompt
//! template to a [`ModelChain`] sized to the role's importance.
//!
//! Planning/reviewer roles get a reasoning-class model first (accuracy
//! matters more than latency); delivery roles get a cheaper
//! general-class model first, falling back to the same reasoning model
//! the planning roles use as their primary. This mirrors the teacher's
//! `profiles.rs` constant-string-per-role pattern, generalized from five
//! roles to the spec's ten.

use std::collections::HashMap;

use foreman_agent::{ModelChain, ModelClass, ModelConfig};

use crate::types::{AgentProfile, AgentRole};

/// Build one profile per [`AgentRole`], templated off `base` (typically
/// loaded from `foreman.toml`: provider, API key, base URL). Each role
/// gets its own model chain derived from `base` by varying `class` and
/// `model_id`; `base.model_id` is always the reasoning-class primary.
pub fn default_profiles(base: &ModelConfig) -> Vec<AgentProfile> {
    ALL_ROLES
        .iter()
        .map(|&role| AgentProfile {
            role,
            model_chain: chain_for(role, base),
            system_prompt: prompt_for(role).to_string(),
        })
        .collect()
}

/// Convenience: the same profiles, keyed by role for O(1) lookup.
pub fn default_profile_map(base: &ModelConfig) -> HashMap<AgentRole, AgentProfile> {
    default_profiles(base).into_iter().map(|p| (p.role, p)).collect()
}

const ALL_ROLES: [AgentRole; 10] = [
    AgentRole::MarketResearcher,
    AgentRole::BusinessAnalyst,
    AgentRole::TechnicalAssessor,
    AgentRole::OpportunityScorer,
    AgentRole::DeploymentStrategist,
    AgentRole::Developer,
    AgentRole::Qa,
    AgentRole::Architect,
    AgentRole::Reviewer,
    AgentRole::Planner,
];

/// Roles whose decisions gate everything downstream (spec §4.7: "the
/// chain is configured per role; planning/reviewer roles use a
/// higher-capability chain; coding roles use a faster cheaper chain
/// first").
fn is_reasoning_led(role: AgentRole) -> bool {
    matches!(
        role,
        AgentRole::Planner
            | AgentRole::Reviewer
            | AgentRole::Architect
            | AgentRole::OpportunityScorer
    )
}

fn reasoning_variant(base: &ModelConfig) -> ModelConfig {
    let mut model = base.clone();
    model.class = ModelClass::Reasoning;
    model.temperature = None;
    model
}

fn general_variant(base: &ModelConfig, model_id: &str) -> ModelConfig {
    let mut model = base.clone();
    model.class = ModelClass::General;
    model.model_id = model_id.to_string();
    model.temperature = Some(0.2);
    model
}

/// `[primary, secondary, tertiary]` per spec §4.7. Reasoning-led roles
/// try the reasoning-class model first and fall back to a cheaper
/// general-class model; delivery roles try the cheap model first and
/// fall back to the reasoning-class model as a higher-capability last
/// resort.
fn chain_for(role: AgentRole, base: &ModelConfig) -> ModelChain {
    let reasoning = reasoning_variant(base);
    let fast = general_variant(base, "claude-haiku-4-20250514");
    let fallback = general_variant(base, "gpt-4o-mini");

    if is_reasoning_led(role) {
        ModelChain::new(vec![reasoning, fast, fallback])
    } else {
        ModelChain::new(vec![fast, reasoning, fallback])
    }
}

fn prompt_for(role: AgentRole) -> &'static str {
    match role {
        AgentRole::MarketResearcher => MARKET_RESEARCHER_PROMPT,
        AgentRole::BusinessAnalyst => BUSINESS_ANALYST_PROMPT,
        AgentRole::TechnicalAssessor => TECHNICAL_ASSESSOR_PROMPT,
        AgentRole::OpportunityScorer => OPPORTUNITY_SCORER_PROMPT,
        AgentRole::DeploymentStrategist => DEPLOYMENT_STRATEGIST_PROMPT,
        AgentRole::Developer => DEVELOPER_PROMPT,
        AgentRole::Qa => QA_PROMPT,
        AgentRole::Architect => ARCHITECT_PROMPT,
        AgentRole::Reviewer => REVIEWER_PROMPT,
        AgentRole::Planner => PLANNER_PROMPT,
    }
}

const MARKET_RESEARCHER_PROMPT: &str = "\
You are the Market Researcher agent in an autonomous orchestration system. \
Given a domain, identify current market trends, active competitors, and \
emerging opportunities. Ground every claim in the subtask description's \
context; do not invent named companies or figures.

Respond with a single `analysis` artifact: `text` summarizing findings, \
`sources` for anything you treat as a citation, `insights` as a short list \
of the most actionable takeaways.";

const BUSINESS_ANALYST_PROMPT: &str = "\
You are the Business Analyst agent. You receive market research and \
technical feasibility context from prior subtasks and turn it into a \
business case: target segment, value proposition, and key risks.

Respond with a single `analysis` artifact.";

const TECHNICAL_ASSESSOR_PROMPT: &str = "\
You are the Technical Assessor agent. Evaluate the technical feasibility \
of the opportunity under discussion: required infrastructure, integration \
points, and implementation risk.

Respond with a single `analysis` artifact.";

const OPPORTUNITY_SCORER_PROMPT: &str = "\
You are the Opportunity Scorer agent. Given the business and technical \
analyses produced earlier in this run, score each candidate opportunity \
against criteria (market_size, feasibility, risk, time_to_value) on a \
0-100 scale per criterion, and assign a letter grade.

Respond with a single `scoring` artifact: `items`, each with `label`, \
`score` (the total, 0-100), and `rationale`.";

const DEPLOYMENT_STRATEGIST_PROMPT: &str = "\
You are the Deployment Strategist agent. Given a scored opportunity, \
produce a concrete rollout plan: phased steps, required approvals, and \
rollback triggers.

Respond with a single `plan` artifact: an ordered `steps` list.";

const DEVELOPER_PROMPT: &str = "\
You are the Developer agent. You implement the change described in the \
subtask against the repository file contents supplied in your prompt. \
Write secure, idiomatic code; no unwrap()/panic in non-test code paths.

Respond with a single `code_edit` artifact: `target_path`, `new_content` \
(the complete new file contents, not a diff), and a one-paragraph \
`rationale`. Do not include prose outside the JSON.";

const QA_PROMPT: &str = "\
You are the QA agent. Given a proposed code change, identify what tests \
are missing and what edge cases the implementation may have overlooked.

Respond with a single `analysis` artifact listing gaps as `insights`.";

const ARCHITECT_PROMPT: &str = "\
You are the Architect agent. Decide how a requested change should be \
structured: module boundaries, data flow, and interfaces, before a \
Developer subtask implements it.

Respond with a single `plan` artifact: an ordered `steps` list describing \
the intended structure.";

const REVIEWER_PROMPT: &str = "\
You are the Reviewer agent. You are shown a proposed code change — the \
original file contents, the new contents, the target path, and the \
rationale the Developer gave — and must decide whether to approve it.

Evaluate: code quality, security, maintainability, adherence to the \
stated intent, and whether the change does what the subtask asked for.

Respond with a strict JSON object: \
{\"decision\": \"approve\"|\"request_changes\"|\"reject\", \
\"confidence\": <0.0-1.0>, \"reasoning\": <string>, \
\"suggestions\": [<string>...], \"security_concerns\": [<string>...], \
\"maintainability_score\": <0.0-1.0>}. No prose outside the JSON.";

const PLANNER_PROMPT: &str = "\
You are the Planner agent, invoked for commands that don't match one of \
the system's canonical decomposition templates. Produce a short ordered \
plan of steps a generic Developer subtask could execute.

Respond with a single `plan` artifact: an ordered `steps` list.";

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_agent::LlmProvider;

    fn test_base() -> ModelConfig {
        ModelConfig {
            provider: LlmProvider::Claude,
            model_id: "claude-sonnet-4-20250514".to_string(),
            api_key: "test-key".to_string(),
            api_base_url: None,
            class: ModelClass::Reasoning,
            max_tokens: 4096,
            temperature: None,
            reasoning_effort: None,
            retry_policy: None,
        }
    }

    #[test]
    fn covers_all_ten_roles() {
        let profiles = default_profiles(&test_base());
        assert_eq!(profiles.len(), 10);
        let map = default_profile_map(&test_base());
        assert_eq!(map.len(), 10);
        assert!(map.contains_key(&AgentRole::Planner));
        assert!(map.contains_key(&AgentRole::MarketResearcher));
    }

    #[test]
    fn every_profile_has_a_nonempty_prompt_and_chain() {
        for profile in default_profiles(&test_base()) {
            assert!(!profile.system_prompt.is_empty());
            assert!(!profile.model_chain.models.is_empty());
        }
    }

    #[test]
    fn reasoning_led_roles_try_reasoning_model_first() {
        let map = default_profile_map(&test_base());
        let planner = &map[&AgentRole::Planner];
        assert_eq!(planner.model_chain.models[0].class, ModelClass::Reasoning);

        let developer = &map[&AgentRole::Developer];
        assert_eq!(developer.model_chain.models[0].class, ModelClass::General);
    }
}
