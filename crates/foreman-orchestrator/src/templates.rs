//! Decomposition templates (spec §4.1 design note, DESIGN.md Open
//! Question 2): a command's text is matched against keyword families to
//! pick a canonical subtask DAG shape. There is no LLM-driven
//! decomposition in this version — the dispatch is a single match over
//! keyword families with a generic single-subtask fallback, the same
//! shape as the teacher's keyword-to-role registry, generalized from a
//! flat role lookup into whole subtask graphs.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::types::{
    AgentRole, ArtifactKind, Clarification, Complexity, Decomposition, Subtask,
};

/// Keyword families, checked in order; the first match wins. Mirrors
/// the teacher's registry of `keyword -> role`, but each family now
/// maps to an entire subtask DAG instead of a single role.
const BUSINESS_OPPORTUNITY_KEYWORDS: &[&str] =
    &["opportunity", "market", "business case", "evaluate the business"];
const IMPLEMENT_KEYWORDS: &[&str] = &["implement", "add", "fix", "refactor", "bug"];

/// Decompose `command_text` into a [`Decomposition`]. Falls back to a
/// single generic Developer subtask when nothing matches.
pub fn decompose(command_text: &str) -> Decomposition {
    let lower = command_text.to_lowercase();

    if BUSINESS_OPPORTUNITY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return business_opportunity_template(command_text);
    }
    if IMPLEMENT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return implementation_template(command_text);
    }
    generic_template(command_text)
}

/// Five-phase, six-subtask business-opportunity evaluation: market and
/// technical assessment run concurrently, feed a business case, which
/// feeds scoring, which feeds a deployment plan, which a Reviewer signs
/// off on.
fn business_opportunity_template(command_text: &str) -> Decomposition {
    let market_research = subtask(
        AgentRole::MarketResearcher,
        format!("Research the market context for: {command_text}"),
        ArtifactKind::Analysis,
        1,
    );
    let technical_assessment = subtask(
        AgentRole::TechnicalAssessor,
        format!("Assess technical feasibility for: {command_text}"),
        ArtifactKind::Analysis,
        1,
    );
    let business_case = subtask(
        AgentRole::BusinessAnalyst,
        format!("Build the business case for: {command_text}"),
        ArtifactKind::Analysis,
        2,
    );
    let scoring = subtask(
        AgentRole::OpportunityScorer,
        format!("Score the opportunity: {command_text}"),
        ArtifactKind::Scoring,
        3,
    );
    let deployment_plan = subtask(
        AgentRole::DeploymentStrategist,
        format!("Draft a deployment plan for: {command_text}"),
        ArtifactKind::Plan,
        4,
    );
    let review = subtask(
        AgentRole::Reviewer,
        format!("Review the full opportunity evaluation for: {command_text}"),
        ArtifactKind::Plan,
        5,
    );

    let mut dependencies: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    dependencies.insert(
        business_case.id,
        HashSet::from([market_research.id, technical_assessment.id]),
    );
    dependencies.insert(scoring.id, HashSet::from([business_case.id]));
    dependencies.insert(deployment_plan.id, HashSet::from([scoring.id]));
    dependencies.insert(review.id, HashSet::from([deployment_plan.id]));

    Decomposition {
        complexity: Complexity::Complex,
        subtasks: vec![
            market_research,
            technical_assessment,
            business_case,
            scoring,
            deployment_plan,
            review,
        ],
        dependencies,
        clarifications: clarifications_for(command_text),
        success_criteria: vec![
            "opportunity is scored against every criterion".to_string(),
            "a reviewer has signed off on the deployment plan".to_string(),
        ],
        estimated_duration_secs: 900,
    }
}

/// Architect -> Developer -> QA -> Reviewer, a straight chain: each
/// subtask depends only on the one before it.
fn implementation_template(command_text: &str) -> Decomposition {
    let architecture = subtask(
        AgentRole::Architect,
        format!("Design the approach for: {command_text}"),
        ArtifactKind::Plan,
        1,
    );
    let implementation = subtask(
        AgentRole::Developer,
        format!("Implement: {command_text}"),
        ArtifactKind::CodeEdit,
        2,
    );
    let qa = subtask(
        AgentRole::Qa,
        format!("Identify test gaps and edge cases in the change for: {command_text}"),
        ArtifactKind::Analysis,
        3,
    );
    let review = subtask(
        AgentRole::Reviewer,
        format!("Review the implementation of: {command_text}"),
        ArtifactKind::Plan,
        4,
    );

    let mut dependencies: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    dependencies.insert(implementation.id, HashSet::from([architecture.id]));
    dependencies.insert(qa.id, HashSet::from([implementation.id]));
    dependencies.insert(review.id, HashSet::from([qa.id]));

    Decomposition {
        complexity: Complexity::Moderate,
        subtasks: vec![architecture, implementation, qa, review],
        dependencies,
        clarifications: clarifications_for(command_text),
        success_criteria: vec!["the change is reviewed and approved".to_string()],
        estimated_duration_secs: 600,
    }
}

/// A single Developer subtask, used when no keyword family matches.
fn generic_template(command_text: &str) -> Decomposition {
    let task = subtask(
        AgentRole::Developer,
        command_text.to_string(),
        ArtifactKind::CodeEdit,
        3,
    );
    Decomposition {
        complexity: Complexity::Simple,
        subtasks: vec![task],
        dependencies: HashMap::new(),
        clarifications: clarifications_for(command_text),
        success_criteria: vec![],
        estimated_duration_secs: 120,
    }
}

/// A command with no concrete target is ambiguous enough to warrant a
/// required clarification before any subtask runs.
fn clarifications_for(command_text: &str) -> Vec<Clarification> {
    if command_text.trim().split_whitespace().count() <= 2 {
        vec![Clarification {
            question: "Can you provide more detail about the target and desired outcome?".into(),
            context: format!("command text was too short to decompose confidently: {command_text:?}"),
            required: true,
            options: None,
        }]
    } else {
        vec![]
    }
}

fn subtask(role: AgentRole, description: String, kind: ArtifactKind, priority: u8) -> Subtask {
    Subtask {
        id: Uuid::new_v4(),
        agent_role: role,
        description,
        required_tools: vec![],
        expected_output_kind: kind,
        priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_opportunity_keywords_produce_six_subtasks_five_phases() {
        let decomposition = decompose("evaluate the business opportunity for a new market");
        assert_eq!(decomposition.subtasks.len(), 6);
        assert_eq!(decomposition.phases().len(), 5);
    }

    #[test]
    fn implement_keyword_produces_four_subtask_chain() {
        let decomposition = decompose("implement a rate limiter for the API gateway");
        assert_eq!(decomposition.subtasks.len(), 4);
        assert_eq!(decomposition.phases().len(), 4);
    }

    #[test]
    fn unmatched_command_falls_back_to_generic_developer_subtask() {
        let decomposition = decompose("do the thing with the widget please");
        assert_eq!(decomposition.subtasks.len(), 1);
        assert_eq!(decomposition.subtasks[0].agent_role, AgentRole::Developer);
    }

    #[test]
    fn short_command_gets_a_required_clarification() {
        let decomposition = decompose("fix it");
        assert!(decomposition.has_unresolved_required_clarifications());
    }
}
