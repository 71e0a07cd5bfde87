//! The shared data model (spec §3): the types every other module in
//! this crate passes around. Nothing here talks to the network, the
//! filesystem, or git — it's pure data plus the small amount of
//! behavior (readiness checks, a handful of constructors) that belongs
//! with the data.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use foreman_agent::ModelChain;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constraints::Constraints;

/// The closed set of specialized worker roles. Unlike the teacher's
/// five generic software-delivery roles, these are tuned to the
/// business-opportunity-evaluation and software-delivery workloads
/// this orchestrator actually runs (spec §3, "AgentRole").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    MarketResearcher,
    BusinessAnalyst,
    TechnicalAssessor,
    OpportunityScorer,
    DeploymentStrategist,
    Developer,
    Qa,
    Architect,
    Reviewer,
    Planner,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentRole::MarketResearcher => "market_researcher",
            AgentRole::BusinessAnalyst => "business_analyst",
            AgentRole::TechnicalAssessor => "technical_assessor",
            AgentRole::OpportunityScorer => "opportunity_scorer",
            AgentRole::DeploymentStrategist => "deployment_strategist",
            AgentRole::Developer => "developer",
            AgentRole::Qa => "qa",
            AgentRole::Architect => "architect",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Planner => "planner",
        };
        write!(f, "{name}")
    }
}

/// A profile binds a role to the model chain and system prompt it calls
/// the LLM oracle with; see [`crate::profiles`].
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub role: AgentRole,
    pub model_chain: ModelChain,
    pub system_prompt: String,
}

/// A user- or autonomous-loop-submitted command plus the constraints it
/// runs under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub text: String,
    #[serde(default)]
    pub constraints: Constraints,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            constraints: Constraints::default(),
        }
    }
}

/// How involved a Decomposition's plan is. Drives how many phases the
/// Orchestrator allows and how conservatively the Safety controller
/// behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Enterprise,
}

/// A clarifying question the decomposition template couldn't answer on
/// its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    pub context: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

/// The artifact kind a Subtask is expected to produce, known ahead of
/// execution so the Worker pool can validate the Worker's actual output
/// shape against what was planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    CodeEdit,
    Analysis,
    Scoring,
    Plan,
    NoOp,
}

/// One unit of work assigned to a single role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,
    pub agent_role: AgentRole,
    pub description: String,
    #[serde(default)]
    pub required_tools: Vec<String>,
    pub expected_output_kind: ArtifactKind,
    /// 1 (highest) to 5 (lowest); used only to order subtasks within a
    /// phase for display — phase membership itself comes from
    /// `Decomposition::dependencies`.
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    3
}

/// The Orchestrator's decomposition of a Command into a subtask DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decomposition {
    pub complexity: Complexity,
    pub subtasks: Vec<Subtask>,
    /// subtask id -> set of subtask ids it depends on.
    #[serde(default)]
    pub dependencies: HashMap<Uuid, HashSet<Uuid>>,
    #[serde(default)]
    pub clarifications: Vec<Clarification>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    pub estimated_duration_secs: u64,
}

impl Decomposition {
    /// Any clarification marked `required` and not satisfied blocks
    /// execution unless the caller set `skip_clarifications`.
    pub fn has_unresolved_required_clarifications(&self) -> bool {
        self.clarifications.iter().any(|c| c.required)
    }

    /// Group subtasks into sequential phases by dependency depth: phase
    /// 0 has no dependencies, phase N depends only on phases < N. Within
    /// a phase, subtasks have no dependency relationship and may run
    /// concurrently (spec §4.1/§5).
    pub fn phases(&self) -> Vec<Vec<Uuid>> {
        let mut depth_of: HashMap<Uuid, usize> = HashMap::new();
        let mut remaining: Vec<&Subtask> = self.subtasks.iter().collect();
        let mut phases: Vec<Vec<Uuid>> = Vec::new();

        while !remaining.is_empty() {
            let (ready, pending): (Vec<&Subtask>, Vec<&Subtask>) =
                remaining.into_iter().partition(|t| {
                    self.dependencies
                        .get(&t.id)
                        .map(|deps| deps.iter().all(|d| depth_of.contains_key(d)))
                        .unwrap_or(true)
                });
            if ready.is_empty() {
                // Dependency cycle or dangling reference; dump the rest
                // into one final phase rather than looping forever.
                phases.push(pending.iter().map(|t| t.id).collect());
                break;
            }
            let depth = phases.len();
            for t in &ready {
                depth_of.insert(t.id, depth);
            }
            phases.push(ready.iter().map(|t| t.id).collect());
            remaining = pending;
        }

        phases
    }
}

/// A scored item within a [`Artifact::Scoring`] artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub label: String,
    pub score: f32,
    pub rationale: String,
}

/// The tagged union of everything a Worker can produce (spec §3,
/// "Artifact").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    CodeEdit {
        target_path: String,
        original_hash: Option<String>,
        new_content: String,
        rationale: String,
    },
    Analysis {
        text: String,
        #[serde(default)]
        sources: Vec<String>,
        #[serde(default)]
        insights: Vec<String>,
    },
    Scoring {
        items: Vec<ScoredItem>,
    },
    Plan {
        steps: Vec<String>,
    },
    NoOp {
        reason: String,
    },
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::CodeEdit { .. } => ArtifactKind::CodeEdit,
            Artifact::Analysis { .. } => ArtifactKind::Analysis,
            Artifact::Scoring { .. } => ArtifactKind::Scoring,
            Artifact::Plan { .. } => ArtifactKind::Plan,
            Artifact::NoOp { .. } => ArtifactKind::NoOp,
        }
    }
}

/// The Reviewer's verdict on one artifact (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    RequestChanges,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub decision: ReviewDecision,
    /// 0.0-1.0; a low-confidence `approve` is treated like
    /// `request_changes` by the Worker pool (spec §4.5 edge case).
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub security_concerns: Vec<String>,
    #[serde(default)]
    pub maintainability_score: Option<f32>,
}

/// A point-in-time snapshot of the repository the Safety controller can
/// roll back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub repo_revision: String,
    pub description: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// How serious a safety check failure is. `Warning` is reported but
/// non-fatal; `Error`/`Critical` block the change (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyViolation {
    pub level: SafetyLevel,
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// The result of running a single subtask to completion (or failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub subtask_id: Uuid,
    pub role: AgentRole,
    pub model_used: String,
    pub success: bool,
    #[serde(default)]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub cost: f64,
    #[serde(default)]
    pub checkpoint_id: Option<String>,
    #[serde(default)]
    pub review_outcome: Option<ReviewOutcome>,
    pub timestamp: DateTime<Utc>,
}

/// The Orchestrator's final, aggregated answer for one Command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub task_id: Uuid,
    pub command: Command,
    pub agents_spawned: usize,
    pub execution_time_ms: u64,
    pub success: bool,
    pub results: HashMap<Uuid, ExecutionRecord>,
    pub final_report: String,
    #[serde(default)]
    pub errors: Vec<String>,
}
