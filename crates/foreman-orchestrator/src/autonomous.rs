//! The Autonomous loop (spec §4.6): a Discover → Plan → Execute → Learn
//! cycle driven either periodically or on demand for a single cycle.
//! Grounded in `examples/original_source/ai/autonomous/loop.py`'s exact
//! scoring formulas and four-phase state machine.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::feedback::{FeedbackStore, LearningKind};
use crate::safety::{ProposedChanges, SafetyController};
use crate::scanner::{self, IssueFamily, ScannedIssue, Severity};
use crate::types::AgentRole;
use foreman_core::cancel::CancelToken;
use foreman_core::ForemanResult;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Discovering,
    Planning,
    Executing,
    Learning,
}

/// Matches spec §4.6's `kind` set exactly. `#[serde(other)]` gives
/// persisted JSON from an older build a safe landing spot if a new
/// scanner family is ever added (closed-tag design note, SPEC_FULL.md
/// §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Security,
    Performance,
    Bug,
    Quality,
    TestCoverage,
    Todo,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedEffort {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementOpportunity {
    pub id: String,
    pub kind: OpportunityKind,
    pub priority: f64,
    pub description: String,
    pub details: serde_json::Value,
    pub estimated_effort: EstimatedEffort,
    pub safety_score: f64,
}

/// `_calculate_priority`: type-weighted base times severity multiplier.
fn type_weight(kind: OpportunityKind) -> f64 {
    match kind {
        OpportunityKind::Security => 1.0,
        OpportunityKind::Performance => 0.8,
        OpportunityKind::Bug => 0.7,
        OpportunityKind::Quality => 0.6,
        OpportunityKind::TestCoverage => 0.4,
        OpportunityKind::Todo => 0.3,
        OpportunityKind::Unknown => 0.5,
    }
}

fn severity_multiplier(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 1.0,
        Severity::High => 0.8,
        Severity::Medium => 0.6,
        Severity::Low => 0.4,
    }
}

/// `_calculate_safety_score`: risk-inverse, higher means safer to fix.
fn safety_score(kind: OpportunityKind) -> f64 {
    match kind {
        OpportunityKind::Todo => 0.9,
        OpportunityKind::TestCoverage => 0.8,
        OpportunityKind::Quality => 0.7,
        OpportunityKind::Performance => 0.6,
        OpportunityKind::Bug => 0.5,
        OpportunityKind::Security => 0.4,
        OpportunityKind::Unknown => 0.5,
    }
}

/// `_estimate_effort`.
fn estimated_effort(kind: OpportunityKind) -> EstimatedEffort {
    match kind {
        OpportunityKind::Todo | OpportunityKind::Quality => EstimatedEffort::Low,
        OpportunityKind::Bug | OpportunityKind::TestCoverage => EstimatedEffort::Medium,
        OpportunityKind::Security | OpportunityKind::Performance | OpportunityKind::Unknown => {
            EstimatedEffort::High
        }
    }
}

fn family_to_kind(family: IssueFamily) -> OpportunityKind {
    match family {
        IssueFamily::Security => OpportunityKind::Security,
        IssueFamily::Performance => OpportunityKind::Performance,
        IssueFamily::Quality => OpportunityKind::Quality,
        IssueFamily::Todo => OpportunityKind::Todo,
        IssueFamily::TestCoverage => OpportunityKind::TestCoverage,
    }
}

fn opportunity_from_issue(issue: &ScannedIssue, index: usize) -> ImprovementOpportunity {
    let kind = family_to_kind(issue.family);
    ImprovementOpportunity {
        id: format!("opp-{index}"),
        kind,
        priority: type_weight(kind) * severity_multiplier(issue.severity),
        description: issue.description.clone(),
        details: serde_json::json!({
            "file": issue.file,
            "line": issue.line,
            "code": issue.code,
        }),
        estimated_effort: estimated_effort(kind),
        safety_score: safety_score(kind),
    }
}

/// One role the Orchestrator would assign to resolve an opportunity of
/// this kind, used by the Planning phase to hand work to the Worker
/// pool's decomposition templates.
pub fn role_for_opportunity(kind: OpportunityKind) -> AgentRole {
    match kind {
        OpportunityKind::Security | OpportunityKind::Bug => AgentRole::Developer,
        OpportunityKind::Performance => AgentRole::Developer,
        OpportunityKind::Quality | OpportunityKind::Todo => AgentRole::Developer,
        OpportunityKind::TestCoverage => AgentRole::Qa,
        OpportunityKind::Unknown => AgentRole::Planner,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleResult {
    pub opportunities_found: usize,
    pub plans_attempted: usize,
    pub plans_successful: usize,
}

pub struct AutonomousLoop {
    working_directory: PathBuf,
    safety: Arc<SafetyController>,
    feedback: Mutex<FeedbackStore>,
    top_k: usize,
}

impl AutonomousLoop {
    pub fn new(working_directory: PathBuf, safety: Arc<SafetyController>, feedback: FeedbackStore, top_k: usize) -> Self {
        Self {
            working_directory,
            safety,
            feedback: Mutex::new(feedback),
            top_k,
        }
    }

    /// `Idle -> Discovering`: scan the repository and score candidate
    /// opportunities.
    pub fn discover(&self, cancel: &CancelToken) -> Vec<ImprovementOpportunity> {
        if cancel.is_cancelled() {
            return vec![];
        }
        let issues = scanner::scan_repository(&self.working_directory);
        issues
            .iter()
            .enumerate()
            .map(|(i, issue)| opportunity_from_issue(issue, i))
            .collect()
    }

    /// `Discovering -> Planning`: rank by `priority * safety_score *
    /// feedback_multiplier` and keep the top K, running Safety
    /// `validate` on each before it's handed off (`adjust_strategies`:
    /// a role with a confident learned success pattern is favored, a
    /// confident failure pattern is penalized). Opportunities that fail
    /// validation are dropped, not silently promoted.
    pub fn plan(
        &self,
        opportunities: &[ImprovementOpportunity],
        cancel: &CancelToken,
    ) -> Vec<ImprovementOpportunity> {
        if cancel.is_cancelled() || self.safety.is_stopped() {
            return vec![];
        }
        let mut ranked: Vec<&ImprovementOpportunity> = opportunities.iter().collect();
        ranked.sort_by(|a, b| {
            let score_a = a.priority * a.safety_score * self.feedback_multiplier(a.kind);
            let score_b = b.priority * b.safety_score * self.feedback_multiplier(b.kind);
            score_b.total_cmp(&score_a)
        });

        ranked
            .into_iter()
            .take(self.top_k)
            .filter(|opp| {
                if cancel.is_cancelled() {
                    return false;
                }
                let proposed = ProposedChanges::default();
                let (ok, violations) = self.safety.validate(&proposed);
                if !ok {
                    warn!(opportunity = %opp.id, ?violations, "dropped by safety validation during planning");
                }
                ok
            })
            .cloned()
            .collect()
    }

    /// `adjust_strategies`'s `type_preferences` adjustment, collapsed
    /// into a single multiplier: nudge up per matching success pattern
    /// (capped 1.5), down per matching failure pattern (floored 0.5).
    fn feedback_multiplier(&self, kind: OpportunityKind) -> f64 {
        let mut context = std::collections::HashMap::new();
        context.insert("role".to_string(), role_for_opportunity(kind).to_string());
        let feedback = self.feedback.lock().expect("feedback store mutex poisoned");
        feedback
            .get_recommendations(&context)
            .into_iter()
            .fold(1.0, |multiplier, pattern| match pattern.kind {
                LearningKind::Success => (multiplier + 0.1_f64).min(1.5),
                LearningKind::Failure => (multiplier - 0.1_f64).max(0.5),
                LearningKind::Strategy => multiplier,
            })
    }

    /// `Executing -> Learning`: record each plan's outcome into the
    /// feedback store. The actual Worker pool dispatch lives in
    /// [`crate::engine::Orchestrator`]; this just closes the loop on
    /// whatever [`crate::types::ExecutionRecord`]s it produced.
    pub fn learn(&self, records: &[crate::types::ExecutionRecord]) {
        let mut feedback = self.feedback.lock().expect("feedback store mutex poisoned");
        for record in records {
            feedback.record(record);
        }
        feedback.recompute();
        info!(count = records.len(), "learning phase recorded execution outcomes");
    }

    /// Run one full Discover -> Plan -> Execute(caller-supplied) ->
    /// Learn cycle, honoring cancellation between every sub-step (spec
    /// §4.6: "Cancellation and emergency stop are honored between every
    /// sub-step").
    pub async fn run_cycle<F, Fut>(&self, cancel: &CancelToken, execute: F) -> ForemanResult<CycleResult>
    where
        F: FnOnce(Vec<ImprovementOpportunity>) -> Fut,
        Fut: std::future::Future<Output = ForemanResult<Vec<crate::types::ExecutionRecord>>>,
    {
        let opportunities = self.discover(cancel);
        let found = opportunities.len();

        if cancel.is_cancelled() {
            return Ok(CycleResult { opportunities_found: found, ..CycleResult::default() });
        }
        let planned = self.plan(&opportunities, cancel);
        let attempted = planned.len();

        if cancel.is_cancelled() {
            return Ok(CycleResult { opportunities_found: found, plans_attempted: 0, plans_successful: 0 });
        }
        let records = execute(planned).await?;
        let successful = records.iter().filter(|r| r.success).count();

        self.learn(&records);

        Ok(CycleResult {
            opportunities_found: found,
            plans_attempted: attempted,
            plans_successful: successful,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_weights_match_spec_table() {
        assert_eq!(type_weight(OpportunityKind::Security), 1.0);
        assert_eq!(type_weight(OpportunityKind::Performance), 0.8);
        assert_eq!(type_weight(OpportunityKind::Bug), 0.7);
        assert_eq!(type_weight(OpportunityKind::Quality), 0.6);
        assert_eq!(type_weight(OpportunityKind::TestCoverage), 0.4);
        assert_eq!(type_weight(OpportunityKind::Todo), 0.3);
    }

    #[test]
    fn safety_scores_match_spec_table() {
        assert_eq!(safety_score(OpportunityKind::Todo), 0.9);
        assert_eq!(safety_score(OpportunityKind::TestCoverage), 0.8);
        assert_eq!(safety_score(OpportunityKind::Quality), 0.7);
        assert_eq!(safety_score(OpportunityKind::Performance), 0.6);
        assert_eq!(safety_score(OpportunityKind::Bug), 0.5);
        assert_eq!(safety_score(OpportunityKind::Security), 0.4);
    }

    #[test]
    fn unknown_opportunity_kind_round_trips_from_unrecognized_json() {
        let parsed: OpportunityKind = serde_json::from_str("\"brand_new_family\"").unwrap();
        assert_eq!(parsed, OpportunityKind::Unknown);
    }

    #[test]
    fn priority_is_weight_times_severity_multiplier() {
        let issue = ScannedIssue {
            family: IssueFamily::Security,
            severity: Severity::High,
            file: "src/lib.rs".into(),
            line: 1,
            description: "weak hash".into(),
            code: "Md5::new()".into(),
        };
        let opp = opportunity_from_issue(&issue, 0);
        assert!((opp.priority - (1.0 * 0.8)).abs() < f64::EPSILON);
    }

    #[test]
    fn discover_surfaces_test_coverage_opportunity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("lib.rs"),
            "fn add(a: i32, b: i32) -> i32 { a + b }\n",
        )
        .unwrap();
        let safety = Arc::new(SafetyController::new(
            dir.path(),
            crate::safety::SafetyConfig::default(),
            Box::new(foreman_core::ids::SystemClock),
        ));
        let feedback = FeedbackStore::new(Box::new(foreman_core::ids::SystemClock));
        let autonomous = AutonomousLoop::new(dir.path().to_path_buf(), safety, feedback, 5);
        let cancel = CancelToken::new();
        let opportunities = autonomous.discover(&cancel);
        assert!(opportunities
            .iter()
            .any(|o| o.kind == OpportunityKind::TestCoverage));
    }

    #[test]
    fn plan_favors_a_role_with_a_learned_success_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let safety = Arc::new(SafetyController::new(
            dir.path(),
            crate::safety::SafetyConfig::default(),
            Box::new(foreman_core::ids::SystemClock),
        ));
        let mut feedback = FeedbackStore::new(Box::new(foreman_core::ids::SystemClock));
        let developer_record = |success: bool| crate::types::ExecutionRecord {
            subtask_id: uuid::Uuid::new_v4(),
            role: AgentRole::Developer,
            model_used: "test".into(),
            success,
            artifact: None,
            error: None,
            duration_ms: 0,
            cost: 0.0,
            checkpoint_id: None,
            review_outcome: None,
            timestamp: chrono::Utc::now(),
        };
        feedback.record(&developer_record(true));
        feedback.record(&developer_record(true));

        let autonomous = AutonomousLoop::new(dir.path().to_path_buf(), safety, feedback, 5);
        // Bug -> Developer (has a learned success pattern); TestCoverage
        // -> Qa (no pattern). Equal priority*safety_score, so only the
        // feedback multiplier should decide the ranking.
        let bug = ImprovementOpportunity {
            id: "opp-bug".into(),
            kind: OpportunityKind::Bug,
            priority: 0.5,
            description: "bug".into(),
            details: serde_json::json!({}),
            estimated_effort: EstimatedEffort::Medium,
            safety_score: 0.5,
        };
        let coverage = ImprovementOpportunity {
            id: "opp-coverage".into(),
            kind: OpportunityKind::TestCoverage,
            priority: 0.5,
            description: "low coverage".into(),
            details: serde_json::json!({}),
            estimated_effort: EstimatedEffort::Medium,
            safety_score: 0.5,
        };
        let cancel = CancelToken::new();
        let planned = autonomous.plan(&[coverage, bug], &cancel);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].kind, OpportunityKind::Bug);
    }

    #[test]
    fn discover_returns_empty_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let safety = Arc::new(SafetyController::new(
            dir.path(),
            crate::safety::SafetyConfig::default(),
            Box::new(foreman_core::ids::SystemClock),
        ));
        let feedback = FeedbackStore::new(Box::new(foreman_core::ids::SystemClock));
        let autonomous = AutonomousLoop::new(dir.path().to_path_buf(), safety, feedback, 5);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(autonomous.discover(&cancel).is_empty());
    }
}
