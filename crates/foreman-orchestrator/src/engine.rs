//! The Orchestrator (spec §4.1): accepts a [`Command`], decomposes it,
//! drives phase-by-phase execution through a [`WorkerPool`], aggregates
//! the outcome into a [`Report`], and returns an [`OrchestrationResult`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use foreman_agent::LlmOracle;
use foreman_core::{ForemanError, ForemanResult};
use foreman_memory::{MemoryStore, MemoryType, NewMemoryRecord};
use foreman_security::audit::AuditLog;
use tracing::{info, warn};
use uuid::Uuid;

use crate::monitor::AgentMonitor;
use crate::pool::WorkerPool;
use crate::report::Report;
use crate::safety::SafetyController;
use crate::templates;
use crate::types::{AgentProfile, AgentRole, Command, ExecutionRecord, OrchestrationResult};
use crate::vcs::VcsCollaborator;

/// Fraction of subtasks that must succeed for an [`OrchestrationResult`]
/// to report `success = true` (spec §3, "Success ⇔ fraction of
/// successful records ≥ configurable threshold (default 0.8)").
const SUCCESS_THRESHOLD: f64 = 0.8;

pub struct Orchestrator {
    pool: WorkerPool,
    safety: Arc<SafetyController>,
    memory: Arc<MemoryStore>,
}

impl Orchestrator {
    pub fn new(
        profiles: HashMap<AgentRole, AgentProfile>,
        oracle: LlmOracle,
        working_directory: impl Into<PathBuf>,
        safety: Arc<SafetyController>,
        memory: Arc<MemoryStore>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let pool = WorkerPool::new(
            profiles,
            oracle,
            working_directory,
            safety.clone(),
            memory.clone(),
            audit,
        );
        Self {
            pool,
            safety,
            memory,
        }
    }

    /// Attach a VCS collaborator so approved code edits get a branch, a
    /// commit, and (best-effort) a review request.
    pub fn with_vcs(mut self, vcs: Arc<dyn VcsCollaborator>) -> Self {
        self.pool = self.pool.with_vcs(vcs);
        self
    }

    /// A pull-safe handle to the Worker pool's progress, for a caller
    /// that wants to poll state from another task while `orchestrate`
    /// runs.
    pub fn monitor(&self) -> &AgentMonitor {
        self.pool.monitor()
    }

    /// `orchestrate(command) -> OrchestrationResult` (spec §4.1).
    ///
    /// Boundary conditions, per spec §8 invariants:
    /// - If the Safety controller's emergency stop is active, returns
    ///   `EmergencyStopped` with zero side effects: no subtasks are
    ///   dispatched and nothing is written to Memory.
    /// - If the Decomposition has an unresolved required clarification
    ///   and `command.constraints.skip_clarifications` is false, returns
    ///   `ClarificationRequired` with the same zero-side-effect
    ///   guarantee (`agents_spawned=0`).
    pub async fn orchestrate(&self, command: Command) -> ForemanResult<OrchestrationResult> {
        let task_id = Uuid::new_v4();
        let started = Instant::now();

        if self.safety.is_stopped() {
            return Err(ForemanError::EmergencyStopped(
                "orchestration refused: emergency stop is active".into(),
            ));
        }

        let decomposition = templates::decompose(&command.text);

        if !command.constraints.skip_clarifications
            && decomposition.has_unresolved_required_clarifications()
        {
            let questions: Vec<String> = decomposition
                .clarifications
                .iter()
                .filter(|c| c.required)
                .map(|c| c.question.clone())
                .collect();
            return Err(ForemanError::ClarificationRequired(questions));
        }

        info!(
            task_id = %task_id,
            subtasks = decomposition.subtasks.len(),
            complexity = ?decomposition.complexity,
            "orchestrator: dispatching decomposition to worker pool"
        );

        let pool_run = self.pool.run(&decomposition, &command.constraints).await?;
        let results = pool_run.records;

        let priorities: HashMap<Uuid, u8> = decomposition
            .subtasks
            .iter()
            .map(|s| (s.id, s.priority))
            .collect();
        let records: Vec<ExecutionRecord> = decomposition
            .subtasks
            .iter()
            .filter_map(|s| results.get(&s.id).cloned())
            .collect();

        let report = Report::from_records(&command.text, &records, &priorities);

        // Critical SafetyViolations short-circuit at the top of this
        // method (emergency stop) or inside the Worker pool before a
        // change is ever applied (destructive_change); a critical
        // violation raised mid-run surfaces here as the controller
        // tripping into emergency stop, so checking `is_stopped()` after
        // the run covers "no critical SafetyViolation was raised"
        // without the pool needing to thread violation levels back
        // through `ExecutionRecord`.
        let success = report.success_fraction() >= SUCCESS_THRESHOLD && !self.safety.is_stopped();

        let final_report = report.render(success);
        let errors = report.errors.clone();
        let agents_spawned = results.len();
        let execution_time_ms = started.elapsed().as_millis() as u64;

        self.persist_report(task_id, &final_report, success);

        // Spec §6.6 exit code 5 / §4.3: a budget that ran out mid-phase
        // is a boundary-level failure distinct from ordinary partial
        // failure, so it propagates out of `orchestrate` the same way
        // `ClarificationRequired`/`EmergencyStopped` do, even though the
        // records gathered up to that point were still persisted above.
        if let Some((spent, limit)) = pool_run.budget_exceeded {
            return Err(ForemanError::BudgetExceeded { spent, limit });
        }

        Ok(OrchestrationResult {
            task_id,
            command,
            agents_spawned,
            execution_time_ms,
            success,
            results,
            final_report,
            errors,
        })
    }

    /// Spec §4.1 "Aggregation": the final report is additionally written
    /// to the Memory store with tags `{orchestration, <task_id>}`.
    /// Best-effort: a Memory failure never fails the orchestration.
    fn persist_report(&self, task_id: Uuid, final_report: &str, success: bool) {
        let record = NewMemoryRecord::new(final_report.to_string(), MemoryType::Progress)
            .with_tags(["orchestration".to_string(), task_id.to_string()])
            .with_keywords(["orchestration".to_string()])
            .with_importance(if success { 0.5 } else { 0.7 });
        if let Err(e) = self.memory.insert(record) {
            warn!(error = %e, task_id = %task_id, "failed to persist final report to memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::Constraints;
    use foreman_core::ids::SystemClock;
    use foreman_security::audit::AuditLog;

    fn orchestrator(dir: &std::path::Path) -> Orchestrator {
        let profiles = HashMap::new();
        let oracle = LlmOracle::new(Default::default());
        let safety = Arc::new(SafetyController::new(
            dir,
            crate::safety::SafetyConfig::default(),
            Box::new(SystemClock),
        ));
        let memory = Arc::new(MemoryStore::in_memory(64));
        let audit = Arc::new(AuditLog::new(dir.join("audit")));
        Orchestrator::new(profiles, oracle, dir, safety, memory, audit)
    }

    #[tokio::test]
    async fn emergency_stop_blocks_orchestration_with_zero_agents() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        orchestrator
            .safety
            .activate_emergency_stop("operator request")
            .unwrap();

        let command = Command::new("implement a new feature");
        let result = orchestrator.orchestrate(command).await;
        assert!(matches!(result, Err(ForemanError::EmergencyStopped(_))));
    }

    #[tokio::test]
    async fn required_clarification_blocks_unless_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        // A one-word command trips `templates::clarifications_for`'s
        // "too short to act on" rule.
        let command = Command::new("fix");
        let result = orchestrator.orchestrate(command).await;
        assert!(matches!(result, Err(ForemanError::ClarificationRequired(_))));
    }

    #[tokio::test]
    async fn skip_clarifications_lets_the_run_proceed() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let mut command = Command::new("fix");
        command.constraints = Constraints {
            skip_clarifications: true,
            ..Constraints::default()
        };
        let result = orchestrator.orchestrate(command).await.unwrap();
        // No profiles are configured, so every subtask fails fast, but
        // the run itself is dispatched rather than rejected.
        assert_eq!(result.agents_spawned, result.results.len());
        assert!(!result.success);
    }

    #[tokio::test]
    async fn agents_spawned_equals_results_len() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let mut command = Command::new("Find autonomous deployment opportunities");
        command.constraints.skip_clarifications = true;
        let result = orchestrator.orchestrate(command).await.unwrap();
        assert_eq!(result.agents_spawned, result.results.len());
    }
}
