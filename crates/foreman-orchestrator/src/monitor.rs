//! Tracks Worker pool progress: per-role state plus the pool-wide
//! pending/running/success/failed/cost counters a caller can poll
//! without blocking on the run itself (spec §4.3).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::AgentRole;

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
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
    WaitingForReview,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub total_turns: u32,
    pub errors: u32,
    pub duration_ms: u64,
    pub tokens_used: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub role: AgentRole,
    pub current_subtask: Option<Uuid>,
    pub status: WorkerStatus,
    pub metrics: AgentMetrics,
}

/// A pull-safe snapshot of the pool's aggregate progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolProgress {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cumulative_cost: f64,
}

/// Shared, cloneable handle to pool progress state. All mutation goes
/// through `&self` methods; cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct AgentMonitor {
    states: Arc<RwLock<HashMap<AgentRole, AgentState>>>,
    counts: Arc<RwLock<PoolProgress>>,
}

impl AgentMonitor {
    pub fn new() -> Self {
        let states = ALL_ROLES
            .iter()
            .map(|role| {
                (
                    *role,
                    AgentState {
                        role: *role,
                        current_subtask: None,
                        status: WorkerStatus::Idle,
                        metrics: AgentMetrics::default(),
                    },
                )
            })
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
            counts: Arc::new(RwLock::new(PoolProgress {
                pending: 0,
                running: 0,
                succeeded: 0,
                failed: 0,
                cumulative_cost: 0.0,
            })),
        }
    }

    pub async fn set_pending(&self, count: usize) {
        let mut counts = self.counts.write().await;
        counts.pending = count;
    }

    pub async fn start_subtask(&self, role: AgentRole, subtask_id: Uuid) {
        {
            let mut states = self.states.write().await;
            if let Some(state) = states.get_mut(&role) {
                state.current_subtask = Some(subtask_id);
                state.status = WorkerStatus::Working;
            }
        }
        let mut counts = self.counts.write().await;
        counts.pending = counts.pending.saturating_sub(1);
        counts.running += 1;
    }

    pub async fn finish_subtask(&self, role: AgentRole, success: bool, cost: f64, duration_ms: u64) {
        {
            let mut states = self.states.write().await;
            if let Some(state) = states.get_mut(&role) {
                state.current_subtask = None;
                state.status = if success {
                    WorkerStatus::Idle
                } else {
                    WorkerStatus::Error
                };
                state.metrics.total_turns += 1;
                state.metrics.duration_ms += duration_ms;
                state.metrics.cost += cost;
                if !success {
                    state.metrics.errors += 1;
                }
            }
        }
        let mut counts = self.counts.write().await;
        counts.running = counts.running.saturating_sub(1);
        counts.cumulative_cost += cost;
        if success {
            counts.succeeded += 1;
        } else {
            counts.failed += 1;
        }
    }

    pub async fn waiting_for_review(&self, role: AgentRole) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&role) {
            state.status = WorkerStatus::WaitingForReview;
        }
    }

    pub async fn snapshot(&self) -> Vec<AgentState> {
        self.states.read().await.values().cloned().collect()
    }

    pub async fn progress(&self) -> PoolProgress {
        self.counts.read().await.clone()
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initial_state_is_idle_for_every_role() {
        let monitor = AgentMonitor::new();
        let states = monitor.snapshot().await;
        assert_eq!(states.len(), 10);
        assert!(states.iter().all(|s| s.status == WorkerStatus::Idle));
    }

    #[tokio::test]
    async fn start_and_finish_updates_pool_counts() {
        let monitor = AgentMonitor::new();
        monitor.set_pending(2).await;
        let id = Uuid::new_v4();

        monitor.start_subtask(AgentRole::Developer, id).await;
        let progress = monitor.progress().await;
        assert_eq!(progress.pending, 1);
        assert_eq!(progress.running, 1);

        monitor
            .finish_subtask(AgentRole::Developer, true, 0.05, 1200)
            .await;
        let progress = monitor.progress().await;
        assert_eq!(progress.running, 0);
        assert_eq!(progress.succeeded, 1);
        assert!((progress.cumulative_cost - 0.05).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn failed_subtask_increments_error_metrics() {
        let monitor = AgentMonitor::new();
        let id = Uuid::new_v4();
        monitor.start_subtask(AgentRole::Qa, id).await;
        monitor.finish_subtask(AgentRole::Qa, false, 0.0, 500).await;

        let state = monitor
            .snapshot()
            .await
            .into_iter()
            .find(|s| s.role == AgentRole::Qa)
            .unwrap();
        assert_eq!(state.status, WorkerStatus::Error);
        assert_eq!(state.metrics.errors, 1);

        let progress = monitor.progress().await;
        assert_eq!(progress.failed, 1);
    }
}
