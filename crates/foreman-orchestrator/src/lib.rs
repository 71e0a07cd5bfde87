//! Multi-agent orchestration engine: decomposes a [`Command`](types::Command)
//! into a [`Decomposition`](types::Decomposition), runs it phase by phase
//! through a [`WorkerPool`](pool::WorkerPool) behind a Reviewer gate and a
//! Safety controller, and aggregates the outcome into an
//! [`OrchestrationResult`](types::OrchestrationResult).
//!
//! # Main types
//!
//! - [`Orchestrator`] — top-level entry point: decompose, execute, aggregate.
//! - [`WorkerPool`] — runs a decomposition's subtasks with bounded concurrency.
//! - [`SafetyController`] — emergency stop, change validation, checkpoints.
//! - [`Reviewer`] — gates proposed code edits before they're applied.
//! - [`AutonomousLoop`] — the unattended Discover/Plan/Execute/Learn cycle.
//! - [`FeedbackStore`] — learns from execution history across cycles.

/// The Discover/Plan/Execute/Learn autonomous cycle.
pub mod autonomous;
/// The Constraints map a Command is submitted with.
pub mod constraints;
/// Orchestration engine and pipeline execution.
pub mod engine;
/// Feedback/learning store.
pub mod feedback;
/// Agent health and metrics monitoring.
pub mod monitor;
/// Default agent profiles and role definitions.
pub mod profiles;
/// Markdown report rendering.
pub mod report;
/// The Reviewer gate.
pub mod safety;
/// Repository scanner used by the Autonomous loop's Discovery phase.
pub mod scanner;
/// Decomposition templates.
pub mod templates;
/// Shared orchestration types (Command, Decomposition, Artifact, etc.).
pub mod types;
/// VCS collaborator trait and local git implementation.
pub mod vcs;
/// Worker pool.
pub mod pool;
/// The stateless Worker.
pub mod worker;
/// The Reviewer gate implementation.
pub mod reviewer;

pub use autonomous::{AutonomousLoop, CycleResult, ImprovementOpportunity, OpportunityKind};
pub use constraints::{Constraints, SafetyLevel as ConstraintSafetyLevel, Timeline};
pub use engine::Orchestrator;
pub use feedback::{FeedbackStore, LearningPattern};
pub use monitor::AgentMonitor;
pub use pool::WorkerPool;
pub use profiles::{default_profile_map, default_profiles};
pub use report::Report;
pub use reviewer::Reviewer;
pub use safety::{SafetyConfig, SafetyController};
pub use types::{
    AgentProfile, AgentRole, Artifact, ArtifactKind, Command, Complexity, Decomposition,
    ExecutionRecord, OrchestrationResult, Subtask,
};
pub use vcs::{LocalGitCollaborator, VcsCollaborator};
