//! The Constraints map (spec §6.4): a small bag of knobs a Command is
//! submitted with, consumed by the Orchestrator, Worker pool, and Safety
//! controller. Never parsed from raw CLI flags here — that belongs to
//! the `foreman-cli` front-end.

use serde::{Deserialize, Serialize};

/// How urgently the command should be serviced. Selects the model
/// chain tier (spec §4.7 design note, DESIGN.md Open Question 3):
/// `Urgent` prefers a faster/cheaper primary model, `Relaxed` prefers
/// the highest-capability model regardless of latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeline {
    Urgent,
    Normal,
    Relaxed,
}

impl Default for Timeline {
    fn default() -> Self {
        Timeline::Normal
    }
}

/// How strict the Safety controller's checks should be. `High` lowers
/// `max_change_size` and raises the rate-limit floor; `Low` is meant
/// for throwaway/sandbox repos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Low,
    Normal,
    High,
}

impl Default for SafetyLevel {
    fn default() -> Self {
        SafetyLevel::Normal
    }
}

/// Constraints a [`crate::types::Command`] is submitted with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraints {
    /// Cumulative cost ceiling across the whole orchestration run.
    #[serde(default)]
    pub budget_limit: Option<f64>,
    #[serde(default)]
    pub timeline: Timeline,
    /// Upper bound on concurrently running Workers within a phase.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// If set, CodeEdit artifacts outside these path prefixes are
    /// rejected before they reach the Safety controller.
    #[serde(default)]
    pub allowed_paths: Option<Vec<String>>,
    #[serde(default)]
    pub safety_level: SafetyLevel,
    /// Proceed past unresolved *required* clarifications instead of
    /// returning `ClarificationRequired`.
    #[serde(default)]
    pub skip_clarifications: bool,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            budget_limit: None,
            timeline: Timeline::default(),
            max_concurrency: default_max_concurrency(),
            allowed_paths: None,
            safety_level: SafetyLevel::default(),
            skip_clarifications: false,
        }
    }
}

impl Constraints {
    /// Whether a change touching `path` is permitted by `allowed_paths`.
    /// An unset allow-list permits everything.
    pub fn path_allowed(&self, path: &str) -> bool {
        match &self.allowed_paths {
            None => true,
            Some(prefixes) => prefixes.iter().any(|p| path.starts_with(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_any_path() {
        let constraints = Constraints::default();
        assert!(constraints.path_allowed("src/anything.rs"));
    }

    #[test]
    fn allow_list_restricts_to_prefixes() {
        let constraints = Constraints {
            allowed_paths: Some(vec!["src/".to_string()]),
            ..Constraints::default()
        };
        assert!(constraints.path_allowed("src/lib.rs"));
        assert!(!constraints.path_allowed("Cargo.toml"));
    }
}
