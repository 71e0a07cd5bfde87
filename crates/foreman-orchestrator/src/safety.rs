//! The Safety controller (spec §4.4): reversible checkpoints, pre-change
//! validation, rate limiting, and an emergency stop any component can
//! check cheaply. Grounded in
//! `examples/original_source/ai/autonomous/safety.py`, with checkpoint
//! capture/rollback done through `git2` instead of shelling out to
//! `git`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use foreman_core::ids::Clock;
use foreman_core::{ForemanError, ForemanResult};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::constraints::SafetyLevel as ConstraintSafetyLevel;
use crate::types::{Checkpoint, SafetyLevel, SafetyViolation};

/// Paths the teacher's Python original flagged for `pyproject.toml` /
/// `package.json`; adapted to this repo's own toolchain.
const CRITICAL_FILE_PATTERNS: &[&str] =
    &["Cargo.toml", "Cargo.lock", ".git/", ".env", "Dockerfile"];

#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub max_change_size: u64,
    pub require_tests: bool,
    pub max_operations_per_hour: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_change_size: 100,
            require_tests: true,
            max_operations_per_hour: 10,
        }
    }
}

impl SafetyConfig {
    /// `ConstraintSafetyLevel::High` (the `Constraints.safety_level` dial,
    /// not the violation-severity [`SafetyLevel`] below) tightens the
    /// change-size ceiling and demands more headroom in the rate
    /// limiter; `Low` relaxes both for throwaway/sandbox repos.
    pub fn for_level(level: ConstraintSafetyLevel) -> Self {
        let base = Self::default();
        match level {
            ConstraintSafetyLevel::High => Self {
                max_change_size: base.max_change_size / 2,
                max_operations_per_hour: base.max_operations_per_hour / 2,
                ..base
            },
            ConstraintSafetyLevel::Normal => base,
            ConstraintSafetyLevel::Low => Self {
                max_change_size: base.max_change_size * 4,
                require_tests: false,
                max_operations_per_hour: base.max_operations_per_hour * 4,
            },
        }
    }
}

/// One file touched by a proposed change, enough detail for the
/// size/destructive/critical-file/test checks.
#[derive(Debug, Clone)]
pub struct ProposedFileChange {
    pub path: String,
    pub lines_changed: u64,
    pub deleted: bool,
}

/// The full set of changes a Worker wants to apply, handed to
/// [`SafetyController::validate`].
#[derive(Debug, Clone, Default)]
pub struct ProposedChanges {
    pub files: Vec<ProposedFileChange>,
    /// Whether the project's test suite currently passes; supplied by
    /// the caller (running it here would make this crate own a test
    /// runner, which is out of scope).
    pub tests_currently_pass: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmergencyStopMarker {
    reason: String,
    timestamp: DateTime<Utc>,
    active: bool,
}

struct OperationRecord {
    at: DateTime<Utc>,
}

/// Mutable state behind a mutex, per spec §6.5: "a single mutex
/// protects the checkpoint log and the operation-history ring buffer;
/// the emergency-stop flag uses an atomic load/store to avoid taking
/// the lock on the hot path."
struct Inner {
    checkpoints: Vec<Checkpoint>,
    operation_history: VecDeque<OperationRecord>,
}

pub struct SafetyController {
    working_directory: PathBuf,
    config: SafetyConfig,
    clock: Box<dyn Clock>,
    emergency_stopped: AtomicBool,
    emergency_stop_file: PathBuf,
    inner: Mutex<Inner>,
}

impl SafetyController {
    pub fn new(working_directory: impl Into<PathBuf>, config: SafetyConfig, clock: Box<dyn Clock>) -> Self {
        let working_directory = working_directory.into();
        let emergency_stop_file = working_directory.join(".emergency_stop");
        let stopped = emergency_stop_file.exists();
        Self {
            working_directory,
            config,
            clock,
            emergency_stopped: AtomicBool::new(stopped),
            emergency_stop_file,
            inner: Mutex::new(Inner {
                checkpoints: Vec::new(),
                operation_history: VecDeque::new(),
            }),
        }
    }

    /// O(1): a plain atomic load, as required by spec §4.4.
    pub fn is_stopped(&self) -> bool {
        self.emergency_stopped.load(Ordering::SeqCst)
    }

    pub fn activate_emergency_stop(&self, reason: &str) -> ForemanResult<()> {
        self.emergency_stopped.store(true, Ordering::SeqCst);
        let marker = EmergencyStopMarker {
            reason: reason.to_string(),
            timestamp: self.clock.now(),
            active: true,
        };
        let body = serde_json::to_string_pretty(&marker)?;
        std::fs::write(&self.emergency_stop_file, body)?;
        error!(reason, "emergency stop activated");
        Ok(())
    }

    pub fn clear_emergency_stop(&self, reason: &str) -> ForemanResult<()> {
        self.emergency_stopped.store(false, Ordering::SeqCst);
        if self.emergency_stop_file.exists() {
            std::fs::remove_file(&self.emergency_stop_file)?;
        }
        info!(reason, "emergency stop cleared");
        Ok(())
    }

    /// The seven ordered checks from spec §4.4, in the exact order
    /// `SafetyController.validate_change` runs them in the Python
    /// original: emergency_stop, large_change, destructive_change,
    /// critical_file_change, untested_change, rate_limit_exceeded,
    /// dirty_repository.
    pub fn validate(&self, proposed: &ProposedChanges) -> (bool, Vec<SafetyViolation>) {
        let mut violations = Vec::new();

        if self.is_stopped() {
            violations.push(violation(
                SafetyLevel::Critical,
                "emergency_stop",
                "emergency stop is active",
            ));
            return (false, violations);
        }

        let total_lines: u64 = proposed.files.iter().map(|f| f.lines_changed).sum();
        if total_lines > self.config.max_change_size {
            violations.push(violation(
                SafetyLevel::Error,
                "large_change",
                &format!(
                    "change size ({total_lines} lines) exceeds limit ({})",
                    self.config.max_change_size
                ),
            ));
        }

        let deleted: Vec<&str> = proposed
            .files
            .iter()
            .filter(|f| f.deleted)
            .map(|f| f.path.as_str())
            .collect();
        if !deleted.is_empty() {
            violations.push(violation(
                SafetyLevel::Critical,
                "destructive_change",
                &format!("attempting to delete {} file(s)", deleted.len()),
            ));
        }

        for file in &proposed.files {
            if let Some(pattern) = CRITICAL_FILE_PATTERNS.iter().find(|p| file.path.contains(**p)) {
                violations.push(violation(
                    SafetyLevel::Warning,
                    "critical_file_change",
                    &format!("changing critical file: {} (matched {pattern})", file.path),
                ));
            }
        }

        if self.config.require_tests {
            let has_test_file = proposed.files.iter().any(|f| f.path.to_lowercase().contains("test"));
            if !has_test_file && !proposed.tests_currently_pass {
                violations.push(violation(
                    SafetyLevel::Error,
                    "untested_change",
                    "change touches no test file and the test suite does not currently pass",
                ));
            }
        }

        let recent_ops = self.operations_last_hour();
        if recent_ops >= self.config.max_operations_per_hour {
            violations.push(violation(
                SafetyLevel::Error,
                "rate_limit_exceeded",
                &format!(
                    "too many operations in the last hour ({recent_ops}/{})",
                    self.config.max_operations_per_hour
                ),
            ));
        }

        if !self.is_repository_clean() {
            violations.push(violation(
                SafetyLevel::Warning,
                "dirty_repository",
                "repository has uncommitted changes",
            ));
        }

        let ok = !violations
            .iter()
            .any(|v| matches!(v.level, SafetyLevel::Critical | SafetyLevel::Error));
        (ok, violations)
    }

    /// Opens the repository at `self.working_directory` and captures
    /// `HEAD` as the checkpoint's revision. Recorded in-process; rollback
    /// only consults checkpoints this controller created.
    pub fn create_checkpoint(&self, description: &str, metadata: serde_json::Value) -> ForemanResult<Checkpoint> {
        let repo = git2::Repository::open(&self.working_directory)
            .map_err(|e| ForemanError::Checkpoint(format!("failed to open repository: {e}")))?;
        let head = repo
            .head()
            .map_err(|e| ForemanError::Checkpoint(format!("failed to read HEAD: {e}")))?;
        let commit = head
            .peel_to_commit()
            .map_err(|e| ForemanError::Checkpoint(format!("HEAD does not resolve to a commit: {e}")))?;

        let checkpoint = Checkpoint {
            id: format!("{:.8}", commit.id()),
            timestamp: self.clock.now(),
            repo_revision: commit.id().to_string(),
            description: description.to_string(),
            metadata,
        };

        let mut inner = self.inner.lock().expect("safety controller mutex poisoned");
        inner.checkpoints.push(checkpoint.clone());
        inner.operation_history.push_back(OperationRecord { at: self.clock.now() });
        info!(checkpoint_id = %checkpoint.id, description, "created safety checkpoint");
        Ok(checkpoint)
    }

    /// `git reset --hard` to the checkpoint's revision, then remove
    /// untracked files, matching the Python original's two-subprocess
    /// sequence but through `git2` directly.
    pub fn rollback(&self, checkpoint_id: &str) -> ForemanResult<()> {
        let checkpoint = {
            let inner = self.inner.lock().expect("safety controller mutex poisoned");
            inner
                .checkpoints
                .iter()
                .find(|c| c.id == checkpoint_id)
                .cloned()
                .ok_or_else(|| ForemanError::Checkpoint(format!("checkpoint not found: {checkpoint_id}")))?
        };

        let repo = git2::Repository::open(&self.working_directory)
            .map_err(|e| ForemanError::Checkpoint(format!("failed to open repository: {e}")))?;
        let target_oid = git2::Oid::from_str(&checkpoint.repo_revision)
            .map_err(|e| ForemanError::Checkpoint(format!("invalid checkpoint revision: {e}")))?;
        let target_object = repo
            .find_object(target_oid, None)
            .map_err(|e| ForemanError::Checkpoint(format!("checkpoint revision not in repository: {e}")))?;

        repo.reset(&target_object, git2::ResetType::Hard, None)
            .map_err(|e| ForemanError::Checkpoint(format!("hard reset failed: {e}")))?;

        clean_untracked(&repo)
            .map_err(|e| ForemanError::Checkpoint(format!("failed to clean untracked files: {e}")))?;

        warn!(checkpoint_id, "rolled back to checkpoint");
        Ok(())
    }

    pub fn health(&self) -> SafetyHealth {
        let inner = self.inner.lock().expect("safety controller mutex poisoned");
        SafetyHealth {
            timestamp: self.clock.now(),
            emergency_stopped: self.is_stopped(),
            checkpoints_count: inner.checkpoints.len(),
            operations_last_hour: self.operations_last_hour(),
            repository_clean: self.is_repository_clean(),
        }
    }

    fn operations_last_hour(&self) -> u32 {
        let cutoff = self.clock.now() - chrono::Duration::hours(1);
        let inner = self.inner.lock().expect("safety controller mutex poisoned");
        inner.operation_history.iter().filter(|op| op.at > cutoff).count() as u32
    }

    fn is_repository_clean(&self) -> bool {
        let Ok(repo) = git2::Repository::open(&self.working_directory) else {
            return false;
        };
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true);
        match repo.statuses(Some(&mut opts)) {
            Ok(statuses) => statuses.is_empty(),
            Err(_) => false,
        }
    }
}

fn clean_untracked(repo: &git2::Repository) -> Result<(), git2::Error> {
    let mut opts = git2::StatusOptions::new();
    opts.include_untracked(true);
    let statuses = repo.statuses(Some(&mut opts))?;
    let workdir = repo.workdir().map(Path::to_path_buf);
    for entry in statuses.iter() {
        if entry.status().contains(git2::Status::WT_NEW) {
            if let (Some(path), Some(workdir)) = (entry.path(), &workdir) {
                let _ = std::fs::remove_file(workdir.join(path));
            }
        }
    }
    Ok(())
}

fn violation(level: SafetyLevel, kind: &str, message: &str) -> SafetyViolation {
    SafetyViolation {
        level,
        kind: kind.to_string(),
        message: message.to_string(),
        details: serde_json::Value::Null,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyHealth {
    pub timestamp: DateTime<Utc>,
    pub emergency_stopped: bool,
    pub checkpoints_count: usize,
    pub operations_last_hour: u32,
    pub repository_clean: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_core::ids::SystemClock;

    fn controller(dir: &Path) -> SafetyController {
        SafetyController::new(dir, SafetyConfig::default(), Box::new(SystemClock))
    }

    #[test]
    fn emergency_stop_short_circuits_validate() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());
        controller.activate_emergency_stop("test").unwrap();
        let (ok, violations) = controller.validate(&ProposedChanges::default());
        assert!(!ok);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, "emergency_stop");
    }

    #[test]
    fn clear_emergency_stop_removes_marker_file() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());
        controller.activate_emergency_stop("test").unwrap();
        assert!(dir.path().join(".emergency_stop").exists());
        controller.clear_emergency_stop("done").unwrap();
        assert!(!dir.path().join(".emergency_stop").exists());
        assert!(!controller.is_stopped());
    }

    #[test]
    fn large_change_is_flagged_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());
        let proposed = ProposedChanges {
            files: vec![ProposedFileChange {
                path: "src/lib.rs".into(),
                lines_changed: 500,
                deleted: false,
            }],
            tests_currently_pass: true,
        };
        let (ok, violations) = controller.validate(&proposed);
        assert!(!ok);
        assert!(violations.iter().any(|v| v.kind == "large_change"));
    }

    #[test]
    fn deleted_files_are_critical() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());
        let proposed = ProposedChanges {
            files: vec![ProposedFileChange {
                path: "src/old.rs".into(),
                lines_changed: 10,
                deleted: true,
            }],
            tests_currently_pass: true,
        };
        let (ok, violations) = controller.validate(&proposed);
        assert!(!ok);
        assert!(violations
            .iter()
            .any(|v| v.kind == "destructive_change" && v.level == SafetyLevel::Critical));
    }

    #[test]
    fn critical_file_change_is_a_warning_not_a_blocker() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());
        let proposed = ProposedChanges {
            files: vec![ProposedFileChange {
                path: "Cargo.toml".into(),
                lines_changed: 2,
                deleted: false,
            }],
            tests_currently_pass: true,
        };
        let (_, violations) = controller.validate(&proposed);
        let v = violations.iter().find(|v| v.kind == "critical_file_change").unwrap();
        assert_eq!(v.level, SafetyLevel::Warning);
    }

    #[test]
    fn safety_level_high_halves_the_change_size_ceiling() {
        let high = SafetyConfig::for_level(ConstraintSafetyLevel::High);
        let normal = SafetyConfig::for_level(ConstraintSafetyLevel::Normal);
        assert!(high.max_change_size < normal.max_change_size);
    }
}
