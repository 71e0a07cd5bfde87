//! The VCS collaborator (spec §6.2): an external, remote-capable git
//! collaborator the Worker consults after a Reviewer/Safety-approved
//! change is applied locally. Method shapes are grounded in
//! `examples/original_source/ai/integration/github_pr.py`'s
//! branch/commit/PR lifecycle, reimplemented with `git2` for local
//! operations instead of shelling out, per the same rationale as
//! [`crate::safety`].

use async_trait::async_trait;
use foreman_core::{ForemanError, ForemanResult};

use crate::types::AgentRole;

/// The result of opening a review request against a remote host.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub number: u64,
    pub url: String,
}

/// Whether the working tree has uncommitted changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoStatus {
    Clean,
    Dirty,
}

/// Spec §6.2's full operation set. Every operation is async so a
/// remote-backed implementation can make network calls without forcing
/// local-only callers to block a thread.
#[async_trait]
pub trait VcsCollaborator: Send + Sync {
    async fn current_revision(&self) -> ForemanResult<String>;
    async fn reset_to(&self, revision: &str) -> ForemanResult<()>;
    async fn clean_untracked(&self) -> ForemanResult<()>;
    async fn create_branch(&self, name: &str) -> ForemanResult<()>;
    async fn commit(&self, paths: &[String], message: &str) -> ForemanResult<String>;
    async fn push(&self, branch: &str) -> ForemanResult<()>;
    async fn open_review_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
    ) -> ForemanResult<ReviewRequest>;
    async fn add_comment(&self, number: u64, body: &str) -> ForemanResult<()>;
    async fn status(&self) -> ForemanResult<RepoStatus>;
}

/// Branch name of the form `orchestrator/<role>-<slug>-<unix-epoch>`
/// (spec §6.2). `now_unix_epoch` is injected so tests are deterministic.
/// The slug keeps ascii alphanumerics only, for portability across git
/// hosts that reject non-ascii ref names.
pub fn branch_name(role: AgentRole, task_description: &str, now_unix_epoch: i64) -> String {
    let slug: String = task_description
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(30)
        .collect();
    let slug = slug.trim_matches(|c| c == '-' || c == '_');
    format!("orchestrator/{role}-{slug}-{now_unix_epoch}")
}

/// A local-only `git2`-backed implementation. All remote-surface
/// operations (`push`, `open_review_request`, `add_comment`) return
/// [`ForemanError::Vcs`] — a remote collaborator requires a hosted git
/// forge credential this workspace has no stand-in for, so those
/// operations are stubbed rather than faked with a fabricated client.
pub struct LocalGitCollaborator {
    working_directory: std::path::PathBuf,
}

impl LocalGitCollaborator {
    pub fn new(working_directory: impl Into<std::path::PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
        }
    }

    fn open(&self) -> ForemanResult<git2::Repository> {
        git2::Repository::open(&self.working_directory)
            .map_err(|e| ForemanError::Vcs(format!("failed to open repository: {e}")))
    }
}

#[async_trait]
impl VcsCollaborator for LocalGitCollaborator {
    async fn current_revision(&self) -> ForemanResult<String> {
        let repo = self.open()?;
        let head = repo
            .head()
            .map_err(|e| ForemanError::Vcs(format!("failed to read HEAD: {e}")))?;
        let commit = head
            .peel_to_commit()
            .map_err(|e| ForemanError::Vcs(format!("HEAD does not resolve to a commit: {e}")))?;
        Ok(commit.id().to_string())
    }

    async fn reset_to(&self, revision: &str) -> ForemanResult<()> {
        let repo = self.open()?;
        let oid = git2::Oid::from_str(revision)
            .map_err(|e| ForemanError::Vcs(format!("invalid revision: {e}")))?;
        let object = repo
            .find_object(oid, None)
            .map_err(|e| ForemanError::Vcs(format!("revision not found: {e}")))?;
        repo.reset(&object, git2::ResetType::Hard, None)
            .map_err(|e| ForemanError::Vcs(format!("reset failed: {e}")))
    }

    async fn clean_untracked(&self) -> ForemanResult<()> {
        let repo = self.open()?;
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true);
        let statuses = repo
            .statuses(Some(&mut opts))
            .map_err(|e| ForemanError::Vcs(format!("status failed: {e}")))?;
        let workdir = repo.workdir().map(std::path::Path::to_path_buf);
        for entry in statuses.iter() {
            if entry.status().contains(git2::Status::WT_NEW) {
                if let (Some(path), Some(workdir)) = (entry.path(), &workdir) {
                    let _ = std::fs::remove_file(workdir.join(path));
                }
            }
        }
        Ok(())
    }

    async fn create_branch(&self, name: &str) -> ForemanResult<()> {
        let repo = self.open()?;
        let head = repo
            .head()
            .map_err(|e| ForemanError::Vcs(format!("failed to read HEAD: {e}")))?;
        let commit = head
            .peel_to_commit()
            .map_err(|e| ForemanError::Vcs(format!("HEAD does not resolve to a commit: {e}")))?;
        repo.branch(name, &commit, false)
            .map_err(|e| ForemanError::Vcs(format!("failed to create branch {name}: {e}")))?;
        Ok(())
    }

    async fn commit(&self, paths: &[String], message: &str) -> ForemanResult<String> {
        let repo = self.open()?;
        let mut index = repo
            .index()
            .map_err(|e| ForemanError::Vcs(format!("failed to open index: {e}")))?;
        for path in paths {
            index
                .add_path(std::path::Path::new(path))
                .map_err(|e| ForemanError::Vcs(format!("failed to stage {path}: {e}")))?;
        }
        index
            .write()
            .map_err(|e| ForemanError::Vcs(format!("failed to write index: {e}")))?;
        let tree_id = index
            .write_tree()
            .map_err(|e| ForemanError::Vcs(format!("failed to write tree: {e}")))?;
        let tree = repo
            .find_tree(tree_id)
            .map_err(|e| ForemanError::Vcs(format!("failed to find tree: {e}")))?;
        let parent = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| ForemanError::Vcs(format!("failed to resolve parent commit: {e}")))?;
        let signature = repo
            .signature()
            .map_err(|e| ForemanError::Vcs(format!("no git signature configured: {e}")))?;
        let commit_id = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])
            .map_err(|e| ForemanError::Vcs(format!("commit failed: {e}")))?;
        Ok(commit_id.to_string())
    }

    async fn push(&self, _branch: &str) -> ForemanResult<()> {
        Err(ForemanError::Vcs(
            "push requires a configured remote host credential, which this collaborator does not hold".into(),
        ))
    }

    async fn open_review_request(
        &self,
        _branch: &str,
        _title: &str,
        _body: &str,
    ) -> ForemanResult<ReviewRequest> {
        Err(ForemanError::Vcs(
            "opening a review request requires a remote forge integration not configured here".into(),
        ))
    }

    async fn add_comment(&self, _number: u64, _body: &str) -> ForemanResult<()> {
        Err(ForemanError::Vcs(
            "commenting requires a remote forge integration not configured here".into(),
        ))
    }

    async fn status(&self) -> ForemanResult<RepoStatus> {
        let repo = self.open()?;
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true);
        let statuses = repo
            .statuses(Some(&mut opts))
            .map_err(|e| ForemanError::Vcs(format!("status failed: {e}")))?;
        Ok(if statuses.is_empty() {
            RepoStatus::Clean
        } else {
            RepoStatus::Dirty
        })
    }
}
