//! End-to-end orchestration test.
//!
//! Drives a full `Orchestrator::orchestrate` run — decompose, dispatch
//! to the Worker pool phase by phase, Reviewer gate, Safety validation,
//! checkpoint, local apply, VCS handoff, Memory persistence, report
//! rendering — against a `wiremock`-mocked Claude endpoint rather than a
//! live model, following the same approach as
//! `foreman-agent/tests/regression.rs`.

use std::path::Path;
use std::sync::Arc;

use foreman_agent::{LlmOracle, LlmProvider, ModelClass, ModelConfig, RetryPolicy};
use foreman_core::ids::SystemClock;
use foreman_memory::{MemoryQuery, MemoryStore};
use foreman_orchestrator::types::ReviewDecision;
use foreman_orchestrator::{
    default_profile_map, AgentRole, Command, LocalGitCollaborator, Orchestrator, SafetyConfig,
    SafetyController,
};
use foreman_security::audit::AuditLog;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_model(base_url: &str) -> ModelConfig {
    ModelConfig {
        provider: LlmProvider::Claude,
        model_id: "claude-sonnet-4-20250514".to_string(),
        api_key: "test-key".to_string(),
        api_base_url: Some(base_url.to_string()),
        class: ModelClass::Reasoning,
        max_tokens: 4096,
        temperature: None,
        reasoning_effort: None,
        retry_policy: None,
    }
}

fn claude_text(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "content": [{ "type": "text", "text": text }],
        "usage": { "input_tokens": 40, "output_tokens": 20 },
    }))
}

/// `git2::Repository::init` plus one commit, so `SafetyController`'s
/// checkpoint/rollback (which read `HEAD`) have something to check out
/// against, matching what a real working tree always has.
fn init_repo(dir: &Path) {
    let repo = git2::Repository::init(dir).expect("init test repo");
    {
        let mut config = repo.config().expect("repo config");
        config.set_str("user.name", "Foreman Test").unwrap();
        config.set_str("user.email", "foreman-test@example.com").unwrap();
    }
    std::fs::write(dir.join("README.md"), "end-to-end test fixture\n").unwrap();
    let mut index = repo.index().expect("repo index");
    index.add_path(Path::new("README.md")).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let signature = repo.signature().expect("repo signature");
    repo.commit(Some("HEAD"), &signature, &signature, "initial commit", &tree, &[])
        .expect("initial commit");
}

/// Wires four `Mock`s onto one server, each keyed off a substring unique
/// to one subtask's prompt (or, for the Reviewer gate, the diff markers
/// `reviewer.rs::build_prompt` always includes) so the implementation
/// chain's four phases and the inline review of the Developer's
/// `CodeEdit` each get the response shaped for their role.
async fn mount_implementation_chain_mocks(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("Design the approach for"))
        .respond_with(claude_text(
            r#"{"kind":"plan","steps":["add a token-bucket limiter module","wire it into the gateway middleware"]}"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("Implement:"))
        .respond_with(claude_text(
            r#"{"kind":"code_edit","target_path":"src/rate_limiter.rs","original_hash":null,"new_content":"pub struct RateLimiter;\n","rationale":"Adds a token bucket rate limiter for the API gateway."}"#,
        ))
        .mount(server)
        .await;

    // The Reviewer *gate* inside `pool::apply_code_edit`, distinguished
    // from the Reviewer role's own subtask below by the diff markers
    // only its prompt includes.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("--- PROPOSED ---"))
        .respond_with(claude_text(
            r#"{"decision":"approve","confidence":0.95,"reasoning":"clean, small, matches the stated intent","suggestions":[],"security_concerns":[],"maintainability_score":0.9}"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("Identify test gaps"))
        .respond_with(claude_text(
            r#"{"kind":"analysis","text":"reviewed the new limiter","sources":[],"insights":["add a test for burst traffic exceeding the bucket"]}"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("Review the implementation of"))
        .respond_with(claude_text(r#"{"kind":"plan","steps":["sign off, ready to merge"]}"#))
        .mount(server)
        .await;
}

#[tokio::test]
async fn full_implementation_chain_runs_end_to_end_against_mocked_llm() {
    let server = MockServer::start().await;
    mount_implementation_chain_mocks(&server).await;

    let repo_dir = tempfile::tempdir().unwrap();
    init_repo(repo_dir.path());

    let profiles = default_profile_map(&base_model(&server.uri()));
    let oracle = LlmOracle::new(RetryPolicy::default());
    let safety = Arc::new(SafetyController::new(
        repo_dir.path(),
        SafetyConfig::default(),
        Box::new(SystemClock),
    ));
    let memory = Arc::new(MemoryStore::in_memory(256));
    let audit = Arc::new(AuditLog::new(repo_dir.path().join("audit")));

    let orchestrator = Orchestrator::new(profiles, oracle, repo_dir.path(), safety, memory.clone(), audit)
        .with_vcs(Arc::new(LocalGitCollaborator::new(repo_dir.path())));

    let mut command = Command::new("implement a rate limiter for the API gateway");
    command.constraints.skip_clarifications = true;

    let result = orchestrator.orchestrate(command).await.unwrap();

    assert_eq!(result.agents_spawned, result.results.len());
    assert_eq!(result.agents_spawned, 4, "architect, developer, qa, reviewer");
    for record in result.results.values() {
        assert!(
            record.success,
            "subtask for role {:?} failed: {:?}",
            record.role, record.error
        );
    }
    assert!(result.success, "report: {}", result.final_report);
    assert!(result.final_report.contains("✅ **Run succeeded**"));
    assert!(result.final_report.contains("developer"));

    let written = std::fs::read_to_string(repo_dir.path().join("src/rate_limiter.rs")).unwrap();
    assert_eq!(written, "pub struct RateLimiter;\n");

    let developer_record = result
        .results
        .values()
        .find(|r| r.role == AgentRole::Developer)
        .unwrap();
    assert!(developer_record.checkpoint_id.is_some());
    let review = developer_record.review_outcome.as_ref().unwrap();
    assert_eq!(review.decision, ReviewDecision::Approve);

    // The VCS handoff created a branch for the approved change.
    let repo = git2::Repository::open(repo_dir.path()).unwrap();
    let has_developer_branch = repo
        .branches(Some(git2::BranchType::Local))
        .unwrap()
        .filter_map(|b| b.ok())
        .any(|(branch, _)| {
            branch
                .name()
                .ok()
                .flatten()
                .map(|n| n.starts_with("orchestrator/developer-"))
                .unwrap_or(false)
        });
    assert!(has_developer_branch, "expected a developer branch from the VCS handoff");

    let orchestration_memories = memory.query(&MemoryQuery::new().with_tags(["orchestration".to_string()]));
    assert_eq!(orchestration_memories.len(), 1);
    assert!(orchestration_memories[0].content.contains("Orchestration report"));
}

#[tokio::test]
async fn missing_profile_for_a_role_fails_that_subtask_without_aborting_the_run() {
    let server = MockServer::start().await;
    mount_implementation_chain_mocks(&server).await;

    let repo_dir = tempfile::tempdir().unwrap();
    init_repo(repo_dir.path());

    // Only the Architect and Developer roles are configured; Qa and
    // Reviewer subtasks fail fast with "no profile configured".
    let mut profiles = default_profile_map(&base_model(&server.uri()));
    profiles.remove(&AgentRole::Qa);
    profiles.remove(&AgentRole::Reviewer);

    let oracle = LlmOracle::new(RetryPolicy::default());
    let safety = Arc::new(SafetyController::new(
        repo_dir.path(),
        SafetyConfig::default(),
        Box::new(SystemClock),
    ));
    let memory = Arc::new(MemoryStore::in_memory(256));
    let audit = Arc::new(AuditLog::new(repo_dir.path().join("audit")));

    // Without a Reviewer profile, the Developer's `CodeEdit` is rejected
    // conservatively by `pool::apply_code_edit`, so the Developer's own
    // subtask fails too even though its worker call succeeded.
    let orchestrator = Orchestrator::new(profiles, oracle, repo_dir.path(), safety, memory, audit);

    let mut command = Command::new("implement a rate limiter for the API gateway");
    command.constraints.skip_clarifications = true;

    let result = orchestrator.orchestrate(command).await.unwrap();

    assert_eq!(result.agents_spawned, 4);
    let failures: Vec<_> = result.results.values().filter(|r| !r.success).collect();
    assert_eq!(failures.len(), 3, "developer, qa, reviewer subtasks should all fail");
    assert!(!result.success);
    assert!(!repo_dir.path().join("src/rate_limiter.rs").exists());
}
