//! Runs a single [`Subtask`] against the LLM oracle and parses its
//! response into a typed [`Artifact`] (spec §4.2).

use std::path::Path;
use std::time::Instant;

use foreman_agent::{LlmOracle, LlmParams, LlmUsage};
use foreman_core::{ForemanError, ForemanResult};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::types::{AgentProfile, Artifact, ArtifactKind, Subtask};

/// The outcome of running one subtask, before it's wrapped into an
/// [`crate::types::ExecutionRecord`] by the pool.
pub struct WorkerOutcome {
    pub artifact: ForemanResult<Artifact>,
    pub duration_ms: u64,
    pub usage: Option<LlmUsage>,
    pub model_used: String,
}

/// Stateless executor: borrows the oracle and is handed a profile and
/// subtask per call, so a single instance is shared across a phase's
/// concurrent subtasks.
pub struct Worker<'a> {
    oracle: &'a LlmOracle,
}

impl<'a> Worker<'a> {
    pub fn new(oracle: &'a LlmOracle) -> Self {
        Self { oracle }
    }

    /// Execute `subtask` under `profile`. `dependency_context` is the
    /// rendered output of subtasks this one depends on, already joined
    /// by the caller. `working_directory` resolves a `CodeEdit`'s target
    /// path so its pre-image can be hashed for the pool's apply-time
    /// conflict check.
    pub async fn run(
        &self,
        profile: &AgentProfile,
        subtask: &Subtask,
        dependency_context: &str,
        working_directory: &Path,
    ) -> WorkerOutcome {
        let start = Instant::now();
        let user_prompt = build_prompt(subtask, dependency_context);
        let model_used = profile
            .model_chain
            .models
            .first()
            .map(|m| m.model_id.clone())
            .unwrap_or_default();

        let result = self
            .oracle
            .complete(
                &profile.model_chain,
                &profile.system_prompt,
                &user_prompt,
                &LlmParams::default(),
            )
            .await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => WorkerOutcome {
                artifact: parse_artifact(
                    &response.text,
                    subtask.expected_output_kind,
                    &subtask.description,
                    working_directory,
                ),
                duration_ms,
                usage: response.usage,
                model_used,
            },
            Err(e) => WorkerOutcome {
                artifact: Err(e),
                duration_ms,
                usage: None,
                model_used,
            },
        }
    }
}

fn build_prompt(subtask: &Subtask, dependency_context: &str) -> String {
    let mut prompt = subtask.description.clone();
    if !dependency_context.is_empty() {
        prompt.push_str("\n\n=== CONTEXT FROM PRIOR SUBTASKS ===\n");
        prompt.push_str(dependency_context);
        prompt.push_str("\n=== END CONTEXT ===\n");
    }
    prompt.push_str(&format!(
        "\n\nRespond with a single JSON object matching the `{}` artifact schema. \
         No prose outside the JSON.",
        schema_name(subtask.expected_output_kind)
    ));
    prompt
}

fn schema_name(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::CodeEdit => "code_edit",
        ArtifactKind::Analysis => "analysis",
        ArtifactKind::Scoring => "scoring",
        ArtifactKind::Plan => "plan",
        ArtifactKind::NoOp => "no_op",
    }
}

/// Parse a Worker's response into an [`Artifact`]. `CodeEdit` is parsed
/// out of a fenced code block rather than a JSON object: the natural
/// shape for a code response is a ```` ```rust\n...\n``` ```` fence, not
/// an escaped JSON string, so it gets its own extraction path. Every
/// other kind is pulled out of the first balanced-looking `{...}` span,
/// since models routinely wrap JSON in prose or a markdown fence.
fn parse_artifact(
    text: &str,
    expected: ArtifactKind,
    instructions: &str,
    working_directory: &Path,
) -> ForemanResult<Artifact> {
    if expected == ArtifactKind::CodeEdit {
        if let Some(new_content) = extract_fenced_code_block(text) {
            let target_path =
                extract_file_path(instructions).unwrap_or_else(|| "UNKNOWN".to_string());
            let original_hash = std::fs::read_to_string(working_directory.join(&target_path))
                .ok()
                .map(|content| content_hash(&content));
            return Ok(Artifact::CodeEdit {
                target_path,
                original_hash,
                new_content,
                rationale: text.to_string(),
            });
        }
    }

    let candidate = extract_json_object(text).unwrap_or(text);
    let artifact: Artifact =
        serde_json::from_str(candidate).map_err(|_| ForemanError::ArtifactParseError)?;

    if artifact.kind() != expected {
        warn!(
            expected = ?expected,
            actual = ?artifact.kind(),
            "worker produced an artifact kind different from what was requested"
        );
    }
    Ok(artifact)
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

/// `_parse_and_apply_agent_response`'s
/// ``` r"```(?:python|py|\w*)\n(.*?)\n```" ``` over the response text:
/// the language tag after the opening fence is ignored, and the first
/// fenced block found is taken as the proposed file content.
fn extract_fenced_code_block(text: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```[ \t]*\w*\n(.*?)\n```").expect("static fence regex is valid");
    re.captures(text).map(|c| c[1].to_string())
}

/// `_extract_file_path_from_instructions`: look for `in <path>` or
/// `file <path>`, falling back to a bare path-like token ending in a
/// recognizable source extension.
fn extract_file_path(instructions: &str) -> Option<String> {
    let hinted = Regex::new(r"(?:in|file)\s+([A-Za-z0-9_./-]+\.[A-Za-z0-9]+)")
        .expect("static path regex is valid");
    if let Some(c) = hinted.captures(instructions) {
        return Some(c[1].to_string());
    }
    let bare = Regex::new(r"[A-Za-z0-9_./-]+\.(?:rs|toml|py|js|ts|go|java|md)")
        .expect("static path regex is valid");
    bare.find(instructions).map(|m| m.as_str().to_string())
}

/// Hex-encoded SHA-256, used to detect whether a `CodeEdit`'s on-disk
/// pre-image changed between parse time and apply time.
pub(crate) fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_prose() {
        let text = "Here you go:\n```json\n{\"kind\":\"plan\",\"steps\":[\"a\"]}\n```\nDone.";
        let extracted = extract_json_object(text).unwrap();
        let artifact: Artifact = serde_json::from_str(extracted).unwrap();
        assert_eq!(artifact.kind(), ArtifactKind::Plan);
    }

    #[test]
    fn parse_artifact_rejects_non_json() {
        let dir = tempfile::tempdir().unwrap();
        let result = parse_artifact("not json at all", ArtifactKind::NoOp, "", dir.path());
        assert!(matches!(result, Err(ForemanError::ArtifactParseError)));
    }

    #[test]
    fn parse_artifact_warns_but_succeeds_on_kind_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let text = r#"{"kind":"no_op","reason":"nothing to do"}"#;
        let result = parse_artifact(text, ArtifactKind::Analysis, "", dir.path()).unwrap();
        assert_eq!(result.kind(), ArtifactKind::NoOp);
    }

    #[test]
    fn parse_artifact_extracts_code_edit_from_fenced_block() {
        let dir = tempfile::tempdir().unwrap();
        let text = "Updated the file:\n```rust\nfn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n```\nDone.";
        let result = parse_artifact(
            text,
            ArtifactKind::CodeEdit,
            "fix the bug in src/lib.rs",
            dir.path(),
        )
        .unwrap();
        match result {
            Artifact::CodeEdit { target_path, new_content, original_hash, .. } => {
                assert_eq!(target_path, "src/lib.rs");
                assert!(new_content.contains("fn add"));
                assert!(original_hash.is_none());
            }
            other => panic!("expected CodeEdit artifact, got {other:?}"),
        }
    }

    #[test]
    fn parse_artifact_hashes_existing_file_as_original() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "fn old() {}\n").unwrap();
        let text = "```rust\nfn new_impl() {}\n```";
        let result = parse_artifact(
            text,
            ArtifactKind::CodeEdit,
            "update src/lib.rs",
            dir.path(),
        )
        .unwrap();
        match result {
            Artifact::CodeEdit { original_hash, .. } => {
                assert_eq!(
                    original_hash.unwrap(),
                    content_hash("fn old() {}\n")
                );
            }
            other => panic!("expected CodeEdit artifact, got {other:?}"),
        }
    }

    #[test]
    fn extract_file_path_finds_hinted_path() {
        assert_eq!(
            extract_file_path("please fix the bug in src/worker.rs today"),
            Some("src/worker.rs".to_string())
        );
    }

    #[test]
    fn build_prompt_includes_dependency_context() {
        let subtask = Subtask {
            id: uuid::Uuid::new_v4(),
            agent_role: crate::types::AgentRole::Planner,
            description: "plan the rollout".into(),
            required_tools: vec![],
            expected_output_kind: ArtifactKind::Plan,
            priority: 1,
        };
        let prompt = build_prompt(&subtask, "earlier analysis here");
        assert!(prompt.contains("plan the rollout"));
        assert!(prompt.contains("earlier analysis here"));
    }
}
