//! Markdown report rendering (spec §4.1, "Report generation" design
//! note): the Markdown string returned in an [`crate::types::OrchestrationResult`]
//! is never built by string concatenation directly — it's produced from
//! a typed [`Report`] object so the shape is testable independently of
//! its rendering.

use crate::types::{AgentRole, ExecutionRecord};

/// One subtask's entry in the report.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub role: AgentRole,
    pub success: bool,
    pub summary: String,
}

/// The typed, pre-render shape of an orchestration report.
#[derive(Debug, Clone)]
pub struct Report {
    pub task_description: String,
    pub rows: Vec<ReportRow>,
    pub errors: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Report {
    /// Build a report from `records`, sorted by (priority, subtask_id)
    /// — `priorities` supplies each subtask's priority since
    /// `ExecutionRecord` itself doesn't carry one.
    pub fn from_records(
        task_description: &str,
        records: &[ExecutionRecord],
        priorities: &std::collections::HashMap<uuid::Uuid, u8>,
    ) -> Self {
        let mut sorted: Vec<&ExecutionRecord> = records.iter().collect();
        sorted.sort_by_key(|r| {
            (
                priorities.get(&r.subtask_id).copied().unwrap_or(3),
                r.subtask_id,
            )
        });

        let rows = sorted
            .iter()
            .map(|r| ReportRow {
                role: r.role,
                success: r.success,
                summary: summarize(r),
            })
            .collect();

        let errors = sorted
            .iter()
            .filter_map(|r| r.error.clone())
            .collect();

        let recommendations = sorted
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| recommendation_for(r))
            .collect();

        Self {
            task_description: task_description.to_string(),
            rows,
            errors,
            recommendations,
        }
    }

    /// Whether the success banner should read as an overall success:
    /// spec §3's `OrchestrationResult.success` rule — at least
    /// `threshold` fraction of subtasks succeeded and no row records a
    /// critical failure. The caller (Orchestrator) independently
    /// computes the authoritative `success` flag; this only drives the
    /// banner text.
    pub fn success_fraction(&self) -> f64 {
        if self.rows.is_empty() {
            return 1.0;
        }
        let succeeded = self.rows.iter().filter(|r| r.success).count();
        succeeded as f64 / self.rows.len() as f64
    }

    pub fn render(&self, overall_success: bool) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Orchestration report: {}\n\n", self.task_description));

        if overall_success {
            out.push_str("✅ **Run succeeded**\n\n");
        } else {
            out.push_str("❌ **Run did not meet the success threshold**\n\n");
        }

        out.push_str("## Subtasks\n\n");
        for row in &self.rows {
            let mark = if row.success { "✅" } else { "❌" };
            out.push_str(&format!("- {mark} **{}** — {}\n", row.role, row.summary));
        }
        out.push('\n');

        if !self.errors.is_empty() {
            out.push_str("## Errors\n\n");
            for error in &self.errors {
                out.push_str(&format!("- {error}\n"));
            }
            out.push('\n');
        }

        if !self.recommendations.is_empty() {
            out.push_str("## Recommendations\n\n");
            for rec in &self.recommendations {
                out.push_str(&format!("- {rec}\n"));
            }
            out.push('\n');
        }

        out
    }
}

fn summarize(record: &ExecutionRecord) -> String {
    match (&record.artifact, &record.error) {
        (Some(artifact), _) => format!("{artifact:?}"),
        (None, Some(error)) => error.clone(),
        (None, None) => "no artifact produced".to_string(),
    }
}

fn recommendation_for(record: &ExecutionRecord) -> Option<String> {
    match &record.artifact {
        Some(crate::types::Artifact::Scoring { items }) => items
            .iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
            .map(|top| format!("Highest-scored opportunity: {} ({:.0})", top.label, top.score)),
        Some(crate::types::Artifact::Plan { steps }) if !steps.is_empty() => {
            Some(format!("Next step: {}", steps[0]))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Artifact;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn record(role: AgentRole, success: bool, artifact: Option<Artifact>, error: Option<&str>) -> ExecutionRecord {
        ExecutionRecord {
            subtask_id: Uuid::new_v4(),
            role,
            model_used: "test-model".into(),
            success,
            artifact,
            error: error.map(str::to_string),
            duration_ms: 10,
            cost: 0.0,
            checkpoint_id: None,
            review_outcome: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn render_includes_success_banner_and_rows() {
        let r = record(AgentRole::Developer, true, Some(Artifact::NoOp { reason: "done".into() }), None);
        let mut priorities = HashMap::new();
        priorities.insert(r.subtask_id, 1);
        let report = Report::from_records("do the thing", &[r], &priorities);
        let rendered = report.render(true);
        assert!(rendered.contains("✅ **Run succeeded**"));
        assert!(rendered.contains("developer"));
    }

    #[test]
    fn errors_section_lists_failed_subtask_messages() {
        let r = record(AgentRole::Developer, false, None, Some("model unavailable"));
        let report = Report::from_records("do the thing", &[r], &HashMap::new());
        let rendered = report.render(false);
        assert!(rendered.contains("## Errors"));
        assert!(rendered.contains("model unavailable"));
    }

    #[test]
    fn success_fraction_computed_from_rows() {
        let a = record(AgentRole::Developer, true, None, None);
        let b = record(AgentRole::Qa, false, None, Some("failed"));
        let report = Report::from_records("t", &[a, b], &HashMap::new());
        assert!((report.success_fraction() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn recommendations_surface_the_top_scored_opportunity() {
        let artifact = Artifact::Scoring {
            items: vec![
                crate::types::ScoredItem { label: "A".into(), score: 60.0, rationale: "ok".into() },
                crate::types::ScoredItem { label: "B".into(), score: 90.0, rationale: "great".into() },
            ],
        };
        let r = record(AgentRole::OpportunityScorer, true, Some(artifact), None);
        let report = Report::from_records("t", &[r], &HashMap::new());
        assert!(report.recommendations[0].contains('B'));
    }
}
