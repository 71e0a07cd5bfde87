//! Feedback/Learning (spec §4.8): keeps `learned_patterns` up to date
//! from an `ExecutionRecord` history and serves recommendations for
//! future scoring. Grounded in
//! `examples/original_source/ai/autonomous/feedback.py`'s confidence
//! thresholds, moving-average update rule, and pattern mint condition.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use foreman_core::ids::Clock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{AgentRole, ExecutionRecord};

const MIN_CONFIDENCE: f64 = 0.3;
const PATTERN_MATCH_THRESHOLD: f64 = 0.7;
const MAX_PATTERNS: usize = 100;
const LEARNING_RATE: f64 = 0.1;
const MAX_HISTORY: usize = 1000;
const TRIM_TO: usize = 500;
const MINT_REQUIRES_SIMILAR_OUTCOMES: usize = 2;
const INITIAL_CONFIDENCE: f64 = 0.6;
const RECOMMENDATION_LIMIT: usize = 3;

/// `pattern_type` in feedback.py: what kind of regularity this pattern
/// captures, not a judgement of its current confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningKind {
    Success,
    Failure,
    Strategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPattern {
    pub pattern_id: String,
    pub kind: LearningKind,
    /// 0.0-1.0.
    pub confidence: f64,
    pub description: String,
    /// Context this pattern applies under; `get_recommendations` matches
    /// a caller's context against this map by exact key/value equality.
    pub conditions: HashMap<String, String>,
    /// What to do when this pattern matches.
    pub actions: HashMap<String, String>,
    /// What tends to happen when `actions` is followed under
    /// `conditions`.
    pub outcomes: HashMap<String, String>,
    pub usage_count: u64,
    pub success_rate: f64,
}


#[derive(Debug, Clone)]
struct HistoryEntry {
    role: AgentRole,
    success: bool,
    recorded_at: DateTime<Utc>,
}

pub struct FeedbackStore {
    clock: Box<dyn Clock>,
    history: VecDeque<HistoryEntry>,
    patterns: Vec<LearningPattern>,
}

impl FeedbackStore {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            history: VecDeque::new(),
            patterns: Vec::new(),
        }
    }

    pub fn patterns(&self) -> &[LearningPattern] {
        &self.patterns
    }

    /// `record(outcome)` from spec §4.8: append to the bounded FIFO
    /// history, update a matching pattern's usage/success by moving
    /// average, or mint a new pattern once at least two similar
    /// outcomes exist in the window. A pattern "matches" a record when
    /// its `kind` and `conditions` agree exactly, mirroring
    /// `_find_similar_pattern`'s `pattern_type == pattern_type and
    /// conditions == conditions`.
    pub fn record(&mut self, record: &ExecutionRecord) {
        let now = self.clock.now();
        self.history.push_back(HistoryEntry {
            role: record.role,
            success: record.success,
            recorded_at: now,
        });
        if self.history.len() > MAX_HISTORY {
            while self.history.len() > TRIM_TO {
                self.history.pop_front();
            }
        }

        let kind = if record.success { LearningKind::Success } else { LearningKind::Failure };
        let conditions = conditions_for(record);

        if let Some(existing) = self
            .patterns
            .iter_mut()
            .find(|p| p.kind == kind && p.conditions == conditions)
        {
            update_with_moving_average(existing, record.success);
            return;
        }

        let similar = self
            .history
            .iter()
            .filter(|h| h.role == record.role)
            .count();
        if similar >= MINT_REQUIRES_SIMILAR_OUTCOMES {
            let mut actions = HashMap::new();
            actions.insert("approach".to_string(), record.role.to_string());
            let mut outcomes = HashMap::new();
            outcomes.insert("success".to_string(), record.success.to_string());

            let pattern = LearningPattern {
                pattern_id: format!("pattern-{}-{}-{}", kind_word(kind), record.role, self.patterns.len()),
                kind,
                confidence: INITIAL_CONFIDENCE,
                description: format!("{} subtasks tend to {}", record.role, outcome_word(record.success)),
                conditions,
                actions,
                outcomes,
                usage_count: similar as u64,
                success_rate: if record.success { 1.0 } else { 0.0 },
            };
            info!(pattern_id = %pattern.pattern_id, "minted new learning pattern");
            self.patterns.push(pattern);
        }
    }

    /// `get_recommendations(opportunity_context)`: patterns whose
    /// `conditions` match `context` at or above
    /// `pattern_match_threshold` (match ratio = matched keys / total
    /// condition keys), sorted by `confidence * success_rate`, top 3.
    pub fn get_recommendations(&self, context: &HashMap<String, String>) -> Vec<LearningPattern> {
        let mut matched: Vec<&LearningPattern> = self
            .patterns
            .iter()
            .filter(|p| pattern_matches_context(p, context))
            .collect();
        matched.sort_by(|a, b| (b.confidence * b.success_rate).total_cmp(&(a.confidence * a.success_rate)));
        matched
            .into_iter()
            .take(RECOMMENDATION_LIMIT)
            .cloned()
            .collect()
    }

    /// `update_patterns()` from spec §4.8 / feedback.py: recompute
    /// success rate and confidence from the rolling 7-day window, drop
    /// patterns below `min_confidence_threshold`, and keep only the top
    /// `max_patterns` by `confidence * success_rate`.
    pub fn recompute(&mut self) {
        let cutoff = self.clock.now() - chrono::Duration::days(7);
        let recent: Vec<&HistoryEntry> = self.history.iter().filter(|h| h.recorded_at > cutoff).collect();
        if recent.is_empty() {
            return;
        }

        for pattern in &mut self.patterns {
            let pattern_role = pattern.conditions.get("role").map(String::as_str);
            let matches: Vec<&&HistoryEntry> = recent
                .iter()
                .filter(|h| pattern_role == Some(h.role.to_string().as_str()))
                .collect();
            if matches.is_empty() {
                continue;
            }
            let successes = matches.iter().filter(|m| m.success).count();
            pattern.success_rate = successes as f64 / matches.len() as f64;
            pattern.usage_count += matches.len() as u64;

            if pattern.success_rate > 0.8 {
                pattern.confidence = (pattern.confidence + LEARNING_RATE).min(1.0);
            } else if pattern.success_rate < 0.3 {
                pattern.confidence = (pattern.confidence - LEARNING_RATE).max(0.1);
            }
        }

        self.patterns.retain(|p| p.confidence >= MIN_CONFIDENCE);
        self.patterns
            .sort_by(|a, b| (b.confidence * b.success_rate).total_cmp(&(a.confidence * a.success_rate)));
        self.patterns.truncate(MAX_PATTERNS);
    }

}

fn update_with_moving_average(pattern: &mut LearningPattern, success: bool) {
    pattern.usage_count += 1;
    let success_value = if success { 1.0 } else { 0.0 };
    pattern.success_rate += (success_value - pattern.success_rate) * LEARNING_RATE;
}

fn outcome_word(success: bool) -> &'static str {
    if success {
        "succeed"
    } else {
        "fail"
    }
}

fn kind_word(kind: LearningKind) -> &'static str {
    match kind {
        LearningKind::Success => "success",
        LearningKind::Failure => "failure",
        LearningKind::Strategy => "strategy",
    }
}

/// The dimension a pattern is conditioned on for a single
/// `ExecutionRecord`: the role it ran under. `get_recommendations`
/// callers build a matching context the same way.
fn conditions_for(record: &ExecutionRecord) -> HashMap<String, String> {
    let mut conditions = HashMap::new();
    conditions.insert("role".to_string(), record.role.to_string());
    conditions
}

/// `_pattern_matches_context`: match ratio over the pattern's own
/// condition keys, not the caller's context keys, so an empty-context
/// caller simply fails every non-empty pattern instead of panicking.
fn pattern_matches_context(pattern: &LearningPattern, context: &HashMap<String, String>) -> bool {
    if pattern.conditions.is_empty() {
        return false;
    }
    let match_score = pattern
        .conditions
        .iter()
        .filter(|(key, value)| context.get(*key) == Some(*value))
        .count();
    (match_score as f64 / pattern.conditions.len() as f64) >= PATTERN_MATCH_THRESHOLD
}
