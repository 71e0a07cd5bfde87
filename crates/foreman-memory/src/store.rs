//! Tag/keyword/type-indexed memory store.
//!
//! Subtasks, the Autonomous loop, and the Feedback loop all write small
//! structured notes here (a goal, a completed task, a decision, a learned
//! pattern) and later retrieve them by overlap on tags/keywords/type
//! rather than by embedding similarity — there is no vector search in
//! this store.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use foreman_core::ids::IdGenerator;
use foreman_core::{ForemanError, ForemanResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// The category a memory record belongs to. Drives which phase of the
/// autonomous loop or orchestration run is most likely to want it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Goal,
    Task,
    Context,
    Decision,
    Progress,
    Error,
    Knowledge,
}

/// A single stored note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: u64,
    pub content: String,
    pub tags: HashSet<String>,
    #[serde(rename = "type")]
    pub record_type: MemoryType,
    pub keywords: Vec<String>,
    pub related_ids: Vec<u64>,
    /// 0.0-1.0; higher-importance records survive eviction longer.
    pub importance: f32,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// The fields a caller supplies when writing a new record; `id` and
/// `created_at` are filled in by the store.
#[derive(Debug, Clone)]
pub struct NewMemoryRecord {
    pub content: String,
    pub tags: HashSet<String>,
    pub record_type: MemoryType,
    pub keywords: Vec<String>,
    pub related_ids: Vec<u64>,
    pub importance: f32,
    pub summary: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewMemoryRecord {
    pub fn new(content: impl Into<String>, record_type: MemoryType) -> Self {
        Self {
            content: content.into(),
            tags: HashSet::new(),
            record_type,
            keywords: Vec::new(),
            related_ids: Vec::new(),
            importance: 0.5,
            summary: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = String>) -> Self {
        self.keywords = keywords.into_iter().collect();
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }
}

/// A query against the store. An empty `tags`/`keywords`/`record_type`
/// matches everything of that dimension; results are ranked by overlap
/// count, then importance.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub record_type: Option<MemoryType>,
    pub limit: usize,
}

impl MemoryQuery {
    pub fn new() -> Self {
        Self {
            limit: 10,
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = String>) -> Self {
        self.keywords = keywords.into_iter().collect();
        self
    }

    pub fn of_type(mut self, record_type: MemoryType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

struct Indices {
    records: HashMap<u64, MemoryRecord>,
    by_tag: HashMap<String, HashSet<u64>>,
    by_keyword: HashMap<String, HashSet<u64>>,
    by_type: HashMap<MemoryType, HashSet<u64>>,
}

impl Indices {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            by_tag: HashMap::new(),
            by_keyword: HashMap::new(),
            by_type: HashMap::new(),
        }
    }

    fn insert(&mut self, record: MemoryRecord) {
        let id = record.id;
        for tag in &record.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(id);
        }
        for keyword in &record.keywords {
            self.by_keyword
                .entry(keyword.clone())
                .or_default()
                .insert(id);
        }
        self.by_type.entry(record.record_type).or_default().insert(id);
        self.records.insert(id, record);
    }

    fn remove(&mut self, id: u64) {
        if let Some(record) = self.records.remove(&id) {
            for tag in &record.tags {
                if let Some(set) = self.by_tag.get_mut(tag) {
                    set.remove(&id);
                }
            }
            for keyword in &record.keywords {
                if let Some(set) = self.by_keyword.get_mut(keyword) {
                    set.remove(&id);
                }
            }
            if let Some(set) = self.by_type.get_mut(&record.record_type) {
                set.remove(&id);
            }
        }
    }

    /// The least important, oldest record, for eviction.
    fn weakest(&self) -> Option<u64> {
        self.records
            .values()
            .min_by(|a, b| {
                a.importance
                    .partial_cmp(&b.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.created_at.cmp(&b.created_at))
            })
            .map(|r| r.id)
    }
}

/// Tag/keyword/type-indexed memory store with an optional JSONL-backed
/// append log (insert appends a line; eviction does not delete from the
/// file — the full history on disk is reconstructed and re-filtered on
/// open).
pub struct MemoryStore {
    ids: IdGenerator,
    capacity: usize,
    inner: RwLock<Indices>,
    persist_path: Option<PathBuf>,
}

impl MemoryStore {
    /// An in-memory-only store. Good for tests and for the CLI's
    /// single-shot `orchestrate` command, where there's no cross-run
    /// memory to persist.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            ids: IdGenerator::new(),
            capacity,
            inner: RwLock::new(Indices::new()),
            persist_path: None,
        }
    }

    /// Open (or create) a store backed by a JSONL file. Existing records
    /// are replayed in file order; capacity is then enforced by eviction,
    /// so a file written with a larger capacity shrinks on open.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> ForemanResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut indices = Indices::new();
        let mut max_id = 0u64;

        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: MemoryRecord = serde_json::from_str(line)?;
                max_id = max_id.max(record.id);
                indices.insert(record);
            }
        }

        let store = Self {
            ids: IdGenerator::new(),
            capacity,
            inner: RwLock::new(indices),
            persist_path: Some(path),
        };
        for _ in 0..max_id {
            store.ids.next_id();
        }
        store.enforce_capacity();
        Ok(store)
    }

    /// Insert a new record, evicting the weakest existing one if the
    /// store is over capacity afterward. Returns the minted id.
    pub fn insert(&self, new_record: NewMemoryRecord) -> ForemanResult<u64> {
        let record = MemoryRecord {
            id: self.ids.next_id(),
            content: new_record.content,
            tags: new_record.tags,
            record_type: new_record.record_type,
            keywords: new_record.keywords,
            related_ids: new_record.related_ids,
            importance: new_record.importance,
            summary: new_record.summary,
            created_at: Utc::now(),
            metadata: new_record.metadata,
        };

        if let Some(path) = &self.persist_path {
            self.append_to_disk(path, &record)?;
        }

        let id = record.id;
        self.inner.write().insert(record);
        self.enforce_capacity();
        Ok(id)
    }

    fn append_to_disk(&self, path: &Path, record: &MemoryRecord) -> ForemanResult<()> {
        use std::io::Write;
        let line = serde_json::to_string(record)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{line}").map_err(ForemanError::Io)
    }

    fn enforce_capacity(&self) {
        loop {
            let over = {
                let inner = self.inner.read();
                inner.records.len() > self.capacity
            };
            if !over {
                break;
            }
            let victim = self.inner.read().weakest();
            match victim {
                Some(id) => {
                    tracing::debug!(record_id = id, "evicting weakest memory record");
                    self.inner.write().remove(id);
                }
                None => break,
            }
        }
    }

    pub fn get(&self, id: u64) -> Option<MemoryRecord> {
        self.inner.read().records.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run a query, ranking matches by (tag overlap + keyword overlap)
    /// descending, then importance descending.
    pub fn query(&self, query: &MemoryQuery) -> Vec<MemoryRecord> {
        let inner = self.inner.read();

        let candidate_ids: HashSet<u64> = if let Some(record_type) = query.record_type {
            inner
                .by_type
                .get(&record_type)
                .cloned()
                .unwrap_or_default()
        } else {
            inner.records.keys().copied().collect()
        };

        let mut scored: Vec<(u64, usize)> = candidate_ids
            .into_iter()
            .filter_map(|id| {
                let record = inner.records.get(&id)?;
                let tag_hits = query.tags.iter().filter(|t| record.tags.contains(*t)).count();
                let keyword_hits = query
                    .keywords
                    .iter()
                    .filter(|k| record.keywords.iter().any(|rk| rk == *k))
                    .count();
                let has_filter = !query.tags.is_empty() || !query.keywords.is_empty();
                if has_filter && tag_hits == 0 && keyword_hits == 0 {
                    return None;
                }
                Some((id, tag_hits + keyword_hits))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.cmp(&a.1).then_with(|| {
                let ra = inner.records.get(&a.0).map(|r| r.importance).unwrap_or(0.0);
                let rb = inner.records.get(&b.0).map(|r| r.importance).unwrap_or(0.0);
                rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        scored
            .into_iter()
            .take(query.limit.max(1))
            .filter_map(|(id, _)| inner.records.get(&id).cloned())
            .collect()
    }
}
