//! Tag/keyword/type-indexed memory store shared by the Orchestrator,
//! the Autonomous loop, and the Feedback loop.
//!
//! # Main types
//!
//! - [`MemoryStore`] — JSONL-backed store, queried by tag/keyword/type
//!   overlap rather than embedding similarity.
//! - [`MemoryRecord`] / [`NewMemoryRecord`] — a stored note and the
//!   fields needed to write one.
//! - [`MemoryQuery`] — a retrieval request.

/// Store, record, and query types.
pub mod store;

pub use store::{MemoryQuery, MemoryRecord, MemoryStore, MemoryType, NewMemoryRecord};
