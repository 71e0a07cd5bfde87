//! Core error taxonomy and clock/ID/cancellation primitives shared
//! across the Foreman workspace.
//!
//! # Main types
//!
//! - [`ForemanError`] — unified error enum for every subsystem.
//! - [`ForemanResult`] — convenience alias for `Result<T, ForemanError>`.
//! - [`ids::Clock`] / [`ids::IdGenerator`] — the "Clock & IDs" component:
//!   monotonic time and unique identifier minting, injected rather than
//!   called ad hoc so tests can substitute a fake clock.
//! - [`cancel::CancelToken`] — cooperative cancellation shared between
//!   the Safety controller's emergency stop and in-flight Worker/LLM
//!   calls.

pub mod cancel;
pub mod ids;

/// Top-level error type for the Foreman orchestration engine.
///
/// Variant names are the stable error taxonomy from the specification
/// (§7): callers match on these, not on message text.
#[derive(Debug, thiserror::Error)]
pub enum ForemanError {
    /// A Decomposition has an unresolved required clarification and the
    /// caller did not opt to skip clarifications.
    #[error("clarification required: {0:?}")]
    ClarificationRequired(Vec<String>),

    /// The Safety controller's emergency stop is active.
    #[error("emergency stop active: {0}")]
    EmergencyStopped(String),

    /// A structured safety check failed. `level` mirrors
    /// `SafetyViolation::level`; `warning` never reaches this variant
    /// (warnings are reported but non-fatal).
    #[error("safety violation ({level}): {message}")]
    SafetyViolation {
        /// `error` or `critical`.
        level: String,
        /// Human-readable description.
        message: String,
    },

    /// The Worker pool's budget_limit would be exceeded by starting
    /// another subtask.
    #[error("budget exceeded: spent {spent:.2} of {limit:.2}")]
    BudgetExceeded {
        /// Cumulative cost already committed.
        spent: f64,
        /// Configured budget ceiling.
        limit: f64,
    },

    /// A Worker's LLM response could not be parsed into a recognized
    /// Artifact shape.
    #[error("could not parse an artifact from the model response")]
    ArtifactParseError,

    /// The Reviewer returned `reject`.
    #[error("review rejected: {0}")]
    ReviewRejected(String),

    /// The Reviewer returned `request_changes` (or a low-confidence
    /// `approve`, which is treated identically).
    #[error("review requested changes: {0}")]
    ReviewRequestedChanges(String),

    /// Every model in the fallback chain failed.
    #[error("no LLM backend in the chain succeeded: {0}")]
    LlmUnavailable(String),

    /// A call to the LLM oracle timed out.
    #[error("LLM call timed out after {0:?}")]
    LlmTimeout(std::time::Duration),

    /// The LLM oracle reported a rate limit.
    #[error("LLM backend rate limited: {0}")]
    LlmRateLimited(String),

    /// The LLM oracle returned a body that could not be interpreted at
    /// all (not even as free text).
    #[error("invalid LLM response: {0}")]
    LlmInvalidResponse(String),

    /// An operation against the VCS collaborator failed after a local
    /// change was already applied; the local apply stands.
    #[error("VCS error: {0}")]
    Vcs(String),

    /// A Memory store operation failed. Never fails a subtask on its own
    /// — writes are best-effort.
    #[error("memory store error: {0}")]
    Memory(String),

    /// An error from an outbound HTTP request (e.g. LLM API call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error in configuration parsing or validation.
    #[error("config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A checkpoint/rollback operation against the working tree failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

/// A convenience `Result` alias using [`ForemanError`].
pub type ForemanResult<T> = Result<T, ForemanError>;
