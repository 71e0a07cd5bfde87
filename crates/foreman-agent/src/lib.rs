//! The LLM oracle (spec §6.1): a single system/user prompt pair in,
//! free text out, with model-class-aware request shaping and fallback
//! chain execution across providers.
//!
//! # Main types
//!
//! - [`LlmOracle`] — walks a [`ModelChain`] with retry/backoff, demoting
//!   to the next model on non-retryable failure.
//! - [`ModelConfig`] / [`ModelChain`] / [`ModelClass`] — model and chain
//!   configuration.
//! - [`LlmResponse`] / [`LlmParams`] — the call's inputs and output.

/// Provider HTTP transports (Claude, OpenAI-compatible).
pub mod backends;
/// Model and provider configuration.
pub mod config;
/// Fallback chain execution with retry/backoff.
pub mod failover;
/// The oracle's request/response shapes.
pub mod llm;

pub use backends::LlmBackend;
pub use config::{LlmProvider, ModelChain, ModelClass, ModelConfig};
pub use failover::{LlmOracle, RetryPolicy};
pub use llm::{LlmParams, LlmResponse, LlmUsage};
