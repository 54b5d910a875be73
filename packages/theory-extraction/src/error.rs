//! Typed errors for the theory extraction pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Ambiguous routing is not an error; it resolves to a `manual_review`
//! routing decision.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a single completion-service call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The call did not answer within the per-call timeout
    #[error("completion call timed out")]
    Timeout,

    /// The service asked us to slow down
    #[error("completion call rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// The response did not match the expected schema
    #[error("malformed completion output: {0}")]
    Malformed(String),

    /// Non-retryable service failure (auth, bad request, ...)
    #[error("completion service error: {0}")]
    Service(String),
}

impl CallError {
    /// Timeouts, rate limits and malformed output share one retry policy.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CallError::Service(_))
    }

    /// Short label used in logs and the audit trail.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Timeout => "timeout",
            CallError::RateLimited { .. } => "rate_limited",
            CallError::Malformed(_) => "malformed",
            CallError::Service(_) => "service",
        }
    }
}

/// Raised when an assembled schema is still missing vocabulary terms after
/// every repair pass has been spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "schema for segment {segment_id} is missing {} term(s) after {attempts} repair attempt(s): {}",
    missing_terms.len(),
    missing_terms.join(", ")
)]
pub struct SchemaIncompleteError {
    pub segment_id: String,
    /// Normalized names of the terms absent from `definitions`
    pub missing_terms: Vec<String>,
    /// Repair passes issued before giving up
    pub attempts: u32,
}

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A completion call failed after the retry policy was exhausted
    #[error("{template_id} failed after {attempts} attempt(s): {source}")]
    Call {
        template_id: String,
        attempts: u32,
        #[source]
        source: CallError,
    },

    /// Terminal completeness failure for one segment
    #[error(transparent)]
    SchemaIncomplete(#[from] SchemaIncompleteError),

    /// Prompt template missing or could not be rendered
    #[error("template error: {0}")]
    Template(String),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PipelineError {
    /// Build a `Call` error.
    pub fn call(template_id: impl Into<String>, attempts: u32, source: CallError) -> Self {
        Self::Call {
            template_id: template_id.into(),
            attempts,
            source,
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for a single completion call.
pub type CallResult<T> = std::result::Result<T, CallError>;
