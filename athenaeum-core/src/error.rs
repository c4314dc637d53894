//! Error types for Athenaeum query-pipeline operations.

use thiserror::Error;

/// Retrieval adapter errors (§4.3).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("index unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("bad request to index: {reason}")]
    BadRequest { reason: String },
}

/// LLM adapter errors (§4.5).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("no LLM provider configured")]
    ProviderNotConfigured,

    #[error("request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("{provider} call timed out after {deadline_ms}ms")]
    Timeout { provider: String, deadline_ms: i64 },

    #[error("{provider} applied backpressure (rate limited)")]
    Backpressure { provider: String },

    #[error("invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("invalid API key for provider {provider}")]
    InvalidApiKey { provider: String },
}

/// Cache store errors (§4.1). Always non-fatal to callers — see
/// [`AthenaeumError::is_soft`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend error: {reason}")]
    Backend { reason: String },
}

/// Memory adapter errors (§6). Always non-fatal to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("memory backend error: {reason}")]
    Backend { reason: String },
}

/// Quota gate errors (§4.2, §7).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuotaError {
    #[error("query limit exceeded: {remaining} remaining of {limit}")]
    LimitExceeded { remaining: i64, limit: i64 },

    #[error("identity suspended")]
    Suspended,

    #[error("quota store error: {reason}")]
    Store { reason: String },
}

/// Planner errors (§4.6). Planner failures fall back to a single-hybrid
/// plan rather than propagating, so this variant exists mostly for
/// observability/logging.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlannerError {
    #[error("planner LLM call failed: {0}")]
    LlmFailed(String),

    #[error("planner returned malformed JSON: {0}")]
    MalformedPlan(String),
}

/// Analyzer errors (§4.8). Like the planner, batch failures degrade
/// in-place rather than propagate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("analyzer batch {batch_index} failed: {reason}")]
    BatchFailed { batch_index: usize, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Vector/embedding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: i32, got: i32 },

    #[error("invalid vector: {reason}")]
    InvalidVector { reason: String },
}

/// Master error type for all Athenaeum query-pipeline operations.
#[derive(Debug, Clone, Error)]
pub enum AthenaeumError {
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("quota error: {0}")]
    Quota(#[from] QuotaError),

    #[error("planner error: {0}")]
    Planner(#[from] PlannerError),

    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("vector error: {0}")]
    Vector(#[from] VectorError),
}

impl AthenaeumError {
    /// Errors that §7 classifies as always-non-fatal: caller-visible only as
    /// a log line, never as a surfaced failure.
    pub fn is_soft(&self) -> bool {
        matches!(self, AthenaeumError::Cache(_) | AthenaeumError::Memory(_))
    }
}

/// Result type alias for Athenaeum query-pipeline operations.
pub type AthenaeumResult<T> = Result<T, AthenaeumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_errors_are_cache_and_memory_only() {
        assert!(AthenaeumError::Cache(CacheError::Backend {
            reason: "x".into()
        })
        .is_soft());
        assert!(AthenaeumError::Memory(MemoryError::Backend {
            reason: "x".into()
        })
        .is_soft());
        assert!(!AthenaeumError::Quota(QuotaError::Suspended).is_soft());
    }
}
