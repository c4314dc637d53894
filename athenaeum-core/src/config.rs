//! Pipeline-wide tuning constants (§5 Concurrency & Resource Model, §6
//! Config surface). Provider credentials and HTTP-layer settings live in
//! their own crates (`athenaeum-llm`, `athenaeum-api`); this config covers
//! only the knobs the query-time pipeline itself reads.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Master pipeline configuration. Every field has a documented default
/// so a bare `from_env()` call in a fresh environment still produces a
/// working instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PipelineConfig {
    /// Fan-out executor's retrieval concurrency cap (§4.7, default ≈5).
    pub fanout_concurrency: usize,
    /// Analyzer batch size (§4.8, default 2).
    pub analyzer_batch_size: usize,
    /// Analyzer batch concurrency cap (§4.8, default ≈10).
    pub analyzer_concurrency: usize,
    /// Hard cap on the merged candidate set regardless of plan.max_results
    /// (§4.7).
    pub merge_hard_cap: usize,
    /// Default TTL applied to cache writes (§4.1).
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub cache_ttl: Duration,
    /// Disables cache lookup globally; separate from cache-exclusivity
    /// for filtered queries (§4.1).
    pub dev_mode: bool,
    /// Per-LLM-call deadline (§4.5, §5).
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub llm_call_deadline: Duration,
    /// Whole-request deadline (§5, ~30s).
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub request_deadline: Duration,
    /// Number of results to return for a simple-strategy query.
    pub to_return_simple: usize,
    /// Number of results to return for an exhaustive-strategy query.
    pub to_return_exhaustive: usize,
    /// Default blend ratio for hybrid retrieval (§4.3).
    pub default_semantic_ratio: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fanout_concurrency: 5,
            analyzer_batch_size: 2,
            analyzer_concurrency: 10,
            merge_hard_cap: 200,
            cache_ttl: Duration::from_secs(6 * 3600),
            dev_mode: false,
            llm_call_deadline: Duration::from_secs(20),
            request_deadline: Duration::from_secs(30),
            to_return_simple: 10,
            to_return_exhaustive: 30,
            default_semantic_ratio: 0.5,
        }
    }
}

impl PipelineConfig {
    /// Builds from environment variables, falling back to
    /// [`PipelineConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fanout_concurrency: env_usize("ATHENAEUM_FANOUT_CONCURRENCY", defaults.fanout_concurrency),
            analyzer_batch_size: env_usize(
                "ATHENAEUM_ANALYZER_BATCH_SIZE",
                defaults.analyzer_batch_size,
            ),
            analyzer_concurrency: env_usize(
                "ATHENAEUM_ANALYZER_CONCURRENCY",
                defaults.analyzer_concurrency,
            ),
            merge_hard_cap: env_usize("ATHENAEUM_MERGE_HARD_CAP", defaults.merge_hard_cap),
            cache_ttl: Duration::from_secs(env_u64(
                "ATHENAEUM_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )),
            dev_mode: std::env::var("ATHENAEUM_DEV_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.dev_mode),
            llm_call_deadline: Duration::from_secs(env_u64(
                "ATHENAEUM_LLM_DEADLINE_SECS",
                defaults.llm_call_deadline.as_secs(),
            )),
            request_deadline: Duration::from_secs(env_u64(
                "ATHENAEUM_REQUEST_DEADLINE_SECS",
                defaults.request_deadline.as_secs(),
            )),
            to_return_simple: env_usize("ATHENAEUM_TO_RETURN_SIMPLE", defaults.to_return_simple),
            to_return_exhaustive: env_usize(
                "ATHENAEUM_TO_RETURN_EXHAUSTIVE",
                defaults.to_return_exhaustive,
            ),
            default_semantic_ratio: std::env::var("ATHENAEUM_SEMANTIC_RATIO")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_semantic_ratio),
        }
    }

    /// Result count for a plan, given its strategy (§4.8 Merging).
    pub fn to_return_for(&self, is_exhaustive: bool) -> usize {
        if is_exhaustive {
            self.to_return_exhaustive
        } else {
            self.to_return_simple
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.fanout_concurrency, 5);
        assert_eq!(cfg.analyzer_batch_size, 2);
        assert_eq!(cfg.analyzer_concurrency, 10);
    }

    #[test]
    fn to_return_varies_by_strategy() {
        let cfg = PipelineConfig::default();
        assert!(cfg.to_return_for(true) > cfg.to_return_for(false));
    }
}
