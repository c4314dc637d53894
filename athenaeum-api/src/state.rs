//! Shared application state for Axum routers.
//!
//! The streaming route (`/search/analyze/stream`) drives the whole query
//! through a single shared [`ResponseAssembler`], which owns its own
//! quota gate, cache, planner, and fan-out executor internally. The two
//! buffered routes (`/search`, `/search/analyze`) are the degenerate
//! single-call form of the same pipeline (§C): they talk to
//! `retrieval_adapter` directly and, for `/search/analyze`, build a
//! per-request [`ParallelAnalyzer`] — neither goes through the
//! assembler's quota/cache/memory side effects.

use std::sync::Arc;
use std::time::Instant;

use athenaeum_llm::ProviderRegistry;
use athenaeum_pipeline::{AnalyzerConfig, QuotaGate, ResponseAssembler, RetrievalAdapter};

use crate::config::ApiConfig;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub registry: Arc<ProviderRegistry>,
    /// Used directly by the buffered search routes and by `/search/health`'s
    /// index probe; the streaming route reaches the index through its own
    /// copy inside `assembler`.
    pub retrieval_adapter: Arc<dyn RetrievalAdapter>,
    /// A second handle onto the same quota store `assembler` uses
    /// internally, for the streaming route's pre-flight check: §7 requires
    /// a quota denial to surface as HTTP 402 on the initial response line,
    /// which means the decision has to be made before the SSE body (and
    /// its 200 status) is committed.
    pub quota: Arc<QuotaGate>,
    /// Drives the streaming route end to end, including quota/cache/memory
    /// side effects.
    pub assembler: Arc<ResponseAssembler>,
    /// Base config the per-request analyzer `/search/analyze` builds from,
    /// with its own batch-size/concurrency (§C).
    pub analyzer_config: AnalyzerConfig,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        registry: Arc<ProviderRegistry>,
        retrieval_adapter: Arc<dyn RetrievalAdapter>,
        quota: Arc<QuotaGate>,
        assembler: Arc<ResponseAssembler>,
        analyzer_config: AnalyzerConfig,
    ) -> Self {
        Self {
            config,
            registry,
            retrieval_adapter,
            quota,
            assembler,
            analyzer_config,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
