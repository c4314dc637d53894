//! Athenaeum API server entry point.
//!
//! Bootstraps tracing, the provider registry, the Postgres-backed stores,
//! and the query-time pipeline, then serves the `/search*` surface until
//! a shutdown signal arrives.

use std::sync::Arc;

use athenaeum_api::{build_router, init_tracing, ApiConfig, ApiResult, AppState, TelemetryConfig};
use athenaeum_llm::{CombinedProviderAdapter, OpenAIChatProvider, OpenAIEmbeddingProvider, ProviderRegistry, RoutingStrategy};
use athenaeum_pipeline::{
    AnalyzerConfig, FanoutExecutor, InMemoryRetrievalAdapter, Planner, PlannerConfig, QuotaGate, ResponseAssembler,
    ResponseCache,
};
use athenaeum_storage::{build_pool, PgCacheStore, PgMemoryStore, PgQuotaStore};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let config = ApiConfig::from_env();

    let pool = build_pool(&config.db)?;
    let cache_store = Arc::new(PgCacheStore::new(pool.clone()));
    let quota_store = Arc::new(PgQuotaStore::new(pool.clone()));
    let memory_store = Arc::new(PgMemoryStore::new(pool.clone()));

    let registry = Arc::new(ProviderRegistry::new(RoutingStrategy::First));
    register_openai(&registry).await;

    // Retrieval adapter: the in-process keyword/structured-filter index.
    // A real deployment backs this with whatever full-text/vector store
    // holds the corpus; wiring that store is outside this surface's
    // concern (§1 Non-goals — this crate consumes the index, it doesn't
    // build it).
    let retrieval_adapter: Arc<dyn athenaeum_pipeline::RetrievalAdapter> = Arc::new(InMemoryRetrievalAdapter::new(Vec::new()));

    let cache_ttl = chrono::Duration::from_std(config.pipeline.cache_ttl).unwrap_or(chrono::Duration::hours(6));
    let quota = Arc::new(QuotaGate::new(quota_store.clone()));

    let assembler_cache = ResponseCache::new(cache_store.clone(), cache_ttl, config.pipeline.dev_mode);
    let assembler_quota = QuotaGate::new(quota_store.clone());
    let planner = Planner::new(
        registry.clone(),
        PlannerConfig {
            model: "gpt-4o-mini".to_string(),
            deadline: config.pipeline.llm_call_deadline,
        },
    );
    let executor = FanoutExecutor::new(
        retrieval_adapter.clone(),
        config.pipeline.fanout_concurrency,
        config.pipeline.merge_hard_cap,
    );
    let analyzer_config = AnalyzerConfig {
        model: "gpt-4o-mini".to_string(),
        deadline: config.pipeline.llm_call_deadline,
        batch_size: config.pipeline.analyzer_batch_size,
        max_concurrent: config.pipeline.analyzer_concurrency,
    };
    let analyzer = athenaeum_pipeline::ParallelAnalyzer::new(registry.clone(), analyzer_config.clone());

    let assembler = Arc::new(ResponseAssembler::new(
        assembler_quota,
        assembler_cache,
        planner,
        executor,
        analyzer,
        memory_store.clone(),
        config.pipeline.clone(),
    ));

    let background_cache = Arc::new(ResponseCache::new(cache_store, cache_ttl, config.pipeline.dev_mode));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_interval = config.cache_sweep_interval;
    let sweep_handle = tokio::spawn(athenaeum_api::jobs::cache_sweep_task(background_cache, sweep_interval, shutdown_rx));

    let state = AppState::new(config.clone(), registry, retrieval_adapter, quota, assembler, analyzer_config);
    let app = build_router(state);

    let addr = format!("{}:{}", config.bind_host, config.bind_port);
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| athenaeum_api::ApiError::internal_error(format!("invalid bind address {addr}: {e}")))?;

    tracing::info!(%socket_addr, "starting athenaeum-api");
    let listener = tokio::net::TcpListener::bind(socket_addr)
        .await
        .map_err(|e| athenaeum_api::ApiError::internal_error(format!("failed to bind {socket_addr}: {e}")))?;

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>());
    tokio::select! {
        result = server => {
            result.map_err(|e| athenaeum_api::ApiError::internal_error(format!("server error: {e}")))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = sweep_handle.await;

    Ok(())
}

/// Registers an OpenAI-backed provider when `OPENAI_API_KEY` is set. With
/// no key configured the registry starts empty — the planner/analyzer
/// degrade to their fallback paths (§4.6, §4.8) and `/search/health`
/// reports the LLM adapter unhealthy rather than the process failing to
/// start.
async fn register_openai(registry: &ProviderRegistry) {
    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        let chat = OpenAIChatProvider::new(api_key.clone());
        let embedding = OpenAIEmbeddingProvider::with_default_model(api_key);
        registry
            .register(Arc::new(CombinedProviderAdapter::both("openai", chat, embedding)))
            .await;
    }
}
