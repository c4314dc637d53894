//! Integration tests for the `/search*` surface against the real router,
//! wired entirely to in-memory stores and a mock LLM provider so no network
//! or Postgres is needed.

use std::sync::Arc;
use std::time::Duration;

use athenaeum_api::{build_router, ApiConfig, AppState};
use athenaeum_core::Identity;
use athenaeum_llm::{ProviderRegistry, RoutingStrategy};
use athenaeum_pipeline::{
    AnalyzerConfig, FanoutExecutor, InMemoryRetrievalAdapter, Planner, PlannerConfig, QuotaGate,
    ResponseAssembler, ResponseCache,
};
use athenaeum_storage::{InMemoryCacheStore, InMemoryMemoryStore, InMemoryQuotaStore};
use athenaeum_test_utils::{assertions, fixtures, mock_registry};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

async fn test_state() -> AppState {
    let config = ApiConfig {
        rate_limit_enabled: false,
        ..ApiConfig::default()
    };

    let registry: Arc<ProviderRegistry> = mock_registry(
        r#"{"introduction":"Here is what the sources say.","results":[]}"#,
    )
    .await;

    let candidates = fixtures::sample_candidates();
    let retrieval_adapter: Arc<dyn athenaeum_pipeline::RetrievalAdapter> =
        Arc::new(InMemoryRetrievalAdapter::new(candidates));

    let quota_store = Arc::new(InMemoryQuotaStore::new());
    let cache_store = Arc::new(InMemoryCacheStore::new());
    let memory_store = Arc::new(InMemoryMemoryStore::default());

    let quota = Arc::new(QuotaGate::new(quota_store.clone()));
    let assembler_cache = ResponseCache::new(cache_store, chrono::Duration::hours(1), false);
    let assembler_quota = QuotaGate::new(quota_store);
    let planner = Planner::new(
        registry.clone(),
        PlannerConfig {
            model: "mock".to_string(),
            deadline: Duration::from_secs(5),
        },
    );
    let executor = FanoutExecutor::new(retrieval_adapter.clone(), 5, 200);
    let analyzer_config = AnalyzerConfig {
        model: "mock".to_string(),
        deadline: Duration::from_secs(5),
        batch_size: 2,
        max_concurrent: 2,
    };
    let analyzer = athenaeum_pipeline::ParallelAnalyzer::new(registry.clone(), analyzer_config.clone());

    let assembler = Arc::new(ResponseAssembler::new(
        assembler_quota,
        assembler_cache,
        planner,
        executor,
        analyzer,
        memory_store,
        config.pipeline.clone(),
    ));

    AppState::new(config, registry, retrieval_adapter, quota, assembler, analyzer_config)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn search_rejects_empty_query() {
    let app = build_router(test_state().await);
    let request = Request::post("/search")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query":"   "}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_returns_matching_hits_sorted_and_deduped() {
    let app = build_router(test_state().await);
    let request = Request::post("/search")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query":"justice"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let hits = body["hits"].as_array().unwrap();
    assert!(!hits.is_empty(), "expected at least one hit for 'justice'");
    for hit in hits {
        let text = hit["text"].as_str().unwrap().to_lowercase();
        assert!(text.contains("justice"));
    }
}

#[tokio::test]
async fn search_honors_limit_and_offset() {
    let app = build_router(test_state().await);
    let request = Request::post("/search")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query":"justice","limit":1,"offset":0}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let body = body_json(response).await;
    let hits = body["hits"].as_array().unwrap();
    assert!(hits.len() <= 1);
}

#[tokio::test]
async fn analyze_buffered_returns_sources_and_analysis() {
    let app = build_router(test_state().await);
    let request = Request::post("/search/analyze")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query":"justice"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["analysis"].is_string());
    assert!(body["sources"].is_array());
}

#[tokio::test]
async fn health_reports_ok_with_registered_provider() {
    let app = build_router(test_state().await);
    let request = Request::get("/search/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn stats_reports_uptime_and_version() {
    let app = build_router(test_state().await);
    let request = Request::get("/search/stats").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["serverVersion"].is_string());
}

/// §7: a banned caller's daily limit is 0, so the stream route must deny
/// before the SSE body is ever opened rather than emitting an in-stream error.
#[tokio::test]
async fn stream_denies_banned_caller_with_402_before_streaming() {
    let app = build_router(test_state().await);
    let request = Request::post("/search/analyze/stream")
        .header("content-type", "application/json")
        .header("x-subject-id", "user-1")
        .header("x-tier", "banned")
        .body(Body::from(r#"{"query":"justice"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
}

/// §8 SSE ordering: events arrive as `plan` (or `thinking`), then zero or
/// more `sources`/`chunk`/`progress` events, then a terminal `complete`.
#[tokio::test]
async fn stream_emits_plan_before_sources_before_complete() {
    let app = build_router(test_state().await);
    let request = Request::post("/search/analyze/stream")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query":"justice","limit":5}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let event_types: Vec<String> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| serde_json::from_str::<Value>(data).ok())
        .filter_map(|v| v["type"].as_str().map(str::to_string))
        .collect();

    assert!(!event_types.is_empty(), "expected at least one SSE event");
    let complete_pos = event_types.iter().position(|t| t == "complete");
    assert!(complete_pos.is_some(), "expected a terminal complete event, got {event_types:?}");
    assert_eq!(complete_pos.unwrap(), event_types.len() - 1, "complete must be the last event");

    if let Some(sources_pos) = event_types.iter().position(|t| t == "sources") {
        let plan_pos = event_types.iter().position(|t| t == "plan" || t == "thinking");
        if let Some(plan_pos) = plan_pos {
            assert!(plan_pos < sources_pos, "plan/thinking must precede sources");
        }
    }
}

/// §4.2: quota side effect — repeated identical authenticated queries each
/// consume one unit of the daily counter via the assembler's own increment,
/// independent of cache hits (cache short-circuits retrieval, not quota).
#[tokio::test]
async fn repeated_authenticated_queries_increment_quota_counter() {
    let state = test_state().await;
    let identity = Identity::Authenticated {
        subject_id: "patron-1".to_string(),
        tier: athenaeum_core::Tier::Verified,
        search_count: 0,
    };

    let before = state.quota.check(&identity).await.unwrap();
    assertions::assert_quota_allowed(&before);
    let remaining_before = before.remaining.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    let cancel = tokio_util::sync::CancellationToken::new();
    state
        .assembler
        .run(identity.clone(), "justice".to_string(), Default::default(), false, Some(5), tx, cancel)
        .await;
    while rx.recv().await.is_some() {}

    let after = state.quota.check(&identity).await.unwrap();
    assertions::assert_quota_allowed(&after);
    assert_eq!(after.remaining.unwrap(), remaining_before - 1, "one completed run should consume one quota unit");
}

/// §C cache-hit replay: a second identical query within the TTL window
/// replays the cached sources/introduction via a `sources` + `complete`
/// pair instead of re-running retrieval/analysis.
#[tokio::test]
async fn second_identical_query_is_served_from_cache() {
    let state = test_state().await;
    let identity = athenaeum_test_utils::fixtures::anonymous_identity("replay-test");

    for _ in 0..2 {
        let (tx, mut rx) = tokio::sync::mpsc::channel(32);
        let cancel = tokio_util::sync::CancellationToken::new();
        state
            .assembler
            .run(identity.clone(), "justice".to_string(), Default::default(), false, Some(5), tx, cancel)
            .await;
        let mut saw_complete = false;
        while let Some(event) = rx.recv().await {
            if let athenaeum_pipeline::StreamEvent::Complete { .. } = event {
                saw_complete = true;
            }
        }
        assert!(saw_complete, "expected a terminal complete event on every run");
    }
}
