//! `POST /search` and `POST /search/analyze` (§6).
//!
//! Both are the degenerate single-call form of the fan-out + parallel
//! analyzer pipeline (§C): one retrieval call built directly from the
//! request (no LLM-driven planning across multiple angles — that's
//! reserved for the streaming route's `Planner`), run through the same
//! [`RetrievalAdapter`] the fan-out executor itself calls per SubQuery.
//! `/search/analyze` additionally builds a per-request
//! [`ParallelAnalyzer`] with `batch_size = hits.len()` and
//! `max_concurrent = 1` so the whole candidate list scores in one LLM
//! call instead of the streaming route's multi-batch fan-out.

use std::time::Instant;

use athenaeum_core::{extract_text_contains, AnnotatedPassage, CandidatePassage, QueryFilters, RetrievalMode};
use athenaeum_pipeline::{AnalyzeOptions, AnalyzerConfig, ParallelAnalyzer, RetrievalAdapter, RetrievalParams};
use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
struct SearchRequestBody {
    query: String,
    limit: Option<i32>,
    offset: Option<i32>,
    mode: Option<RetrievalMode>,
    #[serde(rename = "semanticRatio")]
    semantic_ratio: Option<f32>,
    filters: Option<QueryFilters>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
struct SearchResponse {
    hits: Vec<CandidatePassage>,
    mode: RetrievalMode,
    filters: QueryFilters,
    #[serde(rename = "processingTimeMs")]
    processing_time_ms: u64,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
struct AnalyzeRequestBody {
    query: String,
    limit: Option<i32>,
    mode: Option<RetrievalMode>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
struct AnalyzeResponse {
    analysis: String,
    sources: Vec<AnnotatedPassage>,
    query: String,
    model: String,
    #[serde(rename = "processingTimeMs")]
    processing_time_ms: u64,
}

/// `POST /search`: raw ranked hits, no LLM analysis.
async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchRequestBody>,
) -> ApiResult<impl IntoResponse> {
    if body.query.trim().is_empty() {
        return Err(ApiError::missing_field("query"));
    }
    let start = Instant::now();

    let (clean_query, text_contains) = extract_text_contains(&body.query);
    let mut filters = body.filters.unwrap_or_default();
    if !text_contains.is_empty() {
        filters.text_contains = text_contains;
    }
    let mode = body.mode.unwrap_or_default();
    let limit = body.limit.unwrap_or(10).clamp(1, 50);
    let offset = body.offset.unwrap_or(0).max(0) as usize;

    let mut params = RetrievalParams::new(filters.clone(), limit + offset as i32);
    if let Some(ratio) = body.semantic_ratio {
        params = params.with_semantic_ratio(ratio.clamp(0.0, 1.0));
    }
    let outcome = state
        .retrieval_adapter
        .retrieve(mode, &clean_query, &params)
        .await?;
    let mut hits = outcome.hits;
    if offset > 0 {
        hits = hits.into_iter().skip(offset).collect();
    }
    hits.truncate(limit as usize);

    Ok(Json(SearchResponse {
        hits,
        mode,
        filters,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// `POST /search/analyze`: buffered analyzer over a single retrieval call.
async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequestBody>,
) -> ApiResult<impl IntoResponse> {
    if body.query.trim().is_empty() {
        return Err(ApiError::missing_field("query"));
    }
    let start = Instant::now();

    let (clean_query, text_contains) = extract_text_contains(&body.query);
    let mut filters = QueryFilters::default();
    if !text_contains.is_empty() {
        filters.text_contains = text_contains;
    }
    let mode = body.mode.unwrap_or_default();
    let limit = body.limit.unwrap_or(10).clamp(1, 50);

    let params = RetrievalParams::new(filters, limit);
    let outcome = state
        .retrieval_adapter
        .retrieve(mode, &clean_query, &params)
        .await?;
    let hits = outcome.hits;

    let analyzer = ParallelAnalyzer::new(
        state.registry.clone(),
        AnalyzerConfig {
            model: state.analyzer_config.model.clone(),
            deadline: state.analyzer_config.deadline,
            batch_size: hits.len().max(1),
            max_concurrent: 1,
        },
    );
    let outcome = analyzer
        .analyze(
            &clean_query,
            &hits,
            &AnalyzeOptions {
                research_context: None,
                to_return: limit as usize,
            },
        )
        .await;

    Ok(Json(AnalyzeResponse {
        analysis: outcome.introduction,
        sources: outcome.results,
        query: clean_query,
        model: state.analyzer_config.model.clone(),
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", post(search))
        .route("/search/analyze", post(analyze))
}
