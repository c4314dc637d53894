//! `POST /search/analyze/stream` (§6, §4.9, §8 SSE ordering).
//!
//! Drives [`ResponseAssembler::run`] and relays its `StreamEvent`s as SSE.
//! Quota denial is checked once up front so it can surface as HTTP 402 on
//! the initial response line (§7) — `run` would otherwise only be able to
//! report it as an in-stream `error` event after the 200 status line has
//! already gone out. Cancellation ties to the SSE body itself: the
//! `async_stream::stream!` generator holds a `CancellationToken` drop
//! guard, so a client disconnect (which drops the response body before
//! it's exhausted) cancels the in-flight `run` the same way the teacher's
//! WebSocket handlers tie a subscriber's lifetime to its connection.

use athenaeum_core::{QueryFilters, QuotaDecision};
use athenaeum_pipeline::StreamEvent;
use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::auth::resolve_identity;
use crate::error::ApiError;
use crate::state::AppState;

/// `mode` is accepted in the request body per §6's external contract but
/// not read here: unlike `/search`'s direct retrieval call, the streaming
/// route's mode is always the LLM planner's own per-SubQuery choice, and
/// serde ignores unrecognized fields by default, so a client sending one
/// doesn't get rejected.
#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
struct StreamRequestBody {
    query: String,
    #[serde(default)]
    limit: Option<i32>,
    #[serde(default, rename = "useResearcher")]
    use_researcher: bool,
}

fn event_for(stream_event: &StreamEvent) -> Event {
    match serde_json::to_string(stream_event) {
        Ok(json) => Event::default().data(json),
        Err(e) => Event::default().data(format!(r#"{{"type":"error","error":"{e}"}}"#)),
    }
}

fn single_error_event(reason: &str) -> Event {
    Event::default().data(
        serde_json::to_string(&StreamEvent::Error {
            error: reason.to_string(),
        })
        .unwrap_or_else(|_| format!(r#"{{"type":"error","error":"{reason}"}}"#)),
    )
}

async fn analyze_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StreamRequestBody>,
) -> axum::response::Response {
    if body.query.trim().is_empty() {
        return ApiError::missing_field("query").into_response();
    }

    let identity = resolve_identity(&headers);

    // Pre-flight quota check so denial can surface as HTTP 402 (§7)
    // instead of a 200 followed by an in-stream error.
    let decision = match state.quota.check(&identity).await {
        Ok(decision) => decision,
        Err(_) => QuotaDecision::deny("quota_unavailable"),
    };
    if !decision.allowed {
        let reason = decision.reason.unwrap_or_else(|| "query_limit_exceeded".to_string());
        let body = Sse::new(stream::once(async move {
            Ok::<Event, Infallible>(single_error_event(&reason))
        }));
        return (axum::http::StatusCode::PAYMENT_REQUIRED, body).into_response();
    }

    let requested_limit = body.limit.map(|n| n.clamp(1, 50));
    let filters = QueryFilters::default();

    let (tx, rx) = mpsc::channel::<StreamEvent>(32);
    let cancel = CancellationToken::new();
    let cancel_for_task = cancel.clone();

    let assembler = state.assembler.clone();
    let raw_query = body.query;
    let use_researcher = body.use_researcher;
    tokio::spawn(async move {
        assembler
            .run(
                identity,
                raw_query,
                filters,
                use_researcher,
                requested_limit,
                tx,
                cancel_for_task,
            )
            .await;
    });

    let body_stream = sse_stream(rx, cancel);
    Sse::new(body_stream).keep_alive(KeepAlive::default()).into_response()
}

fn sse_stream(
    mut rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let _drop_guard = cancel.drop_guard();
        while let Some(event) = rx.recv().await {
            yield Ok(event_for(&event));
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/search/analyze/stream", post(analyze_stream))
}
