//! Response Assembler / Stream (§4.9): drives one query end-to-end and
//! emits [`StreamEvent`]s over an `mpsc` channel in the order the
//! protocol requires. A point-to-point request stream has exactly one
//! consumer, so `mpsc` is the right shape here (contrast the teacher's
//! `broadcast`-based WebSocket event fan-out, built for many
//! subscribers of the same event).
//!
//! Cancellation is cooperative: the caller drives a
//! [`CancellationToken`] (typically tied to the client's disconnect),
//! and every in-flight await in this module races against it so a
//! dropped client doesn't leave retrieval/LLM calls running to no one.

use crate::analyzer::{AnalyzeOptions, ParallelAnalyzer};
use crate::cache::ResponseCache;
use crate::executor::FanoutExecutor;
use crate::planner::Planner;
use crate::quota::QuotaGate;
use athenaeum_core::{
    extract_text_contains, AnnotatedPassage, Identity, MemoryEntry, Plan, PipelineConfig,
    QueryFilters, QuotaDecision,
};
use athenaeum_storage::MemoryStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    Thinking { message: String, is_exhaustive: bool },
    #[serde(rename_all = "camelCase")]
    Plan {
        plan: Plan,
        two_pass: bool,
        cached: bool,
    },
    Progress { phase: String, message: String },
    Sources { sources: Vec<AnnotatedPassage> },
    Chunk { text: String },
    #[serde(rename_all = "camelCase")]
    Complete {
        timing_ms: u64,
        query_limit: QuotaDecision,
        cached: bool,
        cache_age: Option<i64>,
    },
    Error { error: String },
}

/// Byte-ish chunk size used to split a fully-buffered introduction into
/// `chunk` deltas (§4.8's own wording allows the introduction to be
/// generated as a whole rather than token-streamed).
const INTRODUCTION_CHUNK_WORDS: usize = 6;

pub struct ResponseAssembler {
    quota: QuotaGate,
    cache: ResponseCache,
    planner: Planner,
    executor: FanoutExecutor,
    analyzer: ParallelAnalyzer,
    memory: Arc<dyn MemoryStore>,
    config: PipelineConfig,
}

impl ResponseAssembler {
    pub fn new(
        quota: QuotaGate,
        cache: ResponseCache,
        planner: Planner,
        executor: FanoutExecutor,
        analyzer: ParallelAnalyzer,
        memory: Arc<dyn MemoryStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            quota,
            cache,
            planner,
            executor,
            analyzer,
            memory,
            config,
        }
    }

    /// Runs one query, sending [`StreamEvent`]s to `tx` as they become
    /// available. Returns once the stream has reached a terminal event
    /// (`complete` or `error`) or `cancel` fires.
    pub async fn run(
        &self,
        identity: Identity,
        raw_query: String,
        caller_filters: QueryFilters,
        force_exhaustive: bool,
        requested_limit: Option<i32>,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) {
        let start = Instant::now();

        let decision = match self.quota.check(&identity).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "quota check failed, denying conservatively");
                QuotaDecision::deny("quota_unavailable")
            }
        };
        if !decision.allowed {
            let reason = decision.reason.clone().unwrap_or_else(|| "query_limit_exceeded".to_string());
            let _ = tx.send(StreamEvent::Error { error: reason }).await;
            return;
        }

        let (clean_query, text_contains_terms) = extract_text_contains(&raw_query);
        let mut filters = caller_filters;
        if !text_contains_terms.is_empty() {
            filters.text_contains = text_contains_terms;
        }
        let cache_eligible = ResponseCache::eligible(filters.has_text_contains());

        if cache_eligible {
            if let Some(hit) = run_cancellable(self.cache.lookup(&clean_query), &cancel).await.flatten() {
                self.stream_cache_hit(&hit, &tx).await;
                self.finish(&identity, &decision, cache_eligible, None, None, None).await;
                return;
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        let is_exhaustive_hint =
            force_exhaustive || matches!(Planner::classify(&clean_query), crate::planner::Strategy::Exhaustive);
        if is_exhaustive_hint {
            let _ = tx
                .send(StreamEvent::Thinking {
                    message: "Searching broadly across traditions...".to_string(),
                    is_exhaustive: true,
                })
                .await;
        }

        let Some(mut plan) = run_cancellable(
            self.planner.plan(&clean_query, &filters, None, force_exhaustive),
            &cancel,
        )
        .await
        else {
            return;
        };

        let _ = tx
            .send(StreamEvent::Plan {
                plan: plan.clone(),
                two_pass: plan.is_exhaustive(),
                cached: false,
            })
            .await;

        if plan.is_exhaustive() {
            let _ = tx
                .send(StreamEvent::Progress {
                    phase: "pass1".to_string(),
                    message: "Running initial broad search...".to_string(),
                })
                .await;

            let pass1_hits = match run_cancellable(
                self.executor.execute(&plan, &filters, self.config.to_return_exhaustive as i32),
                &cancel,
            )
            .await
            {
                Some(hits) => hits,
                None => return,
            };

            let summary = summarize_by_angle(&plan, &pass1_hits);
            plan = self.planner.plan_exhaustive_pass2(&clean_query, &summary, plan).await;

            let _ = tx
                .send(StreamEvent::Progress {
                    phase: "pass2".to_string(),
                    message: "Refining with a second pass...".to_string(),
                })
                .await;
        }

        let candidates = match run_cancellable(
            self.executor.execute(&plan, &filters, self.config.to_return_exhaustive as i32),
            &cancel,
        )
        .await
        {
            Some(hits) => hits,
            None => return,
        };

        let to_return = requested_limit
            .map(|n| n.clamp(1, 50) as usize)
            .unwrap_or_else(|| self.config.to_return_for(plan.is_exhaustive()));
        let analyze_opts = AnalyzeOptions {
            research_context: plan.semantic_note(),
            to_return,
        };
        let Some(outcome) =
            run_cancellable(self.analyzer.analyze(&clean_query, &candidates, &analyze_opts), &cancel).await
        else {
            return;
        };

        let introduction = match plan.semantic_note() {
            Some(note) if !note.is_empty() => format!("{} {note}", outcome.introduction),
            _ => outcome.introduction.clone(),
        };

        let _ = tx
            .send(StreamEvent::Sources {
                sources: outcome.results.clone(),
            })
            .await;

        for chunk in chunk_introduction(&introduction) {
            if cancel.is_cancelled() {
                return;
            }
            let _ = tx.send(StreamEvent::Chunk { text: chunk }).await;
        }

        self.finish(
            &identity,
            &decision,
            cache_eligible,
            Some((&clean_query, &plan, &outcome.results, &introduction)),
            Some(&raw_query),
            Some(&introduction),
        )
        .await;

        let _ = tx
            .send(StreamEvent::Complete {
                timing_ms: start.elapsed().as_millis() as u64,
                query_limit: decision,
                cached: false,
                cache_age: None,
            })
            .await;
    }

    async fn stream_cache_hit(&self, hit: &athenaeum_core::CachedResponse, tx: &mpsc::Sender<StreamEvent>) {
        let _ = tx
            .send(StreamEvent::Plan {
                plan: hit.plan.clone(),
                two_pass: hit.plan.is_exhaustive(),
                cached: true,
            })
            .await;
        let _ = tx
            .send(StreamEvent::Sources {
                sources: hit.sources.clone(),
            })
            .await;
        let _ = tx
            .send(StreamEvent::Chunk {
                text: hit.introduction.clone(),
            })
            .await;
        let age = hit.age(chrono::Utc::now());
        let _ = tx
            .send(StreamEvent::Complete {
                timing_ms: 0,
                query_limit: QuotaDecision::unbounded(),
                cached: true,
                cache_age: Some(age.num_seconds()),
            })
            .await;
    }

    /// Completion side-effects, in order (§4.9): quota increment → cache
    /// write (if eligible) → memory append. Never blocks stream closure;
    /// failures are logged and swallowed.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        identity: &Identity,
        _decision: &QuotaDecision,
        cache_eligible: bool,
        cache_payload: Option<(&str, &Plan, &[AnnotatedPassage], &str)>,
        raw_query: Option<&str>,
        introduction: Option<&str>,
    ) {
        if let Err(e) = self.quota.record_completion(identity).await {
            warn!(error = %e, "quota increment failed");
        }

        if cache_eligible {
            if let Some((clean_query, plan, sources, introduction)) = cache_payload {
                self.cache
                    .store(clean_query, plan.clone(), sources.to_vec(), introduction.to_string())
                    .await;
            }
        }

        if let (Some(raw_query), Some(introduction)) = (raw_query, introduction) {
            let key = identity.counter_key();
            if let Err(e) = self.memory.append(&MemoryEntry::user_turn(&key, raw_query)).await {
                warn!(error = %e, "memory append (user turn) failed");
            }
            if let Err(e) = self.memory.append(&MemoryEntry::assistant_turn(&key, introduction)).await {
                warn!(error = %e, "memory append (assistant turn) failed");
            }
        }
    }
}

/// Races `fut` against cancellation, returning `None` if `cancel` fires
/// first (§5).
async fn run_cancellable<F, T>(fut: F, cancel: &CancellationToken) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = fut => Some(result),
    }
}

fn chunk_introduction(introduction: &str) -> Vec<String> {
    let words: Vec<&str> = introduction.split_whitespace().collect();
    if words.is_empty() {
        return vec![];
    }
    words
        .chunks(INTRODUCTION_CHUNK_WORDS)
        .map(|chunk| chunk.join(" "))
        .collect()
}

fn summarize_by_angle(plan: &Plan, hits: &[athenaeum_core::CandidatePassage]) -> Vec<athenaeum_core::AngleSummary> {
    let mut summaries = Vec::new();
    for subquery in plan.queries() {
        let angle = subquery.angle.clone().unwrap_or_else(|| subquery.text.clone());
        let matching: Vec<&athenaeum_core::CandidatePassage> = hits
            .iter()
            .filter(|h| h.provenance_query == subquery.text)
            .collect();
        summaries.push(athenaeum_core::AngleSummary {
            angle,
            hit_count: matching.len(),
            sample_titles: matching.iter().take(3).map(|h| h.title.clone()).collect(),
        });
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_introduction_splits_by_word_count() {
        let intro = "one two three four five six seven eight nine";
        let chunks = chunk_introduction(intro);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "one two three four five six");
        assert_eq!(chunks[1], "seven eight nine");
    }

    #[test]
    fn empty_introduction_yields_no_chunks() {
        assert!(chunk_introduction("").is_empty());
    }

    #[tokio::test]
    async fn cancellation_short_circuits_run_cancellable() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_cancellable(async { 42 }, &cancel).await;
        assert!(result.is_none());
    }
}
