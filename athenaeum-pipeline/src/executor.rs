//! Fan-out Executor (§4.7): runs every SubQuery in a plan concurrently
//! against the retrieval adapter and merges the results.
//!
//! Concurrency shape is grounded in a fan-out/collect orchestrator
//! pattern: an `Arc<Semaphore>` caps in-flight retrieval calls, each
//! SubQuery runs as its own `tokio::spawn`ed task over `Arc`-shared
//! immutable inputs, and results are awaited back in plan order rather
//! than completion order so the merge step stays deterministic.

use crate::retrieval::{RetrievalAdapter, RetrievalParams};
use athenaeum_core::{CandidatePassage, Plan, QueryFilters};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

pub struct FanoutExecutor {
    adapter: Arc<dyn RetrievalAdapter>,
    concurrency: usize,
    merge_hard_cap: usize,
}

impl FanoutExecutor {
    pub fn new(adapter: Arc<dyn RetrievalAdapter>, concurrency: usize, merge_hard_cap: usize) -> Self {
        Self {
            adapter,
            concurrency: concurrency.max(1),
            merge_hard_cap,
        }
    }

    /// Runs every SubQuery in `plan`, composing `caller_filters` into each
    /// one, and returns the deduplicated, plan-ordered merge (§4.7).
    pub async fn execute(&self, plan: &Plan, caller_filters: &QueryFilters, per_query_limit: i32) -> Vec<CandidatePassage> {
        let subqueries = plan.queries();
        let hits_per_query = self.run_subqueries(subqueries, caller_filters, per_query_limit).await;
        self.merge(subqueries, hits_per_query)
    }

    async fn run_subqueries(
        &self,
        subqueries: &[athenaeum_core::SubQuery],
        caller_filters: &QueryFilters,
        per_query_limit: i32,
    ) -> Vec<Vec<CandidatePassage>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(subqueries.len());

        for subquery in subqueries {
            let sem = Arc::clone(&semaphore);
            let adapter = Arc::clone(&self.adapter);
            let subquery = subquery.clone();
            let composed_filters = subquery.filters.intersect(caller_filters);

            let handle = tokio::spawn(async move {
                let _permit = match sem.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return Vec::new(),
                };

                let params = RetrievalParams::new(composed_filters, per_query_limit);
                match adapter.retrieve(subquery.mode, &subquery.text, &params).await {
                    Ok(outcome) => outcome
                        .hits
                        .into_iter()
                        .map(|mut hit| {
                            hit.provenance_query = subquery.text.clone();
                            hit
                        })
                        .collect(),
                    Err(e) => {
                        warn!(subquery = %subquery.text, error = %e, "subquery failed, degrading to empty");
                        Vec::new()
                    }
                }
            });
            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(hits) => results.push(hits),
                Err(e) => {
                    warn!(error = %e, "subquery task panicked, degrading to empty");
                    results.push(Vec::new());
                }
            }
        }
        results
    }

    /// First-occurrence-by-id merge in plan order (§4.7). `provenance_query`
    /// is already set to the SubQuery that produced each hit; since a
    /// later-surfacing duplicate of the same id is dropped, the first
    /// subquery to surface it wins, matching the contract directly.
    fn merge(&self, _subqueries: &[athenaeum_core::SubQuery], hits_per_query: Vec<Vec<CandidatePassage>>) -> Vec<CandidatePassage> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for hits in hits_per_query {
            for hit in hits {
                if seen.insert(hit.id.clone()) {
                    merged.push(hit);
                    if merged.len() >= self.merge_hard_cap {
                        return merged;
                    }
                }
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::InMemoryRetrievalAdapter;
    use athenaeum_core::{RetrievalMode, SubQuery};

    fn passage(id: &str, text: &str) -> CandidatePassage {
        CandidatePassage {
            id: id.to_string(),
            document_id: format!("doc-{id}"),
            paragraph_index: 0,
            text: text.to_string(),
            title: "T".to_string(),
            author: "A".to_string(),
            tradition: "tradition".to_string(),
            collection: "collection".to_string(),
            language: "en".to_string(),
            year: Some(1900),
            provenance_query: String::new(),
        }
    }

    fn plan_with(queries: Vec<SubQuery>) -> Plan {
        Plan::Simple {
            reasoning: "r".into(),
            queries,
            semantic_note: None,
        }
    }

    #[tokio::test]
    async fn merges_and_dedupes_preserving_plan_order() {
        let adapter = Arc::new(InMemoryRetrievalAdapter::new(vec![
            passage("1", "justice and mercy"),
            passage("2", "justice alone"),
        ]));
        let plan = plan_with(vec![
            SubQuery {
                text: "justice".into(),
                mode: RetrievalMode::Keyword,
                filters: QueryFilters::default(),
                rationale: "r".into(),
                angle: None,
            },
            SubQuery {
                text: "mercy".into(),
                mode: RetrievalMode::Keyword,
                filters: QueryFilters::default(),
                rationale: "r".into(),
                angle: None,
            },
        ]);

        let executor = FanoutExecutor::new(adapter, 5, 200);
        let merged = executor.execute(&plan, &QueryFilters::default(), 10).await;

        // "justice" surfaces both ids 1 and 2; "mercy" would surface id 1
        // again but it's already seen and must not duplicate.
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].provenance_query, "justice");
    }

    #[tokio::test]
    async fn hard_cap_truncates_merge() {
        let passages: Vec<CandidatePassage> = (0..10).map(|i| passage(&i.to_string(), "justice")).collect();
        let adapter = Arc::new(InMemoryRetrievalAdapter::new(passages));
        let plan = plan_with(vec![SubQuery::fallback("justice")]);

        let executor = FanoutExecutor::new(adapter, 5, 3);
        let merged = executor.execute(&plan, &QueryFilters::default(), 10).await;
        assert_eq!(merged.len(), 3);
    }
}
