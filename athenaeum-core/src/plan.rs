//! Plan and SubQuery shapes produced by the planner (§3 Plan, §4.6, §9).

use crate::filter::QueryFilters;
use crate::query::RetrievalMode;
use serde::{Deserialize, Serialize};

/// One concrete retrieval call contributed by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SubQuery {
    pub text: String,
    pub mode: RetrievalMode,
    #[serde(default)]
    pub filters: QueryFilters,
    pub rationale: String,
    /// Which distinct facet of the query this SubQuery targets, e.g.
    /// "historical", "comparative" (§4.6 pass 1's "angles").
    pub angle: Option<String>,
}

impl SubQuery {
    pub fn fallback(clean_query: impl Into<String>) -> Self {
        Self {
            text: clean_query.into(),
            mode: RetrievalMode::Hybrid,
            filters: QueryFilters::default(),
            rationale: "fallback".to_string(),
            angle: None,
        }
    }
}

/// A single LLM-produced batch of SubQueries, as run by one pass of the
/// planner (§4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SubPlan {
    pub queries: Vec<SubQuery>,
    /// Per-angle result counts and sample titles, summarized for pass 2
    /// (§4.6 pass 1 → pass 2 handoff). Empty until the executor runs.
    #[serde(default)]
    pub result_summary: Vec<AngleSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AngleSummary {
    pub angle: String,
    pub hit_count: usize,
    pub sample_titles: Vec<String>,
}

/// The planner's output (§3, §9: implemented as a tagged sum type rather
/// than a `strategy` string with conditional fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum Plan {
    Simple {
        reasoning: String,
        queries: Vec<SubQuery>,
        semantic_note: Option<String>,
    },
    Exhaustive {
        reasoning: String,
        pass1: SubPlan,
        pass2: SubPlan,
        /// Union of all SubQueries actually executed, across both passes.
        queries: Vec<SubQuery>,
        assumptions: Vec<String>,
        traditions_to_cover: Vec<String>,
        follow_up_hints: Vec<String>,
        semantic_note: Option<String>,
    },
}

impl Plan {
    /// All SubQueries this plan will have the executor run, in order.
    /// Never empty — see §8 Plan totality.
    pub fn queries(&self) -> &[SubQuery] {
        match self {
            Plan::Simple { queries, .. } => queries,
            Plan::Exhaustive { queries, .. } => queries,
        }
    }

    pub fn is_exhaustive(&self) -> bool {
        matches!(self, Plan::Exhaustive { .. })
    }

    pub fn semantic_note(&self) -> Option<&str> {
        match self {
            Plan::Simple { semantic_note, .. } => semantic_note.as_deref(),
            Plan::Exhaustive { semantic_note, .. } => semantic_note.as_deref(),
        }
    }

    /// The single-SubQuery hybrid fallback plan used whenever planning
    /// itself cannot be completed (§4.6 Failure policy).
    pub fn fallback(clean_query: impl Into<String>) -> Self {
        let text = clean_query.into();
        Plan::Simple {
            reasoning: "planner unavailable; executing raw query".to_string(),
            queries: vec![SubQuery::fallback(text)],
            semantic_note: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_plan_has_one_subquery() {
        let plan = Plan::fallback("what is justice");
        assert_eq!(plan.queries().len(), 1);
        assert_eq!(plan.queries()[0].mode, RetrievalMode::Hybrid);
        assert!(!plan.is_exhaustive());
    }

    #[test]
    fn every_plan_variant_is_non_empty() {
        let exhaustive = Plan::Exhaustive {
            reasoning: "r".into(),
            pass1: SubPlan {
                queries: vec![SubQuery::fallback("a")],
                result_summary: vec![],
            },
            pass2: SubPlan {
                queries: vec![SubQuery::fallback("b")],
                result_summary: vec![],
            },
            queries: vec![SubQuery::fallback("a"), SubQuery::fallback("b")],
            assumptions: vec![],
            traditions_to_cover: vec![],
            follow_up_hints: vec![],
            semantic_note: None,
        };
        assert_eq!(exhaustive.queries().len(), 2);
        assert!(exhaustive.is_exhaustive());
    }
}
