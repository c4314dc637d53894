//! Planner (§4.6): turns one clean query into a [`Plan`].
//!
//! Classification is a deterministic heuristic, never delegated to the
//! LLM alone — the LLM's own plan shape (how many SubQueries, across how
//! many angles) can still push a borderline query toward `Exhaustive`,
//! but the keyword/length gate decides which prompt is sent in the
//! first place.

use athenaeum_context::ContextWindow;
use athenaeum_core::{AngleSummary, Plan, QueryFilters, RetrievalMode, SubPlan, SubQuery};
use athenaeum_llm::{ChatMessage, ChatOptions, ProviderRegistry};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const EXHAUSTIVE_KEYWORDS: &[&str] = &[
    "all",
    "every",
    "compare across",
    "comprehensive",
    "across traditions",
    "every tradition",
];

/// Above this many characters, a query is treated as exhaustive even
/// without a trigger keyword (§4.6).
const EXHAUSTIVE_LENGTH_THRESHOLD: usize = 160;

pub struct PlannerConfig {
    pub model: String,
    pub deadline: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            deadline: Duration::from_secs(20),
        }
    }
}

pub struct Planner {
    registry: Arc<ProviderRegistry>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(registry: Arc<ProviderRegistry>, config: PlannerConfig) -> Self {
        Self { registry, config }
    }

    /// §4.6 Classification heuristic.
    pub fn classify(query: &str) -> Strategy {
        let lower = query.to_lowercase();
        if EXHAUSTIVE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return Strategy::Exhaustive;
        }
        if query.len() > EXHAUSTIVE_LENGTH_THRESHOLD {
            return Strategy::Exhaustive;
        }
        Strategy::Simple
    }

    /// Builds a plan for `clean_query`. Never fails — any planner-side
    /// error degrades to [`Plan::fallback`] (§4.6 Failure policy).
    ///
    /// `force_exhaustive` lets a caller (the streaming route's
    /// `useResearcher` request flag) opt into the exhaustive strategy
    /// regardless of what [`Self::classify`] would have picked; it never
    /// downgrades an exhaustive classification back to simple.
    pub async fn plan(
        &self,
        clean_query: &str,
        filters: &QueryFilters,
        context: Option<&ContextWindow>,
        force_exhaustive: bool,
    ) -> Plan {
        let strategy = if force_exhaustive {
            Strategy::Exhaustive
        } else {
            Self::classify(clean_query)
        };
        match strategy {
            Strategy::Simple => self.plan_simple(clean_query, filters, context).await,
            Strategy::Exhaustive => self.plan_exhaustive_pass1(clean_query, filters, context).await,
        }
    }

    async fn call_planner_llm(&self, system: &str, user: &str) -> Option<String> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let opts = ChatOptions {
            model: self.config.model.clone(),
            temperature: Some(0.2),
            max_tokens: 900,
        };
        match self.registry.chat(&messages, &opts, self.config.deadline).await {
            Ok(response) => Some(response.content),
            Err(e) => {
                warn!(error = %e, "planner LLM call failed");
                None
            }
        }
    }

    async fn plan_simple(
        &self,
        clean_query: &str,
        filters: &QueryFilters,
        context: Option<&ContextWindow>,
    ) -> Plan {
        let system = system_prompt(false);
        let user = simple_user_prompt(clean_query, filters, context);

        let Some(raw) = self.call_planner_llm(&system, &user).await else {
            return Plan::fallback(clean_query);
        };

        match parse_llm_plan(&raw) {
            Some(parsed) if !parsed.queries.is_empty() => Plan::Simple {
                reasoning: parsed.reasoning.unwrap_or_default(),
                queries: parsed
                    .queries
                    .into_iter()
                    .take(3)
                    .map(RawSubQuery::into_subquery)
                    .collect(),
                semantic_note: parsed.semantic_note,
            },
            _ => Plan::fallback(clean_query),
        }
    }

    async fn plan_exhaustive_pass1(
        &self,
        clean_query: &str,
        filters: &QueryFilters,
        context: Option<&ContextWindow>,
    ) -> Plan {
        let system = system_prompt(true);
        let user = simple_user_prompt(clean_query, filters, context);

        let Some(raw) = self.call_planner_llm(&system, &user).await else {
            return Plan::fallback(clean_query);
        };

        let Some(parsed) = parse_llm_plan(&raw) else {
            return Plan::fallback(clean_query);
        };
        if parsed.queries.is_empty() {
            return Plan::fallback(clean_query);
        }

        let queries: Vec<SubQuery> = parsed
            .queries
            .into_iter()
            .take(5)
            .map(RawSubQuery::into_subquery)
            .collect();

        Plan::Exhaustive {
            reasoning: parsed.reasoning.unwrap_or_default(),
            pass1: SubPlan {
                queries: queries.clone(),
                result_summary: vec![],
            },
            pass2: SubPlan {
                queries: vec![],
                result_summary: vec![],
            },
            queries,
            assumptions: vec![],
            traditions_to_cover: vec![],
            follow_up_hints: vec![],
            semantic_note: parsed.semantic_note,
        }
    }

    /// Pass 2 (§4.6): shown the pass-1 result summary, refines the plan.
    /// Called by the executor/orchestration layer once pass 1's hits are
    /// known. On failure, pass 2 is simply empty — pass 1's queries still
    /// stand as the final plan.
    pub async fn plan_exhaustive_pass2(
        &self,
        clean_query: &str,
        pass1_summary: &[AngleSummary],
        mut exhaustive: Plan,
    ) -> Plan {
        let Plan::Exhaustive {
            ref mut pass1,
            ref mut pass2,
            ref mut queries,
            ..
        } = exhaustive
        else {
            return exhaustive;
        };
        pass1.result_summary = pass1_summary.to_vec();

        let system = system_prompt_pass2();
        let user = pass2_user_prompt(clean_query, pass1_summary);

        let Some(raw) = self.call_planner_llm(&system, &user).await else {
            return exhaustive;
        };
        let Some(parsed) = parse_llm_plan(&raw) else {
            return exhaustive;
        };

        let refined: Vec<SubQuery> = parsed
            .queries
            .into_iter()
            .take(5)
            .map(RawSubQuery::into_subquery)
            .collect();
        if refined.is_empty() {
            return exhaustive;
        }

        pass2.queries = refined.clone();
        queries.extend(refined);
        exhaustive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Simple,
    Exhaustive,
}

fn system_prompt(exhaustive: bool) -> String {
    let mode = if exhaustive {
        "This query calls for exhaustive, cross-tradition coverage. Propose up to 5 SubQueries across distinct angles."
    } else {
        "Propose 1 to 3 SubQueries."
    };
    format!(
        "You are a research planner for a multi-tradition scholarly text search \
         service. {mode} Each SubQuery has a search mode (keyword, semantic, or \
         hybrid) and a one-sentence rationale. If the query term carries multiple \
         distinct senses across traditions, set semantic_note to a short phrase \
         naming them. Respond with JSON only: \
         {{\"reasoning\": string, \"queries\": [{{\"text\": string, \"mode\": \
         \"keyword\"|\"semantic\"|\"hybrid\", \"rationale\": string, \"angle\": \
         string|null}}], \"semantic_note\": string|null}}"
    )
}

fn system_prompt_pass2() -> String {
    "You are refining a research plan given what pass 1 retrieved. Identify \
     gaps and promising directions, then propose up to 5 refined SubQueries. \
     Respond with JSON only: {\"reasoning\": string, \"gaps\": [string], \
     \"promising_directions\": [string], \"queries\": [{\"text\": string, \
     \"mode\": \"keyword\"|\"semantic\"|\"hybrid\", \"rationale\": string, \
     \"angle\": string|null}]}"
        .to_string()
}

fn simple_user_prompt(clean_query: &str, filters: &QueryFilters, context: Option<&ContextWindow>) -> String {
    let mut prompt = format!("Query: {clean_query}\n");
    if !filters.is_empty() {
        prompt.push_str(&format!("Caller filters: {filters:?}\n"));
    }
    if let Some(ctx) = context {
        prompt.push_str("Context:\n");
        prompt.push_str(&ctx.as_text());
    }
    prompt
}

fn pass2_user_prompt(clean_query: &str, pass1_summary: &[AngleSummary]) -> String {
    let mut prompt = format!("Original query: {clean_query}\nPass 1 results by angle:\n");
    for angle in pass1_summary {
        prompt.push_str(&format!(
            "- {} ({} hits): {}\n",
            angle.angle,
            angle.hit_count,
            angle.sample_titles.join(", ")
        ));
    }
    prompt
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    reasoning: Option<String>,
    queries: Vec<RawSubQuery>,
    semantic_note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSubQuery {
    text: String,
    mode: RawMode,
    rationale: Option<String>,
    angle: Option<String>,
}

impl RawSubQuery {
    fn into_subquery(self) -> SubQuery {
        SubQuery {
            text: self.text,
            mode: self.mode.into(),
            filters: QueryFilters::default(),
            rationale: self.rationale.unwrap_or_else(|| "unspecified".to_string()),
            angle: self.angle,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl From<RawMode> for RetrievalMode {
    fn from(mode: RawMode) -> Self {
        match mode {
            RawMode::Keyword => RetrievalMode::Keyword,
            RawMode::Semantic => RetrievalMode::Semantic,
            RawMode::Hybrid => RetrievalMode::Hybrid,
        }
    }
}

/// Accepted fields are validated; unknown fields are ignored; malformed
/// JSON returns `None` (§4.6).
fn parse_llm_plan(raw: &str) -> Option<RawPlan> {
    let trimmed = raw.trim();
    let json_slice = extract_json_object(trimmed).unwrap_or(trimmed);
    serde_json::from_str(json_slice).ok()
}

/// LLMs occasionally wrap JSON in prose or a code fence; take the
/// outermost `{...}` span if present.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustive_keyword_triggers_exhaustive_strategy() {
        assert_eq!(
            Planner::classify("compare across all traditions on justice"),
            Strategy::Exhaustive
        );
    }

    #[test]
    fn short_plain_query_is_simple() {
        assert_eq!(Planner::classify("what is justice"), Strategy::Simple);
    }

    #[test]
    fn long_query_is_exhaustive_by_length() {
        let query = "what is justice ".repeat(12);
        assert_eq!(Planner::classify(&query), Strategy::Exhaustive);
    }

    #[test]
    fn malformed_json_plan_parses_to_none() {
        assert!(parse_llm_plan("not json at all").is_none());
    }

    #[test]
    fn json_wrapped_in_prose_still_parses() {
        let raw = "Sure, here is the plan:\n```json\n{\"reasoning\":\"r\",\"queries\":[{\"text\":\"q\",\"mode\":\"hybrid\",\"rationale\":\"x\",\"angle\":null}],\"semantic_note\":null}\n```";
        let parsed = parse_llm_plan(raw).unwrap();
        assert_eq!(parsed.queries.len(), 1);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let raw = r#"{"reasoning":"r","queries":[{"text":"q","mode":"keyword","rationale":"x","angle":null,"extra_field":123}],"semantic_note":null,"also_unknown":true}"#;
        let parsed = parse_llm_plan(raw).unwrap();
        assert_eq!(parsed.queries[0].text, "q");
    }
}
