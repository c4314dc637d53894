//! Token-budget-aware prompt assembly.
//!
//! Builds the bounded text blocks spliced into planner/analyzer prompts —
//! memory snippets, a batch of candidate passages, a pass-1 result
//! summary — trimming lower-priority sections first when the assembled
//! text would exceed the configured token budget.

use athenaeum_core::{AngleSummary, CandidatePassage, MemoryEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CONTEXT PACKAGE
// ============================================================================

/// All candidate inputs for one prompt assembly, before budget trimming.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextPackage {
    /// The clean query text, always included and never truncated.
    pub query: Option<String>,
    /// Prior turns retrieved for this identity (§4.6: "memory should only
    /// influence planning, never retrieval semantics directly").
    pub memory: Vec<MemoryEntry>,
    /// Candidate passages for one analyzer batch.
    pub candidates: Vec<CandidatePassage>,
    /// Per-angle result counts from pass 1, shown to pass 2 (§4.6).
    pub pass1_summary: Vec<AngleSummary>,
}

impl ContextPackage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_memory(mut self, memory: Vec<MemoryEntry>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<CandidatePassage>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_pass1_summary(mut self, summary: Vec<AngleSummary>) -> Self {
        self.pass1_summary = summary;
        self
    }
}

// ============================================================================
// CONTEXT WINDOW AND SECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionType {
    Query,
    Memory,
    Candidates,
    Pass1Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    pub section_id: Uuid,
    pub section_type: SectionType,
    pub content: String,
    pub token_count: i32,
    pub priority: i32,
    pub compressible: bool,
}

impl ContextSection {
    pub fn new(section_type: SectionType, content: String, priority: i32) -> Self {
        let token_count = estimate_tokens(&content);
        Self {
            section_id: Uuid::now_v7(),
            section_type,
            content,
            token_count,
            priority,
            compressible: true,
        }
    }

    pub fn with_compressible(mut self, compressible: bool) -> Self {
        self.compressible = compressible;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssemblyAction {
    Include,
    Exclude,
    Truncate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyDecision {
    pub timestamp: DateTime<Utc>,
    pub action: AssemblyAction,
    pub section_type: SectionType,
    pub section_id: Uuid,
    pub reason: String,
    pub tokens_affected: i32,
}

/// An assembled prompt fragment, built up to a token budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub window_id: Uuid,
    pub assembled_at: DateTime<Utc>,
    pub max_tokens: i32,
    pub used_tokens: i32,
    pub sections: Vec<ContextSection>,
    pub truncated: bool,
    pub assembly_trace: Vec<AssemblyDecision>,
}

impl ContextWindow {
    pub fn new(max_tokens: i32) -> Self {
        Self {
            window_id: Uuid::now_v7(),
            assembled_at: Utc::now(),
            max_tokens,
            used_tokens: 0,
            sections: Vec::new(),
            truncated: false,
            assembly_trace: Vec::new(),
        }
    }

    pub fn remaining_tokens(&self) -> i32 {
        self.max_tokens - self.used_tokens
    }

    pub fn add_section(&mut self, section: ContextSection) -> bool {
        if section.token_count <= self.remaining_tokens() {
            self.used_tokens += section.token_count;
            self.assembly_trace.push(AssemblyDecision {
                timestamp: Utc::now(),
                action: AssemblyAction::Include,
                section_type: section.section_type,
                section_id: section.section_id,
                reason: "fits within budget".to_string(),
                tokens_affected: section.token_count,
            });
            self.sections.push(section);
            true
        } else {
            self.assembly_trace.push(AssemblyDecision {
                timestamp: Utc::now(),
                action: AssemblyAction::Exclude,
                section_type: section.section_type,
                section_id: section.section_id,
                reason: format!(
                    "exceeds budget: needs {} tokens, {} available",
                    section.token_count,
                    self.remaining_tokens()
                ),
                tokens_affected: 0,
            });
            false
        }
    }

    pub fn add_truncated_section(&mut self, mut section: ContextSection) {
        let available = self.remaining_tokens();
        if available <= 0 {
            self.assembly_trace.push(AssemblyDecision {
                timestamp: Utc::now(),
                action: AssemblyAction::Exclude,
                section_type: section.section_type,
                section_id: section.section_id,
                reason: "no budget remaining".to_string(),
                tokens_affected: 0,
            });
            return;
        }

        let original_tokens = section.token_count;
        section.content = truncate_to_token_budget(&section.content, available);
        section.token_count = estimate_tokens(&section.content);

        self.used_tokens += section.token_count;
        self.truncated = true;
        self.assembly_trace.push(AssemblyDecision {
            timestamp: Utc::now(),
            action: AssemblyAction::Truncate,
            section_type: section.section_type,
            section_id: section.section_id,
            reason: format!("truncated from {} to {} tokens", original_tokens, section.token_count),
            tokens_affected: section.token_count,
        });
        self.sections.push(section);
    }

    pub fn as_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl std::fmt::Display for ContextWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

// ============================================================================
// TOKEN UTILITIES
// ============================================================================

/// Rough estimate: ~0.75 tokens per character (English).
pub fn estimate_tokens(text: &str) -> i32 {
    if text.is_empty() {
        return 0;
    }
    (text.len() as f32 * 0.75).ceil() as i32
}

/// Truncate text to fit within a token budget, preferring sentence
/// boundaries, falling back to word boundaries.
pub fn truncate_to_token_budget(text: &str, budget: i32) -> String {
    if budget <= 0 {
        return String::new();
    }

    let max_chars = (budget as f32 / 0.75).floor() as usize;

    if text.len() <= max_chars {
        return text.to_string();
    }

    let truncated = safe_truncate(text, max_chars);

    let last_sentence = [truncated.rfind('.'), truncated.rfind('?'), truncated.rfind('!')]
        .into_iter()
        .flatten()
        .max();

    if let Some(pos) = last_sentence {
        if pos > max_chars / 2 {
            return truncated[..=pos].to_string();
        }
    }

    if let Some(pos) = truncated.rfind(' ') {
        if pos > max_chars * 4 / 5 {
            return truncated[..pos].to_string();
        }
    }

    truncated.to_string()
}

fn safe_truncate(s: &str, max_chars: usize) -> &str {
    if s.len() <= max_chars {
        return s;
    }
    let mut end = max_chars;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================================
// CONTEXT ASSEMBLER
// ============================================================================

#[derive(Debug, Clone)]
pub struct SectionPriorities {
    pub query: i32,
    pub memory: i32,
    pub candidates: i32,
    pub pass1_summary: i32,
}

impl Default for SectionPriorities {
    fn default() -> Self {
        Self {
            query: 100,
            candidates: 90,
            pass1_summary: 70,
            memory: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub token_budget: i32,
    pub priorities: SectionPriorities,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: 6000,
            priorities: SectionPriorities::default(),
        }
    }
}

/// Builds a [`ContextWindow`] from a [`ContextPackage`], adding sections
/// in priority order until the configured token budget is exhausted.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn assemble(&self, pkg: ContextPackage) -> ContextWindow {
        let mut window = ContextWindow::new(self.config.token_budget);

        let mut sections = self.build_sections(&pkg);
        sections.sort_by(|a, b| b.priority.cmp(&a.priority));

        for section in sections {
            if window.remaining_tokens() <= 0 {
                window.assembly_trace.push(AssemblyDecision {
                    timestamp: Utc::now(),
                    action: AssemblyAction::Exclude,
                    section_type: section.section_type,
                    section_id: section.section_id,
                    reason: "budget exhausted".to_string(),
                    tokens_affected: 0,
                });
                continue;
            }

            if section.token_count <= window.remaining_tokens() {
                window.add_section(section);
            } else if section.compressible {
                window.add_truncated_section(section);
            } else {
                window.assembly_trace.push(AssemblyDecision {
                    timestamp: Utc::now(),
                    action: AssemblyAction::Exclude,
                    section_type: section.section_type,
                    section_id: section.section_id,
                    reason: format!("exceeds budget ({} tokens) and not compressible", section.token_count),
                    tokens_affected: 0,
                });
            }
        }

        window
    }

    fn build_sections(&self, pkg: &ContextPackage) -> Vec<ContextSection> {
        let mut sections = Vec::new();

        if let Some(ref query) = pkg.query {
            let section = ContextSection::new(SectionType::Query, query.clone(), self.config.priorities.query)
                .with_compressible(false);
            sections.push(section);
        }

        if !pkg.candidates.is_empty() {
            let content = self.format_candidates(&pkg.candidates);
            sections.push(ContextSection::new(
                SectionType::Candidates,
                content,
                self.config.priorities.candidates,
            ));
        }

        if !pkg.pass1_summary.is_empty() {
            let content = self.format_pass1_summary(&pkg.pass1_summary);
            sections.push(ContextSection::new(
                SectionType::Pass1Summary,
                content,
                self.config.priorities.pass1_summary,
            ));
        }

        if !pkg.memory.is_empty() {
            let content = self.format_memory(&pkg.memory);
            sections.push(ContextSection::new(
                SectionType::Memory,
                content,
                self.config.priorities.memory,
            ));
        }

        sections
    }

    fn format_candidates(&self, candidates: &[CandidatePassage]) -> String {
        candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {} — {}\n{}", i, c.title, c.author, c.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn format_pass1_summary(&self, summaries: &[AngleSummary]) -> String {
        summaries
            .iter()
            .map(|s| {
                format!(
                    "angle \"{}\": {} hits (e.g. {})",
                    s.angle,
                    s.hit_count,
                    s.sample_titles.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_memory(&self, memory: &[MemoryEntry]) -> String {
        memory
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn token_budget(&self) -> i32 {
        self.config.token_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athenaeum_core::MemoryEntry;

    #[test]
    fn estimate_tokens_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_tokens_scales_with_length() {
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text), 75);
    }

    #[test]
    fn truncate_zero_budget_is_empty() {
        assert_eq!(truncate_to_token_budget("hello world", 0), "");
    }

    #[test]
    fn truncate_prefers_sentence_boundary() {
        let text = "First sentence. Second sentence. Third sentence.";
        let result = truncate_to_token_budget(text, 15);
        assert!(result.ends_with('.'));
    }

    #[test]
    fn assembler_respects_budget_with_candidates_and_memory() {
        let assembler = ContextAssembler::new(ContextConfig {
            token_budget: 40,
            priorities: SectionPriorities::default(),
        });

        let pkg = ContextPackage::new()
            .with_query("what is justice")
            .with_memory(vec![MemoryEntry::user_turn("user_abc", "earlier question about mercy")]);

        let window = assembler.assemble(pkg);
        assert!(window.used_tokens <= window.max_tokens);
        assert!(window.sections.iter().any(|s| s.section_type == SectionType::Query));
    }

    #[test]
    fn assembler_includes_query_section_uncompressed() {
        let assembler = ContextAssembler::new(ContextConfig::default());
        let pkg = ContextPackage::new().with_query("what is justice");
        let window = assembler.assemble(pkg);
        assert_eq!(window.sections[0].content, "what is justice");
        assert!(!window.sections[0].compressible);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_truncation_respects_budget(text in ".{0,1000}", budget in 1i32..500) {
            let truncated = truncate_to_token_budget(&text, budget);
            prop_assert!(estimate_tokens(&truncated) <= budget);
        }

        #[test]
        fn prop_zero_or_negative_budget_is_empty(text in ".*", budget in i32::MIN..=0) {
            prop_assert_eq!(truncate_to_token_budget(&text, budget), "");
        }

        #[test]
        fn prop_assembly_respects_token_budget(
            token_budget in 1i32..10000,
            query in ".*",
        ) {
            let assembler = ContextAssembler::new(ContextConfig {
                token_budget,
                priorities: SectionPriorities::default(),
            });
            let pkg = ContextPackage::new().with_query(query);
            let window = assembler.assemble(pkg);
            prop_assert!(window.used_tokens <= window.max_tokens);
        }
    }
}
