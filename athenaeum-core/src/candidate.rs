//! Candidate and Annotated Passage shapes (§3).

use serde::{Deserialize, Serialize};

/// A passage as returned by the retrieval adapter, pre-analyzer.
/// Identity is `id`; `(document_id, paragraph_index)` is unique and
/// orderable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CandidatePassage {
    pub id: String,
    pub document_id: String,
    pub paragraph_index: i32,
    pub text: String,
    pub title: String,
    pub author: String,
    pub tradition: String,
    pub collection: String,
    pub language: String,
    pub year: Option<i32>,
    /// The SubQuery text that first surfaced this id in the merge (§4.7).
    pub provenance_query: String,
}

/// Analyzer output for one candidate (§3, §4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AnnotatedPassage {
    pub candidate_id: String,
    pub document_id: String,
    pub paragraph_index: i32,
    pub title: String,
    pub author: String,
    pub tradition: String,
    pub collection: String,
    pub language: String,
    pub year: Option<i32>,
    /// Analyzer relevance score in [0, 1].
    pub score: f32,
    /// Exact substring of `text` the analyzer judged most salient.
    pub key_phrase: String,
    /// At most 3 tokens drawn from `text`.
    pub core_terms: Vec<String>,
    /// At most ~10 words.
    pub summary: String,
    pub brief_answer: Option<String>,
    pub text: String,
    /// `text` with `<mark>`/`<b>` wrapping applied; see
    /// `athenaeum_pipeline::analyzer::highlight` for derivation.
    pub highlighted_text: String,
}

impl AnnotatedPassage {
    /// The neutral-scored fallback shape used when a batch's LLM call
    /// fails outright (§4.8 Failure policy): the candidate survives
    /// un-annotated rather than being dropped.
    pub fn neutral(candidate: &CandidatePassage) -> Self {
        Self {
            candidate_id: candidate.id.clone(),
            document_id: candidate.document_id.clone(),
            paragraph_index: candidate.paragraph_index,
            title: candidate.title.clone(),
            author: candidate.author.clone(),
            tradition: candidate.tradition.clone(),
            collection: candidate.collection.clone(),
            language: candidate.language.clone(),
            year: candidate.year,
            score: 0.5,
            key_phrase: String::new(),
            core_terms: Vec::new(),
            summary: String::new(),
            brief_answer: None,
            text: candidate.text.clone(),
            highlighted_text: candidate.text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidate() -> CandidatePassage {
        CandidatePassage {
            id: "p1".into(),
            document_id: "d1".into(),
            paragraph_index: 0,
            text: "Justice is the light of the world.".into(),
            title: "Tablets".into(),
            author: "Anon".into(),
            tradition: "bahai".into(),
            collection: "writings".into(),
            language: "en".into(),
            year: Some(1890),
            provenance_query: "what is justice".into(),
        }
    }

    #[test]
    fn neutral_annotation_preserves_raw_text_as_highlighted() {
        let candidate = sample_candidate();
        let annotated = AnnotatedPassage::neutral(&candidate);
        assert_eq!(annotated.score, 0.5);
        assert_eq!(annotated.highlighted_text, candidate.text);
        assert!(annotated.key_phrase.is_empty());
    }
}
