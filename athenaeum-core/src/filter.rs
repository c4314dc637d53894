//! Structured query filters (§3 Query Request, §4.3 Retrieval Adapter).

use serde::{Deserialize, Serialize};

/// Structured filters a caller may attach to a query, composed by
/// intersection with any filters a SubQuery adds on top (§3 Plan invariant).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueryFilters {
    pub tradition: Option<String>,
    pub collection: Option<String>,
    pub language: Option<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub document_id: Option<String>,
    /// Free-text terms extracted from a trailing parenthetical in the raw
    /// query (§3). When non-empty, the query is not cache-eligible (§4.1).
    #[serde(default)]
    pub text_contains: Vec<String>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.tradition.is_none()
            && self.collection.is_none()
            && self.language.is_none()
            && self.year_min.is_none()
            && self.year_max.is_none()
            && self.document_id.is_none()
            && self.text_contains.is_empty()
    }

    /// Whether this filter set carries text-contains terms that exclude
    /// the query from the cache (§4.1, §8 Cache exclusivity).
    pub fn has_text_contains(&self) -> bool {
        !self.text_contains.is_empty()
    }

    /// Intersect with filters contributed by a SubQuery: structured fields
    /// on `other` win where present, text-contains terms are unioned.
    pub fn intersect(&self, other: &QueryFilters) -> QueryFilters {
        QueryFilters {
            tradition: other.tradition.clone().or_else(|| self.tradition.clone()),
            collection: other.collection.clone().or_else(|| self.collection.clone()),
            language: other.language.clone().or_else(|| self.language.clone()),
            year_min: other.year_min.or(self.year_min),
            year_max: other.year_max.or(self.year_max),
            document_id: other.document_id.clone().or_else(|| self.document_id.clone()),
            text_contains: {
                let mut merged = self.text_contains.clone();
                for t in &other.text_contains {
                    if !merged.contains(t) {
                        merged.push(t.clone());
                    }
                }
                merged
            },
        }
    }
}

/// Extracts a trailing parenthetical of comma-separated terms from raw
/// query text into `text_contains` filter terms, returning the cleaned
/// query text alongside (§3, scenario 3).
///
/// Only a parenthetical that is the final, unbroken suffix of the trimmed
/// text is recognized; a parenthetical elsewhere in the text is left alone.
pub fn extract_text_contains(raw: &str) -> (String, Vec<String>) {
    let trimmed = raw.trim();
    if let Some(stripped) = trimmed.strip_suffix(')') {
        if let Some(open) = stripped.rfind('(') {
            let inner = &stripped[open + 1..];
            let clean = stripped[..open].trim_end().to_string();
            let terms: Vec<String> = inner
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if !terms.is_empty() && !clean.is_empty() {
                return (clean, terms);
            }
        }
    }
    (trimmed.to_string(), Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trailing_parenthetical() {
        let (clean, terms) = extract_text_contains("what is justice (shoghi, pilgrim)");
        assert_eq!(clean, "what is justice");
        assert_eq!(terms, vec!["shoghi".to_string(), "pilgrim".to_string()]);
    }

    #[test]
    fn leaves_query_without_parenthetical_untouched() {
        let (clean, terms) = extract_text_contains("what is justice");
        assert_eq!(clean, "what is justice");
        assert!(terms.is_empty());
    }

    #[test]
    fn ignores_empty_parenthetical() {
        let (clean, terms) = extract_text_contains("what is justice ()");
        assert_eq!(clean, "what is justice ()");
        assert!(terms.is_empty());
    }

    #[test]
    fn intersect_prefers_other_structured_fields() {
        let base = QueryFilters {
            tradition: Some("bahai".into()),
            ..Default::default()
        };
        let sub = QueryFilters {
            collection: Some("writings".into()),
            ..Default::default()
        };
        let merged = base.intersect(&sub);
        assert_eq!(merged.tradition, Some("bahai".into()));
        assert_eq!(merged.collection, Some("writings".into()));
    }
}
