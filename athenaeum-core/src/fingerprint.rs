//! Query normalization and fingerprinting (§4.1, §8 Normalization).

use sha2::{Digest, Sha256};

/// Lowercase, collapse internal whitespace to a single space, trim.
pub fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 of the normalized text, hex-encoded. Used as the cache key.
pub fn fingerprint(text: &str) -> String {
    let normalized = normalize(text);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn differs_only_in_case_and_whitespace_collapses() {
        assert_eq!(
            fingerprint("What   Is Justice"),
            fingerprint("what is justice")
        );
        assert_eq!(fingerprint("  Justice  "), fingerprint("justice"));
    }

    proptest! {
        #[test]
        fn normalization_is_case_and_whitespace_insensitive(
            words in proptest::collection::vec("[a-zA-Z]{1,10}", 1..8),
            gaps in proptest::collection::vec(1usize..4, 1..8),
        ) {
            let spaced: String = words
                .iter()
                .zip(gaps.iter().cycle())
                .map(|(w, g)| format!("{}{}", w, " ".repeat(*g)))
                .collect::<String>();
            let lower = words.join(" ").to_lowercase();
            let upper: String = words
                .iter()
                .map(|w| w.to_uppercase())
                .collect::<Vec<_>>()
                .join("   ");
            prop_assert_eq!(fingerprint(&spaced), fingerprint(&lower));
            prop_assert_eq!(fingerprint(&upper), fingerprint(&lower));
        }
    }
}
