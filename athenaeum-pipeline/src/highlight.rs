//! Highlight derivation (§4.8, §9): locates `key_phrase` inside a
//! passage's raw text and wraps the match, then wraps `core_terms`
//! within that span. Runs entirely on the server — the LLM only
//! supplies `key_phrase`/`core_terms`, never the markup.
//!
//! Matching is whitespace-insensitive: build a parallel array mapping
//! normalized character positions back to original byte offsets, search
//! the normalized view, then reproject the match span onto the original
//! text. This tolerates the LLM echoing a phrase with different
//! line-wrapping or spacing than the source paragraph.

/// Wraps the first occurrence of `key_phrase` in `text` with
/// `<mark>...</mark>`, and each occurrence of a `core_terms` entry
/// inside that span with `<b>...</b>`. Falls back to a first-5-words
/// prefix of `key_phrase` if the full phrase doesn't match, and fails
/// open (returns `text` unchanged) if neither matches.
pub fn wrap_highlight(text: &str, key_phrase: &str, core_terms: &[String]) -> String {
    if key_phrase.trim().is_empty() {
        return text.to_string();
    }

    let span = locate(text, key_phrase).or_else(|| locate(text, &first_n_words(key_phrase, 5)));

    let Some((start, end)) = span else {
        return text.to_string();
    };

    let (start, end) = extend_trailing_punctuation(text, start, end);

    let before = &text[..start];
    let matched = &text[start..end];
    let after = &text[end..];

    format!(
        "{before}<mark>{}</mark>{after}",
        wrap_core_terms(matched, core_terms)
    )
}

fn first_n_words(phrase: &str, n: usize) -> String {
    phrase.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

/// Normalized, whitespace-insensitive scan for `phrase` within `text`.
/// Returns the matching byte span in `text`, if any.
fn locate(text: &str, phrase: &str) -> Option<(usize, usize)> {
    if phrase.trim().is_empty() {
        return None;
    }

    let (normalized, offsets) = normalize_with_offsets(text);
    let normalized_phrase = normalize_with_offsets(phrase).0;
    if normalized_phrase.is_empty() {
        return None;
    }

    let start_in_normalized = normalized.find(&normalized_phrase)?;
    let end_in_normalized = start_in_normalized + normalized_phrase.len();

    // offsets maps each normalized *char* index to an original byte offset;
    // convert the byte-based find() result into a char index first.
    let start_char = normalized[..start_in_normalized].chars().count();
    let end_char = normalized[..end_in_normalized].chars().count();

    let start_byte = *offsets.get(start_char)?;
    let end_byte = if end_char < offsets.len() {
        offsets[end_char]
    } else {
        text.len()
    };
    Some((start_byte, end_byte))
}

/// Lowercases and collapses whitespace runs to a single space, tracking
/// the original byte offset each output character came from. The
/// returned offsets vector has one entry per output char, plus a final
/// sentinel equal to `text.len()`.
fn normalize_with_offsets(text: &str) -> (String, Vec<usize>) {
    let mut normalized = String::with_capacity(text.len());
    let mut offsets = Vec::with_capacity(text.len());
    let mut prev_was_space = false;

    for (byte_idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if !prev_was_space && !normalized.is_empty() {
                normalized.push(' ');
                offsets.push(byte_idx);
            }
            prev_was_space = true;
            continue;
        }
        prev_was_space = false;
        for lower_ch in ch.to_lowercase() {
            normalized.push(lower_ch);
            offsets.push(byte_idx);
        }
    }

    // Trim a trailing collapsed space introduced by trailing whitespace.
    if normalized.ends_with(' ') {
        normalized.pop();
        offsets.pop();
    }

    offsets.push(text.len());
    (normalized, offsets)
}

/// Extends `end` to swallow immediately-following punctuation so a mark
/// doesn't end mid-clause (§9 "trailing punctuation extension").
fn extend_trailing_punctuation(text: &str, start: usize, end: usize) -> (usize, usize) {
    let mut end = end;
    for ch in text[end..].chars() {
        if matches!(ch, '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\'' | ')') {
            end += ch.len_utf8();
        } else {
            break;
        }
    }
    (start, end)
}

fn wrap_core_terms(span: &str, core_terms: &[String]) -> String {
    let mut result = span.to_string();
    for term in core_terms {
        if term.trim().is_empty() {
            continue;
        }
        if let Some(pos) = result.to_lowercase().find(&term.to_lowercase()) {
            let matched = &result[pos..pos + term.len()];
            let wrapped = format!("<b>{matched}</b>");
            result.replace_range(pos..pos + term.len(), &wrapped);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_phrase_match_wraps_span() {
        let text = "Justice is the light of the world.";
        let out = wrap_highlight(text, "light of the world", &[]);
        assert_eq!(out, "Justice is the <mark>light of the world.</mark>");
    }

    #[test]
    fn whitespace_insensitive_match() {
        let text = "Justice   is the\nlight of the world.";
        let out = wrap_highlight(text, "light of the world", &[]);
        assert!(out.contains("<mark>light of the world.</mark>"));
    }

    #[test]
    fn core_terms_wrapped_inside_span() {
        let text = "Justice is the light of the world.";
        let out = wrap_highlight(text, "light of the world", &["light".to_string()]);
        assert!(out.contains("<b>light</b>"));
    }

    #[test]
    fn falls_back_to_five_word_prefix() {
        let text = "Justice is the light of the world and nothing else matters";
        let out = wrap_highlight(text, "light of the world and something the LLM added", &[]);
        assert!(out.contains("<mark>light of the world and</mark>"));
    }

    #[test]
    fn fails_open_when_nothing_matches() {
        let text = "Justice is the light of the world.";
        let out = wrap_highlight(text, "completely unrelated phrase entirely", &[]);
        assert_eq!(out, text);
    }

    #[test]
    fn empty_key_phrase_returns_raw_text() {
        let text = "Justice is the light of the world.";
        assert_eq!(wrap_highlight(text, "", &[]), text);
    }
}
