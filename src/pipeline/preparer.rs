use crate::error::{RagmcpError, Result};
use unicode_normalization::UnicodeNormalization;

/// Clean a raw user query into the form fed to the embedder and the lexical
/// search arm: NFKC-normalized, control characters stripped, whitespace runs
/// collapsed to a single space, trimmed, lowercased. Fails with
/// [`RagmcpError::EmptyQuery`] if nothing is left afterwards.
pub fn prepare_query(raw: &str) -> Result<String> {
    let normalized: String = raw.nfkc().collect();

    let mut cleaned = String::with_capacity(normalized.len());
    let mut last_was_space = false;
    for ch in normalized.chars() {
        if ch.is_control() {
            continue;
        }
        if ch.is_whitespace() {
            if !last_was_space {
                cleaned.push(' ');
            }
            last_was_space = true;
        } else {
            cleaned.push(ch);
            last_was_space = false;
        }
    }

    let cleaned = cleaned.trim().to_lowercase();

    if cleaned.is_empty() {
        return Err(RagmcpError::EmptyQuery);
    }

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_and_trims() {
        let cleaned = prepare_query("  how   does\tRRF\nwork?  ").unwrap();
        assert_eq!(cleaned, "how does rrf work?");
    }

    #[test]
    fn test_empty_query_after_cleaning_is_error() {
        assert!(matches!(prepare_query(""), Err(RagmcpError::EmptyQuery)));
        assert!(matches!(prepare_query("   "), Err(RagmcpError::EmptyQuery)));
        assert!(matches!(prepare_query("\u{0001}\u{0002}"), Err(RagmcpError::EmptyQuery)));
    }

    #[test]
    fn test_nfkc_normalizes_compatibility_forms() {
        // U+FF21 FULLWIDTH LATIN CAPITAL LETTER A -> "a" after NFKC + lowercase
        let cleaned = prepare_query("\u{FF21}").unwrap();
        assert_eq!(cleaned, "a");
    }

    #[test]
    fn test_strips_control_characters() {
        let cleaned = prepare_query("hello\u{0007}world").unwrap();
        assert_eq!(cleaned, "helloworld");
    }

    #[test]
    fn test_lowercases() {
        let cleaned = prepare_query("HELLO World").unwrap();
        assert_eq!(cleaned, "hello world");
    }
}
