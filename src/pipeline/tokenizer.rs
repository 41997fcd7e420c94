/// Deterministic token counter used only for diagnostics (context size,
/// prompt size, response size in debug output). No tokenizer output ever
/// feeds back into a collaborator call.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// Fallback tokenizer: splits on whitespace. Used when no subword tokenizer
/// is configured; token counts from this are approximate by construction.
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .enumerate()
            .map(|(i, _)| i as u32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_tokenizer_counts_words() {
        let tokenizer = WhitespaceTokenizer;
        assert_eq!(tokenizer.count("one two three"), 3);
        assert_eq!(tokenizer.count(""), 0);
        assert_eq!(tokenizer.count("   "), 0);
    }

    #[test]
    fn test_whitespace_tokenizer_ignores_run_length() {
        let tokenizer = WhitespaceTokenizer;
        assert_eq!(tokenizer.count("one    two"), 2);
    }
}
