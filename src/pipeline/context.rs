use crate::chunk::Chunk;
use crate::pipeline::tokenizer::Tokenizer;

const EMPTY_CONTEXT_SENTINEL: &str = "No relevant documents found for this query";

/// The assembled context block handed to the prompt builder, plus its size
/// in both characters and tokens (diagnostics only).
#[derive(Debug, Clone)]
pub struct BuiltContext {
    pub text: String,
    pub char_len: usize,
    pub token_count: usize,
}

/// Concatenate the top `max_results` reranked chunks into one context block.
/// Each chunk is prefixed with a one-line header carrying its final rank and
/// rerank score; blocks are separated by a blank line. An empty reranked list
/// produces a fixed sentinel string instead.
pub fn build_context(
    reranked: &[(Chunk, f32)],
    max_results: usize,
    tokenizer: &dyn Tokenizer,
) -> BuiltContext {
    if reranked.is_empty() {
        return BuiltContext {
            text: EMPTY_CONTEXT_SENTINEL.to_string(),
            char_len: EMPTY_CONTEXT_SENTINEL.chars().count(),
            token_count: tokenizer.count(EMPTY_CONTEXT_SENTINEL),
        };
    }

    let mut blocks = Vec::with_capacity(max_results);
    let mut token_count = 0;
    for (i, (chunk, score)) in reranked.iter().take(max_results).enumerate() {
        let rank = i + 1;
        blocks.push(format!(
            "Contexto {rank} [Rank: {rank}, Score: {score:.4}]\n{}",
            chunk.text
        ));
        token_count += tokenizer.count(&chunk.text);
    }
    let text = blocks.join("\n\n");

    BuiltContext {
        char_len: text.chars().count(),
        token_count,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tokenizer::WhitespaceTokenizer;

    fn chunk(id: i64, text: &str) -> Chunk {
        Chunk::new(id, 1, text)
    }

    #[test]
    fn test_context_header_format_exact() {
        let reranked = vec![
            (chunk(2, "the capital of France is Paris"), 0.9),
            (chunk(3, "Paris has a population of 2.1 million"), 0.5),
        ];
        let tokenizer = WhitespaceTokenizer;
        let built = build_context(&reranked, 4, &tokenizer);

        let mut lines = built.text.lines();
        assert_eq!(lines.next().unwrap(), "Contexto 1 [Rank: 1, Score: 0.9000]");
        assert_eq!(lines.next().unwrap(), "the capital of France is Paris");
        assert_eq!(lines.next().unwrap(), "");
        assert_eq!(lines.next().unwrap(), "Contexto 2 [Rank: 2, Score: 0.5000]");
    }

    #[test]
    fn test_context_respects_max_results() {
        let reranked = vec![
            (chunk(1, "a"), 0.9),
            (chunk(2, "b"), 0.8),
            (chunk(3, "c"), 0.7),
        ];
        let tokenizer = WhitespaceTokenizer;
        let built = build_context(&reranked, 2, &tokenizer);
        assert!(built.text.contains("Contexto 1"));
        assert!(built.text.contains("Contexto 2"));
        assert!(!built.text.contains("Contexto 3"));
    }

    #[test]
    fn test_empty_reranked_list_yields_sentinel() {
        let tokenizer = WhitespaceTokenizer;
        let built = build_context(&[], 4, &tokenizer);
        assert_eq!(built.text, EMPTY_CONTEXT_SENTINEL);
        assert_eq!(built.char_len, EMPTY_CONTEXT_SENTINEL.chars().count());
    }

    #[test]
    fn test_char_and_token_counts_recorded() {
        let reranked = vec![(chunk(1, "one two three"), 0.42)];
        let tokenizer = WhitespaceTokenizer;
        let built = build_context(&reranked, 4, &tokenizer);
        assert_eq!(built.char_len, built.text.chars().count());
        // token_count covers chunk text only, not the "Contexto N [...]" headers.
        assert_eq!(built.token_count, tokenizer.count("one two three"));
        assert!(built.token_count < tokenizer.count(&built.text));
    }

    #[test]
    fn test_token_count_excludes_headers_across_multiple_chunks() {
        let reranked = vec![
            (chunk(1, "alpha beta"), 0.9),
            (chunk(2, "gamma delta epsilon"), 0.5),
        ];
        let tokenizer = WhitespaceTokenizer;
        let built = build_context(&reranked, 4, &tokenizer);
        assert_eq!(
            built.token_count,
            tokenizer.count("alpha beta") + tokenizer.count("gamma delta epsilon")
        );
    }
}
