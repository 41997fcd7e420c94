use crate::generator::ChatMessage;
use crate::pipeline::tokenizer::Tokenizer;

/// A two-role prompt ready for the generator, plus its total token count.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub messages: Vec<ChatMessage>,
    pub token_count: usize,
}

/// Build the prompt sent to the generator. The user turn always carries the
/// *original* raw query, not the cleaned one used for retrieval, so the
/// model sees exactly what the caller typed.
pub fn build_prompt(
    system_prompt: &str,
    context: &str,
    original_query: &str,
    tokenizer: &dyn Tokenizer,
) -> BuiltPrompt {
    let user_content = format!("Contexto:\n{context}\n\nPergunta: {original_query}");

    let token_count =
        tokenizer.count(system_prompt) + tokenizer.count(&user_content);

    BuiltPrompt {
        messages: vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_content),
        ],
        token_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tokenizer::WhitespaceTokenizer;

    #[test]
    fn test_user_message_template_exact() {
        let tokenizer = WhitespaceTokenizer;
        let built = build_prompt("be helpful", "some context", "What is Rust?", &tokenizer);
        assert_eq!(built.messages[0].role, "system");
        assert_eq!(built.messages[0].content, "be helpful");
        assert_eq!(built.messages[1].role, "user");
        assert_eq!(
            built.messages[1].content,
            "Contexto:\nsome context\n\nPergunta: What is Rust?"
        );
    }

    #[test]
    fn test_original_query_not_cleaned_query() {
        let tokenizer = WhitespaceTokenizer;
        let original = "  What IS Rust??  ";
        let built = build_prompt("sys", "ctx", original, &tokenizer);
        assert!(built.messages[1].content.contains(original));
    }

    #[test]
    fn test_token_count_is_sum_of_both_messages() {
        let tokenizer = WhitespaceTokenizer;
        let built = build_prompt("a b c", "d e", "f", &tokenizer);
        assert_eq!(built.token_count, 3 + tokenizer.count("Contexto:\nd e\n\nPergunta: f"));
    }
}
