use crate::error::{RagmcpError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One turn of a chat-style prompt. `role` is one of `system`, `user`, or
/// (for conversation history) `assistant`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The final, slowest collaborator in the pipeline: turns a grounded prompt
/// into an answer. Deterministic output is not required.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        history: Option<Vec<ChatMessage>>,
        max_tokens: Option<usize>,
        temperature: Option<f32>,
    ) -> Result<String>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

/// Maximum retry attempts for a transient (429/5xx) generator API failure.
const MAX_RETRIES: usize = 3;

/// HTTP chat-completion client. Same retry-with-backoff treatment as the
/// embeddings client for 429/5xx responses.
pub struct HttpGenerator {
    client: Client,
    api_key: String,
    model: String,
}

impl HttpGenerator {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            model,
        }
    }

    async fn generate_internal(
        &self,
        mut messages: Vec<ChatMessage>,
        history: Option<Vec<ChatMessage>>,
        max_tokens: Option<usize>,
        temperature: Option<f32>,
    ) -> Result<String> {
        if let Some(history) = history {
            // History slots in between system and user turns: it belongs
            // before the current question, not after it.
            let user_turn = messages.pop();
            messages.extend(history);
            if let Some(turn) = user_turn {
                messages.push(turn);
            }
        }

        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self
                .generate_once(&messages, max_tokens, temperature)
                .await
            {
                Ok(answer) => return Ok(answer),
                Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                    log::warn!(
                        "Generator retry {}/{} after error: {}",
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn generate_once(
        &self,
        messages: &[ChatMessage],
        max_tokens: Option<usize>,
        temperature: Option<f32>,
    ) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages: messages.to_vec(),
            max_tokens,
            temperature,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| RagmcpError::GenerationError(format!("network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(RagmcpError::GenerationError(format!(
                "generator API error {status}: {body}"
            )));
        }

        let mut parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| RagmcpError::GenerationError(format!("failed to parse response: {e}")))?;

        if parsed.choices.is_empty() {
            return Err(RagmcpError::GenerationError(
                "empty response from generator API".to_string(),
            ));
        }

        Ok(parsed.choices.remove(0).message.content)
    }
}

/// True for transient errors worth retrying (429 rate limit or 5xx server error).
fn is_retryable(e: &RagmcpError) -> bool {
    let msg = e.to_string();
    msg.contains("429")
        || msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("504")
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        history: Option<Vec<ChatMessage>>,
        max_tokens: Option<usize>,
        temperature: Option<f32>,
    ) -> Result<String> {
        self.generate_internal(messages, history, max_tokens, temperature)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("be terse");
        assert_eq!(sys.role, "system");
        let user = ChatMessage::user("hello");
        assert_eq!(user.role, "user");
    }

    #[test]
    fn test_http_generator_new() {
        let generator = HttpGenerator::new(
            "test-key".to_string(),
            "gpt-4o-mini".to_string(),
            Duration::from_secs(30),
        );
        assert_eq!(generator.model, "gpt-4o-mini");
    }
}
