use crate::chunk::Chunk;
use crate::error::{RagmcpError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reorders a fused candidate list by query relevance using a cross-encoder
/// model. Rerank scores are raw model output, not normalized, and supersede
/// the fused RRF scores for the final ordering.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, chunks: &[Chunk]) -> Result<Vec<(Chunk, f32)>>;
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Maximum retry attempts for a transient (429/5xx) reranker API failure.
const MAX_RETRIES: usize = 3;

/// HTTP cross-encoder reranker client, styled after the embeddings client:
/// same retry-with-backoff treatment for 429/5xx responses.
pub struct HttpReranker {
    client: Client,
    api_key: String,
    model: String,
}

impl HttpReranker {
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

    async fn rerank_internal(&self, query: &str, chunks: &[Chunk]) -> Result<Vec<(Chunk, f32)>> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.rerank_once(query, chunks).await {
                Ok(scored) => return Ok(scored),
                Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                    log::warn!(
                        "Reranker retry {}/{} after error: {}",
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

    async fn rerank_once(&self, query: &str, chunks: &[Chunk]) -> Result<Vec<(Chunk, f32)>> {
        let documents: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
        };

        let response = self
            .client
            .post("https://api.cohere.ai/v1/rerank")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| RagmcpError::RerankerError(format!("network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(RagmcpError::RerankerError(format!(
                "reranker API error {status}: {body}"
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RagmcpError::RerankerError(format!("failed to parse response: {e}")))?;

        let mut scored: Vec<(Chunk, f32)> = parsed
            .results
            .into_iter()
            .filter_map(|r| chunks.get(r.index).cloned().map(|c| (c, r.relevance_score)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        Ok(scored)
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
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, chunks: &[Chunk]) -> Result<Vec<(Chunk, f32)>> {
        self.rerank_internal(query, chunks).await
    }
}
