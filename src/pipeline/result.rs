use serde::Serialize;
use std::collections::HashMap;

/// Per-chunk detail included in the debug payload: everything needed to
/// audit why a chunk ended up where it did in the final context.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkDetail {
    pub id: i64,
    pub document_id: i64,
    pub page_number: Option<i64>,
    pub position: Option<i64>,
    pub text: String,
    pub final_rank: usize,
    pub rerank_score: Option<f32>,
    pub rrf_score: Option<f32>,
}

/// Diagnostic structure attached to a [`QueryResult`] when the caller sets
/// `include_debug`. Never influences the answer itself.
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    pub cleaned_query: String,
    pub final_chunk_count: usize,
    pub retrieved_chunk_ids_after_rerank: Vec<i64>,
    pub rerank_scores: HashMap<i64, f32>,
    pub fused_scores: HashMap<i64, f32>,
    pub context_char_len: usize,
    pub context_token_count: usize,
    pub prompt_token_count: usize,
    pub response_token_count: usize,
    pub initial_fetch_limit: usize,
    pub reranker_degraded: bool,
    pub final_chunk_details: Vec<ChunkDetail>,
}

/// The assembled answer to a query: the generator's output (or a fallback
/// message on upstream failure), the wall-clock time it took, and optional
/// diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub response: String,
    /// Present on a normal (non-short-circuit) response; absent when the
    /// preparer short-circuits on an empty query or a downstream failure
    /// produces the generic error message before any timing is meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

impl QueryResult {
    pub fn short_circuit(message: &str) -> Self {
        Self {
            response: message.to_string(),
            processing_time: None,
            debug: None,
        }
    }
}
