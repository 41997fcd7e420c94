pub mod bm25;
pub mod vector;

pub use bm25::search_bm25;
pub use vector::search_vector;

use crate::chunk::Chunk;
use crate::db::Db;
use crate::embeddings::OpenAIEmbedder;
use crate::error::{RagmcpError, Result};
use crate::ranking::{RankedList, ScoredChunk};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A single candidate chunk returned by a retrieval arm, with its
/// arm-local score and 1-indexed rank.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk_id: i64,
    pub document_id: i64,
    pub chunk_text: String,
    pub page_number: Option<i64>,
    pub position: Option<i64>,
    pub metadata: HashMap<String, Value>,
    pub score: f32,
    pub rank: usize,
}

/// Parse the `metadata_json` column (nullable TEXT) into the chunk's
/// metadata map. Missing or unparseable metadata yields an empty map rather
/// than failing the whole query.
pub(crate) fn parse_metadata(metadata_json: Option<String>) -> HashMap<String, Value> {
    metadata_json
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn to_ranked_list(results: Vec<SearchResult>) -> RankedList {
    results
        .into_iter()
        .map(|r| ScoredChunk {
            chunk: Chunk {
                id: r.chunk_id,
                document_id: r.document_id,
                text: r.chunk_text,
                page_number: r.page_number,
                position: r.position,
                metadata: r.metadata,
            },
            score: r.score,
        })
        .collect()
}

/// Adapts [`OpenAIEmbedder`] to the orchestrator's `Embedder` trait.
pub struct EmbedderAdapter {
    embedder: OpenAIEmbedder,
}

impl EmbedderAdapter {
    pub fn new(embedder: OpenAIEmbedder) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl crate::pipeline::Embedder for EmbedderAdapter {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed_with_cache(text, 3).await
    }
}

/// Adapts the chunk store's vector-similarity query surface to the
/// orchestrator's `VectorSearch` trait.
pub struct VectorSearchAdapter {
    db: Db,
    dimension: usize,
    min_score: f32,
    chunk_cache: Option<Arc<crate::cache::ChunkEmbeddingCache>>,
}

impl VectorSearchAdapter {
    pub fn new(
        db: Db,
        dimension: usize,
        min_score: f32,
        chunk_cache: Option<Arc<crate::cache::ChunkEmbeddingCache>>,
    ) -> Self {
        Self {
            db,
            dimension,
            min_score,
            chunk_cache,
        }
    }
}

#[async_trait]
impl crate::pipeline::VectorSearch for VectorSearchAdapter {
    async fn find_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        filter_doc_ids: Option<&[i64]>,
    ) -> Result<RankedList> {
        let results = vector::search_vector_by_embedding(
            &self.db,
            embedding,
            limit,
            self.min_score,
            self.dimension,
            filter_doc_ids,
            self.chunk_cache.clone(),
        )
        .await
        .map_err(|e| RagmcpError::VectorSearchError(e.to_string()))?;
        Ok(to_ranked_list(results))
    }
}

/// Adapts the chunk store's full-text query surface to the orchestrator's
/// `LexicalSearch` trait.
pub struct LexicalSearchAdapter {
    db: Db,
    min_score: f32,
}

impl LexicalSearchAdapter {
    pub fn new(db: Db, min_score: f32) -> Self {
        Self { db, min_score }
    }
}

#[async_trait]
impl crate::pipeline::LexicalSearch for LexicalSearchAdapter {
    async fn find_by_keyword(
        &self,
        query: &str,
        limit: usize,
        filter_doc_ids: Option<&[i64]>,
    ) -> Result<RankedList> {
        let results = bm25::search_bm25(&self.db, query, filter_doc_ids, limit, self.min_score)
            .await
            .map_err(|e| RagmcpError::LexicalSearchError(e.to_string()))?;
        Ok(to_ranked_list(results))
    }
}
