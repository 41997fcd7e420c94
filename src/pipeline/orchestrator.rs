use crate::chunk::Chunk;
use crate::config::Config;
use crate::error::RagmcpError;
use crate::generator::Generator;
use crate::pipeline::context::build_context;
use crate::pipeline::preparer::prepare_query;
use crate::pipeline::prompt::build_prompt;
use crate::pipeline::result::{ChunkDetail, DebugInfo, QueryResult};
use crate::pipeline::tokenizer::Tokenizer;
use crate::ranking::{reciprocal_rank_fusion, RankedList};
use crate::reranker::Reranker;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const GENERIC_ERROR_MESSAGE: &str = "Sorry, an internal error occurred processing your query.";

/// The pipeline entry point's request shape (language-agnostic JSON).
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub document_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub include_debug: bool,
}

/// Produces a query embedding. Deterministic for the same input; a zero
/// vector is never substituted on failure.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_text(&self, text: &str) -> crate::error::Result<Vec<f32>>;
}

/// Finds chunks by embedding similarity, ordered by cosine similarity
/// descending.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn find_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        filter_doc_ids: Option<&[i64]>,
    ) -> crate::error::Result<RankedList>;
}

/// Finds chunks by full-text match, ordered by lexical rank descending. An
/// empty cleaned query never reaches the store; it yields an empty list.
#[async_trait]
pub trait LexicalSearch: Send + Sync {
    async fn find_by_keyword(
        &self,
        query: &str,
        limit: usize,
        filter_doc_ids: Option<&[i64]>,
    ) -> crate::error::Result<RankedList>;
}

/// Wires every external collaborator together into the query pipeline:
/// Preparer -> Embedder -> {VectorSearch, LexicalSearch} -> Fuser -> Reranker
/// -> ContextBuilder -> PromptBuilder -> Generator -> ResultAssembler.
///
/// Stateless per request: the only shared state is the collaborator handles
/// themselves, which the caller is responsible for making safe to share
/// (thread-safe client, serialized connection pool, etc).
pub struct Orchestrator {
    embedder: Arc<dyn Embedder>,
    vector_search: Arc<dyn VectorSearch>,
    lexical_search: Arc<dyn LexicalSearch>,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn Generator>,
    tokenizer: Arc<dyn Tokenizer>,
    config: Config,
}

impl Orchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_search: Arc<dyn VectorSearch>,
        lexical_search: Arc<dyn LexicalSearch>,
        reranker: Arc<dyn Reranker>,
        generator: Arc<dyn Generator>,
        tokenizer: Arc<dyn Tokenizer>,
        config: Config,
    ) -> Self {
        Self {
            embedder,
            vector_search,
            lexical_search,
            reranker,
            generator,
            tokenizer,
            config,
        }
    }

    pub async fn run(&self, request: QueryRequest) -> QueryResult {
        let start = Instant::now();

        let cleaned = match prepare_query(&request.query) {
            Ok(cleaned) => cleaned,
            Err(RagmcpError::EmptyQuery) => {
                return QueryResult::short_circuit(
                    "I didn't understand your query. Could you rephrase?",
                );
            }
            Err(_) => return QueryResult::short_circuit(GENERIC_ERROR_MESSAGE),
        };

        match self.run_pipeline(&request, &cleaned, start).await {
            Ok(result) => result,
            Err(_) => QueryResult::short_circuit(GENERIC_ERROR_MESSAGE),
        }
    }

    async fn run_pipeline(
        &self,
        request: &QueryRequest,
        cleaned: &str,
        start: Instant,
    ) -> crate::error::Result<QueryResult> {
        let max_results = request.max_results.unwrap_or(self.config.pipeline.max_results);
        let initial_limit = max_results * self.config.pipeline.initial_fetch_multiplier;
        let filter_doc_ids = request.document_ids.as_deref();

        let embedding = self.embedder.embed_text(cleaned).await?;

        let timeouts = &self.config.pipeline.call_timeouts;
        let (vector_results, lexical_results) = tokio::try_join!(
            with_timeout(
                "vector search",
                std::time::Duration::from_millis(timeouts.vector_search_ms),
                self.vector_search
                    .find_similar(&embedding, initial_limit, filter_doc_ids),
            ),
            with_timeout(
                "lexical search",
                std::time::Duration::from_millis(timeouts.lexical_search_ms),
                self.lexical_search
                    .find_by_keyword(cleaned, initial_limit, filter_doc_ids),
            ),
        )?;

        let fused = reciprocal_rank_fusion(
            &[vector_results, lexical_results],
            self.config.pipeline.rrf_k,
        );

        let (reranked, reranker_degraded) = if fused.is_empty() {
            (Vec::new(), false)
        } else if !self.config.pipeline.reranker_enabled {
            (fused_as_reranked(&fused), true)
        } else {
            match self.reranker.rerank(cleaned, &fused.chunks).await {
                Ok(reranked) => (reranked, false),
                Err(_) => (fused_as_reranked(&fused), true),
            }
        };

        let built_context = build_context(&reranked, max_results, self.tokenizer.as_ref());
        let built_prompt = build_prompt(
            &self.config.pipeline.system_prompt,
            &built_context.text,
            &request.query,
            self.tokenizer.as_ref(),
        );

        let answer = self
            .generator
            .generate(built_prompt.messages, None, None, None)
            .await?;

        let processing_time = start.elapsed().as_secs_f64();
        let response_token_count = self.tokenizer.count(&answer);

        let debug = if request.include_debug {
            Some(build_debug_info(
                cleaned,
                &fused,
                &reranked,
                max_results,
                &built_context,
                built_prompt.token_count,
                response_token_count,
                initial_limit,
                reranker_degraded,
            ))
        } else {
            None
        };

        Ok(QueryResult {
            response: answer,
            processing_time: Some(processing_time),
            debug,
        })
    }
}

/// Applies a per-collaborator timeout to a retrieval-arm future, mapping an
/// elapsed deadline to a `Timeout` error naming the call that missed it.
async fn with_timeout<T>(
    call: &str,
    duration: std::time::Duration,
    fut: impl std::future::Future<Output = crate::error::Result<T>>,
) -> crate::error::Result<T> {
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| RagmcpError::Timeout(call.to_string()))?
}

/// Degraded-mode fallback: treat the fused order as the final order, scored
/// by the fused RRF score (so downstream code has a uniform `(Chunk, f32)`
/// shape to work with regardless of whether the reranker actually ran).
fn fused_as_reranked(fused: &crate::ranking::FusedResult) -> Vec<(Chunk, f32)> {
    fused
        .chunks
        .iter()
        .map(|c| (c.clone(), fused.score_of(c.id).unwrap_or(0.0)))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn build_debug_info(
    cleaned_query: &str,
    fused: &crate::ranking::FusedResult,
    reranked: &[(Chunk, f32)],
    max_results: usize,
    built_context: &crate::pipeline::context::BuiltContext,
    prompt_token_count: usize,
    response_token_count: usize,
    initial_fetch_limit: usize,
    reranker_degraded: bool,
) -> DebugInfo {
    let final_slice = &reranked[..reranked.len().min(max_results)];

    let rerank_scores: HashMap<i64, f32> = final_slice.iter().map(|(c, s)| (c.id, *s)).collect();

    let final_chunk_details: Vec<ChunkDetail> = final_slice
        .iter()
        .enumerate()
        .map(|(i, (chunk, score))| ChunkDetail {
            id: chunk.id,
            document_id: chunk.document_id,
            page_number: chunk.page_number,
            position: chunk.position,
            text: chunk.text.clone(),
            final_rank: i + 1,
            rerank_score: if reranker_degraded { None } else { Some(*score) },
            rrf_score: fused.score_of(chunk.id),
        })
        .collect();

    DebugInfo {
        cleaned_query: cleaned_query.to_string(),
        final_chunk_count: final_slice.len(),
        retrieved_chunk_ids_after_rerank: final_slice.iter().map(|(c, _)| c.id).collect(),
        rerank_scores,
        fused_scores: fused.scores.clone(),
        context_char_len: built_context.char_len,
        context_token_count: built_context.token_count,
        prompt_token_count,
        response_token_count,
        initial_fetch_limit,
        reranker_degraded,
        final_chunk_details,
    }
}
