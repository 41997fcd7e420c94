pub mod rrf;

pub use rrf::reciprocal_rank_fusion;

use crate::chunk::Chunk;
use std::collections::HashMap;

/// A chunk paired with an arm-local score. Vector search scores are cosine
/// similarities in [0, 1]; lexical search scores are unbounded BM25 ranks.
/// The two are not comparable, which is the whole reason fusion exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// An ordered sequence of scored chunks: sorted by score descending, ties
/// broken by chunk id ascending. May be empty.
pub type RankedList = Vec<ScoredChunk>;

/// The output of fusing one or more ranked lists: chunks in fused order, plus
/// the fused score for each by chunk id.
#[derive(Debug, Clone, Default)]
pub struct FusedResult {
    pub chunks: Vec<Chunk>,
    pub scores: HashMap<i64, f32>,
}

impl FusedResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn score_of(&self, chunk_id: i64) -> Option<f32> {
        self.scores.get(&chunk_id).copied()
    }
}
