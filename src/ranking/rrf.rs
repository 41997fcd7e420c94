use super::{FusedResult, RankedList};
use crate::chunk::Chunk;
use std::collections::HashMap;

/// Fuse an arbitrary number of ranked lists into one, using unweighted
/// Reciprocal Rank Fusion: `RRF(c) = sum(1 / (k + rank_i(c)))` over every list
/// `i` that contains `c`, where `rank_i` is 1-indexed. Every input list
/// contributes its raw reciprocal rank with no per-list weighting.
///
/// Empty input lists are skipped. If every list is empty, the result is
/// empty. Ties in the fused order are broken by chunk id ascending.
pub fn reciprocal_rank_fusion(lists: &[RankedList], k: usize) -> FusedResult {
    let mut scores: HashMap<i64, f32> = HashMap::new();
    let mut chunks: HashMap<i64, Chunk> = HashMap::new();

    for list in lists {
        for (idx, scored) in list.iter().enumerate() {
            let rank = idx + 1;
            let contribution = 1.0 / (k + rank) as f32;
            *scores.entry(scored.chunk.id).or_insert(0.0) += contribution;
            chunks.entry(scored.chunk.id).or_insert_with(|| scored.chunk.clone());
        }
    }

    let mut ids: Vec<i64> = scores.keys().copied().collect();
    ids.sort_by(|a, b| {
        let score_a = scores[a];
        let score_b = scores[b];
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });

    let ordered_chunks = ids
        .iter()
        .map(|id| chunks.get(id).cloned().expect("id came from scores map"))
        .collect();

    FusedResult {
        chunks: ordered_chunks,
        scores,
    }
}
