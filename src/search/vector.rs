use crate::cache::ChunkEmbeddingCache;
use crate::db::Db;
use crate::embeddings::OpenAIEmbedder;
use crate::error::{RagmcpError, Result};
use crate::search::SearchResult;
use std::sync::Arc;

/// Search for chunks using vector similarity (cosine similarity).
///
/// When `chunk_cache` is provided and loaded, scores in memory and fetches
/// metadata only for the top-k chunk ids. Otherwise does a full DB scan with
/// an optional document-id filter applied in SQL.
pub async fn search_vector(
    db: &Db,
    embedder: &OpenAIEmbedder,
    query: &str,
    k: usize,
    min_score: f32,
    dimension: usize,
    filter_doc_ids: Option<&[i64]>,
    chunk_cache: Option<Arc<ChunkEmbeddingCache>>,
) -> Result<Vec<SearchResult>> {
    let embed_start = std::time::Instant::now();
    let query_vec = embedder.embed_with_cache(query, 3).await?;
    let embed_duration = embed_start.elapsed();
    log::debug!("Vector search: query embedding took {:?}", embed_duration);

    search_vector_by_embedding(db, &query_vec, k, min_score, dimension, filter_doc_ids, chunk_cache).await
}

/// Search for chunks using vector similarity, given an already-computed query
/// embedding. Used by the orchestrator, which embeds the query once and
/// shares the vector between this arm and nothing else (the lexical arm uses
/// the cleaned query text directly).
pub async fn search_vector_by_embedding(
    db: &Db,
    query_vec: &[f32],
    k: usize,
    min_score: f32,
    dimension: usize,
    filter_doc_ids: Option<&[i64]>,
    chunk_cache: Option<Arc<ChunkEmbeddingCache>>,
) -> Result<Vec<SearchResult>> {
    if query_vec.len() != dimension {
        return Err(RagmcpError::Embedding(format!(
            "Unexpected embedding dimension: expected {}, got {}",
            dimension,
            query_vec.len()
        )));
    }

    if let Some(ref cache) = chunk_cache {
        cache.load_if_needed(db, dimension).await?;
        if cache.is_loaded() && cache.len() > 0 {
            return search_vector_cached(db, query_vec, k, min_score, filter_doc_ids, cache).await;
        }
    }

    search_vector_full_scan(db, query_vec, k, min_score, dimension, filter_doc_ids).await
}

/// Fast path: score in memory, then one metadata query for top-k chunk_ids.
async fn search_vector_cached(
    db: &Db,
    query_vec: &[f32],
    k: usize,
    min_score: f32,
    filter_doc_ids: Option<&[i64]>,
    cache: &ChunkEmbeddingCache,
) -> Result<Vec<SearchResult>> {
    // Cache holds every embedding, so over-fetch the candidate set before the
    // optional doc-id filter trims it, to avoid under-filling `k`.
    let fetch_n = match filter_doc_ids {
        Some(_) => usize::MAX.min(k.saturating_mul(8).max(k)),
        None => k,
    };
    let top = cache.top_k_chunk_ids(query_vec, fetch_n, min_score);
    if top.is_empty() {
        return Ok(Vec::new());
    }

    let chunk_ids: Vec<i64> = top.iter().map(|(_, id)| *id).collect();
    let filter_doc_ids = filter_doc_ids.map(|ids| ids.to_vec());

    let rows = db
        .with_connection(move |conn| {
            let placeholders = chunk_ids
                .iter()
                .map(|_| "?")
                .collect::<Vec<_>>()
                .join(",");
            let doc_filter_sql = match &filter_doc_ids {
                Some(ids) if !ids.is_empty() => format!(
                    " AND document_id IN ({})",
                    ids.iter().map(|_| "?").collect::<Vec<_>>().join(",")
                ),
                _ => String::new(),
            };
            let sql = format!(
                "SELECT id, document_id, text, page_number, position, metadata_json FROM chunks WHERE id IN ({}){}",
                placeholders, doc_filter_sql
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            for id in &chunk_ids {
                params.push(Box::new(*id));
            }
            if let Some(ids) = &filter_doc_ids {
                for id in ids {
                    params.push(Box::new(*id));
                }
            }
            let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ));
            }
            Ok::<Vec<_>, RagmcpError>(results)
        })
        .await?;

    let by_id: std::collections::HashMap<i64, ChunkRow> = rows
        .into_iter()
        .map(|(id, document_id, text, page_number, position, metadata_json)| {
            (
                id,
                ChunkRow {
                    document_id,
                    text,
                    page_number,
                    position,
                    metadata_json,
                },
            )
        })
        .collect();

    let results: Vec<SearchResult> = top
        .into_iter()
        .filter_map(|(score, chunk_id)| {
            by_id.get(&chunk_id).map(|row| SearchResult {
                chunk_id,
                document_id: row.document_id,
                chunk_text: row.text.clone(),
                page_number: row.page_number,
                position: row.position,
                metadata: crate::search::parse_metadata(row.metadata_json.clone()),
                score,
                rank: 0,
            })
        })
        .take(k)
        .enumerate()
        .map(|(idx, mut r)| {
            r.rank = idx + 1;
            r
        })
        .collect();

    Ok(results)
}

/// Metadata carried alongside a chunk row, shared by the cached lookup path.
struct ChunkRow {
    document_id: i64,
    text: String,
    page_number: Option<i64>,
    position: Option<i64>,
    metadata_json: Option<String>,
}

/// Full-scan path: one query with the doc-id filter in WHERE, then score in Rust.
async fn search_vector_full_scan(
    db: &Db,
    query_vec: &[f32],
    k: usize,
    min_score: f32,
    dimension: usize,
    filter_doc_ids: Option<&[i64]>,
) -> Result<Vec<SearchResult>> {
    let filter_doc_ids = filter_doc_ids.map(|ids| ids.to_vec());

    let rows = db
        .with_connection(move |conn| {
            let doc_filter_sql = match &filter_doc_ids {
                Some(ids) if !ids.is_empty() => format!(
                    " AND document_id IN ({})",
                    ids.iter().map(|_| "?").collect::<Vec<_>>().join(",")
                ),
                _ => String::new(),
            };
            let sql = format!(
                "SELECT id, document_id, text, embedding, page_number, position, metadata_json FROM chunks WHERE embedding IS NOT NULL{}",
                doc_filter_sql
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(ids) = &filter_doc_ids {
                for id in ids {
                    params.push(Box::new(*id));
                }
            }
            let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let chunk_id: i64 = row.get(0)?;
                let document_id: i64 = row.get(1)?;
                let chunk_text: String = row.get(2)?;
                let embedding_blob: Option<Vec<u8>> = row.get(3)?;
                let page_number: Option<i64> = row.get(4)?;
                let position: Option<i64> = row.get(5)?;
                let metadata_json: Option<String> = row.get(6)?;
                if let Some(blob) = embedding_blob {
                    results.push((
                        chunk_id,
                        document_id,
                        chunk_text,
                        blob,
                        page_number,
                        position,
                        metadata_json,
                    ));
                }
            }
            Ok::<Vec<_>, RagmcpError>(results)
        })
        .await?;

    let mut scored_results: Vec<(f32, SearchResult)> = Vec::new();
    for (chunk_id, document_id, chunk_text, embedding_blob, page_number, position, metadata_json) in
        rows
    {
        let embedding = match parse_embedding(&embedding_blob) {
            Some(e) => e,
            None => continue,
        };
        if embedding.len() != dimension {
            continue;
        }
        let similarity = cosine_similarity(query_vec, &embedding);
        if similarity < min_score {
            continue;
        }
        scored_results.push((
            similarity,
            SearchResult {
                chunk_id,
                document_id,
                chunk_text,
                page_number,
                position,
                metadata: crate::search::parse_metadata(metadata_json),
                score: similarity,
                rank: 0,
            },
        ));
    }

    scored_results.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.chunk_id.cmp(&b.1.chunk_id))
    });
    let results: Vec<SearchResult> = scored_results
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(idx, (_, mut result))| {
            result.rank = idx + 1;
            result
        })
        .collect();

    Ok(results)
}

/// Parse embedding BLOB to Vec<f32> (little-endian f32 array).
fn parse_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }

    blob.chunks(4)
        .map(|bytes| {
            let arr: [u8; 4] = bytes.try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        })
        .collect()
}

/// Cosine similarity between two equal-length vectors; 0.0 if either has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(
        a.len(),
        b.len(),
        "Vectors must have same length for cosine similarity"
    );

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let similarity = cosine_similarity(&a, &b);
        assert!(
            (similarity - 1.0).abs() < 1e-6,
            "Identical vectors should have similarity 1.0"
        );
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let similarity = cosine_similarity(&a, &b);
        assert!(
            (similarity - 0.0).abs() < 1e-6,
            "Orthogonal vectors should have similarity 0.0"
        );
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        let similarity = cosine_similarity(&a, &b);
        assert!(
            (similarity - (-1.0)).abs() < 1e-6,
            "Opposite vectors should have similarity -1.0"
        );
    }

    #[test]
    fn test_cosine_similarity_zero_magnitude() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let similarity = cosine_similarity(&a, &b);
        assert_eq!(similarity, 0.0, "Zero magnitude vector should return 0.0");
    }

    #[test]
    fn test_parse_embedding_valid() {
        let test_floats = vec![1.0f32, 2.0f32, 3.0f32, 4.0f32];
        let blob: Vec<u8> = test_floats.iter().flat_map(|f| f.to_le_bytes()).collect();

        let parsed = parse_embedding(&blob);
        assert!(parsed.is_some());

        let parsed = parsed.unwrap();
        assert_eq!(parsed.len(), 4);
        for (original, parsed) in test_floats.iter().zip(parsed.iter()) {
            assert!((original - parsed).abs() < 1e-6);
        }
    }

    #[test]
    fn test_parse_embedding_invalid_length() {
        let blob = vec![0u8, 1, 2, 3, 4]; // 5 bytes, not a multiple of 4
        let parsed = parse_embedding(&blob);
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_embedding_empty() {
        let blob = vec![];
        let parsed = parse_embedding(&blob);
        assert!(parsed.is_some());
        assert_eq!(parsed.unwrap().len(), 0);
    }

    #[test]
    fn test_cosine_similarity_normalized_vectors() {
        let a = vec![0.6, 0.8, 0.0];
        let b = vec![0.6, 0.8, 0.0];
        let similarity = cosine_similarity(&a, &b);
        assert!(
            (similarity - 1.0).abs() < 1e-6,
            "Normalized identical vectors should have similarity 1.0"
        );
    }

    #[test]
    fn test_cosine_similarity_different_magnitudes() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![2.0, 0.0, 0.0];
        let similarity = cosine_similarity(&a, &b);
        assert!(
            (similarity - 1.0).abs() < 1e-6,
            "Vectors in same direction should have similarity 1.0 regardless of magnitude"
        );
    }

    #[test]
    fn test_parse_embedding_1024_dimensions() {
        let test_floats: Vec<f32> = (0..1024).map(|i| i as f32 * 0.001).collect();
        let blob: Vec<u8> = test_floats.iter().flat_map(|f| f.to_le_bytes()).collect();

        let parsed = parse_embedding(&blob);
        assert!(parsed.is_some());

        let parsed = parsed.unwrap();
        assert_eq!(parsed.len(), 1024);
        for (original, parsed) in test_floats.iter().zip(parsed.iter()) {
            assert!((original - parsed).abs() < 1e-6);
        }
    }

    // Integration tests for search_vector() (embedder round-trip + DB fixtures)
    // live alongside the orchestrator tests, which already stand up fake
    // collaborators for the full pipeline.
}
