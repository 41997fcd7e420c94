use crate::db::Db;
use crate::error::{RagmcpError, Result};
use crate::search::SearchResult;
use rusqlite::params_from_iter;

/// Sanitize and format FTS5 query string for optimal matching
///
/// Escapes special characters and formats multi-word queries for better recall.
/// Uses OR logic for space-separated terms to improve recall (any term matching is better than all).
/// Removes FTS5 special characters that cause syntax errors (? * etc.) and filters out common stop words.
pub fn sanitize_fts5_query(query: &str) -> String {
    let trimmed = query.trim();

    // FTS5: ? * ( ) { } - and single quote (') cause "syntax error near \"'\"" in MATCH
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '?' | '*' | '(' | ')' | '{' | '}' | '-' | '\''))
        .collect();

    let stop_words: std::collections::HashSet<&str> = [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "as", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "should", "could", "what", "which", "who", "where",
        "when", "why", "how", "this", "that", "these", "those",
    ]
    .iter()
    .cloned()
    .collect();

    let terms: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|term| {
            let lower = term.to_lowercase();
            !stop_words.contains(lower.as_str()) && term.len() >= 2
        })
        .collect();

    if terms.is_empty() {
        return cleaned.replace('"', "\"\"");
    }

    if terms.len() == 1 {
        return terms[0].replace('"', "\"\"");
    }

    let escaped_terms: Vec<String> = terms.iter().map(|t| t.replace('"', "\"\"")).collect();

    escaped_terms.join(" OR ")
}

/// Normalize BM25 score from negative range to 0-1 range
///
/// BM25 scores are negative (better matches = lower scores). This converts
/// them to a 0-1 range where higher = better via sigmoid normalization:
/// 1.0 / (1.0 + exp(raw_score))
pub fn normalize_bm25_score(raw_score: f64) -> f32 {
    if raw_score.is_nan() || raw_score.is_infinite() {
        return 0.0;
    }

    let normalized = 1.0 / (1.0 + raw_score.exp());
    normalized as f32
}

/// Search chunks using BM25 full-text search via FTS5.
///
/// Returns results ranked by BM25 relevance, highest normalized score first,
/// with ranks assigned (1-indexed).
pub async fn search_bm25(
    db: &Db,
    query: &str,
    filter_doc_ids: Option<&[i64]>,
    k: usize,
    min_score: f32,
) -> Result<Vec<SearchResult>> {
    let start = std::time::Instant::now();

    // FTS5 doesn't accept an empty MATCH expression
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let sanitized_query = sanitize_fts5_query(query);
    let filter_doc_ids = filter_doc_ids.map(|ids| ids.to_vec());
    let k_i64 = k as i64;

    let mut rows = db
        .with_connection(move |conn| {
            let doc_filter_sql = match &filter_doc_ids {
                Some(ids) if !ids.is_empty() => format!(
                    "AND c.document_id IN ({})",
                    ids.iter().map(|_| "?").collect::<Vec<_>>().join(",")
                ),
                _ => String::new(),
            };

            let sql = format!(
                r#"
                SELECT
                    c.id,
                    c.document_id,
                    c.text,
                    c.page_number,
                    c.position,
                    c.metadata_json,
                    bm25(chunks_fts) AS raw_score
                FROM chunks_fts
                JOIN chunks c ON chunks_fts.rowid = c.id
                WHERE chunks_fts MATCH ?
                {}
                ORDER BY raw_score
                LIMIT ?
                "#,
                doc_filter_sql
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut query_params: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(sanitized_query.clone())];
            if let Some(ids) = &filter_doc_ids {
                for id in ids {
                    query_params.push(Box::new(*id));
                }
            }
            query_params.push(Box::new(k_i64));

            let mut rows = stmt.query(params_from_iter(query_params))?;

            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let chunk_id: i64 = row.get(0)?;
                let document_id: i64 = row.get(1)?;
                let chunk_text: String = row.get(2)?;
                let page_number: Option<i64> = row.get(3)?;
                let position: Option<i64> = row.get(4)?;
                let metadata_json: Option<String> = row.get(5)?;
                let raw_score: f64 = row.get(6)?;

                let normalized_score = normalize_bm25_score(raw_score);
                if normalized_score < min_score {
                    continue;
                }

                results.push(SearchResult {
                    chunk_id,
                    document_id,
                    chunk_text,
                    page_number,
                    position,
                    metadata: crate::search::parse_metadata(metadata_json),
                    score: normalized_score,
                    rank: 0,
                });
            }

            Ok::<Vec<SearchResult>, RagmcpError>(results)
        })
        .await?;

    rows.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    for (idx, result) in rows.iter_mut().enumerate() {
        result.rank = idx + 1;
    }

    let duration = start.elapsed();
    log::debug!(
        "BM25 search took {:?}, returned {} results",
        duration,
        rows.len()
    );

    Ok(rows)
}
