use crate::db::Db;
use crate::error::{RagmcpError, Result};
use chrono::Utc;
use rusqlite::params;

/// A chunk ready to be persisted: text plus an optional pre-computed embedding.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Insert or update a document, keyed by its unique path. Returns the
/// document's integer id.
pub async fn insert_document(
    db: &Db,
    path: &str,
    doc_type: &str,
    content_tokens: usize,
    file_hash: &str,
) -> Result<i64> {
    let path = path.to_string();
    let doc_type = doc_type.to_string();
    let file_hash = file_hash.to_string();
    let last_modified = Utc::now().to_rfc3339();

    db.with_connection(move |conn| {
        conn.execute(
            r#"
            INSERT INTO documents (path, doc_type, content_tokens, last_modified, file_hash)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(path) DO UPDATE SET
                doc_type = excluded.doc_type,
                content_tokens = excluded.content_tokens,
                last_modified = excluded.last_modified,
                file_hash = excluded.file_hash
            "#,
            params![path, doc_type, content_tokens as i64, last_modified, file_hash],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM documents WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;

        Ok::<i64, RagmcpError>(id)
    })
    .await
}

/// Insert chunks for a document, in batches. FTS5 triggers keep chunks_fts in
/// sync automatically. Returns the inserted chunks' ids, in input order.
pub async fn insert_chunks(db: &Db, document_id: i64, chunks: Vec<NewChunk>) -> Result<Vec<i64>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    db.with_connection(move |conn| {
        let mut ids = Vec::with_capacity(chunks.len());
        const BATCH_SIZE: usize = 100;

        for batch in chunks.chunks(BATCH_SIZE) {
            for (idx, chunk) in batch.iter().enumerate() {
                let embedding_blob = chunk.embedding.as_deref().map(encode_embedding);
                conn.execute(
                    r#"
                    INSERT INTO chunks (document_id, chunk_index, text, embedding)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    params![document_id, idx as i64, chunk.text, embedding_blob],
                )?;
                ids.push(conn.last_insert_rowid());
            }
        }

        Ok::<Vec<i64>, RagmcpError>(ids)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{migrate, Db};
    use std::path::Path;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_insert_document() {
        let (db, _temp_dir) = setup_test_db().await;

        let document_id = insert_document(&db, "test/path.md", "markdown", 100, "test_hash")
            .await
            .unwrap();

        assert!(document_id > 0);

        db.with_connection(move |conn| {
            let row: (String, String) = conn.query_row(
                "SELECT path, doc_type FROM documents WHERE id = ?1",
                params![document_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            assert_eq!(row.0, "test/path.md");
            assert_eq!(row.1, "markdown");
            Ok::<(), RagmcpError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_insert_chunks() {
        let (db, _temp_dir) = setup_test_db().await;

        let document_id = insert_document(&db, "test/path.md", "markdown", 100, "test_hash")
            .await
            .unwrap();

        let chunks = vec![
            NewChunk {
                text: "Chunk 1".to_string(),
                embedding: Some(vec![1.0, 0.0]),
            },
            NewChunk {
                text: "Chunk 2".to_string(),
                embedding: None,
            },
        ];

        let ids = insert_chunks(&db, document_id, chunks).await.unwrap();
        assert_eq!(ids.len(), 2);

        db.with_connection(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )?;
            assert_eq!(count, 2);

            let fts_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chunks_fts WHERE chunks_fts MATCH 'Chunk'",
                [],
                |row| row.get(0),
            )?;
            assert_eq!(fts_count, 2);

            Ok::<(), RagmcpError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_insert_document_upsert() {
        let (db, _temp_dir) = setup_test_db().await;

        let id1 = insert_document(&db, "test/path.md", "markdown", 100, "hash1")
            .await
            .unwrap();
        let id2 = insert_document(&db, "test/path.md", "markdown", 200, "hash2")
            .await
            .unwrap();

        assert_eq!(id1, id2, "re-inserting the same path should update, not duplicate");

        db.with_connection(move |conn| {
            let file_hash: String = conn.query_row(
                "SELECT file_hash FROM documents WHERE id = ?1",
                params![id1],
                |row| row.get(0),
            )?;
            assert_eq!(file_hash, "hash2");
            Ok::<(), RagmcpError>(())
        })
        .await
        .unwrap();
    }
}
