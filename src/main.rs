use anyhow::{Context, Result};
use ragmcp::cache::{ChunkEmbeddingCache, EmbeddingCache};
use ragmcp::db::{migrate, Db};
use ragmcp::embeddings::OpenAIEmbedder;
use ragmcp::generator::HttpGenerator;
use ragmcp::pipeline::{Orchestrator, QueryRequest};
use ragmcp::pipeline::tokenizer::WhitespaceTokenizer;
use ragmcp::reranker::HttpReranker;
use ragmcp::search::{EmbedderAdapter, LexicalSearchAdapter, VectorSearchAdapter};
use ragmcp::Config;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "query" => run_query(args.get(2)).await?,
        "verify" | _ => run_schema_verification().await?,
    }

    Ok(())
}

/// Build an OpenAI-compatible embedder with an optional LRU query cache.
fn build_embedder(config: &Config) -> Result<OpenAIEmbedder> {
    let api_key = std::env::var(&config.embeddings.api_key_env).with_context(|| {
        format!(
            "Environment variable {} not set. Set it in your .env file or as an environment variable.",
            config.embeddings.api_key_env
        )
    })?;

    let cache = if config.embeddings.cache_capacity > 0 {
        Some(Arc::new(EmbeddingCache::new(config.embeddings.cache_capacity)))
    } else {
        None
    };

    Ok(OpenAIEmbedder::new_with_cache_and_timeout(
        api_key,
        config.embeddings.model.clone(),
        config.embeddings.batch_size,
        cache,
        Duration::from_millis(config.pipeline.call_timeouts.embedder_ms),
    ))
}

fn build_orchestrator(config: Config, db: Db) -> Result<Orchestrator> {
    let embedder = build_embedder(&config)?;
    let chunk_cache = Some(Arc::new(ChunkEmbeddingCache::new()));

    let reranker_key = std::env::var(&config.pipeline.reranker_api_key_env).with_context(|| {
        format!(
            "Environment variable {} not set for the reranker.",
            config.pipeline.reranker_api_key_env
        )
    })?;
    let generator_key = std::env::var(&config.pipeline.generator_api_key_env).with_context(|| {
        format!(
            "Environment variable {} not set for the generator.",
            config.pipeline.generator_api_key_env
        )
    })?;

    let reranker = HttpReranker::new(
        reranker_key,
        config.pipeline.reranker_model.clone(),
        Duration::from_millis(config.pipeline.call_timeouts.reranker_ms),
    );
    let generator = HttpGenerator::new(
        generator_key,
        config.pipeline.generator_model.clone(),
        Duration::from_millis(config.pipeline.call_timeouts.generator_ms),
    );

    Ok(Orchestrator::new(
        Arc::new(EmbedderAdapter::new(embedder)),
        Arc::new(VectorSearchAdapter::new(
            db.clone(),
            config.pipeline.embedding_dimension,
            0.0,
            chunk_cache,
        )),
        Arc::new(LexicalSearchAdapter::new(db, 0.0)),
        Arc::new(reranker),
        Arc::new(generator),
        Arc::new(WhitespaceTokenizer),
        config,
    ))
}

/// Run a single query through the pipeline and print the JSON response.
/// Reads the request JSON from argv[2] if given, otherwise from stdin.
async fn run_query(arg: Option<&String>) -> Result<()> {
    let config = Config::load()?;
    let db = Db::new(config.db_path());

    let migrations_dir = Path::new("migrations");
    db.with_connection(move |conn| migrate::run_migrations(conn, migrations_dir))
        .await?;

    let request_json = match arg {
        Some(json) => json.clone(),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let request: QueryRequest =
        serde_json::from_str(&request_json).context("failed to parse query request JSON")?;

    let orchestrator = build_orchestrator(config, db)?;
    let result = orchestrator.run(request).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Run database schema verification
async fn run_schema_verification() -> Result<()> {
    log::info!("Starting RAGMcp v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    log::info!("Configuration loaded successfully");
    log::info!("Docs root: {}", config.rag_folder().display());
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Embedding model: {}", config.embeddings.model);

    let db = Db::new(config.db_path());

    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await?;

    log::info!("Database initialized successfully");

    verify_database_schema(&db).await?;

    log::info!("Ready to serve queries");

    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &ragmcp::db::Db) -> Result<()> {
    use ragmcp::db::migrate;
    use ragmcp::error::RagmcpError;

    db.with_connection(|conn| {
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = vec!["chunks", "documents", "schema_migrations"];
        let mut all_tables_exist = true;

        for table in &expected_tables {
            if !tables.iter().any(|t| t == table) {
                log::error!("Missing table: {}", table);
                all_tables_exist = false;
            } else {
                log::debug!("Table exists: {}", table);
            }
        }

        if !all_tables_exist {
            return Err(RagmcpError::Config("Not all required tables exist".to_string()));
        }

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='chunks_fts'")?;
        let fts_exists: bool = stmt.exists([])?;
        if !fts_exists {
            return Err(RagmcpError::Config(
                "FTS5 virtual table 'chunks_fts' does not exist".to_string(),
            ));
        }
        log::debug!("FTS5 virtual table exists");

        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='trigger' ORDER BY name")?;
        let triggers: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_triggers = vec!["chunks_fts_insert", "chunks_fts_delete", "chunks_fts_update"];
        let mut all_triggers_exist = true;

        for trigger in &expected_triggers {
            if !triggers.iter().any(|t| t.contains(trigger)) {
                log::error!("Missing trigger: {}", trigger);
                all_triggers_exist = false;
            } else {
                log::debug!("Trigger exists: {}", trigger);
            }
        }

        if !all_triggers_exist {
            return Err(RagmcpError::Config("Not all required triggers exist".to_string()));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        if applied.is_empty() {
            return Err(RagmcpError::Config("No migrations applied".to_string()));
        }
        log::debug!("{} migrations applied", applied.len());

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name",
        )?;
        let indexes: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        if indexes.iter().any(|i| i == "idx_chunks_document_id") {
            log::debug!("Index exists: idx_chunks_document_id");
        } else {
            log::warn!("Index not found: idx_chunks_document_id");
        }

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(RagmcpError::Config(format!(
                "Journal mode is not WAL: {}",
                journal_mode
            )));
        }
        log::debug!("Journal mode: WAL");

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(RagmcpError::Config("Foreign keys not enabled".to_string()));
        }
        log::debug!("Foreign keys enabled");

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(RagmcpError::Config(format!(
                "Database integrity check failed: {}",
                integrity
            )));
        }
        log::info!("Database integrity: OK");

        Ok(())
    })
    .await?;

    log::info!("Database schema verification complete");
    Ok(())
}
