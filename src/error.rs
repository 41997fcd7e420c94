use thiserror::Error;

/// Main error type for RAGMcp
#[derive(Error, Debug)]
pub enum RagmcpError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding API errors (ingest-time / generic)
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The cleaned query was empty or whitespace-only. Terminal: the orchestrator
    /// returns the "please rephrase" response without invoking any collaborator.
    #[error("query is empty after cleaning")]
    EmptyQuery,

    /// The embedder failed to produce a vector for the query.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The vector-search collaborator failed.
    #[error("vector search failed: {0}")]
    VectorSearchError(String),

    /// The lexical-search collaborator failed.
    #[error("lexical search failed: {0}")]
    LexicalSearchError(String),

    /// The reranker failed. Recoverable: the orchestrator falls back to fused order.
    #[error("reranker failed: {0}")]
    RerankerError(String),

    /// The generator failed to produce an answer.
    #[error("generation failed: {0}")]
    GenerationError(String),

    /// An external call exceeded its configured timeout.
    #[error("{0} timed out")]
    Timeout(String),

    /// The caller cancelled the query. No response is emitted.
    #[error("query cancelled")]
    Cancelled,
}

impl RagmcpError {
    /// True if this error kind has a defined recovery (currently only the reranker).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RagmcpError::RerankerError(_))
    }

    /// Map to the generic wire-level message used for non-recoverable failures (§7).
    pub fn user_message(&self) -> &'static str {
        match self {
            RagmcpError::EmptyQuery => "I didn't understand your query. Could you rephrase?",
            _ => "Sorry, an internal error occurred processing your query.",
        }
    }
}

/// Convenient Result type using RagmcpError
pub type Result<T> = std::result::Result<T, RagmcpError>;
