pub mod chunk_embedding_cache;
pub mod embedding_cache;

pub use chunk_embedding_cache::ChunkEmbeddingCache;
pub use embedding_cache::EmbeddingCache;
