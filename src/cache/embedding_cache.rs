use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Thread-safe LRU cache for query embeddings
/// 
/// Caches embeddings for frequently-used queries to avoid redundant API calls.
/// Uses LRU eviction policy to maintain bounded memory usage.
pub struct EmbeddingCache {
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingCache {
    /// Create a new embedding cache with the specified capacity
    /// 
    /// # Arguments
    /// 
    /// * `capacity` - Maximum number of embeddings to cache
    /// 
    /// # Panics
    /// 
    /// Panics if capacity is 0 (LRU cache requires non-zero capacity)
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1))
            .expect("Cache capacity must be at least 1");
        
        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }
    
    /// Get a cached embedding for a query
    /// 
    /// # Arguments
    /// 
    /// * `query` - Query text to look up
    /// 
    /// # Returns
    /// 
    /// Some(embedding) if found in cache, None otherwise
    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        self.cache
            .lock()
            .unwrap()
            .get(query)
            .cloned()
    }
    
    /// Store an embedding in the cache
    /// 
    /// # Arguments
    /// 
    /// * `query` - Query text (used as key)
    /// * `embedding` - Embedding vector to cache
    pub fn put(&self, query: String, embedding: Vec<f32>) {
        self.cache
            .lock()
            .unwrap()
            .put(query, embedding);
    }
    
    /// Get the current number of cached entries
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
    
    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.lock().unwrap().is_empty()
    }
    
    /// Clear all entries from the cache
    pub fn clear(&self) {
        self.cache.lock().unwrap().clear();
    }
}
