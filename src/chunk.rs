use serde_json::Value;
use std::collections::HashMap;

/// A retrievable unit of document text. Identity is the integer id; everything
/// else travels with it through the pipeline so downstream stages (context
/// building, debug reporting) never need to re-query the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub text: String,
    pub page_number: Option<i64>,
    pub position: Option<i64>,
    pub metadata: HashMap<String, Value>,
}

impl Chunk {
    pub fn new(id: i64, document_id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            document_id,
            text: text.into(),
            page_number: None,
            position: None,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_new_has_empty_metadata() {
        let chunk = Chunk::new(1, 10, "hello world");
        assert_eq!(chunk.id, 1);
        assert_eq!(chunk.document_id, 10);
        assert_eq!(chunk.text, "hello world");
        assert!(chunk.page_number.is_none());
        assert!(chunk.position.is_none());
        assert!(chunk.metadata.is_empty());
    }
}
