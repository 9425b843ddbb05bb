//! Document store client interface
//!
//! The session store only needs a narrow slice of a document database:
//! database and collection provisioning plus four per-collection calls
//! (query by example, remove by example, update by key and insert).
//! Handles are acquired top-down: client -> database -> collection.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use thiserror::Error;

pub mod memory;

#[cfg(feature = "arangodb")]
pub mod http;

pub use memory::MemoryClient;

#[cfg(feature = "arangodb")]
pub use http::ArangoClient;

/// A stored document: a JSON object
pub type Document = Map<String, Value>;

/// Name of the internal document key attribute
pub const KEY_FIELD: &str = "_key";

/// Errors reported by a document store client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The store could not be reached at all
    #[error("document store unreachable: {0}")]
    Unreachable(String),

    /// The store answered with an error
    #[error("ArangoDB error {code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    /// A document with the same key already exists
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    /// Database, collection or document does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport level HTTP error
    #[cfg(feature = "arangodb")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Entry point of a document store: database enumeration, creation and selection
#[async_trait]
pub trait DocumentClient: Send + Sync + 'static {
    type Database: Database;

    /// Names of the databases visible to the connected user
    async fn list_databases(&self) -> Result<Vec<String>, ClientError>;

    /// Create a database
    async fn create_database(&self, name: &str) -> Result<(), ClientError>;

    /// Select a database. Does not check that it exists.
    fn database(&self, name: &str) -> Self::Database;
}

/// A selected database: collection enumeration, creation and handle acquisition
#[async_trait]
pub trait Database: Send + Sync + 'static {
    type Collection: Collection;

    /// Names of the non-system collections in this database
    async fn list_collections(&self) -> Result<Vec<String>, ClientError>;

    /// Create a document collection
    async fn create_collection(&self, name: &str) -> Result<(), ClientError>;

    /// Acquire a collection handle. Does not check that it exists.
    fn collection(&self, name: &str) -> Self::Collection;
}

/// Per-collection document operations
#[async_trait]
pub trait Collection: Send + Sync + 'static {
    /// All documents whose attributes equal every attribute of `example`.
    /// An empty example matches every document.
    async fn by_example(&self, example: &Document) -> Result<QueryCursor, ClientError>;

    /// Remove every document matching `example`, returning how many were removed
    async fn remove_by_example(&self, example: &Document) -> Result<u64, ClientError>;

    /// Overwrite the attributes of the document stored under `key` with those
    /// of `document`. Attributes not named in `document` are kept; object
    /// values are replaced whole, never merged.
    async fn update(&self, key: &str, document: &Document) -> Result<(), ClientError>;

    /// Insert a new document, returning its key
    async fn insert(&self, document: &Document) -> Result<String, ClientError>;
}

/// Fully materialized result of a query
#[derive(Debug, Clone, Default)]
pub struct QueryCursor {
    count: usize,
    documents: VecDeque<Document>,
}

impl QueryCursor {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            count: documents.len(),
            documents: documents.into(),
        }
    }

    /// Total number of matches, unaffected by consuming the cursor
    pub fn total(&self) -> usize {
        self.count
    }
}

impl Iterator for QueryCursor {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.documents.pop_front()
    }
}

/// True when every attribute of `example` is present in `document` with an equal value
pub fn matches_example(document: &Document, example: &Document) -> bool {
    example
        .iter()
        .all(|(field, value)| document.get(field) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_empty_example_matches_everything() {
        let d = doc(json!({"_key": "a", "session": {}}));
        assert!(matches_example(&d, &Document::new()));
    }

    #[test]
    fn test_example_requires_equal_values() {
        let d = doc(json!({"sid": "abc", "n": 1}));
        assert!(matches_example(&d, &doc(json!({"sid": "abc"}))));
        assert!(!matches_example(&d, &doc(json!({"sid": "abd"}))));
        assert!(!matches_example(&d, &doc(json!({"other": "abc"}))));
    }

    #[test]
    fn test_cursor_total_survives_iteration() {
        let mut cursor = QueryCursor::new(vec![Document::new(), Document::new()]);
        assert_eq!(cursor.total(), 2);
        assert!(cursor.next().is_some());
        assert_eq!(cursor.total(), 2);
    }
}
