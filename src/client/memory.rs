//! In-memory document store
//!
//! This is primarily for development and testing.
//! It behaves like a single ArangoDB server: databases hold collections,
//! collections hold documents keyed by `_key`, and inserting a duplicate
//! key is a unique constraint violation.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use super::{
    matches_example, ClientError, Collection, Database, Document, DocumentClient, QueryCursor,
    KEY_FIELD,
};

type Collections = HashMap<String, BTreeMap<String, Document>>;

struct Inner {
    databases: RwLock<HashMap<String, Collections>>,
    paused: watch::Sender<bool>,
    unreachable: AtomicBool,
    failing: AtomicBool,
    failing_writes: AtomicBool,
    calls: Counters,
}

#[derive(Default)]
struct Counters {
    by_example: AtomicUsize,
    remove_by_example: AtomicUsize,
    update: AtomicUsize,
    insert: AtomicUsize,
}

/// Snapshot of how often each collection operation was called
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub by_example: usize,
    pub remove_by_example: usize,
    pub update: usize,
    pub insert: usize,
}

/// In-memory document store client
///
/// Clones share the same data. Besides the client interface it exposes
/// hooks to simulate an unavailable or misbehaving server.
pub struct MemoryClient {
    inner: Arc<Inner>,
}

impl MemoryClient {
    /// Create a store containing only the `_system` database
    pub fn new() -> Self {
        let mut databases = HashMap::new();
        databases.insert("_system".to_string(), Collections::new());
        let (paused, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                databases: RwLock::new(databases),
                paused,
                unreachable: AtomicBool::new(false),
                failing: AtomicBool::new(false),
                failing_writes: AtomicBool::new(false),
                calls: Counters::default(),
            }),
        }
    }

    /// Hold every call until [`resume`](Self::resume) is called
    pub fn pause(&self) {
        self.inner.paused.send_replace(true);
    }

    /// Release held calls
    pub fn resume(&self) {
        self.inner.paused.send_replace(false);
    }

    /// Make every call fail as if the server were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make collection operations fail with a server error
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only `insert` and `update` fail with a server error
    pub fn set_failing_writes(&self, failing: bool) {
        self.inner.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// How often each collection operation has been called
    pub fn calls(&self) -> CallCounts {
        let calls = &self.inner.calls;
        CallCounts {
            by_example: calls.by_example.load(Ordering::SeqCst),
            remove_by_example: calls.remove_by_example.load(Ordering::SeqCst),
            update: calls.update.load(Ordering::SeqCst),
            insert: calls.insert.load(Ordering::SeqCst),
        }
    }

    /// True if the database exists
    pub fn has_database(&self, name: &str) -> bool {
        self.inner.databases.read().contains_key(name)
    }

    /// True if the collection exists in the database
    pub fn has_collection(&self, database: &str, collection: &str) -> bool {
        self.inner
            .databases
            .read()
            .get(database)
            .map(|collections| collections.contains_key(collection))
            .unwrap_or(false)
    }

    /// Copy of every document in a collection, ordered by key
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.inner
            .databases
            .read()
            .get(database)
            .and_then(|collections| collections.get(collection))
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Write a document directly, creating the database and collection if needed.
    ///
    /// Bypasses availability hooks and the unique key check, so tests can
    /// seed states the store would normally refuse.
    pub fn put_raw(&self, database: &str, collection: &str, mut document: Document) -> String {
        let key = document_key(&document).unwrap_or_else(new_key);
        document.insert(KEY_FIELD.to_string(), Value::String(key.clone()));
        self.inner
            .databases
            .write()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), document);
        key
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryClient {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Inner {
    /// Wait while paused, then check reachability
    async fn enter(&self) -> Result<(), ClientError> {
        let mut paused = self.paused.subscribe();
        // The sender lives in `self`, so this only returns once resumed
        let _ = paused.wait_for(|paused| !*paused).await;

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ClientError::Unreachable(
                "connection refused (memory store offline)".to_string(),
            ));
        }
        Ok(())
    }

    /// Like `enter`, but also honours the failing switch
    async fn enter_collection(&self) -> Result<(), ClientError> {
        self.enter().await?;
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(())
    }

    async fn enter_write(&self) -> Result<(), ClientError> {
        self.enter_collection().await?;
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(())
    }
}

fn injected_failure() -> ClientError {
    ClientError::Api {
        status: 503,
        code: 503,
        message: "service unavailable (injected failure)".to_string(),
    }
}

fn new_key() -> String {
    Uuid::new_v4().simple().to_string()
}

fn document_key(document: &Document) -> Option<String> {
    document
        .get(KEY_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl DocumentClient for MemoryClient {
    type Database = MemoryDatabase;

    async fn list_databases(&self) -> Result<Vec<String>, ClientError> {
        self.inner.enter().await?;
        let mut names: Vec<String> = self.inner.databases.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_database(&self, name: &str) -> Result<(), ClientError> {
        self.inner.enter().await?;
        let mut databases = self.inner.databases.write();
        if databases.contains_key(name) {
            return Err(ClientError::Conflict(format!("duplicate database name '{}'", name)));
        }
        databases.insert(name.to_string(), Collections::new());
        Ok(())
    }

    fn database(&self, name: &str) -> MemoryDatabase {
        MemoryDatabase {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
        }
    }
}

/// Database handle of a [`MemoryClient`]
pub struct MemoryDatabase {
    inner: Arc<Inner>,
    name: String,
}

#[async_trait]
impl Database for MemoryDatabase {
    type Collection = MemoryCollection;

    async fn list_collections(&self) -> Result<Vec<String>, ClientError> {
        self.inner.enter().await?;
        let databases = self.inner.databases.read();
        let collections = databases
            .get(&self.name)
            .ok_or_else(|| ClientError::NotFound(format!("database '{}'", self.name)))?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str) -> Result<(), ClientError> {
        self.inner.enter().await?;
        let mut databases = self.inner.databases.write();
        let collections = databases
            .get_mut(&self.name)
            .ok_or_else(|| ClientError::NotFound(format!("database '{}'", self.name)))?;
        if collections.contains_key(name) {
            return Err(ClientError::Conflict(format!("duplicate collection name '{}'", name)));
        }
        collections.insert(name.to_string(), BTreeMap::new());
        Ok(())
    }

    fn collection(&self, name: &str) -> MemoryCollection {
        MemoryCollection {
            inner: Arc::clone(&self.inner),
            database: self.name.clone(),
            name: name.to_string(),
        }
    }
}

/// Collection handle of a [`MemoryClient`]
pub struct MemoryCollection {
    inner: Arc<Inner>,
    database: String,
    name: String,
}

impl MemoryCollection {
    fn not_found(&self) -> ClientError {
        ClientError::NotFound(format!("collection '{}/{}'", self.database, self.name))
    }

    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, Document>) -> T) -> Result<T, ClientError> {
        let databases = self.inner.databases.read();
        databases
            .get(&self.database)
            .and_then(|collections| collections.get(&self.name))
            .map(f)
            .ok_or_else(|| self.not_found())
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Document>) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut databases = self.inner.databases.write();
        let docs = databases
            .get_mut(&self.database)
            .and_then(|collections| collections.get_mut(&self.name))
            .ok_or_else(|| self.not_found())?;
        f(docs)
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn by_example(&self, example: &Document) -> Result<QueryCursor, ClientError> {
        self.inner.calls.by_example.fetch_add(1, Ordering::SeqCst);
        self.inner.enter_collection().await?;
        let found = self.read(|docs| {
            docs.values()
                .filter(|doc| matches_example(doc, example))
                .cloned()
                .collect()
        })?;
        Ok(QueryCursor::new(found))
    }

    async fn remove_by_example(&self, example: &Document) -> Result<u64, ClientError> {
        self.inner.calls.remove_by_example.fetch_add(1, Ordering::SeqCst);
        self.inner.enter_collection().await?;
        self.write(|docs| {
            let before = docs.len();
            docs.retain(|_, doc| !matches_example(doc, example));
            Ok((before - docs.len()) as u64)
        })
    }

    async fn update(&self, key: &str, document: &Document) -> Result<(), ClientError> {
        self.inner.calls.update.fetch_add(1, Ordering::SeqCst);
        self.inner.enter_write().await?;
        self.write(|docs| {
            let stored = docs
                .get_mut(key)
                .ok_or_else(|| ClientError::NotFound(format!("document '{}'", key)))?;
            for (field, value) in document {
                if field != KEY_FIELD {
                    stored.insert(field.clone(), value.clone());
                }
            }
            Ok(())
        })
    }

    async fn insert(&self, document: &Document) -> Result<String, ClientError> {
        self.inner.calls.insert.fetch_add(1, Ordering::SeqCst);
        self.inner.enter_write().await?;
        let key = document_key(document).unwrap_or_else(new_key);
        self.write(|docs| {
            if docs.contains_key(&key) {
                return Err(ClientError::Conflict(format!("document key '{}'", key)));
            }
            let mut stored = document.clone();
            stored.insert(KEY_FIELD.to_string(), Value::String(key.clone()));
            docs.insert(key.clone(), stored);
            Ok(key)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_memory_client_provisioning() {
        let client = MemoryClient::new();
        assert_eq!(client.list_databases().await.unwrap(), vec!["_system"]);

        client.create_database("app").await.unwrap();
        assert!(client.has_database("app"));
        assert!(client.create_database("app").await.is_err());

        let db = client.database("app");
        assert!(db.list_collections().await.unwrap().is_empty());
        db.create_collection("sessions").await.unwrap();
        assert_eq!(db.list_collections().await.unwrap(), vec!["sessions"]);
    }

    #[tokio::test]
    async fn test_memory_client_documents() {
        let client = MemoryClient::new();
        client.create_database("app").await.unwrap();
        let db = client.database("app");
        db.create_collection("sessions").await.unwrap();
        let sessions = db.collection("sessions");

        let key = sessions.insert(&doc(json!({"sid": "a", "n": 1}))).await.unwrap();
        sessions.insert(&doc(json!({"_key": "fixed", "sid": "b"}))).await.unwrap();
        assert!(matches!(
            sessions.insert(&doc(json!({"_key": "fixed"}))).await,
            Err(ClientError::Conflict(_))
        ));

        sessions.update(&key, &doc(json!({"n": 2}))).await.unwrap();
        let mut cursor = sessions.by_example(&doc(json!({"sid": "a"}))).await.unwrap();
        assert_eq!(cursor.total(), 1);
        assert_eq!(cursor.next().unwrap()["n"], json!(2));

        assert_eq!(sessions.remove_by_example(&Document::new()).await.unwrap(), 2);
        assert_eq!(client.documents("app", "sessions").len(), 0);
        assert_eq!(client.calls().insert, 3);
    }

    #[tokio::test]
    async fn test_memory_client_update_replaces_objects() {
        let client = MemoryClient::new();
        let stored = doc(json!({"_key": "s", "sid": "s", "session": {"a": 1, "b": 2}}));
        client.put_raw("app", "sessions", stored);
        let sessions = client.database("app").collection("sessions");

        sessions.update("s", &doc(json!({"session": {"a": 1}}))).await.unwrap();
        let stored = client.documents("app", "sessions");
        assert_eq!(stored[0]["session"], json!({"a": 1}));
        assert_eq!(stored[0]["sid"], json!("s"));
    }

    #[tokio::test]
    async fn test_memory_client_missing_collection() {
        let client = MemoryClient::new();
        let sessions = client.database("_system").collection("nope");
        assert!(matches!(
            sessions.by_example(&Document::new()).await,
            Err(ClientError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_client_failure_hooks() {
        let client = MemoryClient::new();
        client.set_unreachable(true);
        assert!(matches!(
            client.list_databases().await,
            Err(ClientError::Unreachable(_))
        ));

        client.set_unreachable(false);
        client.put_raw("app", "sessions", Document::new());
        client.set_failing(true);
        let sessions = client.database("app").collection("sessions");
        assert!(matches!(
            sessions.by_example(&Document::new()).await,
            Err(ClientError::Api { status: 503, .. })
        ));
    }
}
