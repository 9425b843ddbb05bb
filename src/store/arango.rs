//! ArangoDB session store
//!
//! Sessions are stored one document per session id in a single collection:
//! - Identity: the configured id field (default `_key`) holds the session id
//! - Value: the express-session JSON under `session`
//! - Expiry: absolute timestamp under `expires`, checked lazily on `get`
//!
//! The store is usable as soon as it is constructed. Provisioning of the
//! database and collection runs in the background, and every operation
//! issued before it finishes waits for it.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error};

use super::bootstrap;
use super::SessionStore;
use crate::client::{ClientError, Collection, Database, Document, DocumentClient, KEY_FIELD};
use crate::codec::{expiry_from_now, id_example, SessionRecord, EXPIRES_FIELD};
use crate::config::StoreOptions;
use crate::error::SessionError;
use crate::events::{ErrorChannel, ErrorListener, ListenerId, OnceErrorListener};
use crate::ready::Readiness;
use crate::session::SessionData;

type CollectionOf<C> = <<C as DocumentClient>::Database as Database>::Collection;

struct Shared<C: DocumentClient> {
    options: StoreOptions,
    collection: CollectionOf<C>,
    ready: Readiness,
    errors: ErrorChannel,
}

/// Session store backed by an ArangoDB collection
///
/// Upserts are a query followed by an insert or an update, not an atomic
/// store primitive: two concurrent `set` calls for the same new id can both
/// insert. With the default `_key` identity field the second insert fails
/// with a unique constraint error instead.
///
/// # Example
///
/// ```rust,ignore
/// use salvo_arangodb_session::{ArangoStore, StoreOptions};
///
/// let options = StoreOptions::new("http://localhost:8529", "myapp");
/// let store = ArangoStore::connect(options)?;
/// store.ready().await;
/// ```
pub struct ArangoStore<C: DocumentClient> {
    shared: Arc<Shared<C>>,
}

impl<C: DocumentClient> ArangoStore<C> {
    /// Create a store over `client` and start provisioning in the background.
    ///
    /// Must be called from within a Tokio runtime. Fails immediately if the
    /// options are invalid.
    pub fn new(options: StoreOptions, client: C) -> Result<Self, SessionError> {
        Self::with_ready_callback(options, client, || {})
    }

    /// Like [`new`](Self::new), calling `on_ready` once provisioning succeeds
    pub fn with_ready_callback<F>(options: StoreOptions, client: C, on_ready: F) -> Result<Self, SessionError>
    where
        F: FnOnce() + Send + 'static,
    {
        options.validate()?;

        let collection = client.database(&options.db_name).collection(&options.collection);
        let store = Self {
            shared: Arc::new(Shared {
                collection,
                ready: Readiness::new(),
                errors: ErrorChannel::new(),
                options,
            }),
        };

        let shared = Arc::clone(&store.shared);
        let db_name = shared.options.db_name.clone();
        let collection = shared.options.collection.clone();
        tokio::spawn(bootstrap::run(client, db_name, collection, move || {
            shared.ready.signal();
            on_ready();
        }));

        Ok(store)
    }

    /// Store options
    pub fn options(&self) -> &StoreOptions {
        &self.shared.options
    }

    /// True once the database and collection are known to exist
    pub fn is_ready(&self) -> bool {
        self.shared.ready.is_ready()
    }

    /// Wait until the store is ready. Never resolves if provisioning failed.
    pub async fn ready(&self) {
        self.shared.ready.wait().await
    }

    /// Park the calling operation until ready
    async fn defer(&self, operation: &'static str) {
        if !self.shared.ready.is_ready() {
            debug!(operation, "session store not ready, deferring");
            self.shared.ready.wait().await;
        }
    }

    fn collection(&self) -> &CollectionOf<C> {
        &self.shared.collection
    }

    fn example(&self, sid: &str) -> Document {
        id_example(&self.shared.options.id_field, sid)
    }

    /// Wrap a client failure and route it through the error listeners
    fn report(&self, message: String, source: ClientError) -> SessionError {
        self.shared.errors.handle(SessionError::store(message, source))
    }

    fn duplicate(&self, sid: &str, count: usize) -> SessionError {
        error!(sid, count, "more than one session document for id");
        SessionError::DuplicateSessions {
            id: sid.to_string(),
            count,
        }
    }

    /// The single document stored for `sid`, if any
    async fn find_one(&self, sid: &str) -> Result<Option<Document>, SessionError> {
        let mut cursor = self
            .collection()
            .by_example(&self.example(sid))
            .await
            .map_err(|e| self.report(format!("Error finding {}", sid), e))?;

        match cursor.total() {
            0 | 1 => Ok(cursor.next()),
            n => Err(self.duplicate(sid, n)),
        }
    }

    /// Every stored record that has not expired
    async fn live_records(&self) -> Result<Vec<SessionRecord>, SessionError> {
        let cursor = self
            .collection()
            .by_example(&Document::new())
            .await
            .map_err(|e| self.report("Error listing sessions".to_string(), e))?;

        let now = Utc::now();
        Ok(cursor
            .map(|document| SessionRecord::from_document(&self.shared.options.id_field, document))
            .filter(|record| !record.is_expired_at(now))
            .collect())
    }
}

impl<C: DocumentClient> Clone for ArangoStore<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[cfg(feature = "arangodb")]
impl ArangoStore<crate::client::ArangoClient> {
    /// Connect to the ArangoDB server named in the options
    pub fn connect(options: StoreOptions) -> Result<Self, SessionError> {
        options.validate()?;
        let client = crate::client::ArangoClient::from_options(&options)?;
        Self::new(options, client)
    }
}

/// Key under which the store keeps `document`
fn stored_key(document: &Document) -> Result<String, ClientError> {
    document
        .get(KEY_FIELD)
        .and_then(|key| key.as_str())
        .map(str::to_string)
        .ok_or_else(|| ClientError::NotFound("key of stored session document".to_string()))
}

#[async_trait]
impl<C: DocumentClient> SessionStore for ArangoStore<C> {
    async fn get(&self, sid: &str) -> Result<Option<SessionData>, SessionError> {
        self.defer("get").await;

        let Some(document) = self.find_one(sid).await? else {
            return Ok(None);
        };

        let record = SessionRecord::from_document(&self.shared.options.id_field, document);
        if record.is_expired_at(Utc::now()) {
            debug!(sid, "session expired, removing");
            self.destroy(sid).await?;
            return Ok(None);
        }

        record
            .decode()
            .map(Some)
            .map_err(|e| self.shared.errors.handle(e))
    }

    async fn set(&self, sid: &str, session: &SessionData) -> Result<(), SessionError> {
        self.defer("set").await;

        let id_field = &self.shared.options.id_field;
        let record = SessionRecord::encode(sid, session, self.shared.options.expires)
            .map_err(|e| self.shared.errors.handle(e))?;
        let mut document = record.to_document(id_field);

        match self.find_one(sid).await? {
            None => {
                self.collection()
                    .insert(&document)
                    .await
                    .map_err(|e| self.report(format!("Error inserting {}", sid), e))?;
            }
            Some(existing) => {
                let key = stored_key(&existing)
                    .map_err(|e| self.report(format!("Error updating {}", sid), e))?;
                document.insert(KEY_FIELD.to_string(), key.clone().into());
                self.collection()
                    .update(&key, &document)
                    .await
                    .map_err(|e| self.report(format!("Error updating {}", sid), e))?;
            }
        }
        Ok(())
    }

    async fn destroy(&self, sid: &str) -> Result<(), SessionError> {
        self.defer("destroy").await;

        let removed = self
            .collection()
            .remove_by_example(&self.example(sid))
            .await
            .map_err(|e| self.report(format!("Error destroying {}", sid), e))?;
        debug!(sid, removed, "session destroyed");
        Ok(())
    }

    async fn touch(&self, sid: &str, session: &SessionData) -> Result<(), SessionError> {
        self.defer("touch").await;

        let Some(existing) = self.find_one(sid).await? else {
            return Ok(());
        };

        let expires = session
            .cookie
            .expires
            .unwrap_or_else(|| expiry_from_now(self.shared.options.expires));
        let mut patch = Document::new();
        patch.insert(EXPIRES_FIELD.to_string(), expires.to_rfc3339().into());

        let key = stored_key(&existing)
            .map_err(|e| self.report(format!("Error touching {}", sid), e))?;
        self.collection()
            .update(&key, &patch)
            .await
            .map_err(|e| self.report(format!("Error touching {}", sid), e))
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.defer("clear").await;

        self.collection()
            .remove_by_example(&Document::new())
            .await
            .map_err(|e| self.report("Error clearing all sessions".to_string(), e))?;
        Ok(())
    }

    async fn length(&self) -> Result<usize, SessionError> {
        self.defer("length").await;
        Ok(self.live_records().await?.len())
    }

    async fn ids(&self) -> Result<Vec<String>, SessionError> {
        self.defer("ids").await;
        Ok(self
            .live_records()
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect())
    }

    async fn all(&self) -> Result<Vec<SessionData>, SessionError> {
        self.defer("all").await;
        self.live_records()
            .await?
            .into_iter()
            .map(SessionRecord::decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.shared.errors.handle(e))
    }

    fn on_error(&self, listener: ErrorListener) -> ListenerId {
        self.shared.errors.on(listener)
    }

    fn once_error(&self, listener: OnceErrorListener) -> ListenerId {
        self.shared.errors.once(listener)
    }

    fn remove_error_listener(&self, id: ListenerId) -> bool {
        self.shared.errors.remove(id)
    }
}
