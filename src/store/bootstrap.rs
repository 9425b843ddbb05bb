//! Connection bootstrap
//!
//! Runs once per store, in the background: make sure the target database
//! and collection exist, then flip the store to ready. If any step fails
//! the store is never marked ready and parked operations stay parked.

use tracing::{debug, info, warn};

use crate::client::{ClientError, Database, DocumentClient};

/// Ensure `db_name` and its `collection` exist, creating whichever is missing
pub async fn provision<C: DocumentClient>(
    client: &C,
    db_name: &str,
    collection: &str,
) -> Result<(), ClientError> {
    let databases = client.list_databases().await?;
    if databases.iter().any(|name| name == db_name) {
        debug!(database = db_name, "database exists");
    } else {
        info!(database = db_name, "creating database");
        client.create_database(db_name).await?;
    }

    let database = client.database(db_name);
    let collections = database.list_collections().await?;
    if collections.iter().any(|name| name == collection) {
        debug!(database = db_name, collection, "collection exists");
    } else {
        info!(database = db_name, collection, "creating collection");
        database.create_collection(collection).await?;
    }

    Ok(())
}

/// Provision, then run `on_ready` exactly once. Failures are logged, not retried.
pub async fn run<C, F>(client: C, db_name: String, collection: String, on_ready: F)
where
    C: DocumentClient,
    F: FnOnce(),
{
    match provision(&client, &db_name, &collection).await {
        Ok(()) => {
            debug!(database = %db_name, collection = %collection, "session store ready");
            on_ready();
        }
        Err(e) => {
            warn!(
                error = %e,
                database = %db_name,
                "failed to talk to ArangoDB, maybe the service isn't running? session operations will wait indefinitely"
            );
        }
    }
}
