//! Basic example using the in-memory document store
//!
//! Swap `MemoryClient` for `ArangoStore::connect` to run against a real server.

use std::sync::Arc;
use std::time::Duration;

use salvo_arangodb_session::{
    ArangoStore, MemoryClient, SessionData, SessionError, SessionStore, StoreOptions,
};

#[tokio::main]
async fn main() -> Result<(), SessionError> {
    // Set up logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let client = MemoryClient::new();
    let options = StoreOptions::new("http://localhost:8529", "demo")
        .with_expires(Duration::from_secs(3600));

    let store = ArangoStore::with_ready_callback(options, client.clone(), || {
        println!("Store ready");
    })?;

    store.on_error(Arc::new(|e: &SessionError| {
        eprintln!("Session store error: {}", e);
    }));

    // Issued before provisioning finishes; runs once the store is ready
    let mut session = SessionData::new(3600);
    session.set("user", "alice");
    session.set("views", 1);
    store.set("demo-session", &session).await?;

    let loaded = store.get("demo-session").await?.expect("session was just stored");
    println!(
        "Loaded session for {}, views = {}",
        loaded.get::<String>("user").unwrap_or_default(),
        loaded.get::<i32>("views").unwrap_or(0)
    );
    println!("Stored documents: {:#?}", client.documents("demo", "sessions"));

    println!("Live sessions: {:?}", store.ids().await?);

    store.destroy("demo-session").await?;
    println!("After destroy: {:?}", store.get("demo-session").await?);

    // Failures are returned and also delivered to the listener
    client.set_failing(true);
    if let Err(e) = store.clear().await {
        println!("clear failed as expected: {}", e);
    }

    Ok(())
}
