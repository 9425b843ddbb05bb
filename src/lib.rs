//! # salvo-arangodb-session
//!
//! Express-session compatible session store backed by ArangoDB.
//!
//! Session documents keep the express-session JSON verbatim, so Rust and
//! Node.js applications can share one session collection.
//!
//! ## Features
//!
//! - **Lazy connect**: the store can be used immediately; operations issued
//!   before the database and collection are provisioned wait and then run
//! - **One document per session**: upsert by example on a configurable
//!   identity field, with duplicate matches reported instead of repaired
//! - **Lazy expiry**: expired sessions are removed when they are read
//! - **Error listeners**: storage errors are returned to the caller and
//!   also delivered to any registered listener
//! - **Pluggable client**: the HTTP client talks to a real server, the
//!   in-memory client is for development and tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use salvo_arangodb_session::{ArangoStore, SessionData, SessionStore, StoreOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = StoreOptions::new("http://localhost:8529", "myapp")
//!         .with_credentials("root", "secret");
//!     let store = ArangoStore::connect(options)?;
//!
//!     let mut session = SessionData::new(86400);
//!     session.set("views", 1);
//!     store.set("session-id", &session).await?;
//!
//!     let loaded = store.get("session-id").await?;
//!     assert_eq!(loaded, Some(session));
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod ready;
pub mod session;
pub mod store;

pub use client::{DocumentClient, MemoryClient};
pub use codec::SessionRecord;
pub use config::StoreOptions;
pub use error::SessionError;
pub use events::{ErrorListener, ListenerId, OnceErrorListener};
pub use session::{SameSite, SessionCookie, SessionData};
pub use store::{ArangoStore, SessionStore};

#[cfg(feature = "arangodb")]
pub use client::ArangoClient;
