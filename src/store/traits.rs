//! Session store trait

use async_trait::async_trait;

use crate::error::SessionError;
use crate::events::{ErrorListener, ListenerId, OnceErrorListener};
use crate::session::SessionData;

/// Trait for session storage backends
///
/// This trait is designed to be compatible with the express-session store
/// interface: `get`/`set`/`destroy` are required, `clear`, `touch` and the
/// enumeration methods are optional, and storage errors can be observed
/// through error listeners in addition to being returned.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Get a session by ID
    ///
    /// Returns None if the session doesn't exist or has expired
    async fn get(&self, sid: &str) -> Result<Option<SessionData>, SessionError>;

    /// Create or replace a session
    ///
    /// The expiry is taken from the session cookie, or the store default
    async fn set(&self, sid: &str, session: &SessionData) -> Result<(), SessionError>;

    /// Destroy/delete a session. Destroying a missing session is not an error.
    async fn destroy(&self, sid: &str) -> Result<(), SessionError>;

    /// Touch a session - refresh its expiry without modifying data
    async fn touch(&self, sid: &str, session: &SessionData) -> Result<(), SessionError> {
        self.set(sid, session).await
    }

    /// Clear all sessions (optional)
    async fn clear(&self) -> Result<(), SessionError> {
        Err(SessionError::Unsupported("clear"))
    }

    /// Get the count of all live sessions (optional)
    async fn length(&self) -> Result<usize, SessionError> {
        Err(SessionError::Unsupported("length"))
    }

    /// Get all live session IDs (optional)
    async fn ids(&self) -> Result<Vec<String>, SessionError> {
        Err(SessionError::Unsupported("ids"))
    }

    /// Get all live sessions (optional)
    async fn all(&self) -> Result<Vec<SessionData>, SessionError> {
        Err(SessionError::Unsupported("all"))
    }

    /// Subscribe to every storage error
    fn on_error(&self, listener: ErrorListener) -> ListenerId;

    /// Subscribe to the next storage error
    fn once_error(&self, listener: OnceErrorListener) -> ListenerId;

    /// Remove an error listener
    fn remove_error_listener(&self, id: ListenerId) -> bool;
}
