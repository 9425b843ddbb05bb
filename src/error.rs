//! Session error types

use thiserror::Error;

use crate::client::ClientError;

/// Errors that can occur during session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Store options failed validation at construction time
    #[error("Invalid store options: {0}")]
    InvalidOptions(String),

    /// A call against the document store failed
    #[error("{message}: {source}")]
    Store {
        message: String,
        #[source]
        source: ClientError,
    },

    /// More than one document matched a session id.
    ///
    /// The store never repairs this; it indicates the one-document-per-id
    /// invariant has already been broken.
    #[error("query by example returned {count} documents for session {id}, expected at most 1")]
    DuplicateSessions { id: String, count: usize },

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Optional store operation that this backend does not provide
    #[error("{0} not implemented")]
    Unsupported(&'static str),
}

impl SessionError {
    /// Wrap a client failure with an operation specific message
    pub fn store<S: Into<String>>(message: S, source: ClientError) -> Self {
        SessionError::Store {
            message: message.into(),
            source,
        }
    }

    /// True for the invariant violation raised when an id matches several documents
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SessionError::DuplicateSessions { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_message_keeps_context() {
        let err = SessionError::store("Error finding abc", ClientError::Unreachable("refused".into()));
        assert_eq!(err.to_string(), "Error finding abc: document store unreachable: refused");
    }

    #[test]
    fn test_duplicate_detection() {
        let err = SessionError::DuplicateSessions {
            id: "abc".into(),
            count: 2,
        };
        assert!(err.is_duplicate());
        assert!(!SessionError::Unsupported("length").is_duplicate());
    }
}
