//! Conversion between session data and stored session documents
//!
//! A session document looks like:
//!
//! ```json
//! { "<idField>": "abc", "session": { "cookie": { ... }, "userId": 42 }, "expires": "2099-01-01T00:00:00Z" }
//! ```
//!
//! `expires` is store metadata only and is never handed back to callers.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::client::Document;
use crate::error::SessionError;
use crate::session::{parse_expiry, SessionData};

/// Document field holding the session data
pub const SESSION_FIELD: &str = "session";

/// Document field holding the absolute expiry
pub const EXPIRES_FIELD: &str = "expires";

/// One persisted session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub session: Map<String, Value>,
    /// `None` means the record never expires
    pub expires: Option<DateTime<Utc>>,
}

/// Query matching the documents of one session id
pub fn id_example(id_field: &str, id: &str) -> Document {
    let mut example = Document::new();
    example.insert(id_field.to_string(), Value::String(id.to_string()));
    example
}

impl SessionRecord {
    /// Build the record for `session`.
    ///
    /// The cookie is stored in its canonical serialized form. The expiry is
    /// the cookie's when it carries one, otherwise `now + default_ttl`.
    pub fn encode(id: &str, session: &SessionData, default_ttl: Duration) -> Result<Self, SessionError> {
        let session_map = match serde_json::to_value(session)? {
            Value::Object(map) => map,
            other => {
                return Err(SessionError::Serialization(serde::ser::Error::custom(format!(
                    "session serialized to {} instead of an object",
                    other
                ))))
            }
        };

        let expires = session
            .cookie
            .expires
            .unwrap_or_else(|| expiry_from_now(default_ttl));

        Ok(Self {
            id: id.to_string(),
            session: session_map,
            expires: Some(expires),
        })
    }

    /// Document form, tagged with the identity field
    pub fn to_document(&self, id_field: &str) -> Document {
        let mut document = id_example(id_field, &self.id);
        document.insert(SESSION_FIELD.to_string(), Value::Object(self.session.clone()));
        document.insert(
            EXPIRES_FIELD.to_string(),
            self.expires
                .map(|at| Value::String(at.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
        document
    }

    /// Read a stored document.
    ///
    /// A missing or null `expires` means the record never expires; one that
    /// cannot be parsed is treated as already expired.
    pub fn from_document(id_field: &str, mut document: Document) -> Self {
        let id = match document.remove(id_field) {
            Some(Value::String(id)) => id,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let session = match document.remove(SESSION_FIELD) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let expires = match document.remove(EXPIRES_FIELD) {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_expiry(&value).unwrap_or_else(|| {
                tracing::warn!(sid = %id, expires = %value, "unreadable session expiry, treating as expired");
                DateTime::<Utc>::MIN_UTC
            })),
        };

        Self { id, session, expires }
    }

    /// True when the record has an expiry at or before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires, Some(expires) if now >= expires)
    }

    /// Session data as handed back to callers
    pub fn decode(self) -> Result<SessionData, SessionError> {
        Ok(serde_json::from_value(Value::Object(self.session))?)
    }
}

/// Absolute expiry `ttl` from now, saturating far in the future
pub fn expiry_from_now(ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn session(value: Value) -> SessionData {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_encode_uses_cookie_expiry() {
        let data = session(json!({"cookie": {"expires": "2099-01-01"}, "userId": 42}));
        let record = SessionRecord::encode("abc", &data, Duration::from_secs(60)).unwrap();

        assert_eq!(
            record.expires,
            Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(record.session["userId"], json!(42));
        // cookie stored canonically
        assert_eq!(record.session["cookie"]["expires"], json!("2099-01-01T00:00:00Z"));
        assert_eq!(record.session["cookie"]["httpOnly"], json!(true));
    }

    #[test]
    fn test_encode_falls_back_to_default_ttl() {
        let data = SessionData::without_expiry();
        let before = Utc::now();
        let record = SessionRecord::encode("abc", &data, Duration::from_secs(3600)).unwrap();

        let expires = record.expires.unwrap();
        assert!(expires >= before + chrono::Duration::seconds(3600));
        assert!(expires <= Utc::now() + chrono::Duration::seconds(3600));
    }

    #[test]
    fn test_document_shape() {
        let data = session(json!({"cookie": {"expires": "2099-01-01"}, "n": 1}));
        let record = SessionRecord::encode("abc", &data, Duration::from_secs(1)).unwrap();
        let document = record.to_document("sid");

        assert_eq!(document["sid"], json!("abc"));
        assert_eq!(document["expires"], json!("2099-01-01T00:00:00+00:00"));
        assert_eq!(document["session"]["n"], json!(1));
        assert_eq!(SessionRecord::from_document("sid", document), record);
    }

    #[test]
    fn test_decode_returns_session_without_metadata() {
        let data = session(json!({"cookie": {"expires": "2099-01-01"}, "userId": 42}));
        let record = SessionRecord::encode("abc", &data, Duration::from_secs(1)).unwrap();
        assert_eq!(record.decode().unwrap(), data);
    }

    #[test]
    fn test_expiry_rules() {
        let now = Utc::now();
        let mut doc = id_example("_key", "abc");
        let record = SessionRecord::from_document("_key", doc.clone());
        assert_eq!(record.expires, None);
        assert!(!record.is_expired_at(now));

        doc.insert("expires".into(), json!(now.to_rfc3339()));
        assert!(SessionRecord::from_document("_key", doc.clone()).is_expired_at(now));

        doc.insert("expires".into(), json!("garbage"));
        assert!(SessionRecord::from_document("_key", doc).is_expired_at(now));
    }

    #[test]
    fn test_expiry_from_now_saturates() {
        assert_eq!(expiry_from_now(Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
