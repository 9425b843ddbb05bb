//! Store configuration

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::client::KEY_FIELD;
use crate::error::SessionError;

/// Default ArangoDB endpoint
pub const DEFAULT_URL: &str = "http://localhost:8529";

/// Default collection holding session documents
pub const DEFAULT_COLLECTION: &str = "sessions";

/// Default session lifetime when the cookie carries no expiry (2 weeks)
pub const DEFAULT_EXPIRES: Duration = Duration::from_secs(60 * 60 * 24 * 14);

/// Configuration for the ArangoDB session store
///
/// Every store owns its own copy; nothing is shared or mutated after the
/// store is constructed.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreOptions {
    /// Store endpoint (default: "http://localhost:8529")
    pub url: String,

    /// Target database, created if absent (required)
    pub db_name: String,

    /// Target collection, created if absent (default: "sessions")
    pub collection: String,

    /// Options passed through to the store client (default: empty)
    pub connection_options: Map<String, Value>,

    /// Session lifetime used when the cookie carries no expiry (default: 14 days).
    /// Given in milliseconds when read from JSON.
    #[serde(deserialize_with = "duration_from_millis")]
    pub expires: Duration,

    /// Document field holding the session id (default: "_key")
    pub id_field: String,

    /// Basic auth user
    pub user: Option<String>,

    /// Basic auth password
    pub password: Option<String>,
}

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            db_name: String::new(),
            collection: DEFAULT_COLLECTION.to_string(),
            connection_options: Map::new(),
            expires: DEFAULT_EXPIRES,
            id_field: KEY_FIELD.to_string(),
            user: None,
            password: None,
        }
    }
}

impl StoreOptions {
    /// Create options for the given endpoint and database
    pub fn new<U: Into<String>, D: Into<String>>(url: U, db_name: D) -> Self {
        Self {
            url: url.into(),
            db_name: db_name.into(),
            ..Default::default()
        }
    }

    /// Layer a JSON options object over the defaults.
    ///
    /// `url` and `dbName` must be present. Unknown keys are ignored.
    pub fn from_value(value: Value) -> Result<Self, SessionError> {
        let object = value
            .as_object()
            .ok_or_else(|| SessionError::InvalidOptions("options is not an object".to_string()))?;
        for required in ["url", "dbName"] {
            if !object.contains_key(required) {
                return Err(SessionError::InvalidOptions(format!(
                    "{} not provided",
                    required
                )));
            }
        }

        let options: StoreOptions = serde_json::from_value(value)
            .map_err(|e| SessionError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Set the collection name (default: "sessions")
    pub fn with_collection<S: Into<String>>(mut self, collection: S) -> Self {
        self.collection = collection.into();
        self
    }

    /// Replace the client connection options
    pub fn with_connection_options(mut self, options: Map<String, Value>) -> Self {
        self.connection_options = options;
        self
    }

    /// Set a single client connection option
    pub fn with_connection_option<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.connection_options.insert(key.into(), value);
        self
    }

    /// Set the default session lifetime (default: 14 days)
    pub fn with_expires(mut self, expires: Duration) -> Self {
        self.expires = expires;
        self
    }

    /// Set the identity field (default: "_key")
    pub fn with_id_field<S: Into<String>>(mut self, id_field: S) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Set basic auth credentials
    pub fn with_credentials<U: Into<String>, P: Into<String>>(mut self, user: U, password: P) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Credentials, only when both user and password are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user.as_str(), password.as_str()))
            }
            _ => None,
        }
    }

    /// Check the construction preconditions
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |msg: &str| -> Result<(), SessionError> {
            Err(SessionError::InvalidOptions(msg.to_string()))
        };

        if self.url.is_empty() {
            return invalid("url not provided");
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return invalid("url must start with http:// or https://");
        }
        if self.db_name.is_empty() {
            return invalid("dbName not provided");
        }
        if self.collection.is_empty() {
            return invalid("collection must not be empty");
        }
        if self.id_field.is_empty() {
            return invalid("idField must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = StoreOptions::new(DEFAULT_URL, "app");
        assert_eq!(options.collection, "sessions");
        assert_eq!(options.id_field, "_key");
        assert_eq!(options.expires, Duration::from_millis(1_209_600_000));
        assert!(options.connection_options.is_empty());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_from_value_layers_over_defaults() {
        let options = StoreOptions::from_value(json!({
            "url": "http://db:8529",
            "dbName": "app",
            "expires": 60000,
            "idField": "sid",
            "connectionOptions": {"timeout": 500}
        }))
        .unwrap();

        assert_eq!(options.url, "http://db:8529");
        assert_eq!(options.collection, "sessions");
        assert_eq!(options.expires, Duration::from_secs(60));
        assert_eq!(options.id_field, "sid");
        assert_eq!(options.connection_options["timeout"], json!(500));
    }

    #[test]
    fn test_from_value_does_not_leak_between_instances() {
        let first = StoreOptions::from_value(json!({
            "url": "http://a:8529", "dbName": "a", "collection": "custom"
        }))
        .unwrap();
        let second = StoreOptions::from_value(json!({"url": "http://b:8529", "dbName": "b"})).unwrap();

        assert_eq!(first.collection, "custom");
        assert_eq!(second.collection, "sessions");
    }

    #[test]
    fn test_preconditions() {
        assert!(StoreOptions::from_value(json!(null)).is_err());
        assert!(StoreOptions::from_value(json!({"dbName": "app"})).is_err());
        assert!(StoreOptions::from_value(json!({"url": "http://db:8529"})).is_err());
        assert!(StoreOptions::from_value(json!({"url": "", "dbName": "app"})).is_err());
        assert!(StoreOptions::from_value(json!({"url": "http://db", "dbName": 7})).is_err());
        assert!(StoreOptions::new("db:8529", "app").validate().is_err());
        assert!(StoreOptions::new(DEFAULT_URL, "").validate().is_err());
        assert!(StoreOptions::new(DEFAULT_URL, "app")
            .with_id_field("")
            .validate()
            .is_err());
    }

    #[test]
    fn test_credentials_need_user_and_password() {
        let options = StoreOptions::new(DEFAULT_URL, "app");
        assert_eq!(options.credentials(), None);

        let mut options = options.with_credentials("root", "secret");
        assert_eq!(options.credentials(), Some(("root", "secret")));

        options.password = None;
        assert_eq!(options.credentials(), None);
    }
}
