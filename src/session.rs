//! Session data structure compatible with express-session

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Cookie data structure compatible with express-session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    /// Original max age in milliseconds (as set initially)
    #[serde(default)]
    pub original_max_age: Option<i64>,

    /// Expiration time
    #[serde(
        default,
        deserialize_with = "deserialize_expires",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires: Option<DateTime<Utc>>,

    /// Secure flag
    #[serde(default)]
    pub secure: bool,

    /// HttpOnly flag
    #[serde(default = "default_http_only")]
    pub http_only: bool,

    /// Cookie path
    #[serde(default = "default_path")]
    pub path: String,

    /// Cookie domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// SameSite attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,

    /// Attributes this type does not model (`priority`, `partitioned`, ...),
    /// kept so documents written by other applications round-trip
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// SameSite cookie attribute.
///
/// express-session accepts `true` (meaning strict) and `false` besides the
/// policy names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SameSite {
    Enabled(bool),
    Policy(String),
}

fn default_http_only() -> bool {
    true
}

fn default_path() -> String {
    "/".to_string()
}

impl Default for SessionCookie {
    fn default() -> Self {
        Self {
            original_max_age: None,
            expires: None,
            secure: false,
            http_only: true,
            path: "/".to_string(),
            domain: None,
            same_site: None,
            extra: Map::new(),
        }
    }
}

impl SessionCookie {
    /// Create a new session cookie with the given max age in seconds
    pub fn new(max_age_secs: u64) -> Self {
        let max_age_ms = i64::try_from(max_age_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        let expires = i64::try_from(max_age_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|max_age| Utc::now().checked_add_signed(max_age))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            original_max_age: Some(max_age_ms),
            expires: Some(expires),
            ..Default::default()
        }
    }

    /// Create a cookie expiring at a fixed point in time
    pub fn expiring_at(expires: DateTime<Utc>) -> Self {
        Self {
            expires: Some(expires),
            ..Default::default()
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        match self.expires {
            Some(exp) => exp < Utc::now(),
            None => false, // No expiry = browser session
        }
    }
}

/// Parse an expiry timestamp the way browsers and express-session emit them.
///
/// Accepts RFC 3339 timestamps, bare `YYYY-MM-DD` dates (midnight UTC) and
/// milliseconds since the Unix epoch.
pub fn parse_expiry(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn deserialize_expires<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_expiry(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid cookie expiry: {}", value))),
    }
}

/// Session data structure compatible with express-session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Cookie information
    #[serde(default)]
    pub cookie: SessionCookie,

    /// Additional session data (flattened at same level as cookie)
    #[serde(flatten)]
    pub data: HashMap<String, Value>,
}

impl SessionData {
    /// Create a new session data with the given max age in seconds
    pub fn new(max_age_secs: u64) -> Self {
        Self {
            cookie: SessionCookie::new(max_age_secs),
            data: HashMap::new(),
        }
    }

    /// Create session data whose cookie carries no expiry
    pub fn without_expiry() -> Self {
        Self::default()
    }

    /// Get a value from session data
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a value in session data
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.to_string(), v);
        }
    }

    /// Remove a value from session data
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Check if session data is empty (no user data)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_expiry_formats() {
        let midnight = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_expiry(&json!("2099-01-01")), Some(midnight));
        assert_eq!(parse_expiry(&json!("2099-01-01T00:00:00Z")), Some(midnight));
        assert_eq!(parse_expiry(&json!("2099-01-01T01:00:00+01:00")), Some(midnight));
        assert_eq!(
            parse_expiry(&json!(midnight.timestamp_millis())),
            Some(midnight)
        );
        assert_eq!(parse_expiry(&json!("next tuesday")), None);
        assert_eq!(parse_expiry(&json!(true)), None);
    }

    #[test]
    fn test_session_data_from_express_json() {
        let data: SessionData = serde_json::from_value(json!({
            "cookie": {"originalMaxAge": null, "expires": "2099-01-01", "httpOnly": true, "path": "/"},
            "userId": 42
        }))
        .unwrap();

        assert_eq!(data.get::<i64>("userId"), Some(42));
        assert!(!data.cookie.is_expired());
        assert_eq!(
            data.cookie.expires,
            Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_session_data_without_cookie_defaults() {
        let data: SessionData = serde_json::from_value(json!({"views": 3})).unwrap();
        assert_eq!(data.cookie, SessionCookie::default());
        assert_eq!(data.get::<u32>("views"), Some(3));
    }

    #[test]
    fn test_invalid_cookie_expiry_rejected() {
        let result: Result<SessionData, _> =
            serde_json::from_value(json!({"cookie": {"expires": "soon"}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_node_written_cookie_round_trips() {
        let stored = json!({
            "cookie": {
                "originalMaxAge": 3600000,
                "expires": "2099-01-01T00:00:00Z",
                "secure": false,
                "httpOnly": true,
                "path": "/",
                "sameSite": true,
                "priority": "high",
                "partitioned": true
            },
            "userId": 42
        });
        let data: SessionData = serde_json::from_value(stored.clone()).unwrap();
        assert_eq!(data.cookie.same_site, Some(SameSite::Enabled(true)));
        assert_eq!(data.cookie.extra["priority"], json!("high"));
        assert_eq!(data.get::<i64>("userId"), Some(42));

        assert_eq!(serde_json::to_value(&data).unwrap(), stored);
    }

    #[test]
    fn test_same_site_policy_name() {
        let cookie: SessionCookie = serde_json::from_value(json!({"sameSite": "lax"})).unwrap();
        assert_eq!(cookie.same_site, Some(SameSite::Policy("lax".to_string())));
        assert!(cookie.extra.is_empty());
    }

    #[test]
    fn test_huge_max_age_saturates() {
        let cookie = SessionCookie::new(u64::MAX);
        assert_eq!(cookie.original_max_age, Some(i64::MAX));
        assert_eq!(cookie.expires, Some(DateTime::<Utc>::MAX_UTC));
        assert!(!cookie.is_expired());
    }

    #[test]
    fn test_session_data_accessors() {
        let mut data = SessionData::new(60);
        assert!(data.is_empty());
        data.set("user", "alice");
        assert_eq!(data.get::<String>("user"), Some("alice".to_string()));
        assert_eq!(data.remove("user"), Some(json!("alice")));
        assert!(data.is_empty());
    }
}
