//! ArangoDB HTTP client
//!
//! Talks to the ArangoDB REST API:
//! - databases: `/_api/database`, `/_api/database/user`
//! - collections: `/_db/{db}/_api/collection`
//! - queries by example: AQL through `/_db/{db}/_api/cursor`
//! - documents: `/_db/{db}/_api/document/{collection}[/{key}]`

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{ClientError, Collection, Database, Document, DocumentClient, QueryCursor};
use crate::config::StoreOptions;
use crate::error::SessionError;

/// ArangoDB error number for a unique constraint violation
const ERROR_UNIQUE_CONSTRAINT: i64 = 1210;
/// ArangoDB error numbers for missing databases, collections and documents
const ERRORS_NOT_FOUND: [i64; 3] = [1202, 1203, 1228];
/// ArangoDB error number for an existing database or collection name
const ERROR_DUPLICATE_NAME: i64 = 1207;

struct Connection {
    http: reqwest::Client,
    base_url: String,
    auth: Option<(String, String)>,
}

/// HTTP client for an ArangoDB server
///
/// Clones share one connection pool.
#[derive(Clone)]
pub struct ArangoClient {
    conn: Arc<Connection>,
}

impl ArangoClient {
    /// Create a client for the server at `url`
    pub fn new(url: &str) -> Result<Self, ClientError> {
        Ok(Self::from_parts(reqwest::Client::builder().build()?, url, None))
    }

    /// Create a client from store options: url, credentials and connection options.
    ///
    /// Recognised connection options are `headers` (object of header values
    /// sent with every request) and `timeout` (request timeout in ms).
    pub fn from_options(options: &StoreOptions) -> Result<Self, SessionError> {
        let mut builder = reqwest::Client::builder();

        for (name, value) in &options.connection_options {
            match (name.as_str(), value) {
                ("headers", Value::Object(headers)) => {
                    builder = builder.default_headers(header_map(headers)?);
                }
                ("timeout", Value::Number(ms)) => {
                    let ms = ms.as_u64().ok_or_else(|| {
                        SessionError::InvalidOptions(format!("invalid timeout: {}", ms))
                    })?;
                    builder = builder.timeout(Duration::from_millis(ms));
                }
                ("headers" | "timeout", other) => {
                    return Err(SessionError::InvalidOptions(format!(
                        "invalid connection option {}: {}",
                        name, other
                    )));
                }
                _ => tracing::debug!(option = %name, "ignoring unknown connection option"),
            }
        }

        let http = builder
            .build()
            .map_err(|e| SessionError::InvalidOptions(format!("failed to build HTTP client: {}", e)))?;
        let auth = options
            .credentials()
            .map(|(user, password)| (user.to_string(), password.to_string()));

        Ok(Self::from_parts(http, &options.url, auth))
    }

    fn from_parts(http: reqwest::Client, url: &str, auth: Option<(String, String)>) -> Self {
        Self {
            conn: Arc::new(Connection {
                http,
                base_url: url.trim_end_matches('/').to_string(),
                auth,
            }),
        }
    }

    /// Use basic auth for every request
    pub fn with_basic_auth(self, user: &str, password: &str) -> Self {
        Self::from_parts(
            self.conn.http.clone(),
            &self.conn.base_url,
            Some((user.to_string(), password.to_string())),
        )
    }
}

fn header_map(headers: &Map<String, Value>) -> Result<HeaderMap, SessionError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let invalid = || SessionError::InvalidOptions(format!("invalid header {}: {}", name, value));
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = value
            .as_str()
            .and_then(|v| HeaderValue::from_str(v).ok())
            .ok_or_else(invalid)?;
        map.insert(name, value);
    }
    Ok(map)
}

impl Connection {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.auth {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    /// Send a request and return the JSON body of a successful response
    async fn send(&self, request: RequestBuilder) -> Result<Value, ClientError> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                ClientError::Unreachable(e.to_string())
            } else {
                ClientError::Http(e)
            }
        })?;

        let status = response.status();
        let bytes = response.bytes().await?;
        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        if status.is_success() {
            return Ok(body);
        }

        let code = body["errorNum"].as_i64().unwrap_or(0);
        let message = body["errorMessage"]
            .as_str()
            .or_else(|| status.canonical_reason())
            .unwrap_or("unknown error")
            .to_string();

        Err(match code {
            ERROR_UNIQUE_CONSTRAINT | ERROR_DUPLICATE_NAME => ClientError::Conflict(message),
            code if ERRORS_NOT_FOUND.contains(&code) => ClientError::NotFound(message),
            code => ClientError::Api {
                status: status.as_u16(),
                code,
                message,
            },
        })
    }

    /// Run an AQL query and collect every batch
    async fn query(&self, database: &str, query: String, bind_vars: Map<String, Value>) -> Result<Vec<Value>, ClientError> {
        let db = db_path(database);
        let mut body = self
            .send(self.request(Method::POST, &format!("{}/_api/cursor", db)).json(&json!({
                "query": query,
                "bindVars": bind_vars,
                "count": true,
                "batchSize": 1000,
            })))
            .await?;

        let mut results = take_array(&mut body["result"]);
        while body["hasMore"].as_bool().unwrap_or(false) {
            let id = body["id"]
                .as_str()
                .ok_or_else(|| ClientError::NotFound("cursor id".to_string()))?
                .to_string();
            body = self
                .send(self.request(
                    Method::PUT,
                    &format!("{}/_api/cursor/{}", db, urlencoding::encode(&id)),
                ))
                .await?;
            results.extend(take_array(&mut body["result"]));
        }
        Ok(results)
    }
}

fn db_path(database: &str) -> String {
    format!("/_db/{}", urlencoding::encode(database))
}

fn take_array(value: &mut Value) -> Vec<Value> {
    match value.take() {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

/// AQL filter and bind variables matching `example` on document variable `d`
fn example_filter(collection: &str, example: &Document) -> (String, Map<String, Value>) {
    let mut bind_vars = Map::new();
    bind_vars.insert("@collection".to_string(), Value::String(collection.to_string()));

    let conditions: Vec<String> = example
        .iter()
        .enumerate()
        .map(|(i, (field, value))| {
            bind_vars.insert(format!("field{}", i), Value::String(field.clone()));
            bind_vars.insert(format!("value{}", i), value.clone());
            format!("d[@field{i}] == @value{i}")
        })
        .collect();

    let filter = if conditions.is_empty() {
        String::new()
    } else {
        format!(" FILTER {}", conditions.join(" AND "))
    };
    (filter, bind_vars)
}

#[async_trait]
impl DocumentClient for ArangoClient {
    type Database = ArangoDatabase;

    async fn list_databases(&self) -> Result<Vec<String>, ClientError> {
        let mut body = self
            .conn
            .send(self.conn.request(Method::GET, "/_api/database/user"))
            .await?;
        Ok(take_array(&mut body["result"])
            .into_iter()
            .filter_map(|name| name.as_str().map(str::to_string))
            .collect())
    }

    async fn create_database(&self, name: &str) -> Result<(), ClientError> {
        self.conn
            .send(
                self.conn
                    .request(Method::POST, "/_api/database")
                    .json(&json!({ "name": name })),
            )
            .await?;
        Ok(())
    }

    fn database(&self, name: &str) -> ArangoDatabase {
        ArangoDatabase {
            conn: Arc::clone(&self.conn),
            name: name.to_string(),
        }
    }
}

/// Database handle of an [`ArangoClient`]
pub struct ArangoDatabase {
    conn: Arc<Connection>,
    name: String,
}

#[async_trait]
impl Database for ArangoDatabase {
    type Collection = ArangoCollection;

    async fn list_collections(&self) -> Result<Vec<String>, ClientError> {
        let path = format!("{}/_api/collection?excludeSystem=true", db_path(&self.name));
        let mut body = self.conn.send(self.conn.request(Method::GET, &path)).await?;
        Ok(take_array(&mut body["result"])
            .into_iter()
            .filter_map(|collection| collection["name"].as_str().map(str::to_string))
            .collect())
    }

    async fn create_collection(&self, name: &str) -> Result<(), ClientError> {
        let path = format!("{}/_api/collection", db_path(&self.name));
        self.conn
            .send(self.conn.request(Method::POST, &path).json(&json!({ "name": name })))
            .await?;
        Ok(())
    }

    fn collection(&self, name: &str) -> ArangoCollection {
        ArangoCollection {
            conn: Arc::clone(&self.conn),
            database: self.name.clone(),
            name: name.to_string(),
        }
    }
}

/// Collection handle of an [`ArangoClient`]
pub struct ArangoCollection {
    conn: Arc<Connection>,
    database: String,
    name: String,
}

impl ArangoCollection {
    fn document_path(&self) -> String {
        format!(
            "{}/_api/document/{}",
            db_path(&self.database),
            urlencoding::encode(&self.name)
        )
    }

    /// PATCH target for `key`. Object attributes are replaced, not merged,
    /// so keys removed from a session stay removed.
    fn update_path(&self, key: &str) -> String {
        format!(
            "{}/{}?mergeObjects=false",
            self.document_path(),
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl Collection for ArangoCollection {
    async fn by_example(&self, example: &Document) -> Result<QueryCursor, ClientError> {
        let (filter, bind_vars) = example_filter(&self.name, example);
        let query = format!("FOR d IN @@collection{} RETURN d", filter);
        let documents = self
            .conn
            .query(&self.database, query, bind_vars)
            .await?
            .into_iter()
            .filter_map(|document| match document {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Ok(QueryCursor::new(documents))
    }

    async fn remove_by_example(&self, example: &Document) -> Result<u64, ClientError> {
        let (filter, bind_vars) = example_filter(&self.name, example);
        let query = format!(
            "FOR d IN @@collection{} REMOVE d IN @@collection RETURN 1",
            filter
        );
        let removed = self.conn.query(&self.database, query, bind_vars).await?;
        Ok(removed.len() as u64)
    }

    async fn update(&self, key: &str, document: &Document) -> Result<(), ClientError> {
        let path = self.update_path(key);
        self.conn
            .send(self.conn.request(Method::PATCH, &path).json(document))
            .await?;
        Ok(())
    }

    async fn insert(&self, document: &Document) -> Result<String, ClientError> {
        let body = self
            .conn
            .send(self.conn.request(Method::POST, &self.document_path()).json(document))
            .await?;
        body["_key"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::NotFound("_key of inserted document".to_string()))
    }
}
