//! REST record store (kintone-compatible API).
//!
//! Endpoints used:
//! - `GET  {base}/k/v1/records.json` with `app`, `query` and `totalCount`
//! - `PUT  {base}/k/v1/record.json` for one record
//! - `PUT  {base}/k/v1/records.json` for a batch
//!
//! Apps inside a guest space live under `{base}/k/guest/{space}/v1/`.

use super::{QueryPage, RecordStore, RecordUpdate, StoreError};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tally_sync_core::FieldUpdates;
use tally_sync_types::{CollectionId, Record, RecordId, RECORD_ID_FIELD};
use tracing::debug;

/// Field code of the record creation timestamp in a default app.
pub const DEFAULT_CREATED_AT_FIELD: &str = "作成日時";

const API_TOKEN_HEADER: &str = "X-Cybozu-API-Token";

/// Connection settings for a [`RestStore`].
#[derive(Clone)]
pub struct RestStoreConfig {
    /// Base URL of the service, e.g. `https://example.cybozu.com`.
    pub base_url: String,
    /// API token (comma-separated when several apps need their own token).
    pub api_token: String,
    /// Guest space holding the apps, if any.
    pub guest_space: Option<u64>,
    /// Field code holding each record's creation timestamp.
    pub created_at_field: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RestStoreConfig {
    /// Settings with the default created-at field and a 30 second timeout.
    pub fn new(base_url: &str, api_token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            guest_space: None,
            created_at_field: DEFAULT_CREATED_AT_FIELD.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the guest space.
    pub fn with_guest_space(mut self, space: u64) -> Self {
        self.guest_space = Some(space);
        self
    }

    /// Set the created-at field code.
    pub fn with_created_at_field(mut self, field: &str) -> Self {
        self.created_at_field = field.to_string();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL of an API endpoint such as `records.json`.
    pub fn endpoint(&self, name: &str) -> String {
        match self.guest_space {
            Some(space) => format!("{}/k/guest/{}/v1/{}", self.base_url, space, name),
            None => format!("{}/k/v1/{}", self.base_url, name),
        }
    }
}

impl std::fmt::Debug for RestStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStoreConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .field("guest_space", &self.guest_space)
            .field("created_at_field", &self.created_at_field)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    records: Vec<Map<String, Value>>,
    #[serde(rename = "totalCount", default)]
    total_count: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Record store backed by a kintone-compatible REST API.
#[derive(Debug, Clone)]
pub struct RestStore {
    config: RestStoreConfig,
    client: Client,
}

impl RestStore {
    /// Create a store client.
    pub fn new(config: RestStoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// The settings this store was created with.
    pub fn config(&self) -> &RestStoreConfig {
        &self.config
    }

    async fn put_json(&self, endpoint: &str, body: Value) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.config.endpoint(endpoint))
            .header(API_TOKEN_HEADER, &self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response).await?;
        Ok(())
    }
}

/// Map a transport failure onto a store error.
fn request_error(e: reqwest::Error) -> StoreError {
    if e.is_decode() {
        StoreError::Decode(e.to_string())
    } else {
        StoreError::Network(e.to_string())
    }
}

/// Turn a non-success response into a store error.
async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), &body))
}

/// Store error for an HTTP status and response body.
pub(crate) fn status_error(status: u16, body: &str) -> StoreError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) if !err.code.is_empty() => format!("{} ({})", err.message, err.code),
        Ok(err) if !err.message.is_empty() => err.message,
        _ => body.trim().to_string(),
    };
    match status {
        401 | 403 => StoreError::PermissionDenied(message),
        400..=499 => StoreError::Rejected(message),
        _ => StoreError::Http { status, message },
    }
}

/// Decode one record of a `records.json` response.
///
/// Every field arrives as `{"type": ..., "value": ...}`. The record id comes
/// from `$id`; the creation time from `created_at_field` (RFC 3339, stored
/// as epoch milliseconds; 0 when the app does not expose the field).
pub(crate) fn decode_record(
    raw: &Map<String, Value>,
    created_at_field: &str,
) -> Result<Record, StoreError> {
    let id = raw
        .get(RECORD_ID_FIELD)
        .and_then(|f| f.get("value"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| StoreError::Decode("record without $id".into()))?;

    let mut record = Record::new(RecordId::new(id));

    if let Some(value) = raw.get(created_at_field).and_then(|f| f.get("value")) {
        if let Some(text) = value.as_str().filter(|s| !s.is_empty()) {
            let parsed = DateTime::parse_from_rfc3339(text).map_err(|e| {
                StoreError::Decode(format!("invalid {} '{}': {}", created_at_field, text, e))
            })?;
            record.created_at = parsed.timestamp_millis();
        }
    }

    for (code, field) in raw {
        if code == RECORD_ID_FIELD || code == "$revision" {
            continue;
        }
        let value = field.get("value").cloned().unwrap_or(Value::Null);
        record.fields.insert(code.clone(), value);
    }

    Ok(record)
}

fn decode_total_count(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        _ => None,
    }
}

fn record_body(fields: &FieldUpdates) -> Value {
    let record: Map<String, Value> = fields
        .iter()
        .map(|(code, value)| (code.clone(), json!({ "value": value })))
        .collect();
    Value::Object(record)
}

#[async_trait]
impl RecordStore for RestStore {
    async fn query(&self, collection: &CollectionId, query: &str) -> Result<QueryPage, StoreError> {
        debug!(app = %collection, query, "GET records.json");

        let response = self
            .client
            .get(self.config.endpoint("records.json"))
            .header(API_TOKEN_HEADER, &self.config.api_token)
            .query(&[
                ("app", collection.as_str()),
                ("query", query),
                ("totalCount", "true"),
            ])
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;

        let body: RecordsResponse = response.json().await.map_err(request_error)?;
        let records = body
            .records
            .iter()
            .map(|raw| decode_record(raw, &self.config.created_at_field))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QueryPage {
            records,
            total_count: decode_total_count(&body.total_count),
        })
    }

    async fn put_one(
        &self,
        collection: &CollectionId,
        id: &RecordId,
        fields: &FieldUpdates,
    ) -> Result<(), StoreError> {
        debug!(app = %collection, id = %id, "PUT record.json");
        let body = json!({
            "app": collection.as_str(),
            "id": id.as_str(),
            "record": record_body(fields),
        });
        self.put_json("record.json", body).await
    }

    async fn put_many(
        &self,
        collection: &CollectionId,
        updates: &[RecordUpdate],
    ) -> Result<(), StoreError> {
        debug!(app = %collection, count = updates.len(), "PUT records.json");
        let records: Vec<Value> = updates
            .iter()
            .map(|u| json!({ "id": u.id.as_str(), "record": record_body(&u.fields) }))
            .collect();
        let body = json!({
            "app": collection.as_str(),
            "records": records,
        });
        self.put_json("records.json", body).await
    }
}
