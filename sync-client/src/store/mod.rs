//! Record store abstraction for tally-sync.
//!
//! This module provides a pluggable store layer that abstracts the service
//! holding the parent, child and contact collections (a kintone-style REST
//! API, or an in-memory store for testing).
//!
//! # Design
//!
//! The store trait is async and mirrors the three calls a sync run needs:
//! - `query()` runs one filter expression and returns one page
//! - `put_one()` updates fields of a single record
//! - `put_many()` updates a batch of records in one request
//!
//! Queries travel as text. Callers build them as typed
//! [`Query`](tally_sync_types::Query) values and pass their `Display` form,
//! so escaping happens in exactly one place.
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryStore::new();
//! store.insert(&CollectionId::new("42"), Record::new(1u64).with_field("gid", "A"));
//! let page = store.query(&CollectionId::new("42"), "gid = \"A\" limit 1").await?;
//! ```

mod memory;
mod rest;

pub use memory::{MemoryStore, WriteCall};
pub use rest::{RestStore, RestStoreConfig, DEFAULT_CREATED_AT_FIELD};

use async_trait::async_trait;
use tally_sync_core::FieldUpdates;
use tally_sync_types::{CollectionId, Record, RecordId};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The credentials may not read or write the collection.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The store rejected the request (bad query, unknown record, ...).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The store answered with a server error.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Message from the response body.
        message: String,
    },

    /// The request never got an answer (connect failure, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether the failure happened below the store's own request handling.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Records on this page.
    pub records: Vec<Record>,
    /// Matching records across all pages, when the store reports it.
    pub total_count: Option<usize>,
}

/// Field updates for one record in a batched write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    /// Record to update.
    pub id: RecordId,
    /// Field code → new value.
    pub fields: FieldUpdates,
}

/// Record store trait for reading and updating collections.
///
/// Implementations handle the underlying service (REST API, in-memory, etc).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Run a query expression against a collection and return one page.
    async fn query(&self, collection: &CollectionId, query: &str) -> Result<QueryPage, StoreError>;

    /// Update fields of a single record.
    async fn put_one(
        &self,
        collection: &CollectionId,
        id: &RecordId,
        fields: &FieldUpdates,
    ) -> Result<(), StoreError>;

    /// Update several records in one request.
    ///
    /// Callers keep batches within the store's batch ceiling.
    async fn put_many(
        &self,
        collection: &CollectionId,
        updates: &[RecordUpdate],
    ) -> Result<(), StoreError>;
}
