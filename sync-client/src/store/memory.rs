//! In-memory record store for testing.
//!
//! Evaluates queries with the same grammar a real store accepts, records
//! every call for verification and can be told to fail on demand.

use super::{QueryPage, RecordStore, RecordUpdate, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tally_sync_core::{FieldUpdates, STORE_MAX_BATCH_SIZE, STORE_MAX_PAGE_SIZE};
use tally_sync_types::{
    compare_text, CollectionId, Direction, Query, Record, RecordId, RECORD_ID_FIELD,
};

/// Page size used when a query has no `limit` clause.
const DEFAULT_LIMIT: usize = 100;

/// One write call received by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    /// Collection written to.
    pub collection: CollectionId,
    /// Updates carried by the call.
    pub updates: Vec<RecordUpdate>,
    /// Whether the call was a `put_many`.
    pub batched: bool,
}

/// In-memory record store for testing.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    collections: HashMap<CollectionId, BTreeMap<RecordId, Record>>,
    denied: HashSet<CollectionId>,
    fail_next_query: Option<StoreError>,
    fail_next_write: Option<StoreError>,
    fail_writes_after: Option<(usize, StoreError)>,
    omit_total_count: bool,
    queries: Vec<(CollectionId, String)>,
    writes: Vec<WriteCall>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection with no records.
    pub fn create_collection(&self, collection: &CollectionId) {
        let mut inner = self.inner.lock().unwrap();
        inner.collections.entry(collection.clone()).or_default();
    }

    /// Insert or replace a record, creating the collection if needed.
    pub fn insert(&self, collection: &CollectionId, record: Record) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .collections
            .entry(collection.clone())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Insert several records.
    pub fn insert_all<I>(&self, collection: &CollectionId, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        for record in records {
            self.insert(collection, record);
        }
    }

    /// Get a copy of one record.
    pub fn record(&self, collection: &CollectionId, id: &RecordId) -> Option<Record> {
        let inner = self.inner.lock().unwrap();
        inner.collections.get(collection)?.get(id).cloned()
    }

    /// Text value of one field of one record (empty when absent).
    pub fn field(&self, collection: &CollectionId, id: &RecordId, field: &str) -> String {
        self.record(collection, id)
            .map(|r| r.text(field))
            .unwrap_or_default()
    }

    /// Reject every request on a collection as a permission failure.
    pub fn deny(&self, collection: &CollectionId) {
        let mut inner = self.inner.lock().unwrap();
        inner.denied.insert(collection.clone());
    }

    /// Cause the next query to fail with the given error.
    pub fn fail_next_query(&self, error: StoreError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_query = Some(error);
    }

    /// Cause the next write to fail with the given error.
    pub fn fail_next_write(&self, error: StoreError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_write = Some(error);
    }

    /// Let `count` more writes succeed, then fail every write after them.
    pub fn fail_writes_after(&self, count: usize, error: StoreError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_writes_after = Some((count, error));
    }

    /// Remove every failure injected so far, including denied collections.
    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.denied.clear();
        inner.fail_next_query = None;
        inner.fail_next_write = None;
        inner.fail_writes_after = None;
    }

    /// Stop reporting `total_count` on query pages.
    pub fn omit_total_count(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.omit_total_count = true;
    }

    /// Every query received, in order.
    pub fn queries(&self) -> Vec<(CollectionId, String)> {
        let inner = self.inner.lock().unwrap();
        inner.queries.clone()
    }

    /// Queries received for one collection, in order.
    pub fn queries_for(&self, collection: &CollectionId) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .queries
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, q)| q.clone())
            .collect()
    }

    /// Every successful write call, in order.
    pub fn writes(&self) -> Vec<WriteCall> {
        let inner = self.inner.lock().unwrap();
        inner.writes.clone()
    }

    /// Successful write calls to one collection, in order.
    pub fn writes_to(&self, collection: &CollectionId) -> Vec<WriteCall> {
        let inner = self.inner.lock().unwrap();
        inner
            .writes
            .iter()
            .filter(|w| &w.collection == collection)
            .cloned()
            .collect()
    }

    /// Forget recorded queries and writes, keeping the data.
    pub fn clear_logs(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.queries.clear();
        inner.writes.clear();
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl MemoryStoreInner {
    fn check_access(&self, collection: &CollectionId) -> Result<(), StoreError> {
        if self.denied.contains(collection) {
            return Err(StoreError::PermissionDenied(format!(
                "no access to collection {}",
                collection
            )));
        }
        if !self.collections.contains_key(collection) {
            return Err(StoreError::Rejected(format!(
                "collection {} does not exist",
                collection
            )));
        }
        Ok(())
    }

    fn check_write_failures(&mut self) -> Result<(), StoreError> {
        if let Some(error) = self.fail_next_write.take() {
            return Err(error);
        }
        if let Some((remaining, error)) = self.fail_writes_after.as_mut() {
            if *remaining == 0 {
                return Err(error.clone());
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn apply(
        &mut self,
        collection: &CollectionId,
        updates: &[RecordUpdate],
        batched: bool,
    ) -> Result<(), StoreError> {
        self.check_access(collection)?;
        self.check_write_failures()?;

        let records = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::Rejected(format!("collection {} does not exist", collection)))?;

        // All or nothing, like a batched REST update.
        if let Some(missing) = updates.iter().find(|u| !records.contains_key(&u.id)) {
            return Err(StoreError::Rejected(format!(
                "record {} does not exist in collection {}",
                missing.id, collection
            )));
        }
        for update in updates {
            if let Some(record) = records.get_mut(&update.id) {
                for (field, value) in &update.fields {
                    record
                        .fields
                        .insert(field.clone(), Value::String(value.clone()));
                }
            }
        }

        self.writes.push(WriteCall {
            collection: collection.clone(),
            updates: updates.to_vec(),
            batched,
        });
        Ok(())
    }
}

fn compare_records(a: &Record, b: &Record, order_by: &[(String, Direction)]) -> Ordering {
    for (field, direction) in order_by {
        let ordering = if field == RECORD_ID_FIELD {
            a.id.cmp(&b.id)
        } else {
            compare_text(&a.text(field), &b.text(field))
        };
        let ordering = match direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query(&self, collection: &CollectionId, query: &str) -> Result<QueryPage, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.queries.push((collection.clone(), query.to_string()));

        inner.check_access(collection)?;

        // Check for forced failure
        if let Some(error) = inner.fail_next_query.take() {
            return Err(error);
        }

        let parsed = Query::parse(query)
            .map_err(|e| StoreError::Rejected(format!("invalid query: {}", e)))?;
        let limit = parsed.limit.unwrap_or(DEFAULT_LIMIT);
        if limit > STORE_MAX_PAGE_SIZE {
            return Err(StoreError::Rejected(format!(
                "limit must be at most {}",
                STORE_MAX_PAGE_SIZE
            )));
        }

        let records = inner
            .collections
            .get(collection)
            .map(|c| c.values().collect::<Vec<_>>())
            .unwrap_or_default();
        let mut matched: Vec<&Record> = records
            .into_iter()
            .filter(|r| parsed.filter.as_ref().map_or(true, |f| f.matches(r)))
            .collect();
        matched.sort_by(|a, b| compare_records(a, b, &parsed.order_by));

        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(parsed.offset.unwrap_or(0))
            .take(limit)
            .cloned()
            .collect();

        Ok(QueryPage {
            records: page,
            total_count: (!inner.omit_total_count).then_some(total),
        })
    }

    async fn put_one(
        &self,
        collection: &CollectionId,
        id: &RecordId,
        fields: &FieldUpdates,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let update = RecordUpdate {
            id: id.clone(),
            fields: fields.clone(),
        };
        inner.apply(collection, std::slice::from_ref(&update), false)
    }

    async fn put_many(
        &self,
        collection: &CollectionId,
        updates: &[RecordUpdate],
    ) -> Result<(), StoreError> {
        if updates.len() > STORE_MAX_BATCH_SIZE {
            return Err(StoreError::Rejected(format!(
                "at most {} records per batch",
                STORE_MAX_BATCH_SIZE
            )));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.apply(collection, updates, true)
    }
}
