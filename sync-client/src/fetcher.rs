//! Bulk child record fetching.
//!
//! Instead of one query per parent, the child records of every parent are
//! fetched up front with `in (...)` queries over chunks of join keys, then
//! grouped per key in memory.

use tally_sync_core::{chunk_keys, group_latest_first, ChildGroups, FetchLimits};
use tally_sync_types::{CollectionId, Predicate, Query, Record};
use tracing::debug;

use crate::error::SyncError;
use crate::paginator::RecordStorePaginator;
use crate::store::RecordStore;

/// Fetches child records for many join keys at once.
#[derive(Debug, Clone, Copy)]
pub struct BulkChildFetcher {
    paginator: RecordStorePaginator,
    key_chunk_size: usize,
}

impl BulkChildFetcher {
    /// Create a fetcher from validated limits.
    pub fn new(limits: &FetchLimits) -> Self {
        Self {
            paginator: RecordStorePaginator::new(limits),
            key_chunk_size: limits.key_chunk_size,
        }
    }

    /// Fetch the children of every key in `keys`, grouped latest first.
    ///
    /// Keys are trimmed and deduplicated; blank keys are skipped. Keys without
    /// children are absent from the result.
    pub async fn fetch_grouped<'k, S, I>(
        &self,
        store: &S,
        collection: &CollectionId,
        join_field: &str,
        keys: I,
    ) -> Result<ChildGroups, SyncError>
    where
        S: RecordStore + ?Sized,
        I: IntoIterator<Item = &'k String>,
    {
        let chunks = chunk_keys(keys, self.key_chunk_size);
        let mut records = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let query = Query::filtered(Predicate::is_in(join_field, chunk));
            let found = self.paginator.fetch_all(store, collection, &query).await?;
            debug!(
                collection = %collection,
                chunk = index + 1,
                chunks = chunks.len(),
                keys = chunk.len(),
                records = found.len(),
                "fetched child chunk"
            );
            records.extend(found);
        }

        Ok(group_latest_first(records, join_field))
    }

    /// Fetch the children of a single key, latest first.
    ///
    /// Uses an equality query but the same grouping and ordering as
    /// [`fetch_grouped`](Self::fetch_grouped), so both paths agree.
    pub async fn fetch_for_key<S>(
        &self,
        store: &S,
        collection: &CollectionId,
        join_field: &str,
        key: &str,
    ) -> Result<Vec<Record>, SyncError>
    where
        S: RecordStore + ?Sized,
    {
        let key = key.trim();
        if key.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::filtered(Predicate::eq(join_field, key));
        let found = self.paginator.fetch_all(store, collection, &query).await?;
        let mut groups = group_latest_first(found, join_field);
        Ok(groups.remove(key).unwrap_or_default())
    }
}
