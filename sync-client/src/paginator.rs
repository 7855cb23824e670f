//! Paginated reads over a [`RecordStore`].

use tally_sync_core::{FetchLimits, PageStep, PageTracker};
use tally_sync_types::{CollectionId, Direction, Query, Record, RECORD_ID_FIELD};
use tracing::debug;

use crate::error::SyncError;
use crate::store::RecordStore;

/// Fetches every record matching a query, one page at a time.
///
/// Pages are requested with explicit `limit`/`offset` clauses. Queries
/// without an ordering are ordered by record id ascending so that offsets
/// stay stable between rounds.
#[derive(Debug, Clone, Copy)]
pub struct RecordStorePaginator {
    page_size: usize,
    max_rounds: usize,
}

impl RecordStorePaginator {
    /// Create a paginator from validated limits.
    pub fn new(limits: &FetchLimits) -> Self {
        Self {
            page_size: limits.page_size,
            max_rounds: limits.max_rounds,
        }
    }

    /// Fetch all records of `collection` matching `base`.
    ///
    /// Any `limit` or `offset` in `base` is replaced per page.
    pub async fn fetch_all<S>(
        &self,
        store: &S,
        collection: &CollectionId,
        base: &Query,
    ) -> Result<Vec<Record>, SyncError>
    where
        S: RecordStore + ?Sized,
    {
        let mut base = base.clone();
        if base.order_by.is_empty() {
            base = base.order_by(RECORD_ID_FIELD, Direction::Asc);
        }

        let mut tracker = PageTracker::new(self.page_size, self.max_rounds);
        let mut records = Vec::new();

        loop {
            let step = tracker
                .next_step()
                .map_err(|_| SyncError::LoopLimitExceeded {
                    collection: collection.clone(),
                })?;
            let PageStep::Fetch { offset, limit } = step else {
                break;
            };

            let query = base.clone().limit(limit).offset(offset);
            let page = store.query(collection, &query.to_string()).await?;
            debug!(
                collection = %collection,
                round = tracker.rounds(),
                offset,
                received = page.records.len(),
                total = ?page.total_count,
                "fetched page"
            );

            tracker.record_page(page.records.len(), page.total_count);
            records.extend(page.records);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use tally_sync_types::Predicate;

    fn app() -> CollectionId {
        CollectionId::new("5")
    }

    fn store_with(count: u64) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_collection(&app());
        store.insert_all(
            &app(),
            (1..=count).map(|i| Record::new(i).with_field("kind", if i % 3 == 0 { "x" } else { "y" })),
        );
        store
    }

    fn limits(page_size: usize, max_rounds: usize) -> FetchLimits {
        FetchLimits {
            page_size,
            max_rounds,
            ..FetchLimits::default()
        }
    }

    #[tokio::test]
    async fn fetches_every_record_in_id_order() {
        let store = store_with(1234);
        let paginator = RecordStorePaginator::new(&FetchLimits::default());

        let records = paginator
            .fetch_all(&store, &app(), &Query::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 1234);
        assert_eq!(records[0].id.as_str(), "1");
        assert_eq!(records[1233].id.as_str(), "1234");
        assert_eq!(store.queries().len(), 3);
    }

    #[tokio::test]
    async fn page_queries_carry_order_limit_and_offset() {
        let store = store_with(10);
        let paginator = RecordStorePaginator::new(&limits(4, 10));
        let base = Query::filtered(Predicate::eq("kind", "y"));

        let records = paginator.fetch_all(&store, &app(), &base).await.unwrap();

        assert_eq!(records.len(), 7);
        assert_eq!(
            store.queries_for(&app()),
            vec![
                "kind = \"y\" order by $id asc limit 4 offset 0".to_string(),
                "kind = \"y\" order by $id asc limit 4 offset 4".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn exact_multiple_without_total_needs_an_empty_round() {
        let store = store_with(8);
        store.omit_total_count();
        let paginator = RecordStorePaginator::new(&limits(4, 10));

        let records = paginator.fetch_all(&store, &app(), &Query::new()).await.unwrap();

        assert_eq!(records.len(), 8);
        assert_eq!(store.queries().len(), 3);
    }

    #[tokio::test]
    async fn empty_collection_takes_one_query() {
        let store = store_with(0);
        let paginator = RecordStorePaginator::new(&FetchLimits::default());

        let records = paginator.fetch_all(&store, &app(), &Query::new()).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(store.queries().len(), 1);
    }

    #[tokio::test]
    async fn round_ceiling_is_an_error() {
        let store = store_with(100);
        let paginator = RecordStorePaginator::new(&limits(10, 3));

        let result = paginator.fetch_all(&store, &app(), &Query::new()).await;

        assert!(matches!(
            result,
            Err(SyncError::LoopLimitExceeded { collection }) if collection == app()
        ));
        assert_eq!(store.queries().len(), 3);
    }

    #[tokio::test]
    async fn store_failure_aborts() {
        let store = store_with(10);
        store.fail_next_query(StoreError::Network("reset".into()));
        let paginator = RecordStorePaginator::new(&FetchLimits::default());

        let result = paginator.fetch_all(&store, &app(), &Query::new()).await;
        assert!(matches!(result, Err(SyncError::Network(_))));
    }

    #[tokio::test]
    async fn explicit_order_is_kept() {
        let store = store_with(3);
        let paginator = RecordStorePaginator::new(&FetchLimits::default());
        let base = Query::new().order_by(RECORD_ID_FIELD, Direction::Desc);

        let records = paginator.fetch_all(&store, &app(), &base).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }
}
