//! Permission precheck.
//!
//! Before anything is written, every collection a run touches is probed with
//! a `limit 1` query. A run that would fail halfway on a missing permission
//! fails here instead, naming the collection.

use futures_util::future::try_join_all;
use tally_sync_types::{CollectionId, Query};
use tracing::debug;

use crate::error::SyncError;
use crate::store::{RecordStore, StoreError};

/// Probe each collection concurrently.
///
/// Transport failures surface as [`SyncError::Network`]; any other rejection
/// is reported as [`SyncError::PermissionDenied`] for the first collection
/// that failed.
pub async fn check_permissions<S>(store: &S, collections: &[CollectionId]) -> Result<(), SyncError>
where
    S: RecordStore + ?Sized,
{
    let probe = Query::new().limit(1).to_string();
    try_join_all(collections.iter().map(|collection| {
        let probe = probe.as_str();
        async move {
            match store.query(collection, probe).await {
                Ok(_) => {
                    debug!(collection = %collection, "probe ok");
                    Ok(())
                }
                Err(cause) => Err(probe_error(collection, cause)),
            }
        }
    }))
    .await?;
    Ok(())
}

fn probe_error(collection: &CollectionId, cause: StoreError) -> SyncError {
    if cause.is_network() {
        SyncError::Network(cause)
    } else {
        SyncError::PermissionDenied {
            collection: collection.clone(),
            cause,
        }
    }
}
