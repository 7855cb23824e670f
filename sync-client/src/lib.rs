//! # sync-client
//!
//! Record store clients and the sync engine for tally-sync.
//!
//! This is the library applications use to run a sync.
//!
//! ## Features
//!
//! - **Bulk pre-fetch**: child records of all parents are fetched with chunked
//!   `in (...)` queries before any parent is written
//! - **Permission precheck**: every collection is probed before the first write
//! - **Cooperative cancellation**: checked before every remaining store call
//! - **Store Abstraction**: pluggable store layer (REST, in-memory)
//! - **Pure State Machine**: uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use tally_sync_client::{RestStore, RestStoreConfig, SyncEngine};
//!
//! let store = RestStore::new(RestStoreConfig::new("https://example.cybozu.com", &token))?;
//! let engine = SyncEngine::from_stored(store, CollectionId::new("42"), &raw_config)?;
//! let result = engine.run_sync(|_| {}, || false).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod fetcher;
pub mod paginator;
pub mod precheck;
pub mod store;

pub use engine::{SyncEngine, SyncResult};
pub use error::SyncError;
pub use fetcher::BulkChildFetcher;
pub use paginator::RecordStorePaginator;
pub use precheck::check_permissions;
pub use store::{
    MemoryStore, QueryPage, RecordStore, RecordUpdate, RestStore, RestStoreConfig, StoreError,
    WriteCall, DEFAULT_CREATED_AT_FIELD,
};
