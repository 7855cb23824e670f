//! # sync-core
//!
//! Pure logic for tally-sync (no I/O, instant tests).
//!
//! This crate holds everything about a sync run that can be decided without
//! talking to a record store: the stored configuration and its migration,
//! value computation, grouping of child records, pagination bookkeeping and
//! the run state machine.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O is performed by `sync-client`, which drives these pieces
//! against a record store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compute;
pub mod config;
pub mod group;
pub mod limits;
pub mod paginate;
pub mod state;

pub use compute::{compute, contact_fields, parent_fields, FieldUpdates, NOT_SUBMITTED, SUBMITTED};
pub use config::{
    ChildRule, ChildSource, ConfigError, ContactLink, Mode, StoredChildRow, StoredConfig,
    SyncConfig, CURRENT_SCHEMA_VERSION,
};
pub use group::{chunk_keys, distinct_keys, group_latest_first, latest_first, ChildGroups};
pub use limits::{FetchLimits, STORE_MAX_BATCH_SIZE, STORE_MAX_PAGE_SIZE};
pub use paginate::{PageStep, PageTracker, RoundLimitExceeded};
pub use state::{Event, Progress, SyncPhase, SyncState};
