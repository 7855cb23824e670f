//! # sync-types
//!
//! Record and query types for tally-sync.
//!
//! This crate provides the foundational types used across all tally-sync crates:
//! - [`CollectionId`], [`RecordId`] - Identity types
//! - [`Record`] - A record with its id, creation time and field values
//! - [`Query`], [`Predicate`] - Typed filter expressions and their text form
//! - [`QueryError`] - Query parse errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod query;
mod record;

pub use error::QueryError;
pub use ids::{CollectionId, RecordId};
pub use query::{compare_text, escape_literal, Direction, Op, Predicate, Query};
pub use record::{value_text, Record, RECORD_ID_FIELD};
