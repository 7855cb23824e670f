//! Join-key grouping and ordering of child records.
//!
//! A bulk fetch returns the child records of many join keys in arbitrary
//! order. This module groups them per key and orders each group latest first,
//! which is the order [`compute`](crate::compute::compute) expects.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use tally_sync_types::Record;

/// Child records per join key, each list ordered latest first.
pub type ChildGroups = HashMap<String, Vec<Record>>;

/// Ordering of child records: newest `created_at` first.
///
/// Records created at the same instant are ordered by record id, highest
/// first, so the most recently assigned id wins ties.
pub fn latest_first(a: &Record, b: &Record) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Distinct, non-blank join keys held in `field` across `records`.
pub fn distinct_keys<'a, I>(records: I, field: &str) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .filter_map(|r| r.join_key(field))
        .collect()
}

/// Split keys into chunks of at most `size` keys, skipping blank keys.
///
/// # Panics
///
/// Panics if `size` is zero.
pub fn chunk_keys<'a, I>(keys: I, size: usize) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = &'a String>,
{
    assert!(size > 0, "chunk size must be > 0");
    let unique: BTreeSet<&str> = keys
        .into_iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    let unique: Vec<&str> = unique.into_iter().collect();
    unique
        .chunks(size)
        .map(|chunk| chunk.iter().map(|k| k.to_string()).collect())
        .collect()
}

/// Group records by the trimmed value of `join_field`, latest first.
///
/// Records with a blank join value are dropped, as are repeats of a record
/// id already seen (a record can surface twice when pages shift under a
/// concurrent insert).
pub fn group_latest_first(records: Vec<Record>, join_field: &str) -> ChildGroups {
    let mut seen = HashSet::new();
    let mut groups: ChildGroups = HashMap::new();

    for record in records {
        let Some(key) = record.join_key(join_field) else {
            continue;
        };
        if !seen.insert(record.id.clone()) {
            continue;
        }
        groups.entry(key).or_default().push(record);
    }

    for group in groups.values_mut() {
        group.sort_by(latest_first);
    }

    groups
}
