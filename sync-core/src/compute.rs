//! Value computation for child rules.
//!
//! Everything here is a pure function of records already in memory, so the
//! results of a run depend only on the current child data. Re-running a sync
//! after a partial failure therefore converges on the same field values.

use std::collections::BTreeMap;
use tally_sync_types::Record;

use crate::config::{ChildRule, Mode};

/// Existence-mode value when at least one child record matches.
pub const SUBMITTED: &str = "提出済";

/// Existence-mode value when no child record matches.
pub const NOT_SUBMITTED: &str = "未提出";

/// Field code → value map for one record update.
pub type FieldUpdates = BTreeMap<String, String>;

/// Derive a rule's value from the child records matching one join key.
///
/// `children` must be ordered latest first (see
/// [`latest_first`](crate::group::latest_first)).
pub fn compute(children: &[Record], rule: &ChildRule) -> String {
    match rule.mode {
        Mode::Existence => {
            if children.is_empty() {
                NOT_SUBMITTED.to_string()
            } else {
                SUBMITTED.to_string()
            }
        }
        Mode::Copy => match (children.first(), rule.copy_source_field.as_deref()) {
            (Some(latest), Some(field)) => latest.text(field),
            _ => String::new(),
        },
    }
}

/// Parent field updates for a set of computed rule values.
///
/// When two rules target the same field the later rule wins.
pub fn parent_fields(values: &[(&ChildRule, String)]) -> FieldUpdates {
    values
        .iter()
        .map(|(rule, value)| (rule.target_field.clone(), value.clone()))
        .collect()
}

/// Contact field updates for a set of computed rule values.
///
/// Rules naming a contact target contribute their own value. If none does,
/// `legacy_field` receives the value of the first rule.
pub fn contact_fields(values: &[(&ChildRule, String)], legacy_field: Option<&str>) -> FieldUpdates {
    let mut fields: FieldUpdates = values
        .iter()
        .filter_map(|(rule, value)| {
            rule.contact_target_field
                .as_ref()
                .map(|field| (field.clone(), value.clone()))
        })
        .collect();

    if fields.is_empty() {
        if let (Some(field), Some((_, value))) = (legacy_field, values.first()) {
            if !field.is_empty() {
                fields.insert(field.to_string(), value.clone());
            }
        }
    }

    fields
}
