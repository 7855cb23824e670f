//! Records as seen by the sync engine.
//!
//! Parent, child and contact records share one shape: an id, a creation
//! timestamp used for "latest" ordering, and an open map of field values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::RecordId;

/// Pseudo field code that addresses the record id in queries.
pub const RECORD_ID_FIELD: &str = "$id";

/// A record fetched from (or written to) a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned record id.
    pub id: RecordId,
    /// Creation time in unix milliseconds.
    #[serde(default)]
    pub created_at: i64,
    /// Field values keyed by field code.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record with the given id.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            created_at: 0,
            fields: BTreeMap::new(),
        }
    }

    /// Set the creation timestamp (unix milliseconds).
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set a field value.
    pub fn with_field(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Raw value of a field, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field value rendered as text.
    ///
    /// Missing fields and nulls render as the empty string. [`RECORD_ID_FIELD`]
    /// renders the record id.
    pub fn text(&self, field: &str) -> String {
        if field == RECORD_ID_FIELD {
            return self.id.to_string();
        }
        self.fields.get(field).map(value_text).unwrap_or_default()
    }

    /// Trimmed join key held in `field`, or `None` when blank.
    pub fn join_key(&self, field: &str) -> Option<String> {
        let text = self.text(field);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Render a field value as text.
///
/// Arrays render their elements joined with `,`; objects render as compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_of_missing_and_null_is_empty() {
        let record = Record::new("1").with_field("note", Value::Null);
        assert_eq!(record.text("note"), "");
        assert_eq!(record.text("absent"), "");
    }

    #[test]
    fn text_of_scalars() {
        let record = Record::new("1")
            .with_field("s", "hello")
            .with_field("n", 42)
            .with_field("b", true);
        assert_eq!(record.text("s"), "hello");
        assert_eq!(record.text("n"), "42");
        assert_eq!(record.text("b"), "true");
    }

    #[test]
    fn text_of_array_joins_with_comma() {
        let record = Record::new("1").with_field("tags", json!(["a", "b", 3]));
        assert_eq!(record.text("tags"), "a,b,3");
    }

    #[test]
    fn text_of_id_field_is_record_id() {
        let record = Record::new("77");
        assert_eq!(record.text(RECORD_ID_FIELD), "77");
    }

    #[test]
    fn join_key_trims_and_drops_blank() {
        let record = Record::new("1")
            .with_field("k", "  A-1 ")
            .with_field("blank", "   ");
        assert_eq!(record.join_key("k"), Some("A-1".to_string()));
        assert_eq!(record.join_key("blank"), None);
        assert_eq!(record.join_key("absent"), None);
    }

    #[test]
    fn numeric_join_key_is_stringified() {
        let record = Record::new("1").with_field("k", 1001);
        assert_eq!(record.join_key("k"), Some("1001".to_string()));
    }
}
