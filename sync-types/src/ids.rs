//! Identity types for records and collections.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of a record collection (an "app" in kintone terms).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    /// Create a CollectionId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionId({})", self.0)
    }
}

impl From<&str> for CollectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a single record within a collection.
///
/// Stores assign numeric ids, but the value is kept as text. Ordering is
/// numeric when both ids parse as unsigned integers (so `"9" < "10"`) and
/// lexicographic otherwise.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a RecordId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            _ => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<u64> for RecordId {
    fn from(n: u64) -> Self {
        Self::new(n.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_orders_numerically() {
        let nine = RecordId::from(9u64);
        let ten = RecordId::from(10u64);
        assert!(nine < ten);
        // Lexicographic order would say otherwise
        assert!(nine.as_str() > ten.as_str());
    }

    #[test]
    fn record_id_falls_back_to_text_order() {
        let a = RecordId::new("a-1");
        let b = RecordId::new("b-1");
        assert!(a < b);
    }

    #[test]
    fn record_id_leading_zeros_are_distinct() {
        let plain = RecordId::new("7");
        let padded = RecordId::new("007");
        assert_ne!(plain, padded);
        assert_ne!(plain.cmp(&padded), Ordering::Equal);
    }

    #[test]
    fn collection_id_display_is_raw() {
        let id = CollectionId::new("42");
        assert_eq!(id.to_string(), "42");
        assert_eq!(format!("{:?}", id), "CollectionId(42)");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&RecordId::from(5u64)).unwrap();
        assert_eq!(json, "\"5\"");
        let back: CollectionId = serde_json::from_str("\"12\"").unwrap();
        assert_eq!(back, CollectionId::new("12"));
    }
}
