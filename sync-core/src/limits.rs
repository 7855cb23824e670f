//! Request sizing limits for a sync run.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Largest page a store returns for one query.
pub const STORE_MAX_PAGE_SIZE: usize = 500;

/// Largest number of records a store accepts in one batched update.
pub const STORE_MAX_BATCH_SIZE: usize = 100;

/// Bounds on request sizes and pagination rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLimits {
    /// Records per page (default: 500).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Pagination rounds before giving up (default: 100).
    ///
    /// Together with `page_size` this caps one fetch at 50,000 records.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Join keys per `in (...)` clause (default: 100).
    #[serde(default = "default_key_chunk_size")]
    pub key_chunk_size: usize,
    /// Records per batched contact update (default: 100).
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
}

fn default_page_size() -> usize {
    STORE_MAX_PAGE_SIZE
}

fn default_max_rounds() -> usize {
    100
}

fn default_key_chunk_size() -> usize {
    100
}

fn default_write_batch_size() -> usize {
    STORE_MAX_BATCH_SIZE
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_rounds: default_max_rounds(),
            key_chunk_size: default_key_chunk_size(),
            write_batch_size: default_write_batch_size(),
        }
    }
}

impl FetchLimits {
    /// Most records one paginated fetch may return.
    ///
    /// Exclusive when the store omits the total count: a collection of
    /// exactly this size still exceeds the round limit.
    pub fn record_ceiling(&self) -> usize {
        self.page_size.saturating_mul(self.max_rounds)
    }

    /// Reject zero sizes and sizes above the store's ceilings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("page_size", self.page_size, STORE_MAX_PAGE_SIZE),
            ("max_rounds", self.max_rounds, usize::MAX),
            ("key_chunk_size", self.key_chunk_size, usize::MAX),
            ("write_batch_size", self.write_batch_size, STORE_MAX_BATCH_SIZE),
        ];
        for (field, value, max) in checks {
            if value == 0 || value > max {
                return Err(ConfigError::Invalid {
                    field: format!("limits.{}", field),
                    reason: format!("must be between 1 and {}", max),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_store_ceilings() {
        let limits = FetchLimits::default();
        assert_eq!(limits.page_size, 500);
        assert_eq!(limits.max_rounds, 100);
        assert_eq!(limits.key_chunk_size, 100);
        assert_eq!(limits.write_batch_size, 100);
        assert_eq!(limits.record_ceiling(), 50_000);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let limits: FetchLimits = toml::from_str("page_size = 200").unwrap();
        assert_eq!(limits.page_size, 200);
        assert_eq!(limits.max_rounds, 100);
    }

    #[test]
    fn zero_and_oversized_values_rejected() {
        let zero = FetchLimits {
            key_chunk_size: 0,
            ..FetchLimits::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "limits.key_chunk_size"
        ));

        let oversized = FetchLimits {
            write_batch_size: 101,
            ..FetchLimits::default()
        };
        assert!(oversized.validate().is_err());
    }
}
