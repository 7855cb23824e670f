//! Sync run errors.

use tally_sync_core::ConfigError;
use tally_sync_types::CollectionId;
use thiserror::Error;

use crate::store::StoreError;

/// Why a sync run did not complete.
///
/// Writes committed before the error are kept; a later run converges on the
/// same values.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No configuration was stored.
    #[error("sync configuration is missing")]
    ConfigMissing,

    /// The configuration cannot drive a run.
    #[error("invalid configuration field {field}: {reason}")]
    ConfigInvalid {
        /// Offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A collection rejected the permission probe.
    #[error("no access to collection {collection}: {cause}")]
    PermissionDenied {
        /// Collection that failed the probe.
        collection: CollectionId,
        /// Error returned by the store.
        cause: StoreError,
    },

    /// A paginated fetch hit the round ceiling.
    #[error("pagination round limit exceeded on collection {collection}")]
    LoopLimitExceeded {
        /// Collection being paginated.
        collection: CollectionId,
    },

    /// A store call failed mid-run.
    #[error("store call failed: {0}")]
    Network(#[from] StoreError),

    /// The run stopped at a cancellation checkpoint.
    #[error("sync cancelled after {parents_updated} parents and {contacts_updated} contacts")]
    Cancelled {
        /// Parents written before cancelling.
        parents_updated: usize,
        /// Contacts written before cancelling.
        contacts_updated: usize,
    },
}

impl SyncError {
    /// Whether the run was cancelled rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing => Self::ConfigMissing,
            ConfigError::Invalid { field, reason } => Self::ConfigInvalid { field, reason },
            ConfigError::Parse(e) => Self::ConfigInvalid {
                field: "config".into(),
                reason: e.to_string(),
            },
            ConfigError::UnsupportedVersion(v) => Self::ConfigInvalid {
                field: "version".into(),
                reason: format!("unsupported version {}", v),
            },
            ConfigError::WrongMode(mode) => Self::ConfigInvalid {
                field: "mode".into(),
                reason: format!("'{}' mode cannot drive a sync", mode),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_onto_sync_errors() {
        assert!(matches!(
            SyncError::from(ConfigError::Missing),
            SyncError::ConfigMissing
        ));
        assert!(matches!(
            SyncError::from(ConfigError::WrongMode("contact".into())),
            SyncError::ConfigInvalid { field, .. } if field == "mode"
        ));
        assert!(matches!(
            SyncError::from(ConfigError::UnsupportedVersion(3)),
            SyncError::ConfigInvalid { field, .. } if field == "version"
        ));
    }

    #[test]
    fn store_errors_become_network_errors() {
        let err: SyncError = StoreError::Network("reset".into()).into();
        assert!(matches!(err, SyncError::Network(StoreError::Network(_))));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn cancelled_message_names_counts() {
        let err = SyncError::Cancelled {
            parents_updated: 3,
            contacts_updated: 5,
        };
        assert!(err.is_cancelled());
        assert_eq!(
            err.to_string(),
            "sync cancelled after 3 parents and 5 contacts"
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
    }
}
