//! Settings file for the tally-sync CLI.
//!
//! Settings are loaded from a TOML file (default: `tally-sync.toml`).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tally_sync_client::{RestStoreConfig, DEFAULT_CREATED_AT_FIELD};
use tally_sync_core::FetchLimits;
use tally_sync_types::CollectionId;

/// Root settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Record store connection.
    pub store: StoreSettings,
    /// What to sync.
    pub sync: SyncSettings,
    /// Fetch and write limits (default: store ceilings).
    #[serde(default)]
    pub limits: FetchLimits,
}

/// Record store connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Base URL, e.g. `https://example.cybozu.com`.
    pub base_url: String,
    /// API token. Prefer `api_token_env` outside of local testing.
    pub api_token: Option<String>,
    /// Environment variable holding the API token.
    pub api_token_env: Option<String>,
    /// Guest space id, if the collections live in one.
    pub guest_space: Option<u64>,
    /// Field holding the record creation timestamp (default: `作成日時`).
    #[serde(default = "default_created_at_field")]
    pub created_at_field: String,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Sync target settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Parent collection id.
    pub parent_collection: String,
    /// Path to the stored plugin configuration (JSON).
    ///
    /// Relative paths are resolved against the settings file's directory.
    #[serde(default = "default_plugin_config")]
    pub plugin_config: PathBuf,
}

// Default value functions
fn default_created_at_field() -> String {
    DEFAULT_CREATED_AT_FIELD.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_plugin_config() -> PathBuf {
    PathBuf::from("plugin-config.json")
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// parent collection is blank.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut settings: Settings = toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        if settings.sync.parent_collection.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "sync.parent_collection",
                reason: "must not be empty".into(),
            });
        }
        if settings.sync.plugin_config.is_relative() {
            if let Some(dir) = path.parent() {
                settings.sync.plugin_config = dir.join(&settings.sync.plugin_config);
            }
        }
        Ok(settings)
    }

    /// The parent collection to sync.
    pub fn parent(&self) -> CollectionId {
        CollectionId::new(self.sync.parent_collection.trim())
    }

    /// Read the stored plugin configuration document.
    pub fn read_plugin_config(&self) -> Result<String, SettingsError> {
        let path = &self.sync.plugin_config;
        std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.clone(),
            source: e,
        })
    }

    /// Store client configuration, with the API token resolved.
    pub fn rest_config(&self) -> Result<RestStoreConfig, SettingsError> {
        let store = &self.store;
        let token = self.api_token()?;
        let mut config = RestStoreConfig::new(&store.base_url, &token)
            .with_created_at_field(&store.created_at_field)
            .with_timeout(Duration::from_secs(store.timeout_secs));
        if let Some(space) = store.guest_space {
            config = config.with_guest_space(space);
        }
        Ok(config)
    }

    fn api_token(&self) -> Result<String, SettingsError> {
        if let Some(name) = &self.store.api_token_env {
            return match std::env::var(name) {
                Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
                _ => Err(SettingsError::TokenEnvUnset { name: name.clone() }),
            };
        }
        match &self.store.api_token {
            Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(SettingsError::MissingToken),
        }
    }
}

/// Settings error types.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Failed to read a file named by the settings.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the settings file.
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        /// Path to the settings file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A setting has an unusable value.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Dotted name of the setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// Neither `api_token` nor `api_token_env` is set.
    #[error("no api token: set store.api_token or store.api_token_env")]
    MissingToken,
    /// `api_token_env` names a variable that is unset or empty.
    #[error("environment variable {name} is not set")]
    TokenEnvUnset {
        /// Variable name.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
[store]
base_url = "https://example.cybozu.com"
api_token = "secret"

[sync]
parent_collection = "42"
"#;

    fn write_settings(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("tally-sync.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    // ===========================================
    // Parsing Tests
    // ===========================================

    #[test]
    fn minimal_settings_use_defaults() {
        let settings: Settings = toml::from_str(MINIMAL).unwrap();
        assert_eq!(settings.store.created_at_field, "作成日時");
        assert_eq!(settings.store.timeout_secs, 30);
        assert_eq!(settings.store.guest_space, None);
        assert_eq!(settings.sync.plugin_config, PathBuf::from("plugin-config.json"));
        assert_eq!(settings.limits, FetchLimits::default());
    }

    #[test]
    fn settings_from_toml_string() {
        let toml = r#"
[store]
base_url = "https://example.cybozu.com/"
api_token_env = "TALLY_SYNC_TOKEN"
guest_space = 7
created_at_field = "created"
timeout_secs = 5

[sync]
parent_collection = " 42 "
plugin_config = "/etc/tally/plugin.json"

[limits]
page_size = 200
write_batch_size = 50
"#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.store.guest_space, Some(7));
        assert_eq!(settings.store.created_at_field, "created");
        assert_eq!(settings.store.timeout_secs, 5);
        assert_eq!(settings.parent(), CollectionId::new("42"));
        assert_eq!(settings.limits.page_size, 200);
        assert_eq!(settings.limits.write_batch_size, 50);
        assert_eq!(settings.limits.max_rounds, 100);
        assert_eq!(settings.limits.key_chunk_size, 100);
    }

    #[test]
    fn missing_sync_section_fails_to_parse() {
        let toml = r#"
[store]
base_url = "https://example.cybozu.com"
"#;
        assert!(toml::from_str::<Settings>(toml).is_err());
    }

    // ===========================================
    // File Loading Tests
    // ===========================================

    #[test]
    fn plugin_config_resolves_next_to_settings() {
        let dir = tempdir().unwrap();
        let path = write_settings(dir.path(), MINIMAL);

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.sync.plugin_config, dir.path().join("plugin-config.json"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = Settings::from_file(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = write_settings(dir.path(), "[store\nbase_url = ");

        let err = Settings::from_file(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn blank_parent_collection_rejected() {
        let dir = tempdir().unwrap();
        let path = write_settings(dir.path(), &MINIMAL.replace("\"42\"", "\"  \""));

        let err = Settings::from_file(&path).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid { field: "sync.parent_collection", .. }
        ));
    }

    // ===========================================
    // Store Config Tests
    // ===========================================

    #[test]
    fn rest_config_carries_store_settings() {
        let toml = format!("{}\n", MINIMAL.replace(
            "api_token = \"secret\"",
            "api_token = \"secret\"\nguest_space = 3\ntimeout_secs = 9",
        ));
        let settings: Settings = toml::from_str(&toml).unwrap();

        let config = settings.rest_config().unwrap();
        assert_eq!(config.api_token, "secret");
        assert_eq!(config.guest_space, Some(3));
        assert_eq!(config.timeout, Duration::from_secs(9));
        assert_eq!(config.created_at_field, "作成日時");
    }

    #[test]
    fn missing_token_is_reported() {
        let settings: Settings =
            toml::from_str(&MINIMAL.replace("api_token = \"secret\"", "")).unwrap();
        assert!(matches!(settings.rest_config(), Err(SettingsError::MissingToken)));
    }

    #[test]
    fn unset_token_variable_is_named() {
        let toml = MINIMAL.replace(
            "api_token = \"secret\"",
            "api_token_env = \"TALLY_SYNC_TEST_TOKEN_NEVER_SET\"",
        );
        let settings: Settings = toml::from_str(&toml).unwrap();

        let err = settings.rest_config().unwrap_err();
        assert!(err.to_string().contains("TALLY_SYNC_TEST_TOKEN_NEVER_SET"));
    }
}
