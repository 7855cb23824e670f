//! Sync configuration: stored schema, migration and validation.
//!
//! The configuration screen persists a loosely shaped JSON document. Its keys
//! changed over time (a single contact target field became a per-rule one) and
//! values arrive as strings, numbers or the literal `"undefined"`. This module
//! reads that document exactly once into [`StoredConfig`], migrates it into the
//! strongly typed [`SyncConfig`], and validates the result. Nothing downstream
//! looks at the raw document.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tally_sync_types::CollectionId;
use thiserror::Error;

/// Newest stored schema version this crate understands.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration was stored.
    #[error("sync configuration is missing")]
    Missing,

    /// A field is absent or has an unusable value.
    #[error("invalid configuration field {field}: {reason}")]
    Invalid {
        /// Name of the offending field, in stored-schema terms.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The document is not valid JSON.
    #[error("configuration is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Written by a newer configuration screen.
    #[error("unsupported configuration version {0}")]
    UnsupportedVersion(u32),

    /// The document configures a different plugin mode.
    #[error("configuration is in '{0}' mode and cannot drive a sync")]
    WrongMode(String),
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ===========================================
// Stored schema
// ===========================================

/// The configuration document as persisted by the configuration screen.
///
/// Every field is optional; ids may be stored as numbers or strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredConfig {
    /// Schema version; absent in documents written before versioning.
    pub version: Option<u32>,
    /// `"parent"` (sync source) or `"contact"` (read-only field settings).
    #[serde(deserialize_with = "lenient_text")]
    pub mode: String,
    /// Join field on the parent collection.
    #[serde(deserialize_with = "lenient_text")]
    pub parent_group_id_field: String,
    /// One row per child rule.
    pub child_app_settings: Vec<StoredChildRow>,
    /// Contact collection id.
    #[serde(deserialize_with = "lenient_text")]
    pub contact_app_id: String,
    /// Join field on the contact collection.
    #[serde(deserialize_with = "lenient_text")]
    pub contact_group_id_field: String,
    /// Single contact target field from version 1 documents.
    #[serde(deserialize_with = "lenient_text")]
    pub contact_target_field: String,
    /// Parent target of the first row, from documents predating per-row targets.
    #[serde(deserialize_with = "lenient_text")]
    pub parent_target_field: String,
}

/// One child rule row of the stored document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredChildRow {
    /// Child collection id.
    #[serde(deserialize_with = "lenient_text")]
    pub app_id: String,
    /// Join field on the child collection.
    #[serde(deserialize_with = "lenient_text")]
    pub group_id_field_code: String,
    /// `"existence"` or `"copy"`.
    #[serde(deserialize_with = "lenient_text")]
    pub mode: String,
    /// Child field copied in copy mode.
    #[serde(deserialize_with = "lenient_text")]
    pub copy_source_field_code: String,
    /// Parent field receiving the value.
    #[serde(deserialize_with = "lenient_text")]
    pub target_field_code: String,
    /// Contact field receiving the value (version 2).
    #[serde(deserialize_with = "lenient_text")]
    pub contact_target_field: String,
}

/// Accept strings, numbers, booleans and null as text.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

impl StoredConfig {
    /// Parse a stored document.
    ///
    /// Accepts the config object itself, an envelope `{"config": "<json>"}`,
    /// or a JSON string holding the config.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::Missing);
        }
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Err(ConfigError::Missing),
            Value::String(inner) => Self::from_json(&inner),
            Value::Object(mut map) => match map.remove("config") {
                Some(Value::String(inner)) => Self::from_json(&inner),
                Some(other) => {
                    map.insert("config".to_string(), other);
                    Ok(serde_json::from_value(Value::Object(map))?)
                }
                None => Ok(serde_json::from_value(Value::Object(map))?),
            },
            _ => Err(ConfigError::invalid("config", "expected a JSON object")),
        }
    }

    /// Schema version, inferred for unversioned documents.
    pub fn schema_version(&self) -> u32 {
        match self.version {
            Some(v) => v,
            None if self
                .child_app_settings
                .iter()
                .any(|row| !clean(&row.contact_target_field).is_empty()) =>
            {
                2
            }
            None => 1,
        }
    }
}

/// Trim and treat the UI's `"undefined"` artefact as empty.
fn clean(s: &str) -> &str {
    let s = s.trim();
    if s == "undefined" {
        ""
    } else {
        s
    }
}

fn optional(s: &str) -> Option<String> {
    let s = clean(s);
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// ===========================================
// Typed configuration
// ===========================================

/// How a rule derives its value from matching child records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Whether any child record exists.
    Existence,
    /// A field value of the latest child record.
    Copy,
}

impl Mode {
    fn parse(s: &str) -> Option<Self> {
        match clean(s) {
            "" | "existence" => Some(Mode::Existence),
            "copy" => Some(Mode::Copy),
            _ => None,
        }
    }
}

/// A child collection plus the field it joins on.
///
/// Rules sharing a source share one bulk fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildSource {
    /// Child collection.
    pub collection: CollectionId,
    /// Join field on the child collection.
    pub join_field: String,
}

/// Derivation rule for one child collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRule {
    /// Child collection to read.
    pub source: CollectionId,
    /// Join field on the child collection.
    pub join_field: String,
    /// Computation strategy.
    pub mode: Mode,
    /// Field copied from the latest child record (copy mode).
    pub copy_source_field: Option<String>,
    /// Parent field receiving the value; empty disables the rule.
    pub target_field: String,
    /// Contact field receiving the value.
    pub contact_target_field: Option<String>,
    /// 1-based row of the configuration form this rule came from.
    pub row: usize,
}

impl ChildRule {
    /// Whether the rule writes anything.
    pub fn is_active(&self) -> bool {
        !self.target_field.is_empty()
    }

    /// The bulk-fetch key of this rule.
    pub fn child_source(&self) -> ChildSource {
        ChildSource {
            collection: self.source.clone(),
            join_field: self.join_field.clone(),
        }
    }
}

/// Contact collection that receives propagated values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactLink {
    /// Contact collection.
    pub collection: CollectionId,
    /// Join field on the contact collection.
    pub join_field: String,
}

/// Validated, immutable input of a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Join field on the parent collection.
    pub parent_join_field: String,
    /// Child rules in configured order.
    pub rules: Vec<ChildRule>,
    /// Contact propagation target, if configured.
    pub contact: Option<ContactLink>,
    /// Contact field used when no rule names its own contact target.
    pub legacy_contact_field: Option<String>,
}

impl SyncConfig {
    /// Parse, migrate and validate a stored document.
    pub fn load(raw: &str) -> Result<Self, ConfigError> {
        let config = Self::from_stored(StoredConfig::from_json(raw)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Migrate a stored document into the typed form.
    ///
    /// Rows without a child collection are blank form rows and are dropped.
    pub fn from_stored(stored: StoredConfig) -> Result<Self, ConfigError> {
        let version = stored.schema_version();
        if version > CURRENT_SCHEMA_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        match clean(&stored.mode) {
            "" | "parent" => {}
            other => return Err(ConfigError::WrongMode(other.to_string())),
        }

        let mut rules = Vec::with_capacity(stored.child_app_settings.len());
        for (index, row) in stored.child_app_settings.iter().enumerate() {
            let row_no = index + 1;
            let Some(source) = optional(&row.app_id) else {
                continue;
            };
            let mode = Mode::parse(&row.mode).ok_or_else(|| {
                ConfigError::invalid(
                    format!("childAppSettings[{}].mode", row_no),
                    format!("unknown mode '{}'", row.mode),
                )
            })?;
            let mut target_field = clean(&row.target_field_code).to_string();
            if index == 0 && target_field.is_empty() {
                target_field = clean(&stored.parent_target_field).to_string();
            }
            let join_field = clean(&row.group_id_field_code).to_string();
            if !target_field.is_empty() && join_field.is_empty() {
                return Err(ConfigError::invalid(
                    format!("childAppSettings[{}].groupIdFieldCode", row_no),
                    "a join field is required when a target field is set",
                ));
            }
            // Version 1 had no per-row contact target.
            let contact_target_field = if version >= 2 {
                optional(&row.contact_target_field)
            } else {
                None
            };
            rules.push(ChildRule {
                source: CollectionId::new(source),
                join_field,
                mode,
                copy_source_field: optional(&row.copy_source_field_code),
                target_field,
                contact_target_field,
                row: row_no,
            });
        }

        let contact = match optional(&stored.contact_app_id) {
            Some(collection) => {
                let join_field = optional(&stored.contact_group_id_field).ok_or_else(|| {
                    ConfigError::invalid(
                        "contactGroupIdField",
                        "a join field is required when a contact collection is set",
                    )
                })?;
                Some(ContactLink {
                    collection: CollectionId::new(collection),
                    join_field,
                })
            }
            None => None,
        };

        Ok(Self {
            parent_join_field: clean(&stored.parent_group_id_field).to_string(),
            rules,
            contact,
            legacy_contact_field: optional(&stored.contact_target_field),
        })
    }

    /// Check the invariants a sync run depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parent_join_field.is_empty() {
            return Err(ConfigError::invalid(
                "parentJoinField",
                "the parent join field must be set",
            ));
        }
        if !self.rules.iter().any(ChildRule::is_active) {
            return Err(ConfigError::invalid(
                "childRules",
                "at least one rule needs a target field",
            ));
        }
        for rule in self.active_rules() {
            let row_no = rule.row;
            if rule.source.as_str().is_empty() {
                return Err(ConfigError::invalid(
                    format!("childAppSettings[{}].appId", row_no),
                    "a child collection is required",
                ));
            }
            if rule.join_field.is_empty() {
                return Err(ConfigError::invalid(
                    format!("childAppSettings[{}].groupIdFieldCode", row_no),
                    "a join field is required",
                ));
            }
            if rule.mode == Mode::Copy && rule.copy_source_field.is_none() {
                return Err(ConfigError::invalid(
                    format!("childAppSettings[{}].copySourceFieldCode", row_no),
                    "copy mode needs a source field",
                ));
            }
        }
        if let Some(contact) = &self.contact {
            if contact.collection.as_str().is_empty() || contact.join_field.is_empty() {
                return Err(ConfigError::invalid(
                    "contactJoinField",
                    "contact collection and join field must both be set",
                ));
            }
        }
        Ok(())
    }

    /// Rules with a target field, in configured order.
    pub fn active_rules(&self) -> impl Iterator<Item = &ChildRule> {
        self.rules.iter().filter(|r| r.is_active())
    }

    /// Distinct child sources of the active rules.
    pub fn child_sources(&self) -> BTreeSet<ChildSource> {
        self.active_rules().map(ChildRule::child_source).collect()
    }

    /// Every collection a run reads from, parent first, without duplicates.
    pub fn collections_to_probe(&self, parent: &CollectionId) -> Vec<CollectionId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let contact = self.contact.as_ref().map(|c| c.collection.clone());
        let children = self.active_rules().map(|r| r.source.clone());
        for id in std::iter::once(parent.clone()).chain(contact).chain(children) {
            if seen.insert(id.clone()) {
                out.push(id);
            }
        }
        out
    }
}
