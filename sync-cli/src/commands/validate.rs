//! Validate settings and plugin configuration without touching the network.

use anyhow::{Context, Result};
use std::fmt::Write;

use tally_sync_core::{FetchLimits, Mode, SyncConfig};
use tally_sync_types::CollectionId;

use crate::settings::Settings;

/// Run the validate command.
pub fn run(settings: &Settings) -> Result<()> {
    let config = load_config(settings)?;
    print!("{}", render(&settings.parent(), &config, &settings.limits));
    println!();
    println!("Configuration OK.");
    Ok(())
}

/// Load, migrate and validate the plugin configuration and limits.
pub(crate) fn load_config(settings: &Settings) -> Result<SyncConfig> {
    let raw = settings.read_plugin_config()?;
    let config = SyncConfig::load(&raw).with_context(|| {
        format!(
            "Invalid plugin config {}",
            settings.sync.plugin_config.display()
        )
    })?;
    settings.limits.validate().context("Invalid [limits]")?;
    Ok(config)
}

/// Human-readable summary of what a run would do.
fn render(parent: &CollectionId, config: &SyncConfig, limits: &FetchLimits) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Parent:  {} (join: {})", parent, config.parent_join_field);
    let _ = writeln!(out, "Rules:");
    for (index, rule) in config.rules.iter().enumerate() {
        let _ = write!(out, "  [{}] {}", index + 1, rule.source);
        if !rule.is_active() {
            let _ = writeln!(out, " (inactive)");
            continue;
        }
        let mode = match (rule.mode, &rule.copy_source_field) {
            (Mode::Existence, _) => "existence".to_string(),
            (Mode::Copy, Some(field)) => format!("copy {}", field),
            (Mode::Copy, None) => "copy".to_string(),
        };
        let _ = write!(
            out,
            " join {} {} -> {}",
            rule.join_field, mode, rule.target_field
        );
        if let Some(contact) = &rule.contact_target_field {
            let _ = write!(out, " (contact: {})", contact);
        }
        let _ = writeln!(out);
    }
    match &config.contact {
        Some(contact) => {
            let _ = writeln!(
                out,
                "Contact: {} (join: {})",
                contact.collection, contact.join_field
            );
            if let Some(field) = &config.legacy_contact_field {
                let _ = writeln!(out, "  legacy target: {}", field);
            }
        }
        None => {
            let _ = writeln!(out, "Contact: none");
        }
    }
    let _ = writeln!(
        out,
        "Limits:  page {}, rounds {}, keys per query {}, batch {}",
        limits.page_size, limits.max_rounds, limits.key_chunk_size, limits.write_batch_size
    );
    out
}
