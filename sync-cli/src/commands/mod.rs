//! CLI command implementations.

pub mod check;
pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use tally_sync_client::{RestStore, SyncEngine};

use crate::settings::Settings;

/// Build an engine against the REST store named by the settings.
fn build_engine(settings: &Settings) -> Result<SyncEngine<RestStore>> {
    let config = validate::load_config(settings)?;
    let store = RestStore::new(settings.rest_config()?).context("Failed to create store client")?;
    Ok(SyncEngine::new(store, settings.parent(), config).with_limits(settings.limits))
}
