//! Probe every collection a run would touch.

use anyhow::{Context, Result};

use crate::settings::Settings;

/// Run the check command.
pub async fn run(settings: &Settings) -> Result<()> {
    let engine = super::build_engine(settings)?;
    let probed = engine.check().await.context("Permission check failed")?;

    println!("All {} collections are readable:", probed.len());
    for collection in &probed {
        println!("  {}", collection);
    }
    Ok(())
}
