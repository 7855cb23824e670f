//! Run a full sync pass.

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use tally_sync_client::SyncError;
use tally_sync_core::Progress;

use crate::settings::Settings;

/// Exit status of a cancelled run.
const EXIT_CANCELLED: u8 = 2;

/// Run the run command.
///
/// Ctrl-C stops the run at its next checkpoint; the partial counts are
/// printed and the process exits with status 2.
pub async fn run(settings: &Settings) -> Result<ExitCode> {
    let engine = super::build_engine(settings)?;
    let cancel = watch_interrupt();

    let result = engine
        .run_sync(
            |progress| println!("{}", format_progress(progress)),
            move || cancel.load(Ordering::SeqCst),
        )
        .await;

    match result {
        Ok(result) => {
            println!();
            println!(
                "Sync complete: {} parents, {} contacts updated.",
                result.parents_updated, result.contacts_updated
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(SyncError::Cancelled {
            parents_updated,
            contacts_updated,
        }) => {
            println!();
            println!(
                "Sync cancelled: {} parents, {} contacts updated before stopping.",
                parents_updated, contacts_updated
            );
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(e) => Err(e).context("Sync failed"),
    }
}

/// Set the returned flag on the first Ctrl-C.
fn watch_interrupt() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next checkpoint");
            flag.store(true, Ordering::SeqCst);
        }
    });
    cancel
}

fn format_progress(progress: &Progress) -> String {
    let mut line = format!("[{}]", progress.phase);
    if progress.total > 0 {
        line.push_str(&format!(" {}/{}", progress.current, progress.total));
    }
    if progress.contacts_updated > 0 {
        line.push_str(&format!(" contacts {}", progress.contacts_updated));
    }
    line
}
