//! coldmirror CLI - mirror a document catalog into a cold-storage vault.
//!
//! Each invocation performs one sync pass. While the vault inventory is
//! being imported a pass may end early; run the tool again later.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use coldmirror_catalog::SqliteCatalog;
use coldmirror_storage::LocalArchiveClient;
use coldmirror_sync::{format_bytes, ManifestStore, RunOutcome, SyncConfig, SyncDriver};

/// Four hours, the typical wait for a real vault inventory.
const DEFAULT_JOB_DELAY_SECS: u64 = 4 * 60 * 60;

#[derive(Parser, Debug)]
#[command(name = "coldmirror")]
#[command(about = "coldmirror - Mirror cataloged documents into a cold-storage vault")]
#[command(version)]
struct Cli {
    /// Path to the manifest file.
    manifest: PathBuf,

    /// SQLite database holding the document catalog.
    #[arg(short, long)]
    catalog: PathBuf,

    /// Directory backing the archive vault.
    #[arg(long)]
    vault_root: PathBuf,

    /// Seconds before a requested inventory job completes.
    #[arg(long, default_value_t = DEFAULT_JOB_DELAY_SECS)]
    job_delay_secs: u64,

    /// Retries for a failed archive create or delete.
    #[arg(long, default_value_t = SyncConfig::default().max_retries)]
    max_retries: u32,

    /// Discard imported inventory state and request a fresh inventory.
    #[arg(long)]
    refresh_inventory: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let store = ManifestStore::new(&cli.manifest);
    let mut manifest = store
        .load()
        .await
        .with_context(|| format!("Failed to load manifest {}", cli.manifest.display()))?;

    if cli.refresh_inventory {
        info!("Discarding imported inventory state");
        manifest.reset_inventory();
        store
            .save(&manifest)
            .await
            .context("Failed to save manifest")?;
    }

    let client = LocalArchiveClient::new(
        &cli.vault_root,
        manifest.vault_name.clone(),
        manifest.region.clone(),
        Duration::from_secs(cli.job_delay_secs),
    )
    .with_context(|| format!("Failed to open vault at {}", cli.vault_root.display()))?;

    let catalog = SqliteCatalog::open(&cli.catalog)
        .with_context(|| format!("Failed to open catalog {}", cli.catalog.display()))?;

    let config = SyncConfig {
        max_retries: cli.max_retries,
        ..SyncConfig::default()
    };

    let mut driver = SyncDriver::new(store, Arc::new(client), catalog, config);
    let report = driver.run(&mut manifest).await.context("Sync failed")?;

    match report.outcome {
        RunOutcome::InventoryRequested(job_id) => {
            info!("Inventory job {} requested; run again once it completes", job_id)
        }
        RunOutcome::InventoryPending(job_id) => {
            info!("Inventory job {} still pending; nothing synced", job_id)
        }
        RunOutcome::Synced => info!(
            "Synced {} files ({}), {} unchanged",
            report.files_uploaded,
            format_bytes(report.bytes_transferred as f64),
            report.unchanged
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from([
            "coldmirror",
            "manifest.txt",
            "--catalog",
            "docs.db",
            "--vault-root",
            "vault",
        ])
        .unwrap();

        assert_eq!(cli.manifest, PathBuf::from("manifest.txt"));
        assert_eq!(cli.job_delay_secs, DEFAULT_JOB_DELAY_SECS);
        assert_eq!(cli.max_retries, 2);
        assert!(!cli.refresh_inventory);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_manifest_is_required() {
        let result = Cli::try_parse_from(["coldmirror", "--catalog", "docs.db"]);
        assert!(result.is_err());
    }
}
