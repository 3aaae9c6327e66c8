//! coldmirror sync core
//!
//! This module mirrors a local file corpus into a cold-storage archive vault:
//! - Manifest store: durable record of what the vault holds, saved atomically
//! - Inventory importer: multi-run state machine that seeds the manifest
//!   from the vault's asynchronous inventory jobs
//! - Reconciler: per-file skip / create / replace decision from size and mtime
//! - Sync driver: sequential orchestration with per-file fault containment
//!   and an end-of-run summary

pub mod driver;
pub mod inventory;
pub mod manifest;
pub mod reconcile;
pub mod retry;
pub mod stats;

// Re-export main types
pub use driver::{RunOutcome, RunReport, SyncConfig, SyncDriver};
pub use inventory::{ImportOutcome, InventoryImporter, InventoryState};
pub use manifest::{Manifest, ManifestEntry, ManifestStore};
pub use reconcile::{reconcile, Action, LocalFile, LocalState};
pub use retry::{RetryConfig, RetryExecutor};
pub use stats::{format_bytes, format_duration, transfer_rate, RunStats};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify all main types are accessible
        let _config = SyncConfig::default();
        let _retry_config = RetryConfig::default();
        let _stats = RunStats::start();
        let _manifest = Manifest::new("vault", "region", Vec::new());
    }
}
