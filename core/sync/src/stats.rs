//! Run metrics and the end-of-run summary.

use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Counters accumulated over one run.
#[derive(Debug, Clone)]
pub struct RunStats {
    started_at: Instant,
    pub files_uploaded: u64,
    pub bytes_transferred: u64,
    pub unchanged: u64,
    pub missing_local: u64,
    pub upload_failures: u64,
    pub delete_failures: u64,
    pub catalog_failures: u64,
}

impl RunStats {
    /// Start the clock.
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
            files_uploaded: 0,
            bytes_transferred: 0,
            unchanged: 0,
            missing_local: 0,
            upload_failures: 0,
            delete_failures: 0,
            catalog_failures: 0,
        }
    }

    /// Count a successful upload.
    pub fn record_upload(&mut self, size_bytes: u64) {
        self.files_uploaded += 1;
        self.bytes_transferred += size_bytes;
    }

    /// Wall-clock time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Emit the summary lines.
    pub fn log_summary(&self) {
        let elapsed = self.elapsed();
        info!("{} files successfully uploaded.", self.files_uploaded);
        info!(
            "Transferred {} in {} at rate of {}/s.",
            format_bytes(self.bytes_transferred as f64),
            format_duration(elapsed),
            format_bytes(transfer_rate(self.bytes_transferred, elapsed))
        );

        if self.upload_failures + self.delete_failures + self.catalog_failures > 0 {
            warn!(
                "{} uploads failed, {} deletes failed, {} catalog updates failed.",
                self.upload_failures, self.delete_failures, self.catalog_failures
            );
        }
    }
}

/// Bytes per second, defined as zero when no time has elapsed.
pub fn transfer_rate(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs
    } else {
        0.0
    }
}

/// Human-readable byte count, e.g. `1.5 MB`.
pub fn format_bytes(mut bytes: f64) -> String {
    for unit in ["bytes", "KB", "MB", "GB"] {
        if bytes < 1024.0 {
            return format!("{:.1} {}", bytes, unit);
        }
        bytes /= 1024.0;
    }
    format!("{:.1} TB", bytes)
}

/// Human-readable duration, e.g. `1 hour, 2 minutes, 5 seconds`.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let parts = [
        (total / 3600, "hour"),
        ((total % 3600) / 60, "minute"),
        (total % 60, "second"),
    ];

    let rendered: Vec<String> = parts
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{} {}{}", n, unit, if *n == 1 { "" } else { "s" }))
        .collect();

    if rendered.is_empty() {
        "0 seconds".to_string()
    } else {
        rendered.join(", ")
    }
}
