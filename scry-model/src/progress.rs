use serde::{Deserialize, Serialize};

/// Point-in-time view of the scan/index progress counters.
///
/// Snapshots are cheap to clone and are what subscribers see; the mutable
/// aggregate itself lives in `scry-core`. Counters are eventually consistent
/// under concurrent workers, which is fine for a monitoring signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total_files: u64,
    pub already_indexed: u64,
    pub processed_files: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    pub is_scanning: bool,
    /// Human-readable extraction engine phase ("waiting", "checking model", ...)
    /// while startup readiness is still being established.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_status: Option<String>,
}

impl ProgressSnapshot {
    pub fn total_indexed(&self) -> u64 {
        self.already_indexed + self.processed_files
    }

    pub fn remaining_files(&self) -> u64 {
        self.total_files.saturating_sub(self.total_indexed())
    }

    /// Rounded completion percentage. An empty directory counts as done.
    pub fn percent_complete(&self) -> u8 {
        if self.total_files == 0 {
            return 100;
        }
        let pct = (self.total_indexed() as f64 * 100.0 / self.total_files as f64).round();
        pct.min(100.0) as u8
    }
}
