use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a screenshot record.
///
/// `Pending → Processing → Completed | Failed`. A `Failed` item can re-enter
/// `Processing` through an explicit re-extraction request; `Completed` is
/// terminal and later transitions must not regress it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ScreenshotStatus {
    /// Stable string encoding used by the storage layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenshotStatus::Pending => "pending",
            ScreenshotStatus::Processing => "processing",
            ScreenshotStatus::Completed => "completed",
            ScreenshotStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ScreenshotStatus::Pending),
            "processing" => Some(ScreenshotStatus::Processing),
            "completed" => Some(ScreenshotStatus::Completed),
            "failed" => Some(ScreenshotStatus::Failed),
            _ => None,
        }
    }

    /// Terminal success; once set, the record never transitions again.
    pub fn is_completed(&self) -> bool {
        matches!(self, ScreenshotStatus::Completed)
    }
}

impl fmt::Display for ScreenshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One indexed (or to-be-indexed) screenshot. The path is unique per record;
/// the storage layer enforces the constraint and inserts are idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    pub id: Uuid,
    pub path: PathBuf,
    pub status: ScreenshotStatus,
    pub ocr_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScreenshotRecord {
    /// Display filename for events and logs.
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}
