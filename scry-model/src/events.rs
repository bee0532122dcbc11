use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::progress::ProgressSnapshot;
use crate::screenshot::ScreenshotStatus;

/// Notification fanned out to live subscribers.
///
/// Events are transient: nothing is replayed to a subscriber that was not
/// listening at emission time, and a lagging subscriber loses the oldest
/// events rather than blocking producers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexEvent {
    /// A progress counter changed; carries the full snapshot so subscribers
    /// never need a follow-up read.
    Progress(ProgressSnapshot),
    /// A new file passed the extension filter and was recorded as pending.
    ScreenshotDetected { id: Uuid, filename: String },
    /// A live or re-requested item finished extraction end to end.
    ScreenshotIndexed { id: Uuid, filename: String },
    /// Any per-item status transition, including failures.
    ScreenshotStatusChanged {
        id: Uuid,
        status: ScreenshotStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        ocr_text: Option<String>,
    },
}
