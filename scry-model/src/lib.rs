//! Shared data models for the scry screenshot indexing platform.
//!
//! Everything here is plain data: the per-screenshot record and its status
//! state machine, the progress snapshot surfaced to monitoring clients, and
//! the event union broadcast to live subscribers. Pipeline behaviour lives in
//! `scry-core`.

pub mod events;
pub mod progress;
pub mod screenshot;

pub use events::IndexEvent;
pub use progress::ProgressSnapshot;
pub use screenshot::{ScreenshotRecord, ScreenshotStatus};
