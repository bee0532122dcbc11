//! Core library for the scry screenshot indexer.
//!
//! Coordinates four concerns around one watched directory: live file-system
//! events that outrank backlog work, a bounded pool of OCR workers with a
//! consistent per-item status machine, recovery after unclean shutdown, and
//! non-blocking fan-out of state changes to live subscribers.

pub mod config;
pub mod error;
pub mod events;
pub mod fs;
pub mod ocr;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod reconcile;
pub mod storage;
pub mod watcher;
pub mod worker;

pub use config::{ConfigSource, PipelineConfig};
pub use error::{Result, ScryError};
pub use events::IndexEventBus;
pub use fs::{DirectoryLister, RealFs};
pub use ocr::{OcrEngine, TesseractEngine};
pub use pipeline::{IndexPipeline, PipelineHandle};
pub use progress::ScanProgress;
pub use queue::{WorkItem, WorkQueue, WorkTier};
pub use reconcile::{ReconcileReport, Reconciler};
pub use storage::{
    InMemoryScreenshotRepository, PostgresScreenshotRepository, ScreenshotRepository,
};
pub use watcher::ScreenshotWatcher;
pub use worker::WorkerPool;
