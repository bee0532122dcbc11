use std::path::Path;
use std::sync::Arc;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::events::IndexEventBus;
use crate::fs::DirectoryLister;
use crate::ocr::OcrEngine;
use crate::progress::ScanProgress;
use crate::queue::WorkQueue;
use crate::reconcile::Reconciler;
use crate::storage::ScreenshotRepository;
use crate::watcher::ScreenshotWatcher;
use crate::worker::WorkerPool;
use scry_model::{IndexEvent, ProgressSnapshot};

/// The whole ingestion pipeline as one explicitly sequenced task:
/// watcher first, then reconciliation plus the bulk worker phase, then the
/// steady-state consumer until cancellation.
pub struct IndexPipeline {
    config: Arc<PipelineConfig>,
    repo: Arc<dyn ScreenshotRepository>,
    engine: Arc<dyn OcrEngine>,
    lister: Arc<dyn DirectoryLister>,
    queue: Arc<WorkQueue>,
    progress: Arc<ScanProgress>,
    bus: Arc<IndexEventBus>,
    cancel: CancellationToken,
}

impl IndexPipeline {
    pub fn new(
        config: PipelineConfig,
        repo: Arc<dyn ScreenshotRepository>,
        engine: Arc<dyn OcrEngine>,
        lister: Arc<dyn DirectoryLister>,
    ) -> Self {
        let bus = Arc::new(IndexEventBus::new(config.event_capacity));
        let progress = Arc::new(ScanProgress::new(Arc::clone(&bus)));
        Self {
            config: Arc::new(config),
            repo,
            engine,
            lister,
            queue: Arc::new(WorkQueue::new()),
            progress,
            bus,
            cancel: CancellationToken::new(),
        }
    }

    /// Outward-facing contract for the (out of scope) API layer.
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            queue: Arc::clone(&self.queue),
            progress: Arc::clone(&self.progress),
            bus: Arc::clone(&self.bus),
        }
    }

    /// Token observed by every suspension point in the pipeline.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run to completion. Returns once cancellation has propagated through
    /// the watcher, the workers, and any in-flight extraction.
    pub async fn run(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.watch_dir).await?;

        let watcher = Arc::new(ScreenshotWatcher::new(
            Arc::clone(&self.config),
            Arc::clone(&self.repo),
            Arc::clone(&self.lister),
            Arc::clone(&self.queue),
            Arc::clone(&self.progress),
            Arc::clone(&self.bus),
        ));
        // Live detections must flow into the priority lane while the backlog
        // is still being worked, so the watch starts before reconciliation.
        let watcher_handle = watcher.spawn(self.cancel.clone())?;

        let reconciler = Reconciler::new(
            Arc::clone(&self.config),
            Arc::clone(&self.repo),
            Arc::clone(&self.engine),
            Arc::clone(&self.lister),
            Arc::clone(&self.queue),
            Arc::clone(&self.progress),
        );
        // Readiness can wait on a missing engine install forever; shutdown
        // must still win while reconciliation is in flight.
        let report = tokio::select! {
            _ = self.cancel.cancelled() => {
                info!("shutdown requested during startup reconciliation");
                let _ = watcher_handle.task.await;
                return Ok(());
            }
            report = reconciler.run() => report?,
        };

        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&self.repo),
            Arc::clone(&self.engine),
            Arc::clone(&self.queue),
            Arc::clone(&self.progress),
            Arc::clone(&self.bus),
            self.cancel.clone(),
        ));

        pool.run_bulk(self.config.bulk_workers).await;
        self.progress.finish_scan();
        info!(
            processed = report.new_backlog + report.interrupted,
            "finished processing backlog"
        );

        pool.run_steady().await;

        let _ = watcher_handle.task.await;
        Ok(())
    }
}

impl std::fmt::Debug for IndexPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexPipeline")
            .field("watch_dir", &self.config.watch_dir)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Cheap, cloneable view of the pipeline for outward consumers.
#[derive(Clone)]
pub struct PipelineHandle {
    queue: Arc<WorkQueue>,
    progress: Arc<ScanProgress>,
    bus: Arc<IndexEventBus>,
}

impl PipelineHandle {
    pub fn current_progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Live event sequence; begins with a synthetic progress snapshot and
    /// ends when `cancel` fires.
    pub fn subscribe_events(
        &self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = IndexEvent> {
        self.bus.event_stream(self.progress.snapshot(), cancel)
    }

    /// Push an existing item straight onto the priority lane for
    /// re-extraction. Skips detection and insert; the record already exists.
    pub fn enqueue_for_reprocessing(&self, path: &Path) -> Result<()> {
        self.queue.push_priority(path)
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle").finish_non_exhaustive()
    }
}
