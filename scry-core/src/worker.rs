use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::events::IndexEventBus;
use crate::ocr::OcrEngine;
use crate::progress::ScanProgress;
use crate::queue::{BacklogPop, WorkQueue};
use crate::storage::ScreenshotRepository;
use scry_model::{IndexEvent, ScreenshotStatus};

/// Extraction worker pool.
///
/// Bulk phase: N workers drain the priority lane completely, then take one
/// backlog item each, re-checking priority in between so live captures are
/// never starved by a large backlog. A worker leaves the bulk phase when a
/// backlog pop finds the lane closed and empty.
///
/// Steady state: the backlog is gone and the extraction engine is typically a
/// single heavy resource, so consumption reduces to one reactive loop on the
/// priority lane.
pub struct WorkerPool {
    repo: Arc<dyn ScreenshotRepository>,
    engine: Arc<dyn OcrEngine>,
    queue: Arc<WorkQueue>,
    progress: Arc<ScanProgress>,
    bus: Arc<IndexEventBus>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        repo: Arc<dyn ScreenshotRepository>,
        engine: Arc<dyn OcrEngine>,
        queue: Arc<WorkQueue>,
        progress: Arc<ScanProgress>,
        bus: Arc<IndexEventBus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            repo,
            engine,
            queue,
            progress,
            bus,
            cancel,
        }
    }

    /// Run `workers` concurrent bulk workers to completion.
    pub async fn run_bulk(self: &Arc<Self>, workers: usize) {
        let mut handles = Vec::with_capacity(workers.max(1));
        for worker_id in 0..workers.max(1) {
            let pool = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                pool.bulk_loop(worker_id).await;
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!("bulk worker panicked: {e}");
            }
        }
    }

    async fn bulk_loop(&self, worker_id: usize) {
        debug!(worker_id, "bulk worker started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // Live captures first, always. Detection bumped the total for
            // these, so they count toward processed like backlog items do.
            while let Some(item) = self.queue.try_pop_priority().await {
                self.run_item(&item.path, true, true).await;
                self.progress.incr_processed();
                if self.cancel.is_cancelled() {
                    return;
                }
            }

            match self.queue.try_pop_backlog().await {
                BacklogPop::Item(item) => {
                    self.run_item(&item.path, false, true).await;
                    self.progress.incr_processed();
                }
                BacklogPop::Empty => {
                    // Backlog sender still alive but nothing queued yet; let
                    // the enqueuer make progress instead of spinning.
                    tokio::task::yield_now().await;
                }
                BacklogPop::Closed => break,
            }
        }
        debug!(worker_id, "bulk worker finished");
    }

    /// Steady-state consumer: block on the priority lane until shutdown.
    pub async fn run_steady(&self) {
        info!("steady-state consumer started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                item = self.queue.pop_priority() => match item {
                    Some(item) => {
                        self.run_item(&item.path, true, false).await;
                        self.progress.incr_processed();
                    }
                    None => break,
                },
            }
        }
        info!("steady-state consumer stopped");
    }

    async fn run_item(&self, path: &Path, notify: bool, track_current: bool) {
        if track_current {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            self.progress.set_current_file(filename);
        }
        // An item failure must never take the worker loop down with it.
        if let Err(e) = self.process_image(path, notify).await {
            error!(path = %path.display(), "processing failed: {e}");
        }
    }

    /// Process one image through the status state machine.
    ///
    /// Idempotent against duplicate queueing: an already-Completed record is
    /// left untouched. On extraction failure the record is re-fetched before
    /// marking Failed so a concurrent success is never regressed.
    pub async fn process_image(&self, path: &Path, notify: bool) -> Result<()> {
        let record = match self.repo.find_by_path(path).await? {
            Some(record) => record,
            // Should not happen: detection and reconciliation both pre-insert
            // Pending records. Recover rather than drop the item.
            None => self.repo.insert_pending(path, Utc::now()).await?,
        };

        if record.status.is_completed() {
            debug!(path = %path.display(), "already completed, skipping");
            return Ok(());
        }

        self.repo
            .update_status(record.id, ScreenshotStatus::Processing, None)
            .await?;
        self.bus.publish(IndexEvent::ScreenshotStatusChanged {
            id: record.id,
            status: ScreenshotStatus::Processing,
            ocr_text: None,
        });

        match self.engine.extract_text(path, &self.cancel).await {
            Ok(text) => {
                self.repo
                    .update_status(record.id, ScreenshotStatus::Completed, Some(&text))
                    .await?;
                self.bus.publish(IndexEvent::ScreenshotStatusChanged {
                    id: record.id,
                    status: ScreenshotStatus::Completed,
                    ocr_text: Some(text.clone()),
                });
                if notify {
                    self.bus.publish(IndexEvent::ScreenshotIndexed {
                        id: record.id,
                        filename: record.filename(),
                    });
                }
                info!(path = %path.display(), chars = text.len(), "indexed");
            }
            Err(crate::error::ScryError::Cancelled(_)) => {
                // Shutdown mid-extraction leaves the record Processing so the
                // next startup's interrupted-item recovery re-queues it.
                debug!(path = %path.display(), "extraction cancelled; left for restart recovery");
            }
            Err(e) => {
                warn!(path = %path.display(), "extraction failed: {e}");
                // Re-fetch: a concurrent worker may have completed this path
                // while we were failing, and Completed must win.
                if let Some(current) = self.repo.find_by_path(path).await? {
                    if !current.status.is_completed() {
                        self.repo
                            .update_status(current.id, ScreenshotStatus::Failed, None)
                            .await?;
                        self.bus.publish(IndexEvent::ScreenshotStatusChanged {
                            id: current.id,
                            status: ScreenshotStatus::Failed,
                            ocr_text: None,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
