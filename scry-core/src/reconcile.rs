use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::fs::DirectoryLister;
use crate::ocr::OcrEngine;
use crate::progress::ScanProgress;
use crate::queue::WorkQueue;
use crate::storage::ScreenshotRepository;
use scry_model::ScreenshotStatus;

/// Result of a reconciliation pass, mostly useful for logs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileReport {
    pub total_files: u64,
    pub interrupted: u64,
    pub new_backlog: u64,
}

/// Startup reconciliation: bring the record store and the watched directory
/// back into agreement before steady-state watching begins.
///
/// Items left Pending or Processing by a prior run that crashed or was killed
/// mid-extraction are re-queued ahead of newly discovered files, so nothing
/// is ever abandoned in an inconsistent state across restarts. They go at the
/// front of the backlog lane rather than onto the priority lane: the priority
/// lane stays reserved for live captures, and since workers drain it before
/// every backlog pop, interrupted items still run before any new file.
pub struct Reconciler {
    config: Arc<PipelineConfig>,
    repo: Arc<dyn ScreenshotRepository>,
    engine: Arc<dyn OcrEngine>,
    lister: Arc<dyn DirectoryLister>,
    queue: Arc<WorkQueue>,
    progress: Arc<ScanProgress>,
}

impl Reconciler {
    pub fn new(
        config: Arc<PipelineConfig>,
        repo: Arc<dyn ScreenshotRepository>,
        engine: Arc<dyn OcrEngine>,
        lister: Arc<dyn DirectoryLister>,
        queue: Arc<WorkQueue>,
        progress: Arc<ScanProgress>,
    ) -> Self {
        Self {
            config,
            repo,
            engine,
            lister,
            queue,
            progress,
        }
    }

    /// Populate the backlog lane and close it. The caller is expected to run
    /// the bulk worker phase afterwards.
    pub async fn run(&self) -> Result<ReconcileReport> {
        self.await_engine_ready().await?;

        // Interrupted items from a prior run, oldest first.
        let interrupted = self
            .repo
            .list_by_status(&[ScreenshotStatus::Pending, ScreenshotStatus::Processing])
            .await?;

        let all_files: Vec<_> = self
            .lister
            .list_files(&self.config.watch_dir)
            .await?
            .into_iter()
            .filter(|p| self.config.matches_extension(p))
            .collect();

        let existing_paths = self.repo.list_all_paths().await?;
        let record_count = self.repo.count_all().await?;

        // Pair new paths with their creation time so the backlog can be
        // ordered newest-first.
        let mut new_backlog = Vec::new();
        for path in &all_files {
            if existing_paths.contains(path) {
                continue;
            }
            let created_at = self.lister.created_at(path).await?;
            new_backlog.push((path.clone(), created_at));
        }
        new_backlog.sort_by(|a, b| b.1.cmp(&a.1));

        // Pre-insert Pending records so the store reflects the full expected
        // item count before any extraction begins.
        for (path, created_at) in &new_backlog {
            self.repo.insert_pending(path, *created_at).await?;
        }

        let already_indexed = record_count.saturating_sub(interrupted.len() as u64);
        let is_scanning = !new_backlog.is_empty() || !interrupted.is_empty();
        self.progress
            .begin_scan(all_files.len() as u64, already_indexed, is_scanning);

        info!(
            new = new_backlog.len(),
            interrupted = interrupted.len(),
            already_indexed,
            "reconciliation found work"
        );

        // Interrupted items re-queue ahead of the new backlog.
        for record in &interrupted {
            if let Err(e) = self.queue.push_backlog(&record.path) {
                warn!(path = %record.path.display(), "failed to enqueue interrupted item: {e}");
            }
        }
        for (path, _) in &new_backlog {
            if let Err(e) = self.queue.push_backlog(path) {
                warn!(path = %path.display(), "failed to enqueue backlog item: {e}");
            }
        }
        self.queue.close_backlog();

        Ok(ReconcileReport {
            total_files: all_files.len() as u64,
            interrupted: interrupted.len() as u64,
            new_backlog: new_backlog.len() as u64,
        })
    }

    async fn await_engine_ready(&self) -> Result<()> {
        let progress = Arc::clone(&self.progress);
        let last_status: Mutex<Option<String>> = Mutex::new(None);
        let on_status = move |status: &str| {
            // Only distinct transitions reach subscribers.
            let mut last = last_status.lock().expect("engine status lock");
            if last.as_deref() == Some(status) {
                return;
            }
            *last = Some(status.to_owned());
            info!(status, "extraction engine");
            progress.set_engine_status(Some(status.to_owned()));
        };

        self.engine.await_ready(&on_status).await?;
        self.progress.set_engine_status(None);
        Ok(())
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("watch_dir", &self.config.watch_dir)
            .finish_non_exhaustive()
    }
}
