use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::events::IndexEventBus;
use crate::fs::DirectoryLister;
use crate::progress::ScanProgress;
use crate::queue::WorkQueue;
use crate::storage::ScreenshotRepository;
use scry_model::IndexEvent;

/// Debounced observer for the watched screenshot directory.
///
/// Bridges OS file-change notifications into the priority lane of the work
/// queue. Failures inside the handler are logged and swallowed; nothing may
/// kill the watch or leave the directory unobserved.
pub struct ScreenshotWatcher {
    config: Arc<PipelineConfig>,
    repo: Arc<dyn ScreenshotRepository>,
    lister: Arc<dyn DirectoryLister>,
    queue: Arc<WorkQueue>,
    progress: Arc<ScanProgress>,
    bus: Arc<IndexEventBus>,
    recent: DashMap<PathBuf, Instant>,
}

/// Keeps the native watcher and its pump task alive.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    pub task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ScreenshotWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenshotWatcher")
            .field("watch_dir", &self.config.watch_dir)
            .finish_non_exhaustive()
    }
}

impl ScreenshotWatcher {
    pub fn new(
        config: Arc<PipelineConfig>,
        repo: Arc<dyn ScreenshotRepository>,
        lister: Arc<dyn DirectoryLister>,
        queue: Arc<WorkQueue>,
        progress: Arc<ScanProgress>,
        bus: Arc<IndexEventBus>,
    ) -> Self {
        Self {
            config,
            repo,
            lister,
            queue,
            progress,
            bus,
            recent: DashMap::new(),
        }
    }

    /// Start watching the configured directory. Creation events flow through
    /// an unbounded channel into an async pump so the notify callback never
    /// blocks.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Result<WatcherHandle> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_)) {
                        for path in event.paths {
                            let _ = event_tx.send(path);
                        }
                    }
                }
                Err(e) => warn!("watch error: {e:?}"),
            },
            Config::default(),
        )?;

        watcher.watch(&self.config.watch_dir, RecursiveMode::NonRecursive)?;
        info!("watching for screenshots in {}", self.config.watch_dir.display());

        let observer = Arc::clone(&self);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = event_rx.recv() => match received {
                        Some(path) => {
                            if let Err(e) = observer.on_file_created(&path).await {
                                warn!(path = %path.display(), "detection failed: {e}");
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("watcher pump stopped");
        });

        Ok(WatcherHandle {
            _watcher: watcher,
            task,
        })
    }

    /// Handle one creation notification end to end: filter, debounce, settle,
    /// record, announce, enqueue.
    pub async fn on_file_created(&self, path: &Path) -> Result<()> {
        if !self.config.matches_extension(path) {
            return Ok(());
        }

        let now = Instant::now();
        if let Some(last_seen) = self.recent.get(path) {
            if now.duration_since(*last_seen) < self.config.debounce_window() {
                debug!(path = %path.display(), "debounced duplicate creation event");
                return Ok(());
            }
        }
        self.recent.insert(path.to_path_buf(), now);

        // Amortized cleanup; no background timer needed.
        let retention = self.config.debounce_retention();
        self.recent
            .retain(|_, seen| now.duration_since(*seen) < retention);

        // Let partially written files settle before anyone reads them.
        tokio::time::sleep(self.config.settle_delay()).await;

        let record = match self.repo.find_by_path(path).await? {
            Some(existing) => existing,
            None => {
                let created_at = self.lister.created_at(path).await?;
                let record = self.repo.insert_pending(path, created_at).await?;
                self.progress.incr_total();
                record
            }
        };

        self.bus.publish(IndexEvent::ScreenshotDetected {
            id: record.id,
            filename: record.filename(),
        });
        self.queue.push_priority(path)?;
        info!(path = %path.display(), "screenshot detected");
        Ok(())
    }
}
