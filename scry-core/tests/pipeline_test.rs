//! End-to-end pipeline behaviour on the in-memory repository, a scripted
//! OCR engine, and real temp directories. The native file watcher is not
//! exercised here; detection handling is driven directly so the tests stay
//! deterministic across platforms.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use scry_core::ocr::EngineStatusFn;
use scry_core::queue::BacklogPop;
use scry_core::storage::ScreenshotRepository;
use scry_core::{
    IndexEventBus, IndexPipeline, InMemoryScreenshotRepository, OcrEngine, PipelineConfig, RealFs,
    Reconciler, ScanProgress, ScreenshotWatcher, ScryError, WorkQueue, WorkerPool,
};
use scry_model::{IndexEvent, ScreenshotRecord, ScreenshotStatus};

/// OCR engine with canned per-path outcomes and a recorded call order.
///
/// `gate_first_call` blocks the first extraction until released, which lets a
/// test inject work while an item is verifiably in flight.
#[derive(Default)]
struct ScriptedEngine {
    responses: Mutex<HashMap<PathBuf, VecDeque<Result<String, String>>>>,
    calls: Mutex<Vec<PathBuf>>,
    first_call_started: Mutex<Option<oneshot::Sender<()>>>,
    first_call_release: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ScriptedEngine {
    fn script(&self, path: &Path, outcomes: Vec<Result<&str, &str>>) {
        self.responses.lock().unwrap().insert(
            path.to_path_buf(),
            outcomes
                .into_iter()
                .map(|r| r.map(str::to_owned).map_err(str::to_owned))
                .collect(),
        );
    }

    fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    fn gate_first_call(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.first_call_started.lock().unwrap() = Some(started_tx);
        *self.first_call_release.lock().unwrap() = Some(release_rx);
        (started_rx, release_tx)
    }
}

#[async_trait]
impl OcrEngine for ScriptedEngine {
    async fn await_ready(&self, on_status: EngineStatusFn<'_>) -> scry_core::Result<()> {
        on_status("ready");
        Ok(())
    }

    async fn extract_text(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> scry_core::Result<String> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        if let Some(started) = self.first_call_started.lock().unwrap().take() {
            let _ = started.send(());
        }
        let release = self.first_call_release.lock().unwrap().take();
        if let Some(release) = release {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ScryError::Cancelled(format!(
                        "extraction aborted for {}",
                        path.display()
                    )));
                }
                _ = release => {}
            }
        }

        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(ScryError::Extraction {
                path: path.to_path_buf(),
                reason,
            }),
            None => Ok(format!("text from {}", path.display())),
        }
    }
}

struct Fixture {
    dir: TempDir,
    config: Arc<PipelineConfig>,
    repo: Arc<InMemoryScreenshotRepository>,
    engine: Arc<ScriptedEngine>,
    queue: Arc<WorkQueue>,
    bus: Arc<IndexEventBus>,
    progress: Arc<ScanProgress>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(PipelineConfig {
            watch_dir: dir.path().to_path_buf(),
            settle_delay_ms: 0,
            ..PipelineConfig::default()
        });
        let bus = Arc::new(IndexEventBus::new(64));
        Self {
            dir,
            config,
            repo: Arc::new(InMemoryScreenshotRepository::new()),
            engine: Arc::new(ScriptedEngine::default()),
            queue: Arc::new(WorkQueue::new()),
            progress: Arc::new(ScanProgress::new(Arc::clone(&bus))),
            bus,
        }
    }

    fn file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"not really a png").unwrap();
        path
    }

    fn watcher(&self) -> ScreenshotWatcher {
        ScreenshotWatcher::new(
            Arc::clone(&self.config),
            self.repo.clone(),
            Arc::new(RealFs::new()),
            Arc::clone(&self.queue),
            Arc::clone(&self.progress),
            Arc::clone(&self.bus),
        )
    }

    fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            Arc::clone(&self.config),
            self.repo.clone(),
            self.engine.clone(),
            Arc::new(RealFs::new()),
            Arc::clone(&self.queue),
            Arc::clone(&self.progress),
        )
    }

    fn pool(&self, cancel: CancellationToken) -> Arc<WorkerPool> {
        Arc::new(WorkerPool::new(
            self.repo.clone(),
            self.engine.clone(),
            Arc::clone(&self.queue),
            Arc::clone(&self.progress),
            Arc::clone(&self.bus),
            cancel,
        ))
    }

    async fn status_of(&self, path: &Path) -> ScreenshotStatus {
        self.repo.find_by_path(path).await.unwrap().unwrap().status
    }
}

#[tokio::test]
async fn non_screenshot_extensions_are_ignored() {
    let fx = Fixture::new();
    let watcher = fx.watcher();

    let path = fx.file("notes.txt");
    watcher.on_file_created(&path).await.unwrap();

    assert_eq!(fx.repo.count_all().await.unwrap(), 0);
    assert!(fx.queue.try_pop_priority().await.is_none());
}

#[tokio::test]
async fn duplicate_creation_events_are_debounced() {
    let fx = Fixture::new();
    let watcher = fx.watcher();

    let path = fx.file("shot.png");
    watcher.on_file_created(&path).await.unwrap();
    watcher.on_file_created(&path).await.unwrap();

    assert_eq!(fx.repo.count_all().await.unwrap(), 1);
    assert_eq!(fx.queue.try_pop_priority().await.unwrap().path, path);
    assert!(fx.queue.try_pop_priority().await.is_none());
}

#[tokio::test]
async fn detection_records_announces_and_enqueues() {
    let fx = Fixture::new();
    let watcher = fx.watcher();
    let mut receiver = fx.bus.subscribe();

    let path = fx.file("capture.png");
    watcher.on_file_created(&path).await.unwrap();

    assert_eq!(fx.status_of(&path).await, ScreenshotStatus::Pending);
    assert_eq!(fx.progress.snapshot().total_files, 1);

    // The total-files bump publishes a progress event ahead of the detection.
    let mut saw_detection = false;
    while let Ok(event) = receiver.try_recv() {
        if let IndexEvent::ScreenshotDetected { filename, .. } = event {
            assert_eq!(filename, "capture.png");
            saw_detection = true;
        }
    }
    assert!(saw_detection);
}

#[tokio::test]
async fn priority_lane_drains_before_backlog() {
    let fx = Fixture::new();
    let live_a = fx.dir.path().join("live_a.png");
    let live_b = fx.dir.path().join("live_b.png");
    let old = fx.dir.path().join("old.png");

    fx.queue.push_backlog(&old).unwrap();
    fx.queue.push_priority(&live_a).unwrap();
    fx.queue.push_priority(&live_b).unwrap();
    fx.queue.close_backlog();

    let pool = fx.pool(CancellationToken::new());
    pool.run_bulk(1).await;

    assert_eq!(fx.engine.calls(), vec![live_a, live_b, old]);
}

#[tokio::test]
async fn live_capture_preempts_remaining_backlog() {
    let fx = Fixture::new();
    let backlog_a = fx.dir.path().join("backlog_a.png");
    let backlog_b = fx.dir.path().join("backlog_b.png");
    let live = fx.dir.path().join("live.png");

    fx.queue.push_backlog(&backlog_a).unwrap();
    fx.queue.push_backlog(&backlog_b).unwrap();
    fx.queue.close_backlog();

    let (started, release) = fx.engine.gate_first_call();
    let pool = fx.pool(CancellationToken::new());
    let runner = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.run_bulk(1).await })
    };

    // First backlog item is mid-extraction; a live capture arrives now.
    started.await.unwrap();
    fx.queue.push_priority(&live).unwrap();
    release.send(()).unwrap();
    runner.await.unwrap();

    assert_eq!(fx.engine.calls(), vec![backlog_a, live, backlog_b]);
}

#[tokio::test]
async fn completed_records_are_never_reprocessed() {
    let fx = Fixture::new();
    let path = fx.dir.path().join("done.png");
    fx.engine.script(&path, vec![Ok("first pass"), Ok("second pass")]);

    let pool = fx.pool(CancellationToken::new());
    pool.process_image(&path, true).await.unwrap();
    pool.process_image(&path, true).await.unwrap();

    let record = fx.repo.find_by_path(&path).await.unwrap().unwrap();
    assert_eq!(record.status, ScreenshotStatus::Completed);
    assert_eq!(record.ocr_text.as_deref(), Some("first pass"));
    assert_eq!(fx.engine.calls().len(), 1);
}

#[tokio::test]
async fn extraction_failure_marks_failed_and_retry_recovers() {
    let fx = Fixture::new();
    let path = fx.dir.path().join("flaky.png");
    fx.engine
        .script(&path, vec![Err("engine crashed"), Ok("recovered text")]);

    let pool = fx.pool(CancellationToken::new());

    pool.process_image(&path, true).await.unwrap();
    let record = fx.repo.find_by_path(&path).await.unwrap().unwrap();
    assert_eq!(record.status, ScreenshotStatus::Failed);
    assert_eq!(record.ocr_text, None);

    // Re-extraction request runs the same path through the state machine again.
    pool.process_image(&path, true).await.unwrap();
    let record = fx.repo.find_by_path(&path).await.unwrap().unwrap();
    assert_eq!(record.status, ScreenshotStatus::Completed);
    assert_eq!(record.ocr_text.as_deref(), Some("recovered text"));
}

#[tokio::test]
async fn cancellation_mid_extraction_leaves_record_processing() {
    let fx = Fixture::new();
    let path = fx.dir.path().join("inflight.png");
    fx.repo.insert_pending(&path, Utc::now()).await.unwrap();

    let (started, _release) = fx.engine.gate_first_call();
    let cancel = CancellationToken::new();
    let pool = fx.pool(cancel.clone());
    let runner = {
        let pool = Arc::clone(&pool);
        let path = path.clone();
        tokio::spawn(async move { pool.process_image(&path, true).await })
    };

    started.await.unwrap();
    cancel.cancel();
    runner.await.unwrap().unwrap();

    // Left Processing on purpose so startup reconciliation re-queues it.
    assert_eq!(fx.status_of(&path).await, ScreenshotStatus::Processing);
}

#[tokio::test]
async fn reconciliation_requeues_interrupted_items_ahead_of_new_files() {
    let fx = Fixture::new();

    // A record left Processing by a prior run that died mid-extraction.
    let old = fx.file("old.png");
    fx.repo
        .seed(ScreenshotRecord {
            id: Uuid::new_v4(),
            path: old.clone(),
            status: ScreenshotStatus::Processing,
            ocr_text: None,
            created_at: Utc::now() - chrono::Duration::minutes(5),
        })
        .await;

    // Two files the store has never seen, second one newer.
    let new_a = fx.file("new_a.png");
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let new_b = fx.file("new_b.png");

    let report = fx.reconciler().run().await.unwrap();
    assert_eq!(report.total_files, 3);
    assert_eq!(report.interrupted, 1);
    assert_eq!(report.new_backlog, 2);

    // Interrupted first, then new files newest-first.
    let mut order = Vec::new();
    while let BacklogPop::Item(item) = fx.queue.try_pop_backlog().await {
        order.push(item.path);
    }
    assert_eq!(order, vec![old, new_b, new_a]);
    assert!(matches!(
        fx.queue.try_pop_backlog().await,
        BacklogPop::Closed
    ));

    let snapshot = fx.progress.snapshot();
    assert_eq!(snapshot.total_files, 3);
    assert_eq!(snapshot.already_indexed, 0);
    assert!(snapshot.is_scanning);
}

#[tokio::test]
async fn reconciliation_skips_already_indexed_files() {
    let fx = Fixture::new();

    let done = fx.file("done.png");
    fx.repo
        .seed(ScreenshotRecord {
            id: Uuid::new_v4(),
            path: done.clone(),
            status: ScreenshotStatus::Completed,
            ocr_text: Some("already indexed".into()),
            created_at: Utc::now(),
        })
        .await;
    let fresh = fx.file("fresh.png");

    let report = fx.reconciler().run().await.unwrap();
    assert_eq!(report.total_files, 2);
    assert_eq!(report.interrupted, 0);
    assert_eq!(report.new_backlog, 1);

    match fx.queue.try_pop_backlog().await {
        BacklogPop::Item(item) => assert_eq!(item.path, fresh),
        other => panic!("expected the fresh file, got {other:?}"),
    }
    assert_eq!(fx.progress.snapshot().already_indexed, 1);
}

#[tokio::test]
async fn live_capture_completion_keeps_remaining_coherent() {
    let fx = Fixture::new();
    // Startup against an empty directory; the backlog closes with no work.
    fx.reconciler().run().await.unwrap();

    let watcher = fx.watcher();
    let path = fx.file("live.png");
    watcher.on_file_created(&path).await.unwrap();

    let pool = fx.pool(CancellationToken::new());
    pool.run_bulk(1).await;

    // Detection grew the total; the completion must grow processed, or
    // remaining/percent stay wrong for the rest of the process lifetime.
    let snapshot = fx.progress.snapshot();
    assert_eq!(snapshot.total_files, 1);
    assert_eq!(snapshot.processed_files, 1);
    assert_eq!(snapshot.remaining_files(), 0);
    assert_eq!(snapshot.percent_complete(), 100);
}

/// Engine that never becomes ready, standing in for a missing install.
struct NeverReadyEngine;

#[async_trait]
impl OcrEngine for NeverReadyEngine {
    async fn await_ready(&self, on_status: EngineStatusFn<'_>) -> scry_core::Result<()> {
        on_status("waiting for engine install");
        loop {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    async fn extract_text(
        &self,
        path: &Path,
        _cancel: &CancellationToken,
    ) -> scry_core::Result<String> {
        Err(ScryError::EngineUnavailable(format!(
            "engine never became ready for {}",
            path.display()
        )))
    }
}

#[tokio::test]
async fn shutdown_wins_while_engine_readiness_blocks() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        watch_dir: dir.path().to_path_buf(),
        settle_delay_ms: 0,
        ..PipelineConfig::default()
    };
    let pipeline = Arc::new(IndexPipeline::new(
        config,
        Arc::new(InMemoryScreenshotRepository::new()),
        Arc::new(NeverReadyEngine),
        Arc::new(RealFs::new()),
    ));
    let cancel = pipeline.cancel_token();

    let runner = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run().await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancel.cancel();

    let result = tokio::time::timeout(std::time::Duration::from_secs(2), runner)
        .await
        .expect("pipeline did not stop after cancellation")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn bulk_phase_indexes_the_whole_backlog() {
    let fx = Fixture::new();
    let paths = vec![fx.file("a.png"), fx.file("b.png"), fx.file("c.png")];

    fx.reconciler().run().await.unwrap();
    let pool = fx.pool(CancellationToken::new());
    pool.run_bulk(2).await;

    for path in &paths {
        let record = fx.repo.find_by_path(path).await.unwrap().unwrap();
        assert_eq!(record.status, ScreenshotStatus::Completed);
        assert!(record.ocr_text.is_some());
    }
    assert_eq!(fx.progress.snapshot().processed_files, 3);
}
