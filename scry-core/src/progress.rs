use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use scry_model::{IndexEvent, ProgressSnapshot};

use crate::events::IndexEventBus;

/// Shared progress aggregate.
///
/// Counters are atomics because multiple workers complete items in the same
/// instant; the string fields are simple last-writer-wins slots. Every
/// mutation publishes a fresh snapshot through the event bus. Readers may see
/// a snapshot mid-update across fields; that staleness is acceptable.
#[derive(Debug)]
pub struct ScanProgress {
    total_files: AtomicU64,
    already_indexed: AtomicU64,
    processed_files: AtomicU64,
    is_scanning: AtomicBool,
    current_file: RwLock<Option<String>>,
    engine_status: RwLock<Option<String>>,
    bus: Arc<IndexEventBus>,
}

impl ScanProgress {
    pub fn new(bus: Arc<IndexEventBus>) -> Self {
        Self {
            total_files: AtomicU64::new(0),
            already_indexed: AtomicU64::new(0),
            processed_files: AtomicU64::new(0),
            is_scanning: AtomicBool::new(false),
            current_file: RwLock::new(None),
            engine_status: RwLock::new(None),
            bus,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_files: self.total_files.load(Ordering::Relaxed),
            already_indexed: self.already_indexed.load(Ordering::Relaxed),
            processed_files: self.processed_files.load(Ordering::Relaxed),
            current_file: self.current_file.read().expect("progress lock").clone(),
            is_scanning: self.is_scanning.load(Ordering::Relaxed),
            engine_status: self.engine_status.read().expect("progress lock").clone(),
        }
    }

    fn notify_change(&self) {
        self.bus.publish(IndexEvent::Progress(self.snapshot()));
    }

    /// Reset counters at the start of a reconciliation pass.
    pub fn begin_scan(&self, total_files: u64, already_indexed: u64, is_scanning: bool) {
        self.total_files.store(total_files, Ordering::Relaxed);
        self.already_indexed.store(already_indexed, Ordering::Relaxed);
        self.processed_files.store(0, Ordering::Relaxed);
        self.is_scanning.store(is_scanning, Ordering::Relaxed);
        self.notify_change();
    }

    pub fn finish_scan(&self) {
        self.is_scanning.store(false, Ordering::Relaxed);
        *self.current_file.write().expect("progress lock") = None;
        self.notify_change();
    }

    pub fn incr_processed(&self) {
        self.processed_files.fetch_add(1, Ordering::Relaxed);
        self.notify_change();
    }

    /// A live detection grows the universe of known files.
    pub fn incr_total(&self) {
        self.total_files.fetch_add(1, Ordering::Relaxed);
        self.notify_change();
    }

    pub fn set_current_file(&self, filename: Option<String>) {
        *self.current_file.write().expect("progress lock") = filename;
        self.notify_change();
    }

    pub fn set_engine_status(&self, status: Option<String>) {
        *self.engine_status.write().expect("progress lock") = status;
        self.notify_change();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress() -> ScanProgress {
        ScanProgress::new(Arc::new(IndexEventBus::new(64)))
    }

    #[test]
    fn begin_scan_resets_processed_counter() {
        let progress = progress();
        progress.incr_processed();
        progress.begin_scan(10, 4, true);

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.total_files, 10);
        assert_eq!(snapshot.already_indexed, 4);
        assert_eq!(snapshot.processed_files, 0);
        assert!(snapshot.is_scanning);
    }

    #[test]
    fn finish_scan_clears_current_file() {
        let progress = progress();
        progress.begin_scan(1, 0, true);
        progress.set_current_file(Some("shot.png".into()));
        progress.finish_scan();

        let snapshot = progress.snapshot();
        assert!(!snapshot.is_scanning);
        assert_eq!(snapshot.current_file, None);
    }

    #[tokio::test]
    async fn every_mutation_publishes_a_progress_event() {
        let bus = Arc::new(IndexEventBus::new(64));
        let progress = ScanProgress::new(bus.clone());
        let mut receiver = bus.subscribe();

        progress.incr_processed();
        match receiver.try_recv() {
            Ok(IndexEvent::Progress(p)) => assert_eq!(p.processed_files, 1),
            other => panic!("expected progress event, got {other:?}"),
        }
    }
}
