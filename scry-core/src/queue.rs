use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::error::{Result, ScryError};

/// Which lane a work item travels through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkTier {
    /// Live detections and explicit re-extraction requests. Always drained
    /// before any backlog item is touched.
    Priority,
    /// Startup catch-up work discovered by reconciliation.
    Backlog,
}

/// Ephemeral unit of work; exists only while queued or in flight.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub path: PathBuf,
    pub tier: WorkTier,
}

/// Result of a non-blocking backlog pop.
#[derive(Debug)]
pub enum BacklogPop {
    Item(WorkItem),
    /// Channel open but momentarily empty.
    Empty,
    /// Sender dropped and everything drained; bulk workers exit on this.
    Closed,
}

/// Two unbounded FIFO lanes shared between the observer, reconciliation, and
/// the worker pool. Receivers are wrapped in async mutexes so several bulk
/// workers can consume from the same lanes.
#[derive(Debug)]
pub struct WorkQueue {
    priority_tx: mpsc::UnboundedSender<WorkItem>,
    priority_rx: Arc<Mutex<mpsc::UnboundedReceiver<WorkItem>>>,
    backlog_tx: StdMutex<Option<mpsc::UnboundedSender<WorkItem>>>,
    backlog_rx: Arc<Mutex<mpsc::UnboundedReceiver<WorkItem>>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (priority_tx, priority_rx) = mpsc::unbounded_channel();
        let (backlog_tx, backlog_rx) = mpsc::unbounded_channel();
        Self {
            priority_tx,
            priority_rx: Arc::new(Mutex::new(priority_rx)),
            backlog_tx: StdMutex::new(Some(backlog_tx)),
            backlog_rx: Arc::new(Mutex::new(backlog_rx)),
        }
    }

    pub fn push_priority(&self, path: &Path) -> Result<()> {
        self.priority_tx
            .send(WorkItem {
                path: path.to_path_buf(),
                tier: WorkTier::Priority,
            })
            .map_err(|_| ScryError::Internal("priority queue receiver dropped".into()))
    }

    pub fn push_backlog(&self, path: &Path) -> Result<()> {
        let guard = self.backlog_tx.lock().expect("backlog sender lock");
        let sender = guard
            .as_ref()
            .ok_or_else(|| ScryError::Internal("backlog queue already closed".into()))?;
        sender
            .send(WorkItem {
                path: path.to_path_buf(),
                tier: WorkTier::Backlog,
            })
            .map_err(|_| ScryError::Internal("backlog queue receiver dropped".into()))
    }

    /// Close the backlog lane once reconciliation has enqueued everything.
    /// Idempotent.
    pub fn close_backlog(&self) {
        self.backlog_tx.lock().expect("backlog sender lock").take();
    }

    /// Non-blocking priority pop; `None` when the lane is momentarily empty.
    pub async fn try_pop_priority(&self) -> Option<WorkItem> {
        self.priority_rx.lock().await.try_recv().ok()
    }

    /// Blocking priority pop for the steady-state consumer; `None` only when
    /// the lane is closed at shutdown.
    pub async fn pop_priority(&self) -> Option<WorkItem> {
        self.priority_rx.lock().await.recv().await
    }

    pub async fn try_pop_backlog(&self) -> BacklogPop {
        match self.backlog_rx.lock().await.try_recv() {
            Ok(item) => BacklogPop::Item(item),
            Err(mpsc::error::TryRecvError::Empty) => BacklogPop::Empty,
            Err(mpsc::error::TryRecvError::Disconnected) => BacklogPop::Closed,
        }
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
