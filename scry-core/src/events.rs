use futures::Stream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use scry_model::{IndexEvent, ProgressSnapshot};

/// In-process fan-out of index events to live subscribers.
///
/// Producers never block: sending to a bus with no receivers is a no-op, and
/// a subscriber that lags past its buffer loses the oldest events rather than
/// applying backpressure. That lossy-but-bounded contract is deliberate; the
/// event stream is a monitoring signal, not a durable delivery channel.
#[derive(Debug)]
pub struct IndexEventBus {
    sender: broadcast::Sender<IndexEvent>,
}

impl IndexEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: IndexEvent) {
        trace!(?event, "publish");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.sender.subscribe()
    }

    /// Infinite, restartable event sequence for one subscriber.
    ///
    /// The first item is a synthetic `Progress` snapshot so a freshly attached
    /// subscriber starts from known state. The stream ends when `cancel`
    /// fires; lag gaps are skipped silently.
    pub fn event_stream(
        &self,
        snapshot: ProgressSnapshot,
        cancel: CancellationToken,
    ) -> impl Stream<Item = IndexEvent> {
        let mut receiver = self.subscribe();
        async_stream::stream! {
            yield IndexEvent::Progress(snapshot);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok(event) => yield event,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            trace!(skipped, "subscriber lagged; dropping oldest events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use scry_model::ScreenshotStatus;
    use uuid::Uuid;

    #[tokio::test]
    async fn stream_starts_with_a_progress_snapshot() {
        let bus = IndexEventBus::new(8);
        let cancel = CancellationToken::new();
        let snapshot = ProgressSnapshot {
            total_files: 3,
            ..Default::default()
        };

        let stream = bus.event_stream(snapshot, cancel.clone());
        tokio::pin!(stream);

        match stream.next().await {
            Some(IndexEvent::Progress(p)) => assert_eq!(p.total_files, 3),
            other => panic!("expected progress snapshot first, got {other:?}"),
        }

        bus.publish(IndexEvent::ScreenshotStatusChanged {
            id: Uuid::nil(),
            status: ScreenshotStatus::Processing,
            ocr_text: None,
        });
        match stream.next().await {
            Some(IndexEvent::ScreenshotStatusChanged { status, .. }) => {
                assert_eq!(status, ScreenshotStatus::Processing);
            }
            other => panic!("expected status change, got {other:?}"),
        }

        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let bus = IndexEventBus::new(8);
        bus.publish(IndexEvent::ScreenshotDetected {
            id: Uuid::nil(),
            filename: "a.png".into(),
        });
        // A subscriber attached afterwards sees nothing; events are not replayed.
        let mut receiver = bus.subscribe();
        assert!(matches!(
            receiver.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
