// Fill progress tracking
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const POINTS_PER_LOG_LINE: u64 = 5000;

/// Progress notifications emitted from the ingestion path. Reporting is a
/// side channel: a dropped notification never affects the counters below.
#[derive(Debug)]
pub enum ProgressEvent {
    PointWritten,
    FileCompleted { host: String },
    FileFailed { host: String },
}

/// Shared cumulative counters for the current fill run. Increments happen
/// at the write site, so totals never lose updates however the reporting
/// channel behaves.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    files_total: AtomicU64,
    files_completed: AtomicU64,
    files_failed: AtomicU64,
    points_written: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub files_total: u64,
    pub files_completed: u64,
    pub files_failed: u64,
    pub points_written: u64,
}

impl ProgressTracker {
    /// Reset the counters for a new run over `files_total` files.
    pub fn begin(&self, files_total: u64) {
        self.files_total.store(files_total, Ordering::Release);
        self.files_completed.store(0, Ordering::Release);
        self.files_failed.store(0, Ordering::Release);
        self.points_written.store(0, Ordering::Release);
    }

    pub fn point_written(&self) {
        self.points_written.fetch_add(1, Ordering::AcqRel);
    }

    pub fn file_completed(&self) {
        self.files_completed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_total: self.files_total.load(Ordering::Acquire),
            files_completed: self.files_completed.load(Ordering::Acquire),
            files_failed: self.files_failed.load(Ordering::Acquire),
            points_written: self.points_written.load(Ordering::Acquire),
        }
    }
}

/// Fire-and-forget sender side of the reporting channel.
#[derive(Debug, Clone)]
pub struct ProgressNotifier {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressNotifier {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// A full channel drops the notification rather than stalling the
    /// ingestion path.
    pub fn notify(&self, event: ProgressEvent) {
        let _ = self.tx.try_send(event);
    }
}

/// Single consumer of the reporting channel; logs file completions and
/// periodic point throughput until every notifier clone is dropped.
pub fn spawn_aggregator(
    tracker: Arc<ProgressTracker>,
    mut rx: mpsc::Receiver<ProgressEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut observed_points = 0u64;
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::PointWritten => {
                    observed_points += 1;
                    if observed_points % POINTS_PER_LOG_LINE == 0 {
                        let snapshot = tracker.snapshot();
                        tracing::debug!(points = snapshot.points_written, "writing metrics");
                    }
                }
                ProgressEvent::FileCompleted { host } => {
                    let snapshot = tracker.snapshot();
                    tracing::info!(
                        %host,
                        done = snapshot.files_completed,
                        total = snapshot.files_total,
                        "file ingested"
                    );
                }
                ProgressEvent::FileFailed { host } => {
                    tracing::warn!(%host, "file skipped");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let tracker = ProgressTracker::default();
        tracker.begin(3);
        tracker.point_written();
        tracker.point_written();
        tracker.file_completed();
        tracker.file_failed();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.files_total, 3);
        assert_eq!(snapshot.files_completed, 1);
        assert_eq!(snapshot.files_failed, 1);
        assert_eq!(snapshot.points_written, 2);

        tracker.begin(1);
        assert_eq!(tracker.snapshot().points_written, 0);
    }

    #[tokio::test]
    async fn test_full_channel_never_blocks() {
        let (notifier, rx) = ProgressNotifier::channel(1);
        // No consumer is draining; every notify after the first is dropped
        // but returns immediately.
        for _ in 0..100 {
            notifier.notify(ProgressEvent::PointWritten);
        }
        drop(rx);
        notifier.notify(ProgressEvent::PointWritten);
    }
}
