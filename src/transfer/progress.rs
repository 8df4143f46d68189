use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::types::token::TransferCancellationToken;

/// Percentage reported while the transfer is finalizing (assembling parts).
const FINALIZING_PROGRESS: i32 = 99;
/// Percentage of a finished transfer.
const FINISHED_PROGRESS: i32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressStatus {
    #[default]
    InProgress,
    Finalizing,
    Finished,
    InError,
}

/// A point-in-time snapshot of a running transfer.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub status: ProgressStatus,

    /// Total number of bytes that need to be transferred.
    pub total_size: i64,

    /// Bytes transferred so far, including bytes from previous attempts.
    pub transferred_size: i64,

    pub percentage: i32,

    /// Average transfer speed in bytes per second.
    pub speed: i64,

    pub duration: Duration,

    /// Error message when `status` is [`ProgressStatus::InError`].
    pub error: Option<String>,

    pub start_at: Option<DateTime<Utc>>,
    pub finish_at: Option<DateTime<Utc>>,
}

/// Receives progress snapshots of a transfer.
///
/// Callbacks are invoked serially and must return quickly; a slow callback
/// stalls the progress tracker.
#[async_trait]
pub trait ProgressCallback: Send {
    async fn on_progress(&mut self, progress: Progress);
}

/// Shared handle under which the tracker and the engine emit snapshots.
pub type ProgressCallbackHandle = Arc<Mutex<dyn ProgressCallback>>;

#[async_trait]
impl<F> ProgressCallback for F
where
    F: FnMut(Progress) + Send,
{
    async fn on_progress(&mut self, progress: Progress) {
        self(progress)
    }
}

/// Wraps a closure into a callback handle.
pub fn progress_callback<F>(callback: F) -> ProgressCallbackHandle
where
    F: FnMut(Progress) + Send + 'static,
{
    Arc::new(Mutex::new(callback))
}

/// Emits a progress snapshot on every tick until the transfer completes, is
/// interrupted, or is cancelled.
pub(crate) struct ProgressTracker {
    transferred: Arc<AtomicI64>,
    total_size: i64,
    start_time: DateTime<Utc>,
    refresh_interval: Duration,
}

impl ProgressTracker {
    pub(crate) fn new(
        transferred: Arc<AtomicI64>,
        total_size: i64,
        start_time: DateTime<Utc>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            transferred,
            total_size,
            start_time,
            refresh_interval,
        }
    }

    /// Runs until one of the terminal signals fires. On `completed` a final
    /// `Finished` snapshot is emitted; on cancellation or `interrupted` the
    /// tracker stops silently (the engine owns the terminal `InError`).
    pub(crate) async fn track(
        self,
        token: TransferCancellationToken,
        interrupted: TransferCancellationToken,
        completed: TransferCancellationToken,
        callback: ProgressCallbackHandle,
    ) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first interval tick fires immediately; skip it so snapshots
        // start one refresh interval in
        ticker.tick().await;

        loop {
            // terminal signals win over a simultaneously due tick
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = interrupted.cancelled() => return,
                _ = completed.cancelled() => {
                    self.emit(&callback, true).await;
                    return;
                }
                _ = ticker.tick() => {
                    if self.emit(&callback, false).await {
                        return;
                    }
                }
            }
        }
    }

    async fn emit(&self, callback: &ProgressCallbackHandle, is_done: bool) -> bool {
        let transferred_size = self.transferred.load(Ordering::SeqCst);

        let mut exit = false;
        let mut status = ProgressStatus::InProgress;
        let mut percentage;
        if self.total_size == 0 || is_done {
            percentage = FINISHED_PROGRESS;
            status = ProgressStatus::Finished;
            exit = true;
        } else {
            percentage = ((transferred_size as f64 / self.total_size as f64) * 100.0)
                .round()
                .min(f64::from(FINISHED_PROGRESS)) as i32;
        }
        if percentage == FINISHED_PROGRESS && !is_done && self.total_size != 0 {
            percentage = FINALIZING_PROGRESS;
            status = ProgressStatus::Finalizing;
        }

        let duration = (Utc::now() - self.start_time).to_std().unwrap_or_default();
        let speed = transferred_size / duration.as_secs().max(1) as i64;

        callback
            .lock()
            .await
            .on_progress(Progress {
                status,
                total_size: self.total_size,
                transferred_size,
                percentage,
                speed,
                duration,
                error: None,
                start_at: Some(self.start_time),
                finish_at: None,
            })
            .await;

        exit
    }
}
