// THEORY:
// The `parallel_pipeline` module runs many independent sets at once. Each set
// is CPU-bound (sky sweep, Poisson solves, PNG encoding), so every job runs on
// tokio's blocking pool while the async side only schedules and collects.
//
// Key principles:
// 1.  **Bounded fan-out**: jobs flow through a `futures` stream with
//     `buffer_unordered(workers)`, so at most `workers` sets hold frames in
//     memory at any time.
// 2.  **Cooperative cancellation**: a `watch` flag is shared with every job and
//     checked between frame pairs. Cancelling never interrupts a blend halfway.
// 3.  **Skip, don't abort**: a recoverable error (no smoke, no placement, patch
//     too large) marks its set as skipped and the batch carries on. Only the
//     summary tells the caller what happened.

use crate::error::SynthError;
use crate::pipeline::{CancelToken, SetBuilder, SetJob, SetReport};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Final state of one set within a batch.
#[derive(Debug)]
pub enum SetStatus {
    Completed(SetReport),
    Skipped { set_index: usize, reason: SynthError },
    Cancelled { set_index: usize },
    Failed { set_index: usize, reason: String },
}

/// Totals over a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub images_written: usize,
    pub labels_written: usize,
}

impl BatchSummary {
    fn record(&mut self, status: &SetStatus) {
        match status {
            SetStatus::Completed(report) => {
                self.completed += 1;
                self.images_written += report.images_written;
                self.labels_written += report.labels_written;
            }
            SetStatus::Skipped { .. } => self.skipped += 1,
            SetStatus::Cancelled { .. } => self.cancelled += 1,
            SetStatus::Failed { .. } => self.failed += 1,
        }
    }
}

/// Async batch runner over a shared `SetBuilder`.
pub struct ParallelPipeline {
    builder: Arc<SetBuilder>,
    workers: usize,
    cancel_sender: Arc<watch::Sender<bool>>,
    cancel_receiver: CancelToken,
}

impl ParallelPipeline {
    pub fn new(builder: SetBuilder, workers: usize) -> Self {
        let (cancel_sender, cancel_receiver) = watch::channel(false);
        Self {
            builder: Arc::new(builder),
            workers: workers.max(1),
            cancel_sender: Arc::new(cancel_sender),
            cancel_receiver,
        }
    }

    /// A handle that stops the batch when called, e.g. from a signal handler.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel_sender.clone())
    }

    /// Runs every job and returns per-set statuses in completion order.
    pub async fn run(&self, jobs: Vec<SetJob>) -> (Vec<SetStatus>, BatchSummary) {
        info!(jobs = jobs.len(), workers = self.workers, "starting batch");
        let statuses: Vec<SetStatus> = stream::iter(jobs)
            .map(|job| {
                let builder = self.builder.clone();
                let cancel = self.cancel_receiver.clone();
                async move {
                    let set_index = job.set_index;
                    let outcome = tokio::task::spawn_blocking(move || builder.run_job(&job, &cancel)).await;
                    match outcome {
                        Ok(Ok(report)) => SetStatus::Completed(report),
                        Ok(Err(SynthError::Cancelled)) => SetStatus::Cancelled { set_index },
                        Ok(Err(e)) if e.is_recoverable() => {
                            warn!(set = set_index, error = %e, "set skipped");
                            SetStatus::Skipped { set_index, reason: e }
                        }
                        Ok(Err(e)) => {
                            error!(set = set_index, error = %e, "set failed");
                            SetStatus::Failed { set_index, reason: e.to_string() }
                        }
                        Err(join_error) => {
                            error!(set = set_index, error = %join_error, "set worker panicked");
                            SetStatus::Failed { set_index, reason: join_error.to_string() }
                        }
                    }
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut summary = BatchSummary::default();
        for status in &statuses {
            summary.record(status);
        }
        info!(
            completed = summary.completed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            failed = summary.failed,
            images = summary.images_written,
            "batch finished"
        );
        (statuses, summary)
    }
}

/// Sets the batch-wide cancel flag.
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        // `send_replace` succeeds even when no job currently holds a receiver.
        self.0.send_replace(true);
    }
}
