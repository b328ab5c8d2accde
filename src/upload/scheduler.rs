//! Bounded-concurrency scheduler for upload tasks.
//!
//! Uploads are accepted onto an unbounded FIFO queue and started by a single
//! dispatcher in enqueue order; a semaphore caps how many run at once. The
//! scheduler is an explicit handle: create one, clone it to every caller that
//! enqueues work.
//!
//! # Concurrency Model
//!
//! - The dispatcher acquires a semaphore permit before starting each task
//! - Each task runs in its own Tokio task; image work is moved to the
//!   blocking pool inside it
//! - Permits are released when the task finishes (RAII)
//! - Each task owns its connection; nothing is shared between tasks

use std::fs;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use super::task::{UploadFailure, UploadTask};
use crate::transfer::{ResponseEnvelope, TransferError};

/// Minimum allowed worker count.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 16;

/// Worker count when the memory budget cannot be determined.
pub const FALLBACK_WORKERS: usize = 3;

/// Result delivered exactly once per upload.
pub type UploadResult = Result<ResponseEnvelope, UploadFailure>;

/// Completion callback for hosts that prefer callbacks over futures.
pub type UploadCallback = Box<dyn FnOnce(UploadResult) + Send + 'static>;

/// Error type for scheduler construction.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Invalid worker count provided.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkerCount {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// How the number of upload workers is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerSizing {
    /// Exactly this many workers.
    Fixed(usize),
    /// Derived from a memory budget in megabytes.
    MemoryBudget(u64),
    /// Derived from the memory available on this host.
    #[default]
    Detect,
}

impl WorkerSizing {
    /// Resolves the sizing to a worker count.
    #[must_use]
    pub fn worker_count(self) -> usize {
        match self {
            Self::Fixed(count) => count,
            Self::MemoryBudget(megabytes) => workers_for_memory_mb(megabytes),
            Self::Detect => detect_memory_budget_mb().map_or(FALLBACK_WORKERS, workers_for_memory_mb),
        }
    }
}

/// Maps a memory budget to a worker count: up to 256 MB one worker, up to
/// 512 MB two, otherwise three.
#[must_use]
pub fn workers_for_memory_mb(megabytes: u64) -> usize {
    match megabytes {
        0..=256 => 1,
        257..=512 => 2,
        _ => 3,
    }
}

/// Reads `MemAvailable` from `/proc/meminfo`, in megabytes.
#[must_use]
pub fn detect_memory_budget_mb() -> Option<u64> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_available_mb(&meminfo)
}

fn parse_mem_available_mb(meminfo: &str) -> Option<u64> {
    let line = meminfo
        .lines()
        .find(|line| line.starts_with("MemAvailable:"))?;
    let kilobytes: u64 = line
        .trim_start_matches("MemAvailable:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kilobytes / 1024)
}

enum Completion {
    Handle(oneshot::Sender<UploadResult>),
    Callback(UploadCallback),
}

impl Completion {
    fn deliver(self, result: UploadResult) {
        match self {
            // The receiver may have been dropped; the upload still ran.
            Self::Handle(sender) => {
                let _ = sender.send(result);
            }
            Self::Callback(callback) => callback(result),
        }
    }
}

struct Job {
    task: UploadTask,
    completion: Completion,
}

/// Live counters of a scheduler.
#[derive(Debug, Default)]
struct SchedulerStats {
    queued: AtomicUsize,
    executing: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

/// Handle to a running upload scheduler.
///
/// Cloning the handle shares the same queue and workers.
#[derive(Debug, Clone)]
pub struct UploadScheduler {
    sender: mpsc::UnboundedSender<Job>,
    stats: Arc<SchedulerStats>,
    worker_count: usize,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.task.upload_id())
            .finish_non_exhaustive()
    }
}

impl UploadScheduler {
    /// Starts a scheduler with `worker_count` workers.
    ///
    /// Must be called from within a Tokio runtime; the dispatcher runs as a
    /// task on it until every handle has been dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidWorkerCount`] if the value is outside
    /// the valid range (1-16).
    #[instrument(level = "debug")]
    pub fn new(worker_count: usize) -> Result<Self, SchedulerError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&worker_count) {
            return Err(SchedulerError::InvalidWorkerCount {
                value: worker_count,
            });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(SchedulerStats::default());
        let semaphore = Arc::new(Semaphore::new(worker_count));
        tokio::spawn(dispatch(receiver, semaphore, Arc::clone(&stats)));

        info!(worker_count, "upload scheduler started");
        Ok(Self {
            sender,
            stats,
            worker_count,
        })
    }

    /// Starts a scheduler sized by `sizing`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidWorkerCount`] for an out-of-range
    /// fixed count.
    pub fn with_sizing(sizing: WorkerSizing) -> Result<Self, SchedulerError> {
        Self::new(sizing.worker_count())
    }

    /// Enqueues `task` and returns a handle resolving to its result.
    ///
    /// Never blocks and never rejects on queue depth.
    pub fn add_upload(&self, task: UploadTask) -> UploadHandle {
        let id = task.upload_id().to_string();
        let (sender, receiver) = oneshot::channel();
        self.enqueue(task, Completion::Handle(sender));
        UploadHandle { id, receiver }
    }

    /// Enqueues `task`; `callback` is invoked exactly once with its result.
    pub fn add_upload_with_callback<F>(&self, task: UploadTask, callback: F)
    where
        F: FnOnce(UploadResult) + Send + 'static,
    {
        self.enqueue(task, Completion::Callback(Box::new(callback)));
    }

    fn enqueue(&self, task: UploadTask, completion: Completion) {
        let id = task.upload_id().to_string();
        let queued = self.stats.queued.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            id = %id,
            queued,
            executing = self.executing(),
            "queueing upload"
        );
        if let Err(mpsc::error::SendError(job)) = self.sender.send(Job { task, completion }) {
            self.stats.queued.fetch_sub(1, Ordering::SeqCst);
            warn!(id = %id, "upload scheduler is not running");
            job.completion.deliver(Err(UploadFailure::new(
                id,
                TransferError::task_aborted("upload scheduler is not running"),
            )));
        }
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Returns the number of accepted uploads not yet started.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.stats.queued.load(Ordering::SeqCst)
    }

    /// Returns the number of uploads currently running.
    #[must_use]
    pub fn executing(&self) -> usize {
        self.stats.executing.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.stats.succeeded.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.stats.failed.load(Ordering::SeqCst)
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    semaphore: Arc<Semaphore>,
    stats: Arc<SchedulerStats>,
) {
    while let Some(Job { task, completion }) = receiver.recv().await {
        let id = task.upload_id().to_string();

        // Acquire before spawning so tasks start in enqueue order.
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            completion.deliver(Err(UploadFailure::new(
                id,
                TransferError::task_aborted("upload workers shut down"),
            )));
            continue;
        };
        stats.queued.fetch_sub(1, Ordering::SeqCst);
        stats.executing.fetch_add(1, Ordering::SeqCst);
        debug!(id = %id, "upload started");

        let stats = Arc::clone(&stats);
        tokio::spawn(async move {
            let _permit = permit;

            let result = match tokio::spawn(task.run()).await {
                Ok(result) => result,
                Err(join_error) => {
                    warn!(id = %id, error = %join_error, "upload task panicked");
                    Err(UploadFailure::new(
                        id.clone(),
                        TransferError::task_aborted(join_error.to_string()),
                    ))
                }
            };

            stats.executing.fetch_sub(1, Ordering::SeqCst);
            match &result {
                Ok(_) => stats.succeeded.fetch_add(1, Ordering::SeqCst),
                Err(_) => stats.failed.fetch_add(1, Ordering::SeqCst),
            };
            debug!(
                id = %id,
                queued = stats.queued.load(Ordering::SeqCst),
                executing = stats.executing.load(Ordering::SeqCst),
                "upload finished"
            );
            completion.deliver(result);
        });
    }
    debug!("upload scheduler stopped");
}

/// Future resolving to the result of one scheduled upload.
#[derive(Debug)]
pub struct UploadHandle {
    id: String,
    receiver: oneshot::Receiver<UploadResult>,
}

impl UploadHandle {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for UploadHandle {
    type Output = UploadResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let polled = Pin::new(&mut self.receiver).poll(cx);
        polled.map(|received| {
            received.unwrap_or_else(|_| {
                Err(UploadFailure::new(
                    self.id.clone(),
                    TransferError::task_aborted("upload ended without a result"),
                ))
            })
        })
    }
}
