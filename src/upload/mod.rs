//! Scheduled file uploads.
//!
//! An [`UploadTask`] bundles a configured connection, a file, form fields and
//! optional resize options. The [`UploadScheduler`] runs tasks with bounded
//! parallelism and delivers each result exactly once, either through the
//! returned [`UploadHandle`] or a callback.

mod scheduler;
mod task;

pub use scheduler::{
    FALLBACK_WORKERS, MAX_WORKERS, MIN_WORKERS, SchedulerError, UploadCallback, UploadHandle,
    UploadResult, UploadScheduler, WorkerSizing, detect_memory_budget_mb, workers_for_memory_mb,
};
pub use task::{UPLOAD_ERROR_CODE, UploadFailure, UploadTask};
