//! Native Transfer Core Library
//!
//! HTTP request, download and upload engine for clients that run on
//! constrained hardware: uploads are streamed and optionally downscaled,
//! and run on a bounded worker pool sized from available memory.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`transfer`] - Request building, transport, body encoders and response decoding
//! - [`upload`] - Upload tasks and the bounded upload scheduler
//! - [`engine`] - The [`TransferEngine`] facade a host calls into
//! - [`options`] - Call options as a host hands them over
//! - [`config`] - Engine-wide defaults
//! - [`files`] - Mapping logical file paths to local files

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod files;
pub mod options;
pub mod transfer;
pub mod upload;
mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::TransferConfig;
pub use engine::{EngineError, TransferEngine};
pub use files::{FileResolver, LocalFileResolver};
pub use options::{DownloadOptions, HttpOptions, UploadOptions};
pub use transfer::{
    DownloadResult, HttpMethod, ResponseData, ResponseEnvelope, ResponseType, TransferError,
};
pub use upload::{SchedulerError, UploadFailure, UploadHandle, UploadScheduler, WorkerSizing};
