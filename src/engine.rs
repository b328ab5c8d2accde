//! The call surface a host talks to.
//!
//! [`TransferEngine`] owns the transport, the upload scheduler and the file
//! resolver. Plain requests and downloads run on their own Tokio task per
//! call; uploads are handed to the scheduler.
//!
//! # Example
//!
//! ```no_run
//! use transfer_core::{HttpOptions, TransferConfig, TransferEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TransferEngine::new(&TransferConfig::default())?;
//! let envelope = engine.get(HttpOptions::new("https://api.example.com/items")).await?;
//! println!("{} {}", envelope.status, envelope.url);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::TransferConfig;
use crate::files::{FileResolver, LocalFileResolver};
use crate::options::{DownloadOptions, HttpOptions, UploadOptions};
use crate::transfer::{
    DownloadResult, HttpMethod, HttpTransport, ProgressFn, ResponseEnvelope, TransferError,
    Transport, decode_response, download_to_file, write_request_body,
};
use crate::upload::{SchedulerError, UploadHandle, UploadScheduler, UploadTask};

/// Error type for engine construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The HTTP transport could not be created.
    #[error("transport error: {0}")]
    Transport(#[from] TransferError),

    /// The upload scheduler could not be created.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Entry point for requests, downloads and uploads.
#[derive(Clone)]
pub struct TransferEngine {
    transport: Arc<dyn Transport>,
    scheduler: UploadScheduler,
    resolver: Arc<dyn FileResolver>,
    scratch_dir: PathBuf,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("scheduler", &self.scheduler)
            .field("scratch_dir", &self.scratch_dir)
            .finish_non_exhaustive()
    }
}

impl TransferEngine {
    /// Builds an engine with a reqwest transport, a scheduler sized per
    /// `config` and a local file resolver.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the HTTP client or scheduler cannot be built.
    #[instrument(level = "debug", skip(config))]
    pub fn new(config: &TransferConfig) -> Result<Self, EngineError> {
        let transport = HttpTransport::with_timeouts(config.connect_timeout, config.read_timeout)?;
        let scheduler = UploadScheduler::with_sizing(config.workers)?;
        debug!(
            connect_timeout_ms = config.connect_timeout.as_millis(),
            read_timeout_ms = config.read_timeout.as_millis(),
            workers = scheduler.worker_count(),
            "creating transfer engine"
        );
        Ok(Self::with_parts(
            Arc::new(transport),
            scheduler,
            Arc::new(LocalFileResolver::new(config.file_root.clone())),
            config.scratch_dir.clone(),
        ))
    }

    /// Assembles an engine from explicit collaborators.
    pub fn with_parts(
        transport: Arc<dyn Transport>,
        scheduler: UploadScheduler,
        resolver: Arc<dyn FileResolver>,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            transport,
            scheduler,
            resolver,
            scratch_dir,
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &UploadScheduler {
        &self.scheduler
    }

    /// Sends a request using the method in `options` (GET when absent).
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`]; its [`category`](TransferError::category)
    /// is the rejection label reported to the host.
    pub async fn request(&self, options: HttpOptions) -> Result<ResponseEnvelope, TransferError> {
        self.send(options, None).await
    }

    /// Sends a GET request regardless of `options.method`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(&self, options: HttpOptions) -> Result<ResponseEnvelope, TransferError> {
        self.send(options, Some(HttpMethod::Get)).await
    }

    /// Sends a POST request regardless of `options.method`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post(&self, options: HttpOptions) -> Result<ResponseEnvelope, TransferError> {
        self.send(options, Some(HttpMethod::Post)).await
    }

    /// Sends a PUT request regardless of `options.method`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put(&self, options: HttpOptions) -> Result<ResponseEnvelope, TransferError> {
        self.send(options, Some(HttpMethod::Put)).await
    }

    /// Sends a PATCH request regardless of `options.method`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn patch(&self, options: HttpOptions) -> Result<ResponseEnvelope, TransferError> {
        self.send(options, Some(HttpMethod::Patch)).await
    }

    /// Sends a DELETE request regardless of `options.method`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete(&self, options: HttpOptions) -> Result<ResponseEnvelope, TransferError> {
        self.send(options, Some(HttpMethod::Delete)).await
    }

    async fn send(
        &self,
        options: HttpOptions,
        forced: Option<HttpMethod>,
    ) -> Result<ResponseEnvelope, TransferError> {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move { execute_request(transport.as_ref(), &options, forced).await })
            .await
            .map_err(|e| TransferError::task_aborted(e.to_string()))?
    }

    /// Downloads the response body of `options` into a local file.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MissingOption`] without a `filePath`, and the
    /// request, status or file errors of the transfer.
    pub async fn download_file(
        &self,
        options: DownloadOptions,
        progress: Option<Arc<ProgressFn>>,
    ) -> Result<DownloadResult, TransferError> {
        let file_path = options
            .file_path
            .as_deref()
            .ok_or(TransferError::MissingOption { option: "filePath" })?;
        let target = self
            .resolver
            .resolve(file_path, options.file_directory.as_deref())?;
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let mut connection = options.request_spec().open(transport.as_ref()).await?;
            download_to_file(connection.as_mut(), &target, progress.as_deref()).await
        })
        .await
        .map_err(|e| TransferError::task_aborted(e.to_string()))?
    }

    /// Schedules a file upload.
    ///
    /// The file and URL are checked before the task is queued; everything
    /// after that is reported through the returned handle.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MissingOption`] without a `filePath`,
    /// [`TransferError::FileNotFound`] when the file does not exist, and
    /// [`TransferError::InvalidUrl`] for a malformed URL.
    #[instrument(skip(self, options), fields(url = %options.url))]
    pub async fn upload_file(&self, options: UploadOptions) -> Result<UploadHandle, TransferError> {
        let file_path = options
            .file_path
            .as_deref()
            .ok_or(TransferError::MissingOption { option: "filePath" })?;
        let file = self
            .resolver
            .resolve(file_path, options.file_directory.as_deref())?;
        if !tokio::fs::try_exists(&file).await.unwrap_or(false) {
            return Err(TransferError::file_not_found(file_path));
        }

        let connection = options.request_spec().open(self.transport.as_ref()).await?;
        let (width, height, size) = options.dimension_fields();
        let task = UploadTask::new(connection, file)
            .id(options
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()))
            .fields(options.data.clone())
            .resize(options.resize.clone())
            .field_name(options.field_name())
            .dimension_fields(width, height, size)
            .response_type(options.response_type)
            .scratch_dir(self.scratch_dir.clone());
        info!(id = task.upload_id(), "upload accepted");
        Ok(self.scheduler.add_upload(task))
    }

    /// Schedules an image upload; identical to [`upload_file`](Self::upload_file).
    ///
    /// # Errors
    ///
    /// See [`upload_file`](Self::upload_file).
    pub async fn upload_image(&self, options: UploadOptions) -> Result<UploadHandle, TransferError> {
        self.upload_file(options).await
    }
}

#[instrument(skip(transport, options), fields(url = %options.url))]
async fn execute_request(
    transport: &dyn Transport,
    options: &HttpOptions,
    forced: Option<HttpMethod>,
) -> Result<ResponseEnvelope, TransferError> {
    let method = options.resolve_method(forced);
    let spec = options.request_spec(method);
    let mut connection = spec.open(transport).await?;

    if let Some(data) = options.data.as_ref().filter(|_| spec.method.carries_body()) {
        write_request_body(connection.as_mut(), &spec.headers, data).await?;
    }

    let head = connection.connect().await?;
    let envelope = decode_response(&head, connection.as_mut(), options.response_type).await?;
    info!(method = %spec.method, status = envelope.status, "request complete");
    Ok(envelope)
}
