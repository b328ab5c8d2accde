//! Streaming a response body to a file with progress reporting.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};

use super::connection::Connection;
use super::error::TransferError;

/// Progress callback: `(bytes written so far, total content length or 0)`.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Outcome of a completed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    /// Path of the written file.
    pub path: PathBuf,
    #[serde(skip)]
    pub bytes_written: u64,
    #[serde(skip)]
    pub content_length: u64,
}

/// Connects `connection` and writes the response body to `path`.
///
/// `progress` is invoked after every chunk is written. A partially written
/// file is removed when the transfer fails.
///
/// # Errors
///
/// Returns [`TransferError::HttpStatus`] for status 400 and above (no file is
/// created), the connection's error for network failures, and
/// [`TransferError::Io`] when the file cannot be written.
#[instrument(skip(connection, progress), fields(url = %connection.url(), path = %path.display()))]
pub async fn download_to_file(
    connection: &mut dyn Connection,
    path: &Path,
    progress: Option<&ProgressFn>,
) -> Result<DownloadResult, TransferError> {
    let head = connection.connect().await?;
    if head.has_error_stream() {
        return Err(TransferError::http_status(&head.url, head.status));
    }
    let content_length = head.content_length();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| TransferError::io(parent, e))?;
    }
    let mut file = File::create(path)
        .await
        .map_err(|e| TransferError::io(path, e))?;

    let stream_result = stream_to_file(&mut file, connection, path, content_length, progress).await;
    if stream_result.is_err() {
        debug!(path = %path.display(), "cleaning up partial file after error");
        drop(file);
        let _ = fs::remove_file(path).await;
    }
    let bytes_written = stream_result?;

    info!(bytes = bytes_written, content_length, "download complete");
    Ok(DownloadResult {
        path: path.to_path_buf(),
        bytes_written,
        content_length,
    })
}

async fn stream_to_file(
    file: &mut File,
    connection: &mut dyn Connection,
    path: &Path,
    content_length: u64,
    progress: Option<&ProgressFn>,
) -> Result<u64, TransferError> {
    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = connection.read_chunk().await? {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(path, e))?;
        bytes_written += chunk.len() as u64;
        if let Some(progress) = progress {
            progress(bytes_written, content_length);
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| TransferError::io(path, e))?;

    Ok(bytes_written)
}
