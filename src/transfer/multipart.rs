//! Streaming `multipart/form-data` encoder.
//!
//! Parts are written straight into a [`Connection`]'s request body; file
//! contents are copied in fixed-size chunks. Every part opens with
//! `CRLF --boundary CRLF`, and the body ends with a single
//! `CRLF --boundary-- CRLF`.
//!
//! If any write fails, the connection's body is aborted so the server never
//! receives a truncated form that looks complete.

use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::connection::Connection;
use super::constants::{MULTIPART_FORM_DATA, UPLOAD_CHUNK_SIZE};
use super::error::TransferError;
use super::request::FieldMap;

const CRLF: &str = "\r\n";

/// Field name that is always written before every other field.
pub const PRIORITY_FIELD: &str = "key";

/// Writes one multipart form into a connection.
pub struct MultipartWriter<'a> {
    connection: &'a mut dyn Connection,
    boundary: String,
}

impl<'a> MultipartWriter<'a> {
    /// Starts a form with a fresh random boundary and sets the request's
    /// `Content-Type` to `multipart/form-data; boundary=...`.
    ///
    /// # Errors
    ///
    /// Returns the connection's error if the header can no longer be set.
    pub fn new(connection: &'a mut dyn Connection) -> Result<Self, TransferError> {
        Self::with_boundary(connection, Uuid::new_v4().to_string())
    }

    /// Starts a form with a caller-chosen boundary.
    ///
    /// # Errors
    ///
    /// Returns the connection's error if the header can no longer be set.
    pub fn with_boundary(
        connection: &'a mut dyn Connection,
        boundary: String,
    ) -> Result<Self, TransferError> {
        connection.set_request_header(
            "Content-Type",
            &format!("{MULTIPART_FORM_DATA}; boundary={boundary}"),
        )?;
        Ok(Self {
            connection,
            boundary,
        })
    }

    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Writes one text field.
    ///
    /// # Errors
    ///
    /// Returns the connection's write error.
    pub async fn add_field(&mut self, name: &str, value: &str) -> Result<(), TransferError> {
        let mut part = self.part_header(name, None, "text/plain; charset=UTF-8");
        part.put_slice(value.as_bytes());
        self.connection.write_body(part.freeze()).await
    }

    /// Writes every field of `fields`: the `key` field first, then the rest in
    /// map order. List values produce one part per element under the same name.
    ///
    /// # Errors
    ///
    /// Returns the connection's write error.
    pub async fn add_fields(&mut self, fields: &FieldMap) -> Result<(), TransferError> {
        if let Some(value) = fields.get(PRIORITY_FIELD) {
            for item in value.iter() {
                self.add_field(PRIORITY_FIELD, item).await?;
            }
        }
        for (name, value) in fields {
            if name == PRIORITY_FIELD {
                continue;
            }
            for item in value.iter() {
                self.add_field(name, item).await?;
            }
        }
        Ok(())
    }

    /// Writes a file part named `field_name`, streaming the file from `path`.
    ///
    /// The part's filename is the last component of `path` and its content
    /// type is guessed from the extension.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Io`] if the file cannot be read, or the
    /// connection's write error.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub async fn add_file(&mut self, field_name: &str, path: &Path) -> Result<u64, TransferError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(&file_name).first_or_octet_stream();

        let mut file = File::open(path)
            .await
            .map_err(|e| TransferError::io(path, e))?;

        let header = self.part_header(field_name, Some(&file_name), content_type.essence_str());
        self.connection.write_body(header.freeze()).await?;

        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
        let mut copied: u64 = 0;
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .map_err(|e| TransferError::io(path, e))?;
            if read == 0 {
                break;
            }
            self.connection
                .write_body(Bytes::copy_from_slice(&buffer[..read]))
                .await?;
            copied += read as u64;
        }
        debug!(bytes = copied, content_type = %content_type, "file part written");
        Ok(copied)
    }

    /// Writes the closing boundary, completing the body.
    ///
    /// # Errors
    ///
    /// Returns the connection's write error.
    pub async fn finish(self) -> Result<(), TransferError> {
        let closing = format!("{CRLF}--{}--{CRLF}", self.boundary);
        self.connection.write_body(Bytes::from(closing)).await
    }

    /// Abandons the form, aborting the connection's body.
    pub async fn abort(self, reason: &str) {
        self.connection.abort_body(reason).await;
    }

    fn part_header(&self, name: &str, file_name: Option<&str>, content_type: &str) -> BytesMut {
        let mut header = format!(
            "{CRLF}--{}{CRLF}Content-Disposition: form-data; name=\"{}\"",
            self.boundary,
            escape_quoted(name)
        );
        if let Some(file_name) = file_name {
            header.push_str(&format!("; filename=\"{}\"", escape_quoted(file_name)));
        }
        header.push_str(&format!("{CRLF}Content-Type: {content_type}{CRLF}{CRLF}"));
        BytesMut::from(header.as_bytes())
    }
}

/// Encodes `fields` followed by the file at `path` into `connection`.
///
/// On any failure the body is aborted before the error is returned.
///
/// # Errors
///
/// Returns the first write or file error.
pub async fn encode_upload(
    connection: &mut dyn Connection,
    fields: &FieldMap,
    field_name: &str,
    path: &Path,
) -> Result<(), TransferError> {
    let mut writer = MultipartWriter::new(connection)?;
    let written = async {
        writer.add_fields(fields).await?;
        writer.add_file(field_name, path).await?;
        Ok::<_, TransferError>(())
    }
    .await;
    match written {
        Ok(()) => writer.finish().await,
        Err(error) => {
            writer.abort(&error.to_string()).await;
            Err(error)
        }
    }
}

/// Encodes text-only `fields` into `connection` as a complete form.
///
/// # Errors
///
/// Returns the first write error; the body is aborted first.
pub async fn encode_fields(
    connection: &mut dyn Connection,
    fields: &FieldMap,
) -> Result<(), TransferError> {
    let mut writer = MultipartWriter::new(connection)?;
    match writer.add_fields(fields).await {
        Ok(()) => writer.finish().await,
        Err(error) => {
            writer.abort(&error.to_string()).await;
            Err(error)
        }
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
