//! A single upload: prepare the file, encode the form, transmit, decode.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::transfer::constants::{
    DEFAULT_FILE_FIELD, DEFAULT_HEIGHT_HEADER, DEFAULT_SIZE_HEADER, DEFAULT_WIDTH_HEADER,
};
use crate::transfer::{
    CATEGORY_UPLOAD, Connection, FieldMap, FieldValue, ResizeOptions, ResponseEnvelope, ResponseType,
    TransferError, decode_response, encode_upload, prepare_image,
};

/// Value sent for width and height when they cannot be read.
pub const UNKNOWN_DIMENSION: &str = "-1";

/// Classification code attached to every failed upload.
pub const UPLOAD_ERROR_CODE: &str = "UPLOAD";

/// Terminal failure of a scheduled upload.
#[derive(Debug, Error)]
#[error("upload {id} failed: {message}")]
pub struct UploadFailure {
    /// Id of the failed upload.
    pub id: String,
    /// Always [`UPLOAD_ERROR_CODE`].
    pub code: &'static str,
    pub message: String,
    #[source]
    pub source: TransferError,
}

impl UploadFailure {
    pub fn new(id: impl Into<String>, source: TransferError) -> Self {
        Self {
            id: id.into(),
            code: UPLOAD_ERROR_CODE,
            message: source.to_string(),
            source,
        }
    }

    /// Category name reported to the host.
    #[must_use]
    pub fn category(&self) -> &'static str {
        CATEGORY_UPLOAD
    }
}

/// Everything needed to run one upload over an already configured connection.
pub struct UploadTask {
    id: String,
    connection: Box<dyn Connection>,
    file: PathBuf,
    fields: FieldMap,
    resize: Option<ResizeOptions>,
    field_name: String,
    width_header: String,
    height_header: String,
    size_header: String,
    response_type: ResponseType,
    scratch_dir: PathBuf,
}

impl UploadTask {
    /// Creates a task uploading `file` over `connection` with default settings:
    /// a random id, field name `file`, no resize, and the
    /// `X-Image-Width`/`X-Image-Height`/`X-File-Size` dimension fields.
    pub fn new(connection: Box<dyn Connection>, file: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            connection,
            file: file.into(),
            fields: FieldMap::new(),
            resize: None,
            field_name: DEFAULT_FILE_FIELD.to_string(),
            width_header: DEFAULT_WIDTH_HEADER.to_string(),
            height_header: DEFAULT_HEIGHT_HEADER.to_string(),
            size_header: DEFAULT_SIZE_HEADER.to_string(),
            response_type: ResponseType::default(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the form fields sent ahead of the file part.
    #[must_use]
    pub fn fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn resize(mut self, resize: Option<ResizeOptions>) -> Self {
        self.resize = resize;
        self
    }

    /// Sets the form field name of the file part.
    #[must_use]
    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Sets the field names receiving the final width, height and byte size.
    #[must_use]
    pub fn dimension_fields(
        mut self,
        width: impl Into<String>,
        height: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        self.width_header = width.into();
        self.height_header = height.into();
        self.size_header = size.into();
        self
    }

    #[must_use]
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Sets the directory resized copies are written to.
    #[must_use]
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    #[must_use]
    pub fn upload_id(&self) -> &str {
        &self.id
    }

    /// Runs the upload to completion.
    ///
    /// # Errors
    ///
    /// Any failure (file, encode, network, decode) is returned as an
    /// [`UploadFailure`] with code `UPLOAD`.
    #[instrument(skip(self), fields(id = %self.id, file = %self.file.display()))]
    pub async fn run(self) -> Result<ResponseEnvelope, UploadFailure> {
        let id = self.id.clone();
        info!("starting upload");
        match self.execute().await {
            Ok(envelope) => {
                info!(status = envelope.status, "upload completed");
                Ok(envelope)
            }
            Err(error) => {
                warn!(error = %error, "upload failed");
                Err(UploadFailure::new(id, error))
            }
        }
    }

    async fn execute(self) -> Result<ResponseEnvelope, TransferError> {
        let Self {
            mut connection,
            file,
            mut fields,
            resize,
            field_name,
            width_header,
            height_header,
            size_header,
            response_type,
            scratch_dir,
            ..
        } = self;

        let image = tokio::task::spawn_blocking(move || {
            prepare_image(&file, resize.as_ref(), &scratch_dir)
        })
        .await
        .map_err(|e| TransferError::task_aborted(e.to_string()))??;

        fields.insert(width_header, dimension_field(image.width));
        fields.insert(height_header, dimension_field(image.height));
        fields.insert(size_header, image.size.to_string().into());
        debug!(
            path = %image.path.display(),
            resized = image.is_resized(),
            size = image.size,
            "file prepared"
        );

        encode_upload(connection.as_mut(), &fields, &field_name, &image.path).await?;
        let head = connection.connect().await?;
        let envelope = decode_response(&head, connection.as_mut(), response_type).await?;

        // The resized temp file (if any) is removed here, after transmission.
        drop(image);
        Ok(envelope)
    }
}

/// Pixel dimension as a form value; `-1` when the file is not a readable image.
fn dimension_field(pixels: Option<u32>) -> FieldValue {
    pixels.map_or_else(|| UNKNOWN_DIMENSION.to_string(), |value| value.to_string()).into()
}
