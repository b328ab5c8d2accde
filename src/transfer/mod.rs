//! Request building, transport and codecs for single HTTP exchanges.
//!
//! This module turns raw call inputs into a connection, writes request
//! bodies (JSON, form, multipart, file uploads), and decodes responses into a
//! [`ResponseEnvelope`].
//!
//! # Features
//!
//! - Query parameter merging with optional strict percent-encoding
//! - Per-request connect/read timeouts and redirect suppression
//! - Streaming multipart encoder (files are never buffered whole)
//! - Best-effort image downscaling before upload
//! - Content-type driven response decoding (JSON, text, base64)
//! - Streaming downloads with progress reporting
//!
//! # Example
//!
//! ```no_run
//! use transfer_core::transfer::{
//!     HttpMethod, HttpTransport, RequestSpec, ResponseType, decode_response,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new()?;
//! let spec = RequestSpec::new(HttpMethod::Get, "https://api.example.com/items")
//!     .param("tag", vec!["a".to_string(), "b".to_string()]);
//! let mut connection = spec.open(&transport).await?;
//! let head = connection.connect().await?;
//! let envelope = decode_response(&head, connection.as_mut(), ResponseType::Json).await?;
//! println!("{}", envelope.status);
//! # Ok(())
//! # }
//! ```

mod body;
mod client;
mod connection;
pub mod constants;
mod download;
mod error;
pub(crate) mod multipart;
mod request;
mod resize;
mod response;

pub use body::{BodyEncoding, write_request_body};
pub use client::{HttpConnection, HttpTransport};
pub use connection::{Connection, ResponseHead, Transport, read_to_end};
pub use download::{DownloadResult, ProgressFn, download_to_file};
pub use error::{
    CATEGORY_CONNECTION, CATEGORY_DECODE, CATEGORY_FILE, CATEGORY_INVALID_URL, CATEGORY_UPLOAD,
    TransferError,
};
pub use multipart::{MultipartWriter, PRIORITY_FIELD, encode_fields, encode_upload};
pub use request::{
    FieldMap, FieldValue, HttpMethod, PreparedRequest, RequestSpec, build_url,
    deserialize_lenient_fields, lenient_fields,
};
pub use resize::{
    DEFAULT_FORMAT, DEFAULT_QUALITY, ImageDescriptor, ResizeFailure, ResizeOptions, downscale,
    prepare_image, probe_image,
};
pub use response::{
    ResponseData, ResponseEnvelope, ResponseType, body_text, decode_response, parse_json_body,
};
