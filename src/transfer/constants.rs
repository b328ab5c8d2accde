//! Constants for the transfer module (timeouts, chunking, wire names).

use std::time::Duration;

/// Default HTTP connect timeout when a request does not set one (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default HTTP read timeout when a request does not set one (5 minutes).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Chunk size used when copying upload file bytes into a request body.
pub const UPLOAD_CHUNK_SIZE: usize = 4096;

/// Number of body chunks buffered between the encoder and the socket.
pub const BODY_CHANNEL_DEPTH: usize = 8;

/// MIME type whose presence in a content type selects JSON decoding.
pub const APPLICATION_JSON: &str = "application/json";

/// JSON:API media type, decoded as JSON on error responses.
pub const APPLICATION_VND_API_JSON: &str = "application/vnd.api+json";

/// Form-urlencoded media type for request bodies.
pub const APPLICATION_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Multipart media type for request bodies and uploads.
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Default form field name of the uploaded file part.
pub const DEFAULT_FILE_FIELD: &str = "file";

/// Default form field receiving the final image width.
pub const DEFAULT_WIDTH_HEADER: &str = "X-Image-Width";

/// Default form field receiving the final image height.
pub const DEFAULT_HEIGHT_HEADER: &str = "X-Image-Height";

/// Default form field receiving the final file size in bytes.
pub const DEFAULT_SIZE_HEADER: &str = "X-File-Size";
