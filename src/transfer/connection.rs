//! Connection and transport abstractions.
//!
//! A [`Connection`] moves through three phases: configured (headers may be
//! set), streaming (body chunks are being written) and connected (status and
//! headers are known, the body can be read). The encoder, decoder and upload
//! scheduler only talk to this trait, so they can be exercised against an
//! in-memory connection in tests.

use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use url::Url;

use super::constants::{APPLICATION_JSON, APPLICATION_VND_API_JSON};
use super::error::TransferError;
use super::request::PreparedRequest;

/// Opens connections for prepared requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Creates a configured, not yet connected, connection for `request`.
    async fn open(&self, request: &PreparedRequest) -> Result<Box<dyn Connection>, TransferError>;
}

/// One request/response exchange over an exclusively owned socket.
///
/// Dropping a connection releases its resources. Dropping it while a body is
/// still streaming aborts the request rather than completing the body.
#[async_trait]
pub trait Connection: Send {
    /// The URL the request is sent to.
    fn url(&self) -> &Url;

    /// Sets (or replaces) a request header. Only valid before the body starts.
    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransferError>;

    /// Appends a chunk to the request body, starting the request on first use.
    async fn write_body(&mut self, chunk: Bytes) -> Result<(), TransferError>;

    /// Abandons a partially written body so the server never sees it as complete.
    async fn abort_body(&mut self, reason: &str);

    /// Completes the request (ending any body) and returns the response head.
    ///
    /// Calling it again after a successful connect returns the same head.
    async fn connect(&mut self) -> Result<ResponseHead, TransferError>;

    /// Reads the next chunk of the response body; `None` at end of stream.
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransferError>;
}

/// Status, headers and final URL of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// Header lines in arrival order; a name may repeat.
    pub headers: Vec<(String, String)>,
    /// Final URL after any followed redirects.
    pub url: String,
}

impl ResponseHead {
    /// Returns the first value of a header, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Whether the body arrives on the error stream (status 400 and above).
    #[must_use]
    pub fn has_error_stream(&self) -> bool {
        self.status >= 400
    }

    /// Whether the content type names one of the JSON media types.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type().is_some_and(|ct| {
            ct.contains(APPLICATION_JSON) || ct.contains(APPLICATION_VND_API_JSON)
        })
    }

    /// Content length in bytes, or 0 when absent or unparsable.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.header("content-length")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Headers with repeated names joined by `", "`, in first-seen order.
    #[must_use]
    pub fn flattened_headers(&self) -> IndexMap<String, String> {
        let mut grouped: IndexMap<String, Vec<&str>> = IndexMap::new();
        for (name, value) in &self.headers {
            grouped.entry(name.clone()).or_default().push(value);
        }
        grouped
            .into_iter()
            .map(|(name, values)| (name, values.join(", ")))
            .collect()
    }
}

/// Reads a connection's remaining response body into memory.
///
/// # Errors
///
/// Propagates the connection's read error.
pub async fn read_to_end(connection: &mut dyn Connection) -> Result<Vec<u8>, TransferError> {
    let mut body = Vec::new();
    while let Some(chunk) = connection.read_chunk().await? {
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
