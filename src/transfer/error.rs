//! Error types for the transfer module.
//!
//! Every variant carries the context (url, path) needed to explain the
//! failure; [`TransferError::category`] maps a variant onto the category name
//! a host receives when a synchronous call is rejected.

use std::path::PathBuf;

use thiserror::Error;

/// Category name for URLs rejected before any connection attempt.
pub const CATEGORY_INVALID_URL: &str = "InvalidURL";

/// Category name for socket and I/O failures while opening, writing or reading.
pub const CATEGORY_CONNECTION: &str = "ConnectionError";

/// Category name for response bodies that cannot be parsed.
pub const CATEGORY_DECODE: &str = "DecodeError";

/// Category name for failures of a scheduled upload.
pub const CATEGORY_UPLOAD: &str = "UploadFailure";

/// Category name for missing or unresolvable local files.
pub const CATEGORY_FILE: &str = "FileError";

/// Errors that can occur while building, sending or decoding a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The provided URL is malformed or not absolute.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL string.
        url: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("connection error for {url}: {source}")]
    Connection {
        /// The URL being requested.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Connect or read deadline elapsed.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The request method is not a valid HTTP token.
    #[error("invalid request method {method}")]
    InvalidMethod {
        /// The rejected method name.
        method: String,
    },

    /// A request header name or value is not valid on the wire.
    #[error("invalid request header {name}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
    },

    /// The request body stream was interrupted before it completed.
    #[error("request body for {url} was interrupted: {reason}")]
    BodyInterrupted {
        /// The URL being requested.
        url: String,
        /// Why the body could not be completed.
        reason: String,
    },

    /// A connection operation was invoked in the wrong lifecycle state.
    #[error("connection to {url} is not {expected}")]
    ConnectionState {
        /// The URL of the connection.
        url: String,
        /// The state the operation required.
        expected: &'static str,
    },

    /// The server answered a download with an error status.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while reading an upload or writing a download.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A local file required by the call does not exist.
    #[error("could not find file {path}")]
    FileNotFound {
        /// The logical path that failed to resolve.
        path: String,
    },

    /// A required call option was not supplied.
    #[error("{option} not provided")]
    MissingOption {
        /// The option name as the host spells it.
        option: &'static str,
    },

    /// The response body could not be read or parsed.
    ///
    /// Status and final URL are preserved so callers can still report them.
    #[error("failed to decode HTTP {status} response from {url}: {message}")]
    Decode {
        /// The final URL of the response.
        url: String,
        /// The response status.
        status: u16,
        /// What went wrong while decoding.
        message: String,
    },

    /// A spawned request or worker task ended without producing a result.
    #[error("transfer task did not complete: {reason}")]
    TaskAborted {
        /// Why the task ended early (panic, cancellation, shutdown).
        reason: String,
    },
}

impl TransferError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a connection or timeout error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Connection {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>) -> Self {
        Self::InvalidHeader { name: name.into() }
    }

    /// Creates an interrupted body error.
    pub fn body_interrupted(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BodyInterrupted {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a lifecycle state error.
    pub fn connection_state(url: impl Into<String>, expected: &'static str) -> Self {
        Self::ConnectionState {
            url: url.into(),
            expected,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a file-not-found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// Creates an aborted-task error.
    pub fn task_aborted(reason: impl Into<String>) -> Self {
        Self::TaskAborted {
            reason: reason.into(),
        }
    }

    /// Returns the category name reported to the host when a call is rejected.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => CATEGORY_INVALID_URL,
            Self::Connection { .. }
            | Self::Timeout { .. }
            | Self::ClientBuild { .. }
            | Self::InvalidMethod { .. }
            | Self::InvalidHeader { .. }
            | Self::BodyInterrupted { .. }
            | Self::ConnectionState { .. }
            | Self::HttpStatus { .. }
            | Self::Io { .. } => CATEGORY_CONNECTION,
            Self::FileNotFound { .. } | Self::MissingOption { .. } => CATEGORY_FILE,
            Self::Decode { .. } => CATEGORY_DECODE,
            Self::TaskAborted { .. } => CATEGORY_UPLOAD,
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path the source error does not carry.
