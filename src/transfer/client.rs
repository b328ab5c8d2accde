//! reqwest-backed transport.
//!
//! [`HttpTransport`] owns the shared client and cookie jar and hands out one
//! [`HttpConnection`] per request. Request bodies are streamed: chunks written
//! to the connection travel through a bounded channel into
//! [`reqwest::Body::wrap_stream`], so the whole body is never buffered.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Body, Client, Method, Response};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use url::Url;

use super::connection::{Connection, ResponseHead, Transport};
use super::constants::{BODY_CHANNEL_DEPTH, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use super::error::TransferError;
use super::request::PreparedRequest;
use crate::user_agent;

/// Transport that opens connections through a shared reqwest client.
///
/// Requests that disable redirects or override a timeout get a dedicated
/// client sharing the same cookie jar; all other requests reuse the default
/// client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    cookie_jar: Arc<Jar>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport with default timeouts and an empty cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransferError> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    /// Creates a transport with explicit default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ClientBuild`] if the HTTP client cannot be built.
    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, TransferError> {
        Self::with_cookie_jar(Arc::new(Jar::default()), connect_timeout, read_timeout)
    }

    /// Creates a transport whose connections all share `cookie_jar`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ClientBuild`] if the HTTP client cannot be built.
    #[instrument(level = "debug", skip(cookie_jar))]
    pub fn with_cookie_jar(
        cookie_jar: Arc<Jar>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, TransferError> {
        let client = build_client(&cookie_jar, connect_timeout, read_timeout, true)?;
        Ok(Self {
            client,
            cookie_jar,
            connect_timeout,
            read_timeout,
        })
    }

    /// Returns the cookie jar used by every connection of this transport.
    #[must_use]
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.cookie_jar
    }

    fn client_for(&self, request: &PreparedRequest) -> Result<Client, TransferError> {
        if !request.disable_redirects
            && request.connect_timeout.is_none()
            && request.read_timeout.is_none()
        {
            return Ok(self.client.clone());
        }
        build_client(
            &self.cookie_jar,
            request.connect_timeout.unwrap_or(self.connect_timeout),
            request.read_timeout.unwrap_or(self.read_timeout),
            !request.disable_redirects,
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &PreparedRequest) -> Result<Box<dyn Connection>, TransferError> {
        let client = self.client_for(request)?;
        Ok(Box::new(HttpConnection::new(client, request)?))
    }
}

fn build_client(
    cookie_jar: &Arc<Jar>,
    connect_timeout: Duration,
    read_timeout: Duration,
    follow_redirects: bool,
) -> Result<Client, TransferError> {
    let mut builder = Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
        .cookie_provider(Arc::clone(cookie_jar));
    if !follow_redirects {
        builder = builder.redirect(Policy::none());
    }
    builder
        .build()
        .map_err(|source| TransferError::ClientBuild { source })
}

enum Phase {
    Configured,
    Streaming {
        sender: mpsc::Sender<io::Result<Bytes>>,
        pending: JoinHandle<reqwest::Result<Response>>,
    },
    Connected(Response),
    Finished,
}

/// A single request/response exchange over reqwest.
pub struct HttpConnection {
    client: Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    phase: Phase,
    head: Option<ResponseHead>,
}

impl HttpConnection {
    fn new(client: Client, request: &PreparedRequest) -> Result<Self, TransferError> {
        let method = Method::from_bytes(request.method.as_str().as_bytes()).map_err(|_| {
            TransferError::InvalidMethod {
                method: request.method.to_string(),
            }
        })?;
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let (name, value) = parse_header(name, value)?;
            headers.append(name, value);
        }
        Ok(Self {
            client,
            method,
            url: request.url.clone(),
            headers,
            phase: Phase::Configured,
            head: None,
        })
    }

    fn start_streaming(&mut self) {
        let (sender, receiver) = mpsc::channel(BODY_CHANNEL_DEPTH);
        let chunks = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|chunk| (chunk, receiver))
        });
        let request = self
            .client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone())
            .body(Body::wrap_stream(chunks));
        let pending = tokio::spawn(request.send());
        self.phase = Phase::Streaming { sender, pending };
    }

    /// Collects the outcome of a request whose body receiver has gone away.
    async fn streaming_failure(&mut self) -> TransferError {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Streaming { pending, .. } => match pending.await {
                Ok(Err(error)) => TransferError::network(self.url.as_str(), error),
                Ok(Ok(_)) => TransferError::body_interrupted(
                    self.url.as_str(),
                    "server responded before the body was complete",
                ),
                Err(join_error) => TransferError::task_aborted(join_error.to_string()),
            },
            other => {
                self.phase = other;
                TransferError::connection_state(self.url.as_str(), "streaming a request body")
            }
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn url(&self) -> &Url {
        &self.url
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransferError> {
        if !matches!(self.phase, Phase::Configured) {
            return Err(TransferError::connection_state(
                self.url.as_str(),
                "accepting request headers",
            ));
        }
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    async fn write_body(&mut self, chunk: Bytes) -> Result<(), TransferError> {
        if matches!(self.phase, Phase::Configured) {
            debug!(url = %self.url, "starting streamed request body");
            self.start_streaming();
        }
        let Phase::Streaming { sender, .. } = &self.phase else {
            return Err(TransferError::connection_state(
                self.url.as_str(),
                "accepting a request body",
            ));
        };
        if sender.send(Ok(chunk)).await.is_err() {
            return Err(self.streaming_failure().await);
        }
        Ok(())
    }

    async fn abort_body(&mut self, reason: &str) {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Streaming { sender, pending } => {
                let _ = sender.try_send(Err(io::Error::other(reason.to_string())));
                pending.abort();
                warn!(url = %self.url, reason, "request body aborted");
            }
            other => self.phase = other,
        }
    }

    async fn connect(&mut self) -> Result<ResponseHead, TransferError> {
        if let Some(head) = &self.head {
            return Ok(head.clone());
        }
        let response = match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Configured => self
                .client
                .request(self.method.clone(), self.url.clone())
                .headers(self.headers.clone())
                .send()
                .await
                .map_err(|e| TransferError::network(self.url.as_str(), e))?,
            Phase::Streaming { sender, pending } => {
                // Closing the channel ends the body stream cleanly.
                drop(sender);
                pending
                    .await
                    .map_err(|e| TransferError::task_aborted(e.to_string()))?
                    .map_err(|e| TransferError::network(self.url.as_str(), e))?
            }
            Phase::Connected(_) | Phase::Finished => {
                return Err(TransferError::connection_state(self.url.as_str(), "open"));
            }
        };
        let head = response_head(&response);
        debug!(url = %self.url, status = head.status, "connected");
        self.head = Some(head.clone());
        self.phase = Phase::Connected(response);
        Ok(head)
    }

    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransferError> {
        let response = match &mut self.phase {
            Phase::Connected(response) => response,
            Phase::Finished if self.head.is_some() => return Ok(None),
            _ => {
                return Err(TransferError::connection_state(
                    self.url.as_str(),
                    "connected",
                ));
            }
        };
        let chunk = response
            .chunk()
            .await
            .map_err(|e| TransferError::network(self.url.as_str(), e))?;
        if chunk.is_none() {
            self.phase = Phase::Finished;
        }
        Ok(chunk)
    }
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        if let Phase::Streaming { sender, pending } = &self.phase {
            let _ = sender.try_send(Err(io::Error::other("connection dropped mid-body")));
            pending.abort();
        }
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), TransferError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| TransferError::invalid_header(name))?;
    let header_value =
        HeaderValue::from_str(value).map_err(|_| TransferError::invalid_header(name))?;
    Ok((header_name, header_value))
}

fn response_head(response: &Response) -> ResponseHead {
    ResponseHead {
        status: response.status().as_u16(),
        headers: response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        url: response.url().to_string(),
    }
}
