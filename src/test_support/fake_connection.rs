//! In-memory [`Connection`] with a scripted response.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::transfer::{Connection, PreparedRequest, ResponseHead, TransferError, Transport};

/// What a fake connection observed from the code driving it.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub aborted: Option<String>,
    pub connected: bool,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Tracks how many fake connections are inside `connect` at once.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeConnection {
    url: Url,
    head: ResponseHead,
    body: VecDeque<Bytes>,
    record: Arc<Mutex<Recorded>>,
    fail_writes_after: Option<usize>,
    connect_delay: Option<Duration>,
    gauge: Option<Arc<Gauge>>,
    writes: usize,
    connected: bool,
}

impl FakeConnection {
    pub fn new(url: &str) -> Self {
        let url = Url::parse(url).unwrap();
        Self {
            head: ResponseHead {
                status: 200,
                headers: Vec::new(),
                url: url.to_string(),
            },
            url,
            body: VecDeque::new(),
            record: Arc::new(Mutex::new(Recorded::default())),
            fail_writes_after: None,
            connect_delay: None,
            gauge: None,
            writes: 0,
            connected: false,
        }
    }

    /// Scripts the response; the body is served in two chunks to exercise reassembly.
    pub fn respond(mut self, status: u16, headers: &[(&str, &str)], body: &[u8]) -> Self {
        self.head.status = status;
        self.head.headers = headers
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let split = body.len() / 2;
        self.body = VecDeque::from([
            Bytes::copy_from_slice(&body[..split]),
            Bytes::copy_from_slice(&body[split..]),
        ]);
        self
    }

    /// Fails every body write after the first `writes` succeed.
    pub fn fail_writes_after(mut self, writes: usize) -> Self {
        self.fail_writes_after = Some(writes);
        self
    }

    /// Holds `connect` for `delay`, standing in for a slow server.
    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Reports time spent in `connect` to `gauge`.
    pub fn gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn recorder(&self) -> Arc<Mutex<Recorded>> {
        Arc::clone(&self.record)
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn url(&self) -> &Url {
        &self.url
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransferError> {
        self.record
            .lock()
            .unwrap()
            .headers
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    async fn write_body(&mut self, chunk: Bytes) -> Result<(), TransferError> {
        if self.fail_writes_after.is_some_and(|limit| self.writes >= limit) {
            return Err(TransferError::body_interrupted(self.url.as_str(), "socket closed"));
        }
        self.writes += 1;
        self.record.lock().unwrap().body.extend_from_slice(&chunk);
        Ok(())
    }

    async fn abort_body(&mut self, reason: &str) {
        self.record.lock().unwrap().aborted = Some(reason.to_string());
    }

    async fn connect(&mut self) -> Result<ResponseHead, TransferError> {
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.leave();
        }
        self.connected = true;
        self.record.lock().unwrap().connected = true;
        Ok(self.head.clone())
    }

    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransferError> {
        if !self.connected {
            return Err(TransferError::connection_state(self.url.as_str(), "connected"));
        }
        Ok(self.body.pop_front())
    }
}

/// Transport handing out fake connections that all return the same response.
pub struct FakeTransport {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    pub opened: Arc<Mutex<Vec<(PreparedRequest, Arc<Mutex<Recorded>>)>>>,
}

impl FakeTransport {
    pub fn new(status: u16, headers: &[(&str, &str)], body: &[u8]) -> Self {
        Self {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            body: body.to_vec(),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, request: &PreparedRequest) -> Result<Box<dyn Connection>, TransferError> {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let connection =
            FakeConnection::new(request.url.as_str()).respond(self.status, &headers, &self.body);
        let recorder = connection.recorder();
        for (name, value) in &request.headers {
            recorder
                .lock()
                .unwrap()
                .headers
                .push((name.clone(), value.clone()));
        }
        self.opened
            .lock()
            .unwrap()
            .push((request.clone(), recorder));
        Ok(Box::new(connection))
    }
}
