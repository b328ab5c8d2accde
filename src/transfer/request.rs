//! Outbound request description and URL assembly.
//!
//! A [`RequestSpec`] collects the raw call inputs; [`RequestSpec::prepare`]
//! validates the URL and merges query parameters, and [`RequestSpec::open`]
//! hands the prepared request to a [`Transport`] to obtain a connection.

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, instrument};
use url::{Position, Url};

use super::connection::{Connection, Transport};
use super::error::TransferError;

/// HTTP method of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    /// Any other verb, stored upper-cased.
    Other(String),
}

impl HttpMethod {
    /// Parses a method name case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let upper = value.trim().to_ascii_uppercase();
        match upper.as_str() {
            "GET" | "" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            _ => Self::Other(upper),
        }
    }

    /// Returns the wire name of the method.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Other(name) => name,
        }
    }

    /// Whether a request body is sent for this method.
    #[must_use]
    pub fn carries_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query parameter or form field value: one string or an ordered list.
///
/// Hosts hand over loosely typed JSON, so numbers and booleans are accepted
/// and stored as their string form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum FieldValue {
    Single(String),
    Many(Vec<String>),
}

impl FieldValue {
    /// Iterates the values in order; a single value yields once.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single(value) => value.serialize(serializer),
            Self::Many(values) => values.serialize(serializer),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

impl TryFrom<Value> for FieldValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(scalar_to_string)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Many),
            other => scalar_to_string(other).map(Self::Single),
        }
    }
}

fn scalar_to_string(value: Value) -> Result<String, String> {
    match value {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(format!("expected a string or list of strings, got {other}")),
    }
}

/// Ordered mapping of names to field values; insertion order is wire order.
pub type FieldMap = IndexMap<String, FieldValue>;

/// Builds a [`FieldMap`] from loose JSON entries, dropping values that are
/// neither scalars nor lists of scalars.
pub fn lenient_fields<I>(entries: I) -> FieldMap
where
    I: IntoIterator<Item = (String, Value)>,
{
    entries
        .into_iter()
        .filter_map(|(name, value)| match FieldValue::try_from(value) {
            Ok(field) => Some((name, field)),
            Err(reason) => {
                debug!(field = %name, %reason, "skipping form field");
                None
            }
        })
        .collect()
}

/// Deserializes a [`FieldMap`] through [`lenient_fields`]; `null` is empty.
///
/// # Errors
///
/// Fails only when the input is neither an object nor `null`.
pub fn deserialize_lenient_fields<'de, D>(deserializer: D) -> Result<FieldMap, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Option<IndexMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(entries.map(lenient_fields).unwrap_or_default())
}

/// Raw inputs describing one outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub params: FieldMap,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub disable_redirects: bool,
    pub should_encode: bool,
}

impl RequestSpec {
    /// Creates a spec with no headers, params or timeouts and URL encoding on.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: IndexMap::new(),
            params: FieldMap::new(),
            connect_timeout_ms: None,
            read_timeout_ms: None,
            disable_redirects: false,
            should_encode: true,
        }
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets connect and read deadlines in milliseconds.
    #[must_use]
    pub fn timeouts(mut self, connect_ms: Option<u64>, read_ms: Option<u64>) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self
    }

    /// Validates the URL and merges the query parameters into it.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidUrl`] when the URL (before or after
    /// merging) does not parse as an absolute URL with a host.
    pub fn prepare(&self) -> Result<PreparedRequest, TransferError> {
        let url = build_url(&self.url, &self.params, self.should_encode)?;
        Ok(PreparedRequest {
            method: self.method.clone(),
            url,
            headers: self.headers.clone(),
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
            disable_redirects: self.disable_redirects,
        })
    }

    /// Prepares the request and opens a configured connection for it.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidUrl`] before any connection attempt
    /// when the URL is invalid, or the transport's error when the
    /// connection cannot be configured.
    #[instrument(level = "debug", skip(self, transport), fields(method = %self.method, url = %self.url))]
    pub async fn open(&self, transport: &dyn Transport) -> Result<Box<dyn Connection>, TransferError> {
        let prepared = self.prepare()?;
        debug!(url = %prepared.url, "opening connection");
        transport.open(&prepared).await
    }
}

/// A validated request ready to be handed to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: IndexMap<String, String>,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub disable_redirects: bool,
}

/// Appends `params` to the query of `raw` and rebuilds the URL.
///
/// With `should_encode`, each parameter name and value is percent-encoded so
/// reserved characters cannot alter the query structure. Without it, the URL
/// is reassembled from its parts verbatim and the caller is responsible for
/// supplying a well-formed query.
///
/// # Errors
///
/// Returns [`TransferError::InvalidUrl`] when `raw` is not an absolute URL
/// with a host, or when the reassembled unencoded URL does not parse.
pub fn build_url(raw: &str, params: &FieldMap, should_encode: bool) -> Result<Url, TransferError> {
    let base = Url::parse(raw).map_err(|_| TransferError::invalid_url(raw))?;
    if base.host_str().is_none() {
        return Err(TransferError::invalid_url(raw));
    }

    if params.is_empty() {
        return Ok(base);
    }

    let mut query = base.query().unwrap_or_default().to_string();
    for (key, value) in params {
        for item in value.iter() {
            if !query.is_empty() {
                query.push('&');
            }
            if should_encode {
                query.push_str(&urlencoding::encode(key));
                query.push('=');
                query.push_str(&urlencoding::encode(item));
            } else {
                query.push_str(key);
                query.push('=');
                query.push_str(item);
            }
        }
    }

    if should_encode {
        let mut url = base;
        url.set_query((!query.is_empty()).then_some(query.as_str()));
        return Ok(url);
    }

    let mut assembled = base[..Position::AfterPath].to_string();
    if !query.is_empty() {
        assembled.push('?');
        assembled.push_str(&query);
    }
    if let Some(fragment) = base.fragment() {
        assembled.push('#');
        assembled.push_str(fragment);
    }
    Url::parse(&assembled).map_err(|_| TransferError::invalid_url(assembled))
}
