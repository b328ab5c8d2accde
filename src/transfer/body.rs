//! Serialization of a request's `data` payload, chosen by its `Content-Type`.

use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::connection::Connection;
use super::constants::{APPLICATION_FORM_URLENCODED, APPLICATION_JSON, MULTIPART_FORM_DATA};
use super::error::TransferError;
use super::multipart;
use super::request::{FieldMap, lenient_fields};

/// How a payload is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    FormUrlEncoded,
    Multipart,
    Raw,
}

impl BodyEncoding {
    /// Picks the encoding for the request's `Content-Type` header value.
    #[must_use]
    pub fn for_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.contains(APPLICATION_JSON) => Self::Json,
            Some(ct) if ct.contains(APPLICATION_FORM_URLENCODED) => Self::FormUrlEncoded,
            Some(ct) if ct.contains(MULTIPART_FORM_DATA) => Self::Multipart,
            _ => Self::Raw,
        }
    }
}

/// Writes `data` as the body of `connection`.
///
/// Object payloads are required for form and multipart encodings; other
/// payloads fall back to raw text. A multipart body replaces the request's
/// `Content-Type` with one carrying a fresh boundary.
///
/// # Errors
///
/// Returns the connection's write error.
#[instrument(level = "debug", skip(connection, headers, data))]
pub async fn write_request_body(
    connection: &mut dyn Connection,
    headers: &IndexMap<String, String>,
    data: &Value,
) -> Result<(), TransferError> {
    let content_type = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.as_str());
    let encoding = BodyEncoding::for_content_type(content_type);
    debug!(?encoding, "writing request body");

    match (encoding, data) {
        (BodyEncoding::Json, _) => connection.write_body(Bytes::from(data.to_string())).await,
        (BodyEncoding::FormUrlEncoded, Value::Object(object)) => {
            connection
                .write_body(Bytes::from(form_urlencode(&object_fields(object))))
                .await
        }
        (BodyEncoding::Multipart, Value::Object(object)) => {
            multipart::encode_fields(connection, &object_fields(object)).await
        }
        _ => connection.write_body(Bytes::from(raw_text(data))).await,
    }
}

fn object_fields(object: &Map<String, Value>) -> FieldMap {
    lenient_fields(object.clone())
}

fn form_urlencode(fields: &FieldMap) -> String {
    fields
        .iter()
        .flat_map(|(name, value)| {
            value
                .iter()
                .map(move |item| format!("{}={}", urlencoding::encode(name), urlencoding::encode(item)))
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn raw_text(data: &Value) -> String {
    match data {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
