//! Response decoding into a normalized envelope.
//!
//! The body is chosen and decoded from three inputs: whether the response
//! arrived on the error stream (status 400 and above), the response content
//! type, and the response type the caller asked for.
//!
//! | condition                                    | body decoded as                  |
//! |----------------------------------------------|----------------------------------|
//! | error stream, JSON content type              | JSON, `error = true`             |
//! | error stream, other content type             | text, `error = true`             |
//! | content type contains `application/json`    | JSON                             |
//! | `arraybuffer` / `blob`                       | base64 of the raw bytes          |
//! | `json`                                       | JSON                             |
//! | `document` / `text` / anything else          | text                             |

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::connection::{Connection, ResponseHead, read_to_end};
use super::constants::APPLICATION_JSON;
use super::error::TransferError;

/// Representation the caller wants for a successful, non-JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "String")]
pub enum ResponseType {
    ArrayBuffer,
    Blob,
    Document,
    Json,
    #[default]
    Text,
}

impl ResponseType {
    /// Parses a response type name case-insensitively; unknown or missing
    /// names select [`ResponseType::Text`].
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("arraybuffer") => Self::ArrayBuffer,
            Some("blob") => Self::Blob,
            Some("document") => Self::Document,
            Some("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

impl From<String> for ResponseType {
    fn from(value: String) -> Self {
        Self::parse(Some(&value))
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Json(Value),
    Text(String),
    /// Standard base64 of the raw bytes, without line wrapping.
    Base64(String),
}

/// Normalized result of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub status: u16,
    /// Header names mapped to their values joined with `", "`.
    pub headers: IndexMap<String, String>,
    /// Final URL of the response.
    pub url: String,
    pub data: ResponseData,
    /// Set when the body was read from the error stream.
    #[serde(skip_serializing_if = "is_false")]
    pub error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Reads the rest of `connection` and builds the envelope for `head`.
///
/// # Errors
///
/// Returns [`TransferError::Decode`] (carrying the status and final URL) when
/// the body cannot be read or a JSON body does not parse.
#[instrument(level = "debug", skip(head, connection), fields(status = head.status, url = %head.url))]
pub async fn decode_response(
    head: &ResponseHead,
    connection: &mut dyn Connection,
    response_type: ResponseType,
) -> Result<ResponseEnvelope, TransferError> {
    let body = read_to_end(connection)
        .await
        .map_err(|e| TransferError::decode(&head.url, head.status, e.to_string()))?;
    debug!(bytes = body.len(), ?response_type, "response body read");

    let data = decode_body(head, &body, response_type)
        .map_err(|e| TransferError::decode(&head.url, head.status, e.to_string()))?;

    Ok(ResponseEnvelope {
        status: head.status,
        headers: head.flattened_headers(),
        url: head.url.clone(),
        data,
        error: head.has_error_stream(),
    })
}

fn decode_body(
    head: &ResponseHead,
    body: &[u8],
    response_type: ResponseType,
) -> Result<ResponseData, serde_json::Error> {
    if head.has_error_stream() {
        return if head.is_json() {
            parse_json_body(&body_text(body)).map(ResponseData::Json)
        } else {
            Ok(ResponseData::Text(body_text(body)))
        };
    }

    if head
        .content_type()
        .is_some_and(|ct| ct.contains(APPLICATION_JSON))
    {
        return parse_json_body(&body_text(body)).map(ResponseData::Json);
    }

    Ok(match response_type {
        ResponseType::ArrayBuffer | ResponseType::Blob => ResponseData::Base64(STANDARD.encode(body)),
        ResponseType::Json => ResponseData::Json(parse_json_body(&body_text(body))?),
        ResponseType::Document | ResponseType::Text => ResponseData::Text(body_text(body)),
    })
}

/// Decodes a body as text line by line, joined with `\n`.
///
/// Line terminators (`\n` or `\r\n`) are normalized and a trailing newline is
/// dropped. Invalid UTF-8 is replaced rather than rejected.
#[must_use]
pub fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .lines()
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses a JSON response body.
///
/// `null` becomes JSON null. The bare literals `true` and `false` become
/// `{"flag": "true"}` / `{"flag": "false"}` with string values; existing
/// consumers rely on that shape. Anything else must be an object or an array.
///
/// # Errors
///
/// Returns the array parse error when the body is neither an object nor an
/// array.
pub fn parse_json_body(text: &str) -> Result<Value, serde_json::Error> {
    match text.trim() {
        "null" => Ok(Value::Null),
        literal @ ("true" | "false") => Ok(json!({ "flag": literal })),
        _ => match serde_json::from_str::<Map<String, Value>>(text) {
            Ok(object) => Ok(Value::Object(object)),
            Err(_) => serde_json::from_str::<Vec<Value>>(text).map(Value::Array),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::fake_connection::FakeConnection;

    async fn decode(
        status: u16,
        headers: &[(&str, &str)],
        body: &[u8],
        response_type: ResponseType,
    ) -> Result<ResponseEnvelope, TransferError> {
        let mut connection =
            FakeConnection::new("https://api.example.test/items").respond(status, headers, body);
        let head = connection.connect().await.unwrap();
        decode_response(&head, &mut connection, response_type).await
    }

    #[test]
    fn test_parse_json_literal_quirks() {
        assert_eq!(parse_json_body("null").unwrap(), Value::Null);
        assert_eq!(parse_json_body("true").unwrap(), json!({"flag": "true"}));
        assert_eq!(parse_json_body(" false ").unwrap(), json!({"flag": "false"}));
    }

    #[test]
    fn test_parse_json_object_then_array() {
        assert_eq!(parse_json_body(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert_eq!(parse_json_body("[1,2]").unwrap(), json!([1, 2]));
        assert!(parse_json_body("42").is_err());
        assert!(parse_json_body("not json").is_err());
    }

    #[test]
    fn test_response_type_parse_falls_back_to_text() {
        assert_eq!(ResponseType::parse(Some("ArrayBuffer")), ResponseType::ArrayBuffer);
        assert_eq!(ResponseType::parse(Some("BLOB")), ResponseType::Blob);
        assert_eq!(ResponseType::parse(Some("json")), ResponseType::Json);
        assert_eq!(ResponseType::parse(Some("xml")), ResponseType::Text);
        assert_eq!(ResponseType::parse(None), ResponseType::Text);
    }

    #[test]
    fn test_body_text_joins_lines_and_drops_trailing_newline() {
        assert_eq!(body_text(b"one\r\ntwo\n"), "one\ntwo");
        assert_eq!(body_text(b""), "");
    }

    #[tokio::test]
    async fn test_json_true_body_decodes_to_flag_object() {
        let envelope = decode(200, &[("Content-Type", "application/json")], b"true", ResponseType::Text)
            .await
            .unwrap();
        assert_eq!(envelope.data, ResponseData::Json(json!({"flag": "true"})));
        assert!(!envelope.error);
    }

    #[tokio::test]
    async fn test_json_content_type_overrides_requested_type() {
        let envelope = decode(
            200,
            &[("content-type", "application/json; charset=utf-8")],
            br#"{"id":7}"#,
            ResponseType::Blob,
        )
        .await
        .unwrap();
        assert_eq!(envelope.data, ResponseData::Json(json!({"id": 7})));
    }

    #[tokio::test]
    async fn test_error_status_plain_text() {
        let envelope = decode(500, &[("content-type", "text/plain")], b"boom\n", ResponseType::Json)
            .await
            .unwrap();
        assert_eq!(envelope.status, 500);
        assert!(envelope.error);
        assert_eq!(envelope.data, ResponseData::Text("boom".into()));
    }

    #[tokio::test]
    async fn test_error_status_vnd_api_json() {
        let envelope = decode(
            422,
            &[("content-type", "application/vnd.api+json")],
            br#"{"errors":[]}"#,
            ResponseType::Text,
        )
        .await
        .unwrap();
        assert!(envelope.error);
        assert_eq!(envelope.data, ResponseData::Json(json!({"errors": []})));
    }

    #[tokio::test]
    async fn test_vnd_api_json_success_follows_requested_type() {
        let envelope = decode(
            200,
            &[("content-type", "application/vnd.api+json")],
            br#"{"data":1}"#,
            ResponseType::Text,
        )
        .await
        .unwrap();
        assert_eq!(envelope.data, ResponseData::Text(r#"{"data":1}"#.into()));
    }

    #[tokio::test]
    async fn test_blob_is_base64_encoded() {
        let envelope = decode(
            200,
            &[("content-type", "application/octet-stream")],
            &[0xff, 0x00, 0x10],
            ResponseType::ArrayBuffer,
        )
        .await
        .unwrap();
        assert_eq!(envelope.data, ResponseData::Base64("/wAQ".into()));
    }

    #[tokio::test]
    async fn test_requested_json_with_bad_body_keeps_status_and_url() {
        let error = decode(200, &[("content-type", "text/plain")], b"nope", ResponseType::Json)
            .await
            .unwrap_err();
        match error {
            TransferError::Decode { url, status, .. } => {
                assert_eq!(status, 200);
                assert_eq!(url, "https://api.example.test/items");
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_envelope_serializes_without_error_flag_on_success() {
        let envelope = decode(
            201,
            &[("x-a", "1"), ("x-a", "2")],
            b"created",
            ResponseType::Text,
        )
        .await
        .unwrap();
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "status": 201,
                "headers": {"x-a": "1, 2"},
                "url": "https://api.example.test/items",
                "data": "created"
            })
        );
    }
}
