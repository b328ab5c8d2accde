//! Integration tests for scheduled uploads.
//!
//! Uploads go through the engine and scheduler to a mock server; the
//! multipart body the server receives is inspected directly.

use image::{GenericImageView, Rgb, RgbImage};
use serde_json::json;
use tempfile::TempDir;
use transfer_core::transfer::{ResizeOptions, ResponseType};
use transfer_core::{
    ResponseData, TransferConfig, TransferEngine, UploadOptions, UploadScheduler, WorkerSizing,
};
use wiremock::matchers::{header_regex, method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

fn engine_rooted_at(dir: &TempDir, workers: usize) -> TransferEngine {
    let config = TransferConfig::default()
        .with_workers(WorkerSizing::Fixed(workers))
        .with_file_root(dir.path())
        .with_scratch_dir(dir.path());
    TransferEngine::new(&config).expect("engine should build")
}

/// Splits a received multipart body into `(name, filename, content)` triples.
fn parts_of(body: &[u8], content_type: &str) -> Vec<(String, Option<String>, Vec<u8>)> {
    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .expect("content type should carry a boundary");
    let text = String::from_utf8_lossy(body).into_owned();
    let delimiter = format!("--{boundary}");
    text.split(delimiter.as_str())
        .filter(|section| !section.trim().is_empty() && !section.starts_with("--"))
        .map(|section| {
            let (head, content) = section
                .trim_start_matches("\r\n")
                .split_once("\r\n\r\n")
                .expect("part should have headers");
            let quoted = |key: &str| {
                head.split(&format!("{key}=\""))
                    .nth(1)
                    .and_then(|rest| rest.split('"').next())
                    .map(str::to_string)
            };
            (
                quoted("name").expect("part should have a name"),
                quoted("filename"),
                content.trim_end_matches("\r\n").as_bytes().to_vec(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_upload_sends_key_first_then_fields_then_file() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header_regex("content-type", "^multipart/form-data; boundary=.+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"stored":true}"#, "application/json"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("failed to create temp dir");
    std::fs::write(dir.path().join("notes.txt"), b"hello upload").expect("write file");

    let mut options = UploadOptions::new(format!("{}/upload", mock_server.uri()), "notes.txt");
    options.data = serde_json::from_value(json!({"note": "n", "key": "abc"})).expect("fields");
    options.id = Some("notes-1".into());

    let engine = engine_rooted_at(&dir, 1);
    let handle = engine.upload_file(options).await.expect("upload should be accepted");
    let envelope = handle.await.expect("upload should succeed");
    assert_eq!(envelope.data, ResponseData::Json(json!({"stored": true})));

    let requests = mock_server.received_requests().await.expect("requests recorded");
    let request = &requests[0];
    let content_type = request
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .expect("content type");
    let parts = parts_of(&request.body, content_type);

    let names: Vec<&str> = parts.iter().map(|(name, _, _)| name.as_str()).collect();
    assert_eq!(
        names,
        ["key", "note", "X-Image-Width", "X-Image-Height", "X-File-Size", "file"]
    );
    assert_eq!(parts[0].2, b"abc");
    assert_eq!(parts[2].2, b"-1");
    assert_eq!(parts[3].2, b"-1");
    assert_eq!(parts[4].2, b"12");
    assert_eq!(parts[5].1.as_deref(), Some("notes.txt"));
    assert_eq!(parts[5].2, b"hello upload");
}

#[tokio::test]
async fn test_upload_image_is_downscaled_before_sending() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("failed to create temp dir");
    RgbImage::from_pixel(400, 200, Rgb([200, 100, 50]))
        .save(dir.path().join("wide.png"))
        .expect("write image");

    let mut options = UploadOptions::new(mock_server.uri(), "wide.png");
    options.method = Some("PUT".into());
    options.name = Some("photo".into());
    options.resize = Some(ResizeOptions {
        max_width: Some(100),
        format: "png".into(),
        ..ResizeOptions::default()
    });

    let engine = engine_rooted_at(&dir, 2);
    let envelope = engine
        .upload_image(options)
        .await
        .expect("upload should be accepted")
        .await
        .expect("upload should succeed");
    assert_eq!(envelope.data, ResponseData::Text("ok".into()));

    let requests = mock_server.received_requests().await.expect("requests recorded");
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .expect("content type");
    let parts = parts_of(&requests[0].body, content_type);
    let field = |name: &str| {
        parts
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, content)| String::from_utf8_lossy(content).into_owned())
    };
    assert_eq!(field("X-Image-Width").as_deref(), Some("100"));
    assert_eq!(field("X-Image-Height").as_deref(), Some("50"));

    let (_, filename, _) = parts
        .iter()
        .find(|(name, _, _)| name == "photo")
        .expect("file part");
    assert!(
        filename.as_deref().is_some_and(|f| f.ends_with(".png")),
        "filename: {filename:?}"
    );

    // Only the original remains; the resized copy is removed after sending.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, ["wide.png"]);
    let original = image::open(dir.path().join("wide.png")).expect("original image");
    assert_eq!(original.dimensions(), (400, 200));
}

#[tokio::test]
async fn test_upload_server_error_still_resolves_with_envelope() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(413)
                .set_body_raw(r#"{"error":"too large"}"#, "application/json"),
        )
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("failed to create temp dir");
    std::fs::write(dir.path().join("big.bin"), vec![7_u8; 10_000]).expect("write file");

    let mut options = UploadOptions::new(mock_server.uri(), "big.bin");
    options.response_type = ResponseType::Json;
    let envelope = engine_rooted_at(&dir, 1)
        .upload_file(options)
        .await
        .expect("upload should be accepted")
        .await
        .expect("error statuses are delivered as envelopes");
    assert_eq!(envelope.status, 413);
    assert!(envelope.error);
    assert_eq!(envelope.data, ResponseData::Json(json!({"error": "too large"})));
}

#[tokio::test]
async fn test_upload_to_unreachable_host_fails_with_upload_code() {
    let dir = TempDir::new().expect("failed to create temp dir");
    std::fs::write(dir.path().join("a.txt"), b"a").expect("write file");

    let options = UploadOptions::new("http://127.0.0.1:1/upload", "a.txt");
    let failure = engine_rooted_at(&dir, 1)
        .upload_file(options)
        .await
        .expect("upload should be accepted")
        .await
        .expect_err("connection should fail");
    assert_eq!(failure.code, "UPLOAD");
    assert_eq!(failure.category(), "UploadFailure");
}

#[tokio::test]
async fn test_concurrent_uploads_each_resolve_once() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(4)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("failed to create temp dir");
    std::fs::write(dir.path().join("a.txt"), b"a").expect("write file");
    let engine = engine_rooted_at(&dir, 2);
    let scheduler: &UploadScheduler = engine.scheduler();
    assert_eq!(scheduler.worker_count(), 2);

    let mut handles = Vec::new();
    for _ in 0..4 {
        handles.push(
            engine
                .upload_file(UploadOptions::new(mock_server.uri(), "a.txt"))
                .await
                .expect("upload should be accepted"),
        );
    }
    for handle in handles {
        let envelope = handle.await.expect("upload should succeed");
        assert_eq!(envelope.status, 200);
    }
    assert_eq!(engine.scheduler().succeeded(), 4);
}
