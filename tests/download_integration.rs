//! Integration tests for downloads to local files.
//!
//! These tests verify the full download flow with mock HTTP servers.

use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use transfer_core::transfer::ProgressFn;
use transfer_core::{DownloadOptions, TransferConfig, TransferEngine, TransferError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

fn engine_rooted_at(dir: &TempDir) -> TransferEngine {
    TransferEngine::new(&TransferConfig::default().with_file_root(dir.path()))
        .expect("engine should build")
}

#[tokio::test]
async fn test_download_full_flow_preserves_content_and_reports_progress() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let content = vec![42_u8; 64 * 1024];
    Mock::given(method("GET"))
        .and(path("/archive.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let progress: Arc<ProgressFn> = Arc::new(move |written, total| {
        sink.lock().expect("progress lock").push((written, total));
    });

    let mut options = DownloadOptions::new(
        format!("{}/archive.bin", mock_server.uri()),
        "archive.bin",
    );
    options.file_directory = Some("nested/dir".into());
    let result = engine_rooted_at(&temp_dir)
        .download_file(options, Some(progress))
        .await
        .expect("download should succeed");

    let expected_path = temp_dir.path().join("nested/dir/archive.bin");
    assert_eq!(result.path, expected_path);
    assert_eq!(std::fs::read(&expected_path).expect("should read file"), content);

    let seen = seen.lock().expect("progress lock");
    assert!(!seen.is_empty(), "progress should be reported");
    assert!(seen.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    assert_eq!(seen.last().copied(), Some((65_536, 65_536)));

    let json = serde_json::to_value(&result).expect("result serializes");
    assert_eq!(json["path"], expected_path.display().to_string());
}

#[tokio::test]
async fn test_download_error_status_creates_no_file() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let error = engine_rooted_at(&temp_dir)
        .download_file(DownloadOptions::new(mock_server.uri(), "gone.bin"), None)
        .await
        .expect_err("404 should fail");

    assert!(matches!(error, TransferError::HttpStatus { status: 404, .. }));
    assert!(!temp_dir.path().join("gone.bin").exists());
}

#[tokio::test]
async fn test_download_honors_method_option() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut options =
        DownloadOptions::new(format!("{}/export", mock_server.uri()), "export.csv");
    options.method = Some("POST".into());
    let result = engine_rooted_at(&temp_dir)
        .download_file(options, None)
        .await
        .expect("download should succeed");
    assert_eq!(
        std::fs::read_to_string(result.path).expect("should read file"),
        "a,b\n1,2\n"
    );
}

#[tokio::test]
async fn test_download_without_file_path_is_rejected() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut options = DownloadOptions::new("https://files.example.test/a", "unused");
    options.file_path = None;
    let error = engine_rooted_at(&temp_dir)
        .download_file(options, None)
        .await
        .expect_err("missing file path should fail");
    assert!(matches!(error, TransferError::MissingOption { option: "filePath" }));
}
