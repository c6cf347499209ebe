//! Package downloads against a mock package server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{serve_raw, TestHarness};
use arc_updater::{Downloader, Error};
use parking_lot::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn downloader(idle: Duration) -> Downloader {
    Downloader::new(reqwest::Client::new(), idle)
}

/// Progress never decreases and ends at exactly 100; the file matches.
#[tokio::test]
async fn test_progress_is_monotonic_and_complete() {
    let harness = TestHarness::setup().await;
    let body: Vec<u8> = (0..512 * 1024).map(|i| u8::try_from(i % 251).unwrap()).collect();
    harness.serve_package("big.zip", body.clone()).await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("update.zip");
    let seen = Mutex::new(Vec::new());

    downloader(Duration::from_secs(5))
        .download(
            &harness.package_url("big.zip"),
            &dest,
            |p| seen.lock().push(p),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let seen = seen.into_inner();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards");
    assert_eq!(seen.last().copied(), Some(100));
    assert_eq!(seen.iter().filter(|p| **p == 100).count(), 1);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn test_missing_package_is_download_failed() {
    let harness = TestHarness::setup().await;
    Mock::given(method("GET"))
        .and(path("/downloads/gone.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&harness.server)
        .await;

    let dir = TempDir::new().unwrap();
    let err = downloader(Duration::from_secs(5))
        .download(
            &harness.package_url("gone.zip"),
            &dir.path().join("update.zip"),
            |_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DownloadFailed(404)));
    assert!(!dir.path().join("update.zip").exists());
}

#[tokio::test]
async fn test_cancelled_download() {
    let harness = TestHarness::setup().await;
    harness.serve_package("pkg.zip", vec![7u8; 4096]).await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let dir = TempDir::new().unwrap();
    let err = downloader(Duration::from_secs(5))
        .download(
            &harness.package_url("pkg.zip"),
            &dir.path().join("update.zip"),
            |_| {},
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
}

/// Cancelling while the server is still silent returns promptly.
#[tokio::test]
async fn test_cancel_while_waiting_for_server() {
    let harness = TestHarness::setup().await;
    Mock::given(method("GET"))
        .and(path("/downloads/slow.zip"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&harness.server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let dir = TempDir::new().unwrap();
    let started = std::time::Instant::now();
    let err = downloader(Duration::from_secs(30))
        .download(
            &harness.package_url("slow.zip"),
            &dir.path().join("update.zip"),
            |_| {},
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let harness = TestHarness::setup().await;
    Mock::given(method("GET"))
        .and(path("/downloads/stuck.zip"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&harness.server)
        .await;

    let dir = TempDir::new().unwrap();
    let err = downloader(Duration::from_millis(200))
        .download(
            &harness.package_url("stuck.zip"),
            &dir.path().join("update.zip"),
            |_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Network(_)));
}

/// Without a declared length the body is stored but no progress is reported.
#[tokio::test]
async fn test_unknown_length_reports_no_progress() {
    let url = serve_raw(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nhello world").await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("update.zip");
    let seen = Mutex::new(Vec::new());

    downloader(Duration::from_secs(5))
        .download(&url, &dest, |p| seen.lock().push(p), &CancellationToken::new())
        .await
        .unwrap();

    assert!(seen.into_inner().is_empty());
    assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
}

/// A body cut short of its declared length is an I/O error and never
/// reaches 100%.
#[tokio::test]
async fn test_truncated_body_is_unexpected_eof() {
    let url = serve_raw(
        b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\nhello",
    )
    .await;

    let dir = TempDir::new().unwrap();
    let seen = Mutex::new(Vec::new());

    let err = downloader(Duration::from_secs(5))
        .download(
            &url,
            &dir.path().join("update.zip"),
            |p| seen.lock().push(p),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => unreachable!("expected truncation error, got {other:?}"),
    }
    assert!(!seen.into_inner().contains(&100));
}
