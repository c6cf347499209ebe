//! Release feed checks against a mock feed.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{TestHarness, PACKAGE_NAME};
use arc_updater::config::FeedConfig;
use arc_updater::upgrade::FEED_ACCEPT;
use arc_updater::{Error, Platform, VersionChecker};
use semver::Version;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

/// A newer tag yields the release page, notes and the platform package URL.
#[tokio::test]
async fn test_newer_release_is_reported() {
    let harness = TestHarness::setup().await;
    harness
        .publish_release("v1.2.0", &["arc-scanner-windows.zip", PACKAGE_NAME])
        .await;

    let info = harness
        .checker()
        .check_for_update("1.1.9")
        .await
        .unwrap()
        .expect("update expected");

    assert_eq!(info.version, Version::new(1, 2, 0));
    assert_eq!(info.download_url, harness.package_url(PACKAGE_NAME));
    assert_eq!(info.release_notes, "Faster scans");
    assert!(info.release_url.ends_with("/releases/tag/v1.2.0"));
}

/// The feed request carries the feed media type and the client identity.
#[tokio::test]
async fn test_request_headers() {
    let harness = TestHarness::setup().await;
    Mock::given(method("GET"))
        .and(path(TestHarness::feed_path()))
        .and(header("accept", FEED_ACCEPT))
        .and(header("user-agent", "arc-scanner-updater"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&harness.server)
        .await;

    assert!(harness.checker().check_for_update("1.0.0").await.unwrap().is_none());
}

#[tokio::test]
async fn test_same_version_is_not_an_update() {
    let harness = TestHarness::setup().await;
    harness.publish_release("v1.0.0", &[PACKAGE_NAME]).await;

    assert!(harness.checker().check_for_update("1.0.0").await.unwrap().is_none());
}

/// A repository without releases answers 404, which means "nothing new".
#[tokio::test]
async fn test_no_release_published() {
    let harness = TestHarness::setup().await;
    Mock::given(method("GET"))
        .and(path(TestHarness::feed_path()))
        .respond_with(ResponseTemplate::new(404))
        .mount(&harness.server)
        .await;

    assert!(harness.checker().check_for_update("1.0.0").await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_error_is_network_error() {
    let harness = TestHarness::setup().await;
    Mock::given(method("GET"))
        .and(path(TestHarness::feed_path()))
        .respond_with(ResponseTemplate::new(503))
        .mount(&harness.server)
        .await;

    let err = harness.checker().check_for_update("1.0.0").await.unwrap_err();
    assert!(matches!(err, Error::Network(ref msg) if msg.contains("503")));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let harness = TestHarness::setup().await;
    Mock::given(method("GET"))
        .and(path(TestHarness::feed_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&harness.server)
        .await;

    let err = harness.checker().check_for_update("1.0.0").await.unwrap_err();
    assert!(matches!(err, Error::FeedDecode(_)));
}

#[tokio::test]
async fn test_release_without_platform_package() {
    let harness = TestHarness::setup().await;
    harness
        .publish_release("v2.0.0", &["arc-scanner-macos.zip", "arc-scanner-windows.zip"])
        .await;

    let err = harness.checker().check_for_update("1.0.0").await.unwrap_err();
    assert!(matches!(err, Error::NoCompatibleAsset { ref platform } if platform == "linux"));
}

#[tokio::test]
async fn test_invalid_tag_is_version_error() {
    let harness = TestHarness::setup().await;
    harness.publish_release("nightly", &[PACKAGE_NAME]).await;

    let err = harness.checker().check_for_update("1.0.0").await.unwrap_err();
    assert!(matches!(err, Error::VersionParse { .. }));
}

/// A feed slower than the request timeout fails instead of hanging.
#[tokio::test]
async fn test_slow_feed_times_out() {
    let harness = TestHarness::setup().await;
    Mock::given(method("GET"))
        .and(path(TestHarness::feed_path()))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_secs(3)))
        .mount(&harness.server)
        .await;

    let checker = VersionChecker::new(
        reqwest::Client::new(),
        &harness.feed_config(),
        Duration::from_millis(200),
        Platform::Linux,
    );
    let err = checker.check_for_update("1.0.0").await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
}

#[tokio::test]
async fn test_unreachable_feed() {
    let feed = FeedConfig {
        api_base: "http://127.0.0.1:9".to_string(),
        ..FeedConfig::default()
    };
    let checker = VersionChecker::new(
        reqwest::Client::new(),
        &feed,
        Duration::from_secs(2),
        Platform::Linux,
    );
    let err = checker.check_for_update("1.0.0").await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
}
