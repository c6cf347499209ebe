//! Test harness for the update flow.
//!
//! The `TestHarness` owns a mock release feed, a mock package server and a
//! scratch work directory, and builds controllers wired to them.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use arc_updater::config::FeedConfig;
use arc_updater::upgrade::ReplaceScript;
use arc_updater::{
    ArchiveExtractor, Downloader, Error, Platform, PlatformInstaller, Result, UpdateController,
    VersionChecker,
};
use parking_lot::Mutex;
use serde_json::json;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Package name for the platform the harness checks for.
pub const PACKAGE_NAME: &str = "arc-scanner-linux.zip";

const OWNER: &str = "arc-scanner";
const REPO: &str = "arc-scanner";

/// Mock feed plus package server plus scratch work directory.
pub struct TestHarness {
    /// Serves both the feed and the packages.
    pub server: MockServer,
    /// Parent of per-session working directories.
    pub work_root: TempDir,
}

impl TestHarness {
    /// Start a fresh mock server.
    pub async fn setup() -> Self {
        Self {
            server: MockServer::start().await,
            work_root: TempDir::new().unwrap(),
        }
    }

    /// Feed configuration pointing at the mock server.
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            api_base: self.server.uri(),
            owner: OWNER.to_string(),
            repo: REPO.to_string(),
            ..FeedConfig::default()
        }
    }

    /// Path of the latest-release endpoint.
    pub fn feed_path() -> String {
        format!("/repos/{OWNER}/{REPO}/releases/latest")
    }

    /// Download URL of a package served by [`Self::serve_package`].
    pub fn package_url(&self, name: &str) -> String {
        format!("{}/downloads/{name}", self.server.uri())
    }

    /// Publish `tag` with one asset per entry of `assets`.
    pub async fn publish_release(&self, tag: &str, assets: &[&str]) {
        let assets: Vec<_> = assets
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "browser_download_url": self.package_url(name),
                    "size": 0,
                })
            })
            .collect();

        Mock::given(method("GET"))
            .and(path(Self::feed_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag_name": tag,
                "html_url": format!("https://github.com/{OWNER}/{REPO}/releases/tag/{tag}"),
                "body": "Faster scans",
                "published_at": "2024-06-02T08:30:00Z",
                "assets": assets,
            })))
            .mount(&self.server)
            .await;
    }

    /// Serve `bytes` as package `name`.
    pub async fn serve_package(&self, name: &str, bytes: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(format!("/downloads/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .mount(&self.server)
            .await;
    }

    /// Checker targeting the mock feed.
    pub fn checker(&self) -> VersionChecker {
        VersionChecker::new(
            reqwest::Client::new(),
            &self.feed_config(),
            Duration::from_secs(5),
            Platform::Linux,
        )
    }

    /// Controller running `current_version` with `installer`.
    pub fn controller(&self, current_version: &str, installer: FakeInstaller) -> UpdateController {
        UpdateController::new(
            self.checker(),
            Downloader::new(reqwest::Client::new(), Duration::from_secs(5)),
            ArchiveExtractor::new(),
            Box::new(installer),
            current_version,
            self.work_root.path().to_path_buf(),
        )
    }

    /// Number of entries directly under the work root.
    pub fn work_root_entries(&self) -> usize {
        std::fs::read_dir(self.work_root.path()).unwrap().count()
    }
}

/// Serve `response` verbatim to the first connection on a fresh local port
/// and return the URL to fetch. Covers responses `wiremock` cannot produce,
/// such as a body without `Content-Length` or one shorter than declared.
pub async fn serve_raw(response: &'static [u8]) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            head.extend_from_slice(&buf[..n]);
        }
        socket.write_all(response).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{addr}/downloads/{PACKAGE_NAME}")
}

/// Build a zip archive in memory. Names ending in `/` become directories.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Installer that records calls instead of launching a script.
#[derive(Clone, Default)]
pub struct FakeInstaller {
    /// Extracted directories passed to `apply_update`.
    pub calls: Arc<Mutex<Vec<PathBuf>>>,
    /// Fail every apply with a launch error.
    pub fail: bool,
}

impl FakeInstaller {
    /// Installer whose launch always fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl PlatformInstaller for FakeInstaller {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn prepare(&self, extracted_dir: &Path) -> Result<ReplaceScript> {
        Err(Error::BundleNotFound(extracted_dir.to_path_buf()))
    }

    fn apply_update(&self, extracted_dir: &Path) -> Result<()> {
        self.calls.lock().push(extracted_dir.to_path_buf());
        if self.fail {
            return Err(Error::ScriptLaunch {
                path: extracted_dir.join("update.sh"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            });
        }
        Ok(())
    }
}
