//! Self-update subsystem.
//!
//! This module handles:
//! - Polling the release feed for a newer version
//! - Streaming the platform package to disk
//! - Unpacking it with path-traversal protection
//! - Handing the running installation over to a detached replace script

mod checker;
mod controller;
mod download;
mod extract;
mod installer;
mod platform;

pub use checker::{select_asset, VersionChecker, FEED_ACCEPT};
pub use controller::{SessionState, UpdateController, SESSION_DIR_PREFIX};
pub use download::Downloader;
pub use extract::ArchiveExtractor;
pub use installer::{
    installer_for, InstallContext, LinuxInstaller, MacOsInstaller, PlatformInstaller,
    ReplaceScript, ScriptKind, WindowsInstaller,
};
pub use platform::Platform;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Latest release as published on the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseDescriptor {
    /// Release tag, usually `vMAJOR.MINOR.PATCH`.
    pub tag_name: String,
    /// Human-readable release page.
    pub html_url: String,
    /// Release notes.
    #[serde(default)]
    pub body: Option<String>,
    /// Publication time.
    pub published_at: DateTime<Utc>,
    /// Downloadable packages, in feed order.
    #[serde(default)]
    pub assets: Vec<AssetDescriptor>,
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetDescriptor {
    /// File name.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
    /// Size in bytes.
    pub size: u64,
}

/// Information about an available update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    /// The new version.
    pub version: Version,
    /// Release page URL.
    #[serde(rename = "url")]
    pub release_url: String,
    /// Package URL for the running platform.
    pub download_url: String,
    /// Release notes.
    pub release_notes: String,
    /// Publication time.
    pub published_at: DateTime<Utc>,
}
