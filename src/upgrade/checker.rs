//! Release feed checker.

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::upgrade::platform::{Platform, ARCHIVE_EXTENSION};
use crate::upgrade::{AssetDescriptor, ReleaseDescriptor, UpdateInfo};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use semver::Version;
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, info};

/// Media type requested from the release feed.
pub const FEED_ACCEPT: &str = "application/vnd.github.v3+json";

/// Queries the release feed and decides whether a newer release exists.
pub struct VersionChecker {
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Latest-release endpoint.
    feed_url: String,
    /// `User-Agent` identifying this client.
    user_agent: String,
    /// Bound on the whole feed request.
    timeout: Duration,
    /// Platform whose package is selected.
    platform: Platform,
}

impl VersionChecker {
    /// Create a checker for the given feed.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        feed: &FeedConfig,
        timeout: Duration,
        platform: Platform,
    ) -> Self {
        Self {
            client,
            feed_url: feed.latest_release_url(),
            user_agent: feed.user_agent.clone(),
            timeout,
            platform,
        }
    }

    /// Platform this checker selects packages for.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Check the feed for a release newer than `current_version`.
    ///
    /// Returns `Ok(None)` when no release is published or the running version
    /// is already the latest (or ahead of it).
    ///
    /// # Errors
    ///
    /// Returns an error if the feed is unreachable, answers with a status other
    /// than 200/404, returns a malformed body, either version is not valid
    /// semver, or the release has no package for this platform.
    pub async fn check_for_update(&self, current_version: &str) -> Result<Option<UpdateInfo>> {
        debug!("Checking for updates from {}", self.feed_url);

        let response = self
            .client
            .get(&self.feed_url)
            .header(ACCEPT, FEED_ACCEPT)
            .header(USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Network(format!("failed to fetch release: {e}")))?;

        let status = response.status();
        debug!("Release feed answered {}", status);

        if status == StatusCode::NOT_FOUND {
            info!("No releases published yet");
            return Ok(None);
        }
        if status != StatusCode::OK {
            return Err(Error::Network(format!(
                "unexpected status code: {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read release: {e}")))?;
        let release: ReleaseDescriptor =
            serde_json::from_slice(&body).map_err(|e| Error::FeedDecode(e.to_string()))?;

        evaluate_release(&release, current_version, self.platform)
    }
}

/// Parse a version string, accepting an optional leading `v`.
///
/// # Errors
///
/// Returns [`Error::VersionParse`] if the remainder is not valid semver.
pub fn parse_version(raw: &str) -> Result<Version> {
    let stripped = raw.strip_prefix('v').unwrap_or(raw);
    Version::parse(stripped).map_err(|source| Error::VersionParse {
        version: stripped.to_string(),
        source,
    })
}

/// Semantic-version precedence. Build metadata does not participate.
fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// Decide whether `release` is an update over `current_version` for `platform`.
///
/// # Errors
///
/// Returns an error if either version is invalid or no asset matches.
pub fn evaluate_release(
    release: &ReleaseDescriptor,
    current_version: &str,
    platform: Platform,
) -> Result<Option<UpdateInfo>> {
    let latest = parse_version(&release.tag_name)?;
    let current = parse_version(current_version)?;

    if precedence(&current, &latest) != Ordering::Less {
        debug!("Already on latest version ({current} >= {latest})");
        return Ok(None);
    }

    let asset = select_asset(&release.assets, platform).ok_or_else(|| {
        Error::NoCompatibleAsset {
            platform: platform.key().to_string(),
        }
    })?;

    info!("Update available: {} -> {} ({})", current, latest, asset.name);

    Ok(Some(UpdateInfo {
        version: latest,
        release_url: release.html_url.clone(),
        download_url: asset.browser_download_url.clone(),
        release_notes: release.body.clone().unwrap_or_default(),
        published_at: release.published_at,
    }))
}

/// First asset whose lower-cased name contains the platform key and ends
/// with the archive extension.
#[must_use]
pub fn select_asset(assets: &[AssetDescriptor], platform: Platform) -> Option<&AssetDescriptor> {
    assets.iter().find(|asset| {
        let name = asset.name.to_lowercase();
        name.contains(platform.key()) && name.ends_with(ARCHIVE_EXTENSION)
    })
}
