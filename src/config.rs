//! Configuration for arc-updater.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Updater configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Release feed location and client identity.
    #[serde(default)]
    pub feed: FeedConfig,

    /// HTTP client timeouts.
    #[serde(default)]
    pub http: HttpConfig,

    /// Deferred replace script settings.
    #[serde(default)]
    pub install: InstallConfig,

    /// Directory that holds per-session download and extraction trees.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Release feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the releases API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Repository owner.
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Repository name.
    #[serde(default = "default_repo")]
    pub repo: String,

    /// `User-Agent` sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// HTTP client timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Total timeout of the release feed request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum silence between two body chunks of a download, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// Deferred replace script configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Fixed wait before the script starts polling for process exit, in seconds.
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// Upper bound on how long the script waits for the old process to exit,
    /// in seconds.
    #[serde(default = "default_exit_wait")]
    pub exit_wait_secs: u64,

    /// Where the script is written. Defaults to the system temp directory.
    #[serde(default)]
    pub script_dir: Option<PathBuf>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            http: HttpConfig::default(),
            install: InstallConfig::default(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            owner: default_owner(),
            repo: default_repo(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
            exit_wait_secs: default_exit_wait(),
            script_dir: None,
        }
    }
}

fn default_work_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "arc-scanner")
        .map(|dirs| dirs.cache_dir().join("updates"))
        .unwrap_or_else(|| std::env::temp_dir().join("arc-scanner-updates"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_owner() -> String {
    "arc-scanner".to_string()
}

fn default_repo() -> String {
    "arc-scanner".to_string()
}

fn default_user_agent() -> String {
    "arc-scanner-updater".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_connect_timeout() -> u64 {
    10
}

const fn default_idle_timeout() -> u64 {
    60
}

const fn default_grace_period() -> u64 {
    2
}

const fn default_exit_wait() -> u64 {
    30
}

impl FeedConfig {
    /// URL of the latest-release endpoint.
    #[must_use]
    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

impl HttpConfig {
    /// Feed request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Download idle timeout.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Build the HTTP client shared by the checker and the downloader.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn build_client(&self, user_agent: &str) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))
    }
}

impl InstallConfig {
    /// Fixed wait before the script touches the installation.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Upper bound on waiting for the old process.
    #[must_use]
    pub const fn exit_wait(&self) -> Duration {
        Duration::from_secs(self.exit_wait_secs)
    }

    /// Resolved script directory.
    #[must_use]
    pub fn script_dir(&self) -> PathBuf {
        self.script_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl UpdaterConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
