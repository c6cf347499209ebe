//! Command-line interface definition.

use arc_updater::UpdaterConfig;
use clap::Parser;
use std::path::PathBuf;

/// Check for, download and install Arc Scanner updates.
#[derive(Parser, Debug)]
#[command(name = "arc-updater")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Version of the installed build.
    #[arg(long, env = "ARC_CURRENT_VERSION", default_value = arc_updater::VERSION)]
    pub current_version: String,

    /// Base URL of the releases API.
    #[arg(long, env = "ARC_UPDATE_API")]
    pub api_base: Option<String>,

    /// Repository owner on the release feed.
    #[arg(long, env = "ARC_UPDATE_OWNER")]
    pub owner: Option<String>,

    /// Repository name on the release feed.
    #[arg(long, env = "ARC_UPDATE_REPO")]
    pub repo: Option<String>,

    /// Directory for downloaded and extracted packages.
    #[arg(long, env = "ARC_UPDATE_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Only report whether an update is available.
    #[arg(long)]
    pub check_only: bool,

    /// Apply the downloaded update and exit without asking.
    #[arg(long, short)]
    pub yes: bool,

    /// Log level.
    #[arg(long, env = "ARC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Merge CLI arguments over the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn to_config(&self) -> color_eyre::Result<UpdaterConfig> {
        let mut config = if let Some(ref path) = self.config {
            UpdaterConfig::from_file(path)?
        } else {
            UpdaterConfig::default()
        };

        if let Some(ref api_base) = self.api_base {
            config.feed.api_base.clone_from(api_base);
        }
        if let Some(ref owner) = self.owner {
            config.feed.owner.clone_from(owner);
        }
        if let Some(ref repo) = self.repo {
            config.feed.repo.clone_from(repo);
        }
        if let Some(ref work_dir) = self.work_dir {
            config.work_dir.clone_from(work_dir);
        }
        if let Some(ref log_level) = self.log_level {
            config.log_level.clone_from(log_level);
        }

        Ok(config)
    }
}
