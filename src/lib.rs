//! # arc-updater
//!
//! Self-update engine for the Arc Scanner desktop overlay.
//!
//! The crate checks a GitHub-style release feed for a newer version, streams
//! the package for the running platform to disk, unpacks it with zip-slip
//! protection, and hands the running installation over to a detached
//! replace-and-relaunch script. The host application only talks to
//! [`UpdateController`] and listens for [`UpdateEvent`]s.
//!
//! ## Flow
//!
//! ```text
//! check_for_update ──► VersionChecker ──► UpdateAvailable
//! download_update  ──► Downloader ──► ArchiveExtractor ──► Ready
//! apply_update_and_restart ──► PlatformInstaller ──► exit requested
//! ```
//!
//! The host terminates itself once the exit request is observed; the
//! detached script then replaces the installation and relaunches it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod event;
pub mod upgrade;

pub use config::UpdaterConfig;
pub use error::{Error, Result};
pub use event::{UpdateEvent, UpdateEventsChannel, UpdateEventsSender};
pub use upgrade::{
    installer_for, ArchiveExtractor, Downloader, InstallContext, Platform, PlatformInstaller,
    SessionState, UpdateController, UpdateInfo, VersionChecker,
};

/// Version of the running build.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
