//! Error types for arc-updater.

use std::path::PathBuf;

/// Errors produced by the self-update subsystem.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The release feed or package server could not be reached, or answered
    /// with an unexpected status.
    #[error("network error: {0}")]
    Network(String),

    /// The release feed answered with a body that is not a release descriptor.
    #[error("malformed release feed response: {0}")]
    FeedDecode(String),

    /// A version string is not valid semantic-version syntax.
    #[error("invalid version '{version}': {source}")]
    VersionParse {
        /// The offending version string (after `v` stripping).
        version: String,
        /// Underlying parse error.
        #[source]
        source: semver::Error,
    },

    /// The release carries no package for the running platform.
    #[error("no compatible asset found for {platform}")]
    NoCompatibleAsset {
        /// Platform key that was searched for.
        platform: String,
    },

    /// The package server answered the download request with a non-success status.
    #[error("download failed with status {0}")]
    DownloadFailed(u16),

    /// The download was cancelled through its cancellation token.
    #[error("download cancelled")]
    Cancelled,

    /// An archive entry would be written outside the destination directory.
    #[error("archive entry escapes the destination directory: {entry}")]
    PathTraversal {
        /// Name of the rejected entry as stored in the archive.
        entry: String,
    },

    /// Filesystem or stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The extracted package does not contain the expected build.
    #[error("no installable build found in {}", .0.display())]
    BundleNotFound(PathBuf),

    /// The running executable is not inside a recognizable installation.
    #[error("cannot determine installation root from {}", .0.display())]
    InstallRootNotFound(PathBuf),

    /// The deferred replace script could not be written.
    #[error("failed to write update script {}: {source}", .path.display())]
    ScriptWrite {
        /// Script location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The deferred replace script could not be started.
    #[error("failed to start update script {}: {source}", .path.display())]
    ScriptLaunch {
        /// Script location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The requested operation is not allowed in the current session state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// Session state at the time of the call.
        state: String,
    },

    /// Apply was requested but no package has been downloaded.
    #[error("no update downloaded")]
    NoUpdateDownloaded,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for arc-updater operations.
pub type Result<T> = std::result::Result<T, Error>;
