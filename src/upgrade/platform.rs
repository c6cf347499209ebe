//! Target platform detection.

use std::fmt;

/// Archive extension every release package must carry.
pub const ARCHIVE_EXTENSION: &str = ".zip";

/// Operating systems the updater can install on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// macOS, installed as a `.app` bundle.
    MacOs,
    /// Windows, installed as an executable plus sibling files.
    Windows,
    /// Linux, installed as an executable plus sibling files.
    Linux,
}

impl Platform {
    /// Platform of the running build.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    /// Token that identifies this platform's package in an asset name.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
