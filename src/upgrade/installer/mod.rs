//! Platform-specific installation of an extracted update.
//!
//! A running executable cannot safely overwrite its own image, so applying an
//! update is split in two phases:
//!
//! 1. The installer locates the new build, renders a deferred replace script
//!    and launches it as a detached process.
//! 2. The host exits. The script waits for that exit, copies the new build
//!    over the installation, relaunches it and removes itself together with
//!    the session working directory.
//!
//! Installers never terminate the current process.

mod linux;
mod macos;
mod windows;

pub use linux::LinuxInstaller;
pub use macos::MacOsInstaller;
pub use windows::WindowsInstaller;

use crate::config::InstallConfig;
use crate::error::{Error, Result};
use crate::upgrade::controller::SESSION_DIR_PREFIX;
use crate::upgrade::platform::Platform;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

/// Facts about the running process an installer needs.
#[derive(Debug, Clone)]
pub struct InstallContext {
    /// Path of the running executable.
    pub current_exe: PathBuf,
    /// PID the replace script waits on.
    pub pid: u32,
    /// Directory the replace script is written to.
    pub script_dir: PathBuf,
    /// Fixed wait before polling for exit.
    pub grace_period: Duration,
    /// Upper bound on polling for exit.
    pub exit_wait: Duration,
}

impl InstallContext {
    /// Context for the running process.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable path cannot be determined.
    pub fn from_running_process(install: &InstallConfig) -> Result<Self> {
        Ok(Self {
            current_exe: std::env::current_exe()?,
            pid: std::process::id(),
            script_dir: install.script_dir(),
            grace_period: install.grace_period(),
            exit_wait: install.exit_wait(),
        })
    }

    /// Name of the running executable.
    fn exe_name(&self) -> Result<&std::ffi::OsStr> {
        self.current_exe
            .file_name()
            .ok_or_else(|| Error::InstallRootNotFound(self.current_exe.clone()))
    }

    /// Directory holding the running executable.
    fn exe_dir(&self) -> Result<&Path> {
        self.current_exe
            .parent()
            .ok_or_else(|| Error::InstallRootNotFound(self.current_exe.clone()))
    }
}

/// Interpreter family of a replace script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// POSIX shell script.
    Shell,
    /// Windows batch file.
    Batch,
}

/// Prefix of written replace scripts.
pub const SCRIPT_PREFIX: &str = "arc-scanner-replace-";

impl ScriptKind {
    /// File extension the interpreter expects.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Shell => ".sh",
            Self::Batch => ".bat",
        }
    }
}

/// A rendered deferred replace procedure.
#[derive(Debug, Clone)]
pub struct ReplaceScript {
    /// Directory the script is written to.
    pub dir: PathBuf,
    /// Interpreter family.
    pub kind: ScriptKind,
    /// Script body.
    pub contents: String,
}

impl ReplaceScript {
    /// Write the script under a fresh, unpredictable name in [`Self::dir`],
    /// executable where that applies. The file is created exclusively, so a
    /// pre-existing path or symlink is never followed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptWrite`] on any I/O failure.
    pub fn write(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(write_err(&self.dir))?;
        let mut file = tempfile::Builder::new()
            .prefix(SCRIPT_PREFIX)
            .suffix(self.kind.extension())
            .tempfile_in(&self.dir)
            .map_err(write_err(&self.dir))?;

        let written = file
            .write_all(self.contents.as_bytes())
            .and_then(|()| file.flush());
        written.map_err(write_err(file.path()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(file.path(), fs::Permissions::from_mode(0o755))
                .map_err(write_err(file.path()))?;
        }

        let (_, path) = file
            .keep()
            .map_err(|e| Error::ScriptWrite {
                path: e.file.path().to_path_buf(),
                source: e.error,
            })?;

        debug!("Update script written to {}", path.display());
        Ok(path)
    }

    /// Start the script at `path` as a detached background process and
    /// return at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptLaunch`] if the interpreter cannot be spawned.
    pub fn launch(&self, path: &Path) -> Result<()> {
        let mut command = match self.kind {
            ScriptKind::Shell => {
                let mut cmd = Command::new("/bin/sh");
                cmd.arg(path);
                cmd
            }
            ScriptKind::Batch => {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C").arg(path);
                cmd
            }
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut command);

        let child = command.spawn().map_err(|source| Error::ScriptLaunch {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            "Update script {} started as pid {}",
            path.display(),
            child.id()
        );
        Ok(())
    }
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> Error {
    let path = path.to_path_buf();
    move |source| Error::ScriptWrite { path, source }
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    // Own process group: terminal signals aimed at the host do not reach it.
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut Command) {}

/// Applies an extracted update on one operating system.
pub trait PlatformInstaller: Send + Sync {
    /// Platform this installer targets.
    fn platform(&self) -> Platform;

    /// Locate the new build in `extracted_dir` and render the replace script.
    /// Touches nothing on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BundleNotFound`] if the build is missing and
    /// [`Error::InstallRootNotFound`] if the running installation cannot be
    /// identified.
    fn prepare(&self, extracted_dir: &Path) -> Result<ReplaceScript>;

    /// Prepare, write and launch the replace script.
    ///
    /// # Errors
    ///
    /// Propagates [`PlatformInstaller::prepare`] errors, plus
    /// [`Error::ScriptWrite`] and [`Error::ScriptLaunch`].
    fn apply_update(&self, extracted_dir: &Path) -> Result<()> {
        let script = self.prepare(extracted_dir)?;
        let path = script.write()?;
        script.launch(&path)?;
        info!("Deferred {} update launched", self.platform());
        Ok(())
    }
}

/// Installer for `platform`, selected once at startup.
#[must_use]
pub fn installer_for(platform: Platform, ctx: InstallContext) -> Box<dyn PlatformInstaller> {
    match platform {
        Platform::MacOs => Box::new(MacOsInstaller::new(ctx)),
        Platform::Windows => Box::new(WindowsInstaller::new(ctx)),
        Platform::Linux => Box::new(LinuxInstaller::new(ctx)),
    }
}

/// Directory the script removes once done: the whole session directory when
/// `extracted_dir` sits inside one, otherwise just `extracted_dir`.
fn cleanup_root(extracted_dir: &Path) -> PathBuf {
    extracted_dir
        .parent()
        .filter(|parent| {
            parent
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(SESSION_DIR_PREFIX))
        })
        .unwrap_or(extracted_dir)
        .to_path_buf()
}

/// Directory inside `extracted_dir` that holds `exe_name`: either
/// `extracted_dir` itself or one level below it.
fn find_payload_root(extracted_dir: &Path, exe_name: &std::ffi::OsStr) -> Result<PathBuf> {
    if extracted_dir.join(exe_name).is_file() {
        return Ok(extracted_dir.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = fs::read_dir(extracted_dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join(exe_name).is_file())
        .collect();
    candidates.sort();

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::BundleNotFound(extracted_dir.to_path_buf()))
}

/// Single-quote a path for a POSIX shell.
fn sh_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Shell prologue: fixed grace period, then poll until `pid` is gone or
/// `exit_wait` elapses.
fn sh_wait_for_exit(ctx: &InstallContext) -> String {
    format!(
        "sleep {grace}\n\
         i=0\n\
         while kill -0 {pid} 2>/dev/null && [ \"$i\" -lt {polls} ]; do\n\
         \x20   sleep 1\n\
         \x20   i=$((i + 1))\n\
         done\n",
        grace = ctx.grace_period.as_secs(),
        pid = ctx.pid,
        polls = ctx.exit_wait.as_secs(),
    )
}
