//! Windows installer: copies the new build over the install directory with a
//! batch file.

use super::{cleanup_root, find_payload_root, InstallContext, PlatformInstaller};
use super::{ReplaceScript, ScriptKind};
use crate::error::Result;
use crate::upgrade::platform::Platform;
use std::path::Path;
use tracing::debug;

/// Installer for Windows executable-plus-siblings installations.
#[derive(Debug, Clone)]
pub struct WindowsInstaller {
    ctx: InstallContext,
}

impl WindowsInstaller {
    /// Create an installer for the running process.
    #[must_use]
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }

    fn render(&self, payload: &Path, install_dir: &Path, cleanup: &Path) -> String {
        let pid = self.ctx.pid;
        format!(
            "@echo off\r\n\
             setlocal\r\n\
             timeout /t {grace} /nobreak >nul\r\n\
             set /a tries=0\r\n\
             :wait\r\n\
             tasklist /FI \"PID eq {pid}\" 2>nul | find \" {pid} \" >nul\r\n\
             if not errorlevel 1 (\r\n\
             \x20   if %tries% geq {polls} goto replace\r\n\
             \x20   set /a tries+=1\r\n\
             \x20   timeout /t 1 /nobreak >nul\r\n\
             \x20   goto wait\r\n\
             )\r\n\
             :replace\r\n\
             xcopy /E /Y /Q /I {source} {target}\r\n\
             start \"\" {exe}\r\n\
             rmdir /S /Q {cleanup}\r\n\
             del \"%~f0\"\r\n",
            grace = self.ctx.grace_period.as_secs(),
            polls = self.ctx.exit_wait.as_secs(),
            source = bat_quote(&format!("{}\\*", payload.display())),
            target = bat_quote(&install_dir.display().to_string()),
            exe = bat_quote(&self.ctx.current_exe.display().to_string()),
            cleanup = bat_quote(&cleanup.display().to_string()),
        )
    }
}

/// Double-quote a path for cmd.exe; `%` would otherwise expand.
fn bat_quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('%', "%%"))
}

impl PlatformInstaller for WindowsInstaller {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn prepare(&self, extracted_dir: &Path) -> Result<ReplaceScript> {
        let payload = find_payload_root(extracted_dir, self.ctx.exe_name()?)?;
        let install_dir = self.ctx.exe_dir()?;
        debug!(
            "Replacing {} with {}",
            install_dir.display(),
            payload.display()
        );

        Ok(ReplaceScript {
            dir: self.ctx.script_dir.clone(),
            kind: ScriptKind::Batch,
            contents: self.render(&payload, install_dir, &cleanup_root(extracted_dir)),
        })
    }
}
