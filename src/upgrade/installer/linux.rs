//! Linux installer: copies the new build over the install directory with a
//! POSIX shell script.

use super::{cleanup_root, find_payload_root, sh_quote, sh_wait_for_exit};
use super::{InstallContext, PlatformInstaller, ReplaceScript, ScriptKind};
use crate::error::Result;
use crate::upgrade::platform::Platform;
use std::path::Path;
use tracing::debug;

/// Installer for Linux executable-plus-siblings installations.
#[derive(Debug, Clone)]
pub struct LinuxInstaller {
    ctx: InstallContext,
}

impl LinuxInstaller {
    /// Create an installer for the running process.
    #[must_use]
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }

    fn render(&self, payload: &Path, install_dir: &Path, cleanup: &Path) -> String {
        let exe = sh_quote(&self.ctx.current_exe);
        format!(
            "#!/bin/sh\n\
             {wait}\
             cp -R {source} {target}\n\
             chmod +x {exe}\n\
             nohup {exe} >/dev/null 2>&1 &\n\
             rm -rf {cleanup}\n\
             rm -f -- \"$0\"\n",
            wait = sh_wait_for_exit(&self.ctx),
            source = sh_quote(&payload.join(".")),
            target = sh_quote(install_dir),
            cleanup = sh_quote(cleanup),
        )
    }
}

impl PlatformInstaller for LinuxInstaller {
    fn platform(&self) -> Platform {
        Platform::Linux
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
            kind: ScriptKind::Shell,
            contents: self.render(&payload, install_dir, &cleanup_root(extracted_dir)),
        })
    }
}
