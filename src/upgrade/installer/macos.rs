//! macOS installer: replaces the whole `.app` bundle.

use super::{cleanup_root, sh_quote, sh_wait_for_exit, InstallContext, PlatformInstaller};
use super::{ReplaceScript, ScriptKind};
use crate::error::{Error, Result};
use crate::upgrade::platform::Platform;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const BUNDLE_EXTENSION: &str = "app";

/// Installer for macOS application bundles.
#[derive(Debug, Clone)]
pub struct MacOsInstaller {
    ctx: InstallContext,
}

impl MacOsInstaller {
    /// Create an installer for the running process.
    #[must_use]
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }

    /// `.app` bundle enclosing the running executable, normally three levels
    /// up from `Contents/MacOS/<exe>`.
    fn current_bundle(&self) -> Result<PathBuf> {
        self.ctx
            .current_exe
            .ancestors()
            .skip(1)
            .find(|dir| has_bundle_extension(dir))
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::InstallRootNotFound(self.ctx.current_exe.clone()))
    }

    fn render(&self, new_bundle: &Path, bundle: &Path, cleanup: &Path) -> String {
        let bundle = sh_quote(bundle);
        format!(
            "#!/bin/bash\n\
             {wait}\
             rm -rf {bundle}\n\
             cp -R {new} {bundle}\n\
             xattr -cr {bundle}\n\
             open {bundle}\n\
             rm -rf {cleanup}\n\
             rm -f -- \"$0\"\n",
            wait = sh_wait_for_exit(&self.ctx),
            new = sh_quote(new_bundle),
            cleanup = sh_quote(cleanup),
        )
    }
}

/// First `.app` directory directly inside `extracted_dir`, by name.
fn find_bundle(extracted_dir: &Path) -> Result<PathBuf> {
    let mut bundles: Vec<PathBuf> = fs::read_dir(extracted_dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && has_bundle_extension(path))
        .collect();
    bundles.sort();

    bundles
        .into_iter()
        .next()
        .ok_or_else(|| Error::BundleNotFound(extracted_dir.to_path_buf()))
}

fn has_bundle_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(BUNDLE_EXTENSION))
}

impl PlatformInstaller for MacOsInstaller {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn prepare(&self, extracted_dir: &Path) -> Result<ReplaceScript> {
        let new_bundle = find_bundle(extracted_dir)?;
        let bundle = self.current_bundle()?;
        debug!(
            "Replacing bundle {} with {}",
            bundle.display(),
            new_bundle.display()
        );

        Ok(ReplaceScript {
            dir: self.ctx.script_dir.clone(),
            kind: ScriptKind::Shell,
            contents: self.render(&new_bundle, &bundle, &cleanup_root(extracted_dir)),
        })
    }
}
