//! Zip extraction with path-traversal protection.
//!
//! Every entry name is validated before anything is written, so an archive
//! carrying a single escaping entry leaves the destination untouched.

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// Unpacks downloaded update archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveExtractor;

/// One validated archive entry.
struct PlannedEntry {
    index: usize,
    target: PathBuf,
    is_dir: bool,
    mode: Option<u32>,
}

impl ArchiveExtractor {
    /// Create an extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extract `archive_path` into `dest_dir`, creating it if needed.
    ///
    /// Extraction is not transactional: an I/O failure midway leaves the files
    /// written so far in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathTraversal`] if any entry resolves outside
    /// `dest_dir`, and [`Error::Io`] on read or write failure.
    pub fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        info!(
            "Extracting {} to {}",
            archive_path.display(),
            dest_dir.display()
        );

        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file).map_err(zip_error)?;

        let mut plan = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index(index).map_err(zip_error)?;
            let relative = sanitize_entry_name(entry.name())?;
            plan.push(PlannedEntry {
                index,
                target: dest_dir.join(relative),
                is_dir: entry.is_dir(),
                mode: entry.unix_mode(),
            });
        }

        fs::create_dir_all(dest_dir)?;

        for entry in plan.iter().filter(|e| e.is_dir) {
            fs::create_dir_all(&entry.target)?;
        }

        let mut files = 0usize;
        for entry in plan.iter().filter(|e| !e.is_dir) {
            if let Some(parent) = entry.target.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut reader = archive.by_index(entry.index).map_err(zip_error)?;
            let mut out = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&entry.target)?;
            io::copy(&mut reader, &mut out)?;
            drop(out);

            apply_mode(&entry.target, entry.mode, false)?;
            files += 1;
        }

        // Directory modes last so read-only directories can still be filled.
        for entry in plan.iter().filter(|e| e.is_dir) {
            apply_mode(&entry.target, entry.mode, true)?;
        }

        debug!("Extracted {} files, {} entries", files, plan.len());
        Ok(())
    }
}

/// Turn an archive entry name into a relative path with only normal
/// components. Both `/` and `\` count as separators.
fn sanitize_entry_name(name: &str) -> Result<PathBuf> {
    let reject = || Error::PathTraversal {
        entry: name.to_string(),
    };

    if name.starts_with('/') || name.starts_with('\\') {
        return Err(reject());
    }

    let mut relative = PathBuf::new();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => return Err(reject()),
            // Drive letters and alternate data streams.
            p if p.contains(':') => return Err(reject()),
            p => relative.push(p),
        }
    }

    // An entry that resolves to the destination itself is not inside it.
    if relative.as_os_str().is_empty() {
        return Err(reject());
    }
    Ok(relative)
}

/// Permission bits to give an extracted entry: setuid, setgid and sticky are
/// dropped, and directories stay writable and searchable by the owner so the
/// session directory can always be removed.
const fn extracted_mode(mode: u32, is_dir: bool) -> u32 {
    let mode = mode & 0o777;
    if is_dir {
        mode | 0o700
    } else {
        mode
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>, is_dir: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        let mode = extracted_mode(mode, is_dir);
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>, _is_dir: bool) -> Result<()> {
    Ok(())
}

fn zip_error(e: zip::result::ZipError) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, e))
}
