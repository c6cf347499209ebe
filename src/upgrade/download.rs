//! Streaming package download with progress reporting.

use crate::error::{Error, Result};
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Streams a package from the package server to local storage.
pub struct Downloader {
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Maximum silence before the response head and between body chunks.
    idle_timeout: Duration,
}

impl Downloader {
    /// Create a downloader on top of the shared client.
    #[must_use]
    pub fn new(client: reqwest::Client, idle_timeout: Duration) -> Self {
        Self {
            client,
            idle_timeout,
        }
    }

    /// Download `url` into `destination`.
    ///
    /// When the server declares a content length, `on_progress` is called after
    /// every chunk with the completed percentage; the sequence never decreases
    /// and reaches 100 only once the last byte is written. Without a declared
    /// length `on_progress` is never called.
    ///
    /// A failed or cancelled download may leave a partial file behind; the
    /// caller owns cleanup of `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DownloadFailed`] on a non-success status,
    /// [`Error::Cancelled`] when `cancel` fires, [`Error::Network`] when the
    /// transfer breaks or stalls, and [`Error::Io`] on write failure or a body
    /// shorter than declared.
    pub async fn download<F>(
        &self,
        url: &str,
        destination: &Path,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        F: Fn(u8) + Send + Sync,
    {
        info!("Downloading update from {url}");

        let request = tokio::time::timeout(self.idle_timeout, self.client.get(url).send());
        let mut response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = request => match result {
                Ok(sent) => sent
                    .map_err(|e| Error::Network(format!("failed to download update: {e}")))?,
                Err(_) => return Err(self.stalled()),
            },
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DownloadFailed(status.as_u16()));
        }

        let total = response.content_length().filter(|len| *len > 0);
        debug!("Package size: {:?} bytes", total);

        let mut file = File::create(destination).await?;
        let mut written: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Download cancelled after {written} bytes");
                    return Err(Error::Cancelled);
                }
                next = tokio::time::timeout(self.idle_timeout, response.chunk()) => next,
            };

            let chunk = match next {
                Ok(Ok(Some(chunk))) => chunk,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    return Err(match total {
                        Some(total) if written < total => truncated(written, total, &e),
                        _ => Error::Network(format!("failed to read response: {e}")),
                    });
                }
                Err(_) => return Err(self.stalled()),
            };

            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if let Some(total) = total {
                on_progress(percent(written, total));
            }
        }

        file.flush().await?;

        if let Some(total) = total {
            if written < total {
                return Err(truncated(written, total, "connection closed"));
            }
        }

        info!("Downloaded {} bytes to {}", written, destination.display());
        Ok(())
    }

    fn stalled(&self) -> Error {
        Error::Network(format!(
            "package server silent for {}ms",
            self.idle_timeout.as_millis()
        ))
    }
}

/// A body that ended before its declared length.
fn truncated(written: u64, total: u64, cause: impl std::fmt::Display) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("download truncated at {written} of {total} bytes: {cause}"),
    ))
}

/// `floor(done / total * 100)`, capped at 100.
fn percent(done: u64, total: u64) -> u8 {
    let pct = u128::from(done) * 100 / u128::from(total);
    u8::try_from(pct.min(100)).unwrap_or(100)
}
