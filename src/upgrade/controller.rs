//! Update session state machine.
//!
//! The controller owns the single update session of the process and drives
//! the checker, downloader, extractor and installer through it:
//!
//! ```text
//! Idle → Checking → NoUpdateFound → Idle
//!                 → UpdateAvailable → Downloading → Ready → Applying → Applied
//! ```
//!
//! Failures while checking or downloading pass through `Failed` back to
//! `Idle`; a failed apply returns to `Ready`. Each failure is reported as an
//! `update-error` event. `NoUpdateFound` and `Failed` are passed through in a
//! single locked step, so [`UpdateController::state`] never reports them.
//!
//! A check or download future dropped before it settles returns the session
//! to `Idle` and removes its working directory.

use crate::config::UpdaterConfig;
use crate::error::{Error, Result};
use crate::event::{create_event_channel, UpdateEvent, UpdateEventsChannel, UpdateEventsSender};
use crate::upgrade::installer::{installer_for, InstallContext, PlatformInstaller};
use crate::upgrade::{ArchiveExtractor, Downloader, Platform, UpdateInfo, VersionChecker};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Prefix of per-session working directories.
pub const SESSION_DIR_PREFIX: &str = "arc-scanner-update-";

const ARCHIVE_NAME: &str = "update.zip";
const EXTRACTED_DIR_NAME: &str = "extracted";

/// Phase of the update session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing in progress.
    Idle,
    /// Querying the release feed.
    Checking,
    /// The feed has nothing newer.
    NoUpdateFound,
    /// A newer release was found and not yet downloaded.
    UpdateAvailable,
    /// Package download or extraction in progress.
    Downloading,
    /// Package extracted and ready to apply.
    Ready,
    /// Replace script being launched.
    Applying,
    /// Replace script running; the host should exit.
    Applied,
    /// An operation failed.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::NoUpdateFound => "no update found",
            Self::UpdateAvailable => "update available",
            Self::Downloading => "downloading",
            Self::Ready => "ready",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Mutable session data. Never locked across an await point.
#[derive(Debug)]
struct UpdateSession {
    state: SessionState,
    info: Option<UpdateInfo>,
    /// Session working directory holding the archive and the extracted tree.
    work_dir: Option<PathBuf>,
    extracted: Option<PathBuf>,
}

impl UpdateSession {
    const fn new() -> Self {
        Self {
            state: SessionState::Idle,
            info: None,
            work_dir: None,
            extracted: None,
        }
    }

    fn reject(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    /// Back to `Idle`, handing out the working directory for removal.
    fn reset(&mut self) -> Option<PathBuf> {
        self.state = SessionState::Idle;
        self.info = None;
        self.extracted = None;
        self.work_dir.take()
    }
}

/// Resets an abandoned operation when dropped while still armed.
struct InFlight<'a> {
    session: &'a Mutex<UpdateSession>,
    operation: &'static str,
    work_dir: Option<PathBuf>,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(session: &'a Mutex<UpdateSession>, operation: &'static str) -> Self {
        Self {
            session,
            operation,
            work_dir: None,
            armed: true,
        }
    }

    fn with_work_dir(mut self, work_dir: PathBuf) -> Self {
        self.work_dir = Some(work_dir);
        self
    }

    /// The operation settled the session itself.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Update {} abandoned before completion", self.operation);
        let stale = self.session.lock().reset();

        // No runtime to await on here.
        for dir in self.work_dir.iter().chain(stale.iter()) {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => debug!("Removed {}", dir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {e}", dir.display()),
            }
        }
    }
}

/// Orchestrates one update session for the host application.
pub struct UpdateController {
    checker: VersionChecker,
    downloader: Downloader,
    extractor: ArchiveExtractor,
    installer: Box<dyn PlatformInstaller>,
    /// Version of the running build.
    current_version: String,
    /// Parent of per-session working directories.
    work_root: PathBuf,
    session: Mutex<UpdateSession>,
    events_tx: UpdateEventsSender,
    exit_tx: watch::Sender<bool>,
    exit_rx: watch::Receiver<bool>,
}

impl UpdateController {
    /// Assemble a controller from its components.
    #[must_use]
    pub fn new(
        checker: VersionChecker,
        downloader: Downloader,
        extractor: ArchiveExtractor,
        installer: Box<dyn PlatformInstaller>,
        current_version: impl Into<String>,
        work_root: PathBuf,
    ) -> Self {
        let (events_tx, _) = create_event_channel();
        let (exit_tx, exit_rx) = watch::channel(false);

        Self {
            checker,
            downloader,
            extractor,
            installer,
            current_version: current_version.into(),
            work_root,
            session: Mutex::new(UpdateSession::new()),
            events_tx,
            exit_tx,
            exit_rx,
        }
    }

    /// Build a controller for the running process from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the running
    /// executable cannot be located.
    pub fn from_config(config: &UpdaterConfig, current_version: impl Into<String>) -> Result<Self> {
        let platform = Platform::current();
        let client = config.http.build_client(&config.feed.user_agent)?;

        let checker = VersionChecker::new(
            client.clone(),
            &config.feed,
            config.http.request_timeout(),
            platform,
        );
        let downloader = Downloader::new(client, config.http.idle_timeout());
        let installer = installer_for(
            platform,
            InstallContext::from_running_process(&config.install)?,
        );

        info!("Update controller ready for {platform}");
        Ok(Self::new(
            checker,
            downloader,
            ArchiveExtractor::new(),
            installer,
            current_version,
            config.work_dir.clone(),
        ))
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.lock().state
    }

    /// The update found by the last successful check, if still active.
    #[must_use]
    pub fn update_info(&self) -> Option<UpdateInfo> {
        self.session.lock().info.clone()
    }

    /// Location of the extracted package once the session is `Ready`.
    #[must_use]
    pub fn extracted_path(&self) -> Option<PathBuf> {
        self.session.lock().extracted.clone()
    }

    /// Version of the running build.
    #[must_use]
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Subscribe to update events.
    #[must_use]
    pub fn subscribe_events(&self) -> UpdateEventsChannel {
        self.events_tx.subscribe()
    }

    /// Receiver that flips to `true` once the host should terminate.
    #[must_use]
    pub fn exit_requested(&self) -> watch::Receiver<bool> {
        self.exit_rx.clone()
    }

    /// Query the release feed. Allowed only while `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside `Idle`, otherwise any error of
    /// [`VersionChecker::check_for_update`].
    pub async fn check_for_update(&self) -> Result<Option<UpdateInfo>> {
        {
            let mut session = self.session.lock();
            if session.state != SessionState::Idle {
                return Err(session.reject("check for updates"));
            }
            session.state = SessionState::Checking;
            session.info = None;
        }
        debug!("Session state: checking");

        let guard = InFlight::new(&self.session, "check");
        let checked = self.checker.check_for_update(&self.current_version).await;
        guard.disarm();

        match checked {
            Ok(Some(update)) => {
                {
                    let mut session = self.session.lock();
                    session.state = SessionState::UpdateAvailable;
                    session.info = Some(update.clone());
                }
                let _ = self
                    .events_tx
                    .send(UpdateEvent::UpdateAvailable(update.clone()));
                Ok(Some(update))
            }
            Ok(None) => {
                self.session.lock().state = SessionState::Idle;
                debug!("Session state: {} -> idle", SessionState::NoUpdateFound);
                info!("No update found, running {}", self.current_version);
                Ok(None)
            }
            Err(e) => {
                self.fail("check", &e, SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Download and extract the available update. Allowed only while
    /// `UpdateAvailable`.
    ///
    /// `on_progress` receives the same percentages as the `update-progress`
    /// events. On success returns the extracted package location. On failure
    /// or cancellation the session working directory is removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside `UpdateAvailable`, otherwise
    /// any error of [`Downloader::download`] or [`ArchiveExtractor::extract`].
    pub async fn download_update<F>(
        &self,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>
    where
        F: Fn(u8) + Send + Sync,
    {
        let (update, stale) = {
            let mut session = self.session.lock();
            let update = match (&session.state, &session.info) {
                (SessionState::UpdateAvailable, Some(update)) => update.clone(),
                _ => return Err(session.reject("download update")),
            };
            session.state = SessionState::Downloading;
            session.extracted = None;
            (update, session.work_dir.take())
        };
        debug!("Session state: downloading {}", update.version);

        let work_dir = self
            .work_root
            .join(format!("{SESSION_DIR_PREFIX}{}", update.version));
        let guard = InFlight::new(&self.session, "download").with_work_dir(work_dir.clone());

        if let Some(stale) = stale {
            remove_work_dir(&stale).await;
        }

        match self
            .fetch_and_extract(&update, &work_dir, &on_progress, cancel)
            .await
        {
            Ok(extracted) => {
                guard.disarm();
                {
                    let mut session = self.session.lock();
                    session.state = SessionState::Ready;
                    session.work_dir = Some(work_dir);
                    session.extracted = Some(extracted.clone());
                }
                info!("Update {} ready at {}", update.version, extracted.display());
                let _ = self.events_tx.send(UpdateEvent::UpdateReady);
                Ok(extracted)
            }
            Err(e) => {
                remove_work_dir(&work_dir).await;
                guard.disarm();
                self.fail("download", &e, SessionState::Idle);
                Err(e)
            }
        }
    }

    async fn fetch_and_extract<F>(
        &self,
        update: &UpdateInfo,
        work_dir: &Path,
        on_progress: &F,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>
    where
        F: Fn(u8) + Send + Sync,
    {
        remove_work_dir(work_dir).await;
        tokio::fs::create_dir_all(work_dir).await?;

        let archive = work_dir.join(ARCHIVE_NAME);
        let events_tx = &self.events_tx;
        self.downloader
            .download(
                &update.download_url,
                &archive,
                |percent| {
                    on_progress(percent);
                    let _ = events_tx.send(UpdateEvent::UpdateProgress(percent));
                },
                cancel,
            )
            .await?;

        let extracted = work_dir.join(EXTRACTED_DIR_NAME);
        let extractor = self.extractor;
        let dest = extracted.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&archive, &dest))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        Ok(extracted)
    }

    /// Launch the deferred replace script and request host exit. Allowed
    /// only while `Ready`.
    ///
    /// On success the session is `Applied` and [`Self::exit_requested`]
    /// flips to `true`; the host must then terminate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoUpdateDownloaded`] when no package is extracted,
    /// [`Error::InvalidState`] while another operation runs, otherwise any
    /// installer error (the session stays `Ready`).
    pub fn apply_update_and_restart(&self) -> Result<()> {
        let extracted = {
            let mut session = self.session.lock();
            match session.state {
                SessionState::Checking
                | SessionState::Downloading
                | SessionState::Applying
                | SessionState::Applied => return Err(session.reject("apply update")),
                SessionState::Ready => {}
                _ => return Err(Error::NoUpdateDownloaded),
            }
            let Some(extracted) = session.extracted.clone() else {
                return Err(Error::NoUpdateDownloaded);
            };
            session.state = SessionState::Applying;
            extracted
        };
        debug!("Session state: applying {}", extracted.display());

        match self.installer.apply_update(&extracted) {
            Ok(()) => {
                self.session.lock().state = SessionState::Applied;
                info!("Update applied, requesting exit");
                let _ = self.exit_tx.send(true);
                Ok(())
            }
            Err(e) => {
                self.fail("apply", &e, SessionState::Ready);
                Err(e)
            }
        }
    }

    /// Abandon the session and delete any downloaded package.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] while an operation is running or after
    /// the update was applied.
    pub async fn dismiss(&self) -> Result<()> {
        let stale = {
            let mut session = self.session.lock();
            match session.state {
                SessionState::Checking
                | SessionState::Downloading
                | SessionState::Applying
                | SessionState::Applied => return Err(session.reject("dismiss update")),
                _ => session.reset(),
            }
        };
        info!("Update dismissed");

        if let Some(stale) = stale {
            remove_work_dir(&stale).await;
        }
        Ok(())
    }

    /// Report `error` and pass through `Failed` to `resume`.
    fn fail(&self, operation: &str, error: &Error, resume: SessionState) {
        warn!("Update {operation} failed: {error}");
        {
            let mut session = self.session.lock();
            if resume == SessionState::Idle {
                // The working directory, if any, was already removed by the caller.
                let _ = session.reset();
            } else {
                session.state = resume;
            }
        }
        debug!("Session state: {} -> {resume}", SessionState::Failed);

        let _ = self.events_tx.send(UpdateEvent::UpdateError {
            message: error.to_string(),
        });
    }
}

async fn remove_work_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {e}", path.display()),
    }
}
