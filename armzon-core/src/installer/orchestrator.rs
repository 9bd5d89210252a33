//! Installation orchestrator.
//!
//! The `InstallationOrchestrator` is the main entry point of the installer.
//! It sequences download, structural validation, extraction and integrity
//! verification, owns the install root for the duration of a run, and rolls
//! back on failure or cancellation.
//!
//! Progress bands over a run:
//!
//! | Phase       | Percent                            |
//! |-------------|------------------------------------|
//! | Downloading | 0..=10 (download percent / 10)     |
//! | Validating  | 10                                 |
//! | Extracting  | 20 + processed * 70 / total        |
//! | Verifying   | 90                                 |
//! | Complete    | 100                                |
//!
//! Only one run may change an install root at a time. Within a process the
//! root is claimed in a registry shared by every orchestrator; across
//! processes an advisory lock on the root's lock file is held for the run.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::archive::open_validated;
use super::downloader::{DownloadProgress, Downloader};
use super::error::InstallError;
use super::events::{EventEmitter, EventSender, Outcome};
use super::extractor::extract_archive;
use super::integrity::{verify, VerificationReport};
use super::paths::normalize_root;
use super::types::{InstallationState, RemoteSource};
use crate::config::InstallerConfig;

const EXTRACT_START_PERCENT: u8 = 20;
const EXTRACT_SPAN_PERCENT: usize = 70;
const VERIFY_PERCENT: u8 = 90;

// ============================================================================
// Install Handle
// ============================================================================

/// Handle to an installation running in the background.
#[derive(Debug)]
pub struct InstallHandle {
    cancel: CancellationToken,
    task: JoinHandle<Outcome>,
}

impl InstallHandle {
    /// Requests cancellation. The run rolls back and ends in
    /// [`Outcome::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this installation when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the installation to end.
    pub async fn wait(self) -> Outcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Installation task failed: {}", e);
                Outcome::from_error(
                    InstallationState::Failed,
                    &InstallError::io("Installation task failed", io::Error::other(e)),
                    None,
                )
            }
        }
    }
}

// ============================================================================
// Root Guard
// ============================================================================

/// Install roots claimed by a run in this process.
fn claimed_roots() -> MutexGuard<'static, HashSet<PathBuf>> {
    static ROOTS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    ROOTS
        .get_or_init(|| Mutex::new(HashSet::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Claim on an install root for this process. Released on drop.
#[derive(Debug)]
struct RootGuard {
    key: PathBuf,
}

impl RootGuard {
    fn claim(root: &Path) -> Result<Self, InstallError> {
        let key = normalize_root(root);
        if !claimed_roots().insert(key.clone()) {
            return Err(InstallError::AlreadyRunning {
                root: root.to_path_buf(),
            });
        }
        debug!("Claimed install root {}", key.display());
        Ok(Self { key })
    }

    fn is_claimed(root: &Path) -> bool {
        claimed_roots().contains(&normalize_root(root))
    }
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        claimed_roots().remove(&self.key);
    }
}

/// Opens (creating if needed) the lock file other processes contend on.
fn open_lock_file(path: &Path) -> Result<fd_lock::RwLock<File>, InstallError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            InstallError::io(format!("Failed to create {}", parent.display()), e)
        })?;
    }

    let file = OpenOptions::new()
        .write(true)
        .read(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| InstallError::io(format!("Failed to open {}", path.display()), e))?;
    Ok(fd_lock::RwLock::new(file))
}

fn lock_error(root: &Path, lock_path: &Path, e: io::Error) -> InstallError {
    if e.kind() == io::ErrorKind::WouldBlock {
        InstallError::AlreadyRunning {
            root: root.to_path_buf(),
        }
    } else {
        InstallError::io(format!("Failed to lock {}", lock_path.display()), e)
    }
}

// ============================================================================
// Installation Orchestrator
// ============================================================================

#[derive(Debug)]
struct Inner {
    config: InstallerConfig,
    downloader: Downloader,
    state: RwLock<InstallationState>,
}

/// Runs installations into one install root, one at a time.
///
/// Orchestrators built for the same root, in this process or another,
/// exclude each other. Cheap to clone; clones share the same state.
#[derive(Debug, Clone)]
pub struct InstallationOrchestrator {
    inner: Arc<Inner>,
}

impl InstallationOrchestrator {
    /// Creates an orchestrator for `config`.
    pub fn new(config: InstallerConfig) -> Result<Self, InstallError> {
        let downloader = Downloader::new(&config.download)?;

        info!(
            "InstallationOrchestrator initialized. Install root: {}, staging: {}",
            config.install_root.display(),
            config.download_dir.display()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                downloader,
                state: RwLock::new(InstallationState::Idle),
            }),
        })
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.inner.config
    }

    pub fn install_root(&self) -> &Path {
        &self.inner.config.install_root
    }

    /// Current state of the most recent run.
    pub async fn state(&self) -> InstallationState {
        *self.inner.state.read().await
    }

    /// Returns true while an installation or uninstall in this process
    /// holds the install root.
    pub fn is_busy(&self) -> bool {
        RootGuard::is_claimed(&self.inner.config.install_root)
    }

    fn try_acquire(&self) -> Result<RootGuard, InstallError> {
        RootGuard::claim(&self.inner.config.install_root)
    }

    // ========================================================================
    // Installation
    // ========================================================================

    /// Starts an installation from `url` in a background task.
    ///
    /// Events go to `events`; the stream ends with exactly one
    /// `InstallEvent::Finished`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::AlreadyRunning`] if another installation in
    /// this process holds the install root. No events are sent in that case.
    /// A root locked by another process is reported through `events` as a
    /// failed run.
    pub fn start(
        &self,
        url: impl Into<String>,
        events: EventSender,
    ) -> Result<InstallHandle, InstallError> {
        let guard = self.try_acquire()?;
        let cancel = CancellationToken::new();
        let run = Run::new(Arc::clone(&self.inner), events, cancel.clone());
        let url = url.into();

        let task = tokio::spawn(async move {
            let _guard = guard;
            run.execute_locked(url).await
        });

        Ok(InstallHandle { cancel, task })
    }

    /// Runs an installation to completion on the current task.
    ///
    /// A busy orchestrator reports [`Outcome::Failed`] with
    /// `ErrorKind::AlreadyRunning` through `events` as well as the return
    /// value.
    pub async fn install(
        &self,
        url: impl Into<String>,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Outcome {
        let run = Run::new(Arc::clone(&self.inner), events, cancel);
        let _guard = match self.try_acquire() {
            Ok(guard) => guard,
            Err(e) => return run.reject(e),
        };

        run.execute_locked(url.into()).await
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Checks the install root against the install manifest without
    /// changing anything.
    pub async fn verify_installation(&self) -> Result<VerificationReport, InstallError> {
        let root = self.inner.config.install_root.clone();
        let specs = self.inner.config.install_manifest.clone();
        let mode = self.inner.config.verify_mode();

        blocking(move || verify(&root, &specs, mode)).await
    }

    /// Removes the install root and any staged archive.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::AlreadyRunning`] while an installation is in
    /// flight, or [`InstallError::Io`] if the root cannot be removed.
    pub async fn uninstall(&self) -> Result<(), InstallError> {
        let _guard = self.try_acquire()?;
        let root = self.inner.config.install_root.clone();
        let archive = self.inner.config.staged_archive_path();
        let lock_path = self.inner.config.lock_file_path();

        info!("Uninstalling {}", root.display());

        blocking(move || {
            let mut lock = open_lock_file(&lock_path)?;
            let _held = lock
                .try_write()
                .map_err(|e| lock_error(&root, &lock_path, e))?;

            remove_staged_archive(&archive);
            match fs::remove_dir_all(&root) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(InstallError::io(
                    format!("Failed to remove {}", root.display()),
                    e,
                )),
            }
        })
        .await??;

        *self.inner.state.write().await = InstallationState::Idle;
        Ok(())
    }
}

// ============================================================================
// Run
// ============================================================================

/// State of one installation attempt.
struct Run {
    inner: Arc<Inner>,
    emitter: EventEmitter,
    cancel: CancellationToken,
    phase: InstallationState,
    /// Set once the install root has been touched.
    root_cleaned: bool,
    report: Option<VerificationReport>,
}

impl Run {
    fn new(inner: Arc<Inner>, events: EventSender, cancel: CancellationToken) -> Self {
        Self {
            inner,
            emitter: EventEmitter::new(events),
            cancel,
            phase: InstallationState::Idle,
            root_cleaned: false,
            report: None,
        }
    }

    /// Holds the root's lock file for the duration of the run.
    async fn execute_locked(self, url: String) -> Outcome {
        let root = self.inner.config.install_root.clone();
        let lock_path = self.inner.config.lock_file_path();

        let path = lock_path.clone();
        let mut lock = match blocking(move || open_lock_file(&path)).await {
            Ok(Ok(lock)) => lock,
            Ok(Err(e)) | Err(e) => return self.reject(e),
        };
        let _held = match lock.try_write() {
            Ok(held) => held,
            Err(e) => return self.reject(lock_error(&root, &lock_path, e)),
        };
        debug!("Locked {}", lock_path.display());

        self.execute(url).await
    }

    /// Ends a run that never started.
    fn reject(mut self, err: InstallError) -> Outcome {
        warn!("{}", err);
        let outcome = Outcome::from_error(InstallationState::Idle, &err, None);
        self.emitter.finish(outcome.clone());
        outcome
    }

    async fn execute(mut self, url: String) -> Outcome {
        match self.pipeline(&url).await {
            Ok(()) => {
                self.enter(InstallationState::Complete, Some(100), "Installation complete")
                    .await;
                self.emitter.finish(Outcome::Complete);
                Outcome::Complete
            }
            Err(err) => {
                let phase = self.phase;
                self.rollback().await;

                let terminal = if err.is_cancelled() {
                    info!(phase = %phase, "Installation cancelled");
                    InstallationState::Cancelled
                } else {
                    error!(phase = %phase, kind = %err.kind(), "Installation failed: {}", err);
                    InstallationState::Failed
                };
                *self.inner.state.write().await = terminal;

                let outcome = Outcome::from_error(phase, &err, self.report.take());
                self.emitter.finish(outcome.clone());
                outcome
            }
        }
    }

    async fn pipeline(&mut self, url: &str) -> Result<(), InstallError> {
        let inner = Arc::clone(&self.inner);
        let config = &inner.config;
        let archive_path = config.staged_archive_path();
        let install_root = config.install_root.clone();

        // Downloading
        self.enter(InstallationState::Downloading, Some(0), "Downloading game archive")
            .await;
        let source = RemoteSource::new(url, &archive_path);
        let emitter = &mut self.emitter;
        inner
            .downloader
            .download(&source, &self.cancel, |progress| {
                emitter.progress(
                    InstallationState::Downloading,
                    progress.percent.map(|p| p / 10),
                    describe_download(&progress),
                )
            })
            .await?;

        // Validating
        self.enter(InstallationState::Validating, Some(10), "Validating archive")
            .await;
        let required = config.archive_manifest.clone();
        let path = archive_path.clone();
        let archive = blocking(move || open_validated(&path, &required)).await??;
        self.check_cancelled()?;

        // Extracting
        self.root_cleaned = true;
        let root = install_root.clone();
        blocking(move || clean_install_root(&root)).await??;
        self.enter(
            InstallationState::Extracting,
            Some(EXTRACT_START_PERCENT),
            "Extracting game files",
        )
        .await;

        let mapping = config.path_mapping.clone();
        let options = config.extract_options();
        let cancel = self.cancel.clone();
        let root = install_root.clone();
        let mut emitter = self.emitter.clone();
        let (result, emitter) = blocking(move || {
            let mut archive = archive;
            let result = extract_archive(&mut archive, &mapping, &root, &options, &cancel, |p| {
                emitter.progress(
                    InstallationState::Extracting,
                    Some(extraction_percent(p.processed, p.total)),
                    format!("Extracting {} ({}/{})", p.name, p.processed, p.total),
                )
            });
            (result, emitter)
        })
        .await?;
        self.emitter = emitter;
        let extracted = result?;
        debug!("Extracted {} entries", extracted);

        let path = archive_path.clone();
        blocking(move || remove_staged_archive(&path)).await?;
        self.check_cancelled()?;

        // Verifying
        self.enter(
            InstallationState::Verifying,
            Some(VERIFY_PERCENT),
            "Verifying installed files",
        )
        .await;
        let specs = config.install_manifest.clone();
        let mode = config.verify_mode();
        let root = install_root.clone();
        let report = blocking(move || verify(&root, &specs, mode)).await?;

        if !report.all_passed {
            let failed = report.failed_paths();
            self.report = Some(report);
            return Err(InstallError::Integrity { failed });
        }

        Ok(())
    }

    async fn enter(
        &mut self,
        phase: InstallationState,
        percent: Option<u8>,
        message: impl Into<String>,
    ) {
        info!(phase = %phase, "Entering phase");
        self.phase = phase;
        *self.inner.state.write().await = phase;
        self.emitter.progress(phase, percent, message);
    }

    fn check_cancelled(&self) -> Result<(), InstallError> {
        if self.cancel.is_cancelled() {
            Err(InstallError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Best-effort cleanup after a failed or cancelled run. Errors are
    /// logged only.
    async fn rollback(&mut self) {
        let archive = self.inner.config.staged_archive_path();
        let root = self
            .root_cleaned
            .then(|| self.inner.config.install_root.clone());

        let result = blocking(move || {
            remove_staged_archive(&archive);
            if let Some(root) = root {
                if let Err(e) = clean_install_root(&root) {
                    warn!("Failed to clean install root during rollback: {}", e);
                }
            }
        })
        .await;

        if let Err(e) = result {
            warn!("Rollback did not complete: {}", e);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Runs blocking filesystem or archive work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, InstallError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| InstallError::io("Background task failed", io::Error::other(e)))
}

/// Global percent for `processed` of `total` extracted entries.
fn extraction_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return VERIFY_PERCENT;
    }
    let span = processed.min(total) * EXTRACT_SPAN_PERCENT / total;
    EXTRACT_START_PERCENT + span as u8
}

fn describe_download(progress: &DownloadProgress) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    let done = progress.bytes_downloaded as f64 / MB;
    match progress.total_bytes {
        Some(total) => format!("Downloaded {:.1} of {:.1} MB", done, total as f64 / MB),
        None => format!("Downloaded {:.1} MB", done),
    }
}

/// Removes everything under `root` and recreates it empty.
fn clean_install_root(root: &Path) -> Result<(), InstallError> {
    match fs::remove_dir_all(root) {
        Ok(()) => debug!("Removed {}", root.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(InstallError::io(
                format!("Failed to clean {}", root.display()),
                e,
            ))
        }
    }

    fs::create_dir_all(root).map_err(|e| {
        InstallError::io(format!("Failed to create {}", root.display()), e)
    })
}

fn remove_staged_archive(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed staged archive {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove staged archive {}: {}", path.display(), e),
    }
}
