//! Background organization of new downloads.
//!
//! `watch run` subscribes to filesystem events on the downloads folder and
//! hands each newly arrived file to [`Organizer::organize_file`] once it has
//! been quiet for the settle delay. A PID file in the configuration directory
//! marks the watcher as running; deleting it asks the loop to exit.

use crate::config::{AppPaths, ConfigError, ConfigStore};
use crate::file_organizer::{BatchOutcome, OrganizeError, Organizer};
use crate::history::{Ledger, LedgerError};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often the loop checks whether it has been asked to stop.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long `start` waits for the child to report in.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const STARTUP_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watcher already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("downloads folder {} does not exist", .0.display())]
    DownloadsMissing(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to start watcher process: {0}")]
    Spawn(#[source] io::Error),

    #[error("watcher failed to start: {0}")]
    StartupFailed(String),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Organize(#[from] OrganizeError),
}

pub type WatchResult<T> = Result<T, WatchError>;

/// The file whose presence means a watcher is running.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// The recorded process id, if the file exists and holds one.
    pub fn read(&self) -> Option<u32> {
        fs::read_to_string(&self.path).ok()?.trim().parse().ok()
    }

    pub fn write(&self, pid: u32) -> WatchResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        fs::write(&self.path, pid.to_string()).map_err(|source| self.io_error(source))
    }

    /// Removes the file. Returns false if it was not there.
    pub fn remove(&self) -> WatchResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: io::Error) -> WatchError {
        WatchError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Whether a watcher is running for this configuration directory.
pub fn is_running(paths: &AppPaths) -> bool {
    PidFile::new(paths.pid_file()).exists()
}

/// Spawns a detached `watch run` process and returns its pid.
///
/// Returns once the child has written its PID file, which it does only
/// after it is subscribed to the downloads folder.
pub fn start(paths: &AppPaths) -> WatchResult<u32> {
    let pid_file = PidFile::new(paths.pid_file());
    if pid_file.exists() {
        return Err(WatchError::AlreadyRunning(pid_file.read().unwrap_or(0)));
    }

    let config = ConfigStore::new(paths).load()?;
    if !config.downloads_path.is_dir() {
        return Err(WatchError::DownloadsMissing(config.downloads_path));
    }

    let exe = std::env::current_exe().map_err(WatchError::Spawn)?;
    let mut child = Command::new(exe)
        .arg("--config-dir")
        .arg(paths.dir())
        .args(["watch", "run"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(WatchError::Spawn)?;

    let deadline = Instant::now() + STARTUP_TIMEOUT;
    while Instant::now() < deadline {
        if pid_file.exists() {
            let pid = child.id();
            tracing::info!(pid, "watcher started");
            return Ok(pid);
        }
        if let Ok(Some(status)) = child.try_wait() {
            return Err(WatchError::StartupFailed(format!("watcher exited with {}", status)));
        }
        std::thread::sleep(STARTUP_POLL);
    }

    let _ = child.kill();
    let _ = child.wait();
    Err(WatchError::StartupFailed(format!(
        "watcher did not start within {} seconds",
        STARTUP_TIMEOUT.as_secs()
    )))
}

/// Asks a running watcher to exit. Returns false if none was running.
pub fn stop(paths: &AppPaths) -> WatchResult<bool> {
    let stopped = PidFile::new(paths.pid_file()).remove()?;
    if stopped {
        tracing::info!("watcher stop requested");
    }
    Ok(stopped)
}

/// Runs the watch loop in the current process until the PID file is removed.
pub fn run(paths: &AppPaths) -> WatchResult<()> {
    let config = ConfigStore::new(paths).load()?;
    let downloads = config.downloads_path.clone();
    if !downloads.is_dir() {
        return Err(WatchError::DownloadsMissing(downloads));
    }

    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(tx)?;
    let mode = if config.watcher.watch_subdirs {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher.watch(&downloads, mode)?;

    let pid_file = PidFile::new(paths.pid_file());
    pid_file.write(std::process::id())?;
    tracing::info!(path = %downloads.display(), "watching for new files");

    let settle = Duration::from_millis(config.watcher.settle_ms);
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    while pid_file.exists() {
        let timeout = pending
            .values()
            .min()
            .map(|due| due.saturating_duration_since(Instant::now()))
            .map_or(POLL_INTERVAL, |wait| wait.min(POLL_INTERVAL));

        match rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                for path in arrived_paths(&event) {
                    // A later event for the same file restarts its delay.
                    pending.insert(path, Instant::now() + settle);
                }
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "watch error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        let due: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, due)| **due <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in due {
            pending.remove(&path);
            match handle_path(paths, &path) {
                Ok(Some(outcome)) => tracing::info!(
                    file = %path.display(),
                    category = %outcome.category,
                    moved = outcome.result.moved.len(),
                    "organized new file"
                ),
                Ok(None) => {}
                Err(e) => tracing::warn!(file = %path.display(), error = %e, "failed to organize"),
            }
        }
    }

    pid_file.remove()?;
    tracing::info!("watcher stopped");
    Ok(())
}

/// Organizes one arrived file with freshly loaded configuration and history.
pub fn handle_path(paths: &AppPaths, path: &Path) -> WatchResult<Option<BatchOutcome>> {
    let config = ConfigStore::new(paths).load()?;
    let mut ledger = Ledger::open(&paths.history_file(), &config.history)?;
    let outcome = Organizer::new(&config, &mut ledger)?.organize_file(path)?;
    Ok(outcome)
}

/// Paths an event brings into the watched folder.
fn arrived_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        // Browsers finish a download by renaming it; the last path is the new name.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        _ => Vec::new(),
    }
}
