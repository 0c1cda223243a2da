//! File-change detection with debouncing and pattern filtering.
//!
//! A [`FileWatcher`] observes a set of directories through the OS facility
//! (`notify`) and delivers a debounced, filtered stream of
//! [`FileChangeEvent`]s to registered listeners.
//!
//! One dedicated thread per watcher instance drains raw OS events with a
//! bounded poll timeout so shutdown latency stays within one tick. Surviving
//! events enter a per-path debouncer: each event bumps a monotonic stamp and
//! schedules a notification; the scheduled task fires only if its stamp is
//! still the latest for that path, carrying the most recently observed
//! change kind.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use restweave_core::error::HotReloadError;
use restweave_core::files::{is_ignored, matches_any};
use restweave_core::model::ConfigKind;

/// How long the watch-loop thread blocks per poll; bounds both event
/// latency after a stop request and thread join time.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Kind of raw file-system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileChangeKind {
    Create,
    Modify,
    Delete,
}

/// A debounced, filtered change notification.
#[derive(Debug, Clone, Serialize)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub kind: FileChangeKind,
    pub timestamp: DateTime<Utc>,
    /// Configuration kind inferred from the file name.
    pub config_kind: ConfigKind,
}

impl FileChangeEvent {
    pub fn new(path: PathBuf, kind: FileChangeKind) -> Self {
        let config_kind = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ConfigKind::from_file_name)
            .unwrap_or(ConfigKind::Unknown);
        Self {
            path,
            kind,
            timestamp: Utc::now(),
            config_kind,
        }
    }
}

/// Watcher-local errors.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Watcher is already running")]
    AlreadyWatching,

    #[error("Failed to initialize watch backend: {0}")]
    Backend(#[from] notify::Error),

    #[error("A Tokio runtime is required for debounce scheduling")]
    NoRuntime,
}

impl From<WatcherError> for HotReloadError {
    fn from(error: WatcherError) -> Self {
        HotReloadError::Watcher {
            message: error.to_string(),
        }
    }
}

/// Receives debounced change notifications.
///
/// Each listener is notified in its own task; a panicking listener is
/// isolated and logged without affecting the others.
#[async_trait::async_trait]
pub trait ChangeListener: Send + Sync {
    async fn on_file_change(&self, event: FileChangeEvent);
}

/// Snapshot of watcher state for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    pub watching: bool,
    pub directory_count: usize,
    pub listener_count: usize,
    pub patterns: Vec<String>,
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct DebounceEntry {
    stamp: u64,
    kind: FileChangeKind,
}

/// State shared between the public handle, the watch-loop thread, and
/// debounce tasks.
struct WatcherShared {
    patterns: RwLock<Vec<String>>,
    debounce_ms: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
    pending: DashMap<PathBuf, DebounceEntry>,
    runtime: Handle,
}

impl WatcherShared {
    fn schedule(self: &Arc<Self>, path: PathBuf, kind: FileChangeKind) {
        let stamp = {
            let mut entry = self
                .pending
                .entry(path.clone())
                .or_insert(DebounceEntry { stamp: 0, kind });
            entry.stamp += 1;
            entry.kind = kind;
            entry.stamp
        };

        let delay = Duration::from_millis(self.debounce_ms.load(Ordering::Relaxed));
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            // Fire only if no newer event superseded this one.
            let latest = shared.pending.remove_if(&path, |_, entry| entry.stamp == stamp);
            if let Some((path, entry)) = latest {
                shared.dispatch(FileChangeEvent::new(path, entry.kind)).await;
            }
        });
    }

    async fn dispatch(&self, event: FileChangeEvent) {
        let listeners = {
            let guard = self
                .listeners
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.clone()
        };
        debug!(path = %event.path.display(), kind = ?event.kind, listeners = listeners.len(),
               "Dispatching file change");

        let mut tasks = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let event = event.clone();
            tasks.push(tokio::spawn(async move {
                listener.on_file_change(event).await;
            }));
        }
        for task in tasks {
            if let Err(join_error) = task.await {
                error!(%join_error, "Change listener panicked; continuing with remaining listeners");
            }
        }
    }
}

struct WatchTask {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Debounced, pattern-filtered file watcher.
pub struct FileWatcher {
    shared: Arc<WatcherShared>,
    task: Mutex<Option<WatchTask>>,
    directory_count: AtomicUsize,
}

impl FileWatcher {
    /// Create an idle watcher. Requires a running Tokio runtime for
    /// debounce scheduling.
    pub fn new(debounce: Duration) -> Result<Self, WatcherError> {
        let runtime = Handle::try_current().map_err(|_| WatcherError::NoRuntime)?;
        Ok(Self {
            shared: Arc::new(WatcherShared {
                patterns: RwLock::new(Vec::new()),
                debounce_ms: AtomicU64::new(debounce.as_millis() as u64),
                listeners: RwLock::new(Vec::new()),
                pending: DashMap::new(),
                runtime,
            }),
            task: Mutex::new(None),
            directory_count: AtomicUsize::new(0),
        })
    }

    /// Begin watching the given directories. Fails if already watching.
    /// Non-existent directories are logged and skipped.
    pub fn start_watching(
        &self,
        directories: &[PathBuf],
        patterns: &[String],
    ) -> Result<(), WatcherError> {
        let mut task_slot = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if task_slot.is_some() {
            return Err(WatcherError::AlreadyWatching);
        }

        *self
            .shared
            .patterns
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = patterns.to_vec();

        let (tx, rx) = mpsc::channel::<Result<notify::Event, notify::Error>>();
        let mut backend: RecommendedWatcher = notify::recommended_watcher(move |result| {
            let _ = tx.send(result);
        })?;

        let mut watched = 0usize;
        for directory in directories {
            if !directory.is_dir() {
                warn!(directory = %directory.display(), "Watch directory does not exist; skipped");
                continue;
            }
            match backend.watch(directory, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    watched += 1;
                    info!(directory = %directory.display(), "Watching directory");
                }
                Err(error) => {
                    warn!(directory = %directory.display(), %error,
                          "Failed to watch directory; skipped");
                }
            }
        }
        self.directory_count.store(watched, Ordering::Relaxed);

        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.shared);
        let stop_flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("restweave-watch".to_string())
            .spawn(move || {
                // The backend must live on this thread for as long as events
                // should flow; dropping it releases every OS watch handle.
                let _backend = backend;
                loop {
                    if stop_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    match rx.recv_timeout(POLL_TIMEOUT) {
                        Ok(Ok(event)) => handle_raw_event(&shared, event),
                        Ok(Err(error)) => {
                            warn!(%error, "Watch backend error; event dropped");
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Watch loop exited");
            })
            .map_err(|error| {
                notify::Error::generic(&format!("failed to spawn watch thread: {}", error))
            })?;

        *task_slot = Some(WatchTask { stop, thread });
        info!(directories = watched, "File watcher started");
        Ok(())
    }

    /// Stop watching and release all OS watch handles. Idempotent; blocks
    /// for at most one poll tick while the loop thread drains.
    pub fn stop_watching(&self) {
        let task = {
            let mut slot = self
                .task
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.take()
        };
        let Some(task) = task else {
            return;
        };
        task.stop.store(true, Ordering::Relaxed);
        if task.thread.join().is_err() {
            error!("Watch thread terminated abnormally");
        }
        self.shared.pending.clear();
        self.directory_count.store(0, Ordering::Relaxed);
        info!("File watcher stopped");
    }

    pub fn is_watching(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Register a listener for debounced change events.
    pub fn register(&self, listener: Arc<dyn ChangeListener>) {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// Remove a previously registered listener; unknown listeners are a
    /// no-op.
    pub fn unregister(&self, listener: &Arc<dyn ChangeListener>) {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    /// Applies to notifications scheduled after the call.
    pub fn set_debounce_delay(&self, delay: Duration) {
        self.shared
            .debounce_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn status(&self) -> WatcherStatus {
        WatcherStatus {
            watching: self.is_watching(),
            directory_count: self.directory_count.load(Ordering::Relaxed),
            listener_count: self
                .shared
                .listeners
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .len(),
            patterns: self
                .shared
                .patterns
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
            debounce_ms: self.shared.debounce_ms.load(Ordering::Relaxed),
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

/// Classify and filter one raw backend event, feeding survivors into the
/// per-path debouncer.
fn handle_raw_event(shared: &Arc<WatcherShared>, event: notify::Event) {
    let kind = match event.kind {
        EventKind::Create(_) => FileChangeKind::Create,
        EventKind::Modify(_) => FileChangeKind::Modify,
        EventKind::Remove(_) => FileChangeKind::Delete,
        EventKind::Access(_) => return,
        // Overflow and unclassified backend events are dropped.
        EventKind::Any | EventKind::Other => {
            debug!(?event, "Unclassified watch event dropped");
            return;
        }
    };

    let patterns = shared
        .patterns
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();

    for path in event.paths {
        if !passes_filters(&path, &patterns) {
            continue;
        }
        shared.schedule(path, kind);
    }
}

fn passes_filters(path: &Path, patterns: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    !is_ignored(name) && matches_any(patterns, name)
}
