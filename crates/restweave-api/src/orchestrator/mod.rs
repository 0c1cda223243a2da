//! Top-level reload orchestration.
//!
//! The orchestrator binds the watcher, snapshot store, validation pipeline,
//! and atomic update coordinator into one state machine:
//!
//! ```text
//! Idle -> Watching <-> Reloading -> Watching
//!                        |           \-> Disabled (max consecutive failures)
//!                        \-> Error (fatal init)        ShuttingDown -> Idle
//! ```
//!
//! File events arriving while a reload is in flight are dropped; every
//! reload recomputes the full delta against the current files, so a dropped
//! event's effect is picked up by the next one. Reloads are dispatched off
//! the notification path so file-event ingestion never stalls.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use restweave_core::config::HotReloadSettings;
use restweave_core::error::HotReloadError;
use restweave_core::loader::ConfigurationSource;
use restweave_core::model::ConfigurationSet;
use restweave_core::snapshot::{SnapshotStats, SnapshotStore};
use restweave_core::validation::{ValidationPipeline, ValidationResult};

use crate::update::{AtomicUpdateManager, AtomicUpdateResult};
use crate::watcher::{ChangeListener, FileChangeEvent, FileWatcher, WatcherStatus};

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReloadState {
    Idle,
    Watching,
    Reloading,
    Error,
    Disabled,
    ShuttingDown,
}

/// What prompted a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReloadTrigger {
    FileChange,
    Manual,
    Validation,
    Forced,
    Scheduled,
}

/// One reload request.
#[derive(Debug, Clone)]
pub struct ReloadRequest {
    pub request_id: Uuid,
    pub trigger: ReloadTrigger,
    pub specific_files: Vec<std::path::PathBuf>,
    pub validate_only: bool,
    pub force: bool,
}

impl ReloadRequest {
    fn with_trigger(trigger: ReloadTrigger) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            trigger,
            specific_files: Vec::new(),
            validate_only: false,
            force: false,
        }
    }

    pub fn manual() -> Self {
        Self::with_trigger(ReloadTrigger::Manual)
    }

    pub fn file_change(path: std::path::PathBuf) -> Self {
        let mut request = Self::with_trigger(ReloadTrigger::FileChange);
        request.specific_files.push(path);
        request
    }

    pub fn forced() -> Self {
        let mut request = Self::with_trigger(ReloadTrigger::Forced);
        request.force = true;
        request
    }

    pub fn validation() -> Self {
        let mut request = Self::with_trigger(ReloadTrigger::Validation);
        request.validate_only = true;
        request
    }
}

/// Result of one reload attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadOutcome {
    pub request_id: Uuid,
    pub trigger: ReloadTrigger,
    pub success: bool,
    /// True when the request was turned away before any work happened
    /// (subsystem disabled, reload already in flight, shutting down).
    pub rejected: bool,
    pub message: String,
    pub changes: usize,
    pub snapshot_version: Option<String>,
    pub validation: Option<ValidationResult>,
    pub update: Option<AtomicUpdateResult>,
}

impl ReloadOutcome {
    fn new(request: &ReloadRequest, success: bool, message: impl Into<String>) -> Self {
        Self {
            request_id: request.request_id,
            trigger: request.trigger,
            success,
            rejected: false,
            message: message.into(),
            changes: 0,
            snapshot_version: None,
            validation: None,
            update: None,
        }
    }

    fn turned_away(request: &ReloadRequest, message: impl Into<String>) -> Self {
        let mut outcome = Self::new(request, false, message);
        outcome.rejected = true;
        outcome
    }
}

/// Status surface for embedding hosts.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadStatusInfo {
    pub enabled: bool,
    pub state: ReloadState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub snapshots: SnapshotStats,
    pub watcher: WatcherStatus,
    pub timestamp: DateTime<Utc>,
}

/// Binds all hot-reload components and owns the top-level state machine.
pub struct ReloadOrchestrator {
    settings: HotReloadSettings,
    watcher: Arc<FileWatcher>,
    store: Arc<SnapshotStore>,
    pipeline: ValidationPipeline,
    updates: Arc<AtomicUpdateManager>,
    source: Arc<dyn ConfigurationSource>,
    state: RwLock<ReloadState>,
    attempts: AtomicU32,
    last_error: RwLock<Option<String>>,
    self_ref: Weak<ReloadOrchestrator>,
}

impl ReloadOrchestrator {
    pub fn new(
        settings: HotReloadSettings,
        watcher: Arc<FileWatcher>,
        store: Arc<SnapshotStore>,
        pipeline: ValidationPipeline,
        updates: Arc<AtomicUpdateManager>,
        source: Arc<dyn ConfigurationSource>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            settings,
            watcher,
            store,
            pipeline,
            updates,
            source,
            state: RwLock::new(ReloadState::Idle),
            attempts: AtomicU32::new(0),
            last_error: RwLock::new(None),
            self_ref: self_ref.clone(),
        })
    }

    pub fn state(&self) -> ReloadState {
        *self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ReloadState) {
        *self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// The state to return to after a reload. Manual-only deployments
    /// (watching disabled) still report Watching while enabled; only a
    /// disabled subsystem rests at Idle.
    fn resting_state(&self) -> ReloadState {
        if self.settings.enabled {
            ReloadState::Watching
        } else {
            ReloadState::Idle
        }
    }

    /// Subscribe to file changes and enter Watching. A disabled subsystem
    /// stays Idle; a watcher that cannot start at all is fatal and leaves
    /// the orchestrator in Error.
    pub fn initialize(&self) -> Result<(), HotReloadError> {
        if !self.settings.enabled {
            info!("Hot reload disabled by configuration");
            return Ok(());
        }

        if self.settings.watch_directories {
            self.watcher.set_debounce_delay(self.settings.debounce());
            let listener = self
                .self_ref
                .upgrade()
                .ok_or_else(|| HotReloadError::Initialization {
                    message: "orchestrator dropped during initialization".to_string(),
                })?;
            self.watcher.register(listener as Arc<dyn ChangeListener>);
            if let Err(error) = self
                .watcher
                .start_watching(&self.settings.config_dirs, &self.settings.patterns)
            {
                self.set_state(ReloadState::Error);
                return Err(HotReloadError::Initialization {
                    message: format!("file watcher failed to start: {}", error),
                });
            }
        } else {
            info!("Directory watching disabled; reloads are manual only");
        }

        self.set_state(ReloadState::Watching);
        info!(
            directories = self.settings.config_dirs.len(),
            debounce_ms = self.settings.debounce_ms,
            "Reload orchestrator watching"
        );
        Ok(())
    }

    /// Perform the first load and apply, publishing the initial snapshot.
    pub async fn load_initial(&self) -> ReloadOutcome {
        self.trigger_reload(ReloadRequest::manual()).await
    }

    /// Drive one reload through load, delta, validation, and atomic apply.
    ///
    /// Rejected when the subsystem is disabled or a reload is already in
    /// flight; a Forced request bypasses the in-flight check only while the
    /// update gate is releasable.
    pub async fn trigger_reload(&self, request: ReloadRequest) -> ReloadOutcome {
        if !self.settings.enabled {
            return ReloadOutcome::turned_away(&request, "hot reload is disabled");
        }

        {
            let mut state = self
                .state
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match *state {
                ReloadState::Disabled => {
                    return ReloadOutcome::turned_away(
                        &request,
                        "hot reload is disabled after repeated failures",
                    );
                }
                ReloadState::ShuttingDown => {
                    return ReloadOutcome::turned_away(&request, "orchestrator is shutting down");
                }
                ReloadState::Reloading => {
                    let force_allowed = request.force && !self.updates.update_in_progress();
                    if !force_allowed {
                        debug!(request = %request.request_id, "Reload rejected: already in progress");
                        return ReloadOutcome::turned_away(&request, "reload already in progress");
                    }
                    warn!(request = %request.request_id, "Forced reload overriding in-progress state");
                }
                _ => {}
            }
            *state = ReloadState::Reloading;
        }

        let outcome = self.run_reload(&request).await;

        if outcome.success {
            self.attempts.store(0, Ordering::SeqCst);
            *self
                .last_error
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
            self.set_state(self.resting_state());
            info!(request = %request.request_id, message = %outcome.message, "Reload finished");
        } else {
            self.handle_reload_failure(&outcome);
        }
        outcome
    }

    async fn run_reload(&self, request: &ReloadRequest) -> ReloadOutcome {
        info!(request = %request.request_id, trigger = ?request.trigger, "Reload started");

        let proposed = match self.source.load(&request.specific_files) {
            Ok(set) => set,
            Err(error) => {
                return ReloadOutcome::new(request, false, format!("configuration load failed: {}", error));
            }
        };

        let pre_snapshot = self.store.current_snapshot();
        let delta = self
            .store
            .calculate_delta(pre_snapshot.as_deref(), &proposed);

        if delta.is_empty() {
            let mut outcome = ReloadOutcome::new(request, true, "no configuration changes detected");
            outcome.snapshot_version = pre_snapshot.map(|snapshot| snapshot.version.clone());
            return outcome;
        }
        debug!(request = %request.request_id, delta = %delta.summary(), "Delta computed");

        let mut validation = None;
        if self.settings.validate_before_apply || request.validate_only {
            let result = self.pipeline.validate(&delta, &proposed).await;
            let valid = result.valid;
            let first_error = result.errors().into_iter().next();
            validation = Some(result);

            if !valid {
                let mut outcome = ReloadOutcome::new(
                    request,
                    false,
                    format!(
                        "validation failed: {}",
                        first_error.unwrap_or_else(|| "unknown error".to_string())
                    ),
                );
                outcome.changes = delta.total_changes();
                outcome.validation = validation;
                return outcome;
            }
            if request.validate_only {
                let mut outcome =
                    ReloadOutcome::new(request, true, "validation passed; changes not applied");
                outcome.changes = delta.total_changes();
                outcome.validation = validation;
                return outcome;
            }
        }

        let previous = pre_snapshot
            .as_ref()
            .map(|snapshot| snapshot.configuration().clone())
            .unwrap_or_else(ConfigurationSet::empty);
        let update = self.updates.apply(&delta, &previous).await;

        if !update.success {
            if self.settings.rollback_on_failure {
                if let Some(snapshot) = &pre_snapshot {
                    self.store.restore_snapshot(&snapshot.version);
                    info!(version = %snapshot.version, "Restored pre-reload snapshot");
                }
            }
            let mut outcome = ReloadOutcome::new(
                request,
                false,
                format!("apply failed: {}", update.errors.join("; ")),
            );
            outcome.changes = delta.total_changes();
            outcome.validation = validation;
            outcome.update = Some(update);
            return outcome;
        }

        let version = self.store.create_from_set(&proposed);
        let mut outcome = ReloadOutcome::new(
            request,
            true,
            format!("applied {} change(s)", delta.total_changes()),
        );
        outcome.changes = delta.total_changes();
        outcome.snapshot_version = Some(version);
        outcome.validation = validation;
        outcome.update = Some(update);
        outcome
    }

    fn handle_reload_failure(&self, outcome: &ReloadOutcome) {
        let attempts = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        *self
            .last_error
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(outcome.message.clone());
        error!(
            request = %outcome.request_id,
            attempts,
            message = %outcome.message,
            "Reload failed"
        );

        if attempts >= self.settings.max_attempts {
            warn!(
                attempts,
                max_attempts = self.settings.max_attempts,
                "Disabling hot reload after consecutive failures; re-enable explicitly"
            );
            self.set_state(ReloadState::Disabled);
        } else {
            self.set_state(self.resting_state());
        }
    }

    /// Reset the failure counter and resume watching after a disablement.
    pub fn re_enable(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.set_state(self.resting_state());
        info!("Hot reload re-enabled");
    }

    /// Stop watching and return to Idle.
    pub async fn shutdown(&self) {
        self.set_state(ReloadState::ShuttingDown);
        let watcher = Arc::clone(&self.watcher);
        // stop_watching joins the watch thread; keep that off the runtime.
        if tokio::task::spawn_blocking(move || watcher.stop_watching())
            .await
            .is_err()
        {
            error!("Watcher shutdown task failed");
        }
        self.set_state(ReloadState::Idle);
        info!("Reload orchestrator shut down");
    }

    pub fn status(&self) -> ReloadStatusInfo {
        ReloadStatusInfo {
            enabled: self.settings.enabled,
            state: self.state(),
            attempts: self.attempts.load(Ordering::SeqCst),
            last_error: self
                .last_error
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
            snapshots: self.store.stats(),
            watcher: self.watcher.status(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait::async_trait]
impl ChangeListener for ReloadOrchestrator {
    async fn on_file_change(&self, event: FileChangeEvent) {
        match self.state() {
            ReloadState::Reloading => {
                debug!(path = %event.path.display(), "Reload in progress; file event dropped");
            }
            ReloadState::Disabled => {
                debug!(path = %event.path.display(), "Hot reload disabled; file event ignored");
            }
            ReloadState::Watching => {
                let Some(orchestrator) = self.self_ref.upgrade() else {
                    return;
                };
                info!(
                    path = %event.path.display(),
                    kind = ?event.kind,
                    config_kind = %event.config_kind,
                    "File change detected; scheduling reload"
                );
                let request = ReloadRequest::file_change(event.path);
                // Off the notification path; failures are recorded by the
                // reload itself.
                tokio::spawn(async move {
                    let outcome = orchestrator.trigger_reload(request).await;
                    if !outcome.success {
                        debug!(request = %outcome.request_id, message = %outcome.message,
                               "File-triggered reload did not apply");
                    }
                });
            }
            other => {
                debug!(state = ?other, path = %event.path.display(), "File event ignored");
            }
        }
    }
}
