//! End-to-end reload scenarios through the orchestrator.

mod support;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;

use restweave_api::orchestrator::{ReloadOrchestrator, ReloadRequest, ReloadState};
use restweave_api::pool::DatabasePoolManager;
use restweave_api::registry::{DispatchRouter, EndpointRegistry, HttpRouter};
use restweave_api::update::AtomicUpdateManager;
use restweave_api::watcher::FileWatcher;
use restweave_core::config::HotReloadSettings;
use restweave_core::loader::{ConfigurationSource, YamlConfigLoader};
use restweave_core::snapshot::SnapshotStore;
use restweave_core::validation::ValidationPipeline;

use support::{
    baseline_set, build_set, database, endpoint, query, NullExecutor, RecordingPool, StubSource,
};

struct Fixture {
    orchestrator: Arc<ReloadOrchestrator>,
    source: Arc<StubSource>,
    store: Arc<SnapshotStore>,
    registry: Arc<EndpointRegistry>,
    pool: Arc<RecordingPool>,
}

fn fixture_with_settings(settings: HotReloadSettings) -> Fixture {
    let source = Arc::new(StubSource::new(baseline_set()));
    let store = Arc::new(SnapshotStore::new(settings.snapshot.max_history));
    let registry = Arc::new(EndpointRegistry::new(
        Arc::clone(&store),
        Arc::new(NullExecutor),
    ));
    registry.set_router(Arc::new(DispatchRouter::new()) as Arc<dyn HttpRouter>);
    let pool = Arc::new(RecordingPool::new());
    let updates = Arc::new(AtomicUpdateManager::new(
        Arc::clone(&registry),
        Arc::clone(&pool) as Arc<dyn DatabasePoolManager>,
    ));
    let watcher = Arc::new(FileWatcher::new(settings.debounce()).unwrap());
    let orchestrator = ReloadOrchestrator::new(
        settings,
        watcher,
        Arc::clone(&store),
        ValidationPipeline::new(),
        updates,
        Arc::clone(&source) as Arc<dyn ConfigurationSource>,
    );
    Fixture {
        orchestrator,
        source,
        store,
        registry,
        pool,
    }
}

fn fixture() -> Fixture {
    fixture_with_settings(HotReloadSettings {
        watch_directories: false,
        max_attempts: 3,
        ..HotReloadSettings::default()
    })
}

/// Initial load, then the same inputs again: the second reload is a
/// "no changes" success that does not publish a snapshot.
#[tokio::test]
async fn unchanged_inputs_are_an_idempotent_success() {
    let fixture = fixture();
    fixture.orchestrator.initialize().unwrap();

    let first = fixture.orchestrator.load_initial().await;
    assert!(first.success, "message: {}", first.message);
    assert_eq!(first.changes, 3);
    let versions_before = fixture.store.available_versions();

    let second = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::manual())
        .await;
    assert!(second.success);
    assert_eq!(second.changes, 0);
    assert_eq!(second.message, "no configuration changes detected");
    assert_eq!(fixture.store.available_versions(), versions_before);
    assert_eq!(fixture.orchestrator.state(), ReloadState::Watching);
    assert!(fixture.orchestrator.status().last_error.is_none());
}

#[tokio::test]
async fn additive_evolution_is_applied_and_snapshotted() {
    let fixture = fixture();
    fixture.orchestrator.initialize().unwrap();
    fixture.orchestrator.load_initial().await;

    fixture.source.set_next(build_set(
        &[database("userdb"), database("analyticsdb")],
        &[query("q1", "userdb"), query("q_stats", "analyticsdb")],
        &[
            endpoint("e1", "/users", "q1"),
            endpoint("e_stats", "/stats", "q_stats"),
        ],
    ));

    let outcome = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::manual())
        .await;
    assert!(outcome.success, "message: {}", outcome.message);
    assert_eq!(outcome.changes, 3);
    assert!(outcome.snapshot_version.is_some());
    assert!(outcome.validation.as_ref().unwrap().valid);
    assert!(outcome.update.as_ref().unwrap().success);

    let active = fixture.registry.active_endpoints();
    assert!(active.contains_key("e1"));
    assert!(active.contains_key("e_stats"));
    assert!(fixture.pool.managed().contains("analyticsdb"));

    let snapshot = fixture.store.current_snapshot().unwrap();
    assert_eq!(snapshot.endpoints().len(), 2);
}

/// A dangling query reference fails the dependency stage; nothing reaches
/// the update coordinator and history is untouched.
#[tokio::test]
async fn dangling_reference_aborts_before_apply() {
    let fixture = fixture();
    fixture.orchestrator.initialize().unwrap();
    fixture.orchestrator.load_initial().await;
    let versions_before = fixture.store.available_versions();
    let pool_ops_before = fixture.pool.operations();

    fixture.source.set_next(build_set(
        &[database("userdb")],
        &[query("q1", "userdb"), query("q_bad", "nonexistent_db")],
        &[endpoint("e1", "/users", "q1")],
    ));

    let outcome = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::manual())
        .await;
    assert!(!outcome.success);
    assert!(outcome.message.contains("nonexistent_db"));
    assert!(outcome.update.is_none(), "apply must not run");
    let validation = outcome.validation.unwrap();
    assert_eq!(validation.errors().len(), 1);

    assert_eq!(fixture.store.available_versions(), versions_before);
    assert_eq!(fixture.pool.operations(), pool_ops_before);
    let status = fixture.orchestrator.status();
    assert!(status.last_error.unwrap().contains("nonexistent_db"));
    assert_eq!(status.attempts, 1);
    assert_eq!(status.state, ReloadState::Watching);
}

#[tokio::test]
async fn illegal_removal_is_rejected_pre_apply() {
    let fixture = fixture();
    fixture.orchestrator.initialize().unwrap();
    fixture.orchestrator.load_initial().await;

    // userdb removed while q1 still references it.
    fixture.source.set_next(build_set(
        &[],
        &[query("q1", "userdb")],
        &[endpoint("e1", "/users", "q1")],
    ));

    let outcome = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::manual())
        .await;
    assert!(!outcome.success);
    assert!(outcome
        .message
        .contains("cannot remove database 'userdb'"));
    assert!(outcome.update.is_none());
    assert!(fixture.registry.is_registered("e1"));
}

#[tokio::test]
async fn validate_only_reports_without_applying() {
    let fixture = fixture();
    fixture.orchestrator.initialize().unwrap();
    fixture.orchestrator.load_initial().await;

    fixture.source.set_next(build_set(
        &[database("userdb"), database("analyticsdb")],
        &[query("q1", "userdb"), query("q_stats", "analyticsdb")],
        &[
            endpoint("e1", "/users", "q1"),
            endpoint("e_stats", "/stats", "q_stats"),
        ],
    ));

    let outcome = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::validation())
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.message, "validation passed; changes not applied");
    assert!(outcome.update.is_none());
    assert!(!fixture.registry.is_registered("e_stats"));
    assert!(!fixture.pool.managed().contains("analyticsdb"));
}

/// Apply fails partway; the update coordinator rolls the live state back
/// and the orchestrator restores the pre-reload snapshot.
#[tokio::test]
async fn apply_failure_restores_the_pre_reload_snapshot() {
    let fixture = fixture();
    fixture.orchestrator.initialize().unwrap();
    fixture.orchestrator.load_initial().await;
    let pre_version = fixture.store.current_snapshot().unwrap().version.clone();
    let pre_endpoints = fixture.registry.active_endpoints();

    fixture.pool.fail_on("add:analyticsdb");
    fixture.source.set_next(build_set(
        &[database("userdb"), database("analyticsdb")],
        &[query("q1", "userdb"), query("q_stats", "analyticsdb")],
        &[
            endpoint("e1", "/users", "q1"),
            endpoint("e_stats", "/stats", "q_stats"),
        ],
    ));

    let outcome = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::manual())
        .await;
    assert!(!outcome.success);
    let update = outcome.update.expect("apply ran");
    assert!(update.rolled_back);

    // Live state and current snapshot both match the pre-reload world.
    assert_eq!(fixture.store.current_snapshot().unwrap().version, pre_version);
    let active = fixture.registry.active_endpoints();
    assert_eq!(active.len(), pre_endpoints.len());
    assert!(active.contains_key("e1"));
    assert!(!active.contains_key("e_stats"));
    assert!(!fixture.pool.managed().contains("analyticsdb"));
}

#[tokio::test]
async fn consecutive_failures_disable_the_orchestrator() {
    let fixture = fixture();
    fixture.orchestrator.initialize().unwrap();
    fixture.orchestrator.load_initial().await;

    fixture.source.fail_with("boom");
    for _ in 0..3 {
        let outcome = fixture
            .orchestrator
            .trigger_reload(ReloadRequest::manual())
            .await;
        assert!(!outcome.success);
    }
    assert_eq!(fixture.orchestrator.state(), ReloadState::Disabled);

    // Further requests are turned away until re-enabled.
    let rejected = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::manual())
        .await;
    assert!(!rejected.success);
    assert!(rejected.message.contains("disabled"));

    fixture.source.set_next(baseline_set());
    fixture.orchestrator.re_enable();
    assert_eq!(fixture.orchestrator.state(), ReloadState::Watching);
    let recovered = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::manual())
        .await;
    assert!(recovered.success);
    assert_eq!(fixture.orchestrator.status().attempts, 0);
}

#[tokio::test]
async fn failure_counter_resets_on_success() {
    let fixture = fixture();
    fixture.orchestrator.initialize().unwrap();
    fixture.orchestrator.load_initial().await;

    fixture.source.fail_with("transient parse failure");
    let _ = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::manual())
        .await;
    assert_eq!(fixture.orchestrator.status().attempts, 1);

    fixture.source.set_next(baseline_set());
    let outcome = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::manual())
        .await;
    assert!(outcome.success);
    assert_eq!(fixture.orchestrator.status().attempts, 0);
    assert!(fixture.orchestrator.status().last_error.is_none());
}

#[tokio::test]
async fn shutdown_returns_to_idle() {
    let fixture = fixture();
    fixture.orchestrator.initialize().unwrap();
    assert_eq!(fixture.orchestrator.state(), ReloadState::Watching);

    fixture.orchestrator.shutdown().await;
    assert_eq!(fixture.orchestrator.state(), ReloadState::Idle);
    assert!(!fixture.orchestrator.status().watcher.watching);
}

#[tokio::test]
async fn disabled_subsystem_rejects_everything() {
    let fixture = fixture_with_settings(HotReloadSettings {
        enabled: false,
        watch_directories: false,
        ..HotReloadSettings::default()
    });
    fixture.orchestrator.initialize().unwrap();
    assert_eq!(fixture.orchestrator.state(), ReloadState::Idle);

    let outcome = fixture
        .orchestrator
        .trigger_reload(ReloadRequest::manual())
        .await;
    assert!(!outcome.success);
    assert!(outcome.message.contains("disabled"));
}

/// Full loop against the real loader and watcher: write declarative files,
/// watch the directory, edit a file, and observe the new endpoint go live.
#[tokio::test]
#[serial]
async fn file_edit_drives_a_live_reload() {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str| std::fs::write(dir.path().join(name), body).unwrap();

    write(
        "app-databases.yml",
        "databases:\n  userdb:\n    url: \"postgres://localhost/users\"\n    driver: \"postgres\"\n",
    );
    write(
        "app-queries.yml",
        "queries:\n  q1:\n    database: userdb\n    sql: \"SELECT * FROM users\"\n",
    );
    write(
        "app-endpoints.yml",
        "endpoints:\n  e1:\n    path: /users\n    method: GET\n    query: q1\n",
    );

    let settings = HotReloadSettings {
        config_dirs: vec![dir.path().to_path_buf()],
        debounce_ms: 200,
        ..HotReloadSettings::default()
    };
    let loader = Arc::new(YamlConfigLoader::new(
        settings.config_dirs.clone(),
        settings.patterns.clone(),
    ));

    let store = Arc::new(SnapshotStore::new(10));
    let registry = Arc::new(EndpointRegistry::new(
        Arc::clone(&store),
        Arc::new(NullExecutor),
    ));
    registry.set_router(Arc::new(DispatchRouter::new()) as Arc<dyn HttpRouter>);
    let pool = Arc::new(RecordingPool::new());
    let updates = Arc::new(AtomicUpdateManager::new(
        Arc::clone(&registry),
        Arc::clone(&pool) as Arc<dyn DatabasePoolManager>,
    ));
    let watcher = Arc::new(FileWatcher::new(settings.debounce()).unwrap());
    let orchestrator = ReloadOrchestrator::new(
        settings,
        watcher,
        Arc::clone(&store),
        ValidationPipeline::new(),
        updates,
        loader as Arc<dyn ConfigurationSource>,
    );

    let initial = orchestrator.load_initial().await;
    assert!(initial.success, "message: {}", initial.message);
    orchestrator.initialize().unwrap();
    assert!(registry.is_registered("e1"));

    // Add a second endpoint on disk and let the watcher drive the reload.
    write(
        "app-endpoints.yml",
        "endpoints:\n  e1:\n    path: /users\n    method: GET\n    query: q1\n  e2:\n    path: /users/active\n    method: GET\n    query: q1\n",
    );

    let mut live = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if registry.is_registered("e2") {
            live = true;
            break;
        }
    }
    assert!(live, "endpoint e2 never became live after the file edit");
    assert_eq!(store.current_snapshot().unwrap().endpoints().len(), 2);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn specific_files_are_passed_through_to_the_source() {
    // The trigger scope reaches the source; the stub ignores it, which is
    // exactly the full-rescan contract.
    let fixture = fixture();
    fixture.orchestrator.initialize().unwrap();
    let request = ReloadRequest::file_change(PathBuf::from("/config/app-endpoints.yml"));
    let outcome = fixture.orchestrator.trigger_reload(request).await;
    assert!(outcome.success);
}
