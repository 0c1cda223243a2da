//! File watcher integration tests against a real file system.
//!
//! Timing-sensitive: debounce windows are kept short and waits generous so
//! the assertions hold on slow CI machines.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serial_test::serial;

use restweave_api::watcher::{ChangeListener, FileChangeEvent, FileChangeKind, FileWatcher};
use restweave_core::model::ConfigKind;

/// Listener that collects every notification it receives.
#[derive(Default)]
struct CollectingListener {
    events: Mutex<Vec<FileChangeEvent>>,
}

impl CollectingListener {
    fn events(&self) -> Vec<FileChangeEvent> {
        self.events.lock().unwrap().clone()
    }

    fn events_for(&self, path: &Path) -> Vec<FileChangeEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.path.as_path() == path)
            .collect()
    }
}

#[async_trait::async_trait]
impl ChangeListener for CollectingListener {
    async fn on_file_change(&self, event: FileChangeEvent) {
        self.events.lock().unwrap().push(event);
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1500)).await;
}

#[tokio::test]
#[serial]
async fn rapid_writes_coalesce_into_at_most_one_notification() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = FileWatcher::new(Duration::from_millis(300)).unwrap();
    let listener = Arc::new(CollectingListener::default());
    watcher.register(Arc::clone(&listener) as Arc<dyn ChangeListener>);
    watcher
        .start_watching(
            &[dir.path().to_path_buf()],
            &["*-endpoints.yml".to_string()],
        )
        .unwrap();

    let target = dir.path().join("x-endpoints.yml");
    for round in 0..5 {
        fs::write(&target, format!("endpoints: {{}} # {}", round)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    settle().await;
    let events = listener.events_for(&target);
    assert!(
        events.len() <= 1,
        "expected at most one debounced event, got {}",
        events.len()
    );
    if let Some(event) = events.first() {
        assert_eq!(event.config_kind, ConfigKind::Endpoint);
    }

    watcher.stop_watching();
}

#[tokio::test]
#[serial]
async fn non_matching_and_ignored_files_produce_no_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = FileWatcher::new(Duration::from_millis(100)).unwrap();
    let listener = Arc::new(CollectingListener::default());
    watcher.register(Arc::clone(&listener) as Arc<dyn ChangeListener>);
    watcher
        .start_watching(
            &[dir.path().to_path_buf()],
            &["*-endpoints.yml".to_string()],
        )
        .unwrap();

    fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    fs::write(dir.path().join("x-endpoints.yml.tmp"), "scratch").unwrap();
    fs::write(dir.path().join(".hidden-endpoints.yml"), "hidden").unwrap();

    settle().await;
    assert!(
        listener.events().is_empty(),
        "unexpected events: {:?}",
        listener.events()
    );

    watcher.stop_watching();
}

#[tokio::test]
#[serial]
async fn create_then_delete_reports_latest_kind() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = FileWatcher::new(Duration::from_millis(400)).unwrap();
    let listener = Arc::new(CollectingListener::default());
    watcher.register(Arc::clone(&listener) as Arc<dyn ChangeListener>);
    watcher
        .start_watching(&[dir.path().to_path_buf()], &["*.yml".to_string()])
        .unwrap();

    let target = dir.path().join("q-queries.yml");
    fs::write(&target, "queries: {}").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    fs::remove_file(&target).unwrap();

    settle().await;
    let events = listener.events_for(&target);
    assert_eq!(events.len(), 1, "events: {:?}", events);
    // Both raw events landed inside one debounce window; the notification
    // carries the most recent kind.
    assert_eq!(events[0].kind, FileChangeKind::Delete);
    assert_eq!(events[0].config_kind, ConfigKind::Query);

    watcher.stop_watching();
}

#[tokio::test]
#[serial]
async fn events_after_stop_are_not_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = FileWatcher::new(Duration::from_millis(100)).unwrap();
    let listener = Arc::new(CollectingListener::default());
    watcher.register(Arc::clone(&listener) as Arc<dyn ChangeListener>);
    watcher
        .start_watching(&[dir.path().to_path_buf()], &["*.yml".to_string()])
        .unwrap();
    watcher.stop_watching();

    fs::write(dir.path().join("late-queries.yml"), "queries: {}").unwrap();
    settle().await;
    assert!(listener.events().is_empty());
}
