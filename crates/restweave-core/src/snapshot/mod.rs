//! Versioned configuration snapshots with bounded history.
//!
//! The store retains an ordered, bounded history of immutable
//! [`ConfigurationSnapshot`]s, computes [`ConfigurationDelta`]s between a
//! prior snapshot and a proposed set, and owns the referential-integrity
//! rules for the three configuration kinds.
//!
//! Snapshots are published as `Arc` and never mutated afterwards; readers
//! never synchronize. History eviction is oldest-first and versions are
//! totally ordered by `(timestamp, counter)`.

pub mod delta;
pub mod dependencies;

pub use delta::{ConfigurationDelta, DeltaKind};
pub use dependencies::{validate_dependencies, DependencyReport};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::model::{ConfigurationSet, DatabaseConfig, EndpointConfig, QueryConfig};

/// An immutable, versioned capture of the three configuration kinds.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationSnapshot {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    set: ConfigurationSet,
}

impl ConfigurationSnapshot {
    pub fn configuration(&self) -> &ConfigurationSet {
        &self.set
    }

    pub fn databases(&self) -> &HashMap<String, DatabaseConfig> {
        self.set.databases()
    }

    pub fn queries(&self) -> &HashMap<String, QueryConfig> {
        self.set.queries()
    }

    pub fn endpoints(&self) -> &HashMap<String, EndpointConfig> {
        self.set.endpoints()
    }
}

/// Counters exposed through the orchestrator status surface.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStats {
    pub snapshot_count: usize,
    pub max_history: usize,
    pub current_version: Option<String>,
}

/// Bounded-history snapshot store.
///
/// Readers go through the lock-free snapshot map; writers serialize on the
/// internal order list. All methods return failures as values.
pub struct SnapshotStore {
    snapshots: DashMap<String, Arc<ConfigurationSnapshot>>,
    // Insertion order, oldest first. Guards eviction and version listing.
    order: Mutex<Vec<String>>,
    current: RwLock<Option<Arc<ConfigurationSnapshot>>>,
    counter: AtomicU64,
    max_history: usize,
}

impl SnapshotStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            snapshots: DashMap::new(),
            order: Mutex::new(Vec::new()),
            current: RwLock::new(None),
            counter: AtomicU64::new(0),
            max_history: max_history.max(1),
        }
    }

    /// Capture a new snapshot from the given mappings, publish it as
    /// current, and evict the oldest snapshot once the history bound is
    /// exceeded. Returns the assigned version.
    pub fn create_snapshot(
        &self,
        databases: &HashMap<String, DatabaseConfig>,
        queries: &HashMap<String, QueryConfig>,
        endpoints: &HashMap<String, EndpointConfig>,
    ) -> String {
        self.create_from_set(&ConfigurationSet::new(
            databases.clone(),
            queries.clone(),
            endpoints.clone(),
        ))
    }

    /// Capture a new snapshot from a whole configuration set.
    pub fn create_from_set(&self, set: &ConfigurationSet) -> String {
        let timestamp = Utc::now();
        let counter = self.counter.fetch_add(1, Ordering::SeqCst);
        let version = format!("{}-{}", timestamp.timestamp_millis(), counter);

        let snapshot = Arc::new(ConfigurationSnapshot {
            version: version.clone(),
            timestamp,
            set: set.clone(),
        });

        self.snapshots.insert(version.clone(), Arc::clone(&snapshot));
        {
            let mut order = self
                .order
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            order.push(version.clone());
            while order.len() > self.max_history {
                let evicted = order.remove(0);
                self.snapshots.remove(&evicted);
                debug!(version = %evicted, "Evicted oldest snapshot");
            }
        }
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot);

        debug!(version = %version, "Published configuration snapshot");
        version
    }

    pub fn current_snapshot(&self) -> Option<Arc<ConfigurationSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn snapshot(&self, version: &str) -> Option<Arc<ConfigurationSnapshot>> {
        self.snapshots.get(version).map(|entry| Arc::clone(&entry))
    }

    /// Versions in creation order, oldest first.
    pub fn available_versions(&self) -> Vec<String> {
        self.order
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Set the current snapshot to a retained version. History is not
    /// mutated; an unknown version yields `None`.
    pub fn restore_snapshot(&self, version: &str) -> Option<Arc<ConfigurationSnapshot>> {
        let snapshot = self.snapshot(version)?;
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&snapshot));
        debug!(version = %version, "Restored snapshot as current");
        Some(snapshot)
    }

    /// Compute the delta from a prior snapshot to a proposed set.
    pub fn calculate_delta(
        &self,
        old: Option<&ConfigurationSnapshot>,
        new: &ConfigurationSet,
    ) -> ConfigurationDelta {
        ConfigurationDelta::between(old.map(ConfigurationSnapshot::configuration), new)
    }

    /// Referential-integrity validation of a delta against post-apply
    /// mappings. See [`dependencies::validate_dependencies`].
    pub fn validate_dependencies(
        &self,
        delta: &ConfigurationDelta,
        all_databases: &HashMap<String, DatabaseConfig>,
        all_queries: &HashMap<String, QueryConfig>,
        all_endpoints: &HashMap<String, EndpointConfig>,
    ) -> DependencyReport {
        dependencies::validate_dependencies(delta, all_databases, all_queries, all_endpoints)
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            snapshot_count: self.snapshots.len(),
            max_history: self.max_history,
            current_version: self.current_snapshot().map(|snapshot| snapshot.version.clone()),
        }
    }
}
