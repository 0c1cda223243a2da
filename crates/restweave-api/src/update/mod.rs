//! Four-phase atomic apply with compensating rollback.
//!
//! A validated delta is applied in phases: prepare (gate + collision
//! checks), databases (`added → modified → removed`), endpoints
//! (`removed → modified → added`, the inverse order so no endpoint ever
//! points at a database that is already gone), then a post-validation sweep
//! over the whole registry. Any failure triggers symmetric compensation
//! from the pre-apply configuration; rollback failures are logged and
//! carried in the result but never mask the original error.
//!
//! At most one update is in flight process-wide, enforced by a
//! compare-and-set flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use restweave_core::model::ConfigurationSet;
use restweave_core::snapshot::ConfigurationDelta;

use crate::pool::DatabasePoolManager;
use crate::registry::EndpointRegistry;

/// Which phase an unsuccessful update failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateFailure {
    ConcurrentUpdate,
    PrepareFailed,
    DatabaseApplyFailed,
    EndpointApplyFailed,
    PostValidationFailed,
}

/// Names touched during one phase, with any errors recorded along the way.
///
/// A phase stops at its first failure; `failed_on` names the entry it
/// stopped on.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseOutcome {
    pub applied: Vec<String>,
    pub failed_on: Option<String>,
    pub errors: Vec<String>,
}

/// The entry a phase stopped on, with the failure it hit there.
#[derive(Debug)]
struct PhaseStop {
    name: String,
    message: String,
}

fn stop(name: &str, message: String) -> PhaseStop {
    PhaseStop {
        name: name.to_string(),
        message,
    }
}

/// Result of one atomic update attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AtomicUpdateResult {
    pub update_id: Uuid,
    pub success: bool,
    pub failure: Option<UpdateFailure>,
    pub errors: Vec<String>,
    pub database_phase: PhaseOutcome,
    pub endpoint_phase: PhaseOutcome,
    pub rolled_back: bool,
    /// Rollback failures; non-empty means the compensating actions
    /// themselves were incomplete.
    pub rollback_errors: Vec<String>,
}

impl AtomicUpdateResult {
    fn new(update_id: Uuid) -> Self {
        Self {
            update_id,
            success: false,
            failure: None,
            errors: Vec::new(),
            database_phase: PhaseOutcome::default(),
            endpoint_phase: PhaseOutcome::default(),
            rolled_back: false,
            rollback_errors: Vec::new(),
        }
    }

    pub fn rollback_failed(&self) -> bool {
        !self.rollback_errors.is_empty()
    }
}

/// Per-kind record of what was actually applied, used to drive symmetric
/// compensation.
#[derive(Debug, Default)]
struct AppliedOps {
    added: Vec<String>,
    modified: Vec<String>,
    removed: Vec<String>,
}

impl AppliedOps {
    fn labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.added.len() + self.modified.len() + self.removed.len());
        labels.extend(self.added.iter().map(|name| format!("added:{}", name)));
        labels.extend(self.modified.iter().map(|name| format!("modified:{}", name)));
        labels.extend(self.removed.iter().map(|name| format!("removed:{}", name)));
        labels
    }
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Coordinator sequencing database and endpoint mutations.
pub struct AtomicUpdateManager {
    registry: Arc<EndpointRegistry>,
    pools: Arc<dyn DatabasePoolManager>,
    update_in_progress: AtomicBool,
}

impl AtomicUpdateManager {
    pub fn new(registry: Arc<EndpointRegistry>, pools: Arc<dyn DatabasePoolManager>) -> Self {
        Self {
            registry,
            pools,
            update_in_progress: AtomicBool::new(false),
        }
    }

    pub fn update_in_progress(&self) -> bool {
        self.update_in_progress.load(Ordering::SeqCst)
    }

    /// Apply a validated delta. `previous` is the pre-apply configuration
    /// used to restore modified and removed entries during rollback.
    pub async fn apply(
        &self,
        delta: &ConfigurationDelta,
        previous: &ConfigurationSet,
    ) -> AtomicUpdateResult {
        let update_id = Uuid::new_v4();
        let mut result = AtomicUpdateResult::new(update_id);

        if self
            .update_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            result.failure = Some(UpdateFailure::ConcurrentUpdate);
            result
                .errors
                .push("another update is already in progress".to_string());
            return result;
        }
        let _guard = InFlightGuard(&self.update_in_progress);

        // Phase 1: prepare.
        if !self.registry.begin_atomic_update() {
            result.failure = Some(UpdateFailure::PrepareFailed);
            result
                .errors
                .push("endpoint registry batch already in progress".to_string());
            return result;
        }
        for name in delta.endpoints.added.keys() {
            if self.registry.is_registered(name) {
                result
                    .errors
                    .push(format!("endpoint '{}' is already registered", name));
            }
        }
        if !result.errors.is_empty() {
            result.failure = Some(UpdateFailure::PrepareFailed);
            self.registry.rollback_atomic_update();
            return result;
        }

        info!(update = %update_id, changes = %delta.summary(), "Beginning atomic update");

        // Phase 2: databases.
        let (database_ops, database_stop) = self.apply_databases(delta).await;
        result.database_phase.applied = database_ops.labels();
        if let Some(stop) = database_stop {
            error!(update = %update_id, database = %stop.name, message = %stop.message,
                   "Database phase failed; rolling back");
            result.database_phase.failed_on = Some(stop.name);
            result.database_phase.errors.push(stop.message.clone());
            result.errors.push(stop.message);
            result.failure = Some(UpdateFailure::DatabaseApplyFailed);
            self.rollback_databases(&database_ops, previous, &mut result.rollback_errors)
                .await;
            self.registry.rollback_atomic_update();
            result.rolled_back = true;
            return result;
        }

        // Phase 3: endpoints, inverse order of the database phase.
        let (endpoint_ops, endpoint_stop) = self.apply_endpoints(delta);
        result.endpoint_phase.applied = endpoint_ops.labels();
        if let Some(stop) = endpoint_stop {
            error!(update = %update_id, endpoint = %stop.name, message = %stop.message,
                   "Endpoint phase failed; rolling back");
            result.endpoint_phase.failed_on = Some(stop.name);
            result.endpoint_phase.errors.push(stop.message.clone());
            result.errors.push(stop.message);
            result.failure = Some(UpdateFailure::EndpointApplyFailed);
            self.rollback_endpoints(&endpoint_ops, previous, &mut result.rollback_errors);
            self.registry.rollback_atomic_update();
            self.rollback_databases(&database_ops, previous, &mut result.rollback_errors)
                .await;
            result.rolled_back = true;
            return result;
        }

        // Phase 4: post-validation over the whole registry.
        let report = self.registry.validate_all_endpoints();
        if !report.is_healthy() {
            for (name, reason) in &report.invalid {
                result
                    .errors
                    .push(format!("endpoint '{}' failed post-validation: {}", name, reason));
            }
            error!(update = %update_id, invalid = report.invalid.len(),
                   "Post-validation failed; rolling back");
            result.failure = Some(UpdateFailure::PostValidationFailed);
            self.rollback_endpoints(&endpoint_ops, previous, &mut result.rollback_errors);
            self.registry.rollback_atomic_update();
            self.rollback_databases(&database_ops, previous, &mut result.rollback_errors)
                .await;
            result.rolled_back = true;
            return result;
        }

        self.registry.commit_atomic_update();
        result.success = true;
        info!(update = %update_id, "Atomic update committed");
        result
    }

    /// `added → modified → removed`; stops at the first failure.
    async fn apply_databases(&self, delta: &ConfigurationDelta) -> (AppliedOps, Option<PhaseStop>) {
        let mut ops = AppliedOps::default();

        for (name, config) in &delta.databases.added {
            if let Err(error) = self.pools.add_database(config).await {
                return (ops, Some(stop(name, format!("add database '{}': {}", name, error))));
            }
            ops.added.push(name.clone());
        }
        for (name, config) in &delta.databases.modified {
            if let Err(error) = self.pools.update_database(config).await {
                return (ops, Some(stop(name, format!("update database '{}': {}", name, error))));
            }
            ops.modified.push(name.clone());
        }
        for name in &delta.databases.removed {
            if let Err(error) = self.pools.remove_database(name).await {
                return (ops, Some(stop(name, format!("remove database '{}': {}", name, error))));
            }
            ops.removed.push(name.clone());
        }
        (ops, None)
    }

    /// `removed → modified → added`; stops at the first failure.
    fn apply_endpoints(&self, delta: &ConfigurationDelta) -> (AppliedOps, Option<PhaseStop>) {
        let mut ops = AppliedOps::default();

        for name in &delta.endpoints.removed {
            if let Err(error) = self.registry.unregister_endpoint(name) {
                return (
                    ops,
                    Some(stop(name, format!("unregister endpoint '{}': {}", name, error))),
                );
            }
            ops.removed.push(name.clone());
        }
        for (name, config) in &delta.endpoints.modified {
            if let Err(error) = self.registry.update_endpoint(name, config.clone()) {
                return (
                    ops,
                    Some(stop(name, format!("update endpoint '{}': {}", name, error))),
                );
            }
            ops.modified.push(name.clone());
        }
        for (name, config) in &delta.endpoints.added {
            if let Err(error) = self.registry.register_endpoint(name, config.clone()) {
                return (
                    ops,
                    Some(stop(name, format!("register endpoint '{}': {}", name, error))),
                );
            }
            ops.added.push(name.clone());
        }
        (ops, None)
    }

    /// Symmetric compensation for the database phase: remove what was
    /// added, restore what was modified or removed from `previous`.
    async fn rollback_databases(
        &self,
        ops: &AppliedOps,
        previous: &ConfigurationSet,
        rollback_errors: &mut Vec<String>,
    ) {
        for name in ops.added.iter().rev() {
            if let Err(error) = self.pools.remove_database(name).await {
                rollback_errors.push(format!("rollback remove database '{}': {}", name, error));
            }
        }
        for name in &ops.modified {
            match previous.databases().get(name) {
                Some(config) => {
                    if let Err(error) = self.pools.update_database(config).await {
                        rollback_errors
                            .push(format!("rollback restore database '{}': {}", name, error));
                    }
                }
                None => rollback_errors.push(format!(
                    "rollback restore database '{}': no previous configuration",
                    name
                )),
            }
        }
        for name in &ops.removed {
            match previous.databases().get(name) {
                Some(config) => {
                    if let Err(error) = self.pools.add_database(config).await {
                        rollback_errors
                            .push(format!("rollback re-add database '{}': {}", name, error));
                    }
                }
                None => rollback_errors.push(format!(
                    "rollback re-add database '{}': no previous configuration",
                    name
                )),
            }
        }
        if !rollback_errors.is_empty() {
            warn!(errors = rollback_errors.len(), "Database rollback completed with errors");
        }
    }

    /// Symmetric compensation for the endpoint phase.
    fn rollback_endpoints(
        &self,
        ops: &AppliedOps,
        previous: &ConfigurationSet,
        rollback_errors: &mut Vec<String>,
    ) {
        for name in ops.added.iter().rev() {
            if let Err(error) = self.registry.unregister_endpoint(name) {
                rollback_errors.push(format!("rollback unregister endpoint '{}': {}", name, error));
            }
        }
        for name in ops.modified.iter().chain(ops.removed.iter()) {
            match previous.endpoints().get(name) {
                Some(config) => {
                    let restore = if self.registry.is_registered(name) {
                        self.registry.update_endpoint(name, config.clone())
                    } else {
                        self.registry.register_endpoint(name, config.clone())
                    };
                    if let Err(error) = restore {
                        rollback_errors
                            .push(format!("rollback restore endpoint '{}': {}", name, error));
                    }
                }
                None => rollback_errors.push(format!(
                    "rollback restore endpoint '{}': no previous configuration",
                    name
                )),
            }
        }
        if !rollback_errors.is_empty() {
            warn!(errors = rollback_errors.len(), "Endpoint rollback completed with errors");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applied_ops_labels() {
        let ops = AppliedOps {
            added: vec!["a".to_string()],
            modified: vec!["m".to_string()],
            removed: vec!["r".to_string()],
        };
        assert_eq!(
            ops.labels(),
            vec!["added:a".to_string(), "modified:m".to_string(), "removed:r".to_string()]
        );
    }

    #[test]
    fn test_failure_serialization_uses_taxonomy_names() {
        let json = serde_json::to_string(&UpdateFailure::DatabaseApplyFailed).unwrap();
        assert_eq!(json, "\"DATABASE_APPLY_FAILED\"");
        let json = serde_json::to_string(&UpdateFailure::ConcurrentUpdate).unwrap();
        assert_eq!(json, "\"CONCURRENT_UPDATE\"");
    }
}
