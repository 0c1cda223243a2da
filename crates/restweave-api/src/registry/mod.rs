//! Authoritative map of live endpoints.
//!
//! The registry is the sole owner of the live endpoint map and mediates
//! every register/unregister/update against the externally supplied
//! [`HttpRouter`]. Deregistration is logical: the entry is flagged inactive
//! and removed from the map, and the per-request lookup in
//! [`handler::EndpointHandler`] yields 404 whether or not the router was
//! able to remove the route.
//!
//! Batch mutations go through the `begin/commit/rollback` gate; `begin`
//! captures the full entry set so `rollback` can restore it and re-align
//! the router.

pub mod handler;
pub mod router;

pub use handler::{
    EndpointHandler, HandlerResponse, QueryExecutionError, QueryExecutor, QueryParams,
};
pub use router::{DispatchRouter, HttpRouter, RouterError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use restweave_core::error::HotReloadError;
use restweave_core::model::EndpointConfig;
use restweave_core::snapshot::SnapshotStore;

/// A live endpoint owned by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredEndpoint {
    pub name: String,
    pub config: EndpointConfig,
    pub active: bool,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No router configured; call set_router before registering endpoints")]
    RouterNotSet,

    #[error("Endpoint already registered: {name}")]
    DuplicateEndpoint { name: String },

    #[error("Endpoint not registered: {name}")]
    UnknownEndpoint { name: String },

    #[error("Failed to install route for endpoint {name}: {message}")]
    RouteInstall { name: String, message: String },

    /// An update removed the old registration but could not install the new
    /// one; the endpoint is gone and the caller must treat this as fatal.
    #[error("Endpoint {name} was unregistered but re-registration failed: {message}")]
    Reregistration { name: String, message: String },
}

impl From<RegistryError> for HotReloadError {
    fn from(error: RegistryError) -> Self {
        HotReloadError::Registry {
            message: error.to_string(),
        }
    }
}

/// Result of [`EndpointRegistry::validate_all_endpoints`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct EndpointValidationReport {
    pub valid: Vec<String>,
    pub inactive: Vec<String>,
    pub invalid: HashMap<String, String>,
}

impl EndpointValidationReport {
    pub fn is_healthy(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Sole owner of the live endpoint map.
pub struct EndpointRegistry {
    endpoints: Arc<DashMap<String, RegisteredEndpoint>>,
    router: RwLock<Option<Arc<dyn HttpRouter>>>,
    // Handlers resolve their query against the current snapshot on every
    // request.
    store: Arc<SnapshotStore>,
    executor: Arc<dyn QueryExecutor>,
    // Entry set captured at begin_atomic_update, restored on rollback.
    checkpoint: Mutex<Option<HashMap<String, RegisteredEndpoint>>>,
    batch_active: AtomicBool,
}

impl EndpointRegistry {
    pub fn new(store: Arc<SnapshotStore>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            endpoints: Arc::new(DashMap::new()),
            router: RwLock::new(None),
            store,
            executor,
            checkpoint: Mutex::new(None),
            batch_active: AtomicBool::new(false),
        }
    }

    /// Mandatory before the first registration.
    pub fn set_router(&self, router: Arc<dyn HttpRouter>) {
        *self
            .router
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(router);
    }

    fn router(&self) -> Option<Arc<dyn HttpRouter>> {
        self.router
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Install a route for the endpoint and record it as active.
    pub fn register_endpoint(
        &self,
        name: &str,
        config: EndpointConfig,
    ) -> Result<(), RegistryError> {
        let router = self.router().ok_or(RegistryError::RouterNotSet)?;
        if self.endpoints.contains_key(name) {
            return Err(RegistryError::DuplicateEndpoint {
                name: name.to_string(),
            });
        }

        let handler = Arc::new(EndpointHandler::new(
            name.to_string(),
            Arc::clone(&self.endpoints),
            Arc::clone(&self.store),
            Arc::clone(&self.executor),
        ));
        router
            .install_route(config.method, &config.path, handler)
            .map_err(|error| RegistryError::RouteInstall {
                name: name.to_string(),
                message: error.to_string(),
            })?;

        self.endpoints.insert(
            name.to_string(),
            RegisteredEndpoint {
                name: name.to_string(),
                config: config.clone(),
                active: true,
                registered_at: Utc::now(),
            },
        );
        info!(endpoint = name, method = %config.method, path = %config.path, "Registered endpoint");
        Ok(())
    }

    /// Logically deregister: mark inactive, then drop from the live map.
    /// Route removal is attempted but a router without removal support
    /// still yields 404 through the handler-side active check.
    pub fn unregister_endpoint(&self, name: &str) -> Result<(), RegistryError> {
        let config = {
            let Some(mut entry) = self.endpoints.get_mut(name) else {
                return Err(RegistryError::UnknownEndpoint {
                    name: name.to_string(),
                });
            };
            entry.active = false;
            entry.config.clone()
        };

        if let Some(router) = self.router() {
            match router.remove_route(config.method, &config.path) {
                Ok(()) => {}
                Err(RouterError::RemovalUnsupported) => {
                    debug!(endpoint = name, "Router cannot remove routes; deregistration is logical");
                }
                Err(error) => {
                    warn!(endpoint = name, %error, "Route removal failed; deregistration is logical");
                }
            }
        }

        self.endpoints.remove(name);
        info!(endpoint = name, "Unregistered endpoint");
        Ok(())
    }

    /// Replace an endpoint's configuration: unregister, then register the
    /// new config. A failed re-registration is surfaced as
    /// [`RegistryError::Reregistration`] because the endpoint is no longer
    /// live at that point.
    pub fn update_endpoint(
        &self,
        name: &str,
        new_config: EndpointConfig,
    ) -> Result<(), RegistryError> {
        self.unregister_endpoint(name)?;
        self.register_endpoint(name, new_config)
            .map_err(|error| RegistryError::Reregistration {
                name: name.to_string(),
                message: error.to_string(),
            })
    }

    /// Open the batch gate. Returns false when a batch is already in
    /// progress.
    pub fn begin_atomic_update(&self) -> bool {
        if self
            .batch_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let snapshot: HashMap<String, RegisteredEndpoint> = self
            .endpoints
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        *self
            .checkpoint
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot);
        debug!("Endpoint registry batch opened");
        true
    }

    /// Close the gate, discarding the checkpoint.
    pub fn commit_atomic_update(&self) -> bool {
        let was_active = self
            .batch_active
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if was_active {
            *self
                .checkpoint
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
            debug!("Endpoint registry batch committed");
        }
        was_active
    }

    /// Restore the entry set captured at `begin_atomic_update` and re-align
    /// the router with it.
    pub fn rollback_atomic_update(&self) -> bool {
        let checkpoint = {
            self.checkpoint
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take()
        };
        let Some(checkpoint) = checkpoint else {
            self.batch_active.store(false, Ordering::SeqCst);
            return false;
        };

        let router = self.router();
        // Routes added during the failed batch point at names that will no
        // longer resolve; remove them where the router allows it.
        if let Some(router) = &router {
            for entry in self.endpoints.iter() {
                if !checkpoint.contains_key(entry.key()) {
                    let config = &entry.value().config;
                    let _ = router.remove_route(config.method, &config.path);
                }
            }
        }

        self.endpoints.clear();
        for (name, endpoint) in checkpoint {
            if let Some(router) = &router {
                let handler = Arc::new(EndpointHandler::new(
                    name.clone(),
                    Arc::clone(&self.endpoints),
                    Arc::clone(&self.store),
                    Arc::clone(&self.executor),
                ));
                if let Err(error) =
                    router.install_route(endpoint.config.method, &endpoint.config.path, handler)
                {
                    warn!(endpoint = %name, %error, "Failed to re-install route during rollback");
                }
            }
            self.endpoints.insert(name, endpoint);
        }

        self.batch_active.store(false, Ordering::SeqCst);
        info!("Endpoint registry batch rolled back");
        true
    }

    pub fn batch_in_progress(&self) -> bool {
        self.batch_active.load(Ordering::SeqCst)
    }

    /// Health report over every live entry.
    pub fn validate_all_endpoints(&self) -> EndpointValidationReport {
        let router = self.router();
        let mut report = EndpointValidationReport::default();
        for entry in self.endpoints.iter() {
            let endpoint = entry.value();
            if !endpoint.active {
                report.inactive.push(endpoint.name.clone());
                continue;
            }
            if !endpoint.config.path.starts_with('/') {
                report.invalid.insert(
                    endpoint.name.clone(),
                    format!("path '{}' does not start with '/'", endpoint.config.path),
                );
                continue;
            }
            if let Some(router) = &router {
                if !router.has_route(endpoint.config.method, &endpoint.config.path) {
                    report.invalid.insert(
                        endpoint.name.clone(),
                        "route missing from router".to_string(),
                    );
                    continue;
                }
            }
            report.valid.push(endpoint.name.clone());
        }
        report
    }

    /// Defensive copy of the live endpoint map.
    pub fn active_endpoints(&self) -> HashMap<String, RegisteredEndpoint> {
        self.endpoints
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    pub fn endpoint(&self, name: &str) -> Option<RegisteredEndpoint> {
        self.endpoints.get(name).map(|entry| entry.value().clone())
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }
}
