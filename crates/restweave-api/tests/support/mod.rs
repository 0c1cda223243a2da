//! Shared fakes and fixture builders for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use restweave_api::pool::{DatabasePoolManager, PoolError};
use restweave_api::registry::{
    EndpointHandler, HttpRouter, QueryExecutionError, QueryExecutor, QueryParams, RouterError,
};
use restweave_core::error::HotReloadError;
use restweave_core::loader::ConfigurationSource;
use restweave_core::model::{
    ConfigurationSet, DatabaseConfig, EndpointConfig, HttpMethod, PoolOptions, QueryConfig,
};

pub fn database(name: &str) -> DatabaseConfig {
    DatabaseConfig {
        name: name.to_string(),
        url: format!("postgres://localhost/{}", name),
        driver: "postgres".to_string(),
        username: None,
        password: None,
        pool: PoolOptions::default(),
    }
}

pub fn query(name: &str, db: &str) -> QueryConfig {
    QueryConfig {
        name: name.to_string(),
        database: db.to_string(),
        sql: format!("SELECT * FROM {}", name),
        parameters: vec![],
    }
}

pub fn endpoint(name: &str, path: &str, q: &str) -> EndpointConfig {
    EndpointConfig {
        name: name.to_string(),
        path: path.to_string(),
        method: HttpMethod::Get,
        query: q.to_string(),
        pagination: None,
        description: None,
    }
}

pub fn build_set(
    databases: &[DatabaseConfig],
    queries: &[QueryConfig],
    endpoints: &[EndpointConfig],
) -> ConfigurationSet {
    ConfigurationSet::new(
        databases
            .iter()
            .map(|config| (config.name.clone(), config.clone()))
            .collect(),
        queries
            .iter()
            .map(|config| (config.name.clone(), config.clone()))
            .collect(),
        endpoints
            .iter()
            .map(|config| (config.name.clone(), config.clone()))
            .collect(),
    )
}

/// The userdb / q1 / e1 baseline used across scenarios.
pub fn baseline_set() -> ConfigurationSet {
    build_set(
        &[database("userdb")],
        &[query("q1", "userdb")],
        &[endpoint("e1", "/users", "q1")],
    )
}

/// Pool manager fake that records operations and can fail on demand.
#[derive(Default)]
pub struct RecordingPool {
    operations: Mutex<Vec<String>>,
    managed: Mutex<HashSet<String>>,
    fail_on: Mutex<Option<String>>,
    delay_ms: Mutex<u64>,
}

impl RecordingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slow every mutation down, to hold the update gate open in
    /// concurrency tests.
    pub fn set_delay(&self, delay_ms: u64) {
        *self.delay_ms.lock().unwrap() = delay_ms;
    }

    async fn pause(&self) {
        let delay = *self.delay_ms.lock().unwrap();
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
    }

    /// Fail the operation with the given label, e.g. `add:analyticsdb`.
    pub fn fail_on(&self, label: &str) {
        *self.fail_on.lock().unwrap() = Some(label.to_string());
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }

    pub fn managed(&self) -> HashSet<String> {
        self.managed.lock().unwrap().clone()
    }

    pub fn preload(&self, names: &[&str]) {
        let mut managed = self.managed.lock().unwrap();
        for name in names {
            managed.insert((*name).to_string());
        }
    }

    fn check_failure(&self, label: &str) -> Result<(), PoolError> {
        let fail_on = self.fail_on.lock().unwrap();
        if fail_on.as_deref() == Some(label) {
            return Err(PoolError::PoolCreation {
                name: label.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DatabasePoolManager for RecordingPool {
    async fn add_database(&self, config: &DatabaseConfig) -> Result<(), PoolError> {
        let label = format!("add:{}", config.name);
        self.pause().await;
        self.check_failure(&label)?;
        self.operations.lock().unwrap().push(label);
        self.managed.lock().unwrap().insert(config.name.clone());
        Ok(())
    }

    async fn update_database(&self, config: &DatabaseConfig) -> Result<(), PoolError> {
        let label = format!("update:{}", config.name);
        self.check_failure(&label)?;
        self.operations.lock().unwrap().push(label);
        Ok(())
    }

    async fn remove_database(&self, name: &str) -> Result<(), PoolError> {
        let label = format!("remove:{}", name);
        self.check_failure(&label)?;
        self.operations.lock().unwrap().push(label);
        self.managed.lock().unwrap().remove(name);
        Ok(())
    }

    async fn has_database(&self, name: &str) -> bool {
        self.managed.lock().unwrap().contains(name)
    }

    async fn test_connection(&self, _config: &DatabaseConfig) -> Result<(), PoolError> {
        Ok(())
    }
}

/// Configuration source whose next result is swappable from the test body.
pub struct StubSource {
    next: Mutex<Result<ConfigurationSet, String>>,
}

impl StubSource {
    pub fn new(set: ConfigurationSet) -> Self {
        Self {
            next: Mutex::new(Ok(set)),
        }
    }

    pub fn set_next(&self, set: ConfigurationSet) {
        *self.next.lock().unwrap() = Ok(set);
    }

    pub fn fail_with(&self, message: &str) {
        *self.next.lock().unwrap() = Err(message.to_string());
    }
}

impl ConfigurationSource for StubSource {
    fn load(&self, _specific_files: &[PathBuf]) -> Result<ConfigurationSet, HotReloadError> {
        self.next
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| HotReloadError::Parse { message })
    }
}

/// Executor that returns an empty result set for every request.
pub struct NullExecutor;

#[async_trait]
impl QueryExecutor for NullExecutor {
    async fn execute(
        &self,
        _endpoint: &EndpointConfig,
        _query: &QueryConfig,
        _params: QueryParams,
    ) -> Result<serde_json::Value, QueryExecutionError> {
        Ok(serde_json::json!([]))
    }
}

/// Router wrapper that rejects installs for configured paths; used to make
/// the endpoint phase fail partway through a batch.
pub struct FlakyRouter {
    inner: restweave_api::registry::DispatchRouter,
    fail_paths: Mutex<HashSet<String>>,
}

impl FlakyRouter {
    pub fn new() -> Self {
        Self {
            inner: restweave_api::registry::DispatchRouter::new(),
            fail_paths: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_install_for(&self, path: &str) {
        self.fail_paths.lock().unwrap().insert(path.to_string());
    }
}

impl HttpRouter for FlakyRouter {
    fn install_route(
        &self,
        method: HttpMethod,
        path: &str,
        handler: Arc<EndpointHandler>,
    ) -> Result<(), RouterError> {
        if self.fail_paths.lock().unwrap().contains(path) {
            return Err(RouterError::Install {
                method,
                path: path.to_string(),
                message: "injected install failure".to_string(),
            });
        }
        self.inner.install_route(method, path, handler)
    }

    fn remove_route(&self, method: HttpMethod, path: &str) -> Result<(), RouterError> {
        self.inner.remove_route(method, path)
    }

    fn has_route(&self, method: HttpMethod, path: &str) -> bool {
        self.inner.has_route(method, path)
    }

    fn route_count(&self) -> usize {
        self.inner.route_count()
    }
}

/// Router that cannot remove routes; deregistration must stay logical.
pub struct PinnedRouter {
    inner: restweave_api::registry::DispatchRouter,
}

impl PinnedRouter {
    pub fn new() -> Self {
        Self {
            inner: restweave_api::registry::DispatchRouter::new(),
        }
    }

    pub fn lookup(
        &self,
        method: HttpMethod,
        path: &str,
    ) -> Option<Arc<EndpointHandler>> {
        self.inner.lookup(method, path)
    }
}

impl HttpRouter for PinnedRouter {
    fn install_route(
        &self,
        method: HttpMethod,
        path: &str,
        handler: Arc<EndpointHandler>,
    ) -> Result<(), RouterError> {
        self.inner.install_route(method, path, handler)
    }

    fn remove_route(&self, _method: HttpMethod, _path: &str) -> Result<(), RouterError> {
        Err(RouterError::RemovalUnsupported)
    }

    fn has_route(&self, method: HttpMethod, path: &str) -> bool {
        self.inner.has_route(method, path)
    }

    fn route_count(&self) -> usize {
        self.inner.route_count()
    }
}
