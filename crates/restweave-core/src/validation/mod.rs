//! Staged validation of a proposed configuration change.
//!
//! The pipeline runs ordered stages over a `(delta, proposed set)` pair:
//!
//! 1. **syntax**: required fields present and well-formed.
//! 2. **dependencies**: referential integrity via the snapshot rules.
//! 3. **connectivity**: parallel database probes under one aggregate
//!    deadline.
//! 4. **endpointHealth**: side-effect-free simulation of endpoint
//!    creation.
//!
//! Errors in stages 1 or 2 short-circuit the pipeline: stages 3 and 4 are
//! skipped entirely. Stages 3 and 4 run independently of each other. The
//! aggregate result is valid iff every stage that ran produced no errors.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{ConfigurationSet, DatabaseConfig};
use crate::snapshot::{validate_dependencies, ConfigurationDelta};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationStage {
    Syntax,
    Dependencies,
    Connectivity,
    EndpointHealth,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValidationStage::Syntax => "syntax",
            ValidationStage::Dependencies => "dependencies",
            ValidationStage::Connectivity => "connectivity",
            ValidationStage::EndpointHealth => "endpointHealth",
        };
        f.write_str(label)
    }
}

/// Outcome of a single stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: ValidationStage,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl StageResult {
    fn timed(stage: ValidationStage, started: Instant, errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            stage,
            errors,
            warnings,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Aggregate of every stage that ran.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub stages: Vec<StageResult>,
    pub total_duration_ms: u64,
    pub valid: bool,
}

impl ValidationResult {
    pub fn stage(&self, stage: ValidationStage) -> Option<&StageResult> {
        self.stages.iter().find(|result| result.stage == stage)
    }

    /// Flattened union of all stage errors.
    pub fn errors(&self) -> Vec<String> {
        self.stages
            .iter()
            .flat_map(|result| result.errors.iter().cloned())
            .collect()
    }

    /// Flattened union of all stage warnings.
    pub fn warnings(&self) -> Vec<String> {
        self.stages
            .iter()
            .flat_map(|result| result.warnings.iter().cloned())
            .collect()
    }
}

/// Seam for database connectivity checks.
///
/// Concrete implementations are provided by the pool layer; the pipeline
/// only needs a yes/no answer per database configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self, config: &DatabaseConfig) -> Result<(), String>;
}

/// Short-circuiting, staged validator.
pub struct ValidationPipeline {
    probe: Option<Arc<dyn ConnectivityProbe>>,
    connectivity_timeout: Duration,
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationPipeline {
    pub fn new() -> Self {
        Self {
            probe: None,
            connectivity_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_connectivity_timeout(mut self, timeout: Duration) -> Self {
        self.connectivity_timeout = timeout;
        self
    }

    /// Run the pipeline over a proposed change.
    pub async fn validate(
        &self,
        delta: &ConfigurationDelta,
        proposed: &ConfigurationSet,
    ) -> ValidationResult {
        let started = Instant::now();
        let mut stages = Vec::with_capacity(4);

        stages.push(self.run_syntax(delta));
        stages.push(self.run_dependencies(delta, proposed));

        let structural_errors = stages.iter().any(|result| !result.passed());
        if structural_errors {
            debug!("Skipping connectivity and endpoint health: structural validation failed");
        } else {
            stages.push(self.run_connectivity(delta).await);
            stages.push(self.run_endpoint_health(delta, proposed));
        }

        let valid = stages.iter().all(StageResult::passed);
        ValidationResult {
            stages,
            total_duration_ms: started.elapsed().as_millis() as u64,
            valid,
        }
    }

    fn run_syntax(&self, delta: &ConfigurationDelta) -> StageResult {
        let started = Instant::now();
        let mut errors = Vec::new();

        for config in delta
            .databases
            .added
            .values()
            .chain(delta.databases.modified.values())
        {
            if config.name.trim().is_empty() {
                errors.push("database with empty name".to_string());
            }
            if config.url.trim().is_empty() {
                errors.push(format!("database '{}': url must not be empty", config.name));
            }
            if config.driver.trim().is_empty() {
                errors.push(format!("database '{}': driver must not be empty", config.name));
            }
        }

        for config in delta
            .queries
            .added
            .values()
            .chain(delta.queries.modified.values())
        {
            if config.name.trim().is_empty() {
                errors.push("query with empty name".to_string());
            }
            if config.database.trim().is_empty() {
                errors.push(format!("query '{}': database must not be empty", config.name));
            }
            if config.sql.trim().is_empty() {
                errors.push(format!("query '{}': sql must not be empty", config.name));
            }
        }

        for config in delta
            .endpoints
            .added
            .values()
            .chain(delta.endpoints.modified.values())
        {
            if config.name.trim().is_empty() {
                errors.push("endpoint with empty name".to_string());
            }
            if config.path.trim().is_empty() {
                errors.push(format!("endpoint '{}': path must not be empty", config.name));
            } else if !config.path.starts_with('/') {
                errors.push(format!(
                    "endpoint '{}': path '{}' must start with '/'",
                    config.name, config.path
                ));
            }
            if config.query.trim().is_empty() {
                errors.push(format!("endpoint '{}': query must not be empty", config.name));
            }
        }

        StageResult::timed(ValidationStage::Syntax, started, errors, Vec::new())
    }

    fn run_dependencies(&self, delta: &ConfigurationDelta, proposed: &ConfigurationSet) -> StageResult {
        let started = Instant::now();
        let report = validate_dependencies(
            delta,
            proposed.databases(),
            proposed.queries(),
            proposed.endpoints(),
        );
        StageResult::timed(
            ValidationStage::Dependencies,
            started,
            report.errors,
            report.warnings,
        )
    }

    async fn run_connectivity(&self, delta: &ConfigurationDelta) -> StageResult {
        let started = Instant::now();
        let targets: Vec<&DatabaseConfig> = delta
            .databases
            .added
            .values()
            .chain(delta.databases.modified.values())
            .collect();

        if targets.is_empty() {
            return StageResult::timed(ValidationStage::Connectivity, started, Vec::new(), Vec::new());
        }

        let Some(probe) = self.probe.as_ref() else {
            warn!("No connectivity probe configured; skipping database probes");
            return StageResult::timed(
                ValidationStage::Connectivity,
                started,
                Vec::new(),
                vec!["connectivity probe not configured; databases were not probed".to_string()],
            );
        };

        let probes = targets.iter().map(|config| {
            let probe = Arc::clone(probe);
            async move {
                let outcome = probe.probe(config).await;
                (config.name.clone(), outcome)
            }
        });

        let mut errors = Vec::new();
        match tokio::time::timeout(self.connectivity_timeout, join_all(probes)).await {
            Ok(outcomes) => {
                for (name, outcome) in outcomes {
                    if let Err(reason) = outcome {
                        errors.push(format!("database '{}': {}", name, reason));
                    }
                }
            }
            Err(_) => {
                errors.push(format!(
                    "connectivity checks timed out after {}s",
                    self.connectivity_timeout.as_secs()
                ));
            }
        }

        StageResult::timed(ValidationStage::Connectivity, started, errors, Vec::new())
    }

    fn run_endpoint_health(&self, delta: &ConfigurationDelta, proposed: &ConfigurationSet) -> StageResult {
        let started = Instant::now();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Route-table simulation: a (method, path) pair may be claimed once.
        let mut routes: HashSet<(String, String)> = proposed
            .endpoints()
            .values()
            .filter(|config| {
                !delta.endpoints.added.contains_key(&config.name)
                    && !delta.endpoints.modified.contains_key(&config.name)
            })
            .map(|config| (config.method.to_string(), config.path.clone()))
            .collect();

        for config in delta
            .endpoints
            .added
            .values()
            .chain(delta.endpoints.modified.values())
        {
            if !proposed.queries().contains_key(&config.query) {
                errors.push(format!(
                    "endpoint '{}' cannot be created: query '{}' not present in proposed configuration",
                    config.name, config.query
                ));
            }
            if !routes.insert((config.method.to_string(), config.path.clone())) {
                errors.push(format!(
                    "endpoint '{}' collides with an existing route {} {}",
                    config.name, config.method, config.path
                ));
            }
            if let Some(pagination) = &config.pagination {
                if pagination.enabled && pagination.default_page_size > pagination.max_page_size {
                    warnings.push(format!(
                        "endpoint '{}': default_page_size {} exceeds max_page_size {}",
                        config.name, pagination.default_page_size, pagination.max_page_size
                    ));
                }
            }
        }

        StageResult::timed(ValidationStage::EndpointHealth, started, errors, warnings)
    }
}
