//! Per-endpoint request handling.
//!
//! Every generated endpoint is served by an [`EndpointHandler`] bound to a
//! stable name. On each request the handler looks its name up in the live
//! endpoint map; an absent or inactive entry yields 404 before any query
//! work happens. This indirection is what makes logical deregistration safe
//! on routers that cannot remove routes.
//!
//! The handler also resolves the endpoint's [`QueryConfig`] from the
//! current snapshot, so the execution seam receives both configurations and
//! never performs its own configuration lookups.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, warn};

use restweave_core::model::{EndpointConfig, QueryConfig};
use restweave_core::snapshot::SnapshotStore;

use super::RegisteredEndpoint;

/// Request-scoped inputs extracted by the host from the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    /// Raw parameter values keyed by declared parameter name.
    pub values: HashMap<String, String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl QueryParams {
    /// Build from a raw query-string map, splitting off the pagination
    /// parameters.
    pub fn from_raw(mut raw: HashMap<String, String>) -> Self {
        let page = raw.remove("page").and_then(|value| value.parse().ok());
        let page_size = raw.remove("page_size").and_then(|value| value.parse().ok());
        Self {
            values: raw,
            page,
            page_size,
        }
    }
}

/// Failures surfaced by the query-execution subsystem.
#[derive(Debug, thiserror::Error)]
pub enum QueryExecutionError {
    #[error("Unknown database: {name}")]
    UnknownDatabase { name: String },

    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },

    #[error("Invalid value for parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Query execution failed: {message}")]
    Execution { message: String },
}

/// Query-execution seam.
///
/// The handler resolves both configurations before dispatching; the
/// executor only binds parameters and runs SQL. Concrete implementations
/// are provided by the pool layer or the embedding application.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        endpoint: &EndpointConfig,
        query: &QueryConfig,
        params: QueryParams,
    ) -> Result<serde_json::Value, QueryExecutionError>;
}

/// Framework-agnostic response; the host maps it onto its HTTP types.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl HandlerResponse {
    fn not_found(name: &str) -> Self {
        Self {
            status: 404,
            body: json!({ "error": "endpoint not found", "endpoint": name }),
        }
    }
}

/// Handler bound to one endpoint name.
pub struct EndpointHandler {
    name: String,
    endpoints: Arc<DashMap<String, RegisteredEndpoint>>,
    store: Arc<SnapshotStore>,
    executor: Arc<dyn QueryExecutor>,
}

impl EndpointHandler {
    pub(super) fn new(
        name: String,
        endpoints: Arc<DashMap<String, RegisteredEndpoint>>,
        store: Arc<SnapshotStore>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            name,
            endpoints,
            store,
            executor,
        }
    }

    pub fn endpoint_name(&self) -> &str {
        &self.name
    }

    /// Serve one request. The live-map lookup happens per request so that a
    /// deregistered endpoint answers 404 even while its route is still
    /// installed.
    pub async fn handle(&self, params: QueryParams) -> HandlerResponse {
        let config = {
            match self.endpoints.get(&self.name) {
                Some(entry) if entry.active => entry.config.clone(),
                Some(_) => {
                    debug!(endpoint = %self.name, "Request for inactive endpoint");
                    return HandlerResponse::not_found(&self.name);
                }
                None => {
                    debug!(endpoint = %self.name, "Request for unregistered endpoint");
                    return HandlerResponse::not_found(&self.name);
                }
            }
        };

        // An active endpoint always points at a query in the committed
        // snapshot; a miss here means the host is mid-teardown.
        let query = self
            .store
            .current_snapshot()
            .and_then(|snapshot| snapshot.queries().get(&config.query).cloned());
        let Some(query) = query else {
            warn!(endpoint = %self.name, query = %config.query,
                  "Endpoint query missing from current snapshot");
            return HandlerResponse {
                status: 500,
                body: json!({ "error": format!("query '{}' is not available", config.query) }),
            };
        };

        match self.executor.execute(&config, &query, params).await {
            Ok(rows) => HandlerResponse {
                status: 200,
                body: json!({
                    "endpoint": config.name,
                    "data": rows,
                }),
            },
            Err(
                error @ (QueryExecutionError::MissingParameter { .. }
                | QueryExecutionError::InvalidParameter { .. }),
            ) => HandlerResponse {
                status: 400,
                body: json!({ "error": error.to_string() }),
            },
            Err(error) => {
                warn!(endpoint = %self.name, %error, "Query execution failed");
                HandlerResponse {
                    status: 500,
                    body: json!({ "error": error.to_string() }),
                }
            }
        }
    }
}
