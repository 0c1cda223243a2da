//! Router abstraction and the shipped dispatch-table implementation.
//!
//! Many HTTP frameworks cannot add or remove routes after the server has
//! started. The registry therefore talks to a small [`HttpRouter`] trait,
//! and the shipped [`DispatchRouter`] is an in-process route table consulted
//! by a catch-all service at request time, which makes both install and
//! remove cheap map operations. Routers that genuinely cannot remove routes
//! return [`RouterError::RemovalUnsupported`]; the handler-side active check
//! still yields 404 for logically deregistered endpoints.

use std::sync::Arc;

use dashmap::DashMap;

use restweave_core::model::HttpMethod;

use super::handler::EndpointHandler;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Router does not support route removal")]
    RemovalUnsupported,

    #[error("Failed to install route {method} {path}: {message}")]
    Install {
        method: HttpMethod,
        path: String,
        message: String,
    },
}

/// External collaborator interface: install, (optionally) remove, inspect.
pub trait HttpRouter: Send + Sync {
    fn install_route(
        &self,
        method: HttpMethod,
        path: &str,
        handler: Arc<EndpointHandler>,
    ) -> Result<(), RouterError>;

    fn remove_route(&self, method: HttpMethod, path: &str) -> Result<(), RouterError>;

    fn has_route(&self, method: HttpMethod, path: &str) -> bool;

    fn route_count(&self) -> usize;
}

type RouteKey = (HttpMethod, String);

/// Route table consulted by the host's catch-all service.
#[derive(Default)]
pub struct DispatchRouter {
    routes: DashMap<RouteKey, Arc<EndpointHandler>>,
}

impl DispatchRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the handler for an incoming request, if any.
    pub fn lookup(&self, method: HttpMethod, path: &str) -> Option<Arc<EndpointHandler>> {
        self.routes
            .get(&(method, path.to_string()))
            .map(|entry| Arc::clone(&entry))
    }
}

impl HttpRouter for DispatchRouter {
    fn install_route(
        &self,
        method: HttpMethod,
        path: &str,
        handler: Arc<EndpointHandler>,
    ) -> Result<(), RouterError> {
        self.routes.insert((method, path.to_string()), handler);
        Ok(())
    }

    fn remove_route(&self, method: HttpMethod, path: &str) -> Result<(), RouterError> {
        self.routes.remove(&(method, path.to_string()));
        Ok(())
    }

    fn has_route(&self, method: HttpMethod, path: &str) -> bool {
        self.routes.contains_key(&(method, path.to_string()))
    }

    fn route_count(&self) -> usize {
        self.routes.len()
    }
}
