//! Configuration model for the dynamic REST-API host.
//!
//! Three related configuration kinds drive the host: **databases**,
//! **queries**, and **endpoints**. Queries reference databases by name and
//! endpoints reference queries by name, forming the acyclic relation
//! `Endpoint → Query → Database`. All relations are name-keyed, so there
//! are no pointer cycles, and referential checks live in
//! [`crate::snapshot`], not here.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// HTTP methods a generated endpoint may be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// Every method the host supports.
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            other => Err(format!("unsupported HTTP method: {}", other)),
        }
    }
}

/// Connection-pool tuning for a configured database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Maximum number of pooled connections.
    pub max_size: u32,
    /// Minimum idle connections kept warm, if set.
    pub min_idle: Option<u32>,
    /// Seconds to wait for a connection before giving up.
    pub connection_timeout_secs: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: None,
            connection_timeout_secs: 30,
        }
    }
}

/// A named database connection definition.
///
/// Identified by `name`; removal rules for configurations that still
/// reference a database are enforced during dependency validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Unique name. When loaded from a file the map key wins; a mismatching
    /// inline `name` is a load error.
    #[serde(default)]
    pub name: String,
    pub url: String,
    pub driver: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub pool: PoolOptions,
}

/// Type of a declared query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Integer,
    Boolean,
}

impl Default for ParameterKind {
    fn default() -> Self {
        ParameterKind::String
    }
}

/// Descriptor for a single bindable query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    #[serde(default)]
    pub kind: ParameterKind,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// A named SQL query bound to a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub name: String,
    /// Name of the [`DatabaseConfig`] this query executes against.
    pub database: String,
    /// SQL text, compared literally (whitespace-sensitive) when computing
    /// modification deltas.
    pub sql: String,
    #[serde(default)]
    pub parameters: Vec<QueryParameter>,
}

/// Pagination behavior for an endpoint that opts in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub enabled: bool,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// A generated REST endpoint bound to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub name: String,
    /// Request path; must start with `/`.
    pub path: String,
    pub method: HttpMethod,
    /// Name of the [`QueryConfig`] this endpoint dispatches to.
    pub query: String,
    #[serde(default)]
    pub pagination: Option<PaginationConfig>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The three keyed configuration mappings, immutable once constructed.
///
/// Mutation means building a new set; published sets are shared behind
/// `Arc` and never written through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSet {
    databases: HashMap<String, DatabaseConfig>,
    queries: HashMap<String, QueryConfig>,
    endpoints: HashMap<String, EndpointConfig>,
}

impl ConfigurationSet {
    pub fn new(
        databases: HashMap<String, DatabaseConfig>,
        queries: HashMap<String, QueryConfig>,
        endpoints: HashMap<String, EndpointConfig>,
    ) -> Self {
        Self {
            databases,
            queries,
            endpoints,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn databases(&self) -> &HashMap<String, DatabaseConfig> {
        &self.databases
    }

    pub fn queries(&self) -> &HashMap<String, QueryConfig> {
        &self.queries
    }

    pub fn endpoints(&self) -> &HashMap<String, EndpointConfig> {
        &self.endpoints
    }

    pub fn total_entries(&self) -> usize {
        self.databases.len() + self.queries.len() + self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_entries() == 0
    }
}

/// Configuration kind inferred from a file name.
///
/// The inference is substring-based and case-insensitive so that naming
/// schemes like `stockdata-queries.yml` and `trade-api-endpoints.yml` both
/// classify without extra configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigKind {
    Database,
    Query,
    Endpoint,
    Unknown,
}

impl ConfigKind {
    /// Classify a file name. `endpoint`/`api` take precedence over `quer`,
    /// which takes precedence over `database`.
    pub fn from_file_name(file_name: &str) -> Self {
        let lower = file_name.to_lowercase();
        if lower.contains("endpoint") || lower.contains("api") {
            ConfigKind::Endpoint
        } else if lower.contains("quer") {
            ConfigKind::Query
        } else if lower.contains("database") {
            ConfigKind::Database
        } else {
            ConfigKind::Unknown
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigKind::Database => "database",
            ConfigKind::Query => "query",
            ConfigKind::Endpoint => "endpoint",
            ConfigKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}
