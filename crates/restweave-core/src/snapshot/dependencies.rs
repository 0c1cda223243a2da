//! Referential-integrity checks over a proposed delta.
//!
//! The relation is `Endpoint → Query → Database`. Added and modified entries
//! must point at names present in the post-apply set; removals are legal
//! only when nothing in the post-apply set still references the removed
//! name.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{DatabaseConfig, EndpointConfig, QueryConfig};
use crate::snapshot::ConfigurationDelta;

/// Outcome of dependency validation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl DependencyReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a delta against the full post-apply mappings.
///
/// `all_databases`, `all_queries`, and `all_endpoints` are the proposed
/// (post-apply) sets, not the pre-apply ones: removal legality is defined in
/// terms of what remains.
pub fn validate_dependencies(
    delta: &ConfigurationDelta,
    all_databases: &HashMap<String, DatabaseConfig>,
    all_queries: &HashMap<String, QueryConfig>,
    all_endpoints: &HashMap<String, EndpointConfig>,
) -> DependencyReport {
    let mut report = DependencyReport::default();

    for query in delta
        .queries
        .added
        .values()
        .chain(delta.queries.modified.values())
    {
        if !all_databases.contains_key(&query.database) {
            report.errors.push(format!(
                "query '{}' references unknown database '{}'",
                query.name, query.database
            ));
        }
    }

    for endpoint in delta
        .endpoints
        .added
        .values()
        .chain(delta.endpoints.modified.values())
    {
        if !all_queries.contains_key(&endpoint.query) {
            report.errors.push(format!(
                "endpoint '{}' references unknown query '{}'",
                endpoint.name, endpoint.query
            ));
        }
    }

    for removed in &delta.databases.removed {
        for query in all_queries.values() {
            if &query.database == removed {
                report.errors.push(format!(
                    "cannot remove database '{}' — referenced by query '{}'",
                    removed, query.name
                ));
            }
        }
    }

    for removed in &delta.queries.removed {
        for endpoint in all_endpoints.values() {
            if &endpoint.query == removed {
                report.errors.push(format!(
                    "cannot remove query '{}' — referenced by endpoint '{}'",
                    removed, endpoint.name
                ));
            }
        }
    }

    for name in delta.databases.added.keys() {
        let referenced = all_queries.values().any(|query| &query.database == name);
        if !referenced {
            report
                .warnings
                .push(format!("database '{}' is not referenced by any query", name));
        }
    }

    for name in delta.queries.added.keys() {
        let referenced = all_endpoints.values().any(|endpoint| &endpoint.query == name);
        if !referenced {
            report
                .warnings
                .push(format!("query '{}' is not referenced by any endpoint", name));
        }
    }

    report
}
