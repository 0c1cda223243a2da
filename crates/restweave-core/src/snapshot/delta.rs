//! Delta computation between configuration sets.
//!
//! A delta is the nine-way partition `{added, modified, removed} ×
//! {databases, queries, endpoints}`. Within a kind, no name appears in more
//! than one class. "Modified" is decided by structural equality; SQL text is
//! compared literally.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::{ConfigurationSet, DatabaseConfig, EndpointConfig, QueryConfig};

/// Added/modified/removed partition for one configuration kind.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaKind<T> {
    pub added: HashMap<String, T>,
    pub modified: HashMap<String, T>,
    pub removed: HashSet<String>,
}

impl<T> Default for DeltaKind<T> {
    fn default() -> Self {
        Self {
            added: HashMap::new(),
            modified: HashMap::new(),
            removed: HashSet::new(),
        }
    }
}

impl<T: Clone + PartialEq> DeltaKind<T> {
    /// Partition `new` against `old`. An absent `old` classifies the entire
    /// new mapping as added.
    pub fn compute(old: Option<&HashMap<String, T>>, new: &HashMap<String, T>) -> Self {
        let mut delta = Self::default();
        match old {
            None => {
                delta.added = new.clone();
            }
            Some(previous) => {
                for (name, config) in new {
                    match previous.get(name) {
                        None => {
                            delta.added.insert(name.clone(), config.clone());
                        }
                        Some(existing) if existing != config => {
                            delta.modified.insert(name.clone(), config.clone());
                        }
                        Some(_) => {}
                    }
                }
                for name in previous.keys() {
                    if !new.contains_key(name) {
                        delta.removed.insert(name.clone());
                    }
                }
            }
        }
        delta
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    /// Apply this partition to a base mapping, producing the post-apply
    /// mapping.
    pub fn apply_to(&self, base: &HashMap<String, T>) -> HashMap<String, T> {
        let mut result = base.clone();
        for name in &self.removed {
            result.remove(name);
        }
        for (name, config) in &self.modified {
            result.insert(name.clone(), config.clone());
        }
        for (name, config) in &self.added {
            result.insert(name.clone(), config.clone());
        }
        result
    }
}

/// The full partition describing how one configuration set differs from
/// another.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigurationDelta {
    pub databases: DeltaKind<DatabaseConfig>,
    pub queries: DeltaKind<QueryConfig>,
    pub endpoints: DeltaKind<EndpointConfig>,
}

impl ConfigurationDelta {
    /// Compute the delta from `old` (any prior set, possibly absent) to the
    /// proposed `new` set.
    pub fn between(old: Option<&ConfigurationSet>, new: &ConfigurationSet) -> Self {
        Self {
            databases: DeltaKind::compute(old.map(|set| set.databases()), new.databases()),
            queries: DeltaKind::compute(old.map(|set| set.queries()), new.queries()),
            endpoints: DeltaKind::compute(old.map(|set| set.endpoints()), new.endpoints()),
        }
    }

    pub fn total_changes(&self) -> usize {
        self.databases.change_count() + self.queries.change_count() + self.endpoints.change_count()
    }

    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }

    /// Apply the delta to a base set, producing the post-apply set.
    pub fn apply_to(&self, base: &ConfigurationSet) -> ConfigurationSet {
        ConfigurationSet::new(
            self.databases.apply_to(base.databases()),
            self.queries.apply_to(base.queries()),
            self.endpoints.apply_to(base.endpoints()),
        )
    }

    /// Compact change summary for log lines, e.g. `db +1/~0/-0 q +1/~0/-0 ep +1/~0/-0`.
    pub fn summary(&self) -> String {
        format!(
            "db +{}/~{}/-{} q +{}/~{}/-{} ep +{}/~{}/-{}",
            self.databases.added.len(),
            self.databases.modified.len(),
            self.databases.removed.len(),
            self.queries.added.len(),
            self.queries.modified.len(),
            self.queries.removed.len(),
            self.endpoints.added.len(),
            self.endpoints.modified.len(),
            self.endpoints.removed.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpMethod, PoolOptions};

    fn database(name: &str, url: &str) -> DatabaseConfig {
        DatabaseConfig {
            name: name.to_string(),
            url: url.to_string(),
            driver: "postgres".to_string(),
            username: None,
            password: None,
            pool: PoolOptions::default(),
        }
    }

    fn query(name: &str, db: &str, sql: &str) -> QueryConfig {
        QueryConfig {
            name: name.to_string(),
            database: db.to_string(),
            sql: sql.to_string(),
            parameters: vec![],
        }
    }

    fn endpoint(name: &str, path: &str, q: &str) -> EndpointConfig {
        EndpointConfig {
            name: name.to_string(),
            path: path.to_string(),
            method: HttpMethod::Get,
            query: q.to_string(),
            pagination: None,
            description: None,
        }
    }

    fn set(
        databases: Vec<DatabaseConfig>,
        queries: Vec<QueryConfig>,
        endpoints: Vec<EndpointConfig>,
    ) -> ConfigurationSet {
        ConfigurationSet::new(
            databases
                .into_iter()
                .map(|config| (config.name.clone(), config))
                .collect(),
            queries
                .into_iter()
                .map(|config| (config.name.clone(), config))
                .collect(),
            endpoints
                .into_iter()
                .map(|config| (config.name.clone(), config))
                .collect(),
        )
    }

    #[test]
    fn test_absent_old_classifies_everything_as_added() {
        let new = set(
            vec![database("userdb", "postgres://localhost/users")],
            vec![query("q1", "userdb", "SELECT 1")],
            vec![endpoint("e1", "/users", "q1")],
        );
        let delta = ConfigurationDelta::between(None, &new);
        assert_eq!(delta.databases.added.len(), 1);
        assert_eq!(delta.queries.added.len(), 1);
        assert_eq!(delta.endpoints.added.len(), 1);
        assert_eq!(delta.total_changes(), 3);
        assert!(delta.databases.modified.is_empty());
        assert!(delta.databases.removed.is_empty());
    }

    #[test]
    fn test_identical_sets_yield_empty_delta() {
        let base = set(
            vec![database("userdb", "postgres://localhost/users")],
            vec![query("q1", "userdb", "SELECT 1")],
            vec![endpoint("e1", "/users", "q1")],
        );
        let delta = ConfigurationDelta::between(Some(&base), &base.clone());
        assert!(delta.is_empty());
        assert_eq!(delta.total_changes(), 0);
    }

    #[test]
    fn test_modified_detected_by_structural_inequality() {
        let old = set(vec![], vec![query("q1", "userdb", "SELECT 1")], vec![]);
        let new = set(vec![], vec![query("q1", "userdb", "SELECT  1")], vec![]);
        let delta = ConfigurationDelta::between(Some(&old), &new);
        assert_eq!(delta.queries.modified.len(), 1);
        assert!(delta.queries.added.is_empty());
        assert!(delta.queries.removed.is_empty());
    }

    #[test]
    fn test_removed_entries_become_name_sets() {
        let old = set(
            vec![
                database("userdb", "postgres://localhost/users"),
                database("olddb", "postgres://localhost/old"),
            ],
            vec![],
            vec![],
        );
        let new = set(vec![database("userdb", "postgres://localhost/users")], vec![], vec![]);
        let delta = ConfigurationDelta::between(Some(&old), &new);
        assert_eq!(delta.databases.removed.len(), 1);
        assert!(delta.databases.removed.contains("olddb"));
    }

    #[test]
    fn test_classes_are_disjoint_within_a_kind() {
        let old = set(
            vec![database("a", "postgres://a"), database("b", "postgres://b")],
            vec![],
            vec![],
        );
        let new = set(
            vec![database("b", "postgres://b-changed"), database("c", "postgres://c")],
            vec![],
            vec![],
        );
        let delta = ConfigurationDelta::between(Some(&old), &new);

        let added: HashSet<_> = delta.databases.added.keys().cloned().collect();
        let modified: HashSet<_> = delta.databases.modified.keys().cloned().collect();
        let removed = delta.databases.removed.clone();
        assert!(added.is_disjoint(&modified));
        assert!(added.is_disjoint(&removed));
        assert!(modified.is_disjoint(&removed));
    }

    #[test]
    fn test_delta_completeness_law() {
        // Applying the delta computed from (old, new) onto old yields new.
        let old = set(
            vec![database("a", "postgres://a"), database("b", "postgres://b")],
            vec![query("q1", "a", "SELECT 1"), query("q2", "b", "SELECT 2")],
            vec![endpoint("e1", "/one", "q1")],
        );
        let new = set(
            vec![database("b", "postgres://b-changed"), database("c", "postgres://c")],
            vec![query("q2", "b", "SELECT 2")],
            vec![endpoint("e1", "/one", "q1"), endpoint("e2", "/two", "q2")],
        );
        let delta = ConfigurationDelta::between(Some(&old), &new);
        assert_eq!(delta.apply_to(&old), new);
    }
}
