//! Declarative configuration loading from YAML files.
//!
//! Each matched file carries one top-level mapping for its kind, keyed by
//! entity name:
//!
//! ```yaml
//! # stockdata-databases.yml
//! databases:
//!   userdb:
//!     url: "postgres://localhost/users"
//!     driver: "postgres"
//! ```
//!
//! The loader walks the configured directories, classifies files by name,
//! parses every matching file, and aggregates all parse failures into a
//! single error rather than stopping at the first. It performs no
//! referential checks; a loaded set may be referentially broken and the
//! snapshot rules will catch it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::HotReloadError;
use crate::files::{is_ignored, matches_any};
use crate::model::{ConfigKind, ConfigurationSet, DatabaseConfig, EndpointConfig, QueryConfig};

/// Parser boundary seam for the reload orchestrator.
///
/// `specific_files` is the trigger scope (the files whose change prompted
/// the reload); implementations may use it for logging but must always
/// return a full configuration set, since the orchestrator recomputes the
/// complete delta on every reload.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigurationSource: Send + Sync {
    fn load(&self, specific_files: &[PathBuf]) -> Result<ConfigurationSet, HotReloadError>;
}

#[derive(Debug, Deserialize)]
struct DatabasesFile {
    databases: HashMap<String, DatabaseConfig>,
}

#[derive(Debug, Deserialize)]
struct QueriesFile {
    queries: HashMap<String, QueryConfig>,
}

#[derive(Debug, Deserialize)]
struct EndpointsFile {
    endpoints: HashMap<String, EndpointConfig>,
}

/// YAML-backed [`ConfigurationSource`].
pub struct YamlConfigLoader {
    directories: Vec<PathBuf>,
    patterns: Vec<String>,
}

impl YamlConfigLoader {
    pub fn new(directories: Vec<PathBuf>, patterns: Vec<String>) -> Self {
        Self {
            directories,
            patterns,
        }
    }

    fn candidate_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for directory in &self.directories {
            let entries = match fs::read_dir(directory) {
                Ok(entries) => entries,
                Err(error) => {
                    warn!(directory = %directory.display(), %error, "Skipping unreadable config directory");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                    continue;
                };
                if is_ignored(name) || !matches_any(&self.patterns, name) {
                    continue;
                }
                files.push(path);
            }
        }
        files.sort();
        files
    }

    fn load_file(
        &self,
        path: &Path,
        set: &mut LoadedSet,
        errors: &mut Vec<String>,
    ) {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let kind = ConfigKind::from_file_name(name);
        if kind == ConfigKind::Unknown {
            warn!(file = %path.display(), "Matched file has no recognizable configuration kind; skipped");
            return;
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) => {
                errors.push(format!("{}: {}", path.display(), error));
                return;
            }
        };

        let result = match kind {
            ConfigKind::Database => serde_yaml::from_str::<DatabasesFile>(&content)
                .map_err(|error| error.to_string())
                .and_then(|file| set.merge_databases(path, file.databases)),
            ConfigKind::Query => serde_yaml::from_str::<QueriesFile>(&content)
                .map_err(|error| error.to_string())
                .and_then(|file| set.merge_queries(path, file.queries)),
            ConfigKind::Endpoint => serde_yaml::from_str::<EndpointsFile>(&content)
                .map_err(|error| error.to_string())
                .and_then(|file| set.merge_endpoints(path, file.endpoints)),
            ConfigKind::Unknown => unreachable!("unknown kind filtered above"),
        };

        if let Err(message) = result {
            errors.push(format!("{}: {}", path.display(), message));
        }
    }
}

impl ConfigurationSource for YamlConfigLoader {
    fn load(&self, specific_files: &[PathBuf]) -> Result<ConfigurationSet, HotReloadError> {
        if !specific_files.is_empty() {
            debug!(count = specific_files.len(), "Reload triggered by specific files; performing full scan");
        }

        let mut set = LoadedSet::default();
        let mut errors = Vec::new();
        let files = self.candidate_files();
        for path in &files {
            self.load_file(path, &mut set, &mut errors);
        }

        if !errors.is_empty() {
            return Err(HotReloadError::Parse {
                message: format!(
                    "{} configuration file(s) failed to load: {}",
                    errors.len(),
                    errors.join("; ")
                ),
            });
        }

        debug!(
            files = files.len(),
            databases = set.databases.len(),
            queries = set.queries.len(),
            endpoints = set.endpoints.len(),
            "Loaded declarative configuration"
        );
        Ok(ConfigurationSet::new(set.databases, set.queries, set.endpoints))
    }
}

/// Accumulator enforcing key/name agreement and cross-file uniqueness.
#[derive(Default)]
struct LoadedSet {
    databases: HashMap<String, DatabaseConfig>,
    queries: HashMap<String, QueryConfig>,
    endpoints: HashMap<String, EndpointConfig>,
}

impl LoadedSet {
    fn merge_databases(
        &mut self,
        path: &Path,
        entries: HashMap<String, DatabaseConfig>,
    ) -> Result<(), String> {
        for (key, mut config) in entries {
            reconcile_name("database", &key, &mut config.name)?;
            if self.databases.insert(key.clone(), config).is_some() {
                return Err(format!(
                    "duplicate database '{}' (also defined in an earlier file); file {}",
                    key,
                    path.display()
                ));
            }
        }
        Ok(())
    }

    fn merge_queries(
        &mut self,
        path: &Path,
        entries: HashMap<String, QueryConfig>,
    ) -> Result<(), String> {
        for (key, mut config) in entries {
            reconcile_name("query", &key, &mut config.name)?;
            if self.queries.insert(key.clone(), config).is_some() {
                return Err(format!(
                    "duplicate query '{}' (also defined in an earlier file); file {}",
                    key,
                    path.display()
                ));
            }
        }
        Ok(())
    }

    fn merge_endpoints(
        &mut self,
        path: &Path,
        entries: HashMap<String, EndpointConfig>,
    ) -> Result<(), String> {
        for (key, mut config) in entries {
            reconcile_name("endpoint", &key, &mut config.name)?;
            if self.endpoints.insert(key.clone(), config).is_some() {
                return Err(format!(
                    "duplicate endpoint '{}' (also defined in an earlier file); file {}",
                    key,
                    path.display()
                ));
            }
        }
        Ok(())
    }
}

/// The map key is authoritative; an inline `name` must agree with it.
fn reconcile_name(kind: &str, key: &str, name: &mut String) -> Result<(), String> {
    if name.is_empty() {
        *name = key.to_string();
        Ok(())
    } else if name != key {
        Err(format!(
            "{} entry keyed '{}' declares mismatching name '{}'",
            kind, key, name
        ))
    } else {
        Ok(())
    }
}
