//! # Restweave Core
//!
//! Core primitives for the zero-downtime configuration hot-reload engine:
//!
//! - Configuration model for the three declarative kinds (databases,
//!   queries, endpoints) and their name-keyed relations
//! - Versioned snapshot store with bounded history and delta computation
//! - Referential-integrity rules over proposed deltas
//! - The staged validation pipeline (syntax, dependencies, connectivity,
//!   endpoint health)
//! - YAML loading of declarative files
//! - Settings for the whole subsystem
//!
//! The runtime pieces (file watching, the endpoint registry, atomic apply,
//! and the reload orchestrator) live in `restweave-api`.
//!
//! ## Example
//!
//! ```rust
//! use restweave_core::model::ConfigurationSet;
//! use restweave_core::snapshot::SnapshotStore;
//!
//! let store = SnapshotStore::new(10);
//! let set = ConfigurationSet::empty();
//! let version = store.create_from_set(&set);
//! let delta = store.calculate_delta(store.current_snapshot().as_deref(), &set);
//! assert!(delta.is_empty());
//! assert_eq!(store.current_snapshot().unwrap().version, version);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod files;
pub mod loader;
pub mod model;
pub mod snapshot;
pub mod validation;

// Re-export commonly used types
pub use config::HotReloadSettings;
pub use error::{ErrorCategory, HotReloadError, Result};
pub use model::{ConfigKind, ConfigurationSet, DatabaseConfig, EndpointConfig, HttpMethod, QueryConfig};
pub use snapshot::{ConfigurationDelta, ConfigurationSnapshot, SnapshotStore};
pub use validation::{ValidationPipeline, ValidationResult};

/// Current version of the hot-reload core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::HotReloadSettings;
    pub use crate::error::{HotReloadError, Result};
    pub use crate::loader::ConfigurationSource;
    pub use crate::model::{
        ConfigKind, ConfigurationSet, DatabaseConfig, EndpointConfig, HttpMethod, QueryConfig,
    };
    pub use crate::snapshot::{ConfigurationDelta, ConfigurationSnapshot, SnapshotStore};
    pub use crate::validation::{ValidationPipeline, ValidationResult};
}
