//! Error handling for the hot-reload engine.
//!
//! All failure modes are variants of [`HotReloadError`]. Component-local
//! error enums (registry, pool, watcher) convert into it via `From` so that
//! the orchestrator and the host boundary deal with a single taxonomy.
//!
//! Failures are encoded in result values throughout the engine; only truly
//! unrecoverable faults (a watcher that cannot start at all, an invalid
//! process configuration) reach the host as errors from `initialize`.

use serde::{Deserialize, Serialize};

/// Result type with [`HotReloadError`].
pub type Result<T> = std::result::Result<T, HotReloadError>;

/// Error categories for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Transient errors that may succeed on retry (connectivity, apply).
    Transient,
    /// Permanent errors that won't succeed on retry without operator action.
    Permanent,
    /// User errors: malformed or referentially broken configuration files.
    User,
    /// System errors: infrastructure and OS-level faults.
    System,
}

/// Primary error type for all hot-reload operations.
#[derive(Debug, thiserror::Error)]
pub enum HotReloadError {
    /// A required field was empty or malformed in a proposed configuration.
    #[error("Configuration syntax error: {message}")]
    ConfigSyntax { message: String },

    /// A referential-integrity violation in the proposed configuration set.
    #[error("Dependency error: {message}")]
    Dependency { message: String },

    /// A database connectivity probe failed during validation.
    #[error("Connectivity check failed: {message}")]
    Connectivity { message: String },

    /// A runtime failure while mutating the database pool or the endpoint
    /// registry during apply.
    #[error("Apply failed: {message}")]
    Apply { message: String },

    /// A failure during a compensating rollback action. Never masks the
    /// original apply error; carried alongside it in result values.
    #[error("Rollback failed: {message}")]
    Rollback { message: String },

    /// A second writer attempted to enter the atomic update coordinator.
    #[error("Another update is already in progress")]
    ConcurrentUpdate,

    /// An OS-level watch failure scoped to a single directory.
    #[error("Watcher error: {message}")]
    Watcher { message: String },

    /// The watcher or orchestrator could not start at all.
    #[error("Initialization failed: {message}")]
    Initialization { message: String },

    /// Declarative files could not be parsed into a configuration set.
    #[error("Failed to parse configuration: {message}")]
    Parse { message: String },

    /// Endpoint registry operation failure.
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// Database pool operation failure.
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HotReloadError {
    /// Classify the error for logging and retry decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            HotReloadError::ConfigSyntax { .. }
            | HotReloadError::Dependency { .. }
            | HotReloadError::Parse { .. }
            | HotReloadError::Serialization(_) => ErrorCategory::User,
            HotReloadError::Connectivity { .. }
            | HotReloadError::Apply { .. }
            | HotReloadError::ConcurrentUpdate => ErrorCategory::Transient,
            HotReloadError::Rollback { .. } | HotReloadError::Initialization { .. } => {
                ErrorCategory::Permanent
            }
            HotReloadError::Watcher { .. }
            | HotReloadError::Registry { .. }
            | HotReloadError::Database { .. }
            | HotReloadError::Io(_) => ErrorCategory::System,
        }
    }

    /// Whether the orchestrator may retry after this error without operator
    /// intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::User
        )
    }

    pub fn config_syntax(message: impl Into<String>) -> Self {
        HotReloadError::ConfigSyntax {
            message: message.into(),
        }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        HotReloadError::Dependency {
            message: message.into(),
        }
    }

    pub fn apply(message: impl Into<String>) -> Self {
        HotReloadError::Apply {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        HotReloadError::Parse {
            message: message.into(),
        }
    }
}
