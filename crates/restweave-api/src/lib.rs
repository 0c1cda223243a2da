//! # Restweave API
//!
//! Runtime half of the hot-reload engine:
//!
//! - [`watcher`]: debounced, pattern-filtered file-change detection
//! - [`registry`]: the live endpoint map, router abstraction, and
//!   per-endpoint request handlers
//! - [`pool`]: database pool management and the Postgres query executor
//! - [`update`]: the four-phase atomic update coordinator with rollback
//! - [`orchestrator`]: the top-level reload state machine
//! - [`api`]: actix-web control plane and the catch-all dispatch service
//!
//! A host wires these together roughly as: build a [`registry::DispatchRouter`]
//! and [`registry::EndpointRegistry`], hand both plus a pool manager to an
//! [`update::AtomicUpdateManager`], then hand everything to a
//! [`orchestrator::ReloadOrchestrator`] and call `load_initial` followed by
//! `initialize`.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod api;
pub mod orchestrator;
pub mod pool;
pub mod registry;
pub mod update;
pub mod watcher;

// Re-export commonly used types
pub use orchestrator::{ReloadOrchestrator, ReloadRequest, ReloadState, ReloadStatusInfo};
pub use pool::{DatabasePoolManager, DieselPoolManager, PgQueryExecutor};
pub use registry::{DispatchRouter, EndpointRegistry, HttpRouter, QueryExecutor};
pub use update::{AtomicUpdateManager, AtomicUpdateResult};
pub use watcher::{ChangeListener, FileChangeEvent, FileWatcher};
