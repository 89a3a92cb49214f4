//! Project-scoped live state for the development dashboard: canonical project
//! paths, keyed-singleton registries, per-project service stores and log
//! buffers, and the merge of declared manifest services with what is actually
//! running.

pub mod logs;
pub mod manifest;
pub mod project;
pub mod reconcile;
pub mod registry;
pub mod service;

pub use logs::{LogBuffer, LogEntry, LogLevel, LogRegistry, LogStore, DEFAULT_LOG_CAPACITY};
pub use manifest::{Manifest, ManifestError, ServiceDecl, MANIFEST_FILE};
pub use project::ProjectPath;
pub use reconcile::{merge, project_view, ServiceView};
pub use registry::{FromProject, Registry};
pub use service::{ServiceRecord, ServiceStatus, ServiceStore, StoreError, StoreRegistry};
