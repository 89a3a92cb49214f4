use crate::project::ProjectPath;
use crate::registry::{FromProject, Registry};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("service '{0}' is not registered")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Starting,
    Ready,
    Running,
    Stopping,
    #[default]
    Stopped,
    Error,
    #[serde(other)]
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Starting => "starting",
            ServiceStatus::Ready => "ready",
            ServiceStatus::Running => "running",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Error => "error",
            ServiceStatus::Unknown => "unknown",
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, ServiceStatus::Ready | ServiceStatus::Running)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "starting" => Ok(ServiceStatus::Starting),
            "ready" => Ok(ServiceStatus::Ready),
            "running" => Ok(ServiceStatus::Running),
            "stopping" => Ok(ServiceStatus::Stopping),
            "stopped" => Ok(ServiceStatus::Stopped),
            "error" | "failed" => Ok(ServiceStatus::Error),
            "unknown" => Ok(ServiceStatus::Unknown),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

/// A runtime-observed service, written by the process supervisor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub name: String,
    #[serde(default)]
    pub project_dir: PathBuf,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

impl ServiceRecord {
    pub fn new(name: impl Into<String>, status: ServiceStatus) -> Self {
        Self {
            name: name.into(),
            status,
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>, port: u16) -> Self {
        self.url = url.into();
        self.port = port;
        self
    }
}

/// Live service records for one project.
pub struct ServiceStore {
    project: ProjectPath,
    services: RwLock<HashMap<String, ServiceRecord>>,
}

impl FromProject for ServiceStore {
    fn from_project(project: ProjectPath) -> Self {
        Self {
            project,
            services: RwLock::new(HashMap::new()),
        }
    }
}

impl ServiceStore {
    pub fn project(&self) -> &ProjectPath {
        &self.project
    }

    /// Inserts or replaces the record keyed by its name. The last write for a
    /// name wins.
    pub fn upsert(&self, mut record: ServiceRecord) {
        if record.project_dir.as_os_str().is_empty() {
            record.project_dir = self.project.path().to_path_buf();
        }
        record.last_checked = Some(Utc::now());
        tracing::debug!(
            event = "service_upsert",
            project = %self.project,
            service = %record.name,
            status = %record.status,
            port = record.port
        );
        self.services.write().insert(record.name.clone(), record);
    }

    pub fn register(&self, record: ServiceRecord) {
        self.upsert(record);
    }

    pub fn unregister(&self, name: &str) -> Option<ServiceRecord> {
        let removed = self.services.write().remove(name);
        if removed.is_some() {
            tracing::debug!(event = "service_unregister", project = %self.project, service = name);
        }
        removed
    }

    pub fn update_status(
        &self,
        name: &str,
        status: ServiceStatus,
        health: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut services = self.services.write();
        let record = services
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        record.status = status;
        if let Some(health) = health {
            record.health = Some(health.to_string());
        }
        record.last_checked = Some(Utc::now());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ServiceRecord> {
        self.services.read().get(name).cloned()
    }

    /// Snapshot of every record, ordered by name.
    pub fn list(&self) -> Vec<ServiceRecord> {
        let mut records: Vec<_> = self.services.read().values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    pub fn clear(&self) {
        self.services.write().clear();
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

pub type StoreRegistry = Registry<ServiceStore>;

static GLOBAL_STORES: OnceLock<Arc<StoreRegistry>> = OnceLock::new();

impl Registry<ServiceStore> {
    /// Process-wide store registry.
    pub fn global() -> Arc<StoreRegistry> {
        GLOBAL_STORES
            .get_or_init(|| Arc::new(StoreRegistry::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, Arc<ServiceStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StoreRegistry::new().get_or_create(dir.path());
        (dir, store)
    }

    #[test]
    fn upsert_replaces_by_name() {
        let (_dir, store) = store();
        store.upsert(ServiceRecord::new("api", ServiceStatus::Starting));
        store.upsert(
            ServiceRecord::new("api", ServiceStatus::Running).with_url("http://localhost:3000", 3000),
        );

        let records = store.list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ServiceStatus::Running);
        assert_eq!(records[0].port, 3000);
        assert!(records[0].last_checked.is_some());
        assert_eq!(records[0].project_dir, store.project().path());
    }

    #[test]
    fn list_is_a_snapshot() {
        let (_dir, store) = store();
        store.upsert(ServiceRecord::new("web", ServiceStatus::Running));
        let snapshot = store.list();
        store.clear();
        assert_eq!(snapshot.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn update_status_requires_registration() {
        let (_dir, store) = store();
        assert_eq!(
            store.update_status("missing", ServiceStatus::Ready, Some("healthy")),
            Err(StoreError::NotFound("missing".to_string()))
        );

        store.register(ServiceRecord::new("worker", ServiceStatus::Starting));
        store
            .update_status("worker", ServiceStatus::Ready, Some("healthy"))
            .expect("update");
        let record = store.get("worker").expect("registered");
        assert_eq!(record.status, ServiceStatus::Ready);
        assert_eq!(record.health.as_deref(), Some("healthy"));
    }

    #[test]
    fn unregister_removes_record() {
        let (_dir, store) = store();
        store.register(ServiceRecord::new("api", ServiceStatus::Running));
        assert!(store.unregister("api").is_some());
        assert!(store.get("api").is_none());
        assert!(store.unregister("api").is_none());
    }

    #[test]
    fn concurrent_registration_keeps_every_record() {
        let (_dir, store) = store();
        let handles: Vec<_> = (0..10)
            .map(|idx| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.register(
                        ServiceRecord::new(format!("svc-{idx}"), ServiceStatus::Running)
                            .with_url(format!("http://localhost:{}", 8080 + idx), 8080 + idx),
                    );
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(store.len(), 10);
    }

    #[test]
    fn global_registry_is_shared() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = StoreRegistry::global().get_or_create(dir.path());
        let second = StoreRegistry::global().get_or_create(dir.path());
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unknown_status_strings_deserialize_as_unknown() {
        let record: ServiceRecord =
            serde_json::from_str(r#"{"name":"api","status":"degraded"}"#).expect("decode");
        assert_eq!(record.status, ServiceStatus::Unknown);
        assert_eq!("Running".parse::<ServiceStatus>(), Ok(ServiceStatus::Running));
        assert!("bogus".parse::<ServiceStatus>().is_err());
        assert!(ServiceStatus::Ready.is_up());
        assert!(!ServiceStatus::Starting.is_up());
    }
}
