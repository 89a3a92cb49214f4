use crate::manifest::{Manifest, ServiceDecl};
use crate::service::{ServiceRecord, ServiceStatus, ServiceStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Status reported for a declared service with no live record.
pub const PLACEHOLDER_STATUS: ServiceStatus = ServiceStatus::Stopped;
pub const PLACEHOLDER_HEALTH: &str = "unknown";

/// One row of the dashboard: what the API returns and what WebSocket clients receive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub name: String,
    pub url: String,
    pub status: ServiceStatus,
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
}

impl ServiceView {
    fn placeholder(decl: &ServiceDecl) -> Self {
        Self {
            name: decl.name.clone(),
            url: String::new(),
            status: PLACEHOLDER_STATUS,
            port: 0,
            pid: None,
            language: decl.language.clone(),
            framework: None,
            health: Some(PLACEHOLDER_HEALTH.to_string()),
            azure_url: None,
            error: None,
            start_time: None,
        }
    }
}

impl From<&ServiceRecord> for ServiceView {
    fn from(record: &ServiceRecord) -> Self {
        Self {
            name: record.name.clone(),
            url: record.url.clone(),
            status: record.status,
            port: record.port,
            pid: record.pid,
            language: record.language.clone(),
            framework: record.framework.clone(),
            health: record.health.clone(),
            azure_url: record.azure_url.clone(),
            error: record.error.clone(),
            start_time: record.start_time,
        }
    }
}

/// Declared services first, in declaration order, using live data where a
/// record with the same name exists; then undeclared live records by name.
pub fn merge(declared: &[ServiceDecl], live: &[ServiceRecord]) -> Vec<ServiceView> {
    let mut by_name: HashMap<&str, &ServiceRecord> =
        live.iter().map(|record| (record.name.as_str(), record)).collect();

    let mut views = Vec::with_capacity(declared.len() + live.len());
    for decl in declared {
        match by_name.remove(decl.name.as_str()) {
            Some(record) => {
                let mut view = ServiceView::from(record);
                if view.language.is_none() {
                    view.language = decl.language.clone();
                }
                views.push(view);
            }
            None => views.push(ServiceView::placeholder(decl)),
        }
    }

    let mut extra: Vec<_> = by_name.into_values().collect();
    extra.sort_by(|a, b| a.name.cmp(&b.name));
    views.extend(extra.into_iter().map(ServiceView::from));
    views
}

/// Merged view for the store's project. Manifest failures degrade to zero
/// declared services.
pub fn project_view(store: &ServiceStore) -> Vec<ServiceView> {
    let declared = match Manifest::load(store.project().path()) {
        Ok(Some(manifest)) => manifest.declared(),
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(event = "manifest_error", project = %store.project(), error = %err);
            Vec::new()
        }
    };
    merge(&declared, &store.list())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MANIFEST_FILE;
    use crate::service::StoreRegistry;

    fn live(name: &str, status: ServiceStatus, port: u16) -> ServiceRecord {
        ServiceRecord::new(name, status).with_url(format!("http://localhost:{port}"), port)
    }

    #[test]
    fn declared_without_live_gets_placeholder() {
        let views = merge(&[ServiceDecl::named("api")], &[]);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name, "api");
        assert_eq!(views[0].status, PLACEHOLDER_STATUS);
        assert_eq!(views[0].port, 0);
        assert!(views[0].url.is_empty());
    }

    #[test]
    fn live_data_overrides_declaration() {
        let views = merge(
            &[ServiceDecl::named("web"), ServiceDecl::named("api")],
            &[
                live("api", ServiceStatus::Starting, 8080),
                live("web", ServiceStatus::Running, 3000),
            ],
        );
        let summary: Vec<_> = views
            .iter()
            .map(|view| (view.name.as_str(), view.status, view.port))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("web", ServiceStatus::Running, 3000),
                ("api", ServiceStatus::Starting, 8080)
            ]
        );
    }

    #[test]
    fn undeclared_live_records_follow_in_name_order() {
        let views = merge(
            &[ServiceDecl::named("web")],
            &[
                live("zeta", ServiceStatus::Running, 9001),
                live("alpha", ServiceStatus::Running, 9000),
            ],
        );
        let names: Vec<_> = views.iter().map(|view| view.name.as_str()).collect();
        assert_eq!(names, vec!["web", "alpha", "zeta"]);
    }

    #[test]
    fn view_serializes_core_fields() {
        let view = ServiceView::from(&live("api", ServiceStatus::Running, 3000));
        let value = serde_json::to_value(&view).expect("encode");
        assert_eq!(value["name"], "api");
        assert_eq!(value["url"], "http://localhost:3000");
        assert_eq!(value["status"], "running");
        assert_eq!(value["port"], 3000);
        assert!(value.get("azureUrl").is_none());
        assert!(value.get("pid").is_none());

        let mut record = live("api", ServiceStatus::Running, 3000);
        record.pid = Some(4242);
        let value = serde_json::to_value(ServiceView::from(&record)).expect("encode");
        assert_eq!(value["pid"], 4242);
    }

    #[test]
    fn malformed_manifest_degrades_to_live_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(MANIFEST_FILE), "services: [oops").expect("write");
        let store = StoreRegistry::new().get_or_create(dir.path());
        store.upsert(live("api", ServiceStatus::Running, 3000));

        let views = project_view(&store);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name, "api");
    }
}
