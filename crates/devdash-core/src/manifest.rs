use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MANIFEST_FILE: &str = "azure.yaml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// The slice of the project manifest the dashboard cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    services: IndexMap<String, Option<ServiceEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ServiceEntry {
    #[serde(default)]
    language: Option<String>,
}

/// A service named in the manifest, whether or not it is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDecl {
    pub name: String,
    pub language: Option<String>,
}

impl ServiceDecl {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: None,
        }
    }
}

impl Manifest {
    /// Reads `azure.yaml` under `project_dir`. A missing file is `Ok(None)`.
    pub fn load(project_dir: &Path) -> Result<Option<Self>, ManifestError> {
        let path = project_dir.join(MANIFEST_FILE);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ManifestError::Io { path, source }),
        };
        Self::parse(&contents)
            .map(Some)
            .map_err(|source| ManifestError::Parse { path, source })
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Declared services in file order.
    pub fn declared(&self) -> Vec<ServiceDecl> {
        self.services
            .iter()
            .map(|(name, entry)| {
                let entry = entry.clone().unwrap_or_default();
                ServiceDecl {
                    name: name.clone(),
                    language: entry.language,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(Manifest::load(dir.path()).expect("load").is_none());
    }

    #[test]
    fn declared_services_keep_file_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            "name: shop\nservices:\n  web:\n    language: ts\n    project: ./web\n  api:\n    language: python\n    project: ./api\n  worker:\n",
        )
        .expect("write manifest");

        let manifest = Manifest::load(dir.path()).expect("load").expect("present");
        assert_eq!(manifest.name.as_deref(), Some("shop"));
        let declared = manifest.declared();
        let names: Vec<_> = declared.iter().map(|decl| decl.name.as_str()).collect();
        assert_eq!(names, vec!["web", "api", "worker"]);
        assert_eq!(declared[1].language.as_deref(), Some("python"));
        assert_eq!(declared[2].language, None);
    }

    #[test]
    fn malformed_manifest_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(MANIFEST_FILE), "services: [unclosed").expect("write");
        assert!(matches!(
            Manifest::load(dir.path()),
            Err(ManifestError::Parse { .. })
        ));
    }

    #[test]
    fn empty_manifest_declares_nothing() {
        let manifest = Manifest::parse("  \n").expect("parse");
        assert!(manifest.declared().is_empty());
    }
}
