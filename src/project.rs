//! Project descriptor sidecar
//!
//! A minimal `.icebox/index` JSON file recording which catalog a workspace
//! points at, read when no explicit configuration is supplied. Intentionally
//! thin: project scaffolding and richer config formats live elsewhere.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IcebergError, Result};

const DESCRIPTOR_DIR: &str = ".icebox";
const DESCRIPTOR_FILE: &str = "index";

/// The `.icebox/index` sidecar: just enough to locate the catalog and
/// warehouse a workspace was initialized against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    pub catalog_uri: String,
    #[serde(default = "default_catalog_name")]
    pub catalog_name: String,
    pub warehouse: String,
}

fn default_catalog_name() -> String {
    "icebox".to_string()
}

impl ProjectDescriptor {
    pub fn new(
        catalog_uri: impl Into<String>,
        catalog_name: impl Into<String>,
        warehouse: impl Into<String>,
    ) -> Self {
        Self {
            catalog_uri: catalog_uri.into(),
            catalog_name: catalog_name.into(),
            warehouse: warehouse.into(),
        }
    }

    fn path(workspace: &Path) -> std::path::PathBuf {
        workspace.join(DESCRIPTOR_DIR).join(DESCRIPTOR_FILE)
    }

    /// Read the descriptor for `workspace`, or `None` if it was never initialized.
    pub fn load(workspace: &Path) -> Result<Option<Self>> {
        let path = Self::path(workspace);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| IcebergError::io(format!("read {}", path.display()), e))?;
        let descriptor = serde_json::from_str(&content)?;
        Ok(Some(descriptor))
    }

    /// Write the descriptor for `workspace`, creating `.icebox/` if absent.
    pub fn save(&self, workspace: &Path) -> Result<()> {
        let path = Self::path(workspace);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IcebergError::io(format!("mkdir -p {}", parent.display()), e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .map_err(|e| IcebergError::io(format!("write {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_returns_none_when_absent() {
        let dir = tempdir().unwrap();
        assert!(ProjectDescriptor::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let descriptor = ProjectDescriptor::new("catalog.json", "icebox", "warehouse");
        descriptor.save(dir.path()).unwrap();
        let loaded = ProjectDescriptor::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, descriptor);
    }
}
