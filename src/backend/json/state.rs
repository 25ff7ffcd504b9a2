//! On-disk catalog-state document model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{IcebergError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceEntry {
    #[serde(default)]
    pub properties: HashMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub namespace: String,
    pub name: String,
    pub metadata_location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_metadata_location: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The full catalog-state document, strict on read (unknown fields rejected).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogState {
    pub catalog_name: String,
    pub version: u64,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub namespaces: HashMap<String, NamespaceEntry>,
    #[serde(default)]
    pub tables: HashMap<String, TableEntry>,
}

impl CatalogState {
    pub fn new(catalog_name: impl Into<String>, now_ms: i64) -> Self {
        Self {
            catalog_name: catalog_name.into(),
            version: 1,
            created_at: now_ms,
            updated_at: now_ms,
            namespaces: HashMap::new(),
            tables: HashMap::new(),
        }
    }

    /// Integrity check on read: catalog name/version present and positive;
    /// every table's storage key matches its stored namespace/name; every
    /// table's namespace exists; no table has a null/empty metadata location.
    pub fn validate(&self) -> Result<()> {
        if self.catalog_name.is_empty() {
            return Err(IcebergError::Io {
                operation: "validate catalog state".into(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "catalog_name must not be empty",
                ),
            });
        }
        if self.version == 0 {
            return Err(IcebergError::Io {
                operation: "validate catalog state".into(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "schema version must be >= 1",
                ),
            });
        }
        for (key, table) in &self.tables {
            let expected_key = format!("{}.{}", table.namespace, table.name);
            if *key != expected_key {
                return Err(IcebergError::Io {
                    operation: "validate catalog state".into(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("table key {key:?} does not match entry {expected_key:?}"),
                    ),
                });
            }
            if !self.namespaces.contains_key(&table.namespace) {
                return Err(IcebergError::Io {
                    operation: "validate catalog state".into(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("table {key:?} references missing namespace {:?}", table.namespace),
                    ),
                });
            }
            if table.metadata_location.is_empty() {
                return Err(IcebergError::Io {
                    operation: "validate catalog state".into(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("table {key:?} has an empty metadata location"),
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dangling_table_namespace() {
        let mut state = CatalogState::new("c", 0);
        state.tables.insert(
            "a.t".to_string(),
            TableEntry {
                namespace: "a".to_string(),
                name: "t".to_string(),
                metadata_location: "/x".to_string(),
                previous_metadata_location: None,
                created_at: 0,
                updated_at: 0,
            },
        );
        assert!(state.validate().is_err());
    }

    #[test]
    fn rejects_key_entry_mismatch() {
        let mut state = CatalogState::new("c", 0);
        state.namespaces.insert(
            "a".to_string(),
            NamespaceEntry {
                properties: HashMap::new(),
                created_at: 0,
                updated_at: 0,
            },
        );
        state.tables.insert(
            "a.wrong".to_string(),
            TableEntry {
                namespace: "a".to_string(),
                name: "t".to_string(),
                metadata_location: "/x".to_string(),
                previous_metadata_location: None,
                created_at: 0,
                updated_at: 0,
            },
        );
        assert!(state.validate().is_err());
    }
}
