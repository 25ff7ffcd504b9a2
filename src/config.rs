//! Configuration loading
//!
//! Typed configuration for selecting and constructing a catalog backend,
//! following the teacher's `DatabaseConfig`/`.data-model.toml` pattern: a
//! tagged section parsed from TOML, with environment-variable overrides and
//! a `load`/`save` pair rooted at a workspace directory. Out of scope here
//! is the CLI's own argument parsing and any config file format beyond this
//! one — see spec Non-goals.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::BackendConfig;
use crate::error::{IcebergError, Result};
use crate::project::ProjectDescriptor;

/// Default configuration filename, analogous to the teacher's `.data-model.toml`.
pub const CONFIG_FILENAME: &str = ".icebox.toml";

pub const ENV_CATALOG_BACKEND: &str = "ICEBOX_CATALOG_BACKEND";
pub const ENV_WAREHOUSE: &str = "ICEBOX_WAREHOUSE";

/// On-disk backend selection, tagged by `type` (mirrors the teacher's
/// `DatabaseBackendType`/`#[serde(tag = "type")]` convention).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogSection {
    Json {
        uri: String,
        #[serde(default = "default_catalog_name")]
        catalog_name: String,
    },
    #[cfg(feature = "sql-backend")]
    Sql {
        path: String,
        #[serde(default = "default_catalog_name")]
        catalog_name: String,
    },
    #[cfg(feature = "rest-backend")]
    Rest {
        endpoint: String,
        warehouse: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        credential: Option<String>,
        #[serde(default)]
        auth_url: Option<String>,
        #[serde(default)]
        scope: Option<String>,
        #[serde(default)]
        sigv4_region: Option<String>,
        #[serde(default)]
        sigv4_service: Option<String>,
        #[serde(default)]
        tls_insecure_skip_verify: bool,
        #[serde(default)]
        uri_prefix: Option<String>,
        #[serde(default)]
        properties: HashMap<String, String>,
    },
}

fn default_catalog_name() -> String {
    "icebox".to_string()
}

impl Default for CatalogSection {
    fn default() -> Self {
        CatalogSection::Json {
            uri: default_catalog_uri(),
            catalog_name: default_catalog_name(),
        }
    }
}

fn default_catalog_uri() -> String {
    "catalog.json".to_string()
}

impl From<CatalogSection> for BackendConfig {
    fn from(section: CatalogSection) -> Self {
        match section {
            CatalogSection::Json { uri, catalog_name } => {
                BackendConfig::Json { uri, catalog_name }
            }
            #[cfg(feature = "sql-backend")]
            CatalogSection::Sql { path, catalog_name } => {
                BackendConfig::Sql { path, catalog_name }
            }
            #[cfg(feature = "rest-backend")]
            CatalogSection::Rest {
                endpoint,
                warehouse,
                token,
                credential,
                auth_url,
                scope,
                sigv4_region,
                sigv4_service,
                tls_insecure_skip_verify,
                uri_prefix,
                properties,
            } => BackendConfig::Rest {
                endpoint,
                warehouse,
                token,
                credential,
                auth_url,
                scope,
                sigv4_region,
                sigv4_service,
                tls_insecure_skip_verify,
                uri_prefix,
                properties,
            },
        }
    }
}

/// The `.icebox.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceboxConfig {
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default = "default_warehouse")]
    pub warehouse: String,
}

fn default_warehouse() -> String {
    "warehouse".to_string()
}

impl Default for IceboxConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogSection::default(),
            warehouse: default_warehouse(),
        }
    }
}

impl IceboxConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            IcebergError::io(
                "parse configuration",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
            )
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            IcebergError::io(
                "serialize configuration",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
            )
        })
    }

    /// Load `<workspace>/.icebox.toml`, falling back to the project
    /// descriptor and then to defaults when the file is absent. Environment
    /// variables override both.
    pub fn load(workspace: &Path) -> Result<Self> {
        let config_path = workspace.join(CONFIG_FILENAME);
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| IcebergError::io(format!("read {}", config_path.display()), e))?;
            Self::parse(&content)?
        } else if let Some(descriptor) = ProjectDescriptor::load(workspace)? {
            Self {
                catalog: CatalogSection::Json {
                    uri: descriptor.catalog_uri,
                    catalog_name: descriptor.catalog_name,
                },
                warehouse: descriptor.warehouse,
            }
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self, workspace: &Path) -> Result<()> {
        let config_path = workspace.join(CONFIG_FILENAME);
        let content = self.to_toml()?;
        std::fs::write(&config_path, content)
            .map_err(|e| IcebergError::io(format!("write {}", config_path.display()), e))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(uri) = std::env::var(ENV_CATALOG_BACKEND) {
            if let CatalogSection::Json { uri: slot, .. } = &mut self.catalog {
                *slot = uri;
            }
        }
        if let Ok(warehouse) = std::env::var(ENV_WAREHOUSE) {
            self.warehouse = warehouse;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_json_backend() {
        let config = IceboxConfig::default();
        assert!(matches!(config.catalog, CatalogSection::Json { .. }));
        assert_eq!(config.warehouse, "warehouse");
    }

    #[test]
    fn round_trips_through_toml() {
        let config = IceboxConfig {
            catalog: CatalogSection::Json {
                uri: "my-catalog.json".to_string(),
                catalog_name: "prod".to_string(),
            },
            warehouse: "/data/warehouse".to_string(),
        };
        let toml = config.to_toml().unwrap();
        let back = IceboxConfig::parse(&toml).unwrap();
        assert_eq!(back.warehouse, "/data/warehouse");
        match back.catalog {
            CatalogSection::Json { uri, catalog_name } => {
                assert_eq!(uri, "my-catalog.json");
                assert_eq!(catalog_name, "prod");
            }
            _ => panic!("expected json section"),
        }
    }

    #[test]
    fn load_falls_back_to_default_when_absent() {
        let dir = tempdir().unwrap();
        let config = IceboxConfig::load(dir.path()).unwrap();
        assert_eq!(config.warehouse, "warehouse");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let config = IceboxConfig {
            catalog: CatalogSection::Json {
                uri: "c.json".to_string(),
                catalog_name: "t".to_string(),
            },
            warehouse: "wh".to_string(),
        };
        config.save(dir.path()).unwrap();
        let loaded = IceboxConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.warehouse, "wh");
    }
}
