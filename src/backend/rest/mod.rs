//! REST-remote catalog backend
//!
//! Thin pass-through to a remote Iceberg REST catalog service. No local
//! caching, no retry beyond what the façade applies uniformly: the remote
//! service owns concurrency control, so this backend just forwards intent
//! and translates transport/status failures into `IcebergError`.

use std::collections::HashMap;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{IcebergError, Result};
use crate::identifier::{Namespace, PropertyUpdateSummary, TableIdent};

use super::{NamespaceRecord, TableRecord};

/// Connection parameters for a remote catalog endpoint.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub endpoint: String,
    pub warehouse: String,
    pub token: Option<String>,
    pub credential: Option<String>,
    pub auth_url: Option<String>,
    pub scope: Option<String>,
    pub sigv4_region: Option<String>,
    pub sigv4_service: Option<String>,
    pub tls_insecure_skip_verify: bool,
    pub uri_prefix: Option<String>,
    pub properties: HashMap<String, String>,
}

pub struct RestBackend {
    client: Client,
    config: RestConfig,
}

#[derive(Serialize)]
struct CreateNamespacePayload<'a> {
    namespace: Vec<&'a str>,
    properties: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct NamespacePropertiesResponse {
    properties: HashMap<String, String>,
}

#[derive(Serialize)]
struct UpdatePropertiesPayload<'a> {
    removals: &'a [String],
    updates: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct UpdatePropertiesResponse {
    #[serde(default)]
    removed: Vec<String>,
    #[serde(default)]
    updated: Vec<String>,
    #[serde(default)]
    missing: Vec<String>,
}

#[derive(Deserialize)]
struct ListNamespacesResponse {
    namespaces: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct LoadTableResponse {
    #[serde(rename = "metadata-location")]
    metadata_location: String,
    #[serde(default, rename = "previous-metadata-location")]
    previous_metadata_location: Option<String>,
}

#[derive(Deserialize)]
struct ListTablesResponse {
    identifiers: Vec<TableIdentifierJson>,
}

#[derive(Deserialize)]
struct TableIdentifierJson {
    namespace: Vec<String>,
    name: String,
}

#[derive(Serialize)]
struct RegisterTablePayload<'a> {
    name: &'a str,
    #[serde(rename = "metadata-location")]
    metadata_location: &'a str,
}

#[derive(Serialize)]
struct RenameTablePayload<'a> {
    source: TableIdentifierRef<'a>,
    destination: TableIdentifierRef<'a>,
}

#[derive(Serialize)]
struct TableIdentifierRef<'a> {
    namespace: Vec<&'a str>,
    name: &'a str,
}

#[derive(Serialize)]
struct CommitTablePayload<'a> {
    requirements: Vec<CommitRequirement<'a>>,
    #[serde(rename = "metadata-location")]
    metadata_location: &'a str,
}

#[derive(Serialize)]
struct CommitRequirement<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "current-metadata-location")]
    current_metadata_location: &'a str,
}

impl RestBackend {
    pub fn new(config: RestConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if config.tls_insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| IcebergError::Remote(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        let base = self.config.endpoint.trim_end_matches('/');
        match &self.config.uri_prefix {
            Some(prefix) => format!("{base}/{}/{path}", prefix.trim_matches('/')),
            None => format!("{base}/{path}"),
        }
    }

    fn authorize(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.config.token {
            req = req.bearer_auth(token);
        }
        req
    }

    fn ns_path(ns: &Namespace) -> String {
        ns.segments().join("%1F")
    }

    async fn status_to_error(operation: &str, identifier: &str, status: StatusCode) -> IcebergError {
        match status {
            StatusCode::NOT_FOUND => IcebergError::NoSuchNamespace(identifier.to_string()),
            StatusCode::CONFLICT => IcebergError::ConcurrentModification {
                operation: operation.to_string(),
                identifier: identifier.to_string(),
                attempts: 1,
            },
            other => IcebergError::Remote(format!(
                "{operation} on {identifier} failed with status {other}"
            )),
        }
    }

    pub async fn create_namespace(
        &self,
        ns: &Namespace,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        let payload = CreateNamespacePayload {
            namespace: ns.segments().iter().map(String::as_str).collect(),
            properties: &properties,
        };
        let resp = self
            .authorize(self.client.post(self.url("namespaces")).json(&payload))
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(IcebergError::NamespaceExists(ns.canonicalize()));
        }
        if !resp.status().is_success() {
            return Err(
                Self::status_to_error("create-namespace", &ns.canonicalize(), resp.status()).await,
            );
        }
        Ok(())
    }

    pub async fn drop_namespace(&self, ns: &Namespace) -> Result<()> {
        let resp = self
            .authorize(
                self.client
                    .delete(self.url(&format!("namespaces/{}", Self::ns_path(ns)))),
            )
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(IcebergError::NamespaceNotEmpty(ns.canonicalize()));
        }
        if !resp.status().is_success() {
            return Err(
                Self::status_to_error("drop-namespace", &ns.canonicalize(), resp.status()).await,
            );
        }
        Ok(())
    }

    pub async fn namespace_exists(&self, ns: &Namespace) -> Result<bool> {
        let resp = self
            .authorize(
                self.client
                    .head(self.url(&format!("namespaces/{}", Self::ns_path(ns)))),
            )
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    pub async fn load_namespace_properties(&self, ns: &Namespace) -> Result<NamespaceRecord> {
        let resp = self
            .authorize(
                self.client
                    .get(self.url(&format!("namespaces/{}", Self::ns_path(ns)))),
            )
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(
                Self::status_to_error("load-namespace-properties", &ns.canonicalize(), resp.status())
                    .await,
            );
        }
        let body: NamespacePropertiesResponse = resp.json().await?;
        Ok(NamespaceRecord {
            properties: body.properties,
            created_at_ms: 0,
            updated_at_ms: 0,
        })
    }

    pub async fn update_namespace_properties(
        &self,
        ns: &Namespace,
        removals: &[String],
        updates: &HashMap<String, String>,
    ) -> Result<PropertyUpdateSummary> {
        let payload = UpdatePropertiesPayload { removals, updates };
        let resp = self
            .authorize(
                self.client
                    .post(self.url(&format!("namespaces/{}/properties", Self::ns_path(ns))))
                    .json(&payload),
            )
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_to_error(
                "update-namespace-properties",
                &ns.canonicalize(),
                resp.status(),
            )
            .await);
        }
        let body: UpdatePropertiesResponse = resp.json().await?;
        Ok(PropertyUpdateSummary {
            removed: body.removed,
            updated: body.updated,
            missing: body.missing,
        })
    }

    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let resp = self
            .authorize(self.client.get(self.url("namespaces")))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_to_error("list-namespaces", "", resp.status()).await);
        }
        let body: ListNamespacesResponse = resp.json().await?;
        Ok(body
            .namespaces
            .into_iter()
            .map(Namespace::new_unchecked)
            .collect())
    }

    pub async fn create_table_entry(
        &self,
        identifier: &TableIdent,
        metadata_location: &str,
    ) -> Result<()> {
        self.register_table_entry(identifier, metadata_location).await
    }

    pub async fn register_table_entry(
        &self,
        identifier: &TableIdent,
        metadata_location: &str,
    ) -> Result<()> {
        let payload = RegisterTablePayload {
            name: &identifier.name,
            metadata_location,
        };
        let resp = self
            .authorize(
                self.client
                    .post(self.url(&format!(
                        "namespaces/{}/tables",
                        Self::ns_path(&identifier.namespace)
                    )))
                    .json(&payload),
            )
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(IcebergError::TableExists(identifier.storage_key()));
        }
        if !resp.status().is_success() {
            return Err(
                Self::status_to_error("create-table", &identifier.storage_key(), resp.status()).await,
            );
        }
        Ok(())
    }

    pub async fn drop_table_entry(&self, identifier: &TableIdent) -> Result<()> {
        let resp = self
            .authorize(self.client.delete(self.url(&format!(
                "namespaces/{}/tables/{}",
                Self::ns_path(&identifier.namespace),
                identifier.name
            ))))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(
                Self::status_to_error("drop-table", &identifier.storage_key(), resp.status()).await,
            );
        }
        Ok(())
    }

    pub async fn table_exists(&self, identifier: &TableIdent) -> Result<bool> {
        let resp = self
            .authorize(self.client.head(self.url(&format!(
                "namespaces/{}/tables/{}",
                Self::ns_path(&identifier.namespace),
                identifier.name
            ))))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    pub async fn load_table_entry(&self, identifier: &TableIdent) -> Result<TableRecord> {
        let resp = self
            .authorize(self.client.get(self.url(&format!(
                "namespaces/{}/tables/{}",
                Self::ns_path(&identifier.namespace),
                identifier.name
            ))))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(
                Self::status_to_error("load-table", &identifier.storage_key(), resp.status()).await,
            );
        }
        let body: LoadTableResponse = resp.json().await?;
        Ok(TableRecord {
            identifier: identifier.clone(),
            metadata_location: body.metadata_location,
            previous_metadata_location: body.previous_metadata_location,
            created_at_ms: 0,
            updated_at_ms: 0,
        })
    }

    pub async fn list_tables(&self, ns: &Namespace) -> Result<Vec<TableIdent>> {
        let resp = self
            .authorize(
                self.client
                    .get(self.url(&format!("namespaces/{}/tables", Self::ns_path(ns)))),
            )
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(
                Self::status_to_error("list-tables", &ns.canonicalize(), resp.status()).await,
            );
        }
        let body: ListTablesResponse = resp.json().await?;
        body.identifiers
            .into_iter()
            .map(|i| TableIdent::new(Namespace::new_unchecked(i.namespace), i.name))
            .collect()
    }

    pub async fn rename_table_entry(&self, from: &TableIdent, to: &TableIdent) -> Result<()> {
        let payload = RenameTablePayload {
            source: TableIdentifierRef {
                namespace: from.namespace.segments().iter().map(String::as_str).collect(),
                name: &from.name,
            },
            destination: TableIdentifierRef {
                namespace: to.namespace.segments().iter().map(String::as_str).collect(),
                name: &to.name,
            },
        };
        let resp = self
            .authorize(self.client.post(self.url("tables/rename")).json(&payload))
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(IcebergError::TableExists(to.storage_key()));
        }
        if !resp.status().is_success() {
            return Err(
                Self::status_to_error("rename-table", &from.storage_key(), resp.status()).await,
            );
        }
        Ok(())
    }

    pub async fn commit_table_entry(
        &self,
        identifier: &TableIdent,
        expected_location: &str,
        new_location: &str,
    ) -> Result<()> {
        let payload = CommitTablePayload {
            requirements: vec![CommitRequirement {
                kind: "assert-current-metadata-location",
                current_metadata_location: expected_location,
            }],
            metadata_location: new_location,
        };
        let resp = self
            .authorize(
                self.client
                    .post(self.url(&format!(
                        "namespaces/{}/tables/{}",
                        Self::ns_path(&identifier.namespace),
                        identifier.name
                    )))
                    .json(&payload),
            )
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(IcebergError::ConcurrentModification {
                operation: "commit-table".to_string(),
                identifier: identifier.storage_key(),
                attempts: 1,
            });
        }
        if !resp.status().is_success() {
            return Err(
                Self::status_to_error("commit-table", &identifier.storage_key(), resp.status())
                    .await,
            );
        }
        Ok(())
    }
}
