//! Catalog service façade
//!
//! The single entry point used by every collaborator above the catalog
//! layer. Dispatches over the configured [`Backend`] variant, enforces the
//! invariants shared by all three backends (namespace existence before table
//! creation, rename staying within one namespace's reach, commit retried
//! through [`crate::concurrency::with_retry`]), and drives the metadata
//! writer for every operation that touches a table's metadata document.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::backend::json::JsonBackend;
use crate::backend::{BackendConfig, NamespaceRecord, TableRecord};
use crate::concurrency::{with_retry, CancellationToken, RetryPolicy};
use crate::error::{IcebergError, Result};
use crate::identifier::{Namespace, PropertyUpdateSummary, TableIdent};
use crate::io::ObjectStore;
use crate::metadata::update::{MetadataUpdate, Requirement};
use crate::metadata::{MetadataWriter, Schema, TableMetadata};
use crate::time::now_ms;

#[cfg(feature = "sql-backend")]
use crate::backend::sql::SqlBackend;
#[cfg(feature = "rest-backend")]
use crate::backend::rest::{RestBackend, RestConfig};

/// One of the three catalog-state realizations, selected at construction
/// time from a [`BackendConfig`]. Matched explicitly rather than boxed as a
/// `dyn Trait`: see `backend::mod` for why.
pub enum Backend {
    Json(JsonBackend),
    #[cfg(feature = "sql-backend")]
    Sql(SqlBackend),
    #[cfg(feature = "rest-backend")]
    Rest(RestBackend),
}

macro_rules! dispatch {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match &$self.backend {
            Backend::Json(b) => b.$method($($arg),*).await,
            #[cfg(feature = "sql-backend")]
            Backend::Sql(b) => b.$method($($arg),*).await,
            #[cfg(feature = "rest-backend")]
            Backend::Rest(b) => b.$method($($arg),*).await,
        }
    };
}

/// Public catalog service: namespace and table lifecycle operations, backed
/// by one of the three pluggable persistence backends.
pub struct Catalog {
    backend: Backend,
    writer: MetadataWriter,
    warehouse: String,
    retry_policy: RetryPolicy,
}

impl Catalog {
    /// Open a catalog from `config`, rooted at `warehouse`. `store` backs
    /// both the JSON backend's state document and every table's metadata
    /// files; it is unused by the SQL/REST backends, which own their own
    /// persistence.
    pub async fn open(
        config: BackendConfig,
        store: Arc<dyn ObjectStore>,
        warehouse: impl Into<String>,
    ) -> Result<Self> {
        let backend = match config {
            BackendConfig::Json { uri, catalog_name } => {
                Backend::Json(JsonBackend::open(store.clone(), &uri, &catalog_name).await?)
            }
            #[cfg(feature = "sql-backend")]
            BackendConfig::Sql { path, catalog_name } => {
                Backend::Sql(SqlBackend::open(path, &catalog_name)?)
            }
            #[cfg(feature = "rest-backend")]
            BackendConfig::Rest {
                endpoint,
                warehouse: rest_warehouse,
                token,
                credential,
                auth_url,
                scope,
                sigv4_region,
                sigv4_service,
                tls_insecure_skip_verify,
                uri_prefix,
                properties,
            } => Backend::Rest(RestBackend::new(RestConfig {
                endpoint,
                warehouse: rest_warehouse,
                token,
                credential,
                auth_url,
                scope,
                sigv4_region,
                sigv4_service,
                tls_insecure_skip_verify,
                uri_prefix,
                properties,
            })?),
        };
        Ok(Self {
            backend,
            writer: MetadataWriter::new(store),
            warehouse: warehouse.into(),
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[instrument(skip(self, properties))]
    pub async fn create_namespace(
        &self,
        namespace: &Namespace,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        dispatch!(self, create_namespace, namespace, properties)?;
        info!(%namespace, "namespace created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn drop_namespace(&self, namespace: &Namespace) -> Result<()> {
        dispatch!(self, drop_namespace, namespace)?;
        info!(%namespace, "namespace dropped");
        Ok(())
    }

    pub async fn namespace_exists(&self, namespace: &Namespace) -> Result<bool> {
        dispatch!(self, namespace_exists, namespace)
    }

    /// Load-namespace-properties(namespace): stored properties plus the
    /// synthesized `exists=true` key, which is never actually persisted by
    /// any backend and is added here so all three agree on the contract.
    pub async fn load_namespace_properties(&self, namespace: &Namespace) -> Result<NamespaceRecord> {
        let mut record = dispatch!(self, load_namespace_properties, namespace)?;
        record
            .properties
            .insert("exists".to_string(), "true".to_string());
        Ok(record)
    }

    #[instrument(skip(self, updates))]
    pub async fn update_namespace_properties(
        &self,
        namespace: &Namespace,
        removals: &[String],
        updates: &HashMap<String, String>,
    ) -> Result<PropertyUpdateSummary> {
        dispatch!(self, update_namespace_properties, namespace, removals, updates)
    }

    /// List namespaces: `None` lists top-level namespaces (those whose
    /// canonical form contains no `.`); `Some(p)` lists the direct children
    /// of `p`. The filtering lives here so all three backends agree on it.
    pub async fn list_namespaces(&self, parent: Option<&Namespace>) -> Result<Vec<Namespace>> {
        let all = dispatch!(self, list_namespaces)?;
        Ok(match parent {
            None => all.into_iter().filter(Namespace::is_top_level).collect(),
            Some(p) => all.into_iter().filter(|ns| p.is_direct_parent_of(ns)).collect(),
        })
    }

    pub async fn table_exists(&self, identifier: &TableIdent) -> Result<bool> {
        dispatch!(self, table_exists, identifier)
    }

    pub async fn list_tables(&self, namespace: &Namespace) -> Result<Vec<TableIdent>> {
        dispatch!(self, list_tables, namespace)
    }

    /// Create a table: stage a fresh metadata document, then point the
    /// catalog at it. On catalog-write failure the staged file is an orphan
    /// and is removed best-effort rather than left behind as debris.
    #[instrument(skip(self, schema))]
    pub async fn create_table(&self, identifier: &TableIdent, schema: Schema) -> Result<TableMetadata> {
        if !self.namespace_exists(&identifier.namespace).await? {
            return Err(IcebergError::NoSuchNamespace(
                identifier.namespace.canonicalize(),
            ));
        }
        let (location, document) = self
            .writer
            .stage_next_version(&self.warehouse, identifier, |_candidate| {
                MetadataWriter::build_initial_metadata(identifier, schema.clone(), &self.warehouse, now_ms())
            })
            .await?;

        let register_result = dispatch!(self, create_table_entry, identifier, &location);
        if let Err(e) = register_result {
            self.writer.delete_best_effort(&location).await;
            return Err(e);
        }
        info!(%identifier, location, "table created");
        Ok(document)
    }

    #[instrument(skip(self))]
    pub async fn load_table(&self, identifier: &TableIdent) -> Result<(TableRecord, TableMetadata)> {
        let record = dispatch!(self, load_table_entry, identifier)?;
        let document = self.writer.read(&record.metadata_location).await?;
        Ok((record, document))
    }

    /// Attach an externally-written metadata file to the catalog without
    /// staging a new version. Fails with `metadata-absent` if
    /// `metadata_location` cannot be read as a valid document.
    #[instrument(skip(self))]
    pub async fn register_table(&self, identifier: &TableIdent, metadata_location: &str) -> Result<()> {
        if !self.namespace_exists(&identifier.namespace).await? {
            return Err(IcebergError::NoSuchNamespace(
                identifier.namespace.canonicalize(),
            ));
        }
        self.writer
            .read(metadata_location)
            .await
            .map_err(|_| IcebergError::MetadataAbsent(metadata_location.to_string()))?;
        dispatch!(self, register_table_entry, identifier, metadata_location)?;
        info!(%identifier, metadata_location, "table registered");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn drop_table(&self, identifier: &TableIdent) -> Result<()> {
        dispatch!(self, drop_table_entry, identifier)?;
        info!(%identifier, "table dropped");
        Ok(())
    }

    /// Rename a table: both identifiers must share a namespace the catalog
    /// knows about; cross-namespace rename is rejected up front.
    #[instrument(skip(self))]
    pub async fn rename_table(&self, from: &TableIdent, to: &TableIdent) -> Result<()> {
        if from.namespace != to.namespace {
            return Err(IcebergError::InvalidRename {
                from: from.storage_key(),
                to: to.storage_key(),
                reason: "cross-namespace rename is not supported".to_string(),
            });
        }
        dispatch!(self, rename_table_entry, from, to)?;
        info!(%from, %to, "table renamed");
        Ok(())
    }

    /// Commit a new metadata version: stage the next version at a path no
    /// other writer has claimed, then swing the catalog pointer at it under
    /// a retry loop. The CAS guard compares the *catalog's* stored location,
    /// not a structural diff, so retrying against a fixed `expected_location`
    /// cannot itself resolve a genuine conflict between two writers that
    /// both observed the same prior version — the loop exists to produce an
    /// attempt-count-tagged error, not to paper over racing writers.
    #[instrument(skip(self, requirements, updates), fields(attempts))]
    pub async fn commit_table(
        &self,
        identifier: &TableIdent,
        expected_location: &str,
        requirements: &[Requirement],
        updates: Vec<MetadataUpdate>,
    ) -> Result<TableMetadata> {
        let current = self.writer.read(expected_location).await?;
        crate::metadata::update::check_requirements(&current, requirements)?;

        if updates.is_empty() {
            return Ok(current);
        }

        let (new_location, next_document) = self
            .writer
            .stage_next_version(&self.warehouse, identifier, |candidate| {
                MetadataWriter::apply_updates(current.clone(), &updates, candidate, now_ms())
            })
            .await?;

        let cancel = CancellationToken::new();
        let commit_result = with_retry(self.retry_policy, &cancel, |_attempt| async {
            dispatch!(self, commit_table_entry, identifier, expected_location, &new_location)
        })
        .await;

        if let Err(e) = commit_result {
            self.writer.delete_best_effort(&new_location).await;
            if let IcebergError::ConcurrentModification { attempts, .. } = &e {
                warn!(%identifier, attempts, "commit-table lost the optimistic-concurrency race");
            }
            return Err(e);
        }
        info!(%identifier, location = new_location, "table committed");
        Ok(next_document)
    }
}
