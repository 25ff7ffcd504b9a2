//! JSON-document catalog backend
//!
//! Persists the catalog-state document at a single configured URI, exposing
//! namespace and table operations with optimistic concurrency via the
//! shared [`crate::concurrency`] primitives.

pub mod state;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::concurrency::{Cache, ETag};
use crate::error::{IcebergError, Result};
use crate::identifier::{
    apply_property_update, validate_properties, Namespace, PropertyUpdateSummary, TableIdent,
};
use crate::io::ObjectStore;
use crate::time::now_ms;

use super::{namespace_storage_key, NamespaceRecord, TableRecord};
use state::{CatalogState, NamespaceEntry, TableEntry};

/// JSON-document realization of the catalog-state contract.
pub struct JsonBackend {
    store: Arc<dyn ObjectStore>,
    uri: String,
    cache: Cache<CatalogState>,
    write_lock: AsyncMutex<()>,
}

impl JsonBackend {
    /// Open (and, if absent, initialize) the catalog-state document at `uri`.
    pub async fn open(store: Arc<dyn ObjectStore>, uri: &str, catalog_name: &str) -> Result<Self> {
        if !store.exists(uri).await? {
            if let Some(parent) = std::path::Path::new(uri).parent() {
                store.create_dir_all(&parent.to_string_lossy()).await?;
            }
            let initial = CatalogState::new(catalog_name, now_ms());
            let bytes = serde_json::to_vec_pretty(&initial)?;
            store.write_atomic(uri, &bytes).await?;
        }
        Ok(Self {
            store,
            uri: uri.to_string(),
            cache: Cache::with_default_ttl(),
            write_lock: AsyncMutex::new(()),
        })
    }

    /// Read contract: try the cache first, else decode + validate + compute
    /// the etag from size/mtime.
    async fn read_state(&self) -> Result<(CatalogState, ETag)> {
        if let Some(cached) = self.cache.get() {
            return Ok(cached);
        }
        self.read_state_uncached().await
    }

    async fn read_state_uncached(&self) -> Result<(CatalogState, ETag)> {
        let stat = self.store.stat(&self.uri).await?;
        let bytes = self.store.read(&self.uri).await?;
        let state: CatalogState = serde_json::from_slice(&bytes)?;
        state.validate()?;
        let etag = ETag::from_file_stat(stat);
        self.cache.put(state.clone(), etag.clone());
        Ok((state, etag))
    }

    /// Write contract: acquire the lock, re-read the current etag, reject
    /// with `concurrent-modification` if `expected_etag` (when supplied)
    /// differs, then perform the atomic replace.
    async fn write_state<F>(&self, expected_etag: Option<&ETag>, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut CatalogState) -> Result<()>,
    {
        let _guard = self.write_lock.lock().await;
        let (mut state, current_etag) = self.read_state_uncached().await?;
        if let Some(expected) = expected_etag {
            if expected != &current_etag {
                return Err(IcebergError::ConcurrentModification {
                    operation: "json-backend-write".to_string(),
                    identifier: self.uri.clone(),
                    attempts: 1,
                });
            }
        }
        mutate(&mut state)?;
        state.updated_at = now_ms();
        let bytes = serde_json::to_vec_pretty(&state)?;
        self.store.write_atomic(&self.uri, &bytes).await?;
        self.cache.invalidate();
        Ok(())
    }

    pub async fn create_namespace(
        &self,
        ns: &Namespace,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        validate_properties(&properties)?;
        let key = namespace_storage_key(ns);
        self.write_state(None, |state| {
            if state.namespaces.contains_key(&key) {
                return Err(IcebergError::NamespaceExists(key.clone()));
            }
            let now = now_ms();
            state.namespaces.insert(
                key.clone(),
                NamespaceEntry {
                    properties,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(())
        })
        .await
    }

    pub async fn drop_namespace(&self, ns: &Namespace) -> Result<()> {
        let key = namespace_storage_key(ns);
        self.write_state(None, |state| {
            if !state.namespaces.contains_key(&key) {
                return Err(IcebergError::NoSuchNamespace(key.clone()));
            }
            let has_table = state.tables.values().any(|t| t.namespace == key);
            if has_table {
                return Err(IcebergError::NamespaceNotEmpty(key.clone()));
            }
            state.namespaces.remove(&key);
            Ok(())
        })
        .await
    }

    pub async fn namespace_exists(&self, ns: &Namespace) -> Result<bool> {
        let (state, _) = self.read_state().await?;
        Ok(state.namespaces.contains_key(&namespace_storage_key(ns)))
    }

    pub async fn load_namespace_properties(&self, ns: &Namespace) -> Result<NamespaceRecord> {
        let key = namespace_storage_key(ns);
        let (state, _) = self.read_state().await?;
        let entry = state
            .namespaces
            .get(&key)
            .ok_or_else(|| IcebergError::NoSuchNamespace(key.clone()))?;
        Ok(NamespaceRecord {
            properties: entry.properties.clone(),
            created_at_ms: entry.created_at,
            updated_at_ms: entry.updated_at,
        })
    }

    pub async fn update_namespace_properties(
        &self,
        ns: &Namespace,
        removals: &[String],
        updates: &HashMap<String, String>,
    ) -> Result<PropertyUpdateSummary> {
        let key = namespace_storage_key(ns);
        let removals = removals.to_vec();
        let updates = updates.clone();
        let mut summary = PropertyUpdateSummary::default();
        self.write_state(None, |state| {
            let entry = state
                .namespaces
                .get_mut(&key)
                .ok_or_else(|| IcebergError::NoSuchNamespace(key.clone()))?;
            summary = apply_property_update(&mut entry.properties, &removals, &updates)?;
            entry.updated_at = now_ms();
            Ok(())
        })
        .await?;
        Ok(summary)
    }

    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let (state, _) = self.read_state().await?;
        Ok(state
            .namespaces
            .keys()
            .map(|s| Namespace::parse(s))
            .collect())
    }

    pub async fn create_table_entry(
        &self,
        identifier: &TableIdent,
        metadata_location: &str,
    ) -> Result<()> {
        let ns_key = identifier.namespace.canonicalize();
        let key = identifier.storage_key();
        let metadata_location = metadata_location.to_string();
        let name = identifier.name.clone();
        self.write_state(None, |state| {
            if !state.namespaces.contains_key(&ns_key) {
                return Err(IcebergError::NoSuchNamespace(ns_key.clone()));
            }
            if state.tables.contains_key(&key) {
                return Err(IcebergError::TableExists(key.clone()));
            }
            let now = now_ms();
            state.tables.insert(
                key.clone(),
                TableEntry {
                    namespace: ns_key.clone(),
                    name,
                    metadata_location,
                    previous_metadata_location: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(())
        })
        .await
    }

    pub async fn drop_table_entry(&self, identifier: &TableIdent) -> Result<()> {
        let key = identifier.storage_key();
        self.write_state(None, |state| {
            if state.tables.remove(&key).is_none() {
                return Err(IcebergError::NoSuchTable(key.clone()));
            }
            Ok(())
        })
        .await
    }

    pub async fn table_exists(&self, identifier: &TableIdent) -> Result<bool> {
        let (state, _) = self.read_state().await?;
        Ok(state.tables.contains_key(&identifier.storage_key()))
    }

    pub async fn load_table_entry(&self, identifier: &TableIdent) -> Result<TableRecord> {
        let key = identifier.storage_key();
        let (state, _) = self.read_state().await?;
        let entry = state
            .tables
            .get(&key)
            .ok_or_else(|| IcebergError::NoSuchTable(key.clone()))?;
        Ok(table_record(identifier.clone(), entry))
    }

    pub async fn list_tables(&self, ns: &Namespace) -> Result<Vec<TableIdent>> {
        let ns_key = namespace_storage_key(ns);
        let (state, _) = self.read_state().await?;
        if !state.namespaces.contains_key(&ns_key) {
            return Err(IcebergError::NoSuchNamespace(ns_key));
        }
        let mut out = Vec::new();
        for entry in state.tables.values() {
            if entry.namespace == ns_key {
                out.push(TableIdent::new(ns.clone(), entry.name.clone())?);
            }
        }
        Ok(out)
    }

    pub async fn rename_table_entry(&self, from: &TableIdent, to: &TableIdent) -> Result<()> {
        let from_key = from.storage_key();
        let to_key = to.storage_key();
        let to_ns_key = to.namespace.canonicalize();
        let to_name = to.name.clone();
        self.write_state(None, |state| {
            if !state.namespaces.contains_key(&to_ns_key) {
                return Err(IcebergError::NoSuchNamespace(to_ns_key.clone()));
            }
            if state.tables.contains_key(&to_key) {
                return Err(IcebergError::TableExists(to_key.clone()));
            }
            let mut entry = state
                .tables
                .remove(&from_key)
                .ok_or_else(|| IcebergError::NoSuchTable(from_key.clone()))?;
            entry.namespace = to_ns_key;
            entry.name = to_name;
            entry.updated_at = now_ms();
            state.tables.insert(to_key.clone(), entry);
            Ok(())
        })
        .await
    }

    pub async fn register_table_entry(
        &self,
        identifier: &TableIdent,
        metadata_location: &str,
    ) -> Result<()> {
        self.create_table_entry(identifier, metadata_location).await
    }

    /// Conditional update guarded by the observed current metadata location:
    /// single attempt, caller retries.
    pub async fn commit_table_entry(
        &self,
        identifier: &TableIdent,
        expected_location: &str,
        new_location: &str,
    ) -> Result<()> {
        let key = identifier.storage_key();
        let expected_location = expected_location.to_string();
        let new_location = new_location.to_string();
        self.write_state(None, |state| {
            let entry = state
                .tables
                .get_mut(&key)
                .ok_or_else(|| IcebergError::NoSuchTable(key.clone()))?;
            if entry.metadata_location != expected_location {
                return Err(IcebergError::ConcurrentModification {
                    operation: "commit-table".to_string(),
                    identifier: key.clone(),
                    attempts: 1,
                });
            }
            entry.previous_metadata_location = Some(entry.metadata_location.clone());
            entry.metadata_location = new_location;
            entry.updated_at = now_ms();
            Ok(())
        })
        .await
    }
}

fn table_record(identifier: TableIdent, entry: &TableEntry) -> TableRecord {
    TableRecord {
        identifier,
        metadata_location: entry.metadata_location.clone(),
        previous_metadata_location: entry.previous_metadata_location.clone(),
        created_at_ms: entry.created_at,
        updated_at_ms: entry.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStore;

    async fn backend() -> JsonBackend {
        let store = Arc::new(MemoryStore::new());
        JsonBackend::open(store, "catalog.json", "test").await.unwrap()
    }

    fn ns(seg: &str) -> Namespace {
        Namespace::new(vec![seg.to_string()]).unwrap()
    }

    #[tokio::test]
    async fn namespace_lifecycle() {
        let backend = backend().await;
        let a = ns("a");
        backend
            .create_namespace(&a, HashMap::from([("owner".to_string(), "u".to_string())]))
            .await
            .unwrap();
        assert!(backend.namespace_exists(&a).await.unwrap());
        let props = backend.load_namespace_properties(&a).await.unwrap();
        assert_eq!(props.properties.get("owner"), Some(&"u".to_string()));

        let err = backend
            .create_namespace(&a, HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NamespaceExists);

        backend.drop_namespace(&a).await.unwrap();
        assert!(!backend.namespace_exists(&a).await.unwrap());
    }

    #[tokio::test]
    async fn drop_namespace_fails_when_table_present() {
        let backend = backend().await;
        let a = ns("a");
        backend.create_namespace(&a, HashMap::new()).await.unwrap();
        let ident = TableIdent::new(a.clone(), "t").unwrap();
        backend.create_table_entry(&ident, "/wh/metadata/a/t/v1.metadata.json").await.unwrap();

        let err = backend.drop_namespace(&a).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NamespaceNotEmpty);

        backend.drop_table_entry(&ident).await.unwrap();
        backend.drop_namespace(&a).await.unwrap();
    }

    #[tokio::test]
    async fn commit_table_rejects_stale_location() {
        let backend = backend().await;
        let a = ns("a");
        backend.create_namespace(&a, HashMap::new()).await.unwrap();
        let ident = TableIdent::new(a, "t").unwrap();
        backend
            .create_table_entry(&ident, "/wh/metadata/a/t/v1.metadata.json")
            .await
            .unwrap();

        backend
            .commit_table_entry(
                &ident,
                "/wh/metadata/a/t/v1.metadata.json",
                "/wh/metadata/a/t/v2.metadata.json",
            )
            .await
            .unwrap();

        let err = backend
            .commit_table_entry(
                &ident,
                "/wh/metadata/a/t/v1.metadata.json",
                "/wh/metadata/a/t/v3.metadata.json",
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConcurrentModification);

        let record = backend.load_table_entry(&ident).await.unwrap();
        assert_eq!(record.metadata_location, "/wh/metadata/a/t/v2.metadata.json");
        assert_eq!(
            record.previous_metadata_location,
            Some("/wh/metadata/a/t/v1.metadata.json".to_string())
        );
    }
}
