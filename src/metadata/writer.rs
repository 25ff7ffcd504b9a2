//! Metadata Document Writer
//!
//! Chooses metadata file locations under a warehouse root, serializes the
//! v2 JSON document, and writes it durably and atomically. Never overwrites
//! an existing metadata version.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::error::{IcebergError, Result};
use crate::identifier::TableIdent;
use crate::io::ObjectStore;
use crate::metadata::document::{TableMetadata, INITIAL_LAST_PARTITION_ID};
use crate::metadata::schema::{PartitionSpec, Schema, SortOrder};
use crate::metadata::update::{apply_updates, MetadataUpdate};

static VERSION_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v(\d+)\.metadata\.json$").unwrap());

/// Writes and locates Iceberg v2 metadata documents under a warehouse root.
pub struct MetadataWriter {
    store: Arc<dyn ObjectStore>,
}

impl MetadataWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// `<warehouse>/metadata/<namespace-segments...>/<table>` directory for `identifier`.
    pub fn metadata_dir(warehouse: &str, identifier: &TableIdent) -> String {
        let mut parts: Vec<&str> = vec![warehouse, "metadata"];
        let ns_segments: Vec<&str> = identifier
            .namespace
            .segments()
            .iter()
            .map(String::as_str)
            .collect();
        parts.extend(ns_segments);
        parts.push(identifier.name.as_str());
        crate::io::join(parts[0], &parts[1..])
    }

    /// Data location for `identifier`, under `<warehouse>/data/...`, assigned at table creation.
    pub fn data_location(warehouse: &str, identifier: &TableIdent) -> String {
        let mut parts: Vec<&str> = vec![warehouse, "data"];
        let ns_segments: Vec<&str> = identifier
            .namespace
            .segments()
            .iter()
            .map(String::as_str)
            .collect();
        parts.extend(ns_segments);
        parts.push(identifier.name.as_str());
        crate::io::join(parts[0], &parts[1..])
    }

    /// Inspect the metadata directory and return the location for version
    /// `N+1`, where `N` is the maximum version found among filenames
    /// matching `^v(\d+)\.metadata\.json$`. Malformed filenames are ignored,
    /// never parsed; an absent directory defaults to version 1.
    pub async fn next_metadata_location(
        &self,
        warehouse: &str,
        identifier: &TableIdent,
    ) -> Result<String> {
        let dir = Self::metadata_dir(warehouse, identifier);
        let entries = self.store.list(&dir).await?;
        let max_version = entries
            .iter()
            .filter_map(|name| VERSION_FILE_RE.captures(name))
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| m.as_str().parse::<u64>().ok())
            .max();
        let next = max_version.map(|v| v + 1).unwrap_or(1);
        Ok(crate::io::join(&dir, &[&format!("v{next}.metadata.json")]))
    }

    /// Create-initial-metadata(identifier, schema, warehouse): allocates a
    /// fresh `table-uuid`, derives `last-column-id` from the schema, sets
    /// timestamps, and initializes empty snapshot/log arrays.
    pub fn build_initial_metadata(
        identifier: &TableIdent,
        schema: Schema,
        warehouse: &str,
        now_ms: i64,
    ) -> TableMetadata {
        let last_column_id = schema.max_field_id();
        TableMetadata {
            format_version: 2,
            table_uuid: Uuid::new_v4(),
            location: Self::data_location(warehouse, identifier),
            last_updated_ms: now_ms,
            last_column_id,
            current_schema_id: schema.schema_id,
            schemas: vec![schema],
            partition_specs: vec![PartitionSpec::unpartitioned()],
            default_spec_id: 0,
            last_partition_id: INITIAL_LAST_PARTITION_ID,
            sort_orders: vec![SortOrder::unsorted()],
            default_sort_order_id: 0,
            snapshots: Vec::new(),
            current_snapshot_id: None,
            refs: HashMap::new(),
            snapshot_log: Vec::new(),
            metadata_log: Vec::new(),
            properties: HashMap::new(),
        }
    }

    /// Stage the next metadata version for `identifier`: computes a
    /// candidate `vN.metadata.json` location and writes `document_for(path)`
    /// to it only if nothing else has claimed that path first. Two
    /// concurrent callers racing for the same candidate never both win;
    /// the loser recomputes against the now-larger directory listing and
    /// tries again, bounded by `MAX_STAGE_ATTEMPTS`. Never overwrites an
    /// existing version.
    pub async fn stage_next_version(
        &self,
        warehouse: &str,
        identifier: &TableIdent,
        document_for: impl Fn(&str) -> TableMetadata,
    ) -> Result<(String, TableMetadata)> {
        const MAX_STAGE_ATTEMPTS: u32 = 20;
        for _ in 0..MAX_STAGE_ATTEMPTS {
            let candidate = self.next_metadata_location(warehouse, identifier).await?;
            let document = document_for(&candidate);
            let json = serde_json::to_vec_pretty(&document)?;
            if let Some(parent) = std::path::Path::new(&candidate).parent() {
                self.store
                    .create_dir_all(&parent.to_string_lossy())
                    .await?;
            }
            if self.store.write_exclusive(&candidate, &json).await? {
                return Ok((candidate, document));
            }
        }
        Err(IcebergError::ConcurrentModification {
            operation: "stage-metadata-version".to_string(),
            identifier: identifier.storage_key(),
            attempts: MAX_STAGE_ATTEMPTS,
        })
    }

    /// Write `document` to `location`: serialize with stable indentation,
    /// write to a sibling `.tmp`, fsync, rename into place. The parent
    /// directory must already exist.
    pub async fn write(&self, document: &TableMetadata, location: &str) -> Result<()> {
        let json = serde_json::to_vec_pretty(document)?;
        self.store.write_atomic(location, &json).await
    }

    /// Create the parent directory for `location`, then write the document.
    /// Used by `create-initial-metadata` and `commit-table`, which both
    /// need the metadata directory to exist before the first write.
    pub async fn write_ensuring_dir(&self, document: &TableMetadata, location: &str) -> Result<()> {
        if let Some(parent) = std::path::Path::new(location).parent() {
            self.store
                .create_dir_all(&parent.to_string_lossy())
                .await?;
        }
        self.write(document, location).await
    }

    /// Read and parse an existing metadata document.
    pub async fn read(&self, location: &str) -> Result<TableMetadata> {
        let bytes = self.store.read(location).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Apply-updates(current, updates): produces the new document for a
    /// commit, bumping timestamps and appending to `metadata-log`.
    pub fn apply_updates(
        current: TableMetadata,
        updates: &[MetadataUpdate],
        new_location: &str,
        now_ms: i64,
    ) -> TableMetadata {
        apply_updates(current, updates, new_location, now_ms)
    }

    /// Best-effort delete of a staged document, used when a catalog commit
    /// fails after the metadata file was already written, leaving an orphan
    /// behind.
    pub async fn delete_best_effort(&self, location: &str) {
        if let Err(e) = self.store.remove(location).await {
            tracing::warn!(location, error = %e, "failed to remove orphaned metadata file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Namespace;
    use crate::io::MemoryStore;
    use crate::metadata::schema::{NestedField, Type};

    fn ident() -> TableIdent {
        TableIdent::new(Namespace::new(vec!["a".into()]).unwrap(), "t").unwrap()
    }

    #[tokio::test]
    async fn next_location_defaults_to_v1_when_dir_absent() {
        let store = Arc::new(MemoryStore::new());
        let writer = MetadataWriter::new(store);
        let loc = writer.next_metadata_location("/wh", &ident()).await.unwrap();
        assert!(loc.ends_with("v1.metadata.json"));
    }

    #[tokio::test]
    async fn next_location_skips_malformed_files() {
        let store = Arc::new(MemoryStore::new());
        let dir = MetadataWriter::metadata_dir("/wh", &ident());
        store
            .write(&crate::io::join(&dir, &["v1.metadata.json"]), b"{}")
            .await
            .unwrap();
        store
            .write(&crate::io::join(&dir, &["not-a-version.json"]), b"{}")
            .await
            .unwrap();
        store
            .write(&crate::io::join(&dir, &["v3.metadata.json"]), b"{}")
            .await
            .unwrap();
        let writer = MetadataWriter::new(store);
        let loc = writer.next_metadata_location("/wh", &ident()).await.unwrap();
        assert!(loc.ends_with("v4.metadata.json"));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let writer = MetadataWriter::new(store);
        let schema = Schema::builder()
            .with_schema_id(0)
            .with_fields(vec![NestedField::required(1, "id", Type::long())])
            .build();
        let doc = MetadataWriter::build_initial_metadata(&ident(), schema, "/wh", 0);
        let loc = "/wh/metadata/a/t/v1.metadata.json";
        writer.write_ensuring_dir(&doc, loc).await.unwrap();
        let back = writer.read(loc).await.unwrap();
        assert_eq!(back, doc);
    }

    #[tokio::test]
    async fn atomic_write_failure_leaves_target_untouched() {
        let store = Arc::new(MemoryStore::new());
        store.write("state.json", b"v1").await.unwrap();
        store.inject_failure_before_rename();
        let writer = MetadataWriter::new(store.clone());
        let schema = Schema::builder().with_schema_id(0).build();
        let doc = MetadataWriter::build_initial_metadata(&ident(), schema, "/wh", 0);
        let err = writer.write(&doc, "state.json").await;
        assert!(err.is_err());
        assert_eq!(store.read("state.json").await.unwrap(), b"v1".to_vec());
    }
}
