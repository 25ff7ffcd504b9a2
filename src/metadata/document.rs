//! Iceberg v2 table-metadata JSON document model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schema::{PartitionSpec, Schema, SortOrder};

/// Initial `last-partition-id` assigned to a freshly created table.
pub const INITIAL_LAST_PARTITION_ID: i32 = 999;

/// A table metadata snapshot reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "snapshot-id")]
    pub snapshot_id: i64,
    #[serde(rename = "parent-snapshot-id", skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<i64>,
    #[serde(rename = "sequence-number")]
    pub sequence_number: i64,
    #[serde(rename = "timestamp-ms")]
    pub timestamp_ms: i64,
    #[serde(rename = "manifest-list")]
    pub manifest_list: String,
    pub summary: HashMap<String, String>,
    #[serde(rename = "schema-id", skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<i32>,
}

/// A named reference (branch/tag) into the snapshot history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRef {
    #[serde(rename = "snapshot-id")]
    pub snapshot_id: i64,
    #[serde(rename = "type")]
    pub ref_type: String,
}

/// An entry in `snapshot-log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLogEntry {
    #[serde(rename = "timestamp-ms")]
    pub timestamp_ms: i64,
    #[serde(rename = "snapshot-id")]
    pub snapshot_id: i64,
}

/// An entry in `metadata-log`, appended on every successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataLogEntry {
    #[serde(rename = "timestamp-ms")]
    pub timestamp_ms: i64,
    #[serde(rename = "metadata-file")]
    pub metadata_file: String,
}

/// The Iceberg v2 table-metadata document, in full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(rename = "format-version")]
    pub format_version: u8,
    #[serde(rename = "table-uuid")]
    pub table_uuid: Uuid,
    pub location: String,
    #[serde(rename = "last-updated-ms")]
    pub last_updated_ms: i64,
    #[serde(rename = "last-column-id")]
    pub last_column_id: i32,
    pub schemas: Vec<Schema>,
    #[serde(rename = "current-schema-id")]
    pub current_schema_id: i32,
    #[serde(rename = "partition-specs")]
    pub partition_specs: Vec<PartitionSpec>,
    #[serde(rename = "default-spec-id")]
    pub default_spec_id: i32,
    #[serde(rename = "last-partition-id")]
    pub last_partition_id: i32,
    #[serde(rename = "sort-orders")]
    pub sort_orders: Vec<SortOrder>,
    #[serde(rename = "default-sort-order-id")]
    pub default_sort_order_id: i32,
    pub snapshots: Vec<Snapshot>,
    #[serde(rename = "current-snapshot-id")]
    pub current_snapshot_id: Option<i64>,
    #[serde(default)]
    pub refs: HashMap<String, SnapshotRef>,
    #[serde(rename = "snapshot-log", default)]
    pub snapshot_log: Vec<SnapshotLogEntry>,
    #[serde(rename = "metadata-log", default)]
    pub metadata_log: Vec<MetadataLogEntry>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl TableMetadata {
    /// Look up the current schema by `current-schema-id`.
    pub fn current_schema(&self) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == self.current_schema_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::schema::{NestedField, Type};

    #[test]
    fn round_trips_through_json() {
        let schema = Schema::builder()
            .with_schema_id(0)
            .with_fields(vec![NestedField::required(1, "id", Type::long())])
            .build();
        let doc = TableMetadata {
            format_version: 2,
            table_uuid: Uuid::new_v4(),
            location: "/warehouse/data/a/t".to_string(),
            last_updated_ms: 0,
            last_column_id: 1,
            schemas: vec![schema],
            current_schema_id: 0,
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
        };
        let json = serde_json::to_string_pretty(&doc).unwrap();
        let back: TableMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
        assert!(back.current_schema().is_some());
    }
}
