//! Commit-time update/requirement model
//!
//! `commit-table` is driven by a list of requirements (checked against the
//! current metadata) and a list of updates (applied to produce the next
//! version). Update *application* here is conservative: this core bumps
//! `last-updated-ms` and appends a `metadata-log` entry, but does not
//! structurally rewrite schemas/partition-specs/snapshots from the update
//! records — that richer logic belongs to an external metadata builder
//! collaborator this core only drives.

use crate::error::{IcebergError, Result};
use crate::metadata::document::TableMetadata;

/// A structural requirement checked against the current metadata before a
/// commit is allowed to proceed.
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    AssertTableDoesNotExist,
    AssertCurrentSchemaId(i32),
    /// Any requirement kind not recognized by name; accepted if it passes
    /// the generic sanity checks.
    Unknown(String),
}

/// An update record driving the next metadata version. Beyond bookkeeping,
/// the specific structural effect of each kind is delegated to the external
/// builder collaborator; this core's conservative policy only
/// bumps timestamps and appends to `metadata-log`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataUpdate {
    SetProperties(std::collections::HashMap<String, String>),
    RemoveProperties(Vec<String>),
    /// Catch-all for update kinds whose structural effect is deferred to the
    /// builder collaborator; still counts as "an update" for the purposes of
    /// deciding whether a new version must be written.
    NoOp(String),
}

/// Validate each requirement against the current metadata: non-null
/// metadata, non-empty location, non-negative current-schema-id. Unknown
/// requirement kinds pass if they satisfy these generic checks.
pub fn check_requirements(metadata: &TableMetadata, requirements: &[Requirement]) -> Result<()> {
    if metadata.location.is_empty() {
        return Err(IcebergError::MetadataAbsent(
            "metadata has an empty location".to_string(),
        ));
    }
    if metadata.current_schema_id < 0 {
        return Err(IcebergError::MetadataAbsent(
            "metadata has a negative current-schema-id".to_string(),
        ));
    }
    for req in requirements {
        match req {
            Requirement::AssertTableDoesNotExist => {
                // Structural sanity only; existence itself is checked by the
                // catalog service before metadata is even loaded.
            }
            Requirement::AssertCurrentSchemaId(expected) => {
                if *expected != metadata.current_schema_id {
                    return Err(IcebergError::RequirementFailed {
                        identifier: metadata.location.clone(),
                        reason: format!(
                            "current-schema-id requirement mismatch: expected {expected}, found {}",
                            metadata.current_schema_id
                        ),
                    });
                }
            }
            Requirement::Unknown(_) => {}
        }
    }
    Ok(())
}

/// Apply `updates` to `metadata`, producing the next version's document.
/// Bumps `last-updated-ms` and appends one `metadata-log` entry pointing at
/// `new_location`; does not otherwise mutate schema/partition-spec/snapshot
/// state, per this core's conservative commit policy.
pub fn apply_updates(
    mut metadata: TableMetadata,
    updates: &[MetadataUpdate],
    new_location: &str,
    now_ms: i64,
) -> TableMetadata {
    for update in updates {
        if let MetadataUpdate::SetProperties(props) = update {
            metadata.properties.extend(props.clone());
        }
        if let MetadataUpdate::RemoveProperties(keys) = update {
            for key in keys {
                metadata.properties.remove(key);
            }
        }
    }
    metadata.last_updated_ms = now_ms;
    metadata.metadata_log.push(super::document::MetadataLogEntry {
        timestamp_ms: now_ms,
        metadata_file: new_location.to_string(),
    });
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::document::TableMetadata;
    use crate::metadata::schema::{NestedField, PartitionSpec, Schema, SortOrder, Type};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn sample_metadata() -> TableMetadata {
        TableMetadata {
            format_version: 2,
            table_uuid: Uuid::new_v4(),
            location: "/warehouse/data/a/t".to_string(),
            last_updated_ms: 0,
            last_column_id: 1,
            schemas: vec![Schema::builder()
                .with_schema_id(0)
                .with_fields(vec![NestedField::required(1, "id", Type::long())])
                .build()],
            current_schema_id: 0,
            partition_specs: vec![PartitionSpec::unpartitioned()],
            default_spec_id: 0,
            last_partition_id: 999,
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

    #[test]
    fn requirements_pass_for_sane_metadata() {
        let metadata = sample_metadata();
        assert!(check_requirements(&metadata, &[]).is_ok());
        assert!(check_requirements(
            &metadata,
            &[Requirement::AssertCurrentSchemaId(0)]
        )
        .is_ok());
    }

    #[test]
    fn requirement_mismatch_fails() {
        let metadata = sample_metadata();
        assert!(check_requirements(&metadata, &[Requirement::AssertCurrentSchemaId(7)]).is_err());
    }

    #[test]
    fn apply_updates_bumps_timestamp_and_logs() {
        let metadata = sample_metadata();
        let updated = apply_updates(metadata, &[MetadataUpdate::NoOp("noop".into())], "/v2.json", 42);
        assert_eq!(updated.last_updated_ms, 42);
        assert_eq!(updated.metadata_log.len(), 1);
        assert_eq!(updated.metadata_log[0].metadata_file, "/v2.json");
    }
}
