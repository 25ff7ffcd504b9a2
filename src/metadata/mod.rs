//! Metadata document writer: schema/type model, the v2 document shape,
//! commit requirements/updates, and durable version writing.

pub mod document;
pub mod schema;
pub mod update;
pub mod writer;

pub use document::TableMetadata;
pub use schema::{NestedField, PartitionSpec, Schema, SortOrder, Type};
pub use update::{MetadataUpdate, Requirement};
pub use writer::MetadataWriter;
