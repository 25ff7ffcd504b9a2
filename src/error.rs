//! Error taxonomy for the catalog layer
//!
//! One enum, one `kind` per spec error class, matching the teacher crate's
//! convention of a single `thiserror`-derived enum per subsystem with
//! `#[from]` conversions for the underlying transport/storage errors.

use std::fmt;

/// Stable error kind, surfaced to callers (and eventually the CLI) for exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidIdentifier,
    InvalidProperty,
    NamespaceExists,
    NoSuchNamespace,
    NamespaceNotEmpty,
    TableExists,
    NoSuchTable,
    InvalidRename,
    RequirementFailed,
    ConcurrentModification,
    MetadataAbsent,
    Io,
    Remote,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidIdentifier => "invalid-identifier",
            ErrorKind::InvalidProperty => "invalid-property",
            ErrorKind::NamespaceExists => "namespace-exists",
            ErrorKind::NoSuchNamespace => "no-such-namespace",
            ErrorKind::NamespaceNotEmpty => "namespace-not-empty",
            ErrorKind::TableExists => "table-exists",
            ErrorKind::NoSuchTable => "no-such-table",
            ErrorKind::InvalidRename => "invalid-rename",
            ErrorKind::RequirementFailed => "requirement-failed",
            ErrorKind::ConcurrentModification => "concurrent-modification",
            ErrorKind::MetadataAbsent => "metadata-absent",
            ErrorKind::Io => "io-error",
            ErrorKind::Remote => "remote-error",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Errors produced by the catalog service and its backends.
#[derive(Debug, thiserror::Error)]
pub enum IcebergError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid property: {0}")]
    InvalidProperty(String),

    #[error("namespace already exists: {0}")]
    NamespaceExists(String),

    #[error("no such namespace: {0}")]
    NoSuchNamespace(String),

    #[error("namespace not empty: {0}")]
    NamespaceNotEmpty(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("no such table: {0}")]
    NoSuchTable(String),

    #[error("invalid rename from {from} to {to}: {reason}")]
    InvalidRename {
        from: String,
        to: String,
        reason: String,
    },

    #[error("commit requirement failed for {identifier}: {reason}")]
    RequirementFailed { identifier: String, reason: String },

    #[error("concurrent modification on {operation} ({identifier}) after {attempts} attempt(s)")]
    ConcurrentModification {
        operation: String,
        identifier: String,
        attempts: u32,
    },

    #[error("metadata absent at {0}")]
    MetadataAbsent(String),

    #[error("io error during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("remote catalog error: {0}")]
    Remote(String),

    #[cfg(feature = "sql-backend")]
    #[error("sql backend error: {0}")]
    Sql(#[from] duckdb::Error),

    #[cfg(feature = "rest-backend")]
    #[error("rest transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("operation cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl IcebergError {
    /// Stable kind tag, independent of the human-readable message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IcebergError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            IcebergError::InvalidProperty(_) => ErrorKind::InvalidProperty,
            IcebergError::NamespaceExists(_) => ErrorKind::NamespaceExists,
            IcebergError::NoSuchNamespace(_) => ErrorKind::NoSuchNamespace,
            IcebergError::NamespaceNotEmpty(_) => ErrorKind::NamespaceNotEmpty,
            IcebergError::TableExists(_) => ErrorKind::TableExists,
            IcebergError::NoSuchTable(_) => ErrorKind::NoSuchTable,
            IcebergError::InvalidRename { .. } => ErrorKind::InvalidRename,
            IcebergError::RequirementFailed { .. } => ErrorKind::RequirementFailed,
            IcebergError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            IcebergError::MetadataAbsent(_) => ErrorKind::MetadataAbsent,
            IcebergError::Io { .. } => ErrorKind::Io,
            IcebergError::Serde(_) => ErrorKind::Io,
            IcebergError::Remote(_) => ErrorKind::Remote,
            #[cfg(feature = "sql-backend")]
            IcebergError::Sql(_) => ErrorKind::Io,
            #[cfg(feature = "rest-backend")]
            IcebergError::Transport(_) => ErrorKind::Remote,
            IcebergError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        IcebergError::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// Result type used throughout the catalog layer.
pub type Result<T> = std::result::Result<T, IcebergError>;
