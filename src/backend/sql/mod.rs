//! SQL-relational catalog backend
//!
//! Embedded DuckDB persistence with two tables, `catalog_tables` and
//! `catalog_namespace_properties`, matching the teacher's `DuckDBBackend`
//! pattern of a `Mutex<duckdb::Connection>` plus an idempotent schema
//! migration run on open.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{IcebergError, Result};
use crate::identifier::{validate_properties, Namespace, PropertyUpdateSummary, TableIdent};
use crate::time::now_ms;

use super::{NamespaceRecord, TableRecord};

/// Reserved property key used to encode namespace existence as a row.
/// Cannot be removed via `update_namespace_properties`.
const EXISTS_KEY: &str = "exists";

const SCHEMA_VERSION: i32 = 1;

/// Embedded-SQL realization of the catalog-state contract.
pub struct SqlBackend {
    catalog_name: String,
    connection: Mutex<duckdb::Connection>,
}

impl SqlBackend {
    pub fn open(path: impl AsRef<Path>, catalog_name: &str) -> Result<Self> {
        let connection = duckdb::Connection::open(path.as_ref())?;
        let backend = Self {
            catalog_name: catalog_name.to_string(),
            connection: Mutex::new(connection),
        };
        backend.migrate()?;
        Ok(backend)
    }

    pub fn in_memory(catalog_name: &str) -> Result<Self> {
        let connection = duckdb::Connection::open_in_memory()?;
        let backend = Self {
            catalog_name: catalog_name.to_string(),
            connection: Mutex::new(connection),
        };
        backend.migrate()?;
        Ok(backend)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.connection.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS catalog_schema_version (version INTEGER NOT NULL);
             CREATE TABLE IF NOT EXISTS catalog_tables (
                 catalog_name TEXT NOT NULL,
                 table_namespace TEXT NOT NULL,
                 table_name TEXT NOT NULL,
                 metadata_location TEXT NOT NULL,
                 previous_metadata_location TEXT,
                 created_at BIGINT NOT NULL,
                 updated_at BIGINT NOT NULL,
                 PRIMARY KEY (catalog_name, table_namespace, table_name)
             );
             CREATE TABLE IF NOT EXISTS catalog_namespace_properties (
                 catalog_name TEXT NOT NULL,
                 namespace TEXT NOT NULL,
                 property_key TEXT NOT NULL,
                 property_value TEXT NOT NULL,
                 PRIMARY KEY (catalog_name, namespace, property_key)
             );",
        )?;
        let version: Option<i32> = conn
            .query_row(
                "SELECT version FROM catalog_schema_version LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();
        if version.is_none() {
            conn.execute(
                "INSERT INTO catalog_schema_version (version) VALUES (?)",
                [SCHEMA_VERSION],
            )?;
        }
        Ok(())
    }

    fn namespace_exists_locked(
        conn: &duckdb::Connection,
        catalog_name: &str,
        ns_key: &str,
    ) -> Result<bool> {
        let value: Option<String> = conn
            .query_row(
                "SELECT property_value FROM catalog_namespace_properties \
                 WHERE catalog_name = ? AND namespace = ? AND property_key = ?",
                duckdb::params![catalog_name, ns_key, EXISTS_KEY],
                |row| row.get(0),
            )
            .ok();
        Ok(value.as_deref() == Some("true"))
    }

    pub async fn create_namespace(
        &self,
        ns: &Namespace,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        validate_properties(&properties)?;
        let ns_key = ns.canonicalize();
        let conn = self.connection.lock().unwrap();
        if Self::namespace_exists_locked(&conn, &self.catalog_name, &ns_key)? {
            return Err(IcebergError::NamespaceExists(ns_key));
        }
        conn.execute(
            "INSERT INTO catalog_namespace_properties (catalog_name, namespace, property_key, property_value) VALUES (?, ?, ?, ?)",
            duckdb::params![self.catalog_name, ns_key, EXISTS_KEY, "true"],
        )?;
        for (k, v) in &properties {
            conn.execute(
                "INSERT INTO catalog_namespace_properties (catalog_name, namespace, property_key, property_value) VALUES (?, ?, ?, ?)",
                duckdb::params![self.catalog_name, ns_key, k, v],
            )?;
        }
        Ok(())
    }

    pub async fn drop_namespace(&self, ns: &Namespace) -> Result<()> {
        let ns_key = ns.canonicalize();
        let conn = self.connection.lock().unwrap();
        if !Self::namespace_exists_locked(&conn, &self.catalog_name, &ns_key)? {
            return Err(IcebergError::NoSuchNamespace(ns_key));
        }
        let table_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM catalog_tables WHERE catalog_name = ? AND table_namespace = ?",
            duckdb::params![self.catalog_name, ns_key],
            |row| row.get(0),
        )?;
        if table_count > 0 {
            return Err(IcebergError::NamespaceNotEmpty(ns_key));
        }
        conn.execute(
            "DELETE FROM catalog_namespace_properties WHERE catalog_name = ? AND namespace = ?",
            duckdb::params![self.catalog_name, ns_key],
        )?;
        Ok(())
    }

    pub async fn namespace_exists(&self, ns: &Namespace) -> Result<bool> {
        let conn = self.connection.lock().unwrap();
        Self::namespace_exists_locked(&conn, &self.catalog_name, &ns.canonicalize())
    }

    pub async fn load_namespace_properties(&self, ns: &Namespace) -> Result<NamespaceRecord> {
        let ns_key = ns.canonicalize();
        let conn = self.connection.lock().unwrap();
        if !Self::namespace_exists_locked(&conn, &self.catalog_name, &ns_key)? {
            return Err(IcebergError::NoSuchNamespace(ns_key));
        }
        let mut stmt = conn.prepare(
            "SELECT property_key, property_value FROM catalog_namespace_properties \
             WHERE catalog_name = ? AND namespace = ? AND property_key <> ?",
        )?;
        let mut rows = stmt.query(duckdb::params![self.catalog_name, ns_key, EXISTS_KEY])?;
        let mut properties = HashMap::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let value: String = row.get(1)?;
            properties.insert(key, value);
        }
        Ok(NamespaceRecord {
            properties,
            created_at_ms: 0,
            updated_at_ms: now_ms(),
        })
    }

    pub async fn update_namespace_properties(
        &self,
        ns: &Namespace,
        removals: &[String],
        updates: &HashMap<String, String>,
    ) -> Result<PropertyUpdateSummary> {
        let ns_key = ns.canonicalize();
        let mut conn = self.connection.lock().unwrap();
        if !Self::namespace_exists_locked(&conn, &self.catalog_name, &ns_key)? {
            return Err(IcebergError::NoSuchNamespace(ns_key));
        }
        for key in removals {
            if key == EXISTS_KEY {
                return Err(IcebergError::InvalidProperty(
                    "'exists' is a reserved property key".to_string(),
                ));
            }
        }
        validate_properties(updates)?;

        let tx = conn.transaction()?;
        let mut summary = PropertyUpdateSummary::default();
        for key in removals {
            let affected = tx.execute(
                "DELETE FROM catalog_namespace_properties \
                 WHERE catalog_name = ? AND namespace = ? AND property_key = ?",
                duckdb::params![self.catalog_name, ns_key, key],
            )?;
            if affected > 0 {
                summary.removed.push(key.clone());
            } else {
                summary.missing.push(key.clone());
            }
        }
        for (k, v) in updates {
            tx.execute(
                "INSERT OR REPLACE INTO catalog_namespace_properties (catalog_name, namespace, property_key, property_value) VALUES (?, ?, ?, ?)",
                duckdb::params![self.catalog_name, ns_key, k, v],
            )?;
            summary.updated.push(k.clone());
        }
        tx.commit()?;
        Ok(summary)
    }

    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let conn = self.connection.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT namespace FROM catalog_namespace_properties \
             WHERE catalog_name = ? AND property_key = ?",
        )?;
        let mut rows = stmt.query(duckdb::params![self.catalog_name, EXISTS_KEY])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            out.push(Namespace::parse(&key));
        }
        Ok(out)
    }

    pub async fn create_table_entry(
        &self,
        identifier: &TableIdent,
        metadata_location: &str,
    ) -> Result<()> {
        let ns_key = identifier.namespace.canonicalize();
        let conn = self.connection.lock().unwrap();
        if !Self::namespace_exists_locked(&conn, &self.catalog_name, &ns_key)? {
            return Err(IcebergError::NoSuchNamespace(ns_key));
        }
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM catalog_tables WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
                duckdb::params![self.catalog_name, ns_key, identifier.name],
                |row| row.get(0),
            )
            .ok();
        if exists.is_some() {
            return Err(IcebergError::TableExists(identifier.storage_key()));
        }
        let now = now_ms();
        conn.execute(
            "INSERT INTO catalog_tables (catalog_name, table_namespace, table_name, metadata_location, previous_metadata_location, created_at, updated_at) VALUES (?, ?, ?, ?, NULL, ?, ?)",
            duckdb::params![self.catalog_name, ns_key, identifier.name, metadata_location, now, now],
        )?;
        Ok(())
    }

    pub async fn drop_table_entry(&self, identifier: &TableIdent) -> Result<()> {
        let ns_key = identifier.namespace.canonicalize();
        let conn = self.connection.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM catalog_tables WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
            duckdb::params![self.catalog_name, ns_key, identifier.name],
        )?;
        if affected == 0 {
            return Err(IcebergError::NoSuchTable(identifier.storage_key()));
        }
        Ok(())
    }

    pub async fn table_exists(&self, identifier: &TableIdent) -> Result<bool> {
        let ns_key = identifier.namespace.canonicalize();
        let conn = self.connection.lock().unwrap();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM catalog_tables WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
                duckdb::params![self.catalog_name, ns_key, identifier.name],
                |row| row.get(0),
            )
            .ok();
        Ok(exists.is_some())
    }

    pub async fn load_table_entry(&self, identifier: &TableIdent) -> Result<TableRecord> {
        let ns_key = identifier.namespace.canonicalize();
        let conn = self.connection.lock().unwrap();
        let row = conn.query_row(
            "SELECT metadata_location, previous_metadata_location, created_at, updated_at \
             FROM catalog_tables WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
            duckdb::params![self.catalog_name, ns_key, identifier.name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        );
        match row {
            Ok((metadata_location, previous_metadata_location, created_at, updated_at)) => {
                Ok(TableRecord {
                    identifier: identifier.clone(),
                    metadata_location,
                    previous_metadata_location,
                    created_at_ms: created_at,
                    updated_at_ms: updated_at,
                })
            }
            Err(duckdb::Error::QueryReturnedNoRows) => {
                Err(IcebergError::NoSuchTable(identifier.storage_key()))
            }
            Err(e) => Err(IcebergError::from(e)),
        }
    }

    pub async fn list_tables(&self, ns: &Namespace) -> Result<Vec<TableIdent>> {
        let ns_key = ns.canonicalize();
        let conn = self.connection.lock().unwrap();
        if !Self::namespace_exists_locked(&conn, &self.catalog_name, &ns_key)? {
            return Err(IcebergError::NoSuchNamespace(ns_key));
        }
        let mut stmt = conn.prepare(
            "SELECT table_name FROM catalog_tables WHERE catalog_name = ? AND table_namespace = ?",
        )?;
        let mut rows = stmt.query(duckdb::params![self.catalog_name, ns_key])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            out.push(TableIdent::new(ns.clone(), name)?);
        }
        Ok(out)
    }

    pub async fn rename_table_entry(&self, from: &TableIdent, to: &TableIdent) -> Result<()> {
        let from_ns = from.namespace.canonicalize();
        let to_ns = to.namespace.canonicalize();
        let conn = self.connection.lock().unwrap();
        if !Self::namespace_exists_locked(&conn, &self.catalog_name, &to_ns)? {
            return Err(IcebergError::NoSuchNamespace(to_ns));
        }
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM catalog_tables WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
                duckdb::params![self.catalog_name, to_ns, to.name],
                |row| row.get(0),
            )
            .ok();
        if exists.is_some() {
            return Err(IcebergError::TableExists(to.storage_key()));
        }
        let affected = conn.execute(
            "UPDATE catalog_tables SET table_namespace = ?, table_name = ?, updated_at = ? \
             WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
            duckdb::params![to_ns, to.name, now_ms(), self.catalog_name, from_ns, from.name],
        )?;
        if affected == 0 {
            return Err(IcebergError::NoSuchTable(from.storage_key()));
        }
        Ok(())
    }

    pub async fn register_table_entry(
        &self,
        identifier: &TableIdent,
        metadata_location: &str,
    ) -> Result<()> {
        self.create_table_entry(identifier, metadata_location).await
    }

    /// Conditional update guarded by the observed current metadata location;
    /// a zero-row `UPDATE ... WHERE metadata_location = ?` is the mismatch
    /// signal.
    pub async fn commit_table_entry(
        &self,
        identifier: &TableIdent,
        expected_location: &str,
        new_location: &str,
    ) -> Result<()> {
        let ns_key = identifier.namespace.canonicalize();
        let conn = self.connection.lock().unwrap();
        let affected = conn.execute(
            "UPDATE catalog_tables SET previous_metadata_location = metadata_location, \
             metadata_location = ?, updated_at = ? \
             WHERE catalog_name = ? AND table_namespace = ? AND table_name = ? AND metadata_location = ?",
            duckdb::params![
                new_location,
                now_ms(),
                self.catalog_name,
                ns_key,
                identifier.name,
                expected_location
            ],
        )?;
        if affected == 0 {
            let still_there = Self::table_row_exists(&conn, &self.catalog_name, &ns_key, &identifier.name)?;
            if !still_there {
                return Err(IcebergError::NoSuchTable(identifier.storage_key()));
            }
            return Err(IcebergError::ConcurrentModification {
                operation: "commit-table".to_string(),
                identifier: identifier.storage_key(),
                attempts: 1,
            });
        }
        Ok(())
    }

    fn table_row_exists(
        conn: &duckdb::Connection,
        catalog_name: &str,
        ns_key: &str,
        name: &str,
    ) -> Result<bool> {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM catalog_tables WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
                duckdb::params![catalog_name, ns_key, name],
                |row| row.get(0),
            )
            .ok();
        Ok(exists.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(seg: &str) -> Namespace {
        Namespace::new(vec![seg.to_string()]).unwrap()
    }

    #[tokio::test]
    async fn namespace_and_table_lifecycle() {
        let backend = SqlBackend::in_memory("test").unwrap();
        let a = ns("a");
        backend
            .create_namespace(&a, HashMap::from([("owner".to_string(), "u".to_string())]))
            .await
            .unwrap();
        assert!(backend.namespace_exists(&a).await.unwrap());

        let ident = TableIdent::new(a.clone(), "t").unwrap();
        backend
            .create_table_entry(&ident, "/wh/metadata/a/t/v1.metadata.json")
            .await
            .unwrap();
        assert!(backend.table_exists(&ident).await.unwrap());

        let err = backend.drop_namespace(&a).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NamespaceNotEmpty);

        backend.drop_table_entry(&ident).await.unwrap();
        backend.drop_namespace(&a).await.unwrap();
    }

    #[tokio::test]
    async fn commit_table_rejects_stale_location() {
        let backend = SqlBackend::in_memory("test").unwrap();
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
    }
}
