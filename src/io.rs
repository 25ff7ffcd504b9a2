//! Object/file I/O abstraction
//!
//! The collaborator interface from the specification: `open`, `create`,
//! `remove`, `stat`. Two implementations ship with the core: a local
//! filesystem backend (used by the JSON catalog backend and the metadata
//! writer) and an in-memory backend for tests, matching the teacher's
//! `StorageBackend` trait pattern (one trait, multiple concrete backends
//! selected by feature/config, not by the caller reaching into internals).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{IcebergError, Result};

/// Size + modification time, at nanosecond resolution where available, used
/// to derive ETags for the JSON backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified_at_nanos: i128,
}

/// Minimal object/file I/O contract consumed by the metadata writer and the
/// JSON catalog backend. Implementations observed in production: local
/// filesystem and S3-compatible object storage (both support
/// write-to-temp + rename); the in-memory implementation here is test-only
/// and does not guarantee atomicity.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    async fn write(&self, path: &str, contents: &[u8]) -> Result<()>;
    async fn remove(&self, path: &str) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn stat(&self, path: &str) -> Result<FileStat>;
    async fn create_dir_all(&self, path: &str) -> Result<()>;
    /// List entries directly inside `path` (non-recursive), file names only.
    async fn list(&self, path: &str) -> Result<Vec<String>>;

    /// Atomic document replace: write to a sibling `.tmp`, fsync, rename into
    /// place. Requires the parent directory to already exist. On any
    /// failure, the temp file is removed and the target is left untouched.
    async fn write_atomic(&self, path: &str, contents: &[u8]) -> Result<()>;

    /// Create `path` with `contents` only if it does not already exist.
    /// Returns `Ok(true)` if this call created the file, `Ok(false)` if
    /// `path` was already occupied (no write performed). Used to stage a
    /// metadata version without a caller-side lock: two concurrent callers
    /// racing for the same candidate path get exactly one winner.
    async fn write_exclusive(&self, path: &str, contents: &[u8]) -> Result<bool>;
}

/// Local filesystem implementation of [`ObjectStore`].
#[cfg(feature = "native-fs")]
pub struct LocalFs;

#[cfg(feature = "native-fs")]
impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "native-fs")]
impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "native-fs")]
#[async_trait]
impl ObjectStore for LocalFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| IcebergError::io(format!("read {path}"), e))
    }

    async fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| IcebergError::io(format!("write {path}"), e))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IcebergError::io(format!("remove {path}"), e)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::metadata(path).await.is_ok())
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| IcebergError::io(format!("stat {path}"), e))?;
        let modified = meta
            .modified()
            .map_err(|e| IcebergError::io(format!("stat {path}"), e))?;
        let nanos = modified
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i128)
            .unwrap_or(0);
        Ok(FileStat {
            size: meta.len(),
            modified_at_nanos: nanos,
        })
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| IcebergError::io(format!("mkdir -p {path}"), e))
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(IcebergError::io(format!("readdir {path}"), e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IcebergError::io(format!("readdir {path}"), e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn write_atomic(&self, path: &str, contents: &[u8]) -> Result<()> {
        let tmp_path = format!("{path}.tmp");
        let write_result = async {
            let mut file = tokio::fs::File::create(&tmp_path)
                .await
                .map_err(|e| IcebergError::io(format!("create {tmp_path}"), e))?;
            use tokio::io::AsyncWriteExt;
            file.write_all(contents)
                .await
                .map_err(|e| IcebergError::io(format!("write {tmp_path}"), e))?;
            file.sync_all()
                .await
                .map_err(|e| IcebergError::io(format!("fsync {tmp_path}"), e))?;
            Ok::<(), IcebergError>(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(IcebergError::io(format!("rename {tmp_path} -> {path}"), e));
        }
        Ok(())
    }

    async fn write_exclusive(&self, path: &str, contents: &[u8]) -> Result<bool> {
        let tmp_path = format!("{path}.tmp-{}", uuid::Uuid::new_v4());
        let write_result = async {
            let mut file = tokio::fs::File::create(&tmp_path)
                .await
                .map_err(|e| IcebergError::io(format!("create {tmp_path}"), e))?;
            use tokio::io::AsyncWriteExt;
            file.write_all(contents)
                .await
                .map_err(|e| IcebergError::io(format!("write {tmp_path}"), e))?;
            file.sync_all()
                .await
                .map_err(|e| IcebergError::io(format!("fsync {tmp_path}"), e))?;
            Ok::<(), IcebergError>(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        // A hard link fails with `AlreadyExists` if `path` is already
        // occupied, giving us create-if-absent semantics without a lock.
        let link_result = tokio::fs::hard_link(&tmp_path, path).await;
        let _ = tokio::fs::remove_file(&tmp_path).await;
        match link_result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(IcebergError::io(format!("link {tmp_path} -> {path}"), e)),
        }
    }
}

/// In-memory implementation of [`ObjectStore`], test-only. Does not
/// guarantee atomicity of `write_atomic` (a plain overwrite suffices for
/// unit tests that don't inject failures mid-write).
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    /// Monotonically increasing counter standing in for mtime, since real
    /// wall-clock time is unavailable in some harness contexts and two
    /// writes in the same nanosecond would otherwise produce equal stats.
    clock: Mutex<i128>,
    stats: Mutex<HashMap<String, FileStat>>,
    /// When set, `write_atomic` fails after staging but before "rename",
    /// used by the atomicity-under-failure test below.
    fail_before_rename: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: make the next `write_atomic` call fail after writing the
    /// temp contents but before the rename, leaving the prior target intact.
    pub fn inject_failure_before_rename(&self) {
        *self.fail_before_rename.lock().unwrap() = true;
    }

    fn tick(&self) -> i128 {
        let mut clock = self.clock.lock().unwrap();
        *clock += 1;
        *clock
    }

    fn parent_dir(path: &str) -> String {
        Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| IcebergError::io(format!("read {path}"), not_found()))
    }

    async fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_vec());
        let nanos = self.tick();
        self.stats.lock().unwrap().insert(
            path.to_string(),
            FileStat {
                size: contents.len() as u64,
                modified_at_nanos: nanos,
            },
        );
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.files.lock().unwrap().remove(path);
        self.stats.lock().unwrap().remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        self.stats
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .ok_or_else(|| IcebergError::io(format!("stat {path}"), not_found()))
    }

    async fn create_dir_all(&self, _path: &str) -> Result<()> {
        // The in-memory store is flat; directories are implicit in path prefixes.
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let files = self.files.lock().unwrap();
        let mut names: Vec<String> = files
            .keys()
            .filter(|k| Self::parent_dir(k) == path.trim_end_matches('/'))
            .filter_map(|k| k.strip_prefix(&prefix).map(|s| s.to_string()))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn write_atomic(&self, path: &str, contents: &[u8]) -> Result<()> {
        let should_fail = {
            let mut flag = self.fail_before_rename.lock().unwrap();
            let was_set = *flag;
            *flag = false;
            was_set
        };
        if should_fail {
            return Err(IcebergError::io(
                format!("write_atomic {path}"),
                not_found(),
            ));
        }
        self.write(path, contents).await
    }

    async fn write_exclusive(&self, path: &str, contents: &[u8]) -> Result<bool> {
        let mut files = self.files.lock().unwrap();
        if files.contains_key(path) {
            return Ok(false);
        }
        files.insert(path.to_string(), contents.to_vec());
        drop(files);
        let nanos = self.tick();
        self.stats.lock().unwrap().insert(
            path.to_string(),
            FileStat {
                size: contents.len() as u64,
                modified_at_nanos: nanos,
            },
        );
        Ok(true)
    }
}

fn not_found() -> std::io::Error {
    std::io::Error::from(std::io::ErrorKind::NotFound)
}

pub(crate) fn join(base: &str, parts: &[&str]) -> String {
    let mut p = PathBuf::from(base);
    for part in parts {
        p.push(part);
    }
    p.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store.write("a/b.json", b"{}").await.unwrap();
        assert!(store.exists("a/b.json").await.unwrap());
        assert_eq!(store.read("a/b.json").await.unwrap(), b"{}".to_vec());
        assert_eq!(store.list("a").await.unwrap(), vec!["b.json".to_string()]);
    }

    #[tokio::test]
    async fn memory_store_atomicity_injection_leaves_target_untouched() {
        let store = MemoryStore::new();
        store.write("state.json", b"v1").await.unwrap();
        store.inject_failure_before_rename();
        let err = store.write_atomic("state.json", b"v2").await;
        assert!(err.is_err());
        assert_eq!(store.read("state.json").await.unwrap(), b"v1".to_vec());
    }
}
