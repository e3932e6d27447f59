//! Store file persistence
//!
//! Reads and writes the stored record as a single JSON file. Saves are
//! atomic (write to a temp file, sync, rename) so the store file is never
//! left in a partially-written state. A file that fails to parse or fails
//! structural validation is treated as absent data, not as an error.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{AfterLoadHook, BeforeSyncHook};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::record::{Metadata, StoredRecord};

/// Outcome of one completed write.
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Path the record was written to.
    pub path: PathBuf,
    /// Serialized size on disk.
    pub size_bytes: u64,
    /// Wall-clock duration of the write.
    pub elapsed_ms: u64,
}

/// Persistence handler for the store file.
pub struct FilePersistence {
    path: PathBuf,
    prettify: bool,
    must_exist: bool,
    before_sync: Option<BeforeSyncHook>,
    after_load: Option<AfterLoadHook>,
}

impl FilePersistence {
    /// Create a persistence handler for the file at `path`.
    pub fn new(
        path: PathBuf,
        prettify: bool,
        must_exist: bool,
        before_sync: Option<BeforeSyncHook>,
        after_load: Option<AfterLoadHook>,
    ) -> Self {
        Self {
            path,
            prettify,
            must_exist,
            before_sync,
            after_load,
        }
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record.
    ///
    /// Returns `Ok(None)` when the file is missing, unreadable, unparsable,
    /// or structurally invalid, so the caller starts fresh. A missing file
    /// is an error only when `must_exist` was configured. The parent
    /// directory is created first so a later save cannot fail on it;
    /// `create_dir_all` is idempotent and safe alongside concurrent
    /// writers of sibling files.
    ///
    /// The optional `after_load` hook transforms the raw stored payload
    /// into the in-memory document shape.
    pub fn load(&self) -> StorageResult<Option<(Value, Metadata)>> {
        ensure_parent_dir(&self.path)?;

        if !self.path.exists() {
            if self.must_exist {
                return Err(StorageError::NotFound {
                    path: self.path.clone(),
                });
            }
            return Ok(None);
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "store file unreadable, starting empty"
                );
                return Ok(None);
            }
        };

        let record: StoredRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "store file failed validation, starting empty"
                );
                return Ok(None);
            }
        };

        let document = match &self.after_load {
            Some(hook) => hook(record.data),
            None => record.data,
        };

        Ok(Some((document, record.meta)))
    }

    /// Write the document and metadata to disk.
    ///
    /// The optional `before_sync` hook transforms the in-memory document
    /// into its on-disk payload first. Write failures propagate to the
    /// caller; they are never silently swallowed.
    pub fn save(&self, document: &Value, meta: &Metadata) -> StorageResult<SyncResult> {
        let started = Instant::now();

        let payload = match &self.before_sync {
            Some(hook) => hook(document),
            None => document.clone(),
        };
        let record = StoredRecord {
            meta: *meta,
            data: payload,
        };

        let bytes = if self.prettify {
            serde_json::to_vec_pretty(&record)
        } else {
            serde_json::to_vec(&record)
        }
        .map_err(|source| StorageError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        atomic_write(&self.path, &bytes)?;

        let result = SyncResult {
            path: self.path.clone(),
            size_bytes: bytes.len() as u64,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        debug!(
            path = %result.path.display(),
            bytes = result.size_bytes,
            elapsed_ms = result.elapsed_ms,
            "store file synced"
        );
        Ok(result)
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    ensure_parent_dir(path)?;

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|err| StorageError::from_io(err, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|err| StorageError::from_io(err, temp_path.clone()))?;
    file.sync_all()
        .map_err(|err| StorageError::from_io(err, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        from: temp_path,
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

/// Ensure the parent directory of `path` exists.
fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn plain(path: PathBuf) -> FilePersistence {
        FilePersistence::new(path, true, false, None, None)
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let persistence = plain(temp.path().join("store.json"));

        let meta = Metadata::new(1000);
        let doc = json!({ "x": 5, "nested": { "y": [1, 2] } });
        let result = persistence.save(&doc, &meta).unwrap();
        assert!(result.size_bytes > 0);

        let (loaded, loaded_meta) = persistence.load().unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert_eq!(loaded_meta, meta);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        let persistence = plain(temp.path().join("store.json"));
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn test_load_missing_must_exist_errors() {
        let temp = TempDir::new().unwrap();
        let persistence =
            FilePersistence::new(temp.path().join("store.json"), true, true, None, None);
        let err = persistence.load().unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_load_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a").join("b").join("store.json");
        let persistence = plain(path.clone());

        assert!(persistence.load().unwrap().is_none());
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_corrupt_json_treated_as_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        fs::write(&path, "{not json at all").unwrap();

        let persistence = plain(path);
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn test_foreign_shape_treated_as_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        fs::write(&path, r#"{"notMeta":true}"#).unwrap();

        let persistence = plain(path);
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn test_non_numeric_meta_treated_as_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        fs::write(
            &path,
            r#"{"meta":{"createTime":"soon","lastUpdate":1,"lastSync":1},"data":{}}"#,
        )
        .unwrap();

        let persistence = plain(path);
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn test_prettify_writes_multi_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        let persistence = plain(path.clone());
        persistence
            .save(&json!({ "a": 1 }), &Metadata::new(1))
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_compact_writes_single_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        let persistence = FilePersistence::new(path.clone(), false, false, None, None);
        persistence
            .save(&json!({ "a": 1 }), &Metadata::new(1))
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_hooks_transform_payload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");

        // Persist the document wrapped in an envelope and unwrap on load.
        let persistence = FilePersistence::new(
            path.clone(),
            true,
            false,
            Some(Arc::new(|doc: &Value| json!({ "envelope": doc.clone() }))),
            Some(Arc::new(|raw: Value| {
                raw.get("envelope").cloned().unwrap_or(raw)
            })),
        );

        let doc = json!({ "a": 1 });
        persistence.save(&doc, &Metadata::new(1)).unwrap();

        let record: StoredRecord =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(record.data, json!({ "envelope": { "a": 1 } }));

        let (loaded, _) = persistence.load().unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b").join("c").join("file.json");

        atomic_write(&nested, b"{}").unwrap();

        assert!(nested.exists());
        assert_eq!(fs::read_to_string(&nested).unwrap(), "{}");
    }

    #[test]
    fn test_save_overwrites_previous_record() {
        let temp = TempDir::new().unwrap();
        let persistence = plain(temp.path().join("store.json"));

        persistence
            .save(&json!({ "v": 1 }), &Metadata::new(1))
            .unwrap();
        persistence
            .save(&json!({ "v": 2 }), &Metadata::new(2))
            .unwrap();

        let (loaded, meta) = persistence.load().unwrap().unwrap();
        assert_eq!(loaded, json!({ "v": 2 }));
        assert_eq!(meta.create_time, 2);
    }
}
