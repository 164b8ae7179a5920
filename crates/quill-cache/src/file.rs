//! File-based store implementation.
//!
//! [`FileStore`] keeps the whole [`CacheRecord`] in a single JSON file inside
//! the cache root:
//!
//! ```text
//! {root}/
//! +-- quill-cache.json       # the record
//! +-- quill-cache.json.tmp   # only exists while a write is in flight
//! ```
//!
//! Writes go to the `.tmp` sibling first and are then renamed over the record,
//! so a crash mid-write leaves the previous record readable.
//!
//! On load, a missing file, an unreadable file, malformed JSON, or a record
//! with a different [`RECORD_VERSION`] all yield an empty record. The stale
//! file is left in place and overwritten by the next successful persist.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::record::{CacheRecord, RECORD_VERSION};
use crate::CacheStore;

/// Filename of the record inside the cache root.
pub const RECORD_FILENAME: &str = "quill-cache.json";

/// JSON-file [`CacheStore`] rooted at a directory on disk.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`.
    ///
    /// The directory is created lazily on the first persist.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record file.
    #[must_use]
    pub fn record_path(&self) -> PathBuf {
        self.root.join(RECORD_FILENAME)
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!("{RECORD_FILENAME}.tmp"))
    }
}

impl CacheStore for FileStore {
    fn load(&self) -> CacheRecord {
        let path = self.record_path();

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no cache record at {}, starting cold", path.display());
                return CacheRecord::default();
            }
            Err(e) => {
                tracing::warn!(
                    "failed to read cache record {}: {e}, starting cold",
                    path.display()
                );
                return CacheRecord::default();
            }
        };

        match serde_json::from_str::<CacheRecord>(&content) {
            Ok(record) if record.version == RECORD_VERSION => record,
            Ok(record) => {
                tracing::info!(
                    "cache record version mismatch (stored={}, current={RECORD_VERSION}), starting cold",
                    record.version
                );
                CacheRecord::default()
            }
            Err(e) => {
                tracing::warn!(
                    "malformed cache record {}: {e}, starting cold",
                    path.display()
                );
                CacheRecord::default()
            }
        }
    }

    fn persist(&self, record: &CacheRecord) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;

        let json = serde_json::to_vec_pretty(record).map_err(io::Error::other)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, self.record_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn populated() -> CacheRecord {
        let mut record = CacheRecord::default();
        record.record_artifact("tikz-1.svg", "src-hash", "out-hash");
        record.pending_deletion.insert("old.svg".to_owned());
        record
    }

    #[test]
    fn test_persist_and_load() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"));

        store.persist(&populated()).unwrap();

        assert_eq!(store.load(), populated());
    }

    #[test]
    fn test_load_missing_is_cold() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("nothing-here"));

        assert_eq!(store.load(), CacheRecord::default());
    }

    #[test]
    fn test_load_malformed_is_cold() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());
        fs::write(store.record_path(), "{ not json").unwrap();

        assert_eq!(store.load(), CacheRecord::default());
    }

    #[test]
    fn test_load_version_mismatch_is_cold() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());
        fs::write(
            store.record_path(),
            r#"{"version": 99, "sources": {"a.svg": "x"}}"#,
        )
        .unwrap();

        assert_eq!(store.load(), CacheRecord::default());
    }

    #[test]
    fn test_load_tolerates_missing_sections() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());
        fs::write(store.record_path(), r#"{"version": 1}"#).unwrap();

        assert_eq!(store.load(), CacheRecord::default());
    }

    #[test]
    fn test_persist_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"));

        store.persist(&populated()).unwrap();

        assert!(store.record_path().exists());
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_persist_overwrites_previous_record() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"));
        store.persist(&populated()).unwrap();

        store.persist(&CacheRecord::default()).unwrap();

        assert_eq!(store.load(), CacheRecord::default());
    }

    #[test]
    fn test_persist_creates_nested_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("deeply/nested/cache");
        let store = FileStore::new(root.clone());

        store.persist(&CacheRecord::default()).unwrap();

        assert!(root.join(RECORD_FILENAME).exists());
    }
}
