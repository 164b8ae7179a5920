//! Content-addressed compilation cache.
//!
//! Artifacts live in the output directory as `{component_id}.svg`. The cache
//! record (see [`quill_cache::CacheRecord`]) remembers which fingerprint
//! produced each artifact, so an unchanged component is never compiled twice,
//! even across runs.
//!
//! Lookup order in [`CompilationCache::get_or_compile`]:
//!
//! 1. the artifact under the component's own key, when its recorded
//!    fingerprint matches and the file on disk still hashes to the recorded
//!    value;
//! 2. an artifact stored under another key with the same fingerprint, which
//!    is relocated (moved, or copied while a document or an earlier request
//!    of this session still uses it);
//! 3. a fresh compilation.
//!
//! Unreferenced artifacts are never deleted right away: they are put on the
//! record's pending deletion list and removed by [`CompilationCache::purge`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use quill_cache::{CacheRecord, CacheStore, PathKeys, content_hash};

use crate::consts::ARTIFACT_EXTENSION;
use crate::error::CompileError;

/// Where a [`CachedArtifact`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Stored under the requested key.
    Cached,
    /// Moved or copied from another key with the same fingerprint.
    Relocated,
    /// Produced by running the compiler.
    Compiled,
}

/// Artifact returned by [`CompilationCache::get_or_compile`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedArtifact {
    /// Record key.
    pub key: String,
    /// Location on disk.
    pub path: PathBuf,
    /// Artifact bytes.
    pub content: Vec<u8>,
    /// How the artifact was obtained.
    pub origin: Origin,
}

/// Compilation cache over a [`CacheStore`].
///
/// Safe to share between threads. Requests for different fingerprints run
/// concurrently; requests for the same fingerprint are serialized so the
/// compiler runs at most once.
pub struct CompilationCache {
    store: Box<dyn CacheStore>,
    keys: PathKeys,
    record: Mutex<CacheRecord>,
    /// Keys handed out since the cache was opened.
    served: Mutex<HashSet<String>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Claim on the serialization lock of one fingerprint.
///
/// Dropping the last claim removes the lock from the in-flight table.
struct InFlight<'a> {
    cache: &'a CompilationCache,
    fingerprint: &'a str,
    lock: Option<Arc<Mutex<()>>>,
}

impl InFlight<'_> {
    fn lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.lock
            .as_ref()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .cache
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(self.lock.take());
        if in_flight
            .get(self.fingerprint)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            in_flight.remove(self.fingerprint);
        }
    }
}

impl CompilationCache {
    /// Open the cache, loading the record from `store`.
    ///
    /// Artifacts are stored in `output_dir`, which is created on the first
    /// write.
    pub fn open(store: Box<dyn CacheStore>, output_dir: impl AsRef<Path>) -> Self {
        let record = store.load();
        tracing::debug!(
            artifacts = record.sources.len(),
            pending = record.pending_deletion.len(),
            "opened compilation cache"
        );
        Self {
            store,
            keys: PathKeys::new(output_dir),
            record: Mutex::new(record),
            served: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Directory artifacts are stored in.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        self.keys.root()
    }

    /// Snapshot of the current record.
    #[must_use]
    pub fn record(&self) -> CacheRecord {
        self.lock_record().clone()
    }

    /// Artifact for `component_id`, compiling it with `compile` only when no
    /// stored artifact has `fingerprint`.
    ///
    /// A successful compilation is written atomically and recorded before
    /// this returns. A failed one leaves the cache untouched.
    ///
    /// # Errors
    ///
    /// Returns the error of `compile`, or an I/O error when the artifact
    /// cannot be written.
    pub fn get_or_compile<F>(
        &self,
        component_id: &str,
        fingerprint: &str,
        compile: F,
    ) -> Result<CachedArtifact, CompileError>
    where
        F: FnOnce() -> Result<Vec<u8>, CompileError>,
    {
        let claim = self.claim(fingerprint);
        let _serial = claim.lock();

        let key = self
            .keys
            .keyify(Path::new(&format!("{component_id}.{ARTIFACT_EXTENSION}")));
        let path = self.keys.absolutize(&key);

        let (content, origin) = if let Some(content) = self.lookup(&key, &path, fingerprint) {
            tracing::debug!(component = component_id, "compilation cache hit");
            (content, Origin::Cached)
        } else if let Some(content) = self.relocate(&key, &path, fingerprint) {
            (content, Origin::Relocated)
        } else {
            tracing::info!(component = component_id, "compiling");
            let content = compile()?;
            write_atomic(&path, &content)?;
            let hash = content_hash(&content);
            self.update(|record| record.record_artifact(&key, fingerprint, hash));
            (content, Origin::Compiled)
        };

        self.lock_served().insert(key.clone());
        Ok(CachedArtifact {
            key,
            path,
            content,
            origin,
        })
    }

    /// Record the artifacts `document` references after a render.
    ///
    /// Artifacts the document no longer references, and no other document
    /// does either, are scheduled for deletion. Returns the newly scheduled
    /// keys.
    pub fn retain_document<I, S>(&self, document: &str, artifacts: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let artifacts: BTreeSet<String> = artifacts.into_iter().map(Into::into).collect();
        let orphaned = self.update(|record| record.set_document_artifacts(document, artifacts));
        if !orphaned.is_empty() {
            tracing::debug!(document, count = orphaned.len(), "scheduled artifacts for deletion");
        }
        orphaned
    }

    /// Keys waiting for the next [`purge`](Self::purge).
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.lock_record().pending_deletion.iter().cloned().collect()
    }

    /// Delete every pending artifact that is still unreferenced.
    ///
    /// Returns the removed keys. Files that cannot be removed stay pending.
    pub fn purge(&self) -> Vec<String> {
        self.update(|record| {
            let pending: Vec<String> = record.pending_deletion.iter().cloned().collect();
            let mut removed = Vec::with_capacity(pending.len());

            for key in pending {
                if record.is_referenced(&key) {
                    record.pending_deletion.remove(&key);
                    continue;
                }
                let path = self.keys.absolutize(&key);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!("failed to delete {}: {e}", path.display());
                        continue;
                    }
                }
                record.forget_artifact(&key);
                removed.push(key);
            }

            tracing::info!(removed = removed.len(), "purged compiled artifacts");
            removed
        })
    }

    /// Stored artifact under `key`, if it was produced by `fingerprint` and
    /// is intact on disk.
    fn lookup(&self, key: &str, path: &Path, fingerprint: &str) -> Option<Vec<u8>> {
        let expected = {
            let record = self.lock_record();
            if record.source_hash(key) != Some(fingerprint) {
                return None;
            }
            record.output_hash(key)?.to_owned()
        };

        let content = fs::read(path).ok()?;
        if content_hash(&content) != expected {
            tracing::warn!("artifact {} changed on disk, recompiling", path.display());
            return None;
        }
        Some(content)
    }

    /// Move or copy an artifact with the same fingerprint to `key`.
    ///
    /// Artifacts referenced by a document or already handed out in this
    /// session are copied; only orphans are moved.
    fn relocate(&self, key: &str, path: &Path, fingerprint: &str) -> Option<Vec<u8>> {
        let candidates: Vec<(String, bool)> = {
            let record = self.lock_record();
            let served = self.lock_served();
            record
                .artifacts_for_source(fingerprint)
                .filter(|candidate| *candidate != key)
                .map(|candidate| {
                    let in_use = record.is_referenced(candidate) || served.contains(candidate);
                    (candidate.to_owned(), in_use)
                })
                .collect()
        };

        for (from, referenced) in candidates {
            let from_path = self.keys.absolutize(&from);
            let relocated = if referenced {
                fs::read(&from_path).and_then(|content| write_atomic(path, &content))
            } else {
                create_parent(path).and_then(|()| fs::rename(&from_path, path))
            };
            if let Err(e) = relocated {
                tracing::warn!("failed to relocate {from} to {key}: {e}");
                continue;
            }

            let Ok(content) = fs::read(path) else {
                continue;
            };
            let hash = content_hash(&content);
            self.update(|record| {
                if referenced {
                    record.record_artifact(key, fingerprint, hash);
                } else {
                    record.move_artifact(&from, key);
                    record.record_artifact(key, fingerprint, hash);
                }
            });
            tracing::info!(from = %from, to = %key, copied = referenced, "relocated artifact");
            return Some(content);
        }
        None
    }

    /// Apply `change` to the record and persist it.
    ///
    /// Persistence failures are logged; the in-memory record stays updated
    /// for the rest of the run.
    fn update<R>(&self, change: impl FnOnce(&mut CacheRecord) -> R) -> R {
        let mut record = self.lock_record();
        let result = change(&mut record);
        if let Err(e) = self.store.persist(&record) {
            tracing::warn!("failed to persist compilation cache: {e}");
        }
        result
    }

    fn lock_record(&self) -> MutexGuard<'_, CacheRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_served(&self) -> MutexGuard<'_, HashSet<String>> {
        self.served.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim<'a>(&'a self, fingerprint: &'a str) -> InFlight<'a> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(in_flight.entry(fingerprint.to_owned()).or_default());
        InFlight {
            cache: self,
            fingerprint,
            lock: Some(lock),
        }
    }
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

/// Write to a `.tmp` sibling, then rename over `path`.
fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    create_parent(path)?;
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, content)?;
    fs::rename(&temp, path)
}
