//! Durable cache store for quill.
//!
//! This crate owns the on-disk record that lets the compilation cache survive
//! across process invocations. Two traits of behavior are kept apart:
//!
//! - [`CacheStore`]: load and persist a whole [`CacheRecord`]
//! - [`CacheRecord`]: pure in-memory bookkeeping (provenance, artifact hashes,
//!   document references, deferred deletions)
//!
//! # Implementations
//!
//! - [`NullStore`]: No-op store (always cold, never writes)
//! - [`FileStore`]: JSON file with write-new-then-rename persistence
//!
//! Keys inside the record are relative paths produced by [`PathKeys`].
//!
//! # Example
//!
//! ```
//! use quill_cache::{CacheStore, NullStore};
//!
//! let store = NullStore;
//! let mut record = store.load();
//! record.record_artifact("tikz-1.svg", "src-hash", "out-hash");
//! store.persist(&record).unwrap();
//! assert!(store.load().sources.is_empty()); // NullStore never remembers
//! ```

mod digest;
mod file;
mod keys;
mod record;

use std::io;

pub use digest::content_hash;
pub use file::{FileStore, RECORD_FILENAME};
pub use keys::PathKeys;
pub use record::{CacheRecord, RECORD_VERSION};

/// Durable backing for a [`CacheRecord`].
///
/// Every mutation of the record goes through a load-modify-persist cycle.
/// Loading never fails: an unreadable or incompatible record is reported
/// through `tracing` and replaced by an empty one, so the caller simply runs
/// cold.
pub trait CacheStore: Send + Sync {
    /// Load the persisted record, or an empty record when none is usable.
    fn load(&self) -> CacheRecord;

    /// Persist the record.
    ///
    /// Implementations must never leave a half-written record behind: a crash
    /// in the middle of `persist` leaves either the old or the new record.
    fn persist(&self, record: &CacheRecord) -> io::Result<()>;
}

/// No-op [`CacheStore`] used when caching is disabled.
///
/// `load` always returns an empty record and `persist` discards its input.
pub struct NullStore;

impl CacheStore for NullStore {
    fn load(&self) -> CacheRecord {
        CacheRecord::default()
    }

    fn persist(&self, _record: &CacheRecord) -> io::Result<()> {
        Ok(())
    }
}
