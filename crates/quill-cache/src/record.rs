//! In-memory form of the persisted cache record.
//!
//! The record has four sections, all keyed by [`PathKeys`](crate::PathKeys)
//! keys:
//!
//! ```json
//! {
//!     "version": 1,
//!     "hashes": { "tikz-ab12.svg": "<sha256 of the artifact bytes>" },
//!     "sources": { "tikz-ab12.svg": "<fingerprint of the producing source>" },
//!     "documents": { "docs/guide.md": ["tikz-ab12.svg"] },
//!     "pendingDeletion": ["tikz-old.svg"]
//! }
//! ```
//!
//! An artifact is only trusted while its `sources` entry equals the fingerprint
//! the caller computes for the current source.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Format version written into every record.
///
/// Records with a different version are discarded on load.
pub const RECORD_VERSION: u32 = 1;

/// Cache bookkeeping for compiled artifacts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    /// Record format version.
    pub version: u32,
    /// Artifact key → hash of the artifact bytes (change detection).
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    /// Artifact key → fingerprint of the source that produced it (provenance).
    #[serde(default)]
    pub sources: BTreeMap<String, String>,
    /// Document key → artifact keys the document referenced when last rendered.
    #[serde(default)]
    pub documents: BTreeMap<String, BTreeSet<String>>,
    /// Artifact keys waiting for the next cleanup pass.
    #[serde(default)]
    pub pending_deletion: BTreeSet<String>,
}

impl Default for CacheRecord {
    fn default() -> Self {
        Self {
            version: RECORD_VERSION,
            hashes: BTreeMap::new(),
            sources: BTreeMap::new(),
            documents: BTreeMap::new(),
            pending_deletion: BTreeSet::new(),
        }
    }
}

impl CacheRecord {
    /// Fingerprint recorded for `artifact`, if any.
    #[must_use]
    pub fn source_hash(&self, artifact: &str) -> Option<&str> {
        self.sources.get(artifact).map(String::as_str)
    }

    /// Artifact hash recorded for `artifact`, if any.
    #[must_use]
    pub fn output_hash(&self, artifact: &str) -> Option<&str> {
        self.hashes.get(artifact).map(String::as_str)
    }

    /// Record a freshly produced artifact.
    ///
    /// Replaces any previous provenance for the same key and revives the
    /// artifact if it was waiting for deletion.
    pub fn record_artifact(
        &mut self,
        artifact: &str,
        source_hash: impl Into<String>,
        output_hash: impl Into<String>,
    ) {
        self.sources.insert(artifact.to_owned(), source_hash.into());
        self.hashes.insert(artifact.to_owned(), output_hash.into());
        self.pending_deletion.remove(artifact);
    }

    /// Artifact keys whose recorded provenance equals `source_hash`.
    pub fn artifacts_for_source<'a>(
        &'a self,
        source_hash: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.sources
            .iter()
            .filter(move |(_, hash)| hash.as_str() == source_hash)
            .map(|(key, _)| key.as_str())
    }

    /// Move the bookkeeping of `from` to `to` after the file itself moved.
    ///
    /// Document references are rewritten so no document keeps pointing at the
    /// old key.
    pub fn move_artifact(&mut self, from: &str, to: &str) {
        if let Some(source) = self.sources.remove(from) {
            self.sources.insert(to.to_owned(), source);
        }
        if let Some(hash) = self.hashes.remove(from) {
            self.hashes.insert(to.to_owned(), hash);
        }
        for artifacts in self.documents.values_mut() {
            if artifacts.remove(from) {
                artifacts.insert(to.to_owned());
            }
        }
        self.pending_deletion.remove(from);
        self.pending_deletion.remove(to);
    }

    /// Drop every trace of `artifact` from the record.
    pub fn forget_artifact(&mut self, artifact: &str) {
        self.sources.remove(artifact);
        self.hashes.remove(artifact);
        self.pending_deletion.remove(artifact);
        for artifacts in self.documents.values_mut() {
            artifacts.remove(artifact);
        }
    }

    /// Whether any document currently references `artifact`.
    #[must_use]
    pub fn is_referenced(&self, artifact: &str) -> bool {
        self.documents
            .values()
            .any(|artifacts| artifacts.contains(artifact))
    }

    /// Replace the artifact list of `document` and schedule orphans for deletion.
    ///
    /// Artifacts the document referenced before, that it no longer references
    /// and that no other document references, are added to the pending
    /// deletion list. Artifacts referenced again are taken off that list.
    ///
    /// Returns the keys newly marked for deletion.
    pub fn set_document_artifacts(
        &mut self,
        document: &str,
        artifacts: BTreeSet<String>,
    ) -> Vec<String> {
        for artifact in &artifacts {
            self.pending_deletion.remove(artifact);
        }

        let previous = if artifacts.is_empty() {
            self.documents.remove(document)
        } else {
            self.documents.insert(document.to_owned(), artifacts)
        };

        let mut orphaned = Vec::new();
        for artifact in previous.unwrap_or_default() {
            if !self.is_referenced(&artifact) && self.pending_deletion.insert(artifact.clone()) {
                orphaned.push(artifact);
            }
        }
        orphaned
    }
}
