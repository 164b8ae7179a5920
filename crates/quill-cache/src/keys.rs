//! Path keying for cache records.
//!
//! All keys stored in a [`CacheRecord`](crate::CacheRecord) come from
//! [`PathKeys::keyify`], and every filesystem access derived from a key goes
//! through [`PathKeys::absolutize`]. Both are pure (no filesystem access).
//!
//! The round-trip law: for any path `p`, `absolutize(keyify(p))` is stable
//! under repeated application, and `keyify(absolutize(k)) == k` for any key
//! produced by `keyify`.

use std::path::{Component, Path, PathBuf};

/// Converts between filesystem paths and record keys relative to a root.
#[derive(Clone, Debug)]
pub struct PathKeys {
    root: PathBuf,
}

impl PathKeys {
    /// Create a keyer for paths under `root`.
    ///
    /// `root` should be absolute; it is normalized lexically.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: normalize(root.as_ref()),
        }
    }

    /// Root directory keys are relative to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record key for `path`.
    ///
    /// Relative paths are interpreted relative to the root. Paths inside the
    /// root become `/`-separated relative keys; paths outside it keep their
    /// normalized absolute form.
    ///
    /// # Example
    ///
    /// ```
    /// use std::path::Path;
    /// use quill_cache::PathKeys;
    ///
    /// let keys = PathKeys::new("/project/.quill");
    /// assert_eq!(keys.keyify(Path::new("/project/.quill/out/a.svg")), "out/a.svg");
    /// assert_eq!(keys.keyify(Path::new("./out/../b.svg")), "b.svg");
    /// ```
    #[must_use]
    pub fn keyify(&self, path: &Path) -> String {
        let absolute = normalize(&self.root.join(path));
        match absolute.strip_prefix(&self.root) {
            Ok(relative) => join_components(relative),
            Err(_) => absolute.to_string_lossy().into_owned(),
        }
    }

    /// Filesystem path for `key`.
    #[must_use]
    pub fn absolutize(&self, key: &str) -> PathBuf {
        normalize(&self.root.join(key))
    }
}

/// Lexically collapse `.` and `..` components.
///
/// `..` at the start of a relative path, or above the filesystem root, is
/// kept or dropped respectively; symlinks are not consulted.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn join_components(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
