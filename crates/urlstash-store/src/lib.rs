//! Filesystem-backed storage for downloaded payloads.
//!
//! Each entry is a single file below a root directory, addressed by a
//! relative key. Keys may contain `/` separators, which map directly to
//! subdirectories:
//!
//! ```text
//! <root>/
//! ├── api.example.com/
//! │   ├── v2_products_id_440.json
//! │   └── catalog.html
//! └── export.xml
//! ```
//!
//! Writes are atomic: the payload is written to a sibling `*.tmp` file and
//! renamed into place, so a reader never observes a partially written entry.
//! The `.tmp` suffix is reserved for this purpose and rejected in keys.
//!
//! # Example
//!
//! ```no_run
//! use urlstash_store::EntryStore;
//!
//! # fn main() -> std::io::Result<()> {
//! let store = EntryStore::new("/var/cache/urlstash")?;
//! store.save("api.example.com/catalog.html", b"<html></html>")?;
//! assert!(store.load("api.example.com/catalog.html")?.is_some());
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// One-file-per-entry store rooted at a directory.
///
/// Entries never expire unless a maximum age is configured with
/// [`EntryStore::max_age`]. A stale entry is treated as missing on load but
/// is left on disk until overwritten.
#[derive(Debug)]
pub struct EntryStore {
    root: PathBuf,
    max_age: Option<Duration>,
}

impl EntryStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "opened entry store");
        Ok(Self { root, max_age: None })
    }

    /// Set the age beyond which entries are considered stale.
    ///
    /// `None` (the default) keeps entries forever.
    #[must_use]
    pub fn max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// The file path an entry with this key is stored at.
    pub fn entry_path(&self, key: &str) -> io::Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// Read the entry for `key`.
    ///
    /// Returns `Ok(None)` when no entry exists or the entry is older than
    /// the configured maximum age. Any other read failure is an error.
    pub fn load(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.entry_path(key)?;
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if let Some(max_age) = self.max_age {
            // A modification time in the future counts as age zero.
            let age = metadata.modified()?.elapsed().unwrap_or_default();
            if age >= max_age {
                tracing::debug!(key = %key, age_secs = age.as_secs(), "cache entry is stale");
                return Ok(None);
            }
        }
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write the entry for `key`, replacing any previous payload.
    ///
    /// The write goes through a temporary file and a rename, so concurrent
    /// readers see either the old payload or the new one, never a mix.
    pub fn save(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.entry_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(&path);
        if let Err(e) = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        tracing::debug!(key = %key, len = bytes.len(), "stored cache entry");
        Ok(())
    }

    /// Delete the entry for `key`. Deleting a missing entry is not an error.
    pub fn remove(&self, key: &str) -> io::Result<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(key = %key, "removed cache entry");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Sibling path the payload is staged at before the rename.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Reject keys that would escape the root or collide with staging files.
fn validate_key(key: &str) -> io::Result<()> {
    if key.is_empty() {
        return Err(invalid_key(key, "key is empty"));
    }
    let path = Path::new(key);
    if path.is_absolute() {
        return Err(invalid_key(key, "key is an absolute path"));
    }
    for component in path.components() {
        let Component::Normal(name) = component else {
            return Err(invalid_key(key, "key must be a plain relative path"));
        };
        if name.as_encoded_bytes().ends_with(b".tmp") {
            return Err(invalid_key(key, "the .tmp suffix is reserved"));
        }
    }
    Ok(())
}

fn invalid_key(key: &str, reason: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("invalid cache key {key:?}: {reason}"),
    )
}
