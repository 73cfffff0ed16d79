//! Content hashing of input files with per-process memoization.
//!
//! Every rule key that names a source file needs that file's content hash,
//! and the same file is typically named by many rules. [`FileHashCache`]
//! hashes each file once and serves later lookups from memory until the
//! file's modification time or length changes.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use brisk_common::ContentHash;

/// Anything that can produce the content hash of a file.
///
/// The fingerprint engine depends on this trait rather than on the file
/// system directly, so tests can supply fixed hashes.
pub trait FileHashSource: Send + Sync {
    /// Returns the content hash of the file at `path`.
    fn get(&self, path: &Path) -> io::Result<ContentHash>;

    /// Drops anything remembered about `path` or files beneath it.
    fn invalidate(&self, _path: &Path) {}
}

/// Stamp used to detect that a file changed since it was hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        if meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        Ok(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedHash {
    stamp: FileStamp,
    hash: ContentHash,
}

/// Thread-safe memoizing file hasher.
///
/// Lookups stat the file and reuse the stored hash when the stamp is
/// unchanged; otherwise the file is re-read and the entry replaced.
#[derive(Debug, Default)]
pub struct FileHashCache {
    entries: Mutex<HashMap<PathBuf, CachedHash>>,
}

impl FileHashCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the XXH3-128 hash of a file without consulting any cache.
    pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
        let content = std::fs::read(path)?;
        Ok(ContentHash::from_bytes(&content))
    }

    /// Number of memoized entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing is memoized.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, path: &Path, stamp: FileStamp) -> Option<ContentHash> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(path)
            .filter(|cached| cached.stamp == stamp)
            .map(|cached| cached.hash)
    }
}

impl FileHashSource for FileHashCache {
    fn get(&self, path: &Path) -> io::Result<ContentHash> {
        let stamp = FileStamp::of(path)?;
        if let Some(hash) = self.lookup(path, stamp) {
            return Ok(hash);
        }

        // Hash outside the lock; two racing threads compute the same value.
        let hash = Self::hash_file(path)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries
                .entry(path.to_path_buf())
                .and_modify(|cached| {
                    if cached.stamp != stamp {
                        *cached = CachedHash { stamp, hash };
                    }
                })
                .or_insert(CachedHash { stamp, hash });
        }
        Ok(hash)
    }

    /// Forgets the memoized hash of `path` and of every file under it.
    ///
    /// Called after a rule rewrites its outputs, so a write that lands within
    /// the file system's timestamp granularity is not missed.
    fn invalidate(&self, path: &Path) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|cached, _| !cached.starts_with(path));
        }
    }
}

impl<T: FileHashSource + ?Sized> FileHashSource for std::sync::Arc<T> {
    fn get(&self, path: &Path) -> io::Result<ContentHash> {
        (**self).get(path)
    }

    fn invalidate(&self, path: &Path) {
        (**self).invalidate(path)
    }
}
