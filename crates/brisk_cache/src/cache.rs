//! The artifact cache capability and its trivial implementation.

use std::path::{Path, PathBuf};

use brisk_common::RuleKey;

use crate::error::CacheError;

/// Outcome of an artifact cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheResult {
    /// The artifact was found and materialized at the given local path.
    Hit(PathBuf),
    /// No artifact is stored under the key.
    Miss,
    /// The lookup failed; callers treat this like a miss.
    Error(String),
}

impl CacheResult {
    /// Returns `true` for [`CacheResult::Hit`].
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit(_))
    }

    /// Short label used in logs and reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            CacheResult::Hit(_) => "HIT",
            CacheResult::Miss => "MISS",
            CacheResult::Error(_) => "ERROR",
        }
    }
}

/// A store of build artifacts addressed by rule key.
///
/// Implementations are shared between build workers and must be safe to
/// call concurrently. A stored entry must be visible to readers either in
/// full or not at all.
pub trait ArtifactCache: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Looks up `key` and, on a hit, writes the artifact bytes to `dest`,
    /// overwriting any existing file and creating parent directories.
    fn fetch(&self, key: &RuleKey, dest: &Path) -> CacheResult;

    /// Stores a copy of the file at `artifact` under every key in `keys`.
    fn store(&self, keys: &[RuleKey], artifact: &Path) -> Result<(), CacheError>;

    /// Whether [`store`](Self::store) actually persists anything.
    fn is_store_supported(&self) -> bool;

    /// Releases resources at the end of a build.
    fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// A cache that never stores and always misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopArtifactCache;

impl ArtifactCache for NoopArtifactCache {
    fn name(&self) -> &str {
        "noop"
    }

    fn fetch(&self, _key: &RuleKey, _dest: &Path) -> CacheResult {
        CacheResult::Miss
    }

    fn store(&self, _keys: &[RuleKey], _artifact: &Path) -> Result<(), CacheError> {
        Ok(())
    }

    fn is_store_supported(&self) -> bool {
        false
    }
}
