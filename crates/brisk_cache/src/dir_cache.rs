//! Directory-backed artifact cache with size-bounded LRU eviction.
//!
//! Each entry is one file directly under the cache directory, named by the
//! hex form of its rule key. Stores and fetches both go through a sibling
//! temp file and a rename, so a concurrent reader never observes a partial
//! entry. A successful fetch bumps the entry's last-access time, which is
//! what eviction orders by. Temp files abandoned by a crashed writer are
//! swept once they are older than [`STALE_TEMP_AGE`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use brisk_common::RuleKey;
use tracing::{debug, info, warn};

use crate::atomic::{copy_atomic, is_temp_name};
use crate::cache::{ArtifactCache, CacheResult};
use crate::error::CacheError;

/// Temp files at least this old belong to no live writer.
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

/// An artifact cache rooted at a local directory.
#[derive(Debug)]
pub struct DirArtifactCache {
    name: String,
    cache_dir: PathBuf,
    do_store: bool,
    max_cache_size: Option<u64>,
}

/// One file found while scanning the cache directory.
#[derive(Debug)]
struct CacheEntry {
    path: PathBuf,
    size: u64,
    accessed: SystemTime,
}

/// What a scan of the cache directory found.
#[derive(Debug, Default)]
struct Scan {
    entries: Vec<CacheEntry>,
    stale_temps: Vec<PathBuf>,
}

/// Summary of an eviction pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionStats {
    /// Number of entries deleted.
    pub deleted: usize,
    /// Bytes freed.
    pub freed_bytes: u64,
    /// Total size remaining after the pass.
    pub remaining_bytes: u64,
    /// Abandoned temp files removed.
    pub stale_temp_files: usize,
}

impl DirArtifactCache {
    /// Opens (creating if necessary) a cache at `cache_dir`.
    ///
    /// With `do_store` off, [`store`](ArtifactCache::store) is a no-op and
    /// every fetch misses. `max_cache_size` bounds the total size kept by
    /// [`delete_old_files`](Self::delete_old_files); `None` disables eviction.
    pub fn new(
        name: impl Into<String>,
        cache_dir: &Path,
        do_store: bool,
        max_cache_size: Option<u64>,
    ) -> Result<Self, CacheError> {
        fs::create_dir_all(cache_dir).map_err(|e| CacheError::io(cache_dir, e))?;
        Ok(Self {
            name: name.into(),
            cache_dir: cache_dir.to_path_buf(),
            do_store,
            max_cache_size,
        })
    }

    /// The directory holding the entries.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path at which the entry for `key` is stored.
    pub fn entry_path(&self, key: &RuleKey) -> PathBuf {
        self.cache_dir.join(key.to_string())
    }

    /// Deletes least-recently-accessed entries until the total size of the
    /// cache is at most the configured limit, and removes temp files older
    /// than [`STALE_TEMP_AGE`].
    ///
    /// Without a limit no entry is evicted. A limit of zero empties the cache.
    pub fn delete_old_files(&self) -> Result<EvictionStats, CacheError> {
        let scan = self.scan(SystemTime::now())?;
        let stale_temp_files = remove_stale_temps(&scan.stale_temps);
        let Some(limit) = self.max_cache_size else {
            return Ok(EvictionStats {
                stale_temp_files,
                ..EvictionStats::default()
            });
        };

        let mut stats = evict_oldest(scan.entries, limit)?;
        stats.stale_temp_files = stale_temp_files;
        if stats.deleted > 0 {
            info!(
                cache = %self.name,
                deleted = stats.deleted,
                freed_bytes = stats.freed_bytes,
                "evicted old cache entries"
            );
        }
        Ok(stats)
    }

    fn scan(&self, now: SystemTime) -> Result<Scan, CacheError> {
        let dir = &self.cache_dir;
        let read_dir = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Scan::default()),
            Err(e) => return Err(CacheError::io(dir, e)),
        };

        let mut scan = Scan::default();
        for entry in read_dir {
            let entry = entry.map_err(|e| CacheError::io(dir, e))?;
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::io(entry.path(), e)),
            };
            if !meta.is_file() {
                continue;
            }
            if is_temp_name(&entry.file_name().to_string_lossy()) {
                let stale = meta
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .is_some_and(|age| age >= STALE_TEMP_AGE);
                if stale {
                    scan.stale_temps.push(entry.path());
                }
                continue;
            }
            let accessed = meta
                .accessed()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            scan.entries.push(CacheEntry {
                path: entry.path(),
                size: meta.len(),
                accessed,
            });
        }
        Ok(scan)
    }

    fn touch(path: &Path) {
        let now = SystemTime::now();
        let result = fs::File::options()
            .write(true)
            .open(path)
            .and_then(|f| f.set_times(fs::FileTimes::new().set_accessed(now)));
        if let Err(e) = result {
            debug!(path = %path.display(), error = %e, "could not update access time");
        }
    }
}

/// Deletes the oldest entries until at most `limit` bytes remain.
///
/// Entries that vanish before they can be removed no longer take up space
/// but are not counted as evicted.
fn evict_oldest(mut entries: Vec<CacheEntry>, limit: u64) -> Result<EvictionStats, CacheError> {
    entries.sort_by(|a, b| a.accessed.cmp(&b.accessed).then_with(|| a.path.cmp(&b.path)));

    let mut stats = EvictionStats {
        remaining_bytes: entries.iter().map(|e| e.size).sum(),
        ..EvictionStats::default()
    };
    for entry in entries {
        if stats.remaining_bytes <= limit {
            break;
        }
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                stats.deleted += 1;
                stats.freed_bytes += entry.size;
            }
            // Another process evicted it first.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(&entry.path, e)),
        }
        stats.remaining_bytes -= entry.size;
    }
    Ok(stats)
}

/// Removes abandoned temp files, returning how many were deleted. Failures
/// are logged and skipped.
fn remove_stale_temps(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale temp file");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove stale temp file"),
        }
    }
    removed
}

impl ArtifactCache for DirArtifactCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, key: &RuleKey, dest: &Path) -> CacheResult {
        if !self.do_store {
            return CacheResult::Miss;
        }
        let entry = self.entry_path(key);
        if !entry.is_file() {
            debug!(cache = %self.name, %key, "cache miss");
            return CacheResult::Miss;
        }
        match copy_atomic(&entry, dest) {
            Ok(_) => {
                Self::touch(&entry);
                debug!(cache = %self.name, %key, dest = %dest.display(), "cache hit");
                CacheResult::Hit(dest.to_path_buf())
            }
            Err(CacheError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound && !entry.exists() =>
            {
                // Evicted between the check and the copy.
                CacheResult::Miss
            }
            Err(e) => {
                warn!(cache = %self.name, %key, error = %e, "cache fetch failed");
                CacheResult::Error(e.to_string())
            }
        }
    }

    fn store(&self, keys: &[RuleKey], artifact: &Path) -> Result<(), CacheError> {
        if !self.do_store {
            return Ok(());
        }
        for key in keys {
            let entry = self.entry_path(key);
            copy_atomic(artifact, &entry)?;
            debug!(cache = %self.name, %key, "stored artifact");
        }
        Ok(())
    }

    fn is_store_supported(&self) -> bool {
        self.do_store
    }

    fn close(&self) -> Result<(), CacheError> {
        self.delete_old_files().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::TEMP_PREFIX;
    use brisk_common::ContentHash;
    use std::collections::BTreeSet;
    use std::time::{Duration, UNIX_EPOCH};

    fn key(seed: &str) -> RuleKey {
        RuleKey::new(ContentHash::from_bytes(seed.as_bytes()))
    }

    fn file_names(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn set_modified_millis(path: &Path, millis: u64) {
        let f = fs::File::options().write(true).open(path).unwrap();
        f.set_times(fs::FileTimes::new().set_modified(UNIX_EPOCH + Duration::from_millis(millis)))
            .unwrap();
    }

    fn set_accessed_millis(path: &Path, millis: u64) {
        let f = fs::File::options().write(true).open(path).unwrap();
        f.set_times(fs::FileTimes::new().set_accessed(UNIX_EPOCH + Duration::from_millis(millis)))
            .unwrap();
    }

    #[test]
    fn store_then_fetch_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let artifact = tmp.path().join("x");
        fs::write(&artifact, "x").unwrap();

        let cache = DirArtifactCache::new("dir", &cache_dir, true, None).unwrap();
        let k = key("x");
        assert_eq!(cache.fetch(&k, &artifact), CacheResult::Miss);

        cache.store(&[k], &artifact).unwrap();
        fs::remove_file(&artifact).unwrap();

        let dest = tmp.path().join("restored").join("x");
        assert_eq!(cache.fetch(&k, &dest), CacheResult::Hit(dest.clone()));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "x");
    }

    #[test]
    fn fetch_overwrites_existing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let artifact = tmp.path().join("artifact");
        fs::write(&artifact, "cached").unwrap();

        let cache = DirArtifactCache::new("dir", &tmp.path().join("cache"), true, None).unwrap();
        let k = key("overwrite");
        cache.store(&[k], &artifact).unwrap();

        let dest = tmp.path().join("dest");
        fs::write(&dest, "stale and longer").unwrap();
        assert!(cache.fetch(&k, &dest).is_hit());
        assert!(cache.fetch(&k, &dest).is_hit());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "cached");
    }

    #[test]
    fn store_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let artifact = tmp.path().join("y");
        fs::write(&artifact, "y").unwrap();

        let cache = DirArtifactCache::new("dir", &cache_dir, true, None).unwrap();
        let k = key("y");
        cache.store(&[k], &artifact).unwrap();
        cache.store(&[k], &artifact).unwrap();

        assert_eq!(file_names(&cache_dir).len(), 1);
        let dest = tmp.path().join("out");
        assert!(cache.fetch(&k, &dest).is_hit());
        assert_eq!(fs::read_to_string(dest).unwrap(), "y");
    }

    #[test]
    fn no_store_mode_stores_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let artifact = tmp.path().join("z");
        fs::write(&artifact, "z").unwrap();

        let cache = DirArtifactCache::new("dir", &cache_dir, false, None).unwrap();
        let k = key("z");
        cache.store(&[k], &artifact).unwrap();
        assert_eq!(cache.fetch(&k, &artifact), CacheResult::Miss);
        assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 0);
        assert!(!cache.is_store_supported());
    }

    #[test]
    fn store_under_multiple_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let artifact = tmp.path().join("x");
        fs::write(&artifact, "x").unwrap();

        let cache = DirArtifactCache::new("dir", &tmp.path().join("cache"), true, None).unwrap();
        let (k1, k2) = (key("aaaa"), key("bbbb"));
        cache.store(&[k1, k2], &artifact).unwrap();

        assert!(cache.fetch(&k1, &artifact).is_hit());
        assert!(cache.fetch(&k2, &artifact).is_hit());
    }

    #[test]
    fn entries_are_named_by_key_hex() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let artifact = tmp.path().join("a");
        fs::write(&artifact, "a").unwrap();

        let cache = DirArtifactCache::new("dir", &cache_dir, true, None).unwrap();
        let k = key("named");
        cache.store(&[k], &artifact).unwrap();
        assert_eq!(file_names(&cache_dir), BTreeSet::from([k.to_string()]));
    }

    #[test]
    fn delete_nothing_without_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let cache = DirArtifactCache::new("dir", &cache_dir, true, None).unwrap();
        for name in ["x", "y", "z"] {
            fs::write(cache_dir.join(name), name).unwrap();
        }

        let stats = cache.delete_old_files().unwrap();
        assert_eq!(stats.deleted, 0);
        assert_eq!(file_names(&cache_dir).len(), 3);
    }

    #[test]
    fn delete_nothing_under_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let cache = DirArtifactCache::new("dir", &cache_dir, true, Some(1024)).unwrap();
        for name in ["x", "y", "z"] {
            fs::write(cache_dir.join(name), name).unwrap();
        }

        cache.delete_old_files().unwrap();
        assert_eq!(file_names(&cache_dir).len(), 3);
    }

    #[test]
    fn zero_limit_deletes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let cache = DirArtifactCache::new("dir", &cache_dir, true, Some(0)).unwrap();
        for name in ["x", "y", "z"] {
            fs::write(cache_dir.join(name), name).unwrap();
        }

        let stats = cache.delete_old_files().unwrap();
        assert_eq!(stats.deleted, 3);
        assert_eq!(stats.remaining_bytes, 0);
        assert!(file_names(&cache_dir).is_empty());
    }

    #[test]
    fn evicts_least_recently_accessed_first() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let cache = DirArtifactCache::new("dir", &cache_dir, true, Some(2)).unwrap();
        for name in ["w", "x", "y", "z"] {
            fs::write(cache_dir.join(name), name).unwrap();
        }
        set_accessed_millis(&cache_dir.join("w"), 9000);
        set_accessed_millis(&cache_dir.join("x"), 0);
        set_accessed_millis(&cache_dir.join("y"), 1000);
        set_accessed_millis(&cache_dir.join("z"), 2000);
        assert_eq!(file_names(&cache_dir).len(), 4);

        let stats = cache.delete_old_files().unwrap();
        assert_eq!(stats.deleted, 2);
        assert_eq!(
            file_names(&cache_dir),
            BTreeSet::from(["w".to_string(), "z".to_string()])
        );
    }

    #[test]
    fn fetch_refreshes_access_time() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let artifact = tmp.path().join("artifact");
        fs::write(&artifact, "a").unwrap();

        let cache = DirArtifactCache::new("dir", &cache_dir, true, Some(1)).unwrap();
        let (old, fresh) = (key("old"), key("fresh"));
        cache.store(&[old, fresh], &artifact).unwrap();
        set_accessed_millis(&cache.entry_path(&old), 0);
        set_accessed_millis(&cache.entry_path(&fresh), 1000);

        // Fetching `old` makes it the most recently used entry.
        assert!(cache.fetch(&old, &tmp.path().join("out")).is_hit());
        cache.delete_old_files().unwrap();

        assert!(cache.entry_path(&old).exists());
        assert!(!cache.entry_path(&fresh).exists());
    }

    #[test]
    fn close_runs_eviction() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let cache = DirArtifactCache::new("dir", &cache_dir, true, Some(0)).unwrap();
        fs::write(cache_dir.join("x"), "x").unwrap();

        cache.close().unwrap();
        assert!(file_names(&cache_dir).is_empty());
    }

    #[test]
    fn old_temp_files_are_swept() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let cache = DirArtifactCache::new("dir", &cache_dir, true, None).unwrap();
        let abandoned = cache_dir.join(format!("{TEMP_PREFIX}1-0-abandoned"));
        let in_flight = cache_dir.join(format!("{TEMP_PREFIX}1-1-in-flight"));
        fs::write(&abandoned, "partial").unwrap();
        fs::write(&in_flight, "partial").unwrap();
        fs::write(cache_dir.join("x"), "x").unwrap();
        set_modified_millis(&abandoned, 1000);

        let stats = cache.delete_old_files().unwrap();
        assert_eq!(stats.stale_temp_files, 1);
        assert_eq!(stats.deleted, 0);
        assert_eq!(
            file_names(&cache_dir),
            BTreeSet::from([format!("{TEMP_PREFIX}1-1-in-flight"), "x".to_string()])
        );
    }

    #[test]
    fn entries_removed_elsewhere_are_not_counted() {
        let tmp = tempfile::tempdir().unwrap();
        let present = tmp.path().join("present");
        fs::write(&present, "abc").unwrap();
        let entries = vec![
            CacheEntry {
                path: tmp.path().join("gone"),
                size: 5,
                accessed: UNIX_EPOCH,
            },
            CacheEntry {
                path: present.clone(),
                size: 3,
                accessed: UNIX_EPOCH + Duration::from_secs(1),
            },
        ];

        let stats = evict_oldest(entries, 0).unwrap();
        assert_eq!(
            stats,
            EvictionStats {
                deleted: 1,
                freed_bytes: 3,
                remaining_bytes: 0,
                stale_temp_files: 0,
            }
        );
        assert!(!present.exists());
    }

    #[test]
    fn eviction_of_empty_cache_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DirArtifactCache::new("dir", &tmp.path().join("cache"), true, Some(0)).unwrap();
        assert_eq!(cache.delete_old_files().unwrap(), EvictionStats::default());
    }
}
