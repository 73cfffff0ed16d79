//! Atomic file replacement: write to a sibling temp file, then rename.
//!
//! A reader (or a later process after a crash) sees either the old file or
//! the complete new one, never a partial write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CacheError;

/// Prefix of in-progress temp files. Eviction and listing skip these.
pub(crate) const TEMP_PREFIX: &str = ".tmp-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns a unique temp path in the same directory as `dest`.
fn temp_path_for(dest: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = format!("{TEMP_PREFIX}{}-{n}-{name}", std::process::id());
    match dest.parent() {
        Some(parent) => parent.join(tmp),
        None => PathBuf::from(tmp),
    }
}

fn ensure_parent(path: &Path) -> Result<(), CacheError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }
    Ok(())
}

fn commit(tmp: &Path, dest: &Path) -> Result<(), CacheError> {
    fs::rename(tmp, dest).map_err(|e| {
        let _ = fs::remove_file(tmp);
        CacheError::io(dest, e)
    })
}

/// Atomically replaces `dest` with `data`, creating parent directories.
pub(crate) fn write_atomic(dest: &Path, data: &[u8]) -> Result<(), CacheError> {
    ensure_parent(dest)?;
    let tmp = temp_path_for(dest);
    let result = fs::File::create(&tmp)
        .and_then(|mut f| {
            f.write_all(data)?;
            f.sync_all()
        })
        .map_err(|e| CacheError::io(&tmp, e));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    commit(&tmp, dest)
}

/// Atomically replaces `dest` with a copy of `src`, creating parent directories.
pub(crate) fn copy_atomic(src: &Path, dest: &Path) -> Result<u64, CacheError> {
    ensure_parent(dest)?;
    let tmp = temp_path_for(dest);
    let copied = match fs::copy(src, &tmp) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io(src, e));
        }
    };
    commit(&tmp, dest)?;
    Ok(copied)
}

/// Returns `true` for names produced by [`temp_path_for`].
pub(crate) fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}
