//! `brisk cache`: maintenance of the artifact cache.

use brisk_cache::{DirArtifactCache, EvictionStats};
use brisk_common::ByteSize;
use brisk_config::{CacheMode, SettingsOverrides};

use crate::project::{load_settings, resolve_project_root};
use crate::{CacheAction, GlobalArgs};

/// Runs a `brisk cache` subcommand.
pub fn run(action: &CacheAction, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    match action {
        CacheAction::Gc => gc(global),
    }
}

fn gc(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_root = resolve_project_root(global)?;
    let settings = load_settings(global, &project_root, &SettingsOverrides::default())?;
    let cache = &settings.cache;

    if cache.mode == CacheMode::None {
        if !global.quiet {
            eprintln!("cache is disabled; nothing to collect");
        }
        return Ok(0);
    }
    let Some(limit) = cache.max_size else {
        if !global.quiet {
            eprintln!("cache.max_size is not set; nothing to collect");
        }
        return Ok(0);
    };

    let dir_cache = DirArtifactCache::new("dir", &cache.dir, cache.store, Some(limit.bytes()))?;
    let stats = dir_cache.delete_old_files()?;
    if !global.quiet {
        eprintln!("{}", summary(&stats, limit));
    }
    Ok(0)
}

fn summary(stats: &EvictionStats, limit: ByteSize) -> String {
    format!(
        "removed {} entries ({} bytes), {} bytes remain (limit {limit})",
        stats.deleted, stats.freed_bytes, stats.remaining_bytes
    )
}
