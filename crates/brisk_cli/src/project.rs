//! Shared plumbing for subcommands: locating the project and loading its
//! settings and rules.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use brisk_cache::{ArtifactCache, DirArtifactCache, NoopArtifactCache};
use brisk_config::{
    load_config, load_config_file, resolve_settings, CacheMode, ResolvedCache, ResolvedSettings,
    SettingsOverrides, CONFIG_FILE,
};

use crate::rules_file::RULES_FILE;
use crate::GlobalArgs;

/// Walks up from `start` to the first directory holding `brisk.toml` or
/// `rules.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).is_file() || current.join(RULES_FILE).is_file() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} or {RULES_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// The project root: the directory of `--config` if given, else the
/// nearest enclosing project of the working directory.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match &global.config {
        Some(config) if config.is_file() => Ok(config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))),
        Some(dir) => Ok(dir.clone()),
        None => find_project_root(&std::env::current_dir()?),
    }
}

/// Loads `brisk.toml` and resolves it together with `overrides`.
pub fn load_settings(
    global: &GlobalArgs,
    project_root: &Path,
    overrides: &SettingsOverrides,
) -> Result<ResolvedSettings, Box<dyn std::error::Error>> {
    let config = match &global.config {
        Some(path) if path.is_file() => load_config_file(path)?,
        _ => load_config(project_root)?,
    };
    let processors = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    Ok(resolve_settings(&config, overrides, project_root, processors)?)
}

/// Opens the configured artifact cache.
pub fn open_cache(cache: &ResolvedCache) -> Result<Arc<dyn ArtifactCache>, Box<dyn std::error::Error>> {
    Ok(match cache.mode {
        CacheMode::Dir => Arc::new(DirArtifactCache::new(
            "dir",
            &cache.dir,
            cache.store,
            cache.max_size.map(|size| size.bytes()),
        )?),
        CacheMode::None => Arc::new(NoopArtifactCache),
    })
}
