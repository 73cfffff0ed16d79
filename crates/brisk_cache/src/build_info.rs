//! Per-rule build metadata persisted between runs.
//!
//! Each rule owns a metadata directory under the output root:
//! `<output_root>/bin/<base>/.<name>/metadata/`. Every key is one file whose
//! contents are the value. Lists are JSON arrays of strings and hashes are
//! lowercase hex.
//!
//! Reads never fail. A missing, malformed or non-hex value reads as `None`,
//! which the build engine treats as "no previous build".

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use brisk_common::{BuildTarget, ContentHash, RuleKey};
use tracing::{debug, warn};

use crate::atomic::write_atomic;
use crate::error::CacheError;

/// Default rule key of the last successful build.
pub const RULE_KEY: &str = "RULE_KEY";
/// Input-based rule key of the last successful build.
pub const INPUT_BASED_RULE_KEY: &str = "INPUT_BASED_RULE_KEY";
/// Rule key computed without any dependency contribution.
pub const RULE_KEY_NO_DEPS: &str = "RULE_KEY_NO_DEPS";
/// Digest over the ABI outputs of the rule's dependencies.
pub const ABI_KEY_FOR_DEPS: &str = "ABI_KEY_FOR_DEPS";
/// Content hash over the rule's outputs.
pub const OUTPUT_HASH: &str = "OUTPUT_HASH";
/// JSON array of the output paths, relative to the project root.
pub const RECORDED_PATHS: &str = "RECORDED_PATHS";

/// Returns the metadata directory for `target` under `output_root`.
pub fn metadata_dir(output_root: &Path, target: &BuildTarget) -> PathBuf {
    output_root
        .join("bin")
        .join(target.scratch_dir())
        .join("metadata")
}

/// Read access to the metadata a previous build left for one rule.
#[derive(Debug, Clone)]
pub struct OnDiskBuildInfo {
    project_root: PathBuf,
    metadata_dir: PathBuf,
}

impl OnDiskBuildInfo {
    /// Opens the metadata of `target`. Nothing is read until a getter is called.
    pub fn new(project_root: &Path, output_root: &Path, target: &BuildTarget) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            metadata_dir: metadata_dir(output_root, target),
        }
    }

    /// The directory holding this rule's metadata files.
    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    /// Returns the raw value stored under `key`.
    pub fn get_value(&self, key: &str) -> Option<String> {
        if check_key(key).is_err() {
            warn!(key, "ignoring metadata lookup with an invalid key");
            return None;
        }
        let path = self.metadata_dir.join(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read build metadata");
                None
            }
        }
    }

    /// Returns the list stored under `key`, which must be a JSON array of strings.
    pub fn get_values(&self, key: &str) -> Option<Vec<String>> {
        let value = self.get_value(key)?;
        match serde_json::from_str::<Vec<String>>(&value) {
            Ok(values) => Some(values),
            Err(e) => {
                warn!(key, error = %e, "build metadata is not a JSON array of strings");
                None
            }
        }
    }

    /// Returns the content hash stored under `key`.
    pub fn get_hash(&self, key: &str) -> Option<ContentHash> {
        let Some(value) = self.get_value(key) else {
            debug!(key, "hash not found in build metadata");
            return None;
        };
        let hash = ContentHash::from_hex(value.trim());
        if hash.is_none() {
            warn!(key, value = %value, "build metadata value is not a valid hash");
        }
        hash
    }

    /// Returns the rule key stored under `key`.
    pub fn get_rule_key(&self, key: &str) -> Option<RuleKey> {
        self.get_hash(key).map(RuleKey::new)
    }

    /// Reads every metadata value in the directory.
    ///
    /// Entries that are not readable as UTF-8 files are skipped.
    pub fn get_all(&self) -> BTreeMap<String, String> {
        let Ok(read_dir) = std::fs::read_dir(&self.metadata_dir) else {
            return BTreeMap::new();
        };
        read_dir
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|key| check_key(key).is_ok())
            .filter_map(|key| self.get_value(&key).map(|value| (key, value)))
            .collect()
    }

    /// Reads an output file (path relative to the project root) line by line.
    pub fn get_output_file_lines(&self, relative: &Path) -> std::io::Result<Vec<String>> {
        let content = std::fs::read_to_string(self.project_root.join(relative))?;
        Ok(content.lines().map(str::to_string).collect())
    }

    /// Removes the metadata directory and everything in it.
    pub fn delete_existing_metadata(&self) -> Result<(), CacheError> {
        match std::fs::remove_dir_all(&self.metadata_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.metadata_dir, e)),
        }
    }
}

/// Accumulates metadata for one rule and writes it in a single pass.
#[derive(Debug, Clone)]
pub struct BuildInfoRecorder {
    metadata_dir: PathBuf,
    values: BTreeMap<String, String>,
}

impl BuildInfoRecorder {
    /// Creates an empty recorder for `target`.
    pub fn new(output_root: &Path, target: &BuildTarget) -> Self {
        Self {
            metadata_dir: metadata_dir(output_root, target),
            values: BTreeMap::new(),
        }
    }

    /// Records a string value, replacing any earlier value for `key`.
    pub fn add_metadata(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Records a list value as a JSON array.
    pub fn add_metadata_list(&mut self, key: &str, values: &[String]) -> &mut Self {
        // Serializing a slice of strings cannot fail.
        let json = serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string());
        self.values.insert(key.to_string(), json);
        self
    }

    /// Records every pair in `values`.
    pub fn add_all(&mut self, values: &BTreeMap<String, String>) -> &mut Self {
        self.values
            .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Everything recorded so far.
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// The recorded value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Keys recorded so far, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Writes every recorded value to disk.
    ///
    /// With `clear_existing`, the directory is emptied first so no value from
    /// an older build survives. Otherwise only the recorded keys change.
    /// Each file is replaced atomically.
    pub fn write_metadata_to_disk(&self, clear_existing: bool) -> Result<(), CacheError> {
        for key in self.values.keys() {
            check_key(key)?;
        }
        if clear_existing {
            match std::fs::remove_dir_all(&self.metadata_dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(&self.metadata_dir, e)),
            }
        }
        std::fs::create_dir_all(&self.metadata_dir)
            .map_err(|e| CacheError::io(&self.metadata_dir, e))?;
        for (key, value) in &self.values {
            write_atomic(&self.metadata_dir.join(key), value.as_bytes())?;
        }
        Ok(())
    }
}

/// Metadata keys become file names, so they must be a single normal component.
fn check_key(key: &str) -> Result<(), CacheError> {
    let path = Path::new(key);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !key.starts_with('.') => Ok(()),
        _ => Err(CacheError::UnsafeEntryPath {
            path: path.to_path_buf(),
        }),
    }
}
