//! Artifact bundles: one file carrying every output of a rule.
//!
//! The artifact cache stores single files, but a rule may produce several
//! outputs plus its build metadata. A bundle packs the output files (paths
//! relative to the project root) and the metadata key/value pairs into one
//! blob with a validated header:
//!
//! ```text
//! [u32 LE header length][bincode header][bincode payload]
//! ```
//!
//! The header carries magic bytes, the format version and a checksum of the
//! payload, so a truncated or foreign cache entry is rejected instead of
//! being unpacked.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use brisk_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::CacheError;

/// Magic bytes identifying a Brisk artifact bundle.
const BUNDLE_MAGIC: [u8; 4] = *b"BRSK";

/// Current bundle format version. Increment on breaking changes to
/// the header or payload format.
const BUNDLE_FORMAT_VERSION: u32 = 2;

/// Header prepended to every bundle for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BundleHeader {
    magic: [u8; 4],
    format_version: u32,
    /// Brisk version that produced this bundle.
    brisk_version: String,
    checksum: ContentHash,
}

/// One file, or one empty directory, inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    /// Path relative to the unpack root, with `/` separators.
    pub path: String,
    /// File contents. Empty for directories.
    pub data: Vec<u8>,
    /// Whether the file carries an executable bit.
    pub executable: bool,
    /// The entry is an empty directory rather than a file.
    pub directory: bool,
}

/// A set of files, plus the metadata describing them, that are stored and
/// restored together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    entries: Vec<BundleEntry>,
    metadata: BTreeMap<String, String>,
}

impl ArtifactBundle {
    /// Reads `paths` (relative to `root`) into a bundle.
    ///
    /// Directories are included recursively; empty ones are kept as
    /// directory entries so they are recreated on unpack. Entries are sorted
    /// by path so identical inputs always produce identical bytes.
    pub fn pack(root: &Path, paths: &[PathBuf]) -> Result<Self, CacheError> {
        let mut entries = Vec::new();
        for rel in paths {
            check_relative(rel)?;
            collect(root, rel, &mut entries)?;
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|a, b| a.path == b.path);
        Ok(Self {
            entries,
            metadata: BTreeMap::new(),
        })
    }

    /// Attaches build metadata to the bundle.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// The files and empty directories in the bundle, sorted by path.
    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }

    /// Build metadata recorded alongside the files.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Number of files in the bundle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the bundle holds no files.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the bundle, header included.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CacheError> {
        let payload = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let header = BundleHeader {
            magic: BUNDLE_MAGIC,
            format_version: BUNDLE_FORMAT_VERSION,
            brisk_version: env!("CARGO_PKG_VERSION").to_string(),
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);
        Ok(output)
    }

    /// Parses and validates bundle bytes. `path` is used for error messages.
    pub fn from_bytes(raw: &[u8], path: &Path) -> Result<Self, CacheError> {
        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let len_bytes: [u8; 4] = raw
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| invalid("file too short"))?;
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        let header_end = 4usize
            .checked_add(header_len)
            .filter(|end| *end <= raw.len())
            .ok_or_else(|| invalid("truncated header"))?;

        let (header, _): (BundleHeader, usize) =
            bincode::serde::decode_from_slice(&raw[4..header_end], bincode::config::standard())
                .map_err(|_| invalid("undecodable header"))?;

        if header.magic != BUNDLE_MAGIC {
            return Err(invalid("missing magic bytes"));
        }
        if header.format_version != BUNDLE_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path: path.to_path_buf(),
                expected: BUNDLE_FORMAT_VERSION,
                actual: header.format_version,
            });
        }

        let payload = &raw[header_end..];
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: header.checksum.to_string(),
                actual: actual.to_string(),
            });
        }

        let (bundle, _): (ArtifactBundle, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard()).map_err(
                |e| CacheError::Serialization {
                    reason: e.to_string(),
                },
            )?;
        Ok(bundle)
    }

    /// Atomically writes the bundle to `dest`.
    pub fn write_to(&self, dest: &Path) -> Result<(), CacheError> {
        write_atomic(dest, &self.to_bytes()?)
    }

    /// Reads and validates a bundle file.
    pub fn read_from(path: &Path) -> Result<Self, CacheError> {
        let raw = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
        Self::from_bytes(&raw, path)
    }

    /// Writes every entry under `root`, replacing existing files atomically.
    /// Metadata is left to the caller.
    ///
    /// All entry paths are validated before anything is written, so a bundle
    /// with an escaping path leaves the tree untouched. Returns the absolute
    /// paths written.
    pub fn unpack(&self, root: &Path) -> Result<Vec<PathBuf>, CacheError> {
        for entry in &self.entries {
            check_relative(Path::new(&entry.path))?;
        }

        let mut written = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let dest = root.join(&entry.path);
            if entry.directory {
                std::fs::create_dir_all(&dest).map_err(|e| CacheError::io(&dest, e))?;
                written.push(dest);
                continue;
            }
            write_atomic(&dest, &entry.data)?;
            if entry.executable {
                set_executable(&dest)?;
            }
            written.push(dest);
        }
        Ok(written)
    }
}

/// Rejects absolute paths and any `..` component.
fn check_relative(path: &Path) -> Result<(), CacheError> {
    let safe = !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if safe {
        Ok(())
    } else {
        Err(CacheError::UnsafeEntryPath {
            path: path.to_path_buf(),
        })
    }
}

fn collect(root: &Path, rel: &Path, entries: &mut Vec<BundleEntry>) -> Result<(), CacheError> {
    let abs = root.join(rel);
    let meta = std::fs::metadata(&abs).map_err(|e| CacheError::io(&abs, e))?;
    if meta.is_dir() {
        let read_dir = std::fs::read_dir(&abs).map_err(|e| CacheError::io(&abs, e))?;
        let mut empty = true;
        for child in read_dir {
            let child = child.map_err(|e| CacheError::io(&abs, e))?;
            empty = false;
            collect(root, &rel.join(child.file_name()), entries)?;
        }
        if empty {
            entries.push(BundleEntry {
                path: portable(rel),
                data: Vec::new(),
                executable: false,
                directory: true,
            });
        }
        return Ok(());
    }

    let data = std::fs::read(&abs).map_err(|e| CacheError::io(&abs, e))?;
    entries.push(BundleEntry {
        path: portable(rel),
        data,
        executable: is_executable(&meta),
        directory: false,
    });
    Ok(())
}

fn portable(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), CacheError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)
        .map_err(|e| CacheError::io(path, e))?
        .permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms).map_err(|e| CacheError::io(path, e))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), CacheError> {
    Ok(())
}
