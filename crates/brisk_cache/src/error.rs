//! The error type of the cache crate.

use std::path::PathBuf;

/// A cache, bundle or metadata operation failed.
///
/// Fetches and metadata reads never surface this: they degrade to a miss or
/// to absent metadata. It reaches callers from stores, bundle packing and
/// eviction.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem access failed.
    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// Cause.
        source: std::io::Error,
    },

    /// The file does not start with a readable bundle header.
    #[error("{} is not an artifact bundle: {reason}", .path.display())]
    InvalidHeader {
        /// Bundle file.
        path: PathBuf,
        /// What was wrong with the header.
        reason: String,
    },

    /// The payload digest differs from the one recorded in the header.
    #[error("corrupt bundle {}: header digest {expected}, payload digest {actual}", .path.display())]
    ChecksumMismatch {
        /// Bundle file.
        path: PathBuf,
        /// Digest stored in the header.
        expected: String,
        /// Digest of the bytes actually read.
        actual: String,
    },

    /// The bundle was written by an incompatible format revision.
    #[error("bundle {} has format {actual}, this build reads format {expected}", .path.display())]
    VersionMismatch {
        /// Bundle file.
        path: PathBuf,
        /// The format this code reads.
        expected: u32,
        /// The format found.
        actual: u32,
    },

    /// A relative path would resolve outside its root.
    #[error("path escapes its root: {}", .path.display())]
    UnsafeEntryPath {
        /// The rejected path.
        path: PathBuf,
    },

    /// A bundle unpacked cleanly but did not restore an output the rule declares.
    #[error("cached artifact did not restore {}", .path.display())]
    IncompleteArtifact {
        /// The missing output.
        path: PathBuf,
    },

    /// bincode could not encode or decode a bundle payload.
    #[error("bundle payload encoding failed: {reason}")]
    Serialization {
        /// Encoder or decoder message.
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
