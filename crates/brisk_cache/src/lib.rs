//! Content-addressed artifact caching and per-rule build metadata.
//!
//! This crate holds everything the build engine persists between runs: the
//! memoizing file hasher used for fingerprints, the artifact cache that maps
//! rule keys to stored outputs, the bundle format those outputs are packed
//! into, and the on-disk metadata that records what the last build produced.

#![warn(missing_docs)]

mod atomic;
pub mod artifact;
pub mod build_info;
pub mod cache;
pub mod dir_cache;
pub mod error;
pub mod file_hash;

pub use artifact::{ArtifactBundle, BundleEntry};
pub use build_info::{metadata_dir, BuildInfoRecorder, OnDiskBuildInfo};
pub use cache::{ArtifactCache, CacheResult, NoopArtifactCache};
pub use dir_cache::{DirArtifactCache, EvictionStats};
pub use error::CacheError;
pub use file_hash::{FileHashCache, FileHashSource};
