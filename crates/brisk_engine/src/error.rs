//! Engine and per-rule errors.

use std::path::PathBuf;

use brisk_cache::CacheError;
use brisk_common::BuildTarget;
use brisk_rules::FingerprintError;
use brisk_step::StepFailedError;

/// The build could not be started or its results could not be written.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A requested target is not in the rule graph.
    #[error("unknown target {0}")]
    UnknownTarget(BuildTarget),

    /// The step pool could not be created.
    #[error("failed to start step pool: {0}")]
    ThreadPool(String),

    /// The build report could not be written.
    #[error("failed to write build report {}: {source}", .path.display())]
    Report {
        /// Report destination.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Why a single rule failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuleError {
    /// Its key could not be computed.
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    /// A step failed.
    #[error(transparent)]
    Step(#[from] StepFailedError),

    /// Its build metadata could not be written.
    #[error("{target}: failed to record build metadata: {reason}")]
    Metadata {
        /// The rule.
        target: BuildTarget,
        /// The underlying cache error.
        reason: String,
    },
}

impl RuleError {
    pub(crate) fn metadata(target: &BuildTarget, err: CacheError) -> Self {
        RuleError::Metadata {
            target: target.clone(),
            reason: err.to_string(),
        }
    }
}
