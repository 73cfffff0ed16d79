//! Errors raised while assembling the rule graph and computing rule keys.

use std::path::PathBuf;

use brisk_common::BuildTarget;

/// The rule graph is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Two rules share one target.
    #[error("duplicate rule for target {0}")]
    DuplicateTarget(BuildTarget),

    /// A rule names a dependency that is not in the graph.
    #[error("{rule} depends on unknown target {dep}")]
    UnknownDependency {
        /// The rule declaring the dependency.
        rule: BuildTarget,
        /// The missing target.
        dep: BuildTarget,
    },

    /// The dependency relation has a cycle.
    #[error("dependency cycle: {}", format_cycle(.path))]
    Cycle {
        /// Targets along the cycle; the first is repeated at the end.
        path: Vec<BuildTarget>,
    },
}

fn format_cycle(path: &[BuildTarget]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A rule key could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintError {
    /// A declared input path is missing or unreadable.
    #[error("{target}: unable to hash input {}: {reason}", .path.display())]
    InputUnreadable {
        /// The rule being fingerprinted.
        target: BuildTarget,
        /// The offending path, relative to the project root.
        path: PathBuf,
        /// The underlying I/O error.
        reason: String,
    },

    /// A dependency's output could not be hashed.
    #[error("{target}: unable to hash output {}: {reason}", .path.display())]
    OutputUnreadable {
        /// The rule whose output is missing.
        target: BuildTarget,
        /// The offending path, relative to the project root.
        path: PathBuf,
        /// The underlying I/O error.
        reason: String,
    },

    /// A rule reported the same field name twice.
    #[error("{target}: field '{field}' was added to the rule key more than once")]
    DuplicateField {
        /// The rule being fingerprinted.
        target: BuildTarget,
        /// The repeated field name.
        field: String,
    },

    /// A field references a target that is not in the graph.
    #[error("{target}: field references unknown target {reference}")]
    UnknownTarget {
        /// The rule being fingerprinted.
        target: BuildTarget,
        /// The unknown target.
        reference: BuildTarget,
    },
}
