//! The build rule abstraction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use brisk_cache::BuildInfoRecorder;
use brisk_common::BuildTarget;
use brisk_step::Step;

use crate::field::FieldValue;

/// How a rule's steps are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepExecution {
    /// One after another, in declared order.
    #[default]
    Sequential,
    /// All at once; the first failure fails the rule.
    Parallel,
}

/// Locations a rule needs when producing its steps.
#[derive(Debug, Clone)]
pub struct BuildContext {
    project_root: PathBuf,
    output_root: PathBuf,
}

impl BuildContext {
    /// Creates a context.
    pub fn new(project_root: &Path, output_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
        }
    }

    /// Root of the source tree; relative paths resolve against it.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Directory that holds generated files and metadata.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }
}

/// A named, typed unit of work in the build graph.
///
/// A rule is immutable once constructed. Its identity is its target, and
/// its fingerprint is derived from [`rule_type`](Self::rule_type), the
/// values returned by [`fields`](Self::fields) and its dependencies.
pub trait BuildRule: Send + Sync {
    /// The rule's identity.
    fn target(&self) -> &BuildTarget;

    /// Rule type name, e.g. `genrule`. Part of every key.
    fn rule_type(&self) -> &str;

    /// Rules that must be built before this one.
    fn deps(&self) -> &[BuildTarget];

    /// Fingerprint-relevant fields in a fixed, type-defined order.
    fn fields(&self) -> Vec<(String, FieldValue)>;

    /// Files or directories this rule produces, relative to the project root.
    fn outputs(&self) -> Vec<PathBuf>;

    /// The steps that produce the outputs.
    fn build_steps(&self, context: &BuildContext) -> Vec<Arc<dyn Step>>;

    /// Whether [`build_steps`](Self::build_steps) may run concurrently.
    fn step_execution(&self) -> StepExecution {
        StepExecution::Sequential
    }

    /// Whether the rule's outputs depend only on the content of its
    /// dependencies' outputs, so an input-based key may stand in for the
    /// default key.
    fn supports_input_based_rule_key(&self) -> bool {
        false
    }

    /// Whether the rule only depends on its dependencies' ABI, so it may
    /// skip rebuilding when that ABI and its own fields are unchanged.
    fn supports_abi_key(&self) -> bool {
        false
    }

    /// The subset of outputs that make up this rule's ABI, relative to the
    /// project root. Defaults to all outputs.
    fn abi_outputs(&self) -> Vec<PathBuf> {
        self.outputs()
    }

    /// Adds rule-specific values to the metadata written after a local build.
    fn record_metadata(&self, _recorder: &mut BuildInfoRecorder) {}
}

impl std::fmt::Debug for dyn BuildRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.rule_type(), self.target())
    }
}
