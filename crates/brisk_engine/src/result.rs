//! Per-rule and per-build outcomes.

use std::path::PathBuf;
use std::time::Duration;

use brisk_common::BuildTarget;

use crate::success::BuildRuleSuccessType;

/// Terminal state of one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleStatus {
    /// Reused from disk or cache, or built.
    Success(BuildRuleSuccessType),
    /// The rule ran and failed.
    Failed(String),
    /// The rule never ran: a dependency failed or the build stopped first.
    Skipped(String),
}

impl RuleStatus {
    /// Returns `true` for [`RuleStatus::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, RuleStatus::Success(_))
    }

    /// Short label for events and logs.
    pub fn label(&self) -> &'static str {
        match self {
            RuleStatus::Success(ty) => ty.as_str(),
            RuleStatus::Failed(_) => "FAILED",
            RuleStatus::Skipped(_) => "SKIPPED",
        }
    }
}

/// The outcome of one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildResult {
    /// The rule.
    pub target: BuildTarget,
    /// How it ended.
    pub status: RuleStatus,
    /// Declared outputs, relative to the project root.
    pub outputs: Vec<PathBuf>,
}

impl BuildResult {
    /// The success type, if the rule succeeded.
    pub fn success_type(&self) -> Option<BuildRuleSuccessType> {
        match self.status {
            RuleStatus::Success(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Everything a call to [`BuildEngine::build`](crate::BuildEngine::build)
/// produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The targets that were requested, in request order.
    pub requested: Vec<BuildTarget>,
    /// One result per rule in the requested closure, dependencies first.
    pub results: Vec<BuildResult>,
    /// Wall-clock time of the build.
    pub elapsed: Duration,
    /// Whether the build was interrupted.
    pub interrupted: bool,
}

impl BuildOutcome {
    /// Returns `true` if every rule succeeded.
    pub fn is_success(&self) -> bool {
        !self.interrupted && self.results.iter().all(|r| r.status.is_success())
    }

    /// `0` on success, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// The result for `target`, if it was part of the build.
    pub fn result(&self, target: &BuildTarget) -> Option<&BuildResult> {
        self.results.iter().find(|r| &r.target == target)
    }

    /// Rules that ran and failed.
    pub fn failures(&self) -> impl Iterator<Item = &BuildResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, RuleStatus::Failed(_)))
    }
}
