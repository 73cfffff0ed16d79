//! The machine-readable build report.
//!
//! ```json
//! {
//!   "success": false,
//!   "results": {
//!     "//app:lib": { "success": true, "type": "BUILT_LOCALLY", "output": "brisk-out/gen/app/lib.txt" },
//!     "//app:bin": { "success": false, "error": "Failed on step sh with exit code 1:\n..." }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::EngineError;
use crate::result::{BuildOutcome, RuleStatus};
use crate::success::BuildRuleSuccessType;

/// Serializable summary of a [`BuildOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    /// Whether every rule succeeded.
    pub success: bool,
    /// Per-target entries keyed by the target's display form.
    pub results: BTreeMap<String, ReportEntry>,
}

/// One rule in a [`BuildReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    /// Whether the rule succeeded.
    pub success: bool,
    /// How it succeeded.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub success_type: Option<BuildRuleSuccessType>,
    /// First declared output, relative to the project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Failure or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BuildReport {
    /// Summarizes `outcome`.
    pub fn from_outcome(outcome: &BuildOutcome) -> Self {
        let results = outcome
            .results
            .iter()
            .map(|result| {
                let (success_type, error) = match &result.status {
                    RuleStatus::Success(ty) => (Some(*ty), None),
                    RuleStatus::Failed(msg) | RuleStatus::Skipped(msg) => (None, Some(msg.clone())),
                };
                let output = success_type
                    .and(result.outputs.first())
                    .map(|p| p.to_string_lossy().into_owned());
                let entry = ReportEntry {
                    success: result.status.is_success(),
                    success_type,
                    output,
                    error,
                };
                (result.target.to_string(), entry)
            })
            .collect();
        Self {
            success: outcome.is_success(),
            results,
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> String {
        // Only strings, booleans and maps with string keys: cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Writes the report to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<(), EngineError> {
        let io = |source| EngineError::Report {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(path, self.to_json()).map_err(io)
    }
}
