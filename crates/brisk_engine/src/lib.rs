//! The incremental build engine.
//!
//! [`BuildEngine`] schedules the rules of a [`RuleGraph`](brisk_rules::RuleGraph)
//! in dependency order on a bounded set of workers. For each rule it first
//! tries to avoid work, reusing matching on-disk outputs or fetching them from
//! the artifact cache, and only runs the rule's steps when nothing can be
//! reused. How a rule succeeded, its [`BuildRuleSuccessType`], decides what
//! is uploaded and how its metadata is recorded.

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod limit;
pub mod report;
pub mod result;
pub mod success;

pub use engine::{BuildEngine, EngineSettings, InterruptHandle};
pub use error::{EngineError, RuleError};
pub use limit::{ConcurrencyLimit, LoadMonitor, ProcLoadAvg};
pub use report::{BuildReport, ReportEntry};
pub use result::{BuildOutcome, BuildResult, RuleStatus};
pub use success::{BuildRuleSuccessType, SuccessTypeProperties};
