//! The step abstraction.

use crate::context::ExecutionContext;
use crate::error::StepError;

/// One side-effecting operation in a rule's build, such as running a
/// compiler or writing a file.
///
/// A step reports success with exit code `0`. Any other exit code, a
/// returned error, or a panic fails the rule.
pub trait Step: Send + Sync {
    /// Short identifier, e.g. `javac` or `mkdir`.
    fn short_name(&self) -> &str;

    /// Human-readable description of what this step will do.
    fn description(&self, context: &ExecutionContext) -> String;

    /// Performs the step. Long-running steps should poll
    /// [`ExecutionContext::is_interrupted`] and stop early.
    fn execute(&self, context: &ExecutionContext) -> Result<i32, StepError>;
}
