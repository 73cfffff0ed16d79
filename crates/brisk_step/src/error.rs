//! Step failure reporting.

use brisk_common::BuildTarget;

/// Error a step returns from [`Step::execute`](crate::Step::execute).
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// A step did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepFailedError {
    /// The step ran to completion but reported a non-zero exit code.
    #[error("Failed on step {step} with exit code {exit_code}:\n{description}")]
    ExitCode {
        /// Short name of the step.
        step: String,
        /// Description of what the step was doing.
        description: String,
        /// The non-zero exit code.
        exit_code: i32,
        /// Rule the step ran for.
        target: Option<BuildTarget>,
    },

    /// The step returned an error or panicked.
    #[error("Failed on step {step} with an exception:\n{message}")]
    Exception {
        /// Short name of the step.
        step: String,
        /// Description of what the step was doing.
        description: String,
        /// The error or panic message.
        message: String,
        /// Rule the step ran for.
        target: Option<BuildTarget>,
    },

    /// The build was interrupted before the step could start.
    #[error("Interrupted before step {step}")]
    Interrupted {
        /// Short name of the step.
        step: String,
        /// Rule the step would have run for.
        target: Option<BuildTarget>,
    },
}

impl StepFailedError {
    /// Short name of the failed step.
    pub fn step_name(&self) -> &str {
        match self {
            StepFailedError::ExitCode { step, .. }
            | StepFailedError::Exception { step, .. }
            | StepFailedError::Interrupted { step, .. } => step,
        }
    }

    /// Rule the step belonged to, if any.
    pub fn target(&self) -> Option<&BuildTarget> {
        match self {
            StepFailedError::ExitCode { target, .. }
            | StepFailedError::Exception { target, .. }
            | StepFailedError::Interrupted { target, .. } => target.as_ref(),
        }
    }

    /// Exit code for reporting. Failures without one report `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            StepFailedError::ExitCode { exit_code, .. } => *exit_code,
            _ => 1,
        }
    }
}
