//! Execution of build steps.
//!
//! A rule builds by running an ordered list of [`Step`]s. The [`StepRunner`]
//! executes them on the caller's thread or in parallel on a rayon pool,
//! reports start and finish events, and converts non-zero exit codes,
//! returned errors and panics alike into a [`StepFailedError`].

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod runner;
pub mod step;
pub mod steps;

pub use context::ExecutionContext;
pub use error::{StepError, StepFailedError};
pub use runner::{NoopCallback, StepRunner, StepRunningCallback, NOOP_CALLBACK};
pub use step::Step;
pub use steps::{MkdirStep, ShellStep, WriteFileStep};
