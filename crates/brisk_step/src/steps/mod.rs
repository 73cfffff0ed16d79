//! Built-in steps.

mod fs;
mod shell;

pub use fs::{MkdirStep, WriteFileStep};
pub use shell::ShellStep;
