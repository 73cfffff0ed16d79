//! File system steps.

use std::path::{Path, PathBuf};

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::step::Step;

/// Creates a directory (and its parents) relative to the project root.
#[derive(Debug, Clone)]
pub struct MkdirStep {
    path: PathBuf,
}

impl MkdirStep {
    /// Creates a step for `path`, relative to the project root.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Step for MkdirStep {
    fn short_name(&self) -> &str {
        "mkdir"
    }

    fn description(&self, _context: &ExecutionContext) -> String {
        format!("mkdir -p {}", self.path.display())
    }

    fn execute(&self, context: &ExecutionContext) -> Result<i32, StepError> {
        std::fs::create_dir_all(context.resolve(&self.path))?;
        Ok(0)
    }
}

/// Writes fixed contents to a file relative to the project root.
#[derive(Debug, Clone)]
pub struct WriteFileStep {
    path: PathBuf,
    contents: String,
    executable: bool,
}

impl WriteFileStep {
    /// Creates a step writing `contents` to `path`.
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            executable: false,
        }
    }

    /// Marks the written file executable (Unix only).
    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }
}

impl Step for WriteFileStep {
    fn short_name(&self) -> &str {
        "write_file"
    }

    fn description(&self, _context: &ExecutionContext) -> String {
        format!("write {}", self.path.display())
    }

    fn execute(&self, context: &ExecutionContext) -> Result<i32, StepError> {
        let path = context.resolve(&self.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &self.contents)?;
        if self.executable {
            make_executable(&path)?;
        }
        Ok(0)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
