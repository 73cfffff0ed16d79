//! Running a shell command as a step.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::step::Step;

/// How often a running command checks the interrupt flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs `sh -c <command>` from the project root (or a subdirectory of it).
///
/// Output is captured and logged; on failure stderr is logged at warn level.
/// The child is killed if the build is interrupted while it runs.
#[derive(Debug, Clone)]
pub struct ShellStep {
    command: String,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ShellStep {
    /// Creates a step running `command` from the project root.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Runs from `dir`, relative to the project root.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The command line passed to the shell.
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Step for ShellStep {
    fn short_name(&self) -> &str {
        "sh"
    }

    fn description(&self, _context: &ExecutionContext) -> String {
        self.command.clone()
    }

    fn execute(&self, context: &ExecutionContext) -> Result<i32, StepError> {
        let cwd = match &self.working_dir {
            Some(dir) => context.resolve(dir),
            None => context.project_root().to_path_buf(),
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        debug!(command = %self.command, cwd = %cwd.display(), "spawning shell step");
        let mut child = cmd.spawn()?;

        let stdout = child.stdout.take().ok_or("stdout was not piped")?;
        let stderr = child.stderr.take().ok_or("stderr was not piped")?;
        let stdout_handle = thread::spawn(move || drain(stdout));
        let stderr_handle = thread::spawn(move || drain(stderr));

        let status = loop {
            if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
                break status;
            }
            if context.is_interrupted() {
                warn!(command = %self.command, "build interrupted, killing command");
                child.kill()?;
                child.wait()?;
                return Err("interrupted".into());
            }
        };

        let out = stdout_handle.join().unwrap_or_default();
        let err = stderr_handle.join().unwrap_or_default();
        if !out.is_empty() {
            debug!(command = %self.command, stdout = %String::from_utf8_lossy(&out).trim_end());
        }

        let code = status.code().unwrap_or(-1);
        if code != 0 && !err.is_empty() {
            warn!(
                command = %self.command,
                exit_code = code,
                stderr = %String::from_utf8_lossy(&err).trim_end()
            );
        }
        Ok(code)
    }
}

fn drain(mut stream: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    // A read error just truncates the captured output.
    let _ = stream.read_to_end(&mut buf);
    buf
}
