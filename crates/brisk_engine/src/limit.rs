//! Bounds on how much work runs at once.

use std::path::{Path, PathBuf};

use tracing::debug;

/// The number of rule workers and the system load above which new rules
/// are held back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcurrencyLimit {
    /// Maximum rules executing at once. Also sizes the step pool.
    pub threads: usize,
    /// One-minute load average above which no new rule is admitted.
    pub load_limit: f64,
}

impl ConcurrencyLimit {
    /// A limit of `threads` workers and no load ceiling.
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            load_limit: f64::INFINITY,
        }
    }

    /// Sets the load ceiling.
    pub fn with_load_limit(mut self, load_limit: f64) -> Self {
        self.load_limit = load_limit;
        self
    }
}

impl Default for ConcurrencyLimit {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Reports the current system load.
pub trait LoadMonitor: Send + Sync {
    /// The one-minute load average, or `None` if unknown.
    fn load_average(&self) -> Option<f64>;
}

/// Reads the load average from a `/proc/loadavg`-formatted file.
#[derive(Debug, Clone)]
pub struct ProcLoadAvg {
    path: PathBuf,
}

impl ProcLoadAvg {
    /// Reads the system's `/proc/loadavg`.
    pub fn new() -> Self {
        Self::at(Path::new("/proc/loadavg"))
    }

    /// Reads a file at `path` instead.
    pub fn at(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl Default for ProcLoadAvg {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadMonitor for ProcLoadAvg {
    fn load_average(&self) -> Option<f64> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        content.split_whitespace().next()?.parse().ok()
    }
}

/// Decides whether one more rule may start.
///
/// Work is deferred only while the load exceeds the ceiling and something
/// else is still running; an idle build always admits one rule so it cannot
/// stall on a busy machine. Unknown load never defers.
pub(crate) fn admits(limit: &ConcurrencyLimit, monitor: &dyn LoadMonitor, in_flight: usize) -> bool {
    if in_flight >= limit.threads {
        return false;
    }
    if in_flight == 0 || !limit.load_limit.is_finite() {
        return true;
    }
    match monitor.load_average() {
        Some(load) if load > limit.load_limit => {
            debug!(load, limit = limit.load_limit, in_flight, "deferring rule: load too high");
            false
        }
        _ => true,
    }
}
