//! The environment a step executes in.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use brisk_common::{EventSink, NullEventSink};

/// Shared state handed to every step.
///
/// Cloning is cheap; clones share the interrupt flag and event sink.
#[derive(Clone)]
pub struct ExecutionContext {
    project_root: PathBuf,
    interrupt: Arc<AtomicBool>,
    events: Arc<dyn EventSink>,
}

impl ExecutionContext {
    /// Creates a context rooted at `project_root` that posts to `events`.
    pub fn new(project_root: &Path, events: Arc<dyn EventSink>) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            interrupt: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Creates a context that discards events. Mostly useful in tests.
    pub fn detached(project_root: &Path) -> Self {
        Self::new(project_root, Arc::new(NullEventSink))
    }

    /// Replaces the interrupt flag with one shared with the caller.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// Directory that relative step paths are resolved against.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolves `path` against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.project_root.join(path)
    }

    /// Where step events go.
    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    /// The shared interrupt flag.
    pub fn interrupt_flag(&self) -> &Arc<AtomicBool> {
        &self.interrupt
    }

    /// Asks running steps to stop and prevents new ones from starting.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`interrupt`](Self::interrupt) has been called.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("project_root", &self.project_root)
            .field("interrupted", &self.is_interrupted())
            .finish_non_exhaustive()
    }
}
