//! The generic shell command rule.

use std::path::PathBuf;
use std::sync::Arc;

use brisk_cache::BuildInfoRecorder;
use brisk_common::BuildTarget;
use brisk_step::{MkdirStep, ShellStep, Step};

use crate::field::FieldValue;
use crate::rule::{BuildContext, BuildRule};

/// Runs a shell command that turns its sources into a single output.
///
/// The command runs from the project root with these variables set:
///
/// - `OUT`: absolute path of the output file
/// - `SRCS`: space-separated absolute paths of the sources
/// - `SRCDIR`: the project root
#[derive(Debug, Clone)]
pub struct Genrule {
    target: BuildTarget,
    cmd: String,
    srcs: Vec<PathBuf>,
    out: PathBuf,
    deps: Vec<BuildTarget>,
    input_based: bool,
    abi: bool,
}

impl Genrule {
    /// Creates a rule producing `out` (relative to the project root) by
    /// running `cmd`.
    pub fn new(target: BuildTarget, cmd: impl Into<String>, out: impl Into<PathBuf>) -> Self {
        Self {
            target,
            cmd: cmd.into(),
            srcs: Vec::new(),
            out: out.into(),
            deps: Vec::new(),
            input_based: false,
            abi: false,
        }
    }

    /// Sets the source files, relative to the project root.
    pub fn srcs(mut self, srcs: Vec<PathBuf>) -> Self {
        self.srcs = srcs;
        self
    }

    /// Sets the rules that must be built first.
    pub fn with_deps(mut self, deps: Vec<BuildTarget>) -> Self {
        self.deps = deps;
        self
    }

    /// Allows reuse when only the content of dependency outputs matters.
    pub fn input_based(mut self, enabled: bool) -> Self {
        self.input_based = enabled;
        self
    }

    /// Allows reuse when dependency outputs and own fields are unchanged.
    pub fn abi(mut self, enabled: bool) -> Self {
        self.abi = enabled;
        self
    }

    /// The command line.
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// The output, relative to the project root.
    pub fn out(&self) -> &PathBuf {
        &self.out
    }
}

impl BuildRule for Genrule {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &str {
        "genrule"
    }

    fn deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    fn fields(&self) -> Vec<(String, FieldValue)> {
        vec![
            ("cmd".to_string(), FieldValue::Str(self.cmd.clone())),
            (
                "srcs".to_string(),
                FieldValue::List(self.srcs.iter().cloned().map(FieldValue::Path).collect()),
            ),
            (
                "out".to_string(),
                FieldValue::Str(self.out.to_string_lossy().into_owned()),
            ),
        ]
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.out.clone()]
    }

    fn build_steps(&self, context: &BuildContext) -> Vec<Arc<dyn Step>> {
        let root = context.project_root();
        let srcs = self
            .srcs
            .iter()
            .map(|src| root.join(src).to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        let shell = ShellStep::new(self.cmd.clone())
            .env("OUT", root.join(&self.out).to_string_lossy())
            .env("SRCS", srcs)
            .env("SRCDIR", root.to_string_lossy());

        let mut steps: Vec<Arc<dyn Step>> = Vec::with_capacity(2);
        if let Some(parent) = self.out.parent().filter(|p| !p.as_os_str().is_empty()) {
            steps.push(Arc::new(MkdirStep::new(parent)));
        }
        steps.push(Arc::new(shell));
        steps
    }

    fn supports_input_based_rule_key(&self) -> bool {
        self.input_based
    }

    fn supports_abi_key(&self) -> bool {
        self.abi
    }

    fn record_metadata(&self, recorder: &mut BuildInfoRecorder) {
        recorder.add_metadata("GENRULE_CMD", self.cmd.as_str());
    }
}
