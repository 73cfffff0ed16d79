//! The build engine.
//!
//! Builds the transitive closure of the requested targets. A single
//! coordinating thread tracks how many unfinished dependencies each rule
//! has and feeds rules whose dependencies all succeeded to a fixed set of
//! scoped worker threads through a job channel. Workers send terminal
//! states back on a result channel, which unblocks dependents.
//!
//! On a worker, each rule walks the reuse ladder: matching on-disk key,
//! cache fetch by default key, matching ABI keys, input-based match or
//! fetch, and finally a local build. The resulting
//! [`BuildRuleSuccessType`] alone decides what gets uploaded and how the
//! on-disk metadata is rewritten.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use brisk_cache::build_info::{
    ABI_KEY_FOR_DEPS, INPUT_BASED_RULE_KEY, OUTPUT_HASH, RECORDED_PATHS, RULE_KEY,
    RULE_KEY_NO_DEPS,
};
use brisk_cache::{
    ArtifactBundle, ArtifactCache, BuildInfoRecorder, CacheError, CacheResult, FileHashSource,
    OnDiskBuildInfo,
};
use brisk_common::{BuildEvent, BuildTarget, EventSink, RuleKey};
use brisk_rules::{
    BuildContext, BuildRule, KeyKind, RuleGraph, RuleId, RuleKeyFactory, StepExecution,
};
use brisk_step::{ExecutionContext, StepRunner, NOOP_CALLBACK};
use tracing::{debug, info, warn};

use crate::error::{EngineError, RuleError};
use crate::limit::{admits, ConcurrencyLimit, LoadMonitor, ProcLoadAvg};
use crate::result::{BuildOutcome, BuildResult, RuleStatus};
use crate::success::BuildRuleSuccessType;

/// How often a deferred scheduler re-checks the system load.
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where and how a build runs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Root of the source tree. Rule inputs and outputs are relative to it.
    pub project_root: PathBuf,
    /// Directory for metadata and scratch files.
    pub output_root: PathBuf,
    /// Worker count and load ceiling.
    pub limit: ConcurrencyLimit,
    /// Keep building independent rules after a failure.
    pub keep_going: bool,
}

impl EngineSettings {
    /// Settings with one worker, no load ceiling and no keep-going.
    pub fn new(project_root: &Path, output_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            limit: ConcurrencyLimit::default(),
            keep_going: false,
        }
    }

    /// Sets the concurrency limit.
    pub fn with_limit(mut self, limit: ConcurrencyLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Sets keep-going.
    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }
}

/// Stops a running build from another thread.
///
/// After [`interrupt`](Self::interrupt) no new rule is admitted, running
/// steps see the flag, and shell commands are killed.
#[derive(Debug, Clone)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    /// Requests the build to stop.
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once an interrupt was requested.
    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The keys computed for one rule while deciding what to do with it.
struct RuleKeys {
    default: RuleKey,
    input_based: Option<RuleKey>,
}

/// Executes rules of one graph, at most once each.
pub struct BuildEngine {
    graph: Arc<RuleGraph>,
    keys: RuleKeyFactory,
    files: Arc<dyn FileHashSource>,
    cache: Arc<dyn ArtifactCache>,
    events: Arc<dyn EventSink>,
    settings: EngineSettings,
    load: Box<dyn LoadMonitor>,
    step_pool: rayon::ThreadPool,
    interrupt: Arc<AtomicBool>,
    finished: Mutex<HashMap<RuleId, RuleStatus>>,
    build_lock: Mutex<()>,
}

impl BuildEngine {
    /// Creates an engine over `graph`.
    pub fn new(
        graph: Arc<RuleGraph>,
        files: Arc<dyn FileHashSource>,
        cache: Arc<dyn ArtifactCache>,
        events: Arc<dyn EventSink>,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        let step_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.limit.threads)
            .thread_name(|i| format!("brisk-step-{i}"))
            .build()
            .map_err(|e| EngineError::ThreadPool(e.to_string()))?;
        let keys = RuleKeyFactory::new(
            Arc::clone(&graph),
            Arc::clone(&files),
            &settings.project_root,
        );
        Ok(Self {
            graph,
            keys,
            files,
            cache,
            events,
            settings,
            load: Box::new(ProcLoadAvg::new()),
            step_pool,
            interrupt: Arc::new(AtomicBool::new(false)),
            finished: Mutex::new(HashMap::new()),
            build_lock: Mutex::new(()),
        })
    }

    /// Replaces the system load source.
    pub fn with_load_monitor(mut self, monitor: Box<dyn LoadMonitor>) -> Self {
        self.load = monitor;
        self
    }

    /// A handle that interrupts this engine's builds.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.interrupt))
    }

    /// The graph being built.
    pub fn graph(&self) -> &Arc<RuleGraph> {
        &self.graph
    }

    /// The key factory shared by all builds of this engine.
    pub fn key_factory(&self) -> &RuleKeyFactory {
        &self.keys
    }

    /// The engine's settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Builds `targets` and everything they depend on.
    ///
    /// Rules that reached a terminal state in an earlier call are not run
    /// again; their earlier result is reported. Concurrent calls are
    /// serialized.
    pub fn build(&self, targets: &[BuildTarget]) -> Result<BuildOutcome, EngineError> {
        let roots = targets
            .iter()
            .map(|t| {
                self.graph
                    .id_of(t)
                    .ok_or_else(|| EngineError::UnknownTarget(t.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let names: Vec<String> = targets.iter().map(ToString::to_string).collect();
        self.events.post(BuildEvent::BuildStarted {
            targets: names.clone(),
        });
        let start = Instant::now();

        let order = self.graph.transitive_closure(&roots);
        info!(
            rules = order.len(),
            threads = self.settings.limit.threads,
            keep_going = self.settings.keep_going,
            "starting build"
        );
        let mut statuses = self.schedule(&order);

        let results = order
            .iter()
            .map(|&id| {
                let rule = self.graph.rule(id);
                let status = statuses
                    .remove(&id)
                    .unwrap_or_else(|| RuleStatus::Skipped("build stopped".to_string()));
                BuildResult {
                    target: rule.target().clone(),
                    status,
                    outputs: rule.outputs(),
                }
            })
            .collect();
        let outcome = BuildOutcome {
            requested: targets.to_vec(),
            results,
            elapsed: start.elapsed(),
            interrupted: self.interrupt.load(Ordering::SeqCst),
        };

        info!(
            success = outcome.is_success(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "build finished"
        );
        self.events.post(BuildEvent::BuildFinished {
            targets: names,
            exit_code: outcome.exit_code(),
            elapsed: outcome.elapsed,
        });
        Ok(outcome)
    }

    /// Runs `order` (dependencies first) to completion.
    fn schedule(&self, order: &[RuleId]) -> HashMap<RuleId, RuleStatus> {
        let mut state = ScheduleState::new(&self.graph, order);
        let workers = self.settings.limit.threads.min(order.len()).max(1);

        let (job_tx, job_rx) = mpsc::channel::<RuleId>();
        let (result_tx, result_rx) = mpsc::channel::<(RuleId, RuleStatus)>();
        let job_rx = Mutex::new(job_rx);
        let job_rx = &job_rx;

        thread::scope(|s| {
            for _ in 0..workers {
                let tx = result_tx.clone();
                s.spawn(move || loop {
                    let job = match job_rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    let Ok(id) = job else { break };
                    let status = panic::catch_unwind(AssertUnwindSafe(|| self.process(id)))
                        .unwrap_or_else(|_| RuleStatus::Failed("rule panicked".to_string()));
                    if tx.send((id, status)).is_err() {
                        break;
                    }
                });
            }
            drop(result_tx);

            let mut in_flight = 0usize;
            while !state.is_done() {
                while let Some(&id) = state.ready.front() {
                    if let Some(status) = self.settle_without_running(id, &state) {
                        state.ready.pop_front();
                        state.complete(&self.graph, id, status, self.settings.keep_going);
                        continue;
                    }
                    if !admits(&self.settings.limit, self.load.as_ref(), in_flight) {
                        break;
                    }
                    state.ready.pop_front();
                    if job_tx.send(id).is_err() {
                        break;
                    }
                    in_flight += 1;
                }
                if state.is_done() || in_flight == 0 {
                    break;
                }

                let received = if state.ready.is_empty() {
                    result_rx.recv().ok()
                } else {
                    match result_rx.recv_timeout(LOAD_POLL_INTERVAL) {
                        Ok(result) => Some(result),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => None,
                    }
                };
                let Some((id, status)) = received else { break };
                in_flight -= 1;
                state.complete(&self.graph, id, status, self.settings.keep_going);
            }
            // Closing the job channel lets idle workers exit.
            drop(job_tx);
        });

        state.statuses
    }

    /// Resolves a ready rule that must not, or need not, be run.
    fn settle_without_running(&self, id: RuleId, state: &ScheduleState) -> Option<RuleStatus> {
        if let Some(status) = self.remembered(id) {
            return Some(status);
        }
        if let Some(dep) = state.blocked_by.get(&id) {
            return Some(RuleStatus::Skipped(format!("dependency {dep} did not succeed")));
        }
        if state.halted || self.interrupt.load(Ordering::SeqCst) {
            return Some(RuleStatus::Skipped(
                "build stopped before this rule started".to_string(),
            ));
        }
        None
    }

    fn remembered(&self, id: RuleId) -> Option<RuleStatus> {
        let finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        finished.get(&id).cloned()
    }

    /// Runs one rule on a worker thread.
    fn process(&self, id: RuleId) -> RuleStatus {
        let rule = self.graph.rule(id);
        let target = rule.target();
        self.events.post(BuildEvent::RuleStarted {
            target: target.clone(),
        });

        let status = match self.build_rule(id, rule.as_ref()) {
            Ok(success) => {
                debug!(rule = %target, %success, "rule succeeded");
                RuleStatus::Success(success)
            }
            Err(e) => {
                warn!(rule = %target, error = %e, "rule failed");
                RuleStatus::Failed(e.to_string())
            }
        };

        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, status.clone());
        self.events.post(BuildEvent::RuleFinished {
            target: target.clone(),
            success: status.is_success(),
            status: status.label().to_string(),
        });
        status
    }

    fn build_rule(
        &self,
        id: RuleId,
        rule: &dyn BuildRule,
    ) -> Result<BuildRuleSuccessType, RuleError> {
        let info = OnDiskBuildInfo::new(
            &self.settings.project_root,
            &self.settings.output_root,
            rule.target(),
        );
        let mut keys = RuleKeys {
            default: self.keys.rule_key(id, KeyKind::Default)?,
            input_based: None,
        };
        let success = self.decide(id, rule, &info, &mut keys)?;
        self.finalize(id, rule, &info, success, &keys)?;
        Ok(success)
    }

    /// Walks the reuse ladder, building locally only as the last resort.
    fn decide(
        &self,
        id: RuleId,
        rule: &dyn BuildRule,
        info: &OnDiskBuildInfo,
        keys: &mut RuleKeys,
    ) -> Result<BuildRuleSuccessType, RuleError> {
        let target = rule.target();

        if info.get_rule_key(RULE_KEY) == Some(keys.default) && self.outputs_exist(rule) {
            return Ok(BuildRuleSuccessType::MatchingRuleKey);
        }

        if self.try_fetch(rule, &keys.default) {
            return Ok(BuildRuleSuccessType::FetchedFromCache);
        }

        if rule.supports_abi_key() {
            let no_deps = self.keys.rule_key(id, KeyKind::NoDeps)?;
            let deps_abi = self.keys.rule_key(id, KeyKind::DepsAbi)?;
            if info.get_rule_key(RULE_KEY_NO_DEPS) == Some(no_deps)
                && info.get_rule_key(ABI_KEY_FOR_DEPS) == Some(deps_abi)
                && self.outputs_exist(rule)
            {
                return Ok(BuildRuleSuccessType::MatchingDepsAbiAndRuleKeyNoDeps);
            }
        }

        if rule.supports_input_based_rule_key() {
            let input_based = self.keys.rule_key(id, KeyKind::InputBased)?;
            keys.input_based = Some(input_based);
            if info.get_rule_key(INPUT_BASED_RULE_KEY) == Some(input_based)
                && self.outputs_exist(rule)
            {
                return Ok(BuildRuleSuccessType::MatchingInputBasedRuleKey);
            }
            if self.try_fetch(rule, &input_based) {
                return Ok(BuildRuleSuccessType::FetchedFromCacheInputBased);
            }
        }

        debug!(rule = %target, key = %keys.default, "building locally");
        self.build_locally(rule, info)?;
        Ok(BuildRuleSuccessType::BuiltLocally)
    }

    fn build_locally(&self, rule: &dyn BuildRule, info: &OnDiskBuildInfo) -> Result<(), RuleError> {
        let target = rule.target();
        // A failed build must not leave a key that matches next time.
        info.delete_existing_metadata()
            .map_err(|e| RuleError::metadata(target, e))?;

        let context = BuildContext::new(&self.settings.project_root, &self.settings.output_root);
        let steps = rule.build_steps(&context);
        let runner = StepRunner::new(
            ExecutionContext::new(&self.settings.project_root, Arc::clone(&self.events))
                .with_interrupt_flag(Arc::clone(&self.interrupt)),
        );
        match rule.step_execution() {
            StepExecution::Sequential => runner.run_steps(&steps, Some(target), &NOOP_CALLBACK)?,
            StepExecution::Parallel => runner.run_steps_in_parallel_and_wait(
                &steps,
                Some(target),
                &self.step_pool,
                &NOOP_CALLBACK,
            )?,
        }
        Ok(())
    }

    /// Records metadata and uploads artifacts as the success type dictates.
    fn finalize(
        &self,
        id: RuleId,
        rule: &dyn BuildRule,
        info: &OnDiskBuildInfo,
        success: BuildRuleSuccessType,
        keys: &RuleKeys,
    ) -> Result<(), RuleError> {
        let target = rule.target();
        let props = success.properties();

        if props.outputs_have_changed {
            for output in rule.outputs() {
                self.files.invalidate(&self.settings.project_root.join(output));
            }
        }

        let mut recorder = BuildInfoRecorder::new(&self.settings.output_root, target);
        if props.should_clear_and_write_metadata {
            recorder.add_metadata(RULE_KEY, keys.default.to_string());
            if let Some(input_based) = keys.input_based {
                recorder.add_metadata(INPUT_BASED_RULE_KEY, input_based.to_string());
            }
            if rule.supports_abi_key() {
                let no_deps = self.keys.rule_key(id, KeyKind::NoDeps)?;
                let deps_abi = self.keys.rule_key(id, KeyKind::DepsAbi)?;
                recorder.add_metadata(RULE_KEY_NO_DEPS, no_deps.to_string());
                recorder.add_metadata(ABI_KEY_FOR_DEPS, deps_abi.to_string());
            }
            let output_hash = self.keys.output_hash(id)?;
            recorder.add_metadata(OUTPUT_HASH, output_hash.to_string());
            let recorded: Vec<String> = rule
                .outputs()
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            recorder.add_metadata_list(RECORDED_PATHS, &recorded);
            rule.record_metadata(&mut recorder);
            recorder
                .write_metadata_to_disk(true)
                .map_err(|e| RuleError::metadata(target, e))?;
        } else if props.should_update_metadata {
            // The default key now describes these outputs too.
            recorder.add_metadata(RULE_KEY, keys.default.to_string());
            if let Some(input_based) = keys.input_based {
                recorder.add_metadata(INPUT_BASED_RULE_KEY, input_based.to_string());
            }
            recorder
                .write_metadata_to_disk(false)
                .map_err(|e| RuleError::metadata(target, e))?;
        }

        if props.should_upload_artifact && self.cache.is_store_supported() {
            let mut upload = vec![keys.default];
            if props.should_upload_input_based_artifact {
                upload.extend(keys.input_based);
            }
            if let Err(e) = self.upload(rule, info, &upload) {
                warn!(rule = %target, cache = self.cache.name(), error = %e, "failed to store artifact");
            }
        }
        Ok(())
    }

    fn upload(
        &self,
        rule: &dyn BuildRule,
        info: &OnDiskBuildInfo,
        keys: &[RuleKey],
    ) -> Result<(), CacheError> {
        let bundle = ArtifactBundle::pack(&self.settings.project_root, &rule.outputs())?
            .with_metadata(info.get_all());
        let path = self.scratch_path(rule.target(), "upload");
        bundle.write_to(&path)?;
        let stored = self.cache.store(keys, &path);
        let _ = std::fs::remove_file(&path);
        if stored.is_ok() {
            debug!(rule = %rule.target(), keys = keys.len(), entries = bundle.len(), "stored artifact");
        }
        stored
    }

    /// Fetches and unpacks the artifact stored under `key`. Any failure is
    /// logged and treated as a miss.
    fn try_fetch(&self, rule: &dyn BuildRule, key: &RuleKey) -> bool {
        let target = rule.target();
        let dest = self.scratch_path(target, &format!("fetch-{key}"));
        let fetched = match self.cache.fetch(key, &dest) {
            CacheResult::Hit(path) => {
                let unpacked = self.unpack(rule, &path);
                let _ = std::fs::remove_file(&path);
                match unpacked {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(rule = %target, %key, error = %e, "discarding unusable cached artifact");
                        false
                    }
                }
            }
            CacheResult::Miss => false,
            CacheResult::Error(reason) => {
                warn!(rule = %target, %key, cache = self.cache.name(), %reason, "cache fetch failed");
                false
            }
        };
        debug!(rule = %target, %key, fetched, "cache lookup");
        fetched
    }

    fn unpack(&self, rule: &dyn BuildRule, bundle_path: &Path) -> Result<(), CacheError> {
        let bundle = ArtifactBundle::read_from(bundle_path)?;
        let outputs = rule.outputs();
        for output in &outputs {
            remove_path(&self.settings.project_root.join(output))?;
        }
        bundle.unpack(&self.settings.project_root)?;
        if let Some(missing) = outputs
            .into_iter()
            .find(|output| !self.settings.project_root.join(output).exists())
        {
            return Err(CacheError::IncompleteArtifact { path: missing });
        }

        let mut recorder = BuildInfoRecorder::new(&self.settings.output_root, rule.target());
        recorder.add_all(bundle.metadata());
        recorder.write_metadata_to_disk(true)
    }

    fn outputs_exist(&self, rule: &dyn BuildRule) -> bool {
        rule.outputs()
            .iter()
            .all(|output| self.settings.project_root.join(output).exists())
    }

    /// A per-rule scratch file under the output root. Only the worker
    /// running the rule touches it.
    fn scratch_path(&self, target: &BuildTarget, name: &str) -> PathBuf {
        self.settings
            .output_root
            .join("tmp")
            .join(target.scratch_dir())
            .join(name)
    }
}

fn remove_path(path: &Path) -> Result<(), CacheError> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Book-keeping of the coordinating thread.
struct ScheduleState {
    total: usize,
    pending_deps: HashMap<RuleId, usize>,
    ready: VecDeque<RuleId>,
    /// Rules that can no longer run, and the dependency that stopped them.
    blocked_by: HashMap<RuleId, BuildTarget>,
    statuses: HashMap<RuleId, RuleStatus>,
    halted: bool,
}

impl ScheduleState {
    fn new(graph: &RuleGraph, order: &[RuleId]) -> Self {
        let pending_deps: HashMap<RuleId, usize> = order
            .iter()
            .map(|&id| (id, graph.deps(id).len()))
            .collect();
        let ready = order
            .iter()
            .copied()
            .filter(|id| pending_deps[id] == 0)
            .collect();
        Self {
            total: order.len(),
            pending_deps,
            ready,
            blocked_by: HashMap::new(),
            statuses: HashMap::with_capacity(order.len()),
            halted: false,
        }
    }

    fn is_done(&self) -> bool {
        self.statuses.len() == self.total
    }

    fn complete(&mut self, graph: &RuleGraph, id: RuleId, status: RuleStatus, keep_going: bool) {
        let target = graph.rule(id).target();
        if !status.is_success() {
            if matches!(status, RuleStatus::Failed(_)) && !keep_going {
                self.halted = true;
            }
            for &dependent in graph.dependents(id) {
                self.blocked_by
                    .entry(dependent)
                    .or_insert_with(|| target.clone());
            }
        }
        for &dependent in graph.dependents(id) {
            if let Some(pending) = self.pending_deps.get_mut(&dependent) {
                *pending -= 1;
                if *pending == 0 {
                    self.ready.push_back(dependent);
                }
            }
        }
        self.statuses.insert(id, status);
    }
}
