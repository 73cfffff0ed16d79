//! End-to-end builds of small genrule graphs on a temporary project.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use brisk_cache::build_info::RULE_KEY;
use brisk_cache::{
    ArtifactCache, DirArtifactCache, FileHashCache, NoopArtifactCache, OnDiskBuildInfo,
};
use brisk_common::{BuildEvent, BuildTarget, CollectingEventSink, EventSink, NullEventSink};
use brisk_engine::{
    BuildEngine, BuildOutcome, BuildRuleSuccessType, ConcurrencyLimit, EngineError,
    EngineSettings, LoadMonitor, RuleStatus,
};
use brisk_rules::{BuildContext, BuildRule, FieldValue, Genrule, RuleGraph, StepExecution};
use brisk_step::{MkdirStep, ShellStep, Step, WriteFileStep};

struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    fn new() -> Self {
        let project = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        project.write("src/lib.txt", "hello\n");
        project
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn output_root(&self) -> PathBuf {
        self.root().join("brisk-out")
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.root().join(rel)).unwrap()
    }

    /// Names of the rules whose commands actually ran, in order.
    fn runs(&self) -> Vec<String> {
        std::fs::read_to_string(self.root().join("runs.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Removes every output and all recorded metadata.
    fn clean(&self) {
        let _ = std::fs::remove_dir_all(self.root().join("out"));
        let _ = std::fs::remove_dir_all(self.output_root());
    }

    fn cache(&self) -> Arc<dyn ArtifactCache> {
        Arc::new(DirArtifactCache::new("dir", &self.root().join("cache"), true, None).unwrap())
    }

    fn engine(&self, graph: RuleGraph, cache: Arc<dyn ArtifactCache>) -> BuildEngine {
        self.engine_with(graph, cache, EngineSettings::new(self.root(), &self.output_root()))
    }

    fn engine_with(
        &self,
        graph: RuleGraph,
        cache: Arc<dyn ArtifactCache>,
        settings: EngineSettings,
    ) -> BuildEngine {
        self.engine_full(graph, cache, Arc::new(NullEventSink), settings)
    }

    fn engine_full(
        &self,
        graph: RuleGraph,
        cache: Arc<dyn ArtifactCache>,
        events: Arc<dyn EventSink>,
        settings: EngineSettings,
    ) -> BuildEngine {
        BuildEngine::new(
            Arc::new(graph),
            Arc::new(FileHashCache::new()),
            cache,
            events,
            settings,
        )
        .unwrap()
    }
}

fn t(name: &str) -> BuildTarget {
    BuildTarget::new("app", name)
}

/// A rule that logs its name to `runs.log` before running `cmd`.
fn genrule(name: &str, cmd: &str) -> Genrule {
    Genrule::new(
        t(name),
        format!("echo {name} >> $SRCDIR/runs.log && {cmd}"),
        format!("out/{name}.txt"),
    )
}

/// `lib` copies `src/lib.txt`; `bin` upper-cases the output of `lib`.
///
/// `lib_suffix` changes `lib`'s command, and therefore its key, without
/// changing what it produces.
fn chain(lib_suffix: &str, input_based: bool, abi: bool) -> RuleGraph {
    let lib = genrule("lib", &format!("cat $SRCS > $OUT{lib_suffix}"))
        .srcs(vec![PathBuf::from("src/lib.txt")]);
    let bin = genrule("bin", "tr a-z A-Z < $SRCDIR/out/lib.txt > $OUT")
        .with_deps(vec![t("lib")])
        .input_based(input_based)
        .abi(abi);
    RuleGraph::builder()
        .with(Arc::new(lib))
        .with(Arc::new(bin))
        .build()
        .unwrap()
}

fn success_type(outcome: &BuildOutcome, name: &str) -> Option<BuildRuleSuccessType> {
    outcome.result(&t(name)).and_then(|r| r.success_type())
}

#[test]
fn builds_dependencies_first() {
    let project = Project::new();
    let engine = project.engine(chain("", false, false), Arc::new(NoopArtifactCache));
    let outcome = engine.build(&[t("bin")]).unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(success_type(&outcome, "lib"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(success_type(&outcome, "bin"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(project.read("out/bin.txt"), "HELLO\n");
    assert_eq!(project.runs(), ["lib", "bin"]);
}

#[test]
fn second_engine_reuses_outputs_on_disk() {
    let project = Project::new();
    project
        .engine(chain("", false, false), Arc::new(NoopArtifactCache))
        .build(&[t("bin")])
        .unwrap();

    let outcome = project
        .engine(chain("", false, false), Arc::new(NoopArtifactCache))
        .build(&[t("bin")])
        .unwrap();
    assert_eq!(success_type(&outcome, "lib"), Some(BuildRuleSuccessType::MatchingRuleKey));
    assert_eq!(success_type(&outcome, "bin"), Some(BuildRuleSuccessType::MatchingRuleKey));
    assert_eq!(project.runs(), ["lib", "bin"]);
}

#[test]
fn source_change_rebuilds_the_chain() {
    let project = Project::new();
    project
        .engine(chain("", false, false), Arc::new(NoopArtifactCache))
        .build(&[t("bin")])
        .unwrap();

    project.write("src/lib.txt", "changed\n");
    let outcome = project
        .engine(chain("", false, false), Arc::new(NoopArtifactCache))
        .build(&[t("bin")])
        .unwrap();
    assert_eq!(success_type(&outcome, "lib"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(success_type(&outcome, "bin"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(project.read("out/bin.txt"), "CHANGED\n");
}

#[test]
fn missing_outputs_are_fetched_from_cache() {
    let project = Project::new();
    let cache = project.cache();
    project
        .engine(chain("", false, false), Arc::clone(&cache))
        .build(&[t("bin")])
        .unwrap();

    project.clean();
    let outcome = project
        .engine(chain("", false, false), cache)
        .build(&[t("bin")])
        .unwrap();
    assert_eq!(success_type(&outcome, "lib"), Some(BuildRuleSuccessType::FetchedFromCache));
    assert_eq!(success_type(&outcome, "bin"), Some(BuildRuleSuccessType::FetchedFromCache));
    assert_eq!(project.read("out/bin.txt"), "HELLO\n");
    assert_eq!(project.runs(), ["lib", "bin"]);

    // The fetched metadata is enough for the next build to match on disk.
    let outcome = project
        .engine(chain("", false, false), Arc::new(NoopArtifactCache))
        .build(&[t("bin")])
        .unwrap();
    assert_eq!(success_type(&outcome, "bin"), Some(BuildRuleSuccessType::MatchingRuleKey));
}

#[test]
fn output_neutral_upstream_change_matches_input_based_key() {
    let project = Project::new();
    project
        .engine(chain("", true, false), Arc::new(NoopArtifactCache))
        .build(&[t("bin")])
        .unwrap();

    let outcome = project
        .engine(chain(" # v2", true, false), Arc::new(NoopArtifactCache))
        .build(&[t("bin")])
        .unwrap();
    assert_eq!(success_type(&outcome, "lib"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(
        success_type(&outcome, "bin"),
        Some(BuildRuleSuccessType::MatchingInputBasedRuleKey)
    );
    assert_eq!(project.runs(), ["lib", "bin", "lib"]);

    // The match recorded the new default key.
    let outcome = project
        .engine(chain(" # v2", true, false), Arc::new(NoopArtifactCache))
        .build(&[t("bin")])
        .unwrap();
    assert_eq!(success_type(&outcome, "bin"), Some(BuildRuleSuccessType::MatchingRuleKey));
}

#[test]
fn input_based_key_fetches_from_cache() {
    let project = Project::new();
    let cache = project.cache();
    project
        .engine(chain("", true, false), Arc::clone(&cache))
        .build(&[t("bin")])
        .unwrap();

    project.clean();
    let outcome = project
        .engine(chain(" # v2", true, false), cache)
        .build(&[t("bin")])
        .unwrap();
    assert_eq!(success_type(&outcome, "lib"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(
        success_type(&outcome, "bin"),
        Some(BuildRuleSuccessType::FetchedFromCacheInputBased)
    );
    assert_eq!(project.read("out/bin.txt"), "HELLO\n");
    assert_eq!(project.runs(), ["lib", "bin", "lib"]);
}

#[test]
fn unchanged_dependency_abi_skips_rebuild() {
    let project = Project::new();
    project
        .engine(chain("", false, true), Arc::new(NoopArtifactCache))
        .build(&[t("bin")])
        .unwrap();

    let outcome = project
        .engine(chain(" # v2", false, true), Arc::new(NoopArtifactCache))
        .build(&[t("bin")])
        .unwrap();
    assert_eq!(
        success_type(&outcome, "bin"),
        Some(BuildRuleSuccessType::MatchingDepsAbiAndRuleKeyNoDeps)
    );
    assert_eq!(project.runs(), ["lib", "bin", "lib"]);
}

#[test]
fn local_builds_are_uploaded_under_every_key() {
    let project = Project::new();
    let cache = project.cache();
    project
        .engine(chain("", true, false), Arc::clone(&cache))
        .build(&[t("bin")])
        .unwrap();

    // lib: default key. bin: default and input-based keys.
    let entries = std::fs::read_dir(project.root().join("cache")).unwrap().count();
    assert_eq!(entries, 3);
}

fn failing_graph() -> RuleGraph {
    RuleGraph::builder()
        .with(Arc::new(genrule("bad", "exit 3")))
        .with(Arc::new(
            genrule("after_bad", "cat $SRCDIR/out/bad.txt > $OUT").with_deps(vec![t("bad")]),
        ))
        .with(Arc::new(genrule("good", "echo ok > $OUT")))
        .build()
        .unwrap()
}

#[test]
fn keep_going_builds_independent_rules() {
    let project = Project::new();
    let settings = EngineSettings::new(project.root(), &project.output_root())
        .with_keep_going(true)
        .with_limit(ConcurrencyLimit::new(1));
    let engine = project.engine_with(failing_graph(), Arc::new(NoopArtifactCache), settings);
    let outcome = engine.build(&[t("after_bad"), t("good")]).unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(success_type(&outcome, "good"), Some(BuildRuleSuccessType::BuiltLocally));
    let bad = outcome.result(&t("bad")).unwrap();
    assert!(
        matches!(&bad.status, RuleStatus::Failed(msg) if msg.contains("exit code 3")),
        "{:?}",
        bad.status
    );
    assert!(matches!(
        outcome.result(&t("after_bad")).unwrap().status,
        RuleStatus::Skipped(_)
    ));
    assert_eq!(outcome.failures().count(), 1);
}

#[test]
fn first_failure_stops_admission_without_keep_going() {
    let project = Project::new();
    let settings = EngineSettings::new(project.root(), &project.output_root())
        .with_limit(ConcurrencyLimit::new(1));
    let engine = project.engine_with(failing_graph(), Arc::new(NoopArtifactCache), settings);
    let outcome = engine.build(&[t("bad"), t("good")]).unwrap();

    assert!(matches!(
        outcome.result(&t("good")).unwrap().status,
        RuleStatus::Skipped(_)
    ));
    assert!(!project.root().join("out/good.txt").exists());
    assert_eq!(project.runs(), ["bad"]);
}

#[test]
fn rules_run_once_per_engine() {
    let project = Project::new();
    let engine = project.engine(chain("", false, false), Arc::new(NoopArtifactCache));
    engine.build(&[t("lib")]).unwrap();
    let outcome = engine.build(&[t("bin"), t("lib")]).unwrap();

    assert_eq!(success_type(&outcome, "lib"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(success_type(&outcome, "bin"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(project.runs(), ["lib", "bin"]);
}

#[test]
fn failed_fingerprint_fails_the_rule() {
    let project = Project::new();
    let rule = genrule("broken", "cat $SRCS > $OUT").srcs(vec![PathBuf::from("src/missing.txt")]);
    let graph = RuleGraph::builder().with(Arc::new(rule)).build().unwrap();
    let outcome = project
        .engine(graph, Arc::new(NoopArtifactCache))
        .build(&[t("broken")])
        .unwrap();

    let status = &outcome.result(&t("broken")).unwrap().status;
    assert!(
        matches!(status, RuleStatus::Failed(msg) if msg.contains("src/missing.txt")),
        "{status:?}"
    );
    assert!(project.runs().is_empty());
}

#[test]
fn unknown_target_is_rejected() {
    let project = Project::new();
    let engine = project.engine(chain("", false, false), Arc::new(NoopArtifactCache));
    let err = engine.build(&[t("ghost")]).unwrap_err();
    assert!(matches!(err, EngineError::UnknownTarget(target) if target == t("ghost")));
}

#[test]
fn interrupted_engine_starts_nothing() {
    let project = Project::new();
    let engine = project.engine(chain("", false, false), Arc::new(NoopArtifactCache));
    engine.interrupt_handle().interrupt();
    let outcome = engine.build(&[t("bin")]).unwrap();

    assert!(outcome.interrupted);
    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome
        .results
        .iter()
        .all(|r| matches!(r.status, RuleStatus::Skipped(_))));
    assert!(project.runs().is_empty());
}

#[test]
fn events_frame_the_build() {
    let project = Project::new();
    let sink = Arc::new(CollectingEventSink::new());
    let engine = project.engine_full(
        chain("", false, false),
        Arc::new(NoopArtifactCache),
        sink.clone(),
        EngineSettings::new(project.root(), &project.output_root()),
    );
    engine.build(&[t("bin")]).unwrap();

    let events = sink.take_all();
    assert_eq!(
        events.first(),
        Some(&BuildEvent::BuildStarted {
            targets: vec!["//app:bin".to_string()]
        })
    );
    assert!(matches!(
        events.last(),
        Some(BuildEvent::BuildFinished { exit_code: 0, targets, .. }) if targets == &["//app:bin"]
    ));

    let finished: Vec<(String, String)> = events
        .iter()
        .filter_map(|e| match e {
            BuildEvent::RuleFinished { target, status, .. } => {
                Some((target.short_name().to_string(), status.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        finished,
        [
            ("lib".to_string(), "BUILT_LOCALLY".to_string()),
            ("bin".to_string(), "BUILT_LOCALLY".to_string()),
        ]
    );

    let started = events
        .iter()
        .filter(|e| matches!(e, BuildEvent::StepStarted(_)))
        .count();
    let step_finished = events
        .iter()
        .filter(|e| matches!(e, BuildEvent::StepFinished { .. }))
        .count();
    assert_eq!(started, step_finished);
    assert!(started >= 2);
}

#[test]
fn parallel_workers_build_independent_rules() {
    let project = Project::new();
    let mut builder = RuleGraph::builder();
    for i in 0..6 {
        builder.add(Arc::new(genrule(&format!("leaf{i}"), "sleep 0.2 && echo leaf > $OUT")));
    }
    let settings = EngineSettings::new(project.root(), &project.output_root())
        .with_limit(ConcurrencyLimit::new(6));
    let engine = project.engine_with(builder.build().unwrap(), Arc::new(NoopArtifactCache), settings);

    let targets: Vec<_> = (0..6).map(|i| t(&format!("leaf{i}"))).collect();
    let outcome = engine.build(&targets).unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.results.len(), 6);
    // Six 200ms rules on six workers take far less than their sum.
    assert!(outcome.elapsed < Duration::from_millis(1000), "{:?}", outcome.elapsed);
}

/// A `stamp` rule whose only field is `text` and whose steps are fixed.
struct StepsRule {
    target: BuildTarget,
    text: String,
    outputs: Vec<PathBuf>,
    steps: Vec<Arc<dyn Step>>,
    execution: StepExecution,
}

impl StepsRule {
    fn new(name: &str, text: &str, outputs: &[&str], steps: Vec<Arc<dyn Step>>) -> Self {
        Self {
            target: t(name),
            text: text.to_string(),
            outputs: outputs.iter().map(PathBuf::from).collect(),
            steps,
            execution: StepExecution::Sequential,
        }
    }

    fn parallel(mut self) -> Self {
        self.execution = StepExecution::Parallel;
        self
    }
}

impl BuildRule for StepsRule {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &str {
        "stamp"
    }

    fn deps(&self) -> &[BuildTarget] {
        &[]
    }

    fn fields(&self) -> Vec<(String, FieldValue)> {
        vec![("text".to_string(), FieldValue::Str(self.text.clone()))]
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.outputs.clone()
    }

    fn build_steps(&self, _context: &BuildContext) -> Vec<Arc<dyn Step>> {
        self.steps.clone()
    }

    fn step_execution(&self) -> StepExecution {
        self.execution
    }
}

/// Writes `text` to `out/<name>.txt`.
fn stamp(name: &str, text: &str) -> StepsRule {
    let out = format!("out/{name}.txt");
    let step: Arc<dyn Step> = Arc::new(WriteFileStep::new(&out, text));
    StepsRule::new(name, text, &[out.as_str()], vec![step])
}

/// Two rules that differ only in their target and output.
fn twin_stamps() -> RuleGraph {
    RuleGraph::builder()
        .with(Arc::new(stamp("a", "same")))
        .with(Arc::new(stamp("b", "same")))
        .build()
        .unwrap()
}

#[test]
fn identical_rules_keep_separate_cache_entries() {
    let project = Project::new();
    let outcome = project.engine(twin_stamps(), project.cache()).build(&[t("a")]).unwrap();
    assert_eq!(success_type(&outcome, "a"), Some(BuildRuleSuccessType::BuiltLocally));

    let outcome = project.engine(twin_stamps(), project.cache()).build(&[t("b")]).unwrap();
    assert_eq!(success_type(&outcome, "b"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(project.read("out/b.txt"), "same");

    let key = |name: &str| {
        OnDiskBuildInfo::new(project.root(), &project.output_root(), &t(name))
            .get_rule_key(RULE_KEY)
            .unwrap()
    };
    assert_ne!(key("a"), key("b"));
}

#[test]
fn cached_bundle_without_the_declared_output_is_a_miss() {
    let project = Project::new();
    let cache = project.cache();
    project
        .engine(twin_stamps(), Arc::clone(&cache))
        .build(&[t("a"), t("b")])
        .unwrap();

    // Make b's cache entry hold a's bundle.
    let key = |name: &str| {
        OnDiskBuildInfo::new(project.root(), &project.output_root(), &t(name))
            .get_rule_key(RULE_KEY)
            .unwrap()
    };
    let cache_dir = project.root().join("cache");
    std::fs::copy(
        cache_dir.join(key("a").to_string()),
        cache_dir.join(key("b").to_string()),
    )
    .unwrap();

    project.clean();
    let outcome = project.engine(twin_stamps(), cache).build(&[t("b")]).unwrap();
    assert_eq!(success_type(&outcome, "b"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(project.read("out/b.txt"), "same");
}

#[test]
fn empty_directory_output_is_fetched_from_cache() {
    let project = Project::new();
    let graph = || {
        let step: Arc<dyn Step> = Arc::new(MkdirStep::new("out/d"));
        RuleGraph::builder()
            .with(Arc::new(StepsRule::new("dir", "d", &["out/d"], vec![step])))
            .build()
            .unwrap()
    };
    let cache = project.cache();
    let outcome = project.engine(graph(), Arc::clone(&cache)).build(&[t("dir")]).unwrap();
    assert_eq!(success_type(&outcome, "dir"), Some(BuildRuleSuccessType::BuiltLocally));

    project.clean();
    let outcome = project.engine(graph(), cache).build(&[t("dir")]).unwrap();
    assert_eq!(success_type(&outcome, "dir"), Some(BuildRuleSuccessType::FetchedFromCache));
    assert!(project.root().join("out/d").is_dir());
}

/// Reports a fixed load average and counts the queries.
struct FixedLoad {
    load: f64,
    queries: Arc<AtomicUsize>,
}

impl LoadMonitor for FixedLoad {
    fn load_average(&self) -> Option<f64> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Some(self.load)
    }
}

/// Two independent rules that each log `done` after a short sleep.
fn slow_pair() -> RuleGraph {
    let mut builder = RuleGraph::builder();
    for name in ["left", "right"] {
        builder.add(Arc::new(genrule(
            name,
            "sleep 0.3 && echo done >> $SRCDIR/runs.log && echo x > $OUT",
        )));
    }
    builder.build().unwrap()
}

fn build_slow_pair(project: &Project, load: f64, queries: &Arc<AtomicUsize>) -> BuildOutcome {
    let settings = EngineSettings::new(project.root(), &project.output_root())
        .with_limit(ConcurrencyLimit::new(2).with_load_limit(1.0));
    project
        .engine_with(slow_pair(), Arc::new(NoopArtifactCache), settings)
        .with_load_monitor(Box::new(FixedLoad {
            load,
            queries: Arc::clone(queries),
        }))
        .build(&[t("left"), t("right")])
        .unwrap()
}

#[test]
fn high_load_holds_back_the_second_rule() {
    let project = Project::new();
    let queries = Arc::new(AtomicUsize::new(0));
    let outcome = build_slow_pair(&project, 8.0, &queries);

    assert!(outcome.is_success());
    assert!(queries.load(Ordering::SeqCst) > 0);
    // The second rule only starts once the first has finished.
    let runs = project.runs();
    assert_eq!(runs.len(), 4, "{runs:?}");
    assert_eq!(runs[1], "done", "{runs:?}");
    assert_eq!(runs[3], "done", "{runs:?}");
}

#[test]
fn load_below_the_limit_admits_both_rules() {
    let project = Project::new();
    let queries = Arc::new(AtomicUsize::new(0));
    let outcome = build_slow_pair(&project, 0.5, &queries);

    assert!(outcome.is_success());
    let runs = project.runs();
    assert_eq!(runs[2..], ["done", "done"], "{runs:?}");
}

#[test]
fn failing_parallel_step_fails_the_rule_without_waiting() {
    let project = Project::new();
    let steps: Vec<Arc<dyn Step>> = vec![
        Arc::new(ShellStep::new("exit 4")),
        Arc::new(ShellStep::new("sleep 5")),
    ];
    let rule = StepsRule::new("fanout", "fanout", &["out/fanout.txt"], steps).parallel();
    let graph = RuleGraph::builder().with(Arc::new(rule)).build().unwrap();
    let settings = EngineSettings::new(project.root(), &project.output_root())
        .with_limit(ConcurrencyLimit::new(2));
    let engine = project.engine_with(graph, Arc::new(NoopArtifactCache), settings);

    let started = Instant::now();
    let outcome = engine.build(&[t("fanout")]).unwrap();
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    let status = &outcome.result(&t("fanout")).unwrap().status;
    assert!(
        matches!(status, RuleStatus::Failed(msg) if msg.contains("exit code 4")),
        "{status:?}"
    );
}

#[test]
fn parallel_steps_all_run() {
    let project = Project::new();
    let steps: Vec<Arc<dyn Step>> = vec![
        Arc::new(WriteFileStep::new("out/x.txt", "x")),
        Arc::new(WriteFileStep::new("out/y.txt", "y")),
    ];
    let rule = StepsRule::new("pair", "xy", &["out/x.txt", "out/y.txt"], steps).parallel();
    let graph = RuleGraph::builder().with(Arc::new(rule)).build().unwrap();
    let settings = EngineSettings::new(project.root(), &project.output_root())
        .with_limit(ConcurrencyLimit::new(2));
    let outcome = project
        .engine_with(graph, Arc::new(NoopArtifactCache), settings)
        .build(&[t("pair")])
        .unwrap();

    assert_eq!(success_type(&outcome, "pair"), Some(BuildRuleSuccessType::BuiltLocally));
    assert_eq!(project.read("out/x.txt"), "x");
    assert_eq!(project.read("out/y.txt"), "y");
}

#[test]
fn interrupt_kills_the_running_command() {
    let project = Project::new();
    let graph = |cmd: &str| {
        RuleGraph::builder()
            .with(Arc::new(genrule("slow", cmd)))
            .build()
            .unwrap()
    };
    project
        .engine(graph("echo v1 > $OUT"), Arc::new(NoopArtifactCache))
        .build(&[t("slow")])
        .unwrap();
    let info = OnDiskBuildInfo::new(project.root(), &project.output_root(), &t("slow"));
    assert!(info.get_rule_key(RULE_KEY).is_some());

    let engine = project.engine(graph("sleep 30 && echo v2 > $OUT"), Arc::new(NoopArtifactCache));
    let handle = engine.interrupt_handle();
    let interrupter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        handle.interrupt();
    });

    let started = Instant::now();
    let outcome = engine.build(&[t("slow")]).unwrap();
    interrupter.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
    assert!(outcome.interrupted);
    assert!(matches!(
        outcome.result(&t("slow")).unwrap().status,
        RuleStatus::Failed(_)
    ));
    // The stale key from the first build is gone, so nothing matches next time.
    assert_eq!(info.get_rule_key(RULE_KEY), None);
}
