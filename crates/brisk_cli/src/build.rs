//! `brisk build`: builds the requested targets and reports the outcome.

use std::path::Path;
use std::sync::Arc;

use brisk_cache::FileHashCache;
use brisk_common::{BuildTarget, EventSink, NullEventSink};
use brisk_config::SettingsOverrides;
use brisk_engine::{
    BuildEngine, BuildReport, ConcurrencyLimit, EngineSettings, RuleStatus,
};
use brisk_rules::RuleGraph;
use tracing::{info, warn};

use crate::console::ConsoleEventSink;
use crate::project::{load_settings, open_cache, resolve_project_root};
use crate::rules_file::load_rules;
use crate::{BuildArgs, GlobalArgs};

/// Runs the `brisk build` command.
///
/// Returns exit code 0 when every rule succeeded and 1 otherwise.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_root = resolve_project_root(global)?;
    let overrides = SettingsOverrides {
        threads: args.threads.clone(),
        load_limit: args.load_limit.clone(),
        keep_going: args.keep_going,
        report: match &args.build_report {
            Some(path) => Some(std::env::current_dir()?.join(path)),
            None => None,
        },
    };
    let settings = load_settings(global, &project_root, &overrides)?;
    let graph = Arc::new(load_rules(&project_root, &settings.output_root)?);

    let targets = select_targets(&graph, &args.targets)?;
    if targets.is_empty() {
        if !global.quiet {
            eprintln!("nothing to build");
        }
        return Ok(0);
    }

    let cache = open_cache(&settings.cache)?;
    let events: Arc<dyn EventSink> = if global.quiet {
        Arc::new(NullEventSink)
    } else {
        Arc::new(ConsoleEventSink)
    };
    let engine_settings = EngineSettings::new(&project_root, &settings.output_root)
        .with_limit(ConcurrencyLimit::new(settings.threads).with_load_limit(settings.load_limit))
        .with_keep_going(settings.keep_going);
    info!(
        threads = settings.threads,
        load_limit = settings.load_limit,
        keep_going = settings.keep_going,
        "starting build"
    );

    let engine = BuildEngine::new(
        graph,
        Arc::new(FileHashCache::new()),
        Arc::clone(&cache),
        events,
        engine_settings,
    )?;
    let outcome = engine.build(&targets);
    if let Err(e) = cache.close() {
        warn!(cache = cache.name(), error = %e, "failed to close artifact cache");
    }
    let outcome = outcome?;

    for result in &outcome.results {
        if let RuleStatus::Failed(message) = &result.status {
            eprintln!("error: {} failed\n{message}", result.target);
        }
    }
    if outcome.interrupted {
        eprintln!("error: build interrupted");
    }

    if let Some(path) = &settings.report {
        write_report(&BuildReport::from_outcome(&outcome), path)?;
    }

    Ok(outcome.exit_code())
}

/// Parses the requested targets; none means every declared target.
fn select_targets(
    graph: &RuleGraph,
    requested: &[String],
) -> Result<Vec<BuildTarget>, Box<dyn std::error::Error>> {
    if requested.is_empty() {
        return Ok(graph.targets().into_iter().cloned().collect());
    }
    requested
        .iter()
        .map(|t| t.parse::<BuildTarget>().map_err(Into::into))
        .collect()
}

fn write_report(report: &BuildReport, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    report.write_to(path)?;
    info!(path = %path.display(), "wrote build report");
    Ok(())
}
