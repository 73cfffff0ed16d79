//! Brisk CLI: the command-line front end of the incremental build core.
//!
//! Provides `brisk build` for building targets declared in `rules.toml`,
//! `brisk targets` for listing them, and `brisk cache gc` for trimming the
//! artifact cache to its configured size.

#![warn(missing_docs)]

mod build;
mod cache_cmd;
mod console;
mod logging;
mod project;
mod rules_file;
mod targets;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

/// Brisk: an incremental, cache-aware build tool.
#[derive(Parser, Debug)]
#[command(name = "brisk", version, about = "Brisk incremental build tool")]
pub struct Cli {
    /// Print errors only.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `brisk.toml` file or a project directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build targets and their dependencies.
    Build(BuildArgs),
    /// List the targets declared in `rules.toml`.
    Targets,
    /// Manage the artifact cache.
    Cache {
        /// The cache operation.
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Arguments for the `brisk build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Targets to build, e.g. `//app:bin`. Builds every target when empty.
    pub targets: Vec<String>,

    /// Number of parallel workers.
    #[arg(short = 'j', long)]
    pub threads: Option<String>,

    /// Keep building independent targets after a failure.
    #[arg(long)]
    pub keep_going: bool,

    /// Write a JSON report of every rule's outcome to this file.
    #[arg(long)]
    pub build_report: Option<PathBuf>,

    /// Do not start new rules while the load average is above this value.
    #[arg(long)]
    pub load_limit: Option<String>,
}

/// `brisk cache` operations.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CacheAction {
    /// Evict least recently used entries until the cache fits its size limit.
    Gc,
}

/// Flags shared by every subcommand.
pub struct GlobalArgs {
    /// Print errors only.
    pub quiet: bool,
    /// Log at debug level.
    pub verbose: bool,
    /// Optional path to a config file or project directory.
    pub config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Targets => targets::run(&global),
        Command::Cache { ref action } => cache_cmd::run(action, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
