//! Loading the rule graph from `rules.toml`.
//!
//! The file declares generic shell rules only:
//!
//! ```toml
//! [[genrule]]
//! target = "//app:version"
//! cmd = "cat $SRCS > $OUT"
//! srcs = ["VERSION"]          # relative to the package, here `app/`
//! out = "version.txt"         # placed under <output_root>/gen/app/
//! deps = ["//tools:stamp"]
//! input_based = false
//! abi = false
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use brisk_common::BuildTarget;
use brisk_rules::{Genrule, GraphError, RuleGraph};
use serde::Deserialize;

/// Name of the rule file at the project root.
pub const RULES_FILE: &str = "rules.toml";

/// The rule file could not be turned into a graph.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// The rule file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unexpected fields.
    #[error("failed to parse {}: {reason}", .path.display())]
    Parse {
        /// The rule file.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A target string is malformed.
    #[error("invalid target '{value}': {reason}")]
    InvalidTarget {
        /// As written.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A path escapes its package or the project.
    #[error("{target}: path '{}' must be relative and stay inside the project", .path.display())]
    InvalidPath {
        /// The rule declaring the path.
        target: String,
        /// As written.
        path: PathBuf,
    },

    /// Generated files must live inside the project.
    #[error("output root {} is not inside the project root {}", .output_root.display(), .project_root.display())]
    OutputRootOutsideProject {
        /// Configured output root.
        output_root: PathBuf,
        /// The project root.
        project_root: PathBuf,
    },

    /// The rules do not form a valid graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesFile {
    #[serde(default)]
    genrule: Vec<GenruleDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GenruleDef {
    target: String,
    cmd: String,
    out: String,
    #[serde(default)]
    srcs: Vec<String>,
    #[serde(default)]
    deps: Vec<String>,
    #[serde(default)]
    input_based: bool,
    #[serde(default)]
    abi: bool,
}

/// Reads `rules.toml` from `project_root`. A missing file yields an empty graph.
pub fn load_rules(project_root: &Path, output_root: &Path) -> Result<RuleGraph, RulesError> {
    let path = project_root.join(RULES_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => return Err(RulesError::Io { path, source }),
    };
    parse_rules(&content, project_root, output_root).map_err(|e| match e {
        RulesError::Parse { reason, .. } => RulesError::Parse { path, reason },
        other => other,
    })
}

/// Builds a graph from rule file text.
pub fn parse_rules(
    content: &str,
    project_root: &Path,
    output_root: &Path,
) -> Result<RuleGraph, RulesError> {
    let file: RulesFile = toml::from_str(content).map_err(|e| RulesError::Parse {
        path: PathBuf::from(RULES_FILE),
        reason: e.to_string(),
    })?;
    let gen_root = output_root
        .strip_prefix(project_root)
        .map_err(|_| RulesError::OutputRootOutsideProject {
            output_root: output_root.to_path_buf(),
            project_root: project_root.to_path_buf(),
        })?
        .join("gen");

    let mut builder = RuleGraph::builder();
    for def in file.genrule {
        builder.add(Arc::new(to_genrule(def, &gen_root)?));
    }
    Ok(builder.build()?)
}

fn to_genrule(def: GenruleDef, gen_root: &Path) -> Result<Genrule, RulesError> {
    let target = parse_target(&def.target)?;
    let package = package_dir(&target);

    let out = checked(&def.target, &def.out)?;
    let srcs = def
        .srcs
        .iter()
        .map(|src| checked(&def.target, src).map(|p| package.join(p)))
        .collect::<Result<Vec<_>, _>>()?;
    let deps = def
        .deps
        .iter()
        .map(|dep| parse_target(dep))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Genrule::new(target, def.cmd, gen_root.join(&package).join(out))
        .srcs(srcs)
        .with_deps(deps)
        .input_based(def.input_based)
        .abi(def.abi))
}

fn parse_target(value: &str) -> Result<BuildTarget, RulesError> {
    value.parse().map_err(|e: brisk_common::ParseTargetError| RulesError::InvalidTarget {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn package_dir(target: &BuildTarget) -> PathBuf {
    target
        .base_path()
        .split('/')
        .filter(|c| !c.is_empty())
        .collect()
}

fn checked(target: &str, path: &str) -> Result<PathBuf, RulesError> {
    let p = PathBuf::from(path);
    let ok = !path.is_empty() && p.components().all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(p)
    } else {
        Err(RulesError::InvalidPath {
            target: target.to_string(),
            path: p,
        })
    }
}
