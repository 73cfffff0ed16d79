//! `brisk targets`: lists the declared build targets.

use brisk_config::SettingsOverrides;

use crate::project::{load_settings, resolve_project_root};
use crate::rules_file::load_rules;
use crate::GlobalArgs;

/// Runs the `brisk targets` command, printing one target per line, sorted.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_root = resolve_project_root(global)?;
    let settings = load_settings(global, &project_root, &SettingsOverrides::default())?;
    let graph = load_rules(&project_root, &settings.output_root)?;
    for target in graph.targets() {
        println!("{target}");
    }
    Ok(0)
}
