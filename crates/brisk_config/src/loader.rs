//! Reading `brisk.toml`.

use crate::error::ConfigError;
use crate::types::{BriskConfig, CacheMode};
use std::path::Path;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "brisk.toml";

/// Loads and validates `brisk.toml` from a project directory.
///
/// A missing file is not an error: every setting has a default, so the
/// result is the default configuration.
pub fn load_config(project_dir: &Path) -> Result<BriskConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    match std::fs::read_to_string(&config_path) {
        Ok(content) => load_config_from_str(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BriskConfig::default()),
        Err(e) => Err(e.into()),
    }
}

/// Loads and validates a configuration file at an explicit path.
///
/// Unlike [`load_config`], the file must exist.
pub fn load_config_file(path: &Path) -> Result<BriskConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `brisk.toml` configuration from a string.
///
/// Used by the file loaders and by tests.
pub fn load_config_from_str(content: &str) -> Result<BriskConfig, ConfigError> {
    let config: BriskConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present.
///
/// Numeric settings are checked later, in [`resolve_settings`](crate::resolve_settings),
/// because command-line overrides may replace them.
fn validate_config(config: &BriskConfig) -> Result<(), ConfigError> {
    if config.build.output_root.trim().is_empty() {
        return Err(ConfigError::MissingField("build.output_root".to_string()));
    }
    if config.cache.mode == CacheMode::Dir && config.cache.dir.trim().is_empty() {
        return Err(ConfigError::MissingField("cache.dir".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml = r#"
[build]
threads = 12
load_limit = 8.0
keep_going = true
output_root = "out"
report = "report.json"

[cache]
mode = "dir"
dir = "/var/cache/brisk"
store = false
max_size = "2GB"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.build.threads.as_deref(), Some("12"));
        assert!(config.build.keep_going);
        assert_eq!(config.build.output_root, "out");
        assert_eq!(config.build.report.as_deref(), Some("report.json"));
        assert_eq!(config.cache.dir, "/var/cache/brisk");
        assert!(!config.cache.store);
        assert_eq!(config.cache.max_size.as_deref(), Some("2GB"));
    }

    #[test]
    fn empty_output_root_errors() {
        let err = load_config_from_str("[build]\noutput_root = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn empty_cache_dir_errors_only_in_dir_mode() {
        let err = load_config_from_str("[cache]\ndir = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
        assert!(load_config_from_str("[cache]\nmode = \"none\"\ndir = \"\"\n").is_ok());
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn wrong_type_is_parse_error() {
        let err = load_config_from_str("[build]\nkeep_going = \"yes\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert!(!config.build.keep_going);
    }

    #[test]
    fn reads_file_from_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[build]\nkeep_going = true\n").unwrap();
        let config = load_config(dir.path()).unwrap();
        assert!(config.build.keep_going);
    }

    #[test]
    fn explicit_file_must_exist() {
        let err = load_config_file(Path::new("/nonexistent/brisk.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
