//! Settings resolution: merging `brisk.toml` with command-line overrides.

use std::path::{Path, PathBuf};

use brisk_common::ByteSize;

use crate::error::ConfigError;
use crate::types::{BriskConfig, CacheMode};

/// Values supplied on the command line that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    /// `-j/--threads`, as typed.
    pub threads: Option<String>,
    /// `--load-limit`, as typed.
    pub load_limit: Option<String>,
    /// `--keep-going`; `true` forces keep-going on.
    pub keep_going: bool,
    /// `--build-report <path>`.
    pub report: Option<PathBuf>,
}

/// Fully resolved build settings with every default applied and every
/// numeric value validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    /// Maximum parallel workers (at least 1).
    pub threads: usize,
    /// Maximum tolerable system load; `f64::INFINITY` disables the check.
    pub load_limit: f64,
    /// Continue independent branches after a failure.
    pub keep_going: bool,
    /// Absolute directory for outputs and metadata.
    pub output_root: PathBuf,
    /// Absolute path for the JSON build report.
    pub report: Option<PathBuf>,
    /// Cache settings.
    pub cache: ResolvedCache,
}

/// Resolved `[cache]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCache {
    /// Cache implementation.
    pub mode: CacheMode,
    /// Absolute cache directory.
    pub dir: PathBuf,
    /// Whether artifacts are stored (and therefore fetchable).
    pub store: bool,
    /// Size limit for eviction; `None` disables eviction.
    pub max_size: Option<ByteSize>,
}

/// Default worker count: 1.25 × the number of processors, at least 1.
pub fn default_threads(available_processors: usize) -> usize {
    ((available_processors as f64) * 1.25).max(1.0) as usize
}

/// Resolves configuration and overrides into concrete settings.
///
/// Relative paths are anchored at `project_root`. `available_processors`
/// feeds the default thread count.
pub fn resolve_settings(
    config: &BriskConfig,
    overrides: &SettingsOverrides,
    project_root: &Path,
    available_processors: usize,
) -> Result<ResolvedSettings, ConfigError> {
    let threads = match overrides.threads.as_ref().or(config.build.threads.as_ref()) {
        Some(text) => parse_threads(text)?,
        None => default_threads(available_processors),
    };

    let load_limit = match overrides
        .load_limit
        .as_ref()
        .or(config.build.load_limit.as_ref())
    {
        Some(text) => parse_load_limit(text)?,
        None => f64::INFINITY,
    };

    let report = overrides
        .report
        .clone()
        .or_else(|| config.build.report.as_ref().map(PathBuf::from))
        .map(|p| anchor(project_root, &p));

    let max_size = config
        .cache
        .max_size
        .as_deref()
        .map(|s| {
            s.parse::<ByteSize>()
                .map_err(|e| ConfigError::ValidationError(format!("cache.max_size: {e}")))
        })
        .transpose()?;

    Ok(ResolvedSettings {
        threads,
        load_limit,
        keep_going: overrides.keep_going || config.build.keep_going,
        output_root: anchor(project_root, Path::new(&config.build.output_root)),
        report,
        cache: ResolvedCache {
            mode: config.cache.mode,
            dir: anchor(project_root, Path::new(&config.cache.dir)),
            store: config.cache.store,
            max_size,
        },
    })
}

fn parse_threads(text: &str) -> Result<usize, ConfigError> {
    let err = || ConfigError::InvalidNumber {
        setting: "build.threads",
        value: text.to_string(),
    };
    let threads: usize = text.trim().parse().map_err(|_| err())?;
    if threads == 0 {
        return Err(err());
    }
    Ok(threads)
}

fn parse_load_limit(text: &str) -> Result<f64, ConfigError> {
    let limit: f64 = text
        .trim()
        .parse()
        .ok()
        .filter(|v: &f64| !v.is_nan() && *v > 0.0)
        .ok_or_else(|| ConfigError::InvalidNumber {
            setting: "build.load_limit",
            value: text.to_string(),
        })?;
    Ok(limit)
}

fn anchor(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    fn resolve(toml: &str, overrides: &SettingsOverrides) -> Result<ResolvedSettings, ConfigError> {
        let config = load_config_from_str(toml).unwrap();
        resolve_settings(&config, overrides, Path::new("/project"), 8)
    }

    #[test]
    fn defaults() {
        let settings = resolve("", &SettingsOverrides::default()).unwrap();
        assert_eq!(settings.threads, 10);
        assert!(settings.load_limit.is_infinite());
        assert!(!settings.keep_going);
        assert_eq!(settings.output_root, PathBuf::from("/project/brisk-out"));
        assert_eq!(settings.cache.dir, PathBuf::from("/project/brisk-cache"));
        assert!(settings.cache.store);
        assert!(settings.cache.max_size.is_none());
        assert!(settings.report.is_none());
    }

    #[test]
    fn default_threads_never_zero() {
        assert_eq!(default_threads(0), 1);
        assert_eq!(default_threads(1), 1);
        assert_eq!(default_threads(4), 5);
    }

    #[test]
    fn file_values_apply() {
        let settings = resolve(
            r#"
[build]
threads = 3
load_limit = 1.5
keep_going = true
report = "out/report.json"

[cache]
dir = "/abs/cache"
max_size = "1MB"
"#,
            &SettingsOverrides::default(),
        )
        .unwrap();
        assert_eq!(settings.threads, 3);
        assert_eq!(settings.load_limit, 1.5);
        assert!(settings.keep_going);
        assert_eq!(settings.report, Some(PathBuf::from("/project/out/report.json")));
        assert_eq!(settings.cache.dir, PathBuf::from("/abs/cache"));
        assert_eq!(settings.cache.max_size, Some(ByteSize::new(1024 * 1024)));
    }

    #[test]
    fn overrides_win() {
        let overrides = SettingsOverrides {
            threads: Some("2".to_string()),
            load_limit: Some("4".to_string()),
            keep_going: true,
            report: Some(PathBuf::from("r.json")),
        };
        let settings = resolve("[build]\nthreads = 16\n", &overrides).unwrap();
        assert_eq!(settings.threads, 2);
        assert_eq!(settings.load_limit, 4.0);
        assert!(settings.keep_going);
        assert_eq!(settings.report, Some(PathBuf::from("/project/r.json")));
    }

    #[test]
    fn malformed_threads() {
        let err = resolve("[build]\nthreads = \"many\"\n", &SettingsOverrides::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                setting: "build.threads",
                ..
            }
        ));
    }

    #[test]
    fn zero_threads_rejected() {
        assert!(resolve("[build]\nthreads = 0\n", &SettingsOverrides::default()).is_err());
    }

    #[test]
    fn malformed_load_limit() {
        for bad in ["\"high\"", "-1", "0"] {
            let toml = format!("[build]\nload_limit = {bad}\n");
            let err = resolve(&toml, &SettingsOverrides::default()).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidNumber {
                    setting: "build.load_limit",
                    ..
                }
            ));
        }
    }

    #[test]
    fn malformed_max_size() {
        let err = resolve("[cache]\nmax_size = \"3 parsecs\"\n", &SettingsOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn zero_max_size_is_valid() {
        let settings = resolve("[cache]\nmax_size = \"0\"\n", &SettingsOverrides::default()).unwrap();
        assert_eq!(settings.cache.max_size, Some(ByteSize::new(0)));
    }
}
