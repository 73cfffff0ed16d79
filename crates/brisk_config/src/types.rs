//! Configuration types deserialized from `brisk.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// Default directory, relative to the project root, for build outputs and metadata.
pub const DEFAULT_OUTPUT_ROOT: &str = "brisk-out";

/// Default directory, relative to the project root, for the artifact cache.
pub const DEFAULT_CACHE_DIR: &str = "brisk-cache";

/// The top-level configuration parsed from `brisk.toml`.
///
/// Every section is optional; an absent file is equivalent to an empty one.
#[derive(Debug, Default, Deserialize)]
pub struct BriskConfig {
    /// Build settings (parallelism, load limit, failure policy).
    #[serde(default)]
    pub build: BuildConfig,
    /// Artifact cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// The `[build]` section.
///
/// Numeric settings are kept as written and validated during resolution, so
/// that `threads = "eight"` produces a readable configuration error instead
/// of a TOML type error.
#[derive(Debug, Deserialize)]
pub struct BuildConfig {
    /// Worker thread count. Defaults to 1.25 × available processors.
    #[serde(default, deserialize_with = "deserialize_number_text")]
    pub threads: Option<String>,
    /// Do not start new rules while the system load average is above this.
    #[serde(default, deserialize_with = "deserialize_number_text")]
    pub load_limit: Option<String>,
    /// Keep building independent rules after a failure.
    #[serde(default)]
    pub keep_going: bool,
    /// Directory for rule outputs and metadata, relative to the project root.
    #[serde(default = "default_output_root")]
    pub output_root: String,
    /// Where to write the JSON build report, if anywhere.
    #[serde(default)]
    pub report: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            threads: None,
            load_limit: None,
            keep_going: false,
            output_root: default_output_root(),
            report: None,
        }
    }
}

fn default_output_root() -> String {
    DEFAULT_OUTPUT_ROOT.to_string()
}

/// The `[cache]` section.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Which cache implementation to use.
    #[serde(default)]
    pub mode: CacheMode,
    /// Cache directory, relative to the project root unless absolute.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Whether built artifacts are written to the cache. When `false` the
    /// cache is effectively read-disabled as well: every fetch misses.
    #[serde(default = "default_true")]
    pub store: bool,
    /// Maximum total cache size, e.g. `"2GB"`. Absent means unbounded.
    #[serde(default)]
    pub max_size: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::default(),
            dir: default_cache_dir(),
            store: true,
            max_size: None,
        }
    }
}

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

fn default_true() -> bool {
    true
}

/// Artifact cache implementation.
#[derive(Debug, Default, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Directory-backed cache (default).
    #[default]
    Dir,
    /// No cache: stores are dropped, fetches miss.
    None,
}

/// Deserializes a numeric setting that may be written as a TOML number or a string.
///
/// Accepts `threads = 8`, `threads = "8"` and `load_limit = 2.5` alike and
/// keeps the textual form for later validation.
fn deserialize_number_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct NumberText;

    impl<'de> Visitor<'de> for NumberText {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a number or a string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
    }

    deserializer.deserialize_any(NumberText)
}
