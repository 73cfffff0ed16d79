//! Build target identifiers of the form `//base/path:name`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// The fully-qualified name of a build rule.
///
/// A target is written `//base/path:name`, where `base/path` is the directory
/// of the build file (possibly empty) and `name` the rule's short name.
/// Targets order lexicographically by base path, then name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildTarget {
    base_path: String,
    short_name: String,
}

impl BuildTarget {
    /// Creates a target from its base path (without the leading `//`) and short name.
    pub fn new(base_path: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            short_name: short_name.into(),
        }
    }

    /// The directory part, without the leading `//`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The rule name after the colon.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Relative directory under an output root that holds this target's files:
    /// `<base_path>/.<short_name>`.
    ///
    /// The leading dot keeps rule directories from colliding with
    /// subdirectories of the same package.
    pub fn scratch_dir(&self) -> PathBuf {
        let mut dir = PathBuf::new();
        for component in self.base_path.split('/').filter(|c| !c.is_empty()) {
            dir.push(component);
        }
        dir.push(format!(".{}", self.short_name));
        dir
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "//{}:{}", self.base_path, self.short_name)
    }
}

impl fmt::Debug for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuildTarget({self})")
    }
}

/// Error type for parsing build target strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid build target: '{input}' ({reason})")]
pub struct ParseTargetError {
    /// The input string that failed to parse.
    pub input: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl FromStr for BuildTarget {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = |reason| ParseTargetError {
            input: s.to_string(),
            reason,
        };

        let rest = s.strip_prefix("//").ok_or_else(|| err("must start with //"))?;
        let (base, name) = rest.split_once(':').ok_or_else(|| err("missing ':'"))?;
        if name.is_empty() {
            return Err(err("empty rule name"));
        }
        if name.contains(['/', ':']) {
            return Err(err("rule name may not contain '/' or ':'"));
        }
        if base.starts_with('/') || base.ends_with('/') || base.contains("//") {
            return Err(err("malformed base path"));
        }
        if base.split('/').any(|c| c == "..") {
            return Err(err("base path may not contain '..'"));
        }
        Ok(Self::new(base, name))
    }
}

impl Serialize for BuildTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BuildTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
