//! Rule keys: the fingerprint that addresses a rule's build outcome.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::hash::{ContentHash, ParseHashError};

/// The fingerprint of a rule's declared state and its dependencies.
///
/// A rule key is a pure function of its inputs: equal keys mean the rule's
/// outputs can be reused. The hex form names cache entries and is what gets
/// recorded in on-disk metadata.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleKey(ContentHash);

impl RuleKey {
    /// Wraps a finished digest.
    pub const fn new(hash: ContentHash) -> Self {
        Self(hash)
    }

    /// Returns the underlying digest.
    pub fn hash(&self) -> ContentHash {
        self.0
    }

    /// Parses the canonical hex form, returning `None` when malformed.
    pub fn from_hex(s: &str) -> Option<Self> {
        ContentHash::from_hex(s).map(Self)
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.0.to_string();
        write!(f, "RuleKey({}..)", &hex[..8])
    }
}

impl FromStr for RuleKey {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<ContentHash>().map(Self)
    }
}

impl From<ContentHash> for RuleKey {
    fn from(hash: ContentHash) -> Self {
        Self(hash)
    }
}
