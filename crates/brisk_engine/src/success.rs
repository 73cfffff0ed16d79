//! Why a rule did not fail, and what that implies for caching.

use std::fmt;

use serde::Serialize;

/// How a rule reached a successful terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildRuleSuccessType {
    /// The steps ran on this machine.
    BuiltLocally,
    /// Outputs were fetched from the artifact cache by the default key.
    FetchedFromCache,
    /// The default key matched the one recorded by the previous build.
    MatchingRuleKey,
    /// Outputs were fetched from the artifact cache by the input-based key.
    FetchedFromCacheInputBased,
    /// The input-based key matched the one recorded by the previous build.
    MatchingInputBasedRuleKey,
    /// The rule's own fields and its dependencies' ABI are unchanged.
    MatchingDepsAbiAndRuleKeyNoDeps,
}

/// What the engine does after a rule succeeds a given way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessTypeProperties {
    /// Store the outputs in the artifact cache under the default key.
    pub should_upload_artifact: bool,
    /// Also store them under the input-based key.
    pub should_upload_input_based_artifact: bool,
    /// Replace all recorded metadata with freshly computed values.
    pub should_clear_and_write_metadata: bool,
    /// Merge updated keys into the recorded metadata.
    pub should_update_metadata: bool,
    /// The outputs on disk were rewritten.
    pub outputs_have_changed: bool,
}

impl BuildRuleSuccessType {
    /// Every success type.
    pub const ALL: [BuildRuleSuccessType; 6] = [
        BuildRuleSuccessType::BuiltLocally,
        BuildRuleSuccessType::FetchedFromCache,
        BuildRuleSuccessType::MatchingRuleKey,
        BuildRuleSuccessType::FetchedFromCacheInputBased,
        BuildRuleSuccessType::MatchingInputBasedRuleKey,
        BuildRuleSuccessType::MatchingDepsAbiAndRuleKeyNoDeps,
    ];

    /// The post-success policy for this type.
    pub const fn properties(self) -> SuccessTypeProperties {
        match self {
            BuildRuleSuccessType::BuiltLocally => SuccessTypeProperties {
                should_upload_artifact: true,
                should_upload_input_based_artifact: true,
                should_clear_and_write_metadata: true,
                should_update_metadata: false,
                outputs_have_changed: true,
            },
            BuildRuleSuccessType::FetchedFromCache => SuccessTypeProperties {
                should_upload_artifact: false,
                should_upload_input_based_artifact: false,
                should_clear_and_write_metadata: false,
                should_update_metadata: false,
                outputs_have_changed: true,
            },
            BuildRuleSuccessType::MatchingRuleKey => SuccessTypeProperties {
                should_upload_artifact: false,
                should_upload_input_based_artifact: false,
                should_clear_and_write_metadata: false,
                should_update_metadata: false,
                outputs_have_changed: false,
            },
            BuildRuleSuccessType::FetchedFromCacheInputBased => SuccessTypeProperties {
                should_upload_artifact: true,
                should_upload_input_based_artifact: false,
                should_clear_and_write_metadata: false,
                should_update_metadata: true,
                outputs_have_changed: true,
            },
            BuildRuleSuccessType::MatchingInputBasedRuleKey => SuccessTypeProperties {
                should_upload_artifact: true,
                should_upload_input_based_artifact: false,
                should_clear_and_write_metadata: false,
                should_update_metadata: true,
                outputs_have_changed: false,
            },
            BuildRuleSuccessType::MatchingDepsAbiAndRuleKeyNoDeps => SuccessTypeProperties {
                should_upload_artifact: false,
                should_upload_input_based_artifact: false,
                should_clear_and_write_metadata: false,
                should_update_metadata: true,
                outputs_have_changed: false,
            },
        }
    }

    /// The report label, e.g. `BUILT_LOCALLY`.
    pub const fn as_str(self) -> &'static str {
        match self {
            BuildRuleSuccessType::BuiltLocally => "BUILT_LOCALLY",
            BuildRuleSuccessType::FetchedFromCache => "FETCHED_FROM_CACHE",
            BuildRuleSuccessType::MatchingRuleKey => "MATCHING_RULE_KEY",
            BuildRuleSuccessType::FetchedFromCacheInputBased => "FETCHED_FROM_CACHE_INPUT_BASED",
            BuildRuleSuccessType::MatchingInputBasedRuleKey => "MATCHING_INPUT_BASED_RULE_KEY",
            BuildRuleSuccessType::MatchingDepsAbiAndRuleKeyNoDeps => {
                "MATCHING_DEPS_ABI_AND_RULE_KEY_NO_DEPS"
            }
        }
    }
}

impl fmt::Display for BuildRuleSuccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
