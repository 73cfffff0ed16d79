//! Build rules, the graph they form, and their fingerprints.
//!
//! A [`BuildRule`] declares typed fields, dependencies and outputs. Rules are
//! assembled into a validated, acyclic [`RuleGraph`], and a
//! [`RuleKeyFactory`] derives the rule keys that decide whether a rule must
//! run again.

#![warn(missing_docs)]

pub mod error;
pub mod field;
pub mod genrule;
pub mod graph;
pub mod keys;
pub mod rule;

pub use error::{FingerprintError, GraphError};
pub use field::FieldValue;
pub use genrule::Genrule;
pub use graph::{RuleGraph, RuleGraphBuilder, RuleId};
pub use keys::{FieldResolver, KeyKind, RuleKeyBuilder, RuleKeyFactory};
pub use rule::{BuildContext, BuildRule, StepExecution};
