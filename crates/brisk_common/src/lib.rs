//! Shared foundational types used across the Brisk build core.
//!
//! This crate provides content hashing, rule keys, build target identifiers,
//! byte sizes, and the build event model with its sink capability.

#![warn(missing_docs)]

pub mod event;
pub mod hash;
pub mod rule_key;
pub mod size;
pub mod target;

pub use event::{BuildEvent, CollectingEventSink, EventId, EventSink, NullEventSink, StepEventInfo};
pub use hash::{ContentHash, ContentHasher, ParseHashError};
pub use rule_key::RuleKey;
pub use size::{ByteSize, ParseSizeError};
pub use target::{BuildTarget, ParseTargetError};
