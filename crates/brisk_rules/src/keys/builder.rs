//! The shared walker that turns a rule's declared state into a digest.
//!
//! Every value is written with a one-byte type tag, and every
//! variable-length value with a length prefix, so no two distinct field
//! sequences can produce the same byte stream.

use std::collections::HashSet;
use std::path::Path;

use brisk_common::{BuildTarget, ContentHash, ContentHasher, RuleKey};

use crate::error::FingerprintError;
use crate::field::FieldValue;

const TAG_RULE_TYPE: u8 = b'R';
const TAG_NAME: u8 = b'N';
const TAG_FLAVOR: u8 = b'K';
const TAG_FIELD: u8 = b'F';
const TAG_DEP: u8 = b'D';
const TAG_BOOL: u8 = b'b';
const TAG_INT: u8 = b'i';
const TAG_STR: u8 = b's';
const TAG_PATH: u8 = b'p';
const TAG_TARGET: u8 = b't';
const TAG_LIST: u8 = b'l';
const TAG_MAP: u8 = b'm';
const TAG_NONE: u8 = b'n';
const TAG_SOME: u8 = b'o';

/// Resolves the values that cannot be hashed by value alone.
pub trait FieldResolver {
    /// Content hash of a path relative to the project root.
    fn path_hash(&self, path: &Path) -> Result<ContentHash, FingerprintError>;

    /// The contribution of a referenced rule: its key or its output hash,
    /// depending on the kind of key being built.
    fn target_hash(&self, target: &BuildTarget) -> Result<ContentHash, FingerprintError>;
}

/// Accumulates one rule key.
pub struct RuleKeyBuilder<'a> {
    target: &'a BuildTarget,
    resolver: &'a dyn FieldResolver,
    hasher: ContentHasher,
    seen: HashSet<String>,
}

impl<'a> RuleKeyBuilder<'a> {
    /// Starts a key for `target` of type `rule_type`.
    ///
    /// The target itself is hashed, so two rules with identical fields never
    /// share a key or a cache entry.
    ///
    /// `flavor` separates key kinds, so a rule's default key and its
    /// input-based key differ even when their inputs coincide.
    pub fn new(
        target: &'a BuildTarget,
        rule_type: &str,
        flavor: &str,
        resolver: &'a dyn FieldResolver,
    ) -> Self {
        let mut builder = Self {
            target,
            resolver,
            hasher: ContentHasher::new(),
            seen: HashSet::new(),
        };
        builder.tag(TAG_FLAVOR).str(flavor);
        builder.tag(TAG_RULE_TYPE).str(rule_type);
        builder.tag(TAG_NAME).str(&target.to_string());
        builder
    }

    /// Adds one named field. Each name may appear once.
    pub fn set_field(
        &mut self,
        name: &str,
        value: &FieldValue,
    ) -> Result<&mut Self, FingerprintError> {
        if !self.seen.insert(name.to_string()) {
            return Err(FingerprintError::DuplicateField {
                target: self.target.clone(),
                field: name.to_string(),
            });
        }
        self.tag(TAG_FIELD).str(name);
        self.value(value)?;
        Ok(self)
    }

    /// Adds the contribution of one dependency.
    pub fn set_dep(&mut self, dep: &BuildTarget, contribution: ContentHash) -> &mut Self {
        self.tag(TAG_DEP).str(&dep.to_string());
        self.hasher.update(contribution.as_bytes());
        self
    }

    /// Finishes the key.
    pub fn build(self) -> RuleKey {
        RuleKey::new(self.hasher.finish())
    }

    fn value(&mut self, value: &FieldValue) -> Result<(), FingerprintError> {
        match value {
            FieldValue::Bool(b) => {
                self.tag(TAG_BOOL).hasher.update(&[u8::from(*b)]);
            }
            FieldValue::Int(i) => {
                self.tag(TAG_INT).hasher.update(&i.to_le_bytes());
            }
            FieldValue::Str(s) => {
                self.tag(TAG_STR).str(s);
            }
            FieldValue::Path(path) => {
                let hash = self.resolver.path_hash(path)?;
                self.tag(TAG_PATH).str(&path.to_string_lossy());
                self.hasher.update(hash.as_bytes());
            }
            FieldValue::Target(target) => {
                let hash = self.resolver.target_hash(target)?;
                self.tag(TAG_TARGET).str(&target.to_string());
                self.hasher.update(hash.as_bytes());
            }
            FieldValue::List(items) => {
                self.tag(TAG_LIST).len(items.len());
                for item in items {
                    self.value(item)?;
                }
            }
            FieldValue::Map(map) => {
                self.tag(TAG_MAP).len(map.len());
                for (key, item) in map {
                    self.str(key);
                    self.value(item)?;
                }
            }
            FieldValue::Optional(None) => {
                self.tag(TAG_NONE);
            }
            FieldValue::Optional(Some(inner)) => {
                self.tag(TAG_SOME);
                self.value(inner)?;
            }
        }
        Ok(())
    }

    fn tag(&mut self, tag: u8) -> &mut Self {
        self.hasher.update(&[tag]);
        self
    }

    fn len(&mut self, len: usize) -> &mut Self {
        self.hasher.update(&(len as u64).to_le_bytes());
        self
    }

    fn str(&mut self, s: &str) -> &mut Self {
        self.len(s.len());
        self.hasher.update(s.as_bytes());
        self
    }
}
