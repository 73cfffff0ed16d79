//! Values of the fingerprint-relevant fields a rule declares.

use std::collections::BTreeMap;
use std::path::PathBuf;

use brisk_common::BuildTarget;

/// The value of one declared rule field.
///
/// Primitives hash by value. A [`FieldValue::Path`] hashes by the content
/// of the file it names, and a [`FieldValue::Target`] by the key (or output
/// hash) of the rule it names, so edits upstream change the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A boolean flag.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A string, hashed verbatim.
    Str(String),
    /// A source file or directory, relative to the project root.
    Path(PathBuf),
    /// Another rule in the graph.
    Target(BuildTarget),
    /// An ordered sequence.
    List(Vec<FieldValue>),
    /// A map with a stable (sorted) key order.
    Map(BTreeMap<String, FieldValue>),
    /// A value that may be absent. `None` and `Some` hash differently.
    Optional(Option<Box<FieldValue>>),
}

impl FieldValue {
    /// Collects every target referenced anywhere inside this value.
    pub fn referenced_targets<'a>(&'a self, out: &mut Vec<&'a BuildTarget>) {
        match self {
            FieldValue::Target(t) => out.push(t),
            FieldValue::List(items) => items.iter().for_each(|v| v.referenced_targets(out)),
            FieldValue::Map(map) => map.values().for_each(|v| v.referenced_targets(out)),
            FieldValue::Optional(Some(v)) => v.referenced_targets(out),
            FieldValue::Bool(_)
            | FieldValue::Int(_)
            | FieldValue::Str(_)
            | FieldValue::Path(_)
            | FieldValue::Optional(None) => {}
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<BuildTarget> for FieldValue {
    fn from(v: BuildTarget) -> Self {
        FieldValue::Target(v)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(v: Vec<T>) -> Self {
        FieldValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        FieldValue::Optional(v.map(|inner| Box::new(inner.into())))
    }
}
