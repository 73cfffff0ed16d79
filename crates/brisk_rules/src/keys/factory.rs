//! Memoized rule key computation over a whole graph.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use brisk_cache::FileHashSource;
use brisk_common::{BuildTarget, ContentHash, ContentHasher, RuleKey};
use tracing::debug;

use crate::error::FingerprintError;
use crate::graph::{RuleGraph, RuleId};
use crate::keys::builder::{FieldResolver, RuleKeyBuilder};

/// The flavors of key a rule can be fingerprinted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Fields plus each dependency's default key.
    Default,
    /// Fields plus the content hash of each dependency's outputs.
    InputBased,
    /// Fields only; referenced targets contribute their name.
    NoDeps,
    /// A digest over the ABI outputs of the dependencies alone.
    DepsAbi,
}

impl KeyKind {
    const ALL: [KeyKind; 4] = [
        KeyKind::Default,
        KeyKind::InputBased,
        KeyKind::NoDeps,
        KeyKind::DepsAbi,
    ];

    fn slot(self) -> usize {
        match self {
            KeyKind::Default => 0,
            KeyKind::InputBased => 1,
            KeyKind::NoDeps => 2,
            KeyKind::DepsAbi => 3,
        }
    }

    fn flavor(self) -> &'static str {
        match self {
            KeyKind::Default => "default",
            KeyKind::InputBased => "input",
            KeyKind::NoDeps => "nodeps",
            KeyKind::DepsAbi => "abi",
        }
    }
}

type Memo<T> = Vec<OnceLock<Result<T, FingerprintError>>>;

fn memo<T>(len: usize) -> Memo<T> {
    (0..len).map(|_| OnceLock::new()).collect()
}

/// Computes rule keys for every rule of a graph, each at most once per kind.
///
/// Results (including failures) are stored in index-addressed `OnceLock`
/// tables, so concurrent callers asking for the same key block on a single
/// computation. Dependency keys are computed recursively on demand.
///
/// Output hashes are memoized the same way, so they must only be requested
/// once the rule's outputs are final: after it was built, fetched or found
/// up to date.
pub struct RuleKeyFactory {
    graph: Arc<RuleGraph>,
    files: Arc<dyn FileHashSource>,
    project_root: PathBuf,
    keys: [Memo<RuleKey>; 4],
    output_hashes: Memo<ContentHash>,
    abi_hashes: Memo<ContentHash>,
}

impl RuleKeyFactory {
    /// Creates a factory for `graph`, hashing files relative to `project_root`.
    pub fn new(graph: Arc<RuleGraph>, files: Arc<dyn FileHashSource>, project_root: &Path) -> Self {
        let n = graph.len();
        Self {
            keys: KeyKind::ALL.map(|_| memo(n)),
            output_hashes: memo(n),
            abi_hashes: memo(n),
            graph,
            files,
            project_root: project_root.to_path_buf(),
        }
    }

    /// The graph keys are computed over.
    pub fn graph(&self) -> &Arc<RuleGraph> {
        &self.graph
    }

    /// The file hasher used for inputs and outputs.
    pub fn files(&self) -> &Arc<dyn FileHashSource> {
        &self.files
    }

    /// Returns the key of `kind` for rule `id`.
    pub fn rule_key(&self, id: RuleId, kind: KeyKind) -> Result<RuleKey, FingerprintError> {
        self.keys[kind.slot()][id.index()]
            .get_or_init(|| self.compute_key(id, kind))
            .clone()
    }

    /// Content hash over all outputs of rule `id`.
    pub fn output_hash(&self, id: RuleId) -> Result<ContentHash, FingerprintError> {
        self.output_hashes[id.index()]
            .get_or_init(|| {
                let rule = self.graph.rule(id);
                self.hash_outputs(rule.target(), &rule.outputs())
            })
            .clone()
    }

    /// Content hash over the ABI outputs of rule `id`.
    pub fn abi_hash(&self, id: RuleId) -> Result<ContentHash, FingerprintError> {
        self.abi_hashes[id.index()]
            .get_or_init(|| {
                let rule = self.graph.rule(id);
                self.hash_outputs(rule.target(), &rule.abi_outputs())
            })
            .clone()
    }

    fn compute_key(&self, id: RuleId, kind: KeyKind) -> Result<RuleKey, FingerprintError> {
        let rule = self.graph.rule(id);
        let target = rule.target();
        let resolver = KindResolver {
            factory: self,
            kind,
            target,
        };
        let mut builder = RuleKeyBuilder::new(target, rule.rule_type(), kind.flavor(), &resolver);

        if kind != KeyKind::DepsAbi {
            for (name, value) in rule.fields() {
                builder.set_field(&name, &value)?;
            }
        }

        for &dep in self.graph.deps(id) {
            let contribution = match kind {
                KeyKind::Default => self.rule_key(dep, KeyKind::Default)?.hash(),
                KeyKind::InputBased => self.output_hash(dep)?,
                KeyKind::DepsAbi => self.abi_hash(dep)?,
                KeyKind::NoDeps => continue,
            };
            builder.set_dep(self.graph.rule(dep).target(), contribution);
        }

        let key = builder.build();
        debug!(%target, ?kind, %key, "computed rule key");
        Ok(key)
    }

    fn hash_outputs(
        &self,
        target: &BuildTarget,
        outputs: &[PathBuf],
    ) -> Result<ContentHash, FingerprintError> {
        let mut sorted: Vec<&PathBuf> = outputs.iter().collect();
        sorted.sort();
        let mut hasher = ContentHasher::new();
        for rel in sorted {
            let hash = hash_tree(self.files.as_ref(), &self.project_root, rel).map_err(|e| {
                FingerprintError::OutputUnreadable {
                    target: target.clone(),
                    path: rel.clone(),
                    reason: e.to_string(),
                }
            })?;
            let name = rel.to_string_lossy();
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update(hash.as_bytes());
        }
        Ok(hasher.finish())
    }
}

/// Hashes a file, or a directory as the sorted sequence of its entries'
/// names and hashes.
pub(crate) fn hash_tree(
    files: &dyn FileHashSource,
    root: &Path,
    rel: &Path,
) -> std::io::Result<ContentHash> {
    let abs = root.join(rel);
    let meta = std::fs::metadata(&abs)?;
    if !meta.is_dir() {
        return files.get(&abs);
    }

    let mut names: Vec<_> = std::fs::read_dir(&abs)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<Result<_, _>>()?;
    names.sort();

    let mut hasher = ContentHasher::new();
    hasher.update(b"dir");
    for name in names {
        let child = hash_tree(files, root, &rel.join(&name))?;
        let name = name.to_string_lossy();
        hasher.update(&(name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update(child.as_bytes());
    }
    Ok(hasher.finish())
}

struct KindResolver<'a> {
    factory: &'a RuleKeyFactory,
    kind: KeyKind,
    target: &'a BuildTarget,
}

impl FieldResolver for KindResolver<'_> {
    fn path_hash(&self, path: &Path) -> Result<ContentHash, FingerprintError> {
        hash_tree(
            self.factory.files.as_ref(),
            &self.factory.project_root,
            path,
        )
        .map_err(|e| FingerprintError::InputUnreadable {
            target: self.target.clone(),
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn target_hash(&self, reference: &BuildTarget) -> Result<ContentHash, FingerprintError> {
        let Some(id) = self.factory.graph.id_of(reference) else {
            return Err(FingerprintError::UnknownTarget {
                target: self.target.clone(),
                reference: reference.clone(),
            });
        };
        match self.kind {
            KeyKind::Default => Ok(self.factory.rule_key(id, KeyKind::Default)?.hash()),
            KeyKind::InputBased => self.factory.output_hash(id),
            KeyKind::NoDeps | KeyKind::DepsAbi => {
                Ok(ContentHash::from_bytes(reference.to_string().as_bytes()))
            }
        }
    }
}
