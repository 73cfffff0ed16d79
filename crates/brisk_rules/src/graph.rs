//! The rule dependency graph.
//!
//! Rules live in an arena and are addressed by [`RuleId`]. Edges come from
//! each rule's declared deps plus any target referenced from its fields.
//! The graph is validated when built: no duplicate targets, no dangling
//! dependencies, no cycles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use brisk_common::BuildTarget;

use crate::error::GraphError;
use crate::rule::BuildRule;

/// Index of a rule in a [`RuleGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u32);

impl RuleId {
    /// The arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An immutable, acyclic graph of build rules.
pub struct RuleGraph {
    rules: Vec<Arc<dyn BuildRule>>,
    deps: Vec<Vec<RuleId>>,
    dependents: Vec<Vec<RuleId>>,
    by_target: HashMap<BuildTarget, RuleId>,
}

impl std::fmt::Debug for RuleGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleGraph")
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

impl RuleGraph {
    /// Starts an empty graph.
    pub fn builder() -> RuleGraphBuilder {
        RuleGraphBuilder::default()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the graph holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule at `id`.
    pub fn rule(&self, id: RuleId) -> &Arc<dyn BuildRule> {
        &self.rules[id.index()]
    }

    /// Looks up a rule by target.
    pub fn id_of(&self, target: &BuildTarget) -> Option<RuleId> {
        self.by_target.get(target).copied()
    }

    /// Direct dependencies of `id`, sorted by target.
    pub fn deps(&self, id: RuleId) -> &[RuleId] {
        &self.deps[id.index()]
    }

    /// Rules that depend directly on `id`.
    pub fn dependents(&self, id: RuleId) -> &[RuleId] {
        &self.dependents[id.index()]
    }

    /// All rule ids in arena order.
    pub fn ids(&self) -> impl Iterator<Item = RuleId> {
        (0..self.rules.len() as u32).map(RuleId)
    }

    /// All targets, sorted.
    pub fn targets(&self) -> Vec<&BuildTarget> {
        let mut targets: Vec<_> = self.rules.iter().map(|r| r.target()).collect();
        targets.sort();
        targets
    }

    /// The rules reachable from `roots` (inclusive), dependencies first.
    pub fn transitive_closure(&self, roots: &[RuleId]) -> Vec<RuleId> {
        let mut visited = vec![false; self.rules.len()];
        let mut order = Vec::new();
        for &root in roots {
            self.post_order(root, &mut visited, &mut order);
        }
        order
    }

    fn post_order(&self, root: RuleId, visited: &mut [bool], order: &mut Vec<RuleId>) {
        // Iterative so deep chains cannot overflow the stack.
        let mut stack = vec![(root, 0usize)];
        if visited[root.index()] {
            return;
        }
        visited[root.index()] = true;
        while let Some((id, next)) = stack.pop() {
            let deps = &self.deps[id.index()];
            if let Some(&dep) = deps.get(next) {
                stack.push((id, next + 1));
                if !visited[dep.index()] {
                    visited[dep.index()] = true;
                    stack.push((dep, 0));
                }
            } else {
                order.push(id);
            }
        }
    }
}

/// Collects rules and validates them into a [`RuleGraph`].
#[derive(Default)]
pub struct RuleGraphBuilder {
    rules: Vec<Arc<dyn BuildRule>>,
}

impl RuleGraphBuilder {
    /// Adds a rule.
    pub fn add(&mut self, rule: Arc<dyn BuildRule>) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Adds a rule, builder style.
    pub fn with(mut self, rule: Arc<dyn BuildRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Validates the rules and builds the graph.
    pub fn build(self) -> Result<RuleGraph, GraphError> {
        let mut by_target = HashMap::with_capacity(self.rules.len());
        for (i, rule) in self.rules.iter().enumerate() {
            if by_target
                .insert(rule.target().clone(), RuleId(i as u32))
                .is_some()
            {
                return Err(GraphError::DuplicateTarget(rule.target().clone()));
            }
        }

        let mut deps = Vec::with_capacity(self.rules.len());
        let mut dependents = vec![Vec::new(); self.rules.len()];
        for (i, rule) in self.rules.iter().enumerate() {
            let mut referenced: Vec<&BuildTarget> = rule.deps().iter().collect();
            for (_, value) in rule.fields() {
                let mut found = Vec::new();
                value.referenced_targets(&mut found);
                referenced.extend(found.into_iter().filter_map(|t| {
                    by_target.get_key_value(t).map(|(k, _)| k)
                }));
            }

            let mut ids = Vec::with_capacity(referenced.len());
            let mut seen = HashSet::new();
            for dep in referenced {
                let Some(&id) = by_target.get(dep) else {
                    return Err(GraphError::UnknownDependency {
                        rule: rule.target().clone(),
                        dep: dep.clone(),
                    });
                };
                if seen.insert(id) {
                    ids.push(id);
                    dependents[id.index()].push(RuleId(i as u32));
                }
            }
            ids.sort_by(|a: &RuleId, b: &RuleId| {
                self.rules[a.index()].target().cmp(self.rules[b.index()].target())
            });
            deps.push(ids);
        }

        let graph = RuleGraph {
            rules: self.rules,
            deps,
            dependents,
            by_target,
        };
        if let Some(path) = find_cycle(&graph) {
            return Err(GraphError::Cycle { path });
        }
        Ok(graph)
    }
}

/// Kahn's algorithm; any rule left with unmet dependencies lies on or
/// behind a cycle. Walk deps from one of them until a rule repeats.
fn find_cycle(graph: &RuleGraph) -> Option<Vec<BuildTarget>> {
    let n = graph.len();
    let mut in_degree: Vec<usize> = (0..n).map(|i| graph.deps[i].len()).collect();
    let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut done = 0;
    while let Some(i) = ready.pop() {
        done += 1;
        for dependent in &graph.dependents[i] {
            in_degree[dependent.index()] -= 1;
            if in_degree[dependent.index()] == 0 {
                ready.push(dependent.index());
            }
        }
    }
    if done == n {
        return None;
    }

    let start = (0..n).find(|&i| in_degree[i] > 0)?;
    let mut position = HashMap::new();
    let mut walk = Vec::new();
    let mut current = start;
    loop {
        if let Some(&at) = position.get(&current) {
            let mut cycle: Vec<BuildTarget> = walk[at..]
                .iter()
                .map(|&i: &usize| graph.rules[i].target().clone())
                .collect();
            cycle.push(graph.rules[current].target().clone());
            return Some(cycle);
        }
        position.insert(current, walk.len());
        walk.push(current);
        // Some dependency of an unfinished rule is itself unfinished.
        current = graph.deps[current]
            .iter()
            .map(|d| d.index())
            .find(|&d| in_degree[d] > 0)?;
    }
}
