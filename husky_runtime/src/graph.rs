use std::collections::{BTreeSet, HashMap};

use husky_scene::SceneMetadata;

use crate::error::SceneError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InStack,
    Done,
}

/// Directed graph of scene-to-scene references. Nodes are scene paths, an
/// edge `A -> B` means scene A instances or references scene B.
///
/// Invariant: the committed graph is always acyclic. Every edge insertion
/// is validated (depth-first search with a recursion stack) before commit;
/// an edge that would close a cycle is rejected and the graph is left
/// unchanged. Edges to unresolvable paths are kept out of the acyclic
/// graph and recorded separately as missing (soft, for degraded display).
#[derive(Default)]
pub struct DependencyGraph {
    edges: HashMap<String, BTreeSet<String>>,
    reverse: HashMap<String, BTreeSet<String>>,
    missing: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference edge. Rejects with `CircularDependency` (carrying
    /// the cycle chain) if committing the edge would close a cycle.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), SceneError> {
        if self
            .edges
            .get(from)
            .is_some_and(|targets| targets.contains(to))
        {
            return Ok(());
        }

        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.reverse
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());

        if let Some(chain) = self.find_cycle() {
            // Roll back; the graph must be unchanged after a rejection.
            if let Some(targets) = self.edges.get_mut(from) {
                targets.remove(to);
                if targets.is_empty() {
                    self.edges.remove(from);
                }
            }
            if let Some(sources) = self.reverse.get_mut(to) {
                sources.remove(from);
                if sources.is_empty() {
                    self.reverse.remove(to);
                }
            }
            return Err(SceneError::CircularDependency {
                path: from.to_string(),
                chain,
            });
        }
        Ok(())
    }

    /// Register a scene from its metadata: resolvable references become
    /// edges (cycle-checked), unresolvable ones are recorded as missing and
    /// returned as soft errors.
    pub fn register_scene(
        &mut self,
        path: &str,
        metadata: &SceneMetadata,
        exists: impl Fn(&str) -> bool,
    ) -> Result<Vec<SceneError>, SceneError> {
        let mut soft = Vec::new();
        for referenced in &metadata.references {
            if exists(referenced) {
                self.add_edge(path, referenced)?;
            } else {
                log::warn!("scene `{path}` references missing scene `{referenced}`");
                self.missing
                    .entry(path.to_string())
                    .or_default()
                    .insert(referenced.to_string());
                soft.push(SceneError::MissingDependency {
                    path: path.to_string(),
                    referenced: referenced.to_string(),
                });
            }
        }
        Ok(soft)
    }

    /// Remove a scene and all edges touching it (used on invalidation).
    pub fn remove_scene(&mut self, path: &str) {
        if let Some(targets) = self.edges.remove(path) {
            for target in targets {
                if let Some(sources) = self.reverse.get_mut(&target) {
                    sources.remove(path);
                }
            }
        }
        if let Some(sources) = self.reverse.remove(path) {
            for source in sources {
                if let Some(targets) = self.edges.get_mut(&source) {
                    targets.remove(path);
                }
            }
        }
        self.missing.remove(path);
    }

    /// Direct referrers of `path`.
    pub fn dependents(&self, path: &str) -> Vec<String> {
        self.reverse
            .get(path)
            .map(|sources| sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Transitive closure of referrers: every scene whose load would be
    /// affected by a change to `path`.
    pub fn impact_set(&self, path: &str) -> BTreeSet<String> {
        let mut impacted = BTreeSet::new();
        let mut queue: Vec<&str> = vec![path];
        while let Some(current) = queue.pop() {
            if let Some(sources) = self.reverse.get(current) {
                for source in sources {
                    if impacted.insert(source.clone()) {
                        queue.push(source);
                    }
                }
            }
        }
        impacted
    }

    /// Direct references of `path` (resolved edges only).
    pub fn references(&self, path: &str) -> Vec<String> {
        self.edges
            .get(path)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Unresolvable references recorded for `path`.
    pub fn missing(&self, path: &str) -> Vec<String> {
        self.missing
            .get(path)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|t| t.len()).sum()
    }

    /// Depth-first search over the whole graph with an explicit recursion
    /// stack; returns the offending chain when a back edge is found.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut state: HashMap<&str, VisitState> = HashMap::new();
        for start in self.edges.keys() {
            if state.contains_key(start.as_str()) {
                continue;
            }
            let mut stack: Vec<String> = Vec::new();
            if let Some(chain) = self.visit(start, &mut state, &mut stack) {
                return Some(chain);
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        state: &mut HashMap<&'a str, VisitState>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        state.insert(node, VisitState::InStack);
        stack.push(node.to_string());

        if let Some(targets) = self.edges.get(node) {
            for target in targets {
                match state.get(target.as_str()) {
                    Some(VisitState::InStack) => {
                        let from = stack
                            .iter()
                            .position(|p| p == target)
                            .unwrap_or(0);
                        let mut chain: Vec<String> = stack[from..].to_vec();
                        chain.push(target.clone());
                        return Some(chain);
                    }
                    Some(VisitState::Done) => {}
                    None => {
                        if let Some(chain) = self.visit(target, state, stack) {
                            return Some(chain);
                        }
                    }
                }
            }
        }

        stack.pop();
        state.insert(node, VisitState::Done);
        None
    }
}
