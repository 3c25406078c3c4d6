use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use husky_ids::{NodeID, SignalID};
use husky_variant::Variant;
use smallvec::SmallVec;

use crate::node::Node;
use crate::node_arena::NodeArena;

/// Lifecycle notifications produced by tree mutations, in emission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeEventKind {
    EnterTree,
    Ready,
    ExitTree,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeEvent {
    pub kind: TreeEventKind,
    pub node: NodeID,
}

/// One endpoint of a signal connection: a node plus the method invoked on
/// whatever behavior is attached to it.
#[derive(Clone, Debug)]
pub struct SignalTarget {
    pub node: NodeID,
    pub method: Arc<str>,
}

#[derive(Default)]
pub struct SignalBus {
    connections: HashMap<SignalID, SmallVec<[SignalTarget; 4]>>,
}

impl SignalBus {
    pub fn connect(&mut self, signal: SignalID, target: SignalTarget) {
        self.connections.entry(signal).or_default().push(target);
    }

    pub fn disconnect_node(&mut self, node: NodeID) {
        for targets in self.connections.values_mut() {
            targets.retain(|t| t.node != node);
        }
        self.connections.retain(|_, targets| !targets.is_empty());
    }

    pub fn clear(&mut self) {
        self.connections.clear();
    }

    pub fn targets(&self, signal: SignalID) -> &[SignalTarget] {
        self.connections
            .get(&signal)
            .map(|t| t.as_slice())
            .unwrap_or(&[])
    }

    pub fn connection_count(&self) -> usize {
        self.connections.values().map(|t| t.len()).sum()
    }
}

/// A queued method dispatch produced by `emit`, consumed by the behavior layer.
#[derive(Clone, Debug)]
pub struct QueuedCall {
    pub target: NodeID,
    pub method: Arc<str>,
    pub args: SmallVec<[Variant; 3]>,
}

/// A live node tree: arena-owned nodes under a single root, plus groups and
/// a per-tree signal bus. Mutations push lifecycle events onto an internal
/// queue (the notification bus) that external behaviors drain.
pub struct NodeTree {
    nodes: NodeArena,
    root: NodeID,
    groups: HashMap<Arc<str>, HashSet<NodeID>>,
    signals: SignalBus,
    queued_calls: Vec<QueuedCall>,
    events: Vec<TreeEvent>,
}

impl NodeTree {
    pub fn new(root: Node) -> Self {
        let mut nodes = NodeArena::new();
        let root_id = nodes.insert(root);
        let mut tree = Self {
            nodes,
            root: root_id,
            groups: HashMap::new(),
            signals: SignalBus::default(),
            queued_calls: Vec::new(),
            events: Vec::new(),
        };
        tree.events.push(TreeEvent {
            kind: TreeEventKind::EnterTree,
            node: root_id,
        });
        tree.events.push(TreeEvent {
            kind: TreeEventKind::Ready,
            node: root_id,
        });
        tree
    }

    #[inline]
    pub fn root(&self) -> NodeID {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeID) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeID) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeID, &Node)> {
        self.nodes.iter()
    }

    // ---------------- structure ----------------

    /// Attach `node` as the last child of `parent`. Sibling name collisions
    /// are resolved by suffixing (`Name_2`, `Name_3`, ...). Emits enter-tree
    /// then ready for the new node. Returns None when `parent` is invalid.
    pub fn add_child(&mut self, parent: NodeID, mut node: Node) -> Option<NodeID> {
        if !self.nodes.contains(parent) {
            log::warn!("add_child: parent {parent} is not in the tree");
            return None;
        }
        let unique = self.unique_child_name(parent, node.name.as_ref());
        if unique != node.name.as_ref() {
            node.name = unique.into();
        }
        node.parent = parent;
        let id = self.nodes.insert(node);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.add_child(id);
        }
        self.events.push(TreeEvent {
            kind: TreeEventKind::EnterTree,
            node: id,
        });
        self.events.push(TreeEvent {
            kind: TreeEventKind::Ready,
            node: id,
        });
        Some(id)
    }

    /// Move a live node under a new parent. The node keeps its identity and
    /// subtree; no enter/exit events fire since it never leaves the tree.
    /// A node has at most one parent at any time.
    pub fn reparent(&mut self, child: NodeID, new_parent: NodeID) -> bool {
        if child == self.root || !self.nodes.contains(child) || !self.nodes.contains(new_parent) {
            return false;
        }
        // Reject making a node a descendant of itself.
        let mut cursor = new_parent;
        while !cursor.is_nil() {
            if cursor == child {
                return false;
            }
            cursor = self.nodes.get(cursor).map(|n| n.parent).unwrap_or_default();
        }

        let old_parent = self.nodes.get(child).map(|n| n.parent).unwrap_or_default();
        if let Some(old) = self.nodes.get_mut(old_parent) {
            old.remove_child(child);
        }
        let unique = {
            let name = self
                .nodes
                .get(child)
                .map(|n| n.name.to_string())
                .unwrap_or_default();
            self.unique_child_name(new_parent, &name)
        };
        if let Some(node) = self.nodes.get_mut(child) {
            if node.name.as_ref() != unique {
                node.name = unique.into();
            }
            node.parent = new_parent;
        }
        if let Some(parent) = self.nodes.get_mut(new_parent) {
            parent.add_child(child);
        }
        true
    }

    /// Remove `child` (and its whole subtree) from `parent`. Exit-tree events
    /// are emitted deepest-first *before* any structural detachment.
    pub fn remove_child(&mut self, parent: NodeID, child: NodeID) -> bool {
        let is_child = self
            .nodes
            .get(child)
            .map(|n| n.parent == parent)
            .unwrap_or(false);
        if !is_child {
            return false;
        }
        self.free_subtree(child) > 0
    }

    /// Free a node and all descendants. Returns the number of nodes removed.
    /// Exit-tree notifications for the whole subtree are queued (deepest
    /// first) before the nodes are detached from the arena.
    pub fn free_subtree(&mut self, id: NodeID) -> usize {
        if !self.nodes.contains(id) {
            return 0;
        }
        let mut order = Vec::new();
        self.collect_subtree(id, &mut order);

        // Notify before detaching.
        for &node_id in order.iter().rev() {
            self.events.push(TreeEvent {
                kind: TreeEventKind::ExitTree,
                node: node_id,
            });
        }

        let parent = self.nodes.get(id).map(|n| n.parent).unwrap_or_default();
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.remove_child(id);
        }
        for &node_id in &order {
            for members in self.groups.values_mut() {
                members.remove(&node_id);
            }
            self.signals.disconnect_node(node_id);
            self.nodes.remove(node_id);
        }
        if id == self.root {
            self.root = NodeID::nil();
        }
        order.len()
    }

    fn collect_subtree(&self, id: NodeID, out: &mut Vec<NodeID>) {
        out.push(id);
        if let Some(node) = self.nodes.get(id) {
            for &child in node.children_slice() {
                self.collect_subtree(child, out);
            }
        }
    }

    /// Deep-copy a subtree of `source` under `parent`, assigning fresh IDs
    /// to every copied node. Enter-tree and ready fire per copied node,
    /// top-down. Returns the ID of the copied subtree root.
    pub fn graft(
        &mut self,
        parent: NodeID,
        source: &NodeTree,
        source_root: NodeID,
    ) -> Option<NodeID> {
        if !self.nodes.contains(parent) {
            return None;
        }
        let source_node = source.node(source_root)?;
        let mut copy = source_node.clone();
        copy.id = NodeID::nil();
        copy.parent = NodeID::nil();
        copy.children = Vec::new();
        let new_id = self.add_child(parent, copy)?;
        for &child in source.node(source_root)?.children_slice() {
            self.graft(new_id, source, child)?;
        }
        Some(new_id)
    }

    fn unique_child_name(&self, parent: NodeID, desired: &str) -> String {
        let Some(parent_node) = self.nodes.get(parent) else {
            return desired.to_string();
        };
        let taken: Vec<&str> = parent_node
            .children_slice()
            .iter()
            .filter_map(|c| self.nodes.get(*c))
            .map(|n| n.name.as_ref())
            .collect();
        if !taken.contains(&desired) {
            return desired.to_string();
        }
        let mut counter = 2;
        loop {
            let candidate = format!("{desired}_{counter}");
            if !taken.contains(&candidate.as_str()) {
                return candidate;
            }
            counter += 1;
        }
    }

    // ---------------- lookup ----------------

    pub fn child_by_name(&self, parent: NodeID, name: &str) -> Option<NodeID> {
        let parent_node = self.nodes.get(parent)?;
        parent_node
            .children_slice()
            .iter()
            .copied()
            .find(|c| self.nodes.get(*c).is_some_and(|n| n.name == name))
    }

    /// Resolve a slash-separated path. Absolute paths (`/Root/Child`) start
    /// at the root, whose name must match the first segment; relative paths
    /// (`Child/Grandchild`) descend from the root's children.
    pub fn find_node(&self, path: &str) -> Option<NodeID> {
        if let Some(rest) = path.strip_prefix('/') {
            let mut segments = rest.split('/').filter(|s| !s.is_empty());
            let first = segments.next()?;
            let root_node = self.nodes.get(self.root)?;
            if root_node.name != first {
                return None;
            }
            let mut current = self.root;
            for segment in segments {
                current = self.child_by_name(current, segment)?;
            }
            Some(current)
        } else {
            self.find_from(self.root, path)
        }
    }

    /// Resolve a relative path downward from `from`. An empty path resolves
    /// to `from` itself.
    pub fn find_from(&self, from: NodeID, path: &str) -> Option<NodeID> {
        let mut current = from;
        if !self.nodes.contains(current) {
            return None;
        }
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self.child_by_name(current, segment)?;
        }
        Some(current)
    }

    /// Absolute path of a node, e.g. `/Root/Player/Sprite`.
    pub fn node_path(&self, id: NodeID) -> Option<String> {
        let mut segments = Vec::new();
        let mut cursor = id;
        while !cursor.is_nil() {
            let node = self.nodes.get(cursor)?;
            segments.push(node.name.to_string());
            cursor = node.parent;
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }

    // ---------------- properties ----------------

    pub fn prop(&self, id: NodeID, key: &str) -> Option<&Variant> {
        self.nodes.get(id)?.prop(key)
    }

    pub fn set_prop(&mut self, id: NodeID, key: impl Into<String>, value: impl Into<Variant>) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.set_prop(key, value);
                true
            }
            None => false,
        }
    }

    // ---------------- groups ----------------

    pub fn add_to_group(&mut self, id: NodeID, group: &str) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if !node.in_group(group) {
            let key: Arc<str> = Arc::from(group);
            node.groups.push(key.clone());
            self.groups.entry(key).or_default().insert(id);
        }
        true
    }

    pub fn remove_from_group(&mut self, id: NodeID, group: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.groups.retain(|g| g.as_ref() != group);
        }
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(&id);
        }
    }

    pub fn group_members(&self, group: &str) -> Vec<NodeID> {
        let mut members: Vec<NodeID> = self
            .groups
            .get(group)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    // ---------------- signals ----------------

    pub fn connect(&mut self, signal: SignalID, node: NodeID, method: &str) -> bool {
        if !self.nodes.contains(node) {
            return false;
        }
        self.signals.connect(
            signal,
            SignalTarget {
                node,
                method: Arc::from(method),
            },
        );
        true
    }

    /// Queue one method call per connection of `signal`. Returns how many
    /// dispatches were queued.
    pub fn emit(&mut self, signal: SignalID, args: &[Variant]) -> usize {
        let targets = self.signals.targets(signal).to_vec();
        for target in &targets {
            self.queued_calls.push(QueuedCall {
                target: target.node,
                method: target.method.clone(),
                args: args.iter().cloned().collect(),
            });
        }
        targets.len()
    }

    pub fn disconnect_node(&mut self, node: NodeID) {
        self.signals.disconnect_node(node);
    }

    pub fn clear_connections(&mut self) {
        self.signals.clear();
    }

    pub fn connection_count(&self) -> usize {
        self.signals.connection_count()
    }

    // ---------------- notification bus ----------------

    pub fn take_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn take_queued_calls(&mut self) -> Vec<QueuedCall> {
        std::mem::take(&mut self.queued_calls)
    }

    pub fn has_pending_notifications(&self) -> bool {
        !self.events.is_empty() || !self.queued_calls.is_empty()
    }
}
