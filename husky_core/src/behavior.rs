use std::collections::HashMap;

use husky_ids::NodeID;
use husky_variant::Variant;

use crate::tree::{NodeTree, TreeEventKind};

/// Handle passed into behavior hooks: the owning tree plus the node the
/// behavior is attached to.
pub struct BehaviorContext<'a> {
    pub tree: &'a mut NodeTree,
    pub node: NodeID,
}

/// Capability-checked dispatch surface for external systems attached to
/// nodes (scripting runtimes, physics reactions, editor hooks). The core
/// never assumes a concrete runtime: it asks `has_method` and dispatches
/// through `call_method`.
pub trait Behavior: Send {
    fn has_method(&self, _name: &str) -> bool {
        false
    }

    fn call_method(
        &mut self,
        name: &str,
        args: &[Variant],
        ctx: &mut BehaviorContext<'_>,
    ) -> Option<Variant>;

    fn enter_tree(&mut self, _ctx: &mut BehaviorContext<'_>) {}
    fn ready(&mut self, _ctx: &mut BehaviorContext<'_>) {}
    fn exit_tree(&mut self, _ctx: &mut BehaviorContext<'_>) {}
}

/// Behaviors attached to a tree's nodes, keyed by node ID. Drains the
/// tree's notification bus and queued signal calls on `pump`.
#[derive(Default)]
pub struct BehaviorMap {
    behaviors: HashMap<NodeID, Box<dyn Behavior>>,
}

impl BehaviorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, node: NodeID, behavior: Box<dyn Behavior>) {
        self.behaviors.insert(node, behavior);
    }

    pub fn detach(&mut self, node: NodeID) -> Option<Box<dyn Behavior>> {
        self.behaviors.remove(&node)
    }

    pub fn clear(&mut self) {
        self.behaviors.clear();
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    pub fn has_method(&self, node: NodeID, method: &str) -> bool {
        self.behaviors
            .get(&node)
            .is_some_and(|b| b.has_method(method))
    }

    /// Invoke a method on the behavior attached to `node`, if it exposes it.
    pub fn call_method(
        &mut self,
        tree: &mut NodeTree,
        node: NodeID,
        method: &str,
        args: &[Variant],
    ) -> Option<Variant> {
        let mut behavior = self.behaviors.remove(&node)?;
        let result = if behavior.has_method(method) {
            let mut ctx = BehaviorContext { tree, node };
            behavior.call_method(method, args, &mut ctx)
        } else {
            log::debug!("behavior on {node} has no method `{method}`");
            None
        };
        self.behaviors.insert(node, behavior);
        result
    }

    /// Drain the tree's lifecycle events and queued signal calls, invoking
    /// the matching behavior hooks. Dispatch may queue further events or
    /// calls; pumping loops until the bus is empty. Behaviors on exited
    /// nodes are dropped after their exit hook runs.
    pub fn pump(&mut self, tree: &mut NodeTree) {
        while tree.has_pending_notifications() {
            for event in tree.take_events() {
                let Some(mut behavior) = self.behaviors.remove(&event.node) else {
                    continue;
                };
                {
                    let mut ctx = BehaviorContext {
                        tree,
                        node: event.node,
                    };
                    match event.kind {
                        TreeEventKind::EnterTree => behavior.enter_tree(&mut ctx),
                        TreeEventKind::Ready => behavior.ready(&mut ctx),
                        TreeEventKind::ExitTree => behavior.exit_tree(&mut ctx),
                    }
                }
                if event.kind != TreeEventKind::ExitTree {
                    self.behaviors.insert(event.node, behavior);
                }
            }

            for call in tree.take_queued_calls() {
                self.call_method(tree, call.target, call.method.as_ref(), &call.args);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use husky_ids::SignalID;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        entered: Arc<AtomicUsize>,
        exited: Arc<AtomicUsize>,
        hits: Arc<AtomicUsize>,
    }

    impl Behavior for Recorder {
        fn has_method(&self, name: &str) -> bool {
            name == "on_hit"
        }

        fn call_method(
            &mut self,
            name: &str,
            args: &[Variant],
            _ctx: &mut BehaviorContext<'_>,
        ) -> Option<Variant> {
            if name == "on_hit" {
                self.hits.fetch_add(1, Ordering::SeqCst);
                return args.first().cloned();
            }
            None
        }

        fn enter_tree(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.entered.fetch_add(1, Ordering::SeqCst);
        }

        fn exit_tree(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.exited.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn pump_dispatches_lifecycle_hooks() {
        let mut tree = NodeTree::new(Node::new("Root", "Node"));
        let entered = Arc::new(AtomicUsize::new(0));
        let exited = Arc::new(AtomicUsize::new(0));

        let player = tree.add_child(tree.root(), Node::new("Player", "Node2D")).unwrap();
        let mut behaviors = BehaviorMap::new();
        behaviors.attach(
            player,
            Box::new(Recorder {
                entered: entered.clone(),
                exited: exited.clone(),
                ..Default::default()
            }),
        );

        behaviors.pump(&mut tree);
        assert_eq!(entered.load(Ordering::SeqCst), 1);

        tree.free_subtree(player);
        behaviors.pump(&mut tree);
        assert_eq!(exited.load(Ordering::SeqCst), 1);
        // Behavior dropped after exit.
        assert!(behaviors.is_empty());
    }

    #[test]
    fn signals_reach_capable_behaviors_only() {
        let mut tree = NodeTree::new(Node::new("Root", "Node"));
        let hits = Arc::new(AtomicUsize::new(0));

        let target = tree.add_child(tree.root(), Node::new("Target", "Node")).unwrap();
        let mut behaviors = BehaviorMap::new();
        behaviors.attach(
            target,
            Box::new(Recorder {
                hits: hits.clone(),
                ..Default::default()
            }),
        );
        behaviors.pump(&mut tree);

        let hit = SignalID::from_name("hit");
        tree.connect(hit, target, "on_hit");
        tree.connect(hit, target, "not_a_method");
        tree.emit(hit, &[Variant::Int(3)]);
        behaviors.pump(&mut tree);

        // `on_hit` dispatched, `not_a_method` skipped by the capability check.
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
