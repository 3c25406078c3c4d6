#![forbid(unsafe_code)]

pub mod behavior;
pub mod node;
pub mod node_arena;
pub mod node_registry;
pub mod tree;

pub use behavior::{Behavior, BehaviorContext, BehaviorMap};
pub use node::Node;
pub use node_arena::NodeArena;
pub use node_registry::{FieldSchema, NodeClass, NodeRegistry};
pub use tree::{
    NodeTree, QueuedCall, SignalBus, SignalTarget, TreeEvent, TreeEventKind,
};
