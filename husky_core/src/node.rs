use std::borrow::Cow;
use std::sync::Arc;

use husky_ids::NodeID;
use husky_variant::Variant;
use indexmap::IndexMap;
use smallvec::SmallVec;

/// A single node in a scene tree.
///
/// The parent's child list owns the node (through the arena); `parent` is a
/// non-owning back-reference used only for lookups, never for lifetime
/// control. A node has at most one parent at any time.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeID,
    pub name: Cow<'static, str>,
    pub ty: Arc<str>,
    pub parent: NodeID,
    pub children: Vec<NodeID>,
    pub props: IndexMap<String, Variant>,
    pub groups: SmallVec<[Arc<str>; 2]>,
    pub visible: bool,
}

impl Node {
    pub fn new(name: impl Into<Cow<'static, str>>, ty: impl AsRef<str>) -> Self {
        Self {
            id: NodeID::nil(),
            name: name.into(),
            ty: Arc::from(ty.as_ref()),
            parent: NodeID::nil(),
            children: Vec::new(),
            props: IndexMap::new(),
            groups: SmallVec::new(),
            visible: true,
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub fn add_child(&mut self, child: NodeID) {
        self.children.push(child);
    }

    #[inline]
    pub fn remove_child(&mut self, child: NodeID) {
        self.children.retain(|c| *c != child);
    }

    #[inline]
    pub fn children_slice(&self) -> &[NodeID] {
        &self.children
    }

    pub fn prop(&self, key: &str) -> Option<&Variant> {
        self.props.get(key)
    }

    pub fn set_prop(&mut self, key: impl Into<String>, value: impl Into<Variant>) {
        self.props.insert(key.into(), value.into());
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.as_ref() == group)
    }
}
