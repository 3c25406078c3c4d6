use std::sync::Arc;

use husky_core::{Node, NodeRegistry, NodeTree};
use husky_ids::NodeID;
use husky_scene::SceneRecord;
use husky_variant::Variant;
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use uuid::Uuid;

use crate::cache::SceneCache;
use crate::error::SceneError;

/// Lifecycle of a scene instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Unloaded,
    Loading,
    Loaded,
    Active,
    Pooled,
    Destroyed,
}

/// A live clone of a cached scene template.
///
/// The instance owns its node tree: a `SceneInstance`-typed root node named
/// after the instance, whose children are clones of the template's root
/// records. Overrides are recorded against the clone only; the cached
/// template is never touched.
pub struct SceneInstance {
    id: Uuid,
    source_path: Arc<str>,
    state: InstanceState,
    tree: NodeTree,
    overrides: IndexMap<String, Variant>,
    parent_variant: Option<Uuid>,
    pool_origin: bool,
    editable_children: bool,
    attached_to: Option<Uuid>,
}

impl std::fmt::Debug for SceneInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneInstance")
            .field("id", &self.id)
            .field("source_path", &self.source_path)
            .field("state", &self.state)
            .field("overrides", &self.overrides)
            .field("parent_variant", &self.parent_variant)
            .field("pool_origin", &self.pool_origin)
            .field("editable_children", &self.editable_children)
            .field("attached_to", &self.attached_to)
            .finish_non_exhaustive()
    }
}

impl SceneInstance {
    pub(crate) fn new(source_path: &str, tree: NodeTree) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path: Arc::from(source_path),
            state: InstanceState::Loaded,
            tree,
            overrides: IndexMap::new(),
            parent_variant: None,
            pool_origin: false,
            editable_children: false,
            attached_to: None,
        }
    }

    /// Build an instance of `source_path` by deep-cloning the cached
    /// template: fresh node identities, identical structure, types and
    /// properties. Nested scene-instance records expand recursively; the
    /// construction stack guards against runtime recursion even when the
    /// static graph missed it.
    pub fn instantiate(
        cache: &SceneCache,
        registry: &NodeRegistry,
        source_path: &str,
        name: &str,
    ) -> Result<Self, SceneError> {
        let mut stack = Vec::new();
        let tree = instantiate_tree(cache, registry, source_path, name, &mut stack)?;
        Ok(Self::new(source_path, tree))
    }

    // ---------------- accessors ----------------

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    #[inline]
    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: InstanceState) {
        self.state = state;
    }

    #[inline]
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    #[inline]
    pub fn tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }

    pub fn name(&self) -> String {
        self.tree
            .node(self.tree.root())
            .map(|n| n.name.to_string())
            .unwrap_or_default()
    }

    pub(crate) fn rename(&mut self, name: &str) {
        let root = self.tree.root();
        if let Some(node) = self.tree.node_mut(root) {
            node.name = name.to_string().into();
        }
    }

    pub fn parent_variant(&self) -> Option<Uuid> {
        self.parent_variant
    }

    pub fn is_pool_origin(&self) -> bool {
        self.pool_origin
    }

    pub(crate) fn set_pool_origin(&mut self, pool_origin: bool) {
        self.pool_origin = pool_origin;
    }

    pub fn editable_children(&self) -> bool {
        self.editable_children
    }

    pub fn set_editable_children(&mut self, editable: bool) {
        self.editable_children = editable;
    }

    pub fn attached_to(&self) -> Option<Uuid> {
        self.attached_to
    }

    pub(crate) fn set_attached_to(&mut self, parent: Option<Uuid>) {
        self.attached_to = parent;
    }

    /// Whether `break_instance` severed the live link to the source scene.
    pub fn is_broken(&self) -> bool {
        self.source_path.is_empty()
    }

    /// Memory proxy used by the performance monitor.
    pub fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    // ---------------- overrides ----------------

    /// Record a property override and apply it to the live clone.
    ///
    /// The address is slash-separated child names relative to the instance
    /// root, with the final segment naming the property: `"Enemy/health"`
    /// sets `health` on child `Enemy`; a bare `"health"` targets the root.
    /// Returns whether the address resolved onto a live node; the override
    /// is recorded either way and re-applied on reload.
    pub fn apply_property_override(&mut self, address: &str, value: impl Into<Variant>) -> bool {
        let value = value.into();
        self.overrides.insert(address.to_string(), value.clone());
        let applied = apply_override_at(&mut self.tree, address, &value);
        if !applied {
            log::warn!(
                "override address `{address}` does not resolve in instance of `{}`",
                self.source_path
            );
        }
        applied
    }

    /// The full override map, for inspection or serialization.
    pub fn get_override_diff(&self) -> &IndexMap<String, Variant> {
        &self.overrides
    }

    pub fn has_overrides(&self) -> bool {
        !self.overrides.is_empty()
    }

    pub(crate) fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    // ---------------- lifecycle operations ----------------

    /// Produce a new instance sharing this one's source, seeded with a copy
    /// of its overrides and recording this instance as the parent variant.
    /// Edits on the variant never affect this instance.
    pub fn create_variant(
        &self,
        cache: &SceneCache,
        registry: &NodeRegistry,
        name: &str,
    ) -> Result<SceneInstance, SceneError> {
        if self.is_broken() {
            return Err(SceneError::SourceNotFound {
                path: String::new(),
            });
        }
        let mut variant = SceneInstance::instantiate(cache, registry, &self.source_path, name)?;
        variant.parent_variant = Some(self.id);
        variant.editable_children = self.editable_children;
        for (address, value) in &self.overrides {
            variant.apply_property_override(address, value.clone());
        }
        Ok(variant)
    }

    /// Permanently bake the overrides into node properties and sever the
    /// live link to the source scene. Irreversible; the root becomes a
    /// plain node and the override map is emptied (values stay applied).
    pub fn break_instance(&mut self) {
        let root = self.tree.root();
        if let Some(node) = self.tree.node_mut(root) {
            node.ty = Arc::from("Node");
        }
        self.overrides.clear();
        self.source_path = Arc::from("");
    }

    /// Re-clone from the (possibly updated) cached template and re-apply
    /// the override map onto the fresh clone. The instance id is preserved
    /// and external references resolve by name as before. On failure the
    /// prior clone and state are kept (soft failure).
    pub fn reload(
        &mut self,
        cache: &SceneCache,
        registry: &NodeRegistry,
    ) -> Result<(), SceneError> {
        if self.is_broken() {
            return Err(SceneError::SourceNotFound {
                path: String::new(),
            });
        }
        let name = self.name();
        let mut stack = Vec::new();
        let fresh = instantiate_tree(cache, registry, &self.source_path, &name, &mut stack)?;
        self.tree = fresh;
        for (address, value) in self.overrides.clone() {
            apply_override_at(&mut self.tree, &address, &value);
        }
        Ok(())
    }

    /// Reset for pooling: clear overrides, detach, sever connections made
    /// during use, and rebuild a pristine clone from the template.
    pub(crate) fn reset_for_pool(
        &mut self,
        cache: &SceneCache,
        registry: &NodeRegistry,
    ) -> Result<(), SceneError> {
        self.clear_overrides();
        self.attached_to = None;
        self.tree.clear_connections();
        self.reload(cache, registry)?;
        self.state = InstanceState::Pooled;
        Ok(())
    }

    // ---------------- serialization ----------------

    /// Serialize the instance link: `source_path`, `overrides`,
    /// `editable_children` and `instance_id` (plus the instance name).
    pub fn to_dict(&self) -> JsonValue {
        let mut map = JsonMap::new();
        map.insert("name".to_string(), JsonValue::String(self.name()));
        map.insert(
            "source_path".to_string(),
            JsonValue::String(self.source_path.to_string()),
        );
        map.insert(
            "instance_id".to_string(),
            JsonValue::String(self.id.to_string()),
        );
        map.insert(
            "editable_children".to_string(),
            JsonValue::Bool(self.editable_children),
        );
        let mut overrides = JsonMap::new();
        for (address, value) in &self.overrides {
            overrides.insert(address.clone(), value.to_json());
        }
        map.insert("overrides".to_string(), JsonValue::Object(overrides));
        JsonValue::Object(map)
    }

    /// Rebuild an instance from `to_dict` output. The clone is re-created
    /// from the cached template and the serialized overrides re-applied.
    pub fn from_dict(
        cache: &SceneCache,
        registry: &NodeRegistry,
        value: &JsonValue,
    ) -> Result<SceneInstance, SceneError> {
        let map = value.as_object().ok_or_else(|| SceneError::Load {
            path: String::new(),
            reason: "instance dict is not an object".to_string(),
        })?;
        let source_path = map
            .get("source_path")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| SceneError::Load {
                path: String::new(),
                reason: "instance dict is missing `source_path`".to_string(),
            })?;
        let name = map
            .get("name")
            .and_then(JsonValue::as_str)
            .unwrap_or("SceneInstance");

        let mut instance = SceneInstance::instantiate(cache, registry, source_path, name)?;
        if let Some(id) = map
            .get("instance_id")
            .and_then(JsonValue::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        {
            instance.id = id;
        }
        instance.editable_children = map
            .get("editable_children")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        if let Some(JsonValue::Object(overrides)) = map.get("overrides") {
            for (address, json) in overrides {
                instance.apply_property_override(address, Variant::from_json(json));
            }
        }
        Ok(instance)
    }
}

/// Resolve an override address against `tree` and set the property.
pub(crate) fn apply_override_at(tree: &mut NodeTree, address: &str, value: &Variant) -> bool {
    let (node_path, prop) = split_address(address);
    let target = if node_path.is_empty() {
        Some(tree.root())
    } else {
        tree.find_from(tree.root(), node_path)
    };
    match target {
        Some(id) => tree.set_prop(id, prop, value.clone()),
        None => false,
    }
}

fn split_address(address: &str) -> (&str, &str) {
    match address.rsplit_once('/') {
        Some((node_path, prop)) => (node_path, prop),
        None => ("", address),
    }
}

/// Build the instance tree for `source_path`: a `SceneInstance` wrapper root
/// whose children are clones of the template's root records.
pub(crate) fn instantiate_tree(
    cache: &SceneCache,
    registry: &NodeRegistry,
    source_path: &str,
    name: &str,
    construction_stack: &mut Vec<String>,
) -> Result<NodeTree, SceneError> {
    if construction_stack.iter().any(|p| p == source_path) {
        let mut chain = construction_stack.clone();
        chain.push(source_path.to_string());
        return Err(SceneError::CircularDependency {
            path: source_path.to_string(),
            chain,
        });
    }

    let template = cache.load(source_path)?;
    construction_stack.push(source_path.to_string());

    let mut root = Node::new(name.to_string(), "SceneInstance");
    root.set_prop("source_path", Variant::ScenePath(Arc::from(source_path)));
    let mut tree = NodeTree::new(root);
    let root_id = tree.root();

    for record in &template.file.nodes {
        if let Err(err) = build_record(&mut tree, root_id, record, cache, registry, construction_stack)
        {
            construction_stack.pop();
            return Err(err);
        }
    }
    construction_stack.pop();
    Ok(tree)
}

fn build_record(
    tree: &mut NodeTree,
    parent: NodeID,
    record: &SceneRecord,
    cache: &SceneCache,
    registry: &NodeRegistry,
    construction_stack: &mut Vec<String>,
) -> Result<NodeID, SceneError> {
    if let Some(source) = &record.source_path {
        // Nested scene instance: expand the referenced template in place.
        let sub = instantiate_tree(cache, registry, source, &record.name, construction_stack)?;
        let id = tree
            .graft(parent, &sub, sub.root())
            .ok_or_else(|| SceneError::Load {
                path: source.clone(),
                reason: format!("failed to graft nested instance `{}`", record.name),
            })?;
        for (address, json) in &record.overrides {
            let value = Variant::from_json(json);
            if !apply_embedded_override(tree, id, address, &value) {
                log::warn!("embedded override `{address}` does not resolve in `{source}`");
            }
        }
        return Ok(id);
    }

    let mut node = registry.instantiate(&record.ty, &record.name);
    for (key, json) in &record.properties {
        node.set_prop(key.clone(), Variant::from_json(json));
    }
    let id = tree
        .add_child(parent, node)
        .ok_or_else(|| SceneError::Load {
            path: String::new(),
            reason: format!("failed to attach record `{}`", record.name),
        })?;
    for child in &record.children {
        build_record(tree, id, child, cache, registry, construction_stack)?;
    }
    Ok(id)
}

fn apply_embedded_override(
    tree: &mut NodeTree,
    base: NodeID,
    address: &str,
    value: &Variant,
) -> bool {
    let (node_path, prop) = split_address(address);
    let target = if node_path.is_empty() {
        Some(base)
    } else {
        tree.find_from(base, node_path)
    };
    match target {
        Some(id) => tree.set_prop(id, prop, value.clone()),
        None => false,
    }
}
