use std::collections::HashMap;
use std::sync::Arc;

use husky_variant::{Variant, VariantKind, Vector2};

use crate::node::Node;

/// Declarative description of one instance-exposed field of a node class:
/// name, value kind, and the default applied at instantiation.
#[derive(Clone, Debug)]
pub struct FieldSchema {
    pub name: Arc<str>,
    pub kind: VariantKind,
    pub default: Variant,
}

impl FieldSchema {
    pub fn new(name: &str, default: impl Into<Variant>) -> Self {
        let default = default.into();
        Self {
            name: Arc::from(name),
            kind: default.kind(),
            default,
        }
    }
}

/// A registered node type: a type tag plus its field schema.
#[derive(Clone, Debug)]
pub struct NodeClass {
    pub name: Arc<str>,
    pub fields: Vec<FieldSchema>,
}

impl NodeClass {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, default: impl Into<Variant>) -> Self {
        self.fields.push(FieldSchema::new(name, default));
        self
    }

    pub fn field_schema(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name.as_ref() == name)
    }
}

/// Registry of node classes. Instantiation fills schema defaults; unknown
/// type tags fall back to a bare node so scene files with unregistered
/// types still load (degraded, not fatal).
pub struct NodeRegistry {
    classes: HashMap<Arc<str>, NodeClass>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
        }
    }

    /// Registry preloaded with the core node classes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(NodeClass::new("Node"));
        registry.register(
            NodeClass::new("Node2D")
                .field("position", Vector2::zero())
                .field("rotation", 0.0)
                .field("scale", Vector2::one()),
        );
        registry.register(
            NodeClass::new("Sprite2D")
                .field("position", Vector2::zero())
                .field("rotation", 0.0)
                .field("scale", Vector2::one())
                .field("texture", ""),
        );
        registry.register(
            NodeClass::new("Camera2D")
                .field("position", Vector2::zero())
                .field("zoom", 1.0)
                .field("current", false),
        );
        registry
    }

    pub fn register(&mut self, class: NodeClass) {
        if self.classes.contains_key(&class.name) {
            log::warn!("node class `{}` re-registered, replacing", class.name);
        }
        self.classes.insert(class.name.clone(), class);
    }

    pub fn class(&self, name: &str) -> Option<&NodeClass> {
        self.classes.get(name)
    }

    pub fn class_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Create a node of `ty` named `name`, props seeded from the schema
    /// defaults. Unregistered types produce a bare node with the tag kept.
    pub fn instantiate(&self, ty: &str, name: &str) -> Node {
        let mut node = Node::new(name.to_string(), ty);
        if let Some(class) = self.classes.get(ty) {
            for field in &class.fields {
                node.props
                    .insert(field.name.to_string(), field.default.clone());
            }
        } else {
            log::debug!("instantiating unregistered node type `{ty}` as bare node");
        }
        node
    }

    /// Whether `value` matches the declared kind of `field` on `ty`.
    /// Unregistered types and undeclared fields are permissive (dynamic bag).
    pub fn validate(&self, ty: &str, field: &str, value: &Variant) -> bool {
        match self.classes.get(ty).and_then(|c| c.field_schema(field)) {
            Some(schema) => {
                schema.kind == value.kind()
                    // Ints are accepted where floats are declared.
                    || (schema.kind == VariantKind::Float && value.kind() == VariantKind::Int)
            }
            None => true,
        }
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiate_fills_schema_defaults() {
        let registry = NodeRegistry::with_builtins();
        let node = registry.instantiate("Node2D", "Player");
        assert_eq!(
            node.prop("position").and_then(|v| v.as_vector2()),
            Some(Vector2::zero())
        );
        assert_eq!(node.prop("scale").and_then(|v| v.as_vector2()), Some(Vector2::one()));
    }

    #[test]
    fn unknown_type_falls_back_to_bare_node() {
        let registry = NodeRegistry::with_builtins();
        let node = registry.instantiate("Teleporter", "T1");
        assert_eq!(node.ty.as_ref(), "Teleporter");
        assert!(node.props.is_empty());
    }

    #[test]
    fn validate_checks_declared_kinds() {
        let registry = NodeRegistry::with_builtins();
        assert!(registry.validate("Node2D", "rotation", &Variant::Float(1.0)));
        assert!(registry.validate("Node2D", "rotation", &Variant::Int(1)));
        assert!(!registry.validate("Node2D", "position", &Variant::Bool(true)));
        // Undeclared fields stay dynamic.
        assert!(registry.validate("Node2D", "custom_flag", &Variant::Bool(true)));
    }

    #[test]
    fn custom_class_registration() {
        let mut registry = NodeRegistry::new();
        registry.register(NodeClass::new("Turret").field("range", 100.0).field("armed", true));
        let node = registry.instantiate("Turret", "T");
        assert_eq!(node.prop("range").and_then(|v| v.as_f64()), Some(100.0));
        assert_eq!(node.prop("armed").and_then(|v| v.as_bool()), Some(true));
    }
}
