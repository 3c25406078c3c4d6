use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use husky_ids::NodeID;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::structs::{Color, Vector2, Vector3};

/// A closed, type-safe variant for node properties and instance overrides.
///
/// Scene files store properties as JSON; `from_json`/`to_json` give a lossless
/// round trip by encoding the non-JSON kinds as single-key tagged objects
/// (`{"$vec2": [x, y]}` and friends).
#[derive(Clone, Debug, PartialEq)]
pub enum Variant {
    Null,

    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),

    // Math primitives
    Vector2(Vector2),
    Vector3(Vector3),
    Color(Color),

    // Engine references
    NodeRef(NodeID),
    ScenePath(Arc<str>),

    // Containers
    Array(Vec<Variant>),
    // Deterministic ordering by default (better diffs, stable serialization).
    Object(BTreeMap<Arc<str>, Variant>),
}

/// Discriminant of a [`Variant`], used by node-class field schemas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Vector2,
    Vector3,
    Color,
    NodeRef,
    ScenePath,
    Array,
    Object,
}

impl Variant {
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Null => VariantKind::Null,
            Variant::Bool(_) => VariantKind::Bool,
            Variant::Int(_) => VariantKind::Int,
            Variant::Float(_) => VariantKind::Float,
            Variant::String(_) => VariantKind::String,
            Variant::Vector2(_) => VariantKind::Vector2,
            Variant::Vector3(_) => VariantKind::Vector3,
            Variant::Color(_) => VariantKind::Color,
            Variant::NodeRef(_) => VariantKind::NodeRef,
            Variant::ScenePath(_) => VariantKind::ScenePath,
            Variant::Array(_) => VariantKind::Array,
            Variant::Object(_) => VariantKind::Object,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric accessor; ints widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Int(v) => Some(*v as f64),
            Variant::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(v) => Some(v.as_ref()),
            _ => None,
        }
    }

    pub fn as_vector2(&self) -> Option<Vector2> {
        match self {
            Variant::Vector2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector3(&self) -> Option<Vector3> {
        match self {
            Variant::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Variant::Color(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_node_ref(&self) -> Option<NodeID> {
        match self {
            Variant::NodeRef(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_scene_path(&self) -> Option<&str> {
        match self {
            Variant::ScenePath(v) => Some(v.as_ref()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Variant::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<Arc<str>, Variant>> {
        match self {
            Variant::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Decode a JSON value. Tagged single-key objects become the typed kinds;
    /// everything else maps structurally.
    pub fn from_json(value: &JsonValue) -> Variant {
        match value {
            JsonValue::Null => Variant::Null,
            JsonValue::Bool(v) => Variant::Bool(*v),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Variant::Int(i)
                } else {
                    Variant::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Variant::String(Arc::from(s.as_str())),
            JsonValue::Array(items) => {
                Variant::Array(items.iter().map(Variant::from_json).collect())
            }
            JsonValue::Object(map) => {
                if let Some(tagged) = decode_tagged(map) {
                    return tagged;
                }
                Variant::Object(
                    map.iter()
                        .map(|(k, v)| (Arc::from(k.as_str()), Variant::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    /// Encode into JSON, inverse of [`Variant::from_json`].
    pub fn to_json(&self) -> JsonValue {
        match self {
            Variant::Null => JsonValue::Null,
            Variant::Bool(v) => JsonValue::Bool(*v),
            Variant::Int(v) => JsonValue::Number((*v).into()),
            Variant::Float(v) => JsonNumber::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Variant::String(v) => JsonValue::String(v.to_string()),
            Variant::Vector2(v) => tagged_array("$vec2", &[v.x as f64, v.y as f64]),
            Variant::Vector3(v) => {
                tagged_array("$vec3", &[v.x as f64, v.y as f64, v.z as f64])
            }
            Variant::Color(v) => tagged_array(
                "$rgba",
                &[v.r as f64, v.g as f64, v.b as f64, v.a as f64],
            ),
            Variant::NodeRef(id) => {
                let mut map = JsonMap::new();
                map.insert("$node".to_string(), JsonValue::Number(id.as_u64().into()));
                JsonValue::Object(map)
            }
            Variant::ScenePath(path) => {
                let mut map = JsonMap::new();
                map.insert("$scene".to_string(), JsonValue::String(path.to_string()));
                JsonValue::Object(map)
            }
            Variant::Array(items) => {
                JsonValue::Array(items.iter().map(Variant::to_json).collect())
            }
            Variant::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn tagged_array(tag: &str, values: &[f64]) -> JsonValue {
    let mut map = JsonMap::new();
    map.insert(
        tag.to_string(),
        JsonValue::Array(
            values
                .iter()
                .map(|v| {
                    JsonNumber::from_f64(*v)
                        .map(JsonValue::Number)
                        .unwrap_or(JsonValue::Null)
                })
                .collect(),
        ),
    );
    JsonValue::Object(map)
}

fn decode_tagged(map: &JsonMap<String, JsonValue>) -> Option<Variant> {
    if map.len() != 1 {
        return None;
    }
    let (key, value) = map.iter().next()?;
    match key.as_str() {
        "$vec2" => {
            let parts = number_array(value, 2)?;
            Some(Variant::Vector2(Vector2::new(
                parts[0] as f32,
                parts[1] as f32,
            )))
        }
        "$vec3" => {
            let parts = number_array(value, 3)?;
            Some(Variant::Vector3(Vector3::new(
                parts[0] as f32,
                parts[1] as f32,
                parts[2] as f32,
            )))
        }
        "$rgba" => {
            let parts = number_array(value, 4)?;
            Some(Variant::Color(Color::new(
                parts[0] as u8,
                parts[1] as u8,
                parts[2] as u8,
                parts[3] as u8,
            )))
        }
        "$node" => value.as_u64().map(|v| Variant::NodeRef(NodeID::from_u64(v))),
        "$scene" => value
            .as_str()
            .map(|s| Variant::ScenePath(Arc::from(s))),
        _ => None,
    }
}

fn number_array(value: &JsonValue, len: usize) -> Option<Vec<f64>> {
    let items = value.as_array()?;
    if items.len() != len {
        return None;
    }
    items.iter().map(|v| v.as_f64()).collect()
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => write!(f, "null"),
            Variant::Bool(v) => write!(f, "{v}"),
            Variant::Int(v) => write!(f, "{v}"),
            Variant::Float(v) => write!(f, "{v}"),
            Variant::String(v) => write!(f, "{:?}", v.as_ref()),
            Variant::Vector2(v) => write!(f, "({}, {})", v.x, v.y),
            Variant::Vector3(v) => write!(f, "({}, {}, {})", v.x, v.y, v.z),
            Variant::Color(v) => write!(f, "rgba({}, {}, {}, {})", v.r, v.g, v.b, v.a),
            Variant::NodeRef(id) => write!(f, "node:{id}"),
            Variant::ScenePath(path) => write!(f, "scene:{path}"),
            Variant::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Variant::Object(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(value as i64)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int(value)
    }
}

impl From<f32> for Variant {
    fn from(value: f32) -> Self {
        Variant::Float(value as f64)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Float(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(Arc::from(value))
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(Arc::from(value.as_str()))
    }
}

impl From<Vector2> for Variant {
    fn from(value: Vector2) -> Self {
        Variant::Vector2(value)
    }
}

impl From<Vector3> for Variant {
    fn from(value: Vector3) -> Self {
        Variant::Vector3(value)
    }
}

impl From<Color> for Variant {
    fn from(value: Color) -> Self {
        Variant::Color(value)
    }
}

impl From<NodeID> for Variant {
    fn from(value: NodeID) -> Self {
        Variant::NodeRef(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_roundtrip() {
        let cases = [
            Variant::Null,
            Variant::Bool(true),
            Variant::Int(42),
            Variant::Float(1.5),
            Variant::from("hello"),
        ];
        for case in cases {
            assert_eq!(Variant::from_json(&case.to_json()), case);
        }
    }

    #[test]
    fn json_integral_float_stays_float() {
        // "2.0" in a scene file must not collapse to Int(2).
        let value: JsonValue = serde_json::from_str("2.0").unwrap();
        assert_eq!(Variant::from_json(&value), Variant::Float(2.0));
    }

    #[test]
    fn json_tagged_kinds_roundtrip() {
        let cases = [
            Variant::Vector2(Vector2::new(1.0, 2.0)),
            Variant::Vector3(Vector3::new(1.0, 2.0, 3.0)),
            Variant::Color(Color::new(10, 20, 30, 255)),
            Variant::NodeRef(NodeID::from_parts(7, 3)),
            Variant::ScenePath(Arc::from("scenes/Enemy.scene")),
        ];
        for case in cases {
            assert_eq!(Variant::from_json(&case.to_json()), case);
        }
    }

    #[test]
    fn json_containers_roundtrip() {
        let v = Variant::from_json(&json!({
            "speed": 2.5,
            "tags": ["a", "b"],
            "spawn": {"$vec2": [4.0, 5.0]},
        }));
        let obj = v.as_object().unwrap();
        assert_eq!(obj["speed"], Variant::Float(2.5));
        assert_eq!(
            obj["spawn"],
            Variant::Vector2(Vector2::new(4.0, 5.0))
        );
        assert_eq!(Variant::from_json(&v.to_json()), v);
    }

    #[test]
    fn plain_object_is_not_mistaken_for_tag() {
        let v = Variant::from_json(&json!({"x": 1, "y": 2}));
        assert_eq!(v.kind(), VariantKind::Object);
    }

    #[test]
    fn numeric_accessor_widens_ints() {
        assert_eq!(Variant::Int(3).as_f64(), Some(3.0));
        assert_eq!(Variant::Float(3.5).as_i64(), None);
    }
}
