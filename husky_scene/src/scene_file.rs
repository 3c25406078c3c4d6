use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("scene file is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("scene file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scene file has no root nodes")]
    NoRoots,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One serialized node record: `{name, type, properties, children[]}`.
/// A record with `source_path` set is a scene-instance record and
/// additionally carries `overrides`, `editable_children` and `instance_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, JsonValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SceneRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub overrides: IndexMap<String, JsonValue>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub editable_children: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<Uuid>,
}

impl SceneRecord {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            properties: IndexMap::new(),
            children: Vec::new(),
            source_path: None,
            overrides: IndexMap::new(),
            editable_children: false,
            instance_id: None,
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_child(mut self, child: SceneRecord) -> Self {
        self.children.push(child);
        self
    }

    /// Whether this record instances another scene.
    #[inline]
    pub fn is_instance(&self) -> bool {
        self.source_path.is_some()
    }

    /// Nodes in this record's subtree, itself included.
    pub fn subtree_len(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(SceneRecord::subtree_len)
            .sum::<usize>()
    }
}

/// A parsed scene file: a named, owned root set of node records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    pub name: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, JsonValue>,

    #[serde(default)]
    pub nodes: Vec<SceneRecord>,
}

impl SceneFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: IndexMap::new(),
            nodes: Vec::new(),
        }
    }

    pub fn with_root(mut self, record: SceneRecord) -> Self {
        self.nodes.push(record);
        self
    }

    /// Parse raw file bytes. A scene without any root record is malformed.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(bytes)?;
        let file: SceneFile = serde_json::from_str(text)?;
        if file.nodes.is_empty() {
            return Err(ParseError::NoRoots);
        }
        Ok(file)
    }

    pub fn to_vec_pretty(&self) -> Vec<u8> {
        serde_json::to_vec_pretty(self).unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(SceneRecord::subtree_len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn enemy_scene() -> SceneFile {
        SceneFile::new("Enemy").with_root(
            SceneRecord::new("Enemy", "Node2D")
                .with_prop("health", json!(100))
                .with_child(
                    SceneRecord::new("Sprite", "Sprite2D")
                        .with_prop("texture", json!("res://enemy.png")),
                ),
        )
    }

    #[test]
    fn roundtrip_plain_scene() {
        let scene = enemy_scene();
        let bytes = scene.to_vec_pretty();
        let parsed = SceneFile::from_slice(&bytes).unwrap();
        assert_eq!(parsed, scene);
        assert_eq!(parsed.node_count(), 2);
    }

    #[test]
    fn instance_record_fields_survive_roundtrip() {
        let id = Uuid::new_v4();
        let mut record = SceneRecord::new("Turret", "SceneInstance");
        record.source_path = Some("scenes/Turret.scene".to_string());
        record
            .overrides
            .insert("Barrel/length".to_string(), json!(2.5));
        record.editable_children = true;
        record.instance_id = Some(id);

        let scene = SceneFile::new("Tower").with_root(record);
        let parsed = SceneFile::from_slice(&scene.to_vec_pretty()).unwrap();
        let root = &parsed.nodes[0];
        assert!(root.is_instance());
        assert_eq!(root.source_path.as_deref(), Some("scenes/Turret.scene"));
        assert_eq!(root.overrides["Barrel/length"], json!(2.5));
        assert!(root.editable_children);
        assert_eq!(root.instance_id, Some(id));
    }

    #[test]
    fn optional_fields_are_omitted_when_empty() {
        let scene = SceneFile::new("Min").with_root(SceneRecord::new("Root", "Node"));
        let text = String::from_utf8(scene.to_vec_pretty()).unwrap();
        assert!(!text.contains("source_path"));
        assert!(!text.contains("overrides"));
        assert!(!text.contains("editable_children"));
    }

    #[test]
    fn malformed_files_fail_to_parse() {
        assert!(matches!(
            SceneFile::from_slice(b"not json"),
            Err(ParseError::Json(_))
        ));
        assert!(matches!(
            SceneFile::from_slice(b"{\"name\": \"Empty\", \"nodes\": []}"),
            Err(ParseError::NoRoots)
        ));
        assert!(matches!(
            SceneFile::from_slice(&[0xff, 0xfe]),
            Err(ParseError::Utf8(_) | ParseError::Json(_))
        ));
    }
}
