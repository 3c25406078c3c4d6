use serde_json::Value as JsonValue;

use crate::scene_file::{SceneFile, SceneRecord};

/// Lightweight dependency information for one scene file, computable without
/// materializing any node tree. Used for preflight validation and the
/// dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneMetadata {
    pub path: String,
    /// Referenced scene paths, in discovery order, deduplicated.
    pub references: Vec<String>,
    pub node_count: usize,
    /// Coarse cost proxy: node count plus a quarter of the property count.
    pub complexity: usize,
    pub modified_stamp: Option<u64>,
}

impl SceneMetadata {
    /// Scan a parsed scene for embedded scene references: instance records
    /// (`source_path`) and `{"$scene": ...}` property values.
    pub fn scan(path: &str, file: &SceneFile, modified_stamp: Option<u64>) -> Self {
        let mut references = Vec::new();
        let mut node_count = 0;
        let mut prop_count = 0;

        for record in &file.nodes {
            scan_record(record, &mut references, &mut node_count, &mut prop_count);
        }

        Self {
            path: path.to_string(),
            references,
            node_count,
            complexity: node_count + prop_count / 4,
            modified_stamp,
        }
    }

    pub fn references_scene(&self, path: &str) -> bool {
        self.references.iter().any(|r| r == path)
    }
}

fn scan_record(
    record: &SceneRecord,
    references: &mut Vec<String>,
    node_count: &mut usize,
    prop_count: &mut usize,
) {
    *node_count += 1;
    *prop_count += record.properties.len();

    if let Some(source) = &record.source_path {
        push_unique(references, source);
    }
    for value in record.properties.values() {
        scan_value(value, references);
    }

    for child in &record.children {
        scan_record(child, references, node_count, prop_count);
    }
}

fn scan_value(value: &JsonValue, references: &mut Vec<String>) {
    match value {
        JsonValue::Object(map) => {
            if map.len() == 1 {
                if let Some(JsonValue::String(path)) = map.get("$scene") {
                    push_unique(references, path);
                    return;
                }
            }
            for nested in map.values() {
                scan_value(nested, references);
            }
        }
        JsonValue::Array(items) => {
            for nested in items {
                scan_value(nested, references);
            }
        }
        _ => {}
    }
}

fn push_unique(references: &mut Vec<String>, path: &str) {
    if !references.iter().any(|r| r == path) {
        references.push(path.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scan_collects_instance_references() {
        let mut turret = SceneRecord::new("Turret", "SceneInstance");
        turret.source_path = Some("scenes/Turret.scene".to_string());

        let file = SceneFile::new("Level").with_root(
            SceneRecord::new("Level", "Node2D")
                .with_prop("music", json!("res://theme.ogg"))
                .with_child(turret)
                .with_child(
                    SceneRecord::new("Spawner", "Node")
                        .with_prop("bullet", json!({"$scene": "scenes/Bullet.scene"})),
                ),
        );

        let meta = SceneMetadata::scan("scenes/Level.scene", &file, Some(7));
        assert_eq!(
            meta.references,
            vec!["scenes/Turret.scene", "scenes/Bullet.scene"]
        );
        assert_eq!(meta.node_count, 3);
        assert!(meta.references_scene("scenes/Turret.scene"));
        assert_eq!(meta.modified_stamp, Some(7));
    }

    #[test]
    fn duplicate_references_are_collapsed() {
        let mut a = SceneRecord::new("A", "SceneInstance");
        a.source_path = Some("scenes/Shared.scene".to_string());
        let mut b = SceneRecord::new("B", "SceneInstance");
        b.source_path = Some("scenes/Shared.scene".to_string());

        let file = SceneFile::new("Pair")
            .with_root(SceneRecord::new("Root", "Node").with_child(a).with_child(b));
        let meta = SceneMetadata::scan("scenes/Pair.scene", &file, None);
        assert_eq!(meta.references, vec!["scenes/Shared.scene"]);
    }

    #[test]
    fn complexity_grows_with_properties() {
        let mut rich = SceneRecord::new("Rich", "Node");
        for i in 0..8 {
            rich.properties.insert(format!("p{i}"), json!(i));
        }
        let file = SceneFile::new("Rich").with_root(rich);
        let meta = SceneMetadata::scan("scenes/Rich.scene", &file, None);
        assert_eq!(meta.node_count, 1);
        assert_eq!(meta.complexity, 1 + 8 / 4);
    }
}
