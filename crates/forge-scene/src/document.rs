//! glTF 2.0 JSON document model
//!
//! Only the lists that take part in a material transplant are typed. Every
//! other property (accessors, nodes, scenes, skins, animations, asset info,
//! extensions) is carried untouched in the `extra` map of the enclosing
//! object, so a load/save cycle never drops data it does not understand.
//!
//! Absent lists deserialize as empty and empty lists are not written back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level glTF document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions_used: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions_required: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffers: Vec<Buffer>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffer_views: Vec<BufferView>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,

    /// Samplers carry no cross-references and stay untyped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samplers: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub textures: Vec<Texture>,

    /// Materials reference textures through `*Texture.index` at any depth
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub materials: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meshes: Vec<Mesh>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Minimal valid document (`asset.version = "2.0"`)
    #[must_use]
    pub fn new() -> Self {
        let mut extra = Map::new();
        extra.insert("asset".to_string(), serde_json::json!({ "version": "2.0" }));
        Self {
            extra,
            ..Self::default()
        }
    }

    /// Untyped list stored under `key` (e.g. `accessors`)
    #[must_use]
    pub fn extra_list(&self, key: &str) -> &[Value] {
        self.extra
            .get(key)
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    /// Primitive count of each mesh, in order
    #[must_use]
    pub fn topology(&self) -> Vec<usize> {
        self.meshes.iter().map(|m| m.primitives.len()).collect()
    }
}

/// Raw byte blob
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffer {
    pub byte_length: usize,

    /// External or data URI; `None` means the GLB binary chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Byte range inside a buffer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    pub buffer: usize,

    #[serde(default)]
    pub byte_offset: usize,

    pub byte_length: usize,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BufferView {
    /// End offset, exclusive
    #[inline]
    #[must_use]
    pub fn end(&self) -> usize {
        self.byte_offset.saturating_add(self.byte_length)
    }
}

/// Image stored in a buffer view or behind a URI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_view: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sampler + image pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Texture {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampler: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<usize>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mesh {
    #[serde(default)]
    pub primitives: Vec<Primitive>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Primitive {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<usize>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Every texture index a material references, at any nesting depth
///
/// A texture reference is an object stored under a key ending in
/// `Texture`/`texture` that carries an integer `index` (core PBR slots and
/// extension slots alike).
#[must_use]
pub fn material_texture_refs(material: &Value) -> Vec<u64> {
    let mut refs = Vec::new();
    collect_texture_refs(material, &mut refs);
    refs
}

fn collect_texture_refs(value: &Value, refs: &mut Vec<u64>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key.ends_with("Texture") || key.ends_with("texture") {
                    if let Some(index) = child.get("index").and_then(Value::as_u64) {
                        refs.push(index);
                    }
                }
                collect_texture_refs(child, refs);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_texture_refs(item, refs)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_lists_are_empty() {
        let doc: Document = serde_json::from_value(json!({ "asset": { "version": "2.0" } })).unwrap();
        assert!(doc.buffers.is_empty());
        assert!(doc.materials.is_empty());
        assert!(doc.meshes.is_empty());
        assert_eq!(doc.extra["asset"]["version"], "2.0");
    }

    #[test]
    fn unknown_properties_survive() {
        let input = json!({
            "asset": { "version": "2.0", "generator": "unirig" },
            "accessors": [{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" }],
            "skins": [{ "joints": [0, 1] }],
            "meshes": [{ "name": "body", "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }] }],
            "bufferViews": [{ "buffer": 0, "byteLength": 36, "target": 34962 }]
        });
        let doc: Document = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(doc.meshes[0].primitives[0].material, Some(0));
        assert_eq!(doc.buffer_views[0].byte_offset, 0);
        assert_eq!(doc.extra_list("accessors").len(), 1);

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["skins"], input["skins"]);
        assert_eq!(back["meshes"][0]["name"], "body");
        assert_eq!(back["meshes"][0]["primitives"][0]["attributes"]["POSITION"], 0);
        assert_eq!(back["bufferViews"][0]["target"], 34962);
    }

    #[test]
    fn empty_lists_are_not_written() {
        let value = serde_json::to_value(Document::new()).unwrap();
        assert!(value.get("materials").is_none());
        assert!(value.get("extensionsUsed").is_none());
    }

    #[test]
    fn texture_refs_found_in_core_and_extension_slots() {
        let material = json!({
            "pbrMetallicRoughness": {
                "baseColorTexture": { "index": 0 },
                "metallicRoughnessTexture": { "index": 1, "texCoord": 0 }
            },
            "normalTexture": { "index": 2, "scale": 1.0 },
            "extensions": {
                "KHR_materials_clearcoat": { "clearcoatTexture": { "index": 3 } }
            },
            "name": "Texture"
        });
        let mut refs = material_texture_refs(&material);
        refs.sort_unstable();
        assert_eq!(refs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn topology_counts_primitives() {
        let doc = Document {
            meshes: vec![
                Mesh { primitives: vec![Primitive::default(); 2], ..Mesh::default() },
                Mesh::default(),
            ],
            ..Document::new()
        };
        assert_eq!(doc.topology(), vec![2, 0]);
    }
}
