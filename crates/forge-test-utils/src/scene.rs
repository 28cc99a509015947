//! GLB fixtures

use forge_scene::{Buffer, BufferView, Document, Image, Mesh, Primitive, SceneContainer, Texture};
use serde_json::{json, Value};

/// First bytes of a PNG file
pub const PNG_STUB: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRstub";

/// Builds small but structurally complete scenes
#[derive(Debug, Clone)]
pub struct SceneBuilder {
    document: Document,
    bin: Vec<u8>,
    accessors: Vec<Value>,
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self {
            document: Document::new(),
            bin: Vec::new(),
            accessors: Vec::new(),
        }
    }

    fn push_view(&mut self, bytes: &[u8]) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        self.document.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset: self.bin.len(),
            byte_length: bytes.len(),
            ..BufferView::default()
        });
        self.bin.extend_from_slice(bytes);
        self.document.buffer_views.len() - 1
    }

    fn push_positions(&mut self, seed: u8) -> usize {
        // One triangle, three VEC3 floats
        let positions: Vec<u8> = (0..36u8).map(|b| b.wrapping_add(seed)).collect();
        let view = self.push_view(&positions);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3"
        }));
        self.accessors.len() - 1
    }

    /// Add a mesh with one primitive per entry of `materials`
    pub fn mesh(mut self, materials: &[Option<usize>]) -> Self {
        let mut primitives = Vec::with_capacity(materials.len());
        for (i, &material) in materials.iter().enumerate() {
            let accessor = self.push_positions(i as u8);
            let mut extra = serde_json::Map::new();
            extra.insert("attributes".into(), json!({ "POSITION": accessor }));
            primitives.push(Primitive { material, extra });
        }
        self.document.meshes.push(Mesh {
            primitives,
            ..Mesh::default()
        });
        self
    }

    /// Add a material whose base color comes from an embedded PNG
    pub fn textured_material(mut self, name: &str) -> Self {
        if self.document.samplers.is_empty() {
            self.document
                .samplers
                .push(json!({ "magFilter": 9729, "minFilter": 9987 }));
        }
        let view = self.push_view(PNG_STUB);
        self.document.images.push(Image {
            buffer_view: Some(view),
            mime_type: Some("image/png".into()),
            ..Image::default()
        });
        self.document.textures.push(Texture {
            sampler: Some(0),
            source: Some(self.document.images.len() - 1),
            ..Texture::default()
        });
        let texture = self.document.textures.len() - 1;
        self.document.materials.push(json!({
            "name": name,
            "pbrMetallicRoughness": {
                "baseColorTexture": { "index": texture },
                "metallicFactor": 0.0
            }
        }));
        self
    }

    /// Add a material with a constant color
    pub fn plain_material(mut self, name: &str) -> Self {
        self.document.materials.push(json!({
            "name": name,
            "pbrMetallicRoughness": { "baseColorFactor": [0.8, 0.1, 0.1, 1.0] }
        }));
        self
    }

    /// Declare an extension as used
    pub fn extension(mut self, name: &str) -> Self {
        self.document.extensions_used.push(name.to_string());
        self
    }

    /// Add a skin with joint data, as the rigging tools emit
    pub fn skin(mut self, joints: usize) -> Self {
        let matrices = vec![0u8; joints * 64];
        let view = self.push_view(&matrices);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": 5126,
            "count": joints,
            "type": "MAT4"
        }));
        let accessor = self.accessors.len() - 1;
        self.document.extra.insert(
            "skins".into(),
            json!([{ "inverseBindMatrices": accessor, "joints": (0..joints).collect::<Vec<_>>() }]),
        );
        self
    }

    pub fn build(mut self) -> SceneContainer {
        if !self.accessors.is_empty() {
            self.document
                .extra
                .insert("accessors".into(), Value::Array(self.accessors));
        }
        let buffers = if self.document.buffer_views.is_empty() {
            Vec::new()
        } else {
            self.document.buffers.push(Buffer {
                byte_length: self.bin.len(),
                ..Buffer::default()
            });
            vec![self.bin]
        };
        SceneContainer::new(self.document, buffers)
    }

    pub fn to_glb(self) -> Vec<u8> {
        self.build().to_bytes().expect("fixture scene encodes")
    }
}

/// Generated mesh: two textured materials, primitive `i` uses material `i % 2`
pub fn textured_mesh(topology: &[usize]) -> SceneContainer {
    let mut builder = SceneBuilder::new()
        .textured_material("body")
        .textured_material("trim");
    for &count in topology {
        let materials: Vec<_> = (0..count).map(|i| Some(i % 2)).collect();
        builder = builder.mesh(&materials);
    }
    builder.build()
}

/// Rigged mesh as the merge tool writes it: same layout, no shading
pub fn rigged_mesh(topology: &[usize]) -> SceneContainer {
    let mut builder = SceneBuilder::new();
    for &count in topology {
        builder = builder.mesh(&vec![None; count]);
    }
    builder.skin(4).build()
}

/// Material index of every primitive, per mesh
pub fn material_layout(scene: &SceneContainer) -> Vec<Vec<Option<usize>>> {
    scene
        .document
        .meshes
        .iter()
        .map(|mesh| mesh.primitives.iter().map(|p| p.material).collect())
        .collect()
}
