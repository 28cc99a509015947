//! Material transplant between scene containers
//!
//! The rigging tools emit a geometry-correct asset that has lost its
//! shading. The mesh that went into them still carries it. The transplant
//! copies shading from that source onto the rigged target:
//!
//! 1. Samplers, images, textures and materials of the target are replaced
//!    wholesale by the source's.
//! 2. Source buffer views are appended after the target's, with their buffer
//!    index shifted by the target's buffer count. Source images are shifted
//!    by the target's view count. Source buffers are appended last.
//! 3. Each target primitive takes the material of the source primitive at
//!    the same (mesh, primitive) position, when that source primitive has one.
//!    Positions only the target has keep their reference.
//! 4. References still out of range after matching are cleared.
//!
//! Every index is validated before the result is handed back.

use crate::document::{material_texture_refs, Document};
use crate::error::{MergeError, Role, SceneError};
use crate::glb::{write_atomic, SceneContainer};
use std::fs;
use std::path::Path;

/// What a transplant did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransplantReport {
    /// Source had no materials; target passed through unchanged
    pub passthrough: bool,
    pub materials: usize,
    pub textures: usize,
    pub images: usize,
    pub appended_views: usize,
    pub appended_buffers: usize,
    /// Target primitives that received a source material
    pub matched_primitives: usize,
    /// Target primitives whose stale reference was dropped
    pub cleared_primitives: usize,
    /// Mesh or primitive counts differ between source and target
    pub topology_mismatch: bool,
}

/// Transplant materials from `source` onto `target`
///
/// # Errors
/// Returns `MergeError::DanglingReference` or `MergeError::ViewOutOfRange`
/// if the merged structure would not be index-safe.
pub fn transplant_materials(
    source: &SceneContainer,
    mut target: SceneContainer,
) -> Result<(SceneContainer, TransplantReport), MergeError> {
    let src = &source.document;
    if src.materials.is_empty() {
        return Ok((
            target,
            TransplantReport {
                passthrough: true,
                ..TransplantReport::default()
            },
        ));
    }

    let view_offset = target.document.buffer_views.len();
    let buffer_offset = target.document.buffers.len();
    let doc = &mut target.document;

    doc.samplers = src.samplers.clone();
    doc.textures = src.textures.clone();
    doc.materials = src.materials.clone();
    doc.images = src
        .images
        .iter()
        .cloned()
        .map(|mut image| {
            if let Some(view) = image.buffer_view.as_mut() {
                *view += view_offset;
            }
            image
        })
        .collect();

    doc.buffer_views.extend(src.buffer_views.iter().cloned().map(|mut view| {
        view.buffer += buffer_offset;
        view
    }));
    doc.buffers.extend(src.buffers.iter().cloned());
    target.buffers.extend(source.buffers.iter().cloned());

    union_into(&mut doc.extensions_used, &src.extensions_used);
    union_into(&mut doc.extensions_required, &src.extensions_required);

    let topology_mismatch = src.topology() != doc.topology();
    if topology_mismatch {
        tracing::warn!(
            source = ?src.topology(),
            target = ?doc.topology(),
            "mesh topology differs, matching materials by position where both exist"
        );
    }

    let mut matched_primitives = 0;
    for (m, mesh) in doc.meshes.iter_mut().enumerate() {
        for (p, primitive) in mesh.primitives.iter_mut().enumerate() {
            let donor = src
                .meshes
                .get(m)
                .and_then(|mesh| mesh.primitives.get(p))
                .and_then(|primitive| primitive.material);
            if let Some(material) = donor {
                primitive.material = Some(material);
                matched_primitives += 1;
            }
        }
    }

    let material_count = doc.materials.len();
    let mut cleared_primitives = 0;
    for (m, mesh) in doc.meshes.iter_mut().enumerate() {
        for (p, primitive) in mesh.primitives.iter_mut().enumerate() {
            if let Some(material) = primitive.material.filter(|&i| i >= material_count) {
                tracing::warn!(
                    mesh = m,
                    primitive = p,
                    material,
                    materials = material_count,
                    "dropping dangling material reference"
                );
                primitive.material = None;
                cleared_primitives += 1;
            }
        }
    }

    let report = TransplantReport {
        passthrough: false,
        materials: doc.materials.len(),
        textures: doc.textures.len(),
        images: doc.images.len(),
        appended_views: src.buffer_views.len(),
        appended_buffers: src.buffers.len(),
        matched_primitives,
        cleared_primitives,
        topology_mismatch,
    };

    validate_indices(&target)?;
    Ok((target, report))
}

/// Load `source` and `target`, transplant, and write the result to `output`
///
/// When the source has no materials the target file is copied byte for byte.
/// The output is encoded in memory and renamed into place, so a failure
/// never leaves a partial file behind.
///
/// # Errors
/// Returns `MergeError::Load` for unreadable inputs, a structural error if
/// the result would not be index-safe, and `MergeError::Save` on write failure.
pub fn transplant_file(
    source: &Path,
    target: &Path,
    output: &Path,
) -> Result<TransplantReport, MergeError> {
    let source_scene = SceneContainer::read(source).map_err(|e| MergeError::Load {
        role: Role::Source,
        source: e,
    })?;
    let target_bytes = fs::read(target).map_err(|e| MergeError::Load {
        role: Role::Target,
        source: SceneError::Io {
            path: target.to_path_buf(),
            source: e,
        },
    })?;

    if source_scene.document.materials.is_empty() {
        tracing::info!(source = %source.display(), "source has no materials, copying target");
        write_atomic(output, &target_bytes).map_err(MergeError::Save)?;
        return Ok(TransplantReport {
            passthrough: true,
            ..TransplantReport::default()
        });
    }

    let target_scene = SceneContainer::from_slice(&target_bytes).map_err(|e| MergeError::Load {
        role: Role::Target,
        source: e,
    })?;
    let (merged, report) = transplant_materials(&source_scene, target_scene)?;
    let bytes = merged.to_bytes().map_err(MergeError::Save)?;
    write_atomic(output, &bytes).map_err(MergeError::Save)?;

    tracing::info!(
        output = %output.display(),
        materials = report.materials,
        matched = report.matched_primitives,
        cleared = report.cleared_primitives,
        "materials transplanted"
    );
    Ok(report)
}

/// Check every cross-list index of `scene`
///
/// Covers buffer view → buffer (including byte range), accessor → buffer
/// view, image → buffer view, texture → sampler and image, material →
/// texture, and primitive → material.
///
/// # Errors
/// Returns the first violation found.
pub fn validate_indices(scene: &SceneContainer) -> Result<(), MergeError> {
    let doc: &Document = &scene.document;

    for (i, view) in doc.buffer_views.iter().enumerate() {
        check(view.buffer, doc.buffers.len(), "buffers", || format!("buffer view {i}"))?;
        let len = scene
            .buffers
            .get(view.buffer)
            .map_or(doc.buffers[view.buffer].byte_length, Vec::len);
        if view.end() > len {
            return Err(MergeError::ViewOutOfRange {
                view: i,
                buffer: view.buffer,
                end: view.end(),
                len,
            });
        }
    }

    for (i, accessor) in doc.extra_list("accessors").iter().enumerate() {
        if let Some(view) = accessor.get("bufferView").and_then(serde_json::Value::as_u64) {
            check_u64(view, doc.buffer_views.len(), "bufferViews", || format!("accessor {i}"))?;
        }
    }

    for (i, image) in doc.images.iter().enumerate() {
        if let Some(view) = image.buffer_view {
            check(view, doc.buffer_views.len(), "bufferViews", || format!("image {i}"))?;
        }
    }

    for (i, texture) in doc.textures.iter().enumerate() {
        if let Some(sampler) = texture.sampler {
            check(sampler, doc.samplers.len(), "samplers", || format!("texture {i}"))?;
        }
        if let Some(image) = texture.source {
            check(image, doc.images.len(), "images", || format!("texture {i}"))?;
        }
    }

    for (i, material) in doc.materials.iter().enumerate() {
        for texture in material_texture_refs(material) {
            check_u64(texture, doc.textures.len(), "textures", || format!("material {i}"))?;
        }
    }

    for (m, mesh) in doc.meshes.iter().enumerate() {
        for (p, primitive) in mesh.primitives.iter().enumerate() {
            if let Some(material) = primitive.material {
                check(material, doc.materials.len(), "materials", || {
                    format!("primitive {p} of mesh {m}")
                })?;
            }
        }
    }

    Ok(())
}

fn check(
    index: usize,
    len: usize,
    list: &'static str,
    from: impl FnOnce() -> String,
) -> Result<(), MergeError> {
    if index < len {
        Ok(())
    } else {
        Err(MergeError::DanglingReference {
            from: from(),
            list,
            index,
            len,
        })
    }
}

fn check_u64(
    index: u64,
    len: usize,
    list: &'static str,
    from: impl FnOnce() -> String,
) -> Result<(), MergeError> {
    check(usize::try_from(index).unwrap_or(usize::MAX), len, list, from)
}

fn union_into(into: &mut Vec<String>, from: &[String]) {
    for name in from {
        if !into.contains(name) {
            into.push(name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Buffer, BufferView, Image, Mesh, Primitive, Texture};
    use serde_json::json;

    fn view(buffer: usize, byte_offset: usize, byte_length: usize) -> BufferView {
        BufferView {
            buffer,
            byte_offset,
            byte_length,
            ..BufferView::default()
        }
    }

    fn mesh(materials: &[Option<usize>]) -> Mesh {
        Mesh {
            primitives: materials
                .iter()
                .map(|&material| Primitive {
                    material,
                    ..Primitive::default()
                })
                .collect(),
            ..Mesh::default()
        }
    }

    /// Geometry in view 0, texture image in view 1, two materials
    fn textured_source() -> SceneContainer {
        let mut doc = Document::new();
        doc.buffers.push(Buffer { byte_length: 16, ..Buffer::default() });
        doc.buffer_views = vec![view(0, 0, 8), view(0, 8, 8)];
        doc.images.push(Image {
            buffer_view: Some(1),
            mime_type: Some("image/png".into()),
            ..Image::default()
        });
        doc.samplers.push(json!({ "magFilter": 9729 }));
        doc.textures.push(Texture {
            sampler: Some(0),
            source: Some(0),
            ..Texture::default()
        });
        doc.materials = vec![
            json!({ "name": "body", "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } }),
            json!({ "name": "trim" }),
        ];
        doc.meshes = vec![mesh(&[Some(0), Some(1)]), mesh(&[Some(1)])];
        doc.extensions_used = vec!["KHR_materials_unlit".into()];
        SceneContainer::new(doc, vec![vec![7; 16]])
    }

    /// Rigged geometry in views 0..3, no shading
    fn rigged_target() -> SceneContainer {
        let mut doc = Document::new();
        doc.buffers.push(Buffer { byte_length: 24, ..Buffer::default() });
        doc.buffer_views = vec![view(0, 0, 8), view(0, 8, 8), view(0, 16, 8)];
        doc.meshes = vec![mesh(&[None, None]), mesh(&[None])];
        doc.extensions_used = vec!["KHR_materials_unlit".into(), "EXT_skin".into()];
        SceneContainer::new(doc, vec![vec![1; 24]])
    }

    #[test]
    fn zero_material_source_passes_target_through() {
        let mut source = textured_source();
        source.document.materials.clear();
        let target = rigged_target();

        let (merged, report) = transplant_materials(&source, target.clone()).unwrap();
        assert!(report.passthrough);
        assert_eq!(merged, target);
    }

    #[test]
    fn offsets_are_applied_to_appended_entries() {
        let (merged, report) = transplant_materials(&textured_source(), rigged_target()).unwrap();
        let doc = &merged.document;

        assert_eq!(doc.buffer_views.len(), 5);
        assert_eq!(doc.buffer_views[3].buffer, 1);
        assert_eq!(doc.buffer_views[4].byte_offset, 8);
        assert_eq!(doc.images[0].buffer_view, Some(4));
        assert_eq!(doc.buffers.len(), 2);
        assert_eq!(merged.buffers[1], vec![7; 16]);

        assert_eq!(report.appended_views, 2);
        assert_eq!(report.appended_buffers, 1);
        assert_eq!(report.matched_primitives, 3);
        assert!(!report.topology_mismatch);
    }

    #[test]
    fn donor_materials_follow_position() {
        let (merged, _) = transplant_materials(&textured_source(), rigged_target()).unwrap();
        let materials: Vec<Vec<Option<usize>>> = merged
            .document
            .meshes
            .iter()
            .map(|m| m.primitives.iter().map(|p| p.material).collect())
            .collect();
        assert_eq!(materials, vec![vec![Some(0), Some(1)], vec![Some(1)]]);
    }

    #[test]
    fn extra_target_primitives_keep_valid_refs_and_lose_dangling_ones() {
        let mut target = rigged_target();
        target.document.meshes.push(mesh(&[Some(1), Some(5)]));

        let (merged, report) = transplant_materials(&textured_source(), target).unwrap();
        let extra = &merged.document.meshes[2].primitives;
        assert_eq!(extra[0].material, Some(1));
        assert_eq!(extra[1].material, None);
        assert!(report.topology_mismatch);
        assert_eq!(report.cleared_primitives, 1);
    }

    #[test]
    fn extensions_are_unioned_in_order() {
        let mut source = textured_source();
        source.document.extensions_used.push("KHR_texture_transform".into());
        source.document.extensions_required.push("KHR_texture_transform".into());

        let (merged, _) = transplant_materials(&source, rigged_target()).unwrap();
        assert_eq!(
            merged.document.extensions_used,
            vec!["KHR_materials_unlit", "EXT_skin", "KHR_texture_transform"]
        );
        assert_eq!(merged.document.extensions_required, vec!["KHR_texture_transform"]);
    }

    #[test]
    fn broken_source_is_rejected_before_output() {
        let mut source = textured_source();
        source.document.textures[0].source = Some(3);
        let err = transplant_materials(&source, rigged_target()).unwrap_err();
        assert!(matches!(
            err,
            MergeError::DanglingReference { list: "images", index: 3, .. }
        ));
    }

    #[test]
    fn validate_checks_view_ranges_and_accessors() {
        let mut scene = rigged_target();
        scene.document.buffer_views[2].byte_length = 9;
        assert!(matches!(
            validate_indices(&scene),
            Err(MergeError::ViewOutOfRange { view: 2, end: 25, len: 24, .. })
        ));

        let mut scene = rigged_target();
        scene
            .document
            .extra
            .insert("accessors".into(), json!([{ "bufferView": 3, "count": 1 }]));
        assert!(matches!(
            validate_indices(&scene),
            Err(MergeError::DanglingReference { list: "bufferViews", index: 3, .. })
        ));
    }

    #[test]
    fn material_texture_refs_are_validated() {
        let mut scene = textured_source();
        scene.document.materials[1] = json!({ "normalTexture": { "index": 1 } });
        assert!(matches!(
            validate_indices(&scene),
            Err(MergeError::DanglingReference { list: "textures", index: 1, .. })
        ));
    }
}
