//! Artifact kinds
//!
//! Every file a run produces has exactly one [`ArtifactKind`]. The kind fixes
//! the file's location relative to the run directory.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// Subdirectory of a run that holds the mesh and everything derived from it
pub const MESH_DIR: &str = "mesh";

/// Kind of a stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// Text-to-image output
    GeneratedImage,
    /// Image-to-mesh output, carries the original materials
    RawMesh,
    /// Skeleton predicted for the raw mesh
    SkeletonFbx,
    /// Skeleton plus skinning weights
    SkinnedFbx,
    /// Raw mesh geometry with the skin merged in
    MergedAsset,
    /// Merged asset with the raw mesh's materials transplanted back
    FinalColoredAsset,
}

impl ArtifactKind {
    /// All kinds in pipeline order
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::GeneratedImage,
        ArtifactKind::RawMesh,
        ArtifactKind::SkeletonFbx,
        ArtifactKind::SkinnedFbx,
        ArtifactKind::MergedAsset,
        ArtifactKind::FinalColoredAsset,
    ];

    /// Stable identifier
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::GeneratedImage => "generated-image",
            ArtifactKind::RawMesh => "raw-mesh",
            ArtifactKind::SkeletonFbx => "skeleton-fbx",
            ArtifactKind::SkinnedFbx => "skinned-fbx",
            ArtifactKind::MergedAsset => "merged-asset",
            ArtifactKind::FinalColoredAsset => "final-colored-asset",
        }
    }

    /// File name inside the run directory tree
    ///
    /// Mesh derivatives are siblings of the raw mesh, named by suffix.
    #[inline]
    #[must_use]
    pub const fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::GeneratedImage => "image.png",
            ArtifactKind::RawMesh => "model.glb",
            ArtifactKind::SkeletonFbx => "model_rigged.fbx",
            ArtifactKind::SkinnedFbx => "model_skinned.fbx",
            ArtifactKind::MergedAsset => "model_rigged.glb",
            ArtifactKind::FinalColoredAsset => "model_rigged_textured.glb",
        }
    }

    /// Path relative to the run directory
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        match self {
            ArtifactKind::GeneratedImage => PathBuf::from(self.file_name()),
            _ => PathBuf::from(MESH_DIR).join(self.file_name()),
        }
    }

    /// Whether the artifact is a binary scene container
    #[inline]
    #[must_use]
    pub const fn is_scene(&self) -> bool {
        matches!(
            self,
            ArtifactKind::RawMesh | ArtifactKind::MergedAsset | ArtifactKind::FinalColoredAsset
        )
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
