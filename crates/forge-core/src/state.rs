//! Per-run state machine
//!
//! ```text
//! Started -> ImageGenerated -> MeshGenerated -> SkeletonGenerated -> Skinned
//!         -> Merged -> [MaterialsReapplied] -> Done
//! ```
//!
//! `Failed(stage, cause)` is reachable from every non-terminal state.

use forge_artifact::{ArtifactKind, RunId};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// One pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Image,
    Mesh,
    Skeleton,
    Skin,
    Merge,
    Materials,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 6] = [
        Stage::Image,
        Stage::Mesh,
        Stage::Skeleton,
        Stage::Skin,
        Stage::Merge,
        Stage::Materials,
    ];

    /// Name used in logs and in failure messages
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Mesh => "mesh",
            Self::Skeleton => "skeleton",
            Self::Skin => "skin",
            Self::Merge => "merge",
            Self::Materials => "materials",
        }
    }

    /// Artifact kind the stage writes
    #[must_use]
    pub const fn produces(self) -> ArtifactKind {
        match self {
            Self::Image => ArtifactKind::GeneratedImage,
            Self::Mesh => ArtifactKind::RawMesh,
            Self::Skeleton => ArtifactKind::SkeletonFbx,
            Self::Skin => ArtifactKind::SkinnedFbx,
            Self::Merge => ArtifactKind::MergedAsset,
            Self::Materials => ArtifactKind::FinalColoredAsset,
        }
    }

    /// State reached when the stage succeeds
    #[must_use]
    pub const fn completed(self) -> RunState {
        match self {
            Self::Image => RunState::ImageGenerated,
            Self::Mesh => RunState::MeshGenerated,
            Self::Skeleton => RunState::SkeletonGenerated,
            Self::Skin => RunState::Skinned,
            Self::Merge => RunState::Merged,
            Self::Materials => RunState::MaterialsReapplied,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RunState {
    Started,
    ImageGenerated,
    MeshGenerated,
    SkeletonGenerated,
    Skinned,
    Merged,
    MaterialsReapplied,
    Done,
    Failed { stage: Stage, cause: String },
}

impl RunState {
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

/// Timing of one completed stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub output: PathBuf,
    pub elapsed_ms: u64,
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    /// Deliverable, as the store resolves it
    pub final_artifact: PathBuf,
    pub final_kind: ArtifactKind,
    pub state: RunState,
    /// Completed stages in order
    pub stages: Vec<StageRecord>,
}

impl RunReport {
    /// Total time spent in stages
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.stages.iter().map(|s| s.elapsed_ms).sum()
    }
}
