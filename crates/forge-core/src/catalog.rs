//! Stage descriptors, declared once at start-up

use crate::config::ForgeConfig;
use crate::state::Stage;
use forge_artifact::ArtifactKind;
use forge_tools::{CondaEnvironment, HostEnvironment, StageDescriptor, ToolEnvironment};
use std::sync::Arc;

/// Parameter names bound by the orchestrator
pub mod params {
    pub const PROMPT: &str = "prompt";
    pub const SEED: &str = "seed";
    pub const STEPS: &str = "steps";
    pub const GUIDANCE: &str = "guidance";
    pub const MAX_SEQUENCE_LENGTH: &str = "max_sequence_length";
}

/// The external tools of the pipeline
///
/// The material stage is in-process and has no descriptor.
#[derive(Debug, Clone)]
pub struct StageCatalog {
    pub image: StageDescriptor,
    pub mesh: StageDescriptor,
    pub skeleton: StageDescriptor,
    pub skin: StageDescriptor,
    pub merge: StageDescriptor,
}

impl StageCatalog {
    /// Build every descriptor from `config`
    #[must_use]
    pub fn from_config(config: &ForgeConfig) -> Self {
        let env = &config.environment;
        let environment: Arc<dyn ToolEnvironment> = if env.use_conda {
            Arc::new(CondaEnvironment::new(
                env.shell.clone(),
                env.activate_script.clone(),
                env.env_name.clone(),
            ))
        } else {
            Arc::new(HostEnvironment::new())
        };
        let tools = &config.tools;

        let image = StageDescriptor::new(
            Stage::Image.as_str(),
            tools.image_root.clone(),
            tools.image_entry.clone(),
            Arc::clone(&environment),
        )
        .runner(env.python.clone())
        .param("--prompt", params::PROMPT)
        .output("--output", ArtifactKind::GeneratedImage)
        .param("--seed", params::SEED)
        .param("--steps", params::STEPS)
        .param("--guidance", params::GUIDANCE)
        .param("--max-sequence-length", params::MAX_SEQUENCE_LENGTH);

        let mesh = StageDescriptor::new(
            Stage::Mesh.as_str(),
            tools.mesh_root.clone(),
            tools.mesh_entry.clone(),
            Arc::clone(&environment),
        )
        .runner(env.python.clone())
        .input("--image", ArtifactKind::GeneratedImage)
        .output("--output", ArtifactKind::RawMesh);

        let skeleton = StageDescriptor::new(
            Stage::Skeleton.as_str(),
            tools.rig_root.clone(),
            tools.skeleton_entry.clone(),
            Arc::clone(&environment),
        )
        .runner(env.bash.clone())
        .input("--input", ArtifactKind::RawMesh)
        .output("--output", ArtifactKind::SkeletonFbx)
        .param("--seed", params::SEED);

        let skin = StageDescriptor::new(
            Stage::Skin.as_str(),
            tools.rig_root.clone(),
            tools.skin_entry.clone(),
            Arc::clone(&environment),
        )
        .runner(env.bash.clone())
        .input("--input", ArtifactKind::SkeletonFbx)
        .output("--output", ArtifactKind::SkinnedFbx);

        let merge = StageDescriptor::new(
            Stage::Merge.as_str(),
            tools.rig_root.clone(),
            tools.merge_entry.clone(),
            environment,
        )
        .runner(env.bash.clone())
        .input("--source", ArtifactKind::SkinnedFbx)
        .input("--target", ArtifactKind::RawMesh)
        .output("--output", ArtifactKind::MergedAsset);

        Self {
            image,
            mesh,
            skeleton,
            skin,
            merge,
        }
    }

    /// Descriptor of an external stage
    #[must_use]
    pub fn descriptor(&self, stage: Stage) -> Option<&StageDescriptor> {
        match stage {
            Stage::Image => Some(&self.image),
            Stage::Mesh => Some(&self.mesh),
            Stage::Skeleton => Some(&self.skeleton),
            Stage::Skin => Some(&self.skin),
            Stage::Merge => Some(&self.merge),
            Stage::Materials => None,
        }
    }

    /// All descriptors in execution order
    pub fn iter(&self) -> impl Iterator<Item = &StageDescriptor> + '_ {
        Stage::ALL.into_iter().filter_map(|stage| self.descriptor(stage))
    }
}
