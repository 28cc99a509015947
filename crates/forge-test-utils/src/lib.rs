//! Testing utilities for the Rigforge workspace
//!
//! Shared fixtures: GLB scenes, a scripted stage executor, a stub image
//! model, and temporary stores.

#![allow(missing_docs)]

mod executor;
mod scene;

pub use executor::{ScriptedExecutor, StubImageModel, FBX_STUB, FIXTURE_TOPOLOGY};
pub use scene::{material_layout, rigged_mesh, textured_mesh, SceneBuilder, PNG_STUB};

use forge_artifact::ArtifactStore;
use forge_core::{ForgeConfig, Orchestrator, StageCatalog};
use std::sync::Arc;
use tempfile::TempDir;

/// Store rooted in a fresh temporary directory
pub fn temp_store() -> (TempDir, ArtifactStore) {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path().join("outputs"));
    (dir, store)
}

/// Config with storage under `dir` and tools launched on the host
pub fn test_config(dir: &TempDir) -> ForgeConfig {
    ForgeConfig::default()
        .with_storage_root(dir.path().join("outputs"))
        .with_host_environment()
}

/// Orchestrator wired to scripted collaborators
pub struct ScriptedPipeline {
    pub dir: TempDir,
    pub executor: Arc<ScriptedExecutor>,
    pub model: Arc<StubImageModel>,
    pub orchestrator: Arc<Orchestrator>,
}

impl ScriptedPipeline {
    pub fn new(executor: ScriptedExecutor) -> Self {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        Self::with_config(dir, config, executor, StubImageModel::new())
    }

    pub fn with_config(
        dir: TempDir,
        config: ForgeConfig,
        executor: ScriptedExecutor,
        model: StubImageModel,
    ) -> Self {
        let executor = Arc::new(executor);
        let model = Arc::new(model);
        let catalog = Arc::new(StageCatalog::from_config(&config));
        let orchestrator = Orchestrator::new(&config, catalog, model.clone())
            .with_executor(executor.clone());
        Self {
            dir,
            executor,
            model,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Number of run directories under the store root
    pub fn run_count(&self) -> usize {
        std::fs::read_dir(self.orchestrator.store().root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
