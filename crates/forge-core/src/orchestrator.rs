//! Pipeline orchestrator
//!
//! Runs one request through every stage in order. Each stage reads the
//! previous stage's artifact from the store and must leave its own artifact
//! there before the next stage starts. The first failure ends the run; the
//! artifacts already written stay on disk.

use crate::catalog::{params, StageCatalog};
use crate::config::{ForgeConfig, ImageParams};
use crate::error::{ModelError, PipelineError, StageError};
use crate::model::{ImageRequest, TextToImage};
use crate::prompt::PromptTemplate;
use crate::state::{RunReport, RunState, Stage, StageRecord};
use forge_artifact::{ArtifactKind, ArtifactStore, RunId};
use forge_tools::{Bindings, StageDescriptor, StageExecutor, ToolInvoker};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Sequences the stages of a run
pub struct Orchestrator {
    store: ArtifactStore,
    catalog: Arc<StageCatalog>,
    executor: Arc<dyn StageExecutor>,
    image_model: Arc<dyn TextToImage>,
    prompt: PromptTemplate,
    image_params: ImageParams,
    rig_seed: u64,
    reapply_materials: bool,
}

impl Orchestrator {
    /// Orchestrator that launches real tools through [`ToolInvoker`]
    #[must_use]
    pub fn new(
        config: &ForgeConfig,
        catalog: Arc<StageCatalog>,
        image_model: Arc<dyn TextToImage>,
    ) -> Self {
        Self {
            store: ArtifactStore::new(config.storage_root.clone()),
            catalog,
            executor: Arc::new(ToolInvoker::new()),
            image_model,
            prompt: PromptTemplate::new(config.prompt_prefix.clone()),
            image_params: config.image,
            rig_seed: config.rig_seed,
            reapply_materials: config.reapply_materials,
        }
    }

    /// Replace the stage executor
    #[inline]
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn StageExecutor>) -> Self {
        self.executor = executor;
        self
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    /// Run the whole pipeline for `prompt`
    ///
    /// # Errors
    /// Returns `PipelineError::EmptyPrompt` before anything starts for a
    /// blank prompt, `PipelineError::Storage` if no run can be allocated,
    /// and `PipelineError::Stage` naming the first stage that failed.
    pub async fn generate(&self, prompt: &str) -> Result<RunReport, PipelineError> {
        let prompt = self.prompt.render(prompt)?;
        let run = self.store.allocate_run().map_err(PipelineError::Storage)?;
        tracing::info!(run = %run, state = ?RunState::Started, "run started");

        match self.run_stages(run, prompt).await {
            Ok(report) => {
                tracing::info!(
                    run = %run,
                    artifact = %report.final_artifact.display(),
                    elapsed_ms = report.elapsed_ms(),
                    "run finished"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(run = %run, state = ?e.state(), error = %e, "run failed");
                Err(e)
            }
        }
    }

    async fn run_stages(&self, run: RunId, prompt: String) -> Result<RunReport, PipelineError> {
        let mut stages = Vec::with_capacity(Stage::ALL.len());
        let catalog = &self.catalog;

        let request = ImageRequest {
            prompt,
            params: self.image_params,
        };
        stages.push(self.image_stage(run, &request).await?);

        stages.push(self.tool_stage(run, Stage::Mesh, &catalog.mesh, self.bind(run, &catalog.mesh)).await?);

        let skeleton = self.bind(run, &catalog.skeleton).with_param(params::SEED, self.rig_seed);
        stages.push(self.tool_stage(run, Stage::Skeleton, &catalog.skeleton, skeleton).await?);

        stages.push(self.tool_stage(run, Stage::Skin, &catalog.skin, self.bind(run, &catalog.skin)).await?);

        stages.push(self.tool_stage(run, Stage::Merge, &catalog.merge, self.bind(run, &catalog.merge)).await?);

        if self.reapply_materials {
            stages.push(self.material_stage(run).await?);
        }

        let last = stages.last().map_or(Stage::Merge, |record| record.stage);
        let resolved = self
            .store
            .resolve_final(&run.to_string())
            .map_err(|e| PipelineError::in_stage(run, last, e))?;

        Ok(RunReport {
            run_id: run,
            final_artifact: resolved.path,
            final_kind: resolved.kind,
            state: RunState::Done,
            stages,
        })
    }

    fn bind(&self, run: RunId, descriptor: &StageDescriptor) -> Bindings {
        Bindings::for_run(&self.store, run, descriptor)
    }

    async fn image_stage(&self, run: RunId, request: &ImageRequest) -> Result<StageRecord, PipelineError> {
        let stage = Stage::Image;
        let output = self.store.path_for(run, ArtifactKind::GeneratedImage);
        tracing::info!(run = %run, stage = %stage, "stage started");
        let start = Instant::now();

        self.image_model
            .generate(request, &output)
            .await
            .map_err(|e| PipelineError::in_stage(run, stage, e))?;
        if !self.store.is_present(run, ArtifactKind::GeneratedImage) {
            return Err(PipelineError::in_stage(run, stage, ModelError::NoOutput(output)));
        }

        Ok(completed(run, stage, output, start))
    }

    async fn tool_stage(
        &self,
        run: RunId,
        stage: Stage,
        descriptor: &StageDescriptor,
        bindings: Bindings,
    ) -> Result<StageRecord, PipelineError> {
        tracing::info!(run = %run, stage = %stage, "stage started");
        let start = Instant::now();

        self.executor
            .run_stage(descriptor, &bindings)
            .await
            .map_err(|e| PipelineError::in_stage(run, stage, e))?;
        let output = self
            .store
            .require(run, stage.produces())
            .map_err(|e| PipelineError::in_stage(run, stage, e))?;

        Ok(completed(run, stage, output, start))
    }

    async fn material_stage(&self, run: RunId) -> Result<StageRecord, PipelineError> {
        let stage = Stage::Materials;
        let fail = |e: StageError| PipelineError::in_stage(run, stage, e);
        tracing::info!(run = %run, stage = %stage, "stage started");
        let start = Instant::now();

        let source = self.store.require(run, ArtifactKind::RawMesh).map_err(|e| fail(e.into()))?;
        let target = self
            .store
            .require(run, ArtifactKind::MergedAsset)
            .map_err(|e| fail(e.into()))?;
        let output = self.store.path_for(run, ArtifactKind::FinalColoredAsset);

        let destination = output.clone();
        let report = tokio::task::spawn_blocking(move || {
            forge_scene::transplant_file(&source, &target, &destination)
        })
        .await
        .map_err(|e| fail(StageError::Aborted(e.to_string())))?
        .map_err(|e| fail(e.into()))?;

        if report.topology_mismatch {
            tracing::warn!(
                run = %run,
                matched = report.matched_primitives,
                cleared = report.cleared_primitives,
                "rigged mesh layout differs from the generated mesh"
            );
        }

        Ok(completed(run, stage, output, start))
    }
}

fn completed(run: RunId, stage: Stage, output: PathBuf, start: Instant) -> StageRecord {
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        run = %run,
        stage = %stage,
        state = ?stage.completed(),
        elapsed_ms,
        "stage completed"
    );
    StageRecord {
        stage,
        output,
        elapsed_ms,
    }
}
