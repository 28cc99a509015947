//! Error types for the pipeline
//!
//! Every failure after run allocation names the stage it happened in:
//! - Client input errors are rejected before a run exists
//! - Stage errors wrap the tool, model, merge or store failure that stopped
//!   the run

use crate::state::{RunState, Stage};
use forge_artifact::{ArtifactError, RunId};
use forge_scene::MergeError;
use forge_tools::ToolError;
use std::path::PathBuf;

/// Failure of the image model
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Model could not be initialised
    #[error("model failed to load: {0}")]
    Load(String),

    /// Backing tool failed
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Inference finished without writing an image
    #[error("model produced no image at {0}")]
    NoOutput(PathBuf),
}

/// Cause of a stage failure
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Store(#[from] ArtifactError),

    /// Blocking worker panicked or was cancelled
    #[error("stage task aborted: {0}")]
    Aborted(String),
}

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Prompt missing or blank; nothing was started
    #[error("prompt is missing or empty")]
    EmptyPrompt,

    /// A stage failed; earlier artifacts of the run are kept
    #[error("{stage}: {source}")]
    Stage {
        run: RunId,
        stage: Stage,
        #[source]
        source: StageError,
    },

    /// Run directory could not be allocated
    #[error("storage: {0}")]
    Storage(#[source] ArtifactError),
}

impl PipelineError {
    #[inline]
    pub(crate) fn in_stage(run: RunId, stage: Stage, source: impl Into<StageError>) -> Self {
        Self::Stage {
            run,
            stage,
            source: source.into(),
        }
    }

    /// Whether the caller is at fault
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptyPrompt)
    }

    /// Stage that failed, if any
    #[inline]
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Run the failure belongs to, if one was allocated
    #[inline]
    #[must_use]
    pub fn run(&self) -> Option<RunId> {
        match self {
            Self::Stage { run, .. } => Some(*run),
            _ => None,
        }
    }

    /// Terminal state of the run, if one was allocated
    #[must_use]
    pub fn state(&self) -> Option<RunState> {
        match self {
            Self::Stage { stage, source, .. } => Some(RunState::Failed {
                stage: *stage,
                cause: source.to_string(),
            }),
            _ => None,
        }
    }

    /// Whether a tool was never started because a local check failed
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::Stage {
                source: StageError::Tool(e) | StageError::Model(ModelError::Tool(e)),
                ..
            } => e.is_precondition(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_artifact::ArtifactKind;

    #[test]
    fn stage_failures_lead_with_stage_name() {
        let err = PipelineError::in_stage(
            RunId::new(),
            Stage::Skeleton,
            ToolError::Failed {
                tool: "skeleton".into(),
                code: Some(1),
                status: "exit status: 1".into(),
                stderr_tail: "CUDA out of memory".into(),
            },
        );
        let message = err.to_string();
        assert!(message.starts_with("skeleton: "));
        assert!(message.contains("CUDA out of memory"));
        assert_eq!(err.stage(), Some(Stage::Skeleton));
        assert!(!err.is_client_error());
        assert!(!err.is_precondition());
    }

    #[test]
    fn empty_prompt_is_client_error_without_run() {
        let err = PipelineError::EmptyPrompt;
        assert!(err.is_client_error());
        assert_eq!(err.run(), None);
        assert_eq!(err.state(), None);
    }

    #[test]
    fn failed_state_carries_cause() {
        let run = RunId::new();
        let err = PipelineError::in_stage(
            run,
            Stage::Image,
            ModelError::NoOutput(PathBuf::from("/o/image.png")),
        );
        assert_eq!(err.run(), Some(run));
        assert_eq!(
            err.state(),
            Some(RunState::Failed {
                stage: Stage::Image,
                cause: "model produced no image at /o/image.png".into()
            })
        );
    }

    #[test]
    fn precondition_seen_through_model_layer() {
        let err = PipelineError::in_stage(
            RunId::new(),
            Stage::Image,
            ModelError::Tool(ToolError::Precondition(
                forge_tools::PreconditionError::MissingInput {
                    kind: ArtifactKind::GeneratedImage,
                    path: PathBuf::from("/x"),
                },
            )),
        );
        assert!(err.is_precondition());
    }
}
