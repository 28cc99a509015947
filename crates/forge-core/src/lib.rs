//! Rigforge Pipeline Core
//!
//! Turns a text prompt into a rigged, textured asset by chaining external
//! tools: text to image, image to mesh, mesh to skeleton, skeleton to
//! skinned mesh, rig merge, then an in-process material transplant.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!   ├── TextToImage (ModelHandle: init-once, one inference at a time)
//!   ├── StageExecutor (ToolInvoker: preflight + subprocess)
//!   │     └── StageCatalog (descriptors declared from ForgeConfig)
//!   ├── forge_scene::transplant_file (materials)
//!   └── ArtifactStore (paths, final resolution)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_core::{ForgeConfig, ModelHandle, Orchestrator, StageCatalog, ToolImageLoader};
//!
//! let config = ForgeConfig::load(Path::new("rigforge.toml"))?;
//! let catalog = Arc::new(StageCatalog::from_config(&config));
//! let model = Arc::new(ModelHandle::new(ToolImageLoader::new(
//!     catalog.image.clone(),
//!     Arc::new(ToolInvoker::new()),
//! )));
//!
//! let orchestrator = Orchestrator::new(&config, catalog, model);
//! let report = orchestrator.generate("a red chair").await?;
//! println!("{} -> {}", report.run_id, report.final_artifact.display());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod catalog;
mod config;
mod error;
mod model;
mod orchestrator;
mod prompt;
mod state;

pub use catalog::{params, StageCatalog};
pub use config::{
    ConfigError, EnvironmentConfig, ForgeConfig, ImageParams, ServerConfig, ToolsConfig,
    DEFAULT_PROMPT_PREFIX, DEFAULT_RIG_SEED,
};
pub use error::{ModelError, PipelineError, StageError};
pub use model::{
    ImageRequest, ModelHandle, ModelLoader, TextToImage, ToolImageLoader, ToolImageModel,
};
pub use orchestrator::Orchestrator;
pub use prompt::PromptTemplate;
pub use state::{RunReport, RunState, Stage, StageRecord};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
