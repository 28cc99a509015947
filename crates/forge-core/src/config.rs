//! Pipeline configuration
//!
//! [`ForgeConfig`] is read once at start-up, optionally from a TOML file, and
//! then overridden by command-line flags or environment variables in the
//! binary. Every section has defaults, so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix prepended to every user prompt
pub const DEFAULT_PROMPT_PREFIX: &str =
    "3D render of a single object, centered, full body, neutral studio lighting, plain white background: ";

/// Seed passed to the skeleton stage
pub const DEFAULT_RIG_SEED: u64 = 12345;

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Root directory of the artifact store
    pub storage_root: PathBuf,
    /// How external tools are launched
    pub environment: EnvironmentConfig,
    /// Where the external tools are installed
    pub tools: ToolsConfig,
    /// Deterministic seed for skeleton prediction
    pub rig_seed: u64,
    /// Fixed text prepended to the trimmed user prompt
    pub prompt_prefix: String,
    /// Run the material transplant after the rig merge
    pub reapply_materials: bool,
    /// Text-to-image generation parameters
    pub image: ImageParams,
    /// HTTP surface
    pub server: ServerConfig,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("outputs"),
            environment: EnvironmentConfig::default(),
            tools: ToolsConfig::default(),
            rig_seed: DEFAULT_RIG_SEED,
            prompt_prefix: DEFAULT_PROMPT_PREFIX.to_string(),
            reapply_materials: true,
            image: ImageParams::default(),
            server: ServerConfig::default(),
        }
    }
}

impl ForgeConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` if the document is not valid TOML or has
    /// fields of the wrong type.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    #[inline]
    #[must_use]
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_rig_seed(mut self, seed: u64) -> Self {
        self.rig_seed = seed;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_reapply_materials(mut self, enabled: bool) -> Self {
        self.reapply_materials = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_prompt_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prompt_prefix = prefix.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_env_name(mut self, name: impl Into<String>) -> Self {
        self.environment.env_name = name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.environment.shell = shell.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_activate_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.environment.activate_script = script.into();
        self
    }

    /// Launch tools directly instead of through an activated environment
    #[inline]
    #[must_use]
    pub fn with_host_environment(mut self) -> Self {
        self.environment.use_conda = false;
        self
    }
}

/// Tool launch environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Activate a conda environment before each tool; otherwise run on the host
    pub use_conda: bool,
    /// Shell that runs the activation line
    pub shell: PathBuf,
    /// Script defining `conda activate`
    pub activate_script: PathBuf,
    /// Environment to activate
    pub env_name: String,
    /// Interpreter for Python entry points
    pub python: String,
    /// Interpreter for shell entry points
    pub bash: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            use_conda: true,
            shell: PathBuf::from("/bin/bash"),
            activate_script: PathBuf::from("/opt/conda/etc/profile.d/conda.sh"),
            env_name: "unirig".to_string(),
            python: "python".to_string(),
            bash: "bash".to_string(),
        }
    }
}

/// Installation roots and entry points, relative to their root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub image_root: PathBuf,
    pub image_entry: PathBuf,
    pub mesh_root: PathBuf,
    pub mesh_entry: PathBuf,
    pub rig_root: PathBuf,
    pub skeleton_entry: PathBuf,
    pub skin_entry: PathBuf,
    pub merge_entry: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            image_root: PathBuf::from("tools/text2image"),
            image_entry: PathBuf::from("text2image.py"),
            mesh_root: PathBuf::from("tools/Hunyuan3D-2"),
            mesh_entry: PathBuf::from("run.py"),
            rig_root: PathBuf::from("tools/UniRig"),
            skeleton_entry: PathBuf::from("launch/inference/generate_skeleton.sh"),
            skin_entry: PathBuf::from("launch/inference/generate_skin.sh"),
            merge_entry: PathBuf::from("launch/inference/merge.sh"),
        }
    }
}

/// Text-to-image generation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageParams {
    /// Generator seed, fixed for reproducible images
    pub seed: u64,
    /// Inference steps
    pub steps: u32,
    /// Classifier-free guidance scale
    pub guidance: f32,
    /// Maximum prompt length in tokens
    pub max_sequence_length: u32,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            seed: 0,
            steps: 4,
            guidance: 0.0,
            max_sequence_length: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Load the image model before accepting requests
    pub warm_up: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            warm_up: true,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
