//! Error types for scene loading, saving and merging

use std::io;
use std::path::{Path, PathBuf};

/// Container codec errors
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// Filesystem failure
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Input shorter than its headers claim
    #[error("truncated container: {0}")]
    Truncated(&'static str),

    /// Not a binary glTF container
    #[error("bad magic 0x{0:08x}, expected 'glTF'")]
    BadMagic(u32),

    /// Binary glTF version other than 2
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    /// No JSON chunk present
    #[error("container has no JSON chunk")]
    MissingJson,

    /// JSON chunk does not parse as a glTF document
    #[error("invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Buffer stored outside the container
    #[error("buffer {index} is stored externally ({uri}); only self-contained containers are supported")]
    ExternalBuffer { index: usize, uri: String },

    /// Declared buffer length exceeds the bytes present
    #[error("buffer {index} declares {declared} bytes but {actual} are present")]
    BufferTooShort {
        index: usize,
        declared: usize,
        actual: usize,
    },

    /// Structure cannot be encoded as a container
    #[error("malformed scene: {0}")]
    Malformed(String),

    /// Encoded container exceeds the 4 GiB format limit
    #[error("container of {0} bytes exceeds the format limit")]
    TooLarge(usize),
}

impl SceneError {
    #[inline]
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Which input of a merge failed to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Material-bearing container
    Source,
    /// Geometry-bearing container
    Target,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Target => "target",
        })
    }
}

/// Material transplant errors
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// An input container could not be read
    #[error("failed to load {role} container: {source}")]
    Load {
        role: Role,
        #[source]
        source: SceneError,
    },

    /// The merged container could not be encoded or written
    #[error("failed to save merged container: {0}")]
    Save(#[source] SceneError),

    /// An index points past the end of its list
    #[error("{from} references {list} {index}, but only {len} exist")]
    DanglingReference {
        /// Referencing element, e.g. `texture 3`
        from: String,
        /// Referenced list name
        list: &'static str,
        index: usize,
        len: usize,
    },

    /// A buffer view reaches past the end of its buffer
    #[error("buffer view {view} ends at byte {end}, past buffer {buffer} of {len} bytes")]
    ViewOutOfRange {
        view: usize,
        buffer: usize,
        end: usize,
        len: usize,
    },
}

impl MergeError {
    /// Whether the failure is an index violation rather than I/O
    #[inline]
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::DanglingReference { .. } | Self::ViewOutOfRange { .. })
    }
}
