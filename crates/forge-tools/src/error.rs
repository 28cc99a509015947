//! Error types for tool invocation
//!
//! Failures are split in two layers:
//! - [`PreconditionError`]: a local check failed, no process was started
//! - [`ToolError`]: everything that can go wrong around one invocation

use forge_artifact::ArtifactKind;
use std::io;
use std::path::PathBuf;

/// A local check that failed before any process was spawned
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    /// Interpreter or shell binary not found
    #[error("interpreter not found: {0}")]
    MissingInterpreter(PathBuf),

    /// Tool installation directory absent
    #[error("tool installation not found: {0}")]
    MissingToolRoot(PathBuf),

    /// Tool entry script absent inside the installation
    #[error("tool entry point not found: {0}")]
    MissingEntryPoint(PathBuf),

    /// Environment activation script absent
    #[error("environment activation script not found: {0}")]
    MissingEnvironment(PathBuf),

    /// Declared input artifact absent or empty
    #[error("missing {kind} input at {path}")]
    MissingInput { kind: ArtifactKind, path: PathBuf },

    /// Argument template references an unbound slot
    #[error("no binding for '{0}'")]
    Unbound(String),
}

/// Tool invocation errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Local precondition unmet
    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// Process could not be spawned
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Process exited unsuccessfully
    #[error("{tool} exited with {status}: {stderr_tail}")]
    Failed {
        /// Stage/tool name
        tool: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Rendered exit status
        status: String,
        /// Last bytes of captured stderr
        stderr_tail: String,
    },

    /// Process exited zero but the declared output is absent
    #[error("{tool} reported success but produced no {kind} at {path}")]
    OutputMissing {
        tool: String,
        kind: ArtifactKind,
        path: PathBuf,
    },
}

impl ToolError {
    /// Whether no process was started
    #[inline]
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    /// Exit code of a failed tool
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_classification() {
        let err = ToolError::from(PreconditionError::MissingInterpreter("/bin/nope".into()));
        assert!(err.is_precondition());
        assert_eq!(err.exit_code(), None);
        assert!(err.to_string().contains("/bin/nope"));
    }

    #[test]
    fn failed_carries_exit_code() {
        let err = ToolError::Failed {
            tool: "skeleton".to_string(),
            code: Some(1),
            status: "exit status: 1".to_string(),
            stderr_tail: "CUDA out of memory".to_string(),
        };
        assert!(!err.is_precondition());
        assert_eq!(err.exit_code(), Some(1));
        assert!(err.to_string().contains("CUDA out of memory"));
    }
}
