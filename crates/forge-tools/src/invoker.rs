//! Tool invocation
//!
//! [`ToolInvoker`] runs one [`StageDescriptor`] to completion:
//!
//! 1. Preflight, cheapest first: interpreter, tool installation, environment
//!    activation, declared inputs. Any failure here returns before a process
//!    is spawned.
//! 2. Launch and wait for the child to exit. There is no timeout and no
//!    cancellation once the child runs.
//! 3. Classify: non-zero exit is [`ToolError::Failed`]; zero exit without
//!    the declared output is [`ToolError::OutputMissing`].
//!
//! No retries happen at this layer.

use crate::descriptor::{Bindings, StageDescriptor};
use crate::error::{PreconditionError, ToolError};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

/// Default number of stderr bytes kept for diagnostics
pub const DEFAULT_STDERR_TAIL: usize = 2048;

/// Successful invocation
#[derive(Debug, Clone)]
pub struct ToolRun {
    /// Stage/tool name
    pub tool: String,
    /// Declared output, verified present and non-empty
    pub output: Option<PathBuf>,
    /// Wall-clock time of the child process
    pub elapsed: Duration,
    /// Last bytes of stderr (tools often log progress there)
    pub stderr_tail: String,
}

/// Executes stage descriptors
///
/// Implement this trait to swap how stages run (tests use a scripted
/// executor that writes fixture files instead of spawning tools).
#[async_trait::async_trait]
pub trait StageExecutor: Send + Sync {
    /// Run `descriptor` with `bindings` to completion
    async fn run_stage(
        &self,
        descriptor: &StageDescriptor,
        bindings: &Bindings,
    ) -> Result<ToolRun, ToolError>;

    /// Check that `descriptor` could run at all, ignoring its inputs
    ///
    /// # Errors
    /// Returns the first unmet installation precondition.
    fn check_installation(&self, descriptor: &StageDescriptor) -> Result<(), PreconditionError> {
        let _ = descriptor;
        Ok(())
    }
}

/// Subprocess-backed executor
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    stderr_tail: usize,
}

impl ToolInvoker {
    /// Create an invoker with the default stderr tail size
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            stderr_tail: DEFAULT_STDERR_TAIL,
        }
    }

    /// Keep `bytes` of stderr for diagnostics
    #[inline]
    #[must_use]
    pub fn with_stderr_tail(mut self, bytes: usize) -> Self {
        self.stderr_tail = bytes;
        self
    }

    /// Check the installation of a tool, without looking at inputs
    ///
    /// # Errors
    /// Returns the first unmet precondition, in the order interpreter,
    /// tool root, entry point, activation script.
    pub fn check_installation(&self, descriptor: &StageDescriptor) -> Result<(), PreconditionError> {
        let environment = descriptor.environment();
        environment.check_interpreter(descriptor)?;

        if !descriptor.tool_root().is_dir() {
            return Err(PreconditionError::MissingToolRoot(
                descriptor.tool_root().to_path_buf(),
            ));
        }
        let entry = descriptor.tool_root().join(descriptor.entry());
        if !entry.is_file() {
            return Err(PreconditionError::MissingEntryPoint(entry));
        }

        environment.check_activation()
    }

    /// All local checks for one invocation
    ///
    /// # Errors
    /// Returns the first unmet precondition; inputs are checked last.
    pub fn preflight(
        &self,
        descriptor: &StageDescriptor,
        bindings: &Bindings,
    ) -> Result<Vec<String>, PreconditionError> {
        self.check_installation(descriptor)?;

        for kind in descriptor.consumes() {
            let path = bindings
                .path(kind)
                .ok_or_else(|| PreconditionError::Unbound(kind.to_string()))?;
            if !is_non_empty_file(path) {
                return Err(PreconditionError::MissingInput {
                    kind,
                    path: path.to_path_buf(),
                });
            }
        }

        descriptor.render(bindings)
    }

    fn tail(&self, bytes: &[u8]) -> String {
        let start = bytes.len().saturating_sub(self.stderr_tail);
        String::from_utf8_lossy(&bytes[start..]).trim().to_string()
    }
}

impl Default for ToolInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StageExecutor for ToolInvoker {
    fn check_installation(&self, descriptor: &StageDescriptor) -> Result<(), PreconditionError> {
        ToolInvoker::check_installation(self, descriptor)
    }

    async fn run_stage(
        &self,
        descriptor: &StageDescriptor,
        bindings: &Bindings,
    ) -> Result<ToolRun, ToolError> {
        let args = self.preflight(descriptor, bindings)?;
        let environment = descriptor.environment();

        tracing::debug!(
            tool = descriptor.name(),
            environment = environment.name(),
            command = %environment.describe(descriptor, &args),
            "launching tool"
        );

        let start = Instant::now();
        let output = environment
            .command(descriptor, &args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ToolError::Launch {
                program: descriptor.name().to_string(),
                source,
            })?;
        let elapsed = start.elapsed();
        let stderr_tail = self.tail(&output.stderr);

        if !output.stdout.is_empty() {
            tracing::debug!(
                tool = descriptor.name(),
                stdout = %self.tail(&output.stdout),
                "tool stdout"
            );
        }

        if !output.status.success() {
            tracing::warn!(
                tool = descriptor.name(),
                status = %output.status,
                elapsed_ms = elapsed.as_millis() as u64,
                "tool failed"
            );
            return Err(ToolError::Failed {
                tool: descriptor.name().to_string(),
                code: output.status.code(),
                status: output.status.to_string(),
                stderr_tail,
            });
        }

        let produced = match descriptor.produces() {
            Some(kind) => {
                let path = bindings
                    .path(kind)
                    .ok_or_else(|| PreconditionError::Unbound(kind.to_string()))?;
                if !is_non_empty_file(path) {
                    return Err(ToolError::OutputMissing {
                        tool: descriptor.name().to_string(),
                        kind,
                        path: path.to_path_buf(),
                    });
                }
                Some(path.to_path_buf())
            }
            None => None,
        };

        tracing::debug!(
            tool = descriptor.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            "tool finished"
        );

        Ok(ToolRun {
            tool: descriptor.name().to_string(),
            output: produced,
            elapsed,
            stderr_tail,
        })
    }
}

fn is_non_empty_file(path: &std::path::Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_bytes() {
        let invoker = ToolInvoker::new().with_stderr_tail(5);
        assert_eq!(invoker.tail(b"loading...\nboom!"), "boom!");
        assert_eq!(invoker.tail(b"  ok \n"), "ok");
    }

    #[test]
    fn tail_survives_split_utf8() {
        let invoker = ToolInvoker::new().with_stderr_tail(1);
        // Last byte of a two-byte sequence becomes a replacement char
        assert_eq!(invoker.tail("é".as_bytes()), "\u{fffd}");
    }
}
