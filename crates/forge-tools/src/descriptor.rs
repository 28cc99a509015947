//! Stage descriptors and argument bindings
//!
//! A [`StageDescriptor`] is declared once at start-up and never mutated. It
//! names the tool, where it is installed, how to run its entry script, the
//! ordered argument template, and which artifact kinds flow in and out.
//! [`Bindings`] supply the concrete values for one invocation.

use crate::environment::ToolEnvironment;
use crate::error::PreconditionError;
use forge_artifact::{ArtifactKind, ArtifactStore, RunId};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One element of an argument template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Passed verbatim
    Literal(String),
    /// Path of a consumed artifact
    Input(ArtifactKind),
    /// Path of the produced artifact
    Output(ArtifactKind),
    /// Named scalar parameter (prompt, seed, ...)
    Param(String),
}

/// Immutable description of one external tool invocation
#[derive(Clone)]
pub struct StageDescriptor {
    name: String,
    tool_root: PathBuf,
    entry: PathBuf,
    runner: Option<String>,
    args: Vec<Arg>,
    produces: Option<ArtifactKind>,
    environment: Arc<dyn ToolEnvironment>,
}

impl StageDescriptor {
    /// Start a descriptor for `entry` inside `tool_root`
    ///
    /// `entry` is relative to `tool_root`, which is also the working
    /// directory of the launched process. A relative `tool_root` is anchored
    /// to the current directory.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        tool_root: impl Into<PathBuf>,
        entry: impl Into<PathBuf>,
        environment: Arc<dyn ToolEnvironment>,
    ) -> Self {
        Self {
            name: name.into(),
            tool_root: forge_artifact::absolute(tool_root),
            entry: entry.into(),
            runner: None,
            args: Vec::new(),
            produces: None,
            environment,
        }
    }

    /// Run the entry script through `runner` (e.g. `bash`, `python`)
    #[inline]
    #[must_use]
    pub fn runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = Some(runner.into());
        self
    }

    /// Append a literal argument
    #[inline]
    #[must_use]
    pub fn literal(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg::Literal(value.into()));
        self
    }

    /// Append `flag <input path>`
    #[inline]
    #[must_use]
    pub fn input(mut self, flag: &str, kind: ArtifactKind) -> Self {
        self.args.push(Arg::Literal(flag.to_string()));
        self.args.push(Arg::Input(kind));
        self
    }

    /// Append `flag <output path>` and declare the produced kind
    #[inline]
    #[must_use]
    pub fn output(mut self, flag: &str, kind: ArtifactKind) -> Self {
        self.args.push(Arg::Literal(flag.to_string()));
        self.args.push(Arg::Output(kind));
        self.produces = Some(kind);
        self
    }

    /// Append `flag <param value>`
    #[inline]
    #[must_use]
    pub fn param(mut self, flag: &str, name: &str) -> Self {
        self.args.push(Arg::Literal(flag.to_string()));
        self.args.push(Arg::Param(name.to_string()));
        self
    }

    /// Stage name, used in logs and failures
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installation root and working directory
    #[inline]
    #[must_use]
    pub fn tool_root(&self) -> &Path {
        &self.tool_root
    }

    /// Entry script relative to the tool root
    #[inline]
    #[must_use]
    pub fn entry(&self) -> &Path {
        &self.entry
    }

    /// Interpreter for the entry script, if any
    #[inline]
    #[must_use]
    pub fn runner_name(&self) -> Option<&str> {
        self.runner.as_deref()
    }

    /// Argument template
    #[inline]
    #[must_use]
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Consumed artifact kinds, in template order
    #[must_use]
    pub fn consumes(&self) -> Vec<ArtifactKind> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                Arg::Input(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    /// Produced artifact kind
    #[inline]
    #[must_use]
    pub fn produces(&self) -> Option<ArtifactKind> {
        self.produces
    }

    /// Environment strategy used to launch the tool
    #[inline]
    #[must_use]
    pub fn environment(&self) -> &Arc<dyn ToolEnvironment> {
        &self.environment
    }

    /// Expand the argument template against `bindings`
    ///
    /// # Errors
    /// Returns `PreconditionError::Unbound` for any slot without a value.
    pub fn render(&self, bindings: &Bindings) -> Result<Vec<String>, PreconditionError> {
        self.args
            .iter()
            .map(|arg| match arg {
                Arg::Literal(value) => Ok(value.clone()),
                Arg::Input(kind) | Arg::Output(kind) => bindings
                    .path(*kind)
                    .map(|p| p.to_string_lossy().into_owned())
                    .ok_or_else(|| PreconditionError::Unbound(kind.to_string())),
                Arg::Param(name) => bindings
                    .param(name)
                    .map(str::to_string)
                    .ok_or_else(|| PreconditionError::Unbound(name.clone())),
            })
            .collect()
    }
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("name", &self.name)
            .field("tool_root", &self.tool_root)
            .field("entry", &self.entry)
            .field("runner", &self.runner)
            .field("args", &self.args)
            .field("environment", &self.environment.name())
            .finish()
    }
}

/// Concrete values for a descriptor's template slots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    paths: BTreeMap<ArtifactKind, PathBuf>,
    params: BTreeMap<String, String>,
}

impl Bindings {
    /// Empty bindings
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every artifact slot of `descriptor` to its path in `store`
    #[must_use]
    pub fn for_run(store: &ArtifactStore, run: RunId, descriptor: &StageDescriptor) -> Self {
        let mut bindings = Self::new();
        for kind in descriptor.consumes().into_iter().chain(descriptor.produces()) {
            bindings.paths.insert(kind, store.path_for(run, kind));
        }
        bindings
    }

    /// Bind an artifact path
    #[inline]
    #[must_use]
    pub fn with_path(mut self, kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(kind, path.into());
        self
    }

    /// Bind a named parameter
    #[inline]
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Bound path for `kind`
    #[inline]
    #[must_use]
    pub fn path(&self, kind: ArtifactKind) -> Option<&Path> {
        self.paths.get(&kind).map(PathBuf::as_path)
    }

    /// Bound value for `name`
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}
