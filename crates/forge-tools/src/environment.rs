//! Launch environments
//!
//! A [`ToolEnvironment`] decides how a descriptor becomes a process and which
//! local checks must pass first. Two strategies exist:
//! - [`HostEnvironment`]: run the entry script directly on the host
//! - [`CondaEnvironment`]: source an activation script, activate a named
//!   environment, `cd` into the tool root, then run the entry script, all in
//!   one shell line
//!
//! Swapping strategies (e.g. for a container runner) does not affect the
//! orchestrator, which only sees descriptors.

use crate::descriptor::StageDescriptor;
use crate::error::PreconditionError;
use std::env;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Strategy for launching a tool
pub trait ToolEnvironment: Send + Sync {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Check that the interpreter/shell needed to launch exists
    ///
    /// # Errors
    /// Returns `PreconditionError::MissingInterpreter` when it does not.
    fn check_interpreter(&self, descriptor: &StageDescriptor) -> Result<(), PreconditionError>;

    /// Check that the runtime environment can be activated
    ///
    /// # Errors
    /// Returns `PreconditionError::MissingEnvironment` when it cannot.
    fn check_activation(&self) -> Result<(), PreconditionError> {
        Ok(())
    }

    /// Build the command for one invocation with rendered `args`
    fn command(&self, descriptor: &StageDescriptor, args: &[String]) -> Command;

    /// Human-readable form of the command, for logs
    fn describe(&self, descriptor: &StageDescriptor, args: &[String]) -> String {
        shell_line(&program_words(descriptor, args))
    }
}

/// Run tools directly on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct HostEnvironment;

impl HostEnvironment {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ToolEnvironment for HostEnvironment {
    fn name(&self) -> &'static str {
        "host"
    }

    fn check_interpreter(&self, descriptor: &StageDescriptor) -> Result<(), PreconditionError> {
        match descriptor.runner_name() {
            Some(runner) => resolve_program(runner)
                .map(|_| ())
                .ok_or_else(|| PreconditionError::MissingInterpreter(PathBuf::from(runner))),
            None => Ok(()),
        }
    }

    fn command(&self, descriptor: &StageDescriptor, args: &[String]) -> Command {
        let mut cmd = match descriptor.runner_name() {
            Some(runner) => {
                let mut cmd = Command::new(runner);
                cmd.arg(descriptor.entry());
                cmd
            }
            None => Command::new(descriptor.tool_root().join(descriptor.entry())),
        };
        cmd.args(args).current_dir(descriptor.tool_root());
        cmd
    }
}

/// Run tools inside an activated conda environment
#[derive(Debug, Clone)]
pub struct CondaEnvironment {
    shell: PathBuf,
    activate_script: PathBuf,
    env_name: String,
}

impl CondaEnvironment {
    /// `shell` runs the line, `activate_script` defines `conda activate`
    #[must_use]
    pub fn new(
        shell: impl Into<PathBuf>,
        activate_script: impl Into<PathBuf>,
        env_name: impl Into<String>,
    ) -> Self {
        Self {
            shell: shell.into(),
            activate_script: activate_script.into(),
            env_name: env_name.into(),
        }
    }

    /// Name of the environment to activate
    #[inline]
    #[must_use]
    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    /// The full shell line for one invocation
    #[must_use]
    pub fn activation_line(&self, descriptor: &StageDescriptor, args: &[String]) -> String {
        format!(
            ". {} && conda activate {} && cd {} && {}",
            quote(&self.activate_script.to_string_lossy()),
            quote(&self.env_name),
            quote(&descriptor.tool_root().to_string_lossy()),
            shell_line(&program_words(descriptor, args)),
        )
    }
}

impl ToolEnvironment for CondaEnvironment {
    fn name(&self) -> &'static str {
        "conda"
    }

    fn check_interpreter(&self, _descriptor: &StageDescriptor) -> Result<(), PreconditionError> {
        resolve_program(&self.shell.to_string_lossy())
            .map(|_| ())
            .ok_or_else(|| PreconditionError::MissingInterpreter(self.shell.clone()))
    }

    fn check_activation(&self) -> Result<(), PreconditionError> {
        if self.activate_script.is_file() {
            Ok(())
        } else {
            Err(PreconditionError::MissingEnvironment(self.activate_script.clone()))
        }
    }

    fn command(&self, descriptor: &StageDescriptor, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(self.activation_line(descriptor, args));
        cmd
    }

    fn describe(&self, descriptor: &StageDescriptor, args: &[String]) -> String {
        format!(
            "{} -c {}",
            self.shell.display(),
            quote(&self.activation_line(descriptor, args))
        )
    }
}

/// Locate an executable by path or on `PATH`
#[must_use]
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        let path = Path::new(program);
        return path.is_file().then(|| path.to_path_buf());
    }
    let search = env::var_os("PATH")?;
    env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn program_words(descriptor: &StageDescriptor, args: &[String]) -> Vec<String> {
    let mut words = Vec::with_capacity(args.len() + 2);
    match descriptor.runner_name() {
        Some(runner) => {
            words.push(runner.to_string());
            words.push(descriptor.entry().to_string_lossy().into_owned());
        }
        None => words.push(
            descriptor
                .tool_root()
                .join(descriptor.entry())
                .to_string_lossy()
                .into_owned(),
        ),
    }
    words.extend(args.iter().cloned());
    words
}

fn shell_line(words: &[String]) -> String {
    words.iter().map(|w| quote(w)).collect::<Vec<_>>().join(" ")
}

/// POSIX single-quote `word` unless it is made of safe characters only
#[must_use]
pub fn quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
