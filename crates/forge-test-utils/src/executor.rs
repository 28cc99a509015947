//! Scripted stage executor and stub image model

use crate::scene::{rigged_mesh, textured_mesh, PNG_STUB};
use async_trait::async_trait;
use forge_core::{ImageRequest, ModelError, TextToImage};
use forge_tools::{Bindings, PreconditionError, StageDescriptor, StageExecutor, ToolError, ToolRun};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Stub FBX payload
pub const FBX_STUB: &[u8] = b"Kaydara FBX Binary  \0\x1a\0stub";

/// Layout shared by the stub mesh and the stub rig
pub const FIXTURE_TOPOLOGY: [usize; 2] = [2, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Exit(i32),
    Silent,
}

/// Executor that writes fixture files instead of running tools
///
/// Inputs are checked like the real invoker does, so a stage whose input is
/// missing fails with `PreconditionError::MissingInput`.
#[derive(Debug)]
pub struct ScriptedExecutor {
    outputs: HashMap<String, Vec<u8>>,
    behaviours: HashMap<String, Behaviour>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecutor {
    /// Every stage succeeds with a plausible artifact
    pub fn new() -> Self {
        let mut outputs = HashMap::new();
        outputs.insert("image".to_string(), PNG_STUB.to_vec());
        outputs.insert(
            "mesh".to_string(),
            textured_mesh(&FIXTURE_TOPOLOGY).to_bytes().expect("fixture encodes"),
        );
        outputs.insert("skeleton".to_string(), FBX_STUB.to_vec());
        outputs.insert("skin".to_string(), FBX_STUB.to_vec());
        outputs.insert(
            "merge".to_string(),
            rigged_mesh(&FIXTURE_TOPOLOGY).to_bytes().expect("fixture encodes"),
        );
        Self {
            outputs,
            behaviours: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `stage` exits with `code` and writes nothing
    pub fn fail_on(mut self, stage: &str, code: i32) -> Self {
        self.behaviours.insert(stage.to_string(), Behaviour::Exit(code));
        self
    }

    /// `stage` exits zero but writes nothing
    pub fn silent_on(mut self, stage: &str) -> Self {
        self.behaviours.insert(stage.to_string(), Behaviour::Silent);
        self
    }

    /// Bytes `stage` writes to its output
    pub fn with_output(mut self, stage: &str, bytes: Vec<u8>) -> Self {
        self.outputs.insert(stage.to_string(), bytes);
        self
    }

    /// Stage names in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Rendered arguments of the first call to `stage`
    pub fn args_of(&self, stage: &str) -> Option<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, args)| args.clone())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StageExecutor for ScriptedExecutor {
    async fn run_stage(
        &self,
        descriptor: &StageDescriptor,
        bindings: &Bindings,
    ) -> Result<ToolRun, ToolError> {
        for kind in descriptor.consumes() {
            let path = bindings
                .path(kind)
                .ok_or_else(|| PreconditionError::Unbound(kind.to_string()))?;
            let present = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
            if !present {
                return Err(PreconditionError::MissingInput {
                    kind,
                    path: path.to_path_buf(),
                }
                .into());
            }
        }
        let args = descriptor.render(bindings)?;
        let name = descriptor.name().to_string();
        self.calls.lock().unwrap().push((name.clone(), args));

        match self.behaviours.get(&name) {
            Some(Behaviour::Exit(code)) => {
                return Err(ToolError::Failed {
                    tool: name,
                    code: Some(*code),
                    status: format!("exit status: {code}"),
                    stderr_tail: format!("scripted failure of stage {}", descriptor.name()),
                })
            }
            Some(Behaviour::Silent) => {
                let kind = descriptor.produces().expect("scripted stages declare an output");
                return Err(ToolError::OutputMissing {
                    tool: name,
                    kind,
                    path: bindings.path(kind).unwrap_or(Path::new("")).to_path_buf(),
                });
            }
            None => {}
        }

        let output = descriptor.produces().and_then(|kind| bindings.path(kind));
        if let Some(path) = output {
            let bytes = self.outputs.get(&name).cloned().unwrap_or_else(|| b"stub".to_vec());
            fs::write(path, bytes).unwrap();
        }

        Ok(ToolRun {
            tool: name,
            output: output.map(Path::to_path_buf),
            elapsed: Duration::from_millis(1),
            stderr_tail: String::new(),
        })
    }
}

/// Image model that writes a PNG stub and counts calls
#[derive(Debug, Default)]
pub struct StubImageModel {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl StubImageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model whose every call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, after rewriting
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextToImage for StubImageModel {
    async fn generate(&self, request: &ImageRequest, output: &Path) -> Result<(), ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if self.fail {
            return Err(ModelError::Load("stub model unavailable".into()));
        }
        fs::write(output, PNG_STUB).unwrap();
        Ok(())
    }
}
