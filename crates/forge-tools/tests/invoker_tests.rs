#![cfg(unix)]

use forge_artifact::ArtifactKind;
use forge_tools::{
    Bindings, CondaEnvironment, HostEnvironment, PreconditionError, StageDescriptor,
    StageExecutor, ToolEnvironment, ToolError, ToolInvoker,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(script: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("tool")).unwrap();
        fs::write(dir.path().join("tool/run.sh"), script).unwrap();
        Self { dir }
    }

    fn tool_root(&self) -> PathBuf {
        self.dir.path().join("tool")
    }

    fn input(&self) -> PathBuf {
        self.dir.path().join("model.glb")
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("model_rigged.fbx")
    }

    fn sentinel(&self) -> PathBuf {
        self.dir.path().join("spawned")
    }

    fn descriptor(&self, env: Arc<dyn ToolEnvironment>) -> StageDescriptor {
        StageDescriptor::new("skeleton", self.tool_root(), "run.sh", env)
            .runner("sh")
            .input("--input", ArtifactKind::RawMesh)
            .output("--output", ArtifactKind::SkeletonFbx)
            .param("--sentinel", "sentinel")
    }

    fn bindings(&self) -> Bindings {
        Bindings::new()
            .with_path(ArtifactKind::RawMesh, self.input())
            .with_path(ArtifactKind::SkeletonFbx, self.output())
            .with_param("sentinel", self.sentinel().display())
    }
}

// $1=--input $2=<in> $3=--output $4=<out> $5=--sentinel $6=<file>
const COPY_SCRIPT: &str = "touch \"$6\"\ncp \"$2\" \"$4\"\n";
const FAIL_SCRIPT: &str = "touch \"$6\"\necho 'loading weights' >&2\necho 'rig failed: bad topology' >&2\nexit 1\n";
const SILENT_SCRIPT: &str = "touch \"$6\"\nexit 0\n";
const PWD_SCRIPT: &str = "touch \"$6\"\npwd > \"$4\"\n";

fn host() -> Arc<dyn ToolEnvironment> {
    Arc::new(HostEnvironment::new())
}

#[tokio::test]
async fn test_successful_tool_produces_output() {
    let fx = Fixture::new(COPY_SCRIPT);
    fs::write(fx.input(), b"glTF-mesh").unwrap();

    let run = ToolInvoker::new()
        .run_stage(&fx.descriptor(host()), &fx.bindings())
        .await
        .unwrap();

    assert_eq!(run.tool, "skeleton");
    assert_eq!(run.output.as_deref(), Some(fx.output().as_path()));
    assert_eq!(fs::read(fx.output()).unwrap(), b"glTF-mesh");
}

#[tokio::test]
async fn test_nonzero_exit_is_tool_failure_with_stderr_tail() {
    let fx = Fixture::new(FAIL_SCRIPT);
    fs::write(fx.input(), b"glTF-mesh").unwrap();

    let err = ToolInvoker::new()
        .run_stage(&fx.descriptor(host()), &fx.bindings())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(1));
    match err {
        ToolError::Failed { tool, stderr_tail, .. } => {
            assert_eq!(tool, "skeleton");
            assert!(stderr_tail.ends_with("rig failed: bad topology"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_zero_exit_without_output_is_output_missing() {
    let fx = Fixture::new(SILENT_SCRIPT);
    fs::write(fx.input(), b"glTF-mesh").unwrap();

    let err = ToolInvoker::new()
        .run_stage(&fx.descriptor(host()), &fx.bindings())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ToolError::OutputMissing { kind: ArtifactKind::SkeletonFbx, ref path, .. } if path == &fx.output()
    ));
}

#[tokio::test]
async fn test_missing_input_fails_before_spawn() {
    let fx = Fixture::new(COPY_SCRIPT);

    let err = ToolInvoker::new()
        .run_stage(&fx.descriptor(host()), &fx.bindings())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ToolError::Precondition(PreconditionError::MissingInput { kind: ArtifactKind::RawMesh, .. })
    ));
    assert!(!fx.sentinel().exists(), "no process may be spawned");
}

#[tokio::test]
async fn test_empty_input_counts_as_missing() {
    let fx = Fixture::new(COPY_SCRIPT);
    fs::write(fx.input(), b"").unwrap();

    let err = ToolInvoker::new()
        .run_stage(&fx.descriptor(host()), &fx.bindings())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ToolError::Precondition(PreconditionError::MissingInput { .. })
    ));
}

#[tokio::test]
async fn test_interpreter_checked_before_inputs() {
    let fx = Fixture::new(COPY_SCRIPT);
    let descriptor = StageDescriptor::new("skeleton", fx.tool_root(), "run.sh", host())
        .runner("no-such-interpreter-for-rigforge")
        .input("--input", ArtifactKind::RawMesh)
        .output("--output", ArtifactKind::SkeletonFbx);

    let err = ToolInvoker::new()
        .run_stage(&descriptor, &fx.bindings())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ToolError::Precondition(PreconditionError::MissingInterpreter(_))
    ));
}

#[tokio::test]
async fn test_tool_root_checked_before_activation() {
    let fx = Fixture::new(COPY_SCRIPT);
    let env: Arc<dyn ToolEnvironment> = Arc::new(CondaEnvironment::new(
        "/bin/sh",
        "/no/conda/etc/profile.d/conda.sh",
        "unirig",
    ));
    let descriptor = StageDescriptor::new("skeleton", "/no/such/unirig", "run.sh", env)
        .runner("sh")
        .input("--input", ArtifactKind::RawMesh)
        .output("--output", ArtifactKind::SkeletonFbx);

    let err = ToolInvoker::new()
        .run_stage(&descriptor, &fx.bindings())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ToolError::Precondition(PreconditionError::MissingToolRoot(p)) if p == Path::new("/no/such/unirig")
    ));
}

#[tokio::test]
async fn test_missing_activation_script() {
    let fx = Fixture::new(COPY_SCRIPT);
    fs::write(fx.input(), b"glTF-mesh").unwrap();
    let env: Arc<dyn ToolEnvironment> = Arc::new(CondaEnvironment::new(
        "/bin/sh",
        fx.dir.path().join("missing-conda.sh"),
        "unirig",
    ));

    let err = ToolInvoker::new()
        .run_stage(&fx.descriptor(env), &fx.bindings())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ToolError::Precondition(PreconditionError::MissingEnvironment(_))
    ));
    assert!(!fx.sentinel().exists());
}

#[tokio::test]
async fn test_conda_line_runs_inside_tool_root() {
    let fx = Fixture::new(PWD_SCRIPT);
    fs::write(fx.input(), b"glTF-mesh").unwrap();

    // Stand-in for etc/profile.d/conda.sh: defines a no-op `conda`
    let activate = fx.dir.path().join("conda.sh");
    fs::write(&activate, "conda() { :; }\n").unwrap();
    let env: Arc<dyn ToolEnvironment> =
        Arc::new(CondaEnvironment::new("/bin/sh", &activate, "unirig"));

    ToolInvoker::new()
        .run_stage(&fx.descriptor(env), &fx.bindings())
        .await
        .unwrap();

    let cwd = fs::read_to_string(fx.output()).unwrap();
    assert_eq!(
        Path::new(cwd.trim()).canonicalize().unwrap(),
        fx.tool_root().canonicalize().unwrap()
    );
}

#[test]
fn test_check_installation_ignores_inputs() {
    let fx = Fixture::new(COPY_SCRIPT);
    let invoker = ToolInvoker::new();
    assert!(invoker.check_installation(&fx.descriptor(host())).is_ok());

    let missing_entry = StageDescriptor::new("mesh", fx.tool_root(), "absent.py", host());
    assert!(matches!(
        invoker.check_installation(&missing_entry),
        Err(PreconditionError::MissingEntryPoint(_))
    ));
}
