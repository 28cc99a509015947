//! Rigforge External Tool Invoker
//!
//! Runs black-box generation and rigging tools as child processes. Tools are
//! judged only by exit status and by the presence of their declared output.
//!
//! # Core Concepts
//!
//! - [`StageDescriptor`]: Immutable description of one tool invocation
//! - [`Bindings`]: Concrete paths and parameters for a descriptor's slots
//! - [`ToolEnvironment`]: Launch strategy ([`HostEnvironment`], [`CondaEnvironment`])
//! - [`StageExecutor`]: Runs descriptors; [`ToolInvoker`] is the subprocess implementation
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_tools::{Bindings, CondaEnvironment, StageDescriptor, StageExecutor, ToolInvoker};
//!
//! let env = Arc::new(CondaEnvironment::new("/bin/bash", conda_sh, "unirig"));
//! let skeleton = StageDescriptor::new("skeleton", unirig_root, "launch/inference/generate_skeleton.sh", env)
//!     .runner("bash")
//!     .input("--input", ArtifactKind::RawMesh)
//!     .output("--output", ArtifactKind::SkeletonFbx)
//!     .param("--seed", "seed");
//!
//! let bindings = Bindings::for_run(&store, run, &skeleton).with_param("seed", 12345);
//! let run = ToolInvoker::new().run_stage(&skeleton, &bindings).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod descriptor;
mod environment;
mod error;
mod invoker;

pub use descriptor::{Arg, Bindings, StageDescriptor};
pub use environment::{quote, resolve_program, CondaEnvironment, HostEnvironment, ToolEnvironment};
pub use error::{PreconditionError, ToolError};
pub use invoker::{StageExecutor, ToolInvoker, ToolRun, DEFAULT_STDERR_TAIL};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
