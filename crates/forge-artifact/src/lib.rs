//! Rigforge Artifact Store
//!
//! Run-scoped storage for every intermediate and final file of a pipeline
//! execution.
//!
//! # Core Concepts
//!
//! - [`RunId`]: Opaque 128-bit identity minted once per request
//! - [`ArtifactKind`]: What a stored file is (image, mesh, skeleton, ...)
//! - [`ArtifactStore`]: Sole authority for turning `(RunId, ArtifactKind)` into a path
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_artifact::{ArtifactKind, ArtifactStore};
//!
//! let store = ArtifactStore::new("outputs");
//! let run = store.allocate_run()?;
//! let mesh = store.path_for(run, ArtifactKind::RawMesh);
//!
//! // Later, possibly from another process
//! let deliverable = store.resolve_final(&run.to_string())?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod kind;
mod run;
mod store;

pub use kind::{ArtifactKind, MESH_DIR};
pub use run::{is_hex, RunId, RunIdError, RUN_ID_LEN};
pub use store::{absolute, ArtifactError, ArtifactStore, ResolvedArtifact, FINAL_PRIORITY, MIN_PREFIX_LEN};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
