//! Rigforge Scene Merger
//!
//! Reads and writes binary glTF containers and transplants shading data from
//! one scene onto another with the same mesh/primitive layout.
//!
//! # Core Concepts
//!
//! - [`Document`]: glTF JSON with typed lists for everything a transplant touches
//! - [`SceneContainer`]: A document plus its buffer bytes; GLB encode/decode
//! - [`transplant_materials`]: Append-with-offset merge plus positional donor matching
//! - [`validate_indices`]: Bounds check for every cross-list reference
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_scene::transplant_file;
//!
//! let report = transplant_file(&raw_mesh, &rigged, &textured)?;
//! if report.topology_mismatch {
//!     eprintln!("materials were matched on a partial layout");
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod document;
mod error;
mod glb;
mod merge;

pub use document::{
    material_texture_refs, Buffer, BufferView, Document, Image, Mesh, Primitive, Texture,
};
pub use error::{MergeError, Role, SceneError};
pub use glb::{write_atomic, SceneContainer, CHUNK_BIN, CHUNK_JSON, GLB_MAGIC, GLB_VERSION};
pub use merge::{transplant_file, transplant_materials, validate_indices, TransplantReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
