//! On-disk artifact store
//!
//! [`ArtifactStore`] owns the storage layout. It is the only place that turns
//! a `(RunId, ArtifactKind)` pair into a path; every other component asks the
//! store instead of joining paths itself.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<run-id>/image.png
//! <root>/<run-id>/mesh/model.glb
//! <root>/<run-id>/mesh/model_rigged.fbx
//! <root>/<run-id>/mesh/model_skinned.fbx
//! <root>/<run-id>/mesh/model_rigged.glb
//! <root>/<run-id>/mesh/model_rigged_textured.glb
//! ```
//!
//! The store only ever creates directories. It never deletes.

use crate::kind::{ArtifactKind, MESH_DIR};
use crate::run::{is_hex, RunId, RUN_ID_LEN};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Resolution order for a run's deliverable, best first
pub const FINAL_PRIORITY: [ArtifactKind; 3] = [
    ArtifactKind::FinalColoredAsset,
    ArtifactKind::MergedAsset,
    ArtifactKind::RawMesh,
];

/// Shortest identity prefix accepted by [`ArtifactStore::resolve_final`]
pub const MIN_PREFIX_LEN: usize = 8;

/// Attempts made to mint a run id whose directory does not exist yet
const ALLOCATE_ATTEMPTS: usize = 4;

/// A deliverable found by [`ArtifactStore::resolve_final`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// Run the artifact belongs to
    pub run: RunId,
    /// Which kind won the priority order
    pub kind: ArtifactKind,
    /// Absolute location
    pub path: PathBuf,
}

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`
    ///
    /// A relative root is anchored to the current directory here, so every
    /// path handed to a tool stays valid whatever directory the tool runs in.
    /// Nothing is touched on disk until a run is allocated.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: absolute(root),
        }
    }

    /// Storage root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mint a fresh run identity and create its directory tree
    ///
    /// # Errors
    /// Returns `ArtifactError::Io` if the directories cannot be created and
    /// `ArtifactError::AllocationExhausted` if every minted id collided.
    pub fn allocate_run(&self) -> Result<RunId, ArtifactError> {
        fs::create_dir_all(&self.root).map_err(|e| ArtifactError::io(&self.root, e))?;

        for _ in 0..ALLOCATE_ATTEMPTS {
            let run = RunId::new();
            let dir = self.run_dir(run);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    let mesh_dir = dir.join(MESH_DIR);
                    fs::create_dir_all(&mesh_dir).map_err(|e| ArtifactError::io(&mesh_dir, e))?;
                    tracing::debug!(run = %run, dir = %dir.display(), "allocated run directory");
                    return Ok(run);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::warn!(run = %run, "run directory already exists, minting another id");
                }
                Err(e) => return Err(ArtifactError::io(&dir, e)),
            }
        }

        Err(ArtifactError::AllocationExhausted(ALLOCATE_ATTEMPTS))
    }

    /// Directory holding all artifacts of `run`
    #[inline]
    #[must_use]
    pub fn run_dir(&self, run: RunId) -> PathBuf {
        self.root.join(run.to_string())
    }

    /// Canonical path of `kind` for `run`
    ///
    /// Pure: does not touch the filesystem, and always returns the same path
    /// for the same arguments and root.
    #[inline]
    #[must_use]
    pub fn path_for(&self, run: RunId, kind: ArtifactKind) -> PathBuf {
        self.run_dir(run).join(kind.relative_path())
    }

    /// Whether `kind` exists for `run` and is non-empty
    #[must_use]
    pub fn is_present(&self, run: RunId, kind: ArtifactKind) -> bool {
        is_non_empty_file(&self.path_for(run, kind))
    }

    /// Path of `kind` for `run`, provided it exists and is non-empty
    ///
    /// # Errors
    /// Returns `ArtifactError::Missing` otherwise.
    pub fn require(&self, run: RunId, kind: ArtifactKind) -> Result<PathBuf, ArtifactError> {
        let path = self.path_for(run, kind);
        if is_non_empty_file(&path) {
            Ok(path)
        } else {
            Err(ArtifactError::Missing { kind, path })
        }
    }

    /// Kinds currently present for `run`, in pipeline order
    #[must_use]
    pub fn present_kinds(&self, run: RunId) -> Vec<ArtifactKind> {
        ArtifactKind::ALL
            .into_iter()
            .filter(|kind| self.is_present(run, *kind))
            .collect()
    }

    /// Find the run addressed by a caller-supplied identity or prefix
    ///
    /// Accepts the full 32-character identity, or a hex prefix of at least
    /// [`MIN_PREFIX_LEN`] characters that matches exactly one run directory.
    /// Anything else (including strings with non-hex characters) yields
    /// `None`.
    #[must_use]
    pub fn locate_run(&self, identity: &str) -> Option<RunId> {
        let identity = identity.trim().to_ascii_lowercase();
        if !is_hex(&identity) {
            return None;
        }

        if identity.len() == RUN_ID_LEN {
            let run: RunId = identity.parse().ok()?;
            return self.run_dir(run).is_dir().then_some(run);
        }

        if identity.len() < MIN_PREFIX_LEN || identity.len() > RUN_ID_LEN {
            return None;
        }

        let entries = fs::read_dir(&self.root).ok()?;
        let mut matches = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str()?.parse::<RunId>().ok())
            .filter(|run| run.to_string().starts_with(&identity));

        let first = matches.next()?;
        if matches.next().is_some() {
            tracing::debug!(prefix = %identity, "run prefix is ambiguous");
            return None;
        }
        Some(first)
    }

    /// Resolve a caller-supplied identity to its best deliverable
    ///
    /// Candidates are tried in [`FINAL_PRIORITY`] order and the first one that
    /// exists on disk wins. A missing directory is not an error condition
    /// here; it simply resolves to `NotFound`.
    ///
    /// # Errors
    /// Returns `ArtifactError::NotFound` when nothing matches.
    pub fn resolve_final(&self, identity: &str) -> Result<ResolvedArtifact, ArtifactError> {
        let not_found = || ArtifactError::NotFound(identity.to_string());
        let run = self.locate_run(identity).ok_or_else(not_found)?;

        FINAL_PRIORITY
            .into_iter()
            .map(|kind| (kind, self.path_for(run, kind)))
            .find(|(_, path)| is_non_empty_file(path))
            .map(|(kind, path)| {
                tracing::debug!(run = %run, kind = %kind, "resolved final artifact");
                ResolvedArtifact { run, kind, path }
            })
            .ok_or_else(not_found)
    }
}

fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Errors related to artifact storage
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Filesystem operation failed
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Required artifact absent or empty
    #[error("missing {kind} artifact at {path}")]
    Missing { kind: ArtifactKind, path: PathBuf },

    /// No deliverable for the requested identity
    #[error("no artifact found for '{0}'")]
    NotFound(String),

    /// Could not mint a unique run id
    #[error("could not allocate a unique run directory after {0} attempts")]
    AllocationExhausted(usize),
}

/// `path` joined onto the current directory unless already absolute
///
/// Purely lexical: nothing is resolved on disk. If the current directory is
/// unreadable the path is returned as given.
#[must_use]
pub fn absolute(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot anchor relative path");
            path
        }
    }
}

impl ArtifactError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the error means "nothing there" rather than a storage fault
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Missing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn relative_root_is_anchored_to_current_dir() {
        let store = ArtifactStore::new("outputs");
        assert!(store.root().is_absolute());
        assert_eq!(store.root(), std::env::current_dir().unwrap().join("outputs"));

        let run = RunId::new();
        assert!(store.path_for(run, ArtifactKind::RawMesh).is_absolute());
    }

    #[test]
    fn absolute_root_is_kept() {
        let dir = TempDir::new().unwrap();
        assert_eq!(ArtifactStore::new(dir.path()).root(), dir.path());
    }

    fn store() -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("outputs"));
        (dir, store)
    }

    fn write(store: &ArtifactStore, run: RunId, kind: ArtifactKind, bytes: &[u8]) {
        fs::write(store.path_for(run, kind), bytes).unwrap();
    }

    #[test]
    fn allocate_creates_run_tree() {
        let (_dir, store) = store();
        let run = store.allocate_run().unwrap();
        assert!(store.run_dir(run).is_dir());
        assert!(store.run_dir(run).join(MESH_DIR).is_dir());
    }

    #[test]
    fn allocate_mints_distinct_runs() {
        let (_dir, store) = store();
        let a = store.allocate_run().unwrap();
        let b = store.allocate_run().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn path_for_is_idempotent() {
        let (_dir, store) = store();
        let run = RunId::new();
        for kind in ArtifactKind::ALL {
            assert_eq!(store.path_for(run, kind), store.path_for(run, kind));
        }
    }

    #[test]
    fn path_for_agrees_across_store_instances() {
        let (_dir, store) = store();
        let other = ArtifactStore::new(store.root().to_path_buf());
        let run = RunId::new();
        assert_eq!(
            store.path_for(run, ArtifactKind::SkinnedFbx),
            other.path_for(run, ArtifactKind::SkinnedFbx)
        );
    }

    #[test]
    fn require_rejects_empty_file() {
        let (_dir, store) = store();
        let run = store.allocate_run().unwrap();
        write(&store, run, ArtifactKind::RawMesh, b"");
        assert!(matches!(
            store.require(run, ArtifactKind::RawMesh),
            Err(ArtifactError::Missing { kind: ArtifactKind::RawMesh, .. })
        ));

        write(&store, run, ArtifactKind::RawMesh, b"glTF");
        assert!(store.require(run, ArtifactKind::RawMesh).is_ok());
    }

    #[test]
    fn resolve_missing_directory_is_not_found() {
        let (_dir, store) = store();
        let result = store.resolve_final(&RunId::new().to_string());
        assert!(matches!(result, Err(ArtifactError::NotFound(_))));
    }

    #[test]
    fn resolve_empty_run_is_not_found() {
        let (_dir, store) = store();
        let run = store.allocate_run().unwrap();
        assert!(store.resolve_final(&run.to_string()).is_err());
    }

    #[test]
    fn resolve_prefers_rigged_variants() {
        let (_dir, store) = store();
        let run = store.allocate_run().unwrap();
        let id = run.to_string();

        write(&store, run, ArtifactKind::RawMesh, b"mesh");
        assert_eq!(store.resolve_final(&id).unwrap().kind, ArtifactKind::RawMesh);

        write(&store, run, ArtifactKind::MergedAsset, b"rigged");
        assert_eq!(store.resolve_final(&id).unwrap().kind, ArtifactKind::MergedAsset);

        write(&store, run, ArtifactKind::FinalColoredAsset, b"colored");
        let resolved = store.resolve_final(&id).unwrap();
        assert_eq!(resolved.kind, ArtifactKind::FinalColoredAsset);
        assert_eq!(resolved.path, store.path_for(run, ArtifactKind::FinalColoredAsset));
    }

    #[test]
    fn resolve_accepts_unique_prefix() {
        let (_dir, store) = store();
        let run = store.allocate_run().unwrap();
        write(&store, run, ArtifactKind::RawMesh, b"mesh");

        let prefix = &run.to_string()[..MIN_PREFIX_LEN];
        assert_eq!(store.resolve_final(prefix).unwrap().run, run);
    }

    #[test]
    fn resolve_rejects_short_prefix_and_traversal() {
        let (_dir, store) = store();
        let run = store.allocate_run().unwrap();
        write(&store, run, ArtifactKind::RawMesh, b"mesh");

        assert!(store.resolve_final(&run.to_string()[..4]).is_err());
        assert!(store.resolve_final("../outputs").is_err());
        assert!(store.resolve_final("").is_err());
    }

    #[test]
    fn present_kinds_in_pipeline_order() {
        let (_dir, store) = store();
        let run = store.allocate_run().unwrap();
        write(&store, run, ArtifactKind::SkeletonFbx, b"fbx");
        write(&store, run, ArtifactKind::GeneratedImage, b"png");
        assert_eq!(
            store.present_kinds(run),
            vec![ArtifactKind::GeneratedImage, ArtifactKind::SkeletonFbx]
        );
    }
}
