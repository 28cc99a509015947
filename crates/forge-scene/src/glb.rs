//! Binary glTF (GLB) container codec
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! header  : magic "glTF" | version 2 | total length
//! chunk 0 : length | "JSON" | document, space-padded to 4 bytes
//! chunk 1 : length | "BIN\0" | buffer 0 bytes, zero-padded to 4 bytes (optional)
//! ```
//!
//! On load, only the first buffer may live in the binary chunk and no buffer
//! may point at an external URI. On save, every buffer is packed into the
//! single binary chunk and buffer views are rewritten against it, so the
//! output is always self-contained.

use crate::document::{Buffer, Document};
use crate::error::SceneError;
use std::fs;
use std::io::Write;
use std::path::Path;

/// `glTF` as a little-endian u32
pub const GLB_MAGIC: u32 = 0x4654_6C67;
/// Supported container version
pub const GLB_VERSION: u32 = 2;
/// `JSON` chunk type
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
/// `BIN\0` chunk type
pub const CHUNK_BIN: u32 = 0x004E_4942;

const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// A loaded scene: document plus the bytes of each of its buffers
///
/// `buffers[i]` holds the data of `document.buffers[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneContainer {
    pub document: Document,
    pub buffers: Vec<Vec<u8>>,
}

impl SceneContainer {
    #[inline]
    #[must_use]
    pub fn new(document: Document, buffers: Vec<Vec<u8>>) -> Self {
        Self { document, buffers }
    }

    /// Decode a GLB byte stream
    ///
    /// # Errors
    /// Returns a `SceneError` describing the first structural problem found.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SceneError> {
        if bytes.len() < HEADER_LEN {
            return Err(SceneError::Truncated("header"));
        }
        let magic = read_u32(bytes, 0);
        if magic != GLB_MAGIC {
            return Err(SceneError::BadMagic(magic));
        }
        let version = read_u32(bytes, 4);
        if version != GLB_VERSION {
            return Err(SceneError::UnsupportedVersion(version));
        }
        let total = read_u32(bytes, 8) as usize;
        let data = bytes
            .get(..total)
            .ok_or(SceneError::Truncated("declared length"))?;

        let mut json = None;
        let mut bin = None;
        let mut offset = HEADER_LEN;
        while offset + CHUNK_HEADER_LEN <= data.len() {
            let len = read_u32(data, offset) as usize;
            let kind = read_u32(data, offset + 4);
            let start = offset + CHUNK_HEADER_LEN;
            let chunk = start
                .checked_add(len)
                .and_then(|end| data.get(start..end))
                .ok_or(SceneError::Truncated("chunk"))?;
            match kind {
                CHUNK_JSON if json.is_none() => json = Some(chunk),
                CHUNK_BIN if bin.is_none() => bin = Some(chunk),
                // Unknown chunk types must be ignored
                _ => {}
            }
            offset = start + len;
        }

        let json = json.ok_or(SceneError::MissingJson)?;
        let document: Document = serde_json::from_slice(trim_padding(json))?;

        let mut buffers = Vec::with_capacity(document.buffers.len());
        for (index, buffer) in document.buffers.iter().enumerate() {
            if let Some(uri) = &buffer.uri {
                return Err(SceneError::ExternalBuffer {
                    index,
                    uri: uri.clone(),
                });
            }
            if index > 0 {
                return Err(SceneError::Malformed(format!(
                    "buffer {index} has no uri; only buffer 0 may use the binary chunk"
                )));
            }
            let chunk = bin.unwrap_or_default();
            let bytes = chunk
                .get(..buffer.byte_length)
                .ok_or(SceneError::BufferTooShort {
                    index,
                    declared: buffer.byte_length,
                    actual: chunk.len(),
                })?;
            buffers.push(bytes.to_vec());
        }

        Ok(Self { document, buffers })
    }

    /// Read and decode the container at `path`
    ///
    /// # Errors
    /// Returns `SceneError::Io` on read failure, otherwise as [`Self::from_slice`].
    pub fn read(path: &Path) -> Result<Self, SceneError> {
        let bytes = fs::read(path).map_err(|e| SceneError::io(path, e))?;
        Self::from_slice(&bytes)
    }

    /// Encode as a self-contained GLB
    ///
    /// All buffers are packed into one binary chunk at 4-byte aligned
    /// offsets; buffer views are rebased onto buffer 0.
    ///
    /// # Errors
    /// Returns `SceneError::ExternalBuffer` for buffers with a URI,
    /// `SceneError::Malformed` when views or buffer data do not line up with
    /// the document, and `SceneError::TooLarge` past the 4 GiB limit.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SceneError> {
        let declared = &self.document.buffers;
        if declared.len() != self.buffers.len() {
            return Err(SceneError::Malformed(format!(
                "{} buffers declared but {} provided",
                declared.len(),
                self.buffers.len()
            )));
        }
        if let Some((index, uri)) = declared
            .iter()
            .enumerate()
            .find_map(|(i, b)| b.uri.as_ref().map(|u| (i, u.clone())))
        {
            return Err(SceneError::ExternalBuffer { index, uri });
        }

        let mut bin = Vec::new();
        let mut bases = Vec::with_capacity(self.buffers.len());
        for data in &self.buffers {
            pad_to_four(&mut bin, 0);
            bases.push(bin.len());
            bin.extend_from_slice(data);
        }

        let mut document = self.document.clone();
        for (index, view) in document.buffer_views.iter_mut().enumerate() {
            let base = bases.get(view.buffer).copied().ok_or_else(|| {
                SceneError::Malformed(format!(
                    "buffer view {index} references missing buffer {}",
                    view.buffer
                ))
            })?;
            view.buffer = 0;
            view.byte_offset += base;
        }
        document.buffers = match declared.first() {
            Some(first) => vec![Buffer {
                byte_length: bin.len(),
                uri: None,
                extra: first.extra.clone(),
            }],
            None => Vec::new(),
        };

        let mut json = serde_json::to_vec(&document)?;
        pad_to_four(&mut json, b' ');
        pad_to_four(&mut bin, 0);

        let mut total = HEADER_LEN + CHUNK_HEADER_LEN + json.len();
        if !document.buffers.is_empty() {
            total += CHUNK_HEADER_LEN + bin.len();
        }
        let total_u32 = u32::try_from(total).map_err(|_| SceneError::TooLarge(total))?;

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
        out.extend_from_slice(&GLB_VERSION.to_le_bytes());
        out.extend_from_slice(&total_u32.to_le_bytes());
        push_chunk(&mut out, CHUNK_JSON, &json);
        if !document.buffers.is_empty() {
            push_chunk(&mut out, CHUNK_BIN, &bin);
        }
        Ok(out)
    }

    /// Encode and write to `path` atomically
    ///
    /// # Errors
    /// Returns any encoding error before touching the filesystem, or
    /// `SceneError::Io` if the write fails. `path` is never left half-written.
    pub fn write(&self, path: &Path) -> Result<(), SceneError> {
        let bytes = self.to_bytes()?;
        write_atomic(path, &bytes)
    }
}

/// Write `bytes` to a temporary sibling of `path`, then rename it into place
///
/// # Errors
/// Returns `SceneError::Io` on any failure; the destination is untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SceneError> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(parent).map_err(|e| SceneError::io(parent, e))?;
    file.write_all(bytes).map_err(|e| SceneError::io(file.path(), e))?;
    file.as_file()
        .sync_all()
        .map_err(|e| SceneError::io(file.path(), e))?;
    file.persist(path)
        .map_err(|e| SceneError::io(path, e.error))?;
    Ok(())
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn pad_to_four(buf: &mut Vec<u8>, fill: u8) {
    while buf.len() % 4 != 0 {
        buf.push(fill);
    }
}

fn push_chunk(out: &mut Vec<u8>, kind: u32, data: &[u8]) {
    // Chunk data is already padded, so its length fits in the total checked above
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(data);
}

fn trim_padding(json: &[u8]) -> &[u8] {
    let end = json
        .iter()
        .rposition(|b| !matches!(b, b' ' | 0))
        .map_or(0, |i| i + 1);
    &json[..end]
}
