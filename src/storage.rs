//! Single-file persisted image of a [`VectorStore`].
//!
//! Layout (little-endian):
//!
//! ```text
//! [magic "FEAT" (4b)][version (2b)][reserved (2b)][dim (4b)][count (8b)]
//! count x [id (8b)][dim x f32 (4b each)]
//! [seahash of everything above (8b)]
//! ```

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::config::DuplicatePolicy;
use crate::error::{FeatherError, Result};
use crate::store::VectorStore;

pub const MAGIC: [u8; 4] = *b"FEAT";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 20;
pub const CHECKSUM_LEN: usize = 8;

/// Sibling path the image is staged at before the rename.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn encode_header(dim: usize, count: usize) -> Result<[u8; HEADER_LEN]> {
    let dim = u32::try_from(dim)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "dimension exceeds u32"))?;
    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(&MAGIC);
    header[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    // 6..8 reserved
    header[8..12].copy_from_slice(&dim.to_le_bytes());
    header[12..20].copy_from_slice(&(count as u64).to_le_bytes());
    Ok(header)
}

/// Serializes `store` into a complete image, checksum included.
pub fn encode(store: &VectorStore) -> Result<Vec<u8>> {
    let record_len = 8 + store.dim() * 4;
    let mut image = Vec::with_capacity(HEADER_LEN + store.len() * record_len + CHECKSUM_LEN);

    image.extend_from_slice(&encode_header(store.dim(), store.len())?);
    for (id, vector) in store.iter() {
        image.extend_from_slice(&id.to_le_bytes());
        for val in vector {
            image.extend_from_slice(&val.to_le_bytes());
        }
    }

    let checksum = seahash::hash(&image);
    image.extend_from_slice(&checksum.to_le_bytes());
    Ok(image)
}

fn write_image(mut file: File, image: &[u8], sync: bool) -> io::Result<()> {
    file.write_all(image)?;
    file.flush()?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}

/// Writes `store` to `path` atomically: the image is staged next to the
/// target and renamed over it only once fully written. On failure the
/// staging file is removed and any previous image is left as it was.
pub fn save(path: &Path, store: &VectorStore, sync: bool) -> Result<()> {
    let image = encode(store)?;
    let tmp = temp_path(path);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)?;

    let written = write_image(file, &image, sync).and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            warn!(path = ?tmp, error = %cleanup, "Failed to remove staging file");
        }
        return Err(e.into());
    }

    if sync {
        sync_parent_dir(path);
    }
    debug!(path = ?path, count = store.len(), "Image written");
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    // Best effort: the rename has already landed
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        warn!(dir = ?parent, error = %e, "Directory fsync failed");
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

/// Reads an image written by [`save`]. The persisted dimension must equal
/// `expected_dim`.
pub fn load(path: &Path, expected_dim: usize, duplicates: DuplicatePolicy) -> Result<VectorStore> {
    if expected_dim == 0 {
        return Err(FeatherError::InvalidDimension);
    }

    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    if file_len < (HEADER_LEN + CHECKSUM_LEN) as u64 {
        return Err(FeatherError::corrupt(format!(
            "file is {} bytes, shorter than the header",
            file_len
        )));
    }

    // SAFETY: the map is read-only and dropped before returning. The bound
    // path is owned by this handle; concurrent external writers are not
    // supported.
    let mmap = unsafe { Mmap::map(&file)? };
    decode(&mmap, expected_dim, duplicates)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// Fixed-size header fields of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub version: u16,
    pub dim: usize,
    pub count: u64,
}

fn parse_header(bytes: &[u8]) -> Result<ImageHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(FeatherError::corrupt("truncated header"));
    }
    if bytes[0..4] != MAGIC {
        return Err(FeatherError::corrupt("bad magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(FeatherError::corrupt(format!("unsupported format version {}", version)));
    }
    let dim = read_u32(bytes, 8) as usize;
    if dim == 0 {
        return Err(FeatherError::corrupt("zero dimension in header"));
    }
    Ok(ImageHeader {
        version,
        dim,
        count: read_u64(bytes, 12),
    })
}

/// Reads only the header, without knowing the dimension up front.
pub fn read_header(path: &Path) -> Result<ImageHeader> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; HEADER_LEN];
    file.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => FeatherError::corrupt("truncated header"),
        _ => FeatherError::Io(e),
    })?;
    parse_header(&buf)
}

pub(crate) fn decode(bytes: &[u8], expected_dim: usize, duplicates: DuplicatePolicy) -> Result<VectorStore> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(FeatherError::corrupt("truncated header"));
    }
    let ImageHeader { dim, count, .. } = parse_header(bytes)?;

    let body_len = bytes.len() - HEADER_LEN - CHECKSUM_LEN;
    let record_len = 8 + dim * 4;
    if body_len % record_len != 0 {
        return Err(FeatherError::corrupt(format!(
            "body of {} bytes is not a whole number of {}-byte records",
            body_len, record_len
        )));
    }
    let present = (body_len / record_len) as u64;
    if present != count {
        return Err(FeatherError::corrupt(format!(
            "header declares {} records, file holds {}",
            count, present
        )));
    }

    let payload_end = bytes.len() - CHECKSUM_LEN;
    let stored_sum = read_u64(bytes, payload_end);
    if seahash::hash(&bytes[..payload_end]) != stored_sum {
        return Err(FeatherError::corrupt("checksum mismatch"));
    }

    // Structure is sound; only now is the dimension a caller error.
    if dim != expected_dim {
        return Err(FeatherError::DimensionMismatch {
            expected: expected_dim,
            actual: dim,
        });
    }

    let mut store = VectorStore::with_policy(dim, duplicates)?;
    store.reserve(present as usize);
    let mut vector = vec![0f32; dim];
    for record in bytes[HEADER_LEN..payload_end].chunks_exact(record_len) {
        let id = read_u64(record, 0);
        for (val, raw) in vector.iter_mut().zip(record[8..].chunks_exact(4)) {
            *val = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        }
        if store.contains(id) {
            return Err(FeatherError::corrupt(format!("duplicate id {}", id)));
        }
        store.insert(id, &vector)?;
    }
    Ok(store)
}
