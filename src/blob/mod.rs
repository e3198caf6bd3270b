//! Blob storage
//!
//! Every read's name and sequence data live in a single immutable *blob*: an outer
//! `BLOB` chunk wrapping a sequence of tagged sub-chunks. Blobs are appended to a series
//! of capped files named `blobs.0000`, `blobs.0001`, ... and addressed by a [`Locator`].
//!
//! ```text
//! BLOB <u32 len> | NAME <u32 len> name | 2SQR <u32 len> bases | USQC <u32 len> bases
//! ```

mod chunk;
mod reader;
mod writer;

pub use chunk::{BlobBuilder, Chunk, ChunkIter, SIZE_CHUNK_HEADER, TAG_BLOB, TAG_NAME};
pub use reader::BlobReader;
pub use writer::BlobWriter;

use std::path::{Path, PathBuf};

/// Blob files are capped at 1 GiB
pub const BLOB_FILE_MAX_SIZE: u64 = 1024 * 1024 * 1024;

/// Largest blob file index a locator can address (16 bits)
pub const MAX_BLOB_FILES: u32 = (1 << 16) - 1;

/// Largest byte offset a locator can address (40 bits)
pub const MAX_BLOB_OFFSET: u64 = (1 << 40) - 1;

/// Position of a blob: the blob file index and the byte offset inside that file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Locator {
    pub file: u16,
    pub offset: u64,
}
impl Locator {
    #[must_use]
    pub fn new(file: u16, offset: u64) -> Self {
        Self { file, offset }
    }
}

/// Path of blob file `index` in `dir`
#[must_use]
pub fn blob_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("blobs.{index:04}"))
}
