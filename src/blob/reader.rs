use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use memmap2::Mmap;

use super::{blob_path, chunk::blob_len, Locator, SIZE_CHUNK_HEADER};
use crate::error::{BlobError, Result};

/// Fetches blobs by locator from memory-mapped blob files
///
/// Each reader keeps its own lazily built pool of maps, one per blob file index, so
/// independent readers can be used from different threads at the same time. A file
/// that has grown since it was mapped (because the store is still appending to it) is
/// remapped when a locator points past the mapped end.
///
/// Cloning a reader shares the maps built so far.
#[derive(Clone)]
pub struct BlobReader {
    dir: PathBuf,
    maps: Vec<Option<Arc<Mmap>>>,
}
impl BlobReader {
    #[must_use]
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            maps: Vec::new(),
        }
    }

    /// Directory the blob files are read from
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the memory map of blob file `file`, covering at least `need` bytes if the
    /// file is that large
    fn map(&mut self, file: u16, need: u64) -> Result<&Mmap> {
        let index = file as usize;
        if self.maps.len() <= index {
            self.maps.resize(index + 1, None);
        }
        let covered = self.maps[index]
            .as_ref()
            .is_some_and(|mmap| mmap.len() as u64 >= need);
        if !covered {
            let handle = File::open(blob_path(&self.dir, u32::from(file)))?;

            // Safety: blob bytes are never rewritten once appended
            let mmap = unsafe { Mmap::map(&handle)? };
            self.maps[index] = Some(Arc::new(mmap));
        }
        self.maps[index]
            .as_deref()
            .ok_or_else(|| BlobError::Truncated { file, offset: need }.into())
    }

    /// Returns the bytes of the blob at `locator`, outer header included
    ///
    /// # Errors
    ///
    /// Fails with a fatal [`BlobError::InvalidTag`] if the bytes at the locator do not
    /// start a blob, and with [`BlobError::Truncated`] if the blob runs past the end of
    /// its file.
    pub fn fetch(&mut self, locator: Locator) -> Result<&[u8]> {
        let Locator { file, offset } = locator;
        let start = offset as usize;

        let len = {
            let mmap = self.map(file, offset + SIZE_CHUNK_HEADER as u64)?;
            if mmap.len() < start + SIZE_CHUNK_HEADER {
                return Err(BlobError::Truncated { file, offset }.into());
            }
            blob_len(&mmap[start..], file, offset)?
        };
        let end = start + SIZE_CHUNK_HEADER + len;

        let mmap = self.map(file, end as u64)?;
        if mmap.len() < end {
            return Err(BlobError::Truncated { file, offset }.into());
        }
        Ok(&mmap[start..end])
    }
}
