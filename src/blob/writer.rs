use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use super::{blob_path, Locator, BLOB_FILE_MAX_SIZE, MAX_BLOB_FILES, MAX_BLOB_OFFSET};
use crate::error::{BlobError, Result};

/// Appends blobs to a series of capped blob files
///
/// The writer opens its first file lazily, on the first append. Before every append it
/// checks the size of the current file: once it has reached the cap the file is closed,
/// marked read-only and the next file is started. A blob is never split across files.
///
/// A writer always starts a new file, even when reopening a store, so files written by
/// an earlier session are never touched again.
pub struct BlobWriter {
    /// Directory holding the blob files
    dir: PathBuf,

    /// Currently open file and its index
    file: Option<(u32, BufWriter<File>)>,

    /// Number of blob files that exist, including the open one
    num_files: u32,

    /// Bytes written to the open file
    position: u64,

    /// File size cap
    cap: u64,
}
impl BlobWriter {
    /// Creates a writer that will add files after the `num_files` that already exist
    #[must_use]
    pub fn new<P: AsRef<Path>>(dir: P, num_files: u32) -> Self {
        Self::with_cap(dir, num_files, BLOB_FILE_MAX_SIZE)
    }

    /// Creates a writer with a custom file size cap
    #[must_use]
    pub fn with_cap<P: AsRef<Path>>(dir: P, num_files: u32, cap: u64) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            file: None,
            num_files,
            position: 0,
            cap: cap.max(1),
        }
    }

    /// Number of blob files that exist, including the one currently being written
    #[must_use]
    pub fn num_files(&self) -> u32 {
        self.num_files
    }

    /// Appends one complete blob and returns its locator
    pub fn append(&mut self, blob: &[u8]) -> Result<Locator> {
        if self.file.is_none() || self.position >= self.cap {
            self.roll()?;
        }
        let Some((index, writer)) = self.file.as_mut() else {
            return Err(io::Error::other("blob file is not open").into());
        };
        if self.position > MAX_BLOB_OFFSET {
            return Err(BlobError::OffsetOverflow(self.position).into());
        }

        let locator = Locator::new(*index as u16, self.position);
        writer.write_all(blob)?;
        self.position += blob.len() as u64;
        Ok(locator)
    }

    /// Flushes buffered blobs so that readers can see them
    pub fn flush(&mut self) -> Result<()> {
        if let Some((_, writer)) = self.file.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Flushes and closes the current file, marking it read-only
    pub fn finish(&mut self) -> Result<()> {
        if let Some((index, mut writer)) = self.file.take() {
            writer.flush()?;
            drop(writer);
            self.retire(index)?;
        }
        self.position = 0;
        Ok(())
    }

    /// Retires the current file (if any) and opens the next one
    fn roll(&mut self) -> Result<()> {
        self.finish()?;

        let index = self.num_files;
        if index > MAX_BLOB_FILES {
            return Err(BlobError::TooManyFiles(index).into());
        }
        let path = blob_path(&self.dir, index);
        if path.exists() {
            // Left behind by a session that never recorded it, or by a revert
            log::warn!("replacing unreferenced blob file {}", path.display());
            fs::remove_file(&path)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        log::debug!("opened blob file {}", path.display());

        self.file = Some((index, BufWriter::new(file)));
        self.num_files += 1;
        self.position = 0;
        Ok(())
    }

    fn retire(&self, index: u32) -> Result<()> {
        let path = blob_path(&self.dir, index);
        let mut permissions = fs::metadata(&path)?.permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&path, permissions)?;
        log::debug!("retired blob file {}", path.display());
        Ok(())
    }
}
impl Drop for BlobWriter {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            log::error!("failed to close blob file in {}: {err}", self.dir.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobBuilder, BlobReader, ChunkIter, TAG_NAME};

    fn blob(name: &[u8]) -> Vec<u8> {
        let mut builder = BlobBuilder::new();
        builder.push_chunk(TAG_NAME, name);
        builder.finish()
    }

    #[test]
    fn test_lazy_open() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut writer = BlobWriter::new(dir.path(), 0);
        assert_eq!(writer.num_files(), 0);
        writer.finish()?;
        assert!(!blob_path(dir.path(), 0).exists());

        let loc = writer.append(&blob(b"r1"))?;
        assert_eq!(loc, Locator::new(0, 0));
        assert_eq!(writer.num_files(), 1);
        Ok(())
    }

    #[test]
    fn test_capacity_rollover() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let one = blob(b"read-00");
        let mut writer = BlobWriter::with_cap(dir.path(), 0, 2 * one.len() as u64 + 1);

        let mut locators = Vec::new();
        for i in 0..7 {
            locators.push(writer.append(&blob(format!("read-{i:02}").as_bytes()))?);
        }
        writer.finish()?;

        // Three blobs fill a file past the cap, then the next one rolls over
        let files: Vec<u16> = locators.iter().map(|l| l.file).collect();
        assert_eq!(files, vec![0, 0, 0, 1, 1, 1, 2]);
        assert_eq!(locators[3].offset, 0);
        assert_eq!(writer.num_files(), 3);

        // Nothing was split across files
        let mut reader = BlobReader::new(dir.path());
        for (i, loc) in locators.iter().enumerate() {
            let bytes = reader.fetch(*loc)?;
            let chunk = ChunkIter::new(bytes, loc.file, loc.offset)?
                .next()
                .ok_or_else(|| anyhow::anyhow!("empty blob"))??;
            assert_eq!(chunk.data, format!("read-{i:02}").as_bytes());
        }

        assert!(fs::metadata(blob_path(dir.path(), 0))?
            .permissions()
            .readonly());
        Ok(())
    }

    #[test]
    fn test_reopen_starts_new_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut writer = BlobWriter::new(dir.path(), 0);
        writer.append(&blob(b"a"))?;
        writer.finish()?;

        let mut writer = BlobWriter::new(dir.path(), writer.num_files());
        let loc = writer.append(&blob(b"b"))?;
        assert_eq!(loc, Locator::new(1, 0));
        Ok(())
    }
}
