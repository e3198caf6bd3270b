use byteorder::{ByteOrder, LittleEndian};

use crate::error::{BlobError, Result};

/// Tag of the outer chunk that starts every blob
pub const TAG_BLOB: [u8; 4] = *b"BLOB";
/// Tag of the chunk holding the read name
pub const TAG_NAME: [u8; 4] = *b"NAME";
/// Size of a chunk header: 4-byte tag and u32 length
pub const SIZE_CHUNK_HEADER: usize = 8;

/// Assembles the bytes of one blob
///
/// The outer length is patched in by [`BlobBuilder::finish`].
#[derive(Debug, Clone)]
pub struct BlobBuilder {
    buf: Vec<u8>,
}
impl Default for BlobBuilder {
    fn default() -> Self {
        Self::new()
    }
}
impl BlobBuilder {
    #[must_use]
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(1024);
        buf.extend_from_slice(&TAG_BLOB);
        buf.extend_from_slice(&[0; 4]);
        Self { buf }
    }

    /// Appends a sub-chunk
    pub fn push_chunk(&mut self, tag: [u8; 4], data: &[u8]) {
        let mut header = [0; SIZE_CHUNK_HEADER];
        header[..4].copy_from_slice(&tag);
        LittleEndian::write_u32(&mut header[4..], data.len() as u32);
        self.buf.extend_from_slice(&header);
        self.buf.extend_from_slice(data);
    }

    /// Writes the outer length and returns the finished blob
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        let payload = (self.buf.len() - SIZE_CHUNK_HEADER) as u32;
        LittleEndian::write_u32(&mut self.buf[4..8], payload);
        self.buf
    }
}

/// A tagged sub-chunk borrowed from a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub tag: [u8; 4],
    pub data: &'a [u8],
}

/// Iterates the sub-chunks of a blob payload
pub struct ChunkIter<'a> {
    payload: &'a [u8],
    pos: usize,
    file: u16,
    offset: u64,
}
impl<'a> ChunkIter<'a> {
    /// Validates the outer `BLOB` header of `blob` and iterates its sub-chunks
    ///
    /// `file` and `offset` only locate the blob for error reporting.
    pub fn new(blob: &'a [u8], file: u16, offset: u64) -> Result<Self> {
        let len = blob_len(blob, file, offset)?;
        if blob.len() < SIZE_CHUNK_HEADER + len {
            return Err(BlobError::Truncated { file, offset }.into());
        }
        Ok(Self {
            payload: &blob[SIZE_CHUNK_HEADER..SIZE_CHUNK_HEADER + len],
            pos: 0,
            file,
            offset,
        })
    }
}
impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.payload.len() {
            return None;
        }
        let rest = &self.payload[self.pos..];
        if rest.len() < SIZE_CHUNK_HEADER {
            self.pos = self.payload.len();
            return Some(Err(BlobError::Truncated {
                file: self.file,
                offset: self.offset,
            }
            .into()));
        }
        let mut tag = [0; 4];
        tag.copy_from_slice(&rest[..4]);
        let len = LittleEndian::read_u32(&rest[4..8]) as usize;
        if rest.len() < SIZE_CHUNK_HEADER + len {
            self.pos = self.payload.len();
            return Some(Err(BlobError::Truncated {
                file: self.file,
                offset: self.offset,
            }
            .into()));
        }
        self.pos += SIZE_CHUNK_HEADER + len;
        Some(Ok(Chunk {
            tag,
            data: &rest[SIZE_CHUNK_HEADER..SIZE_CHUNK_HEADER + len],
        }))
    }
}

/// Checks the outer `BLOB` tag at the start of `bytes` and returns the payload length
pub(crate) fn blob_len(bytes: &[u8], file: u16, offset: u64) -> Result<usize> {
    if bytes.len() < SIZE_CHUNK_HEADER {
        return Err(BlobError::Truncated { file, offset }.into());
    }
    let mut found = [0; 4];
    found.copy_from_slice(&bytes[..4]);
    if found != TAG_BLOB {
        return Err(BlobError::InvalidTag {
            expected: "BLOB",
            found,
            file,
            offset,
        }
        .into());
    }
    Ok(LittleEndian::read_u32(&bytes[4..8]) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_iterate() -> Result<()> {
        let mut builder = BlobBuilder::new();
        builder.push_chunk(TAG_NAME, b"read1");
        builder.push_chunk(*b"USQR", b"ACGTN");
        let blob = builder.finish();

        assert_eq!(&blob[..4], b"BLOB");
        assert_eq!(
            LittleEndian::read_u32(&blob[4..8]) as usize,
            blob.len() - SIZE_CHUNK_HEADER
        );

        let chunks = ChunkIter::new(&blob, 0, 0)?.collect::<Result<Vec<_>>>()?;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].tag, TAG_NAME);
        assert_eq!(chunks[0].data, b"read1");
        assert_eq!(chunks[1].tag, *b"USQR");
        assert_eq!(chunks[1].data, b"ACGTN");
        Ok(())
    }

    #[test]
    fn test_bad_tag_is_fatal() {
        let bytes = b"BLOX\x00\x00\x00\x00";
        let err = ChunkIter::new(bytes, 3, 17).err().map(|e| e.is_fatal());
        assert_eq!(err, Some(true));
    }

    #[test]
    fn test_truncated_chunk() -> Result<()> {
        let mut builder = BlobBuilder::new();
        builder.push_chunk(TAG_NAME, b"read1");
        let mut blob = builder.finish();
        // Claim a longer name than is present
        LittleEndian::write_u32(&mut blob[12..16], 50);

        let mut iter = ChunkIter::new(&blob, 0, 0)?;
        assert!(iter.next().is_some_and(|c| c.is_err()));
        assert!(iter.next().is_none());
        Ok(())
    }
}
