use super::{Variant, MAX_READ_LEN};
use crate::{
    blob::{BlobBuilder, TAG_NAME},
    codec::{self, Codec},
    error::{Result, WriteError},
};

/// Maps input symbols to the stored alphabet
///
/// `acgtn` are upper cased, `U`/`u` become `T` and every other symbol becomes `N`.
const BASE_MAP: [u8; 256] = {
    let mut table = [b'N'; 256];
    table[b'A' as usize] = b'A';
    table[b'C' as usize] = b'C';
    table[b'G' as usize] = b'G';
    table[b'T' as usize] = b'T';
    table[b'a' as usize] = b'A';
    table[b'c' as usize] = b'C';
    table[b'g' as usize] = b'G';
    table[b't' as usize] = b'T';
    table[b'U' as usize] = b'T';
    table[b'u' as usize] = b'T';
    table
};

/// Converts arbitrary input bases to the stored alphabet (`ACGTN`)
#[must_use]
pub fn normalize_bases(bases: &[u8]) -> Vec<u8> {
    bases.iter().map(|&b| BASE_MAP[b as usize]).collect()
}

/// Collects the data of one read before it is committed to the store
///
/// A writer is handed out by [`SeqStore::begin_read`](crate::SeqStore::begin_read) for
/// a new read, or by [`SeqStore::revise_read`](crate::SeqStore::revise_read) for an
/// existing one, and consumed by [`SeqStore::commit_read`](crate::SeqStore::commit_read).
#[derive(Debug, Clone)]
pub struct ReadWriter {
    id: u32,
    library_id: u32,
    name: String,
    raw: Option<Vec<u8>>,
    corrected: Option<Vec<u8>>,
    assignment: Option<(u16, u8)>,

    /// Variants (raw, corrected) already stored for a revised read
    stored: [bool; 2],

    /// True if this writer revises an existing read
    revision: bool,
}
impl ReadWriter {
    pub(crate) fn new(id: u32, library_id: u32, name: &str) -> Self {
        Self {
            id,
            library_id,
            name: name.to_string(),
            raw: None,
            corrected: None,
            assignment: None,
            stored: [false; 2],
            revision: false,
        }
    }

    pub(crate) fn revise(
        id: u32,
        library_id: u32,
        name: &str,
        raw: Option<Vec<u8>>,
        corrected: Option<Vec<u8>>,
    ) -> Self {
        Self {
            stored: [raw.is_some(), corrected.is_some()],
            raw,
            corrected,
            revision: true,
            ..Self::new(id, library_id, name)
        }
    }

    /// The ID the read will be committed under
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn library_id(&self) -> u32 {
        self.library_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_revision(&self) -> bool {
        self.revision
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Sets the raw bases; they are normalized to `ACGTN`
    pub fn set_raw_bases(&mut self, bases: &[u8]) -> Result<()> {
        if self.stored[0] {
            return Err(WriteError::VariantAlreadySet(self.id, "raw".to_string()).into());
        }
        self.raw = Some(normalize_bases(bases));
        Ok(())
    }

    /// Sets the corrected bases; they are normalized to `ACGTN`
    pub fn set_corrected_bases(&mut self, bases: &[u8]) -> Result<()> {
        if self.stored[1] {
            return Err(WriteError::VariantAlreadySet(self.id, "corrected".to_string()).into());
        }
        self.corrected = Some(normalize_bases(bases));
        Ok(())
    }

    /// Sets the opaque classification tag and its score
    ///
    /// Values wider than the record fields (15 and 7 bits) are clamped.
    pub fn set_assignment(&mut self, assignment: u16, score: u8) {
        self.assignment = Some((assignment, score));
    }

    pub(crate) fn assignment(&self) -> Option<(u16, u8)> {
        self.assignment
    }

    /// Encodes the read into a blob
    pub(crate) fn encode(&self) -> Result<EncodedRead> {
        let mut builder = BlobBuilder::new();
        builder.push_chunk(TAG_NAME, self.name.as_bytes());

        let mut lengths = [None; 4];
        let mut codecs = [None; 2];
        let mut ebuf = Vec::new();
        for (slot, bases) in [&self.raw, &self.corrected].into_iter().enumerate() {
            let Some(bases) = bases else { continue };
            if bases.len() > MAX_READ_LEN {
                return Err(WriteError::ReadTooLong {
                    id: self.id,
                    len: bases.len(),
                    max: MAX_READ_LEN,
                }
                .into());
            }
            let corrected = slot == 1;
            ebuf.clear();
            let codec = codec::encode(bases, &mut ebuf);
            builder.push_chunk(codec.tag(corrected), &ebuf);
            codecs[slot] = Some(codec);

            let normal = if corrected {
                Variant::CorrectedNormal
            } else {
                Variant::RawNormal
            };
            lengths[normal.index()] = Some(bases.len() as u32);
            lengths[normal.compressed().index()] = Some(codec::compressed_len(bases) as u32);
        }

        Ok(EncodedRead {
            blob: builder.finish(),
            lengths,
            codecs,
        })
    }
}

/// A read encoded for storage
pub(crate) struct EncodedRead {
    pub blob: Vec<u8>,
    /// Length of each variant present in the blob, by [`Variant::index`]
    pub lengths: [Option<u32>; 4],
    /// Codec chosen for the raw and corrected bases
    pub codecs: [Option<Codec>; 2],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blob::Locator,
        read::{Read, ReadMeta, SeqRecord, Which},
    };

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_bases(b"acgtnACGTN"), b"ACGTNACGTN");
        assert_eq!(normalize_bases(b"ACGU"), b"ACGT");
        assert_eq!(normalize_bases(b"AC-R*"), b"ACNNN");
    }

    #[test]
    fn test_encode_selects_codec() -> Result<()> {
        let mut writer = ReadWriter::new(1, 1, "r1");
        writer.set_raw_bases(b"ACGTACGT")?;
        writer.set_corrected_bases(b"ACGTNACGT")?;
        let encoded = writer.encode()?;
        assert_eq!(encoded.codecs, [Some(Codec::TwoBit), Some(Codec::Unencoded)]);
        assert_eq!(encoded.lengths, [Some(8), Some(8), Some(9), Some(9)]);
        Ok(())
    }

    #[test]
    fn test_encode_decode() -> Result<()> {
        let mut writer = ReadWriter::new(4, 2, "read-four");
        writer.set_raw_bases(b"AAACCGTTTTA")?;
        let encoded = writer.encode()?;

        let mut seqs = [SeqRecord::default(); 4];
        for variant in Variant::ALL {
            if let Some(len) = encoded.lengths[variant.index()] {
                seqs[variant.index()].set_length(len);
            }
        }
        let mut meta = ReadMeta::new(4, 2);
        meta.set_locator(Locator::new(0, 0));

        let read = Read::decode(4, meta, seqs, &encoded.blob)?;
        assert_eq!(read.name(), "read-four");
        assert_eq!(read.raw_bases(), b"AAACCGTTTTA");
        assert!(read.corrected_bases().is_empty());
        assert_eq!(read.sequence(Which::RAW | Which::COMPRESSED)?, b"ACGTA");
        assert_eq!(read.length(Which::RAW | Which::COMPRESSED), 5);
        assert!(read.sequence(Which::CORRECTED).is_err());
        assert!(read.sequence(Which::RAW | Which::TRIMMED).is_err());
        Ok(())
    }

    #[test]
    fn test_too_long() -> Result<()> {
        let mut writer = ReadWriter::new(1, 1, "long");
        writer.set_raw_bases(&vec![b'A'; MAX_READ_LEN + 1])?;
        assert!(writer.encode().is_err());
        Ok(())
    }

    #[test]
    fn test_revision_keeps_stored_variants() -> Result<()> {
        let mut writer = ReadWriter::revise(1, 1, "r1", Some(b"ACGT".to_vec()), None);
        assert!(writer.set_raw_bases(b"TTTT").is_err());
        writer.set_corrected_bases(b"ACGA")?;
        let encoded = writer.encode()?;
        assert_eq!(encoded.lengths, [Some(4), Some(4), Some(4), Some(4)]);
        Ok(())
    }
}
