use super::{ReadMeta, SeqRecord, Variant, Which};
use crate::{
    blob::{ChunkIter, TAG_NAME},
    codec::{self, Codec},
    error::{ReadError, Result},
};

/// A read decoded from its blob
///
/// Holds copies of the read's metadata records as they were when the read was fetched,
/// together with its name and decoded raw and corrected bases. Compressed and trimmed
/// forms are derived on request by [`Read::sequence`].
#[derive(Debug, Clone, Default)]
pub struct Read {
    id: u32,
    meta: ReadMeta,
    seqs: [SeqRecord; 4],
    name: String,
    raw: Vec<u8>,
    corrected: Vec<u8>,
}
impl Read {
    /// Decodes the blob of read `id`
    ///
    /// The number of bases decoded from each sequence chunk is taken from the matching
    /// normal sequence record.
    pub(crate) fn decode(
        id: u32,
        meta: ReadMeta,
        seqs: [SeqRecord; 4],
        blob: &[u8],
    ) -> Result<Self> {
        let mut read = Self {
            id,
            meta,
            seqs,
            ..Self::default()
        };
        let locator = meta.locator();
        for chunk in ChunkIter::new(blob, locator.file, locator.offset)? {
            let chunk = chunk?;
            if chunk.tag == TAG_NAME {
                read.name = String::from_utf8_lossy(chunk.data).into_owned();
            } else if let Some((codec, corrected)) = Codec::from_tag(&chunk.tag) {
                let (variant, bases) = if corrected {
                    (Variant::CorrectedNormal, &mut read.corrected)
                } else {
                    (Variant::RawNormal, &mut read.raw)
                };
                let len = seqs[variant.index()].stored_length() as usize;
                bases.clear();
                codec::decode(codec, chunk.data, len, bases)?;
            }
        }
        Ok(read)
    }

    /// The read ID
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn library_id(&self) -> u32 {
        self.meta.library_id()
    }

    #[must_use]
    pub fn meta(&self) -> &ReadMeta {
        &self.meta
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw bases as stored, untrimmed and uncompressed
    #[must_use]
    pub fn raw_bases(&self) -> &[u8] {
        &self.raw
    }

    /// Corrected bases as stored, untrimmed and uncompressed
    #[must_use]
    pub fn corrected_bases(&self) -> &[u8] {
        &self.corrected
    }

    /// Sequence record for a variant
    #[must_use]
    pub fn seq_record(&self, variant: Variant) -> &SeqRecord {
        &self.seqs[variant.index()]
    }

    /// Length of the selected form, zero if it is missing or ignored
    #[must_use]
    pub fn length(&self, which: Which) -> u32 {
        which
            .variant()
            .map_or(0, |v| self.seqs[v.index()].length(which.is_trimmed()))
    }

    /// Clear range of the selected variant, if it has been trimmed
    #[must_use]
    pub fn clear_range(&self, which: Which) -> Option<(u32, u32)> {
        which
            .variant()
            .and_then(|v| self.seqs[v.index()].clear_range())
    }

    /// Returns the bases of the selected form
    ///
    /// Compressed forms are homopolymer-compressed from the stored bases. Trimmed
    /// forms are cut to the clear range, in the coordinates of the selected variant.
    ///
    /// Ignore flags are not consulted; use [`Read::length`] to decide whether to use
    /// the read.
    ///
    /// # Errors
    ///
    /// Fails if the selector names no variant, if the read has no bases for the
    /// variant, or if a trimmed form is requested for a read without a clear range.
    pub fn sequence(&self, which: Which) -> Result<Vec<u8>> {
        let Some(variant) = which.variant() else {
            return Err(ReadError::InvalidWhich(which.to_string()).into());
        };
        let record = &self.seqs[variant.index()];
        if !self.seqs[variant.normal().index()].is_valid() {
            return Err(ReadError::MissingVariant(self.id, which.to_string()).into());
        }
        let bases = if variant.is_corrected() {
            &self.corrected
        } else {
            &self.raw
        };

        let mut seq = if variant.is_compressed() {
            let mut out = Vec::with_capacity(bases.len());
            codec::compress(bases, &mut out);
            out
        } else {
            bases.clone()
        };

        if which.is_trimmed() {
            let Some((bgn, end)) = record.clear_range() else {
                return Err(ReadError::MissingVariant(self.id, which.to_string()).into());
            };
            let end = (end as usize).min(seq.len());
            let bgn = (bgn as usize).min(end);
            seq.truncate(end);
            seq.drain(..bgn);
        }
        Ok(seq)
    }
}
