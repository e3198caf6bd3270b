//! Sequence codecs
//!
//! Reads are stored in the smallest lossless representation that can hold them.
//! Three codecs are tried in a fixed order when a read is written:
//!
//! 1. [`Codec::TwoBit`] - four bases per byte, only valid for `ACGT` sequences
//! 2. [`Codec::ThreeBit`] - reserved for alphabets with `N`; it never succeeds
//! 3. [`Codec::Unencoded`] - one byte per base, always succeeds
//!
//! The codec that was used is recorded in the chunk tag, so decoding dispatches purely
//! on the tag. The number of bases to decode always comes from the sequence record,
//! never from the byte length of the chunk.

mod homopoly;

pub use homopoly::{compress, compressed_len, HomopolyMap};

use crate::error::{BlobError, Result};

/// Chunk tag for 2-bit encoded raw bases
pub const TAG_RAW_2BIT: [u8; 4] = *b"2SQR";
/// Chunk tag for 3-bit encoded raw bases
pub const TAG_RAW_3BIT: [u8; 4] = *b"3SQR";
/// Chunk tag for unencoded raw bases
pub const TAG_RAW_8BIT: [u8; 4] = *b"USQR";
/// Chunk tag for 2-bit encoded corrected bases
pub const TAG_COR_2BIT: [u8; 4] = *b"2SQC";
/// Chunk tag for 3-bit encoded corrected bases
pub const TAG_COR_3BIT: [u8; 4] = *b"3SQC";
/// Chunk tag for unencoded corrected bases
pub const TAG_COR_8BIT: [u8; 4] = *b"USQC";

/// Lookup from an ASCII base to its 2-bit code; `0xff` marks bases the codec cannot hold
const TWO_BIT_CODE: [u8; 256] = {
    let mut table = [0xff; 256];
    table[b'A' as usize] = 0;
    table[b'a' as usize] = 0;
    table[b'C' as usize] = 1;
    table[b'c' as usize] = 1;
    table[b'G' as usize] = 2;
    table[b'g' as usize] = 2;
    table[b'T' as usize] = 3;
    table[b't' as usize] = 3;
    table
};

/// Lookup from a 2-bit code to its (upper case) base
const TWO_BIT_BASE: [u8; 4] = *b"ACGT";

/// The encodings a sequence chunk may be stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    TwoBit,
    ThreeBit,
    Unencoded,
}
impl Codec {
    /// Returns the chunk tag for this codec, for raw or corrected bases
    #[must_use]
    pub fn tag(self, corrected: bool) -> [u8; 4] {
        match (self, corrected) {
            (Self::TwoBit, false) => TAG_RAW_2BIT,
            (Self::ThreeBit, false) => TAG_RAW_3BIT,
            (Self::Unencoded, false) => TAG_RAW_8BIT,
            (Self::TwoBit, true) => TAG_COR_2BIT,
            (Self::ThreeBit, true) => TAG_COR_3BIT,
            (Self::Unencoded, true) => TAG_COR_8BIT,
        }
    }

    /// Identifies a sequence chunk tag
    ///
    /// Returns the codec and whether the chunk holds corrected bases, or `None` if the
    /// tag is not a sequence chunk.
    #[must_use]
    pub fn from_tag(tag: &[u8; 4]) -> Option<(Self, bool)> {
        match tag {
            b"2SQR" => Some((Self::TwoBit, false)),
            b"3SQR" => Some((Self::ThreeBit, false)),
            b"USQR" => Some((Self::Unencoded, false)),
            b"2SQC" => Some((Self::TwoBit, true)),
            b"3SQC" => Some((Self::ThreeBit, true)),
            b"USQC" => Some((Self::Unencoded, true)),
            _ => None,
        }
    }

    /// Number of encoded bytes needed for `len` bases
    #[must_use]
    pub fn encoded_len(self, len: usize) -> usize {
        match self {
            Self::TwoBit => len.div_ceil(4),
            Self::ThreeBit => len.div_ceil(3),
            Self::Unencoded => len,
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TwoBit => write!(f, "2-bit"),
            Self::ThreeBit => write!(f, "3-bit"),
            Self::Unencoded => write!(f, "8-bit"),
        }
    }
}

/// Encodes `seq` with the 2-bit codec, appending to `ebuf`
///
/// Bases are packed four to a byte with the first base in the two most significant
/// bits. Unused slots in the final byte are zero.
///
/// Returns `false` (leaving `ebuf` untouched) if `seq` holds anything but `ACGT`,
/// in either case.
pub fn encode_2bit(seq: &[u8], ebuf: &mut Vec<u8>) -> bool {
    if seq.iter().any(|&b| TWO_BIT_CODE[b as usize] == 0xff) {
        return false;
    }
    ebuf.reserve(seq.len().div_ceil(4));
    for chunk in seq.chunks(4) {
        let mut byte = 0u8;
        for (slot, &base) in chunk.iter().enumerate() {
            byte |= TWO_BIT_CODE[base as usize] << (6 - 2 * slot);
        }
        ebuf.push(byte);
    }
    true
}

/// The 3-bit codec is declared for alphabets that include `N` but has no encoder.
///
/// Always returns `false` so that callers fall through to [`encode_8bit`].
#[must_use]
pub fn encode_3bit(_seq: &[u8], _ebuf: &mut Vec<u8>) -> bool {
    false
}

/// Copies `seq` verbatim into `ebuf`. Never fails.
pub fn encode_8bit(seq: &[u8], ebuf: &mut Vec<u8>) -> bool {
    ebuf.extend_from_slice(seq);
    true
}

/// Encodes `seq` with the first codec that accepts it, appending to `ebuf`
pub fn encode(seq: &[u8], ebuf: &mut Vec<u8>) -> Codec {
    if encode_2bit(seq, ebuf) {
        Codec::TwoBit
    } else if encode_3bit(seq, ebuf) {
        Codec::ThreeBit
    } else {
        encode_8bit(seq, ebuf);
        Codec::Unencoded
    }
}

/// Decodes `len` bases from `ebuf`, appending them to `decoded`
///
/// # Arguments
///
/// * `codec` - The codec recorded in the chunk tag
/// * `ebuf` - The chunk payload
/// * `len` - The number of bases, taken from the sequence record
/// * `decoded` - Output buffer for the decoded bases
///
/// # Errors
///
/// Fails if the payload holds fewer bytes than `len` bases require, or if the chunk
/// was written with the 3-bit codec.
pub fn decode(codec: Codec, ebuf: &[u8], len: usize, decoded: &mut Vec<u8>) -> Result<()> {
    let needed = codec.encoded_len(len);
    if ebuf.len() < needed {
        return Err(BlobError::ShortChunk {
            codec: codec.to_string(),
            bytes: ebuf.len(),
            bases: len,
        }
        .into());
    }
    match codec {
        Codec::TwoBit => {
            decoded.reserve(len);
            for pos in 0..len {
                let byte = ebuf[pos / 4];
                let code = (byte >> (6 - 2 * (pos % 4))) & 0b11;
                decoded.push(TWO_BIT_BASE[code as usize]);
            }
            Ok(())
        }
        Codec::ThreeBit => Err(BlobError::UnsupportedCodec(codec.to_string()).into()),
        Codec::Unencoded => {
            decoded.extend_from_slice(&ebuf[..len]);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_bit_layout() {
        let mut ebuf = Vec::new();
        assert!(encode_2bit(b"ACGTT", &mut ebuf));
        // A=00 C=01 G=10 T=11 | T=11 padded with zeros
        assert_eq!(ebuf, vec![0b0001_1011, 0b1100_0000]);
    }

    #[test]
    fn test_two_bit_round_trip() -> Result<()> {
        for seq in [
            &b""[..],
            b"A",
            b"ACGTACGT",
            b"acgtTTGCA",
            b"GGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGCA",
        ] {
            let mut ebuf = Vec::new();
            assert_eq!(encode(seq, &mut ebuf), Codec::TwoBit);
            assert_eq!(ebuf.len(), seq.len().div_ceil(4));

            let mut decoded = Vec::new();
            decode(Codec::TwoBit, &ebuf, seq.len(), &mut decoded)?;
            assert_eq!(decoded, seq.to_ascii_uppercase());
        }
        Ok(())
    }

    #[test]
    fn test_fallback_to_unencoded() -> Result<()> {
        let seq = b"ACGTNACGT";
        let mut ebuf = Vec::new();
        assert!(!encode_2bit(seq, &mut ebuf));
        assert!(ebuf.is_empty());
        assert!(!encode_3bit(seq, &mut ebuf));

        assert_eq!(encode(seq, &mut ebuf), Codec::Unencoded);
        assert_eq!(Codec::Unencoded.tag(false), TAG_RAW_8BIT);

        let mut decoded = Vec::new();
        decode(Codec::Unencoded, &ebuf, seq.len(), &mut decoded)?;
        assert_eq!(decoded, seq);
        Ok(())
    }

    #[test]
    fn test_decode_uses_record_length() -> Result<()> {
        // Three bases still occupy a whole byte
        let mut ebuf = Vec::new();
        encode_2bit(b"TTT", &mut ebuf);
        let mut decoded = Vec::new();
        decode(Codec::TwoBit, &ebuf, 3, &mut decoded)?;
        assert_eq!(decoded, b"TTT");

        decoded.clear();
        assert!(decode(Codec::TwoBit, &ebuf, 5, &mut decoded).is_err());
        Ok(())
    }

    #[test]
    fn test_three_bit_unsupported() {
        let mut decoded = Vec::new();
        assert!(decode(Codec::ThreeBit, &[0, 0], 3, &mut decoded).is_err());
    }

    #[test]
    fn test_tags() {
        for codec in [Codec::TwoBit, Codec::ThreeBit, Codec::Unencoded] {
            for corrected in [false, true] {
                assert_eq!(
                    Codec::from_tag(&codec.tag(corrected)),
                    Some((codec, corrected))
                );
            }
        }
        assert_eq!(Codec::from_tag(b"NAME"), None);
    }
}
