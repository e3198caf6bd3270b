use byteorder::{ByteOrder, LittleEndian};

/// Size of a serialized sequence record
pub const SIZE_SEQ_RECORD: usize = 12;

/// Width of the length and clear range fields
const FIELD_BITS: u32 = 30;
const FIELD_MASK: u32 = (1 << FIELD_BITS) - 1;

/// Number of bits allowed for a read length
pub const READ_LEN_BITS: u32 = 21;

/// Longest read the store accepts
pub const MAX_READ_LEN: usize = (1 << READ_LEN_BITS) - 1;

/// Length, validity, ignore flags and clear range of one variant of one read
///
/// Serialized as three little endian u32 words, low bits first:
/// - word 0: valid (1), unused (1), length (30)
/// - word 1: ignore untrimmed (1), ignore trimmed (1), clear begin (30)
/// - word 2: trimmed (1), unused (1), clear end (30)
///
/// The length and validity are set once, when the read's blob is written. Only the
/// clear range and the ignore flags change afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct SeqRecord {
    valid: bool,
    length: u32,
    ignore_untrimmed: bool,
    ignore_trimmed: bool,
    clear_bgn: u32,
    trimmed: bool,
    clear_end: u32,
}
impl SeqRecord {
    /// True if the blob holds sequence for this variant
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// True if a clear range has been set
    #[must_use]
    pub fn is_trimmed(&self) -> bool {
        self.trimmed
    }

    /// True if the whole read is to be ignored
    #[must_use]
    pub fn ignore_untrimmed(&self) -> bool {
        self.ignore_untrimmed
    }

    /// True if the trimmed read is to be ignored; always set when
    /// [`SeqRecord::ignore_untrimmed`] is
    #[must_use]
    pub fn ignore_trimmed(&self) -> bool {
        self.ignore_untrimmed || self.ignore_trimmed
    }

    /// True if the variant is missing or ignored in the requested form
    #[must_use]
    pub fn is_ignored(&self, trimmed: bool) -> bool {
        if !self.valid {
            return true;
        }
        if trimmed {
            self.ignore_trimmed()
        } else {
            self.ignore_untrimmed()
        }
    }

    /// The stored untrimmed length, whatever the flags say
    #[must_use]
    pub fn stored_length(&self) -> u32 {
        self.length
    }

    /// The clear range, only when one has been set
    #[must_use]
    pub fn clear_range(&self) -> Option<(u32, u32)> {
        self.trimmed.then_some((self.clear_bgn, self.clear_end))
    }

    /// Length as seen by ordinary callers
    ///
    /// Zero if the variant is not valid or is ignored. For the trimmed form it is also
    /// zero when no clear range is set, otherwise the size of the clear range.
    #[must_use]
    pub fn length(&self, trimmed: bool) -> u32 {
        if trimmed {
            if !self.trimmed || !self.valid || self.ignore_trimmed() {
                0
            } else {
                self.clear_end.saturating_sub(self.clear_bgn)
            }
        } else if !self.valid || self.ignore_untrimmed {
            0
        } else {
            self.length
        }
    }

    /// Populates a blank record with the length of newly written sequence
    ///
    /// Returns `false` without changing anything if the record already holds a length.
    pub(crate) fn set_length(&mut self, length: u32) -> bool {
        if self.valid {
            return false;
        }
        *self = Self {
            valid: true,
            length: length & FIELD_MASK,
            clear_end: length & FIELD_MASK,
            ..Self::default()
        };
        true
    }

    pub(crate) fn set_clear_range(&mut self, bgn: u32, end: u32) {
        self.clear_bgn = bgn & FIELD_MASK;
        self.clear_end = end & FIELD_MASK;
        self.trimmed = true;
        self.ignore_trimmed |= self.ignore_untrimmed;
    }

    pub(crate) fn set_ignore_untrimmed(&mut self) {
        self.ignore_untrimmed = true;
        self.ignore_trimmed = true;
    }

    pub(crate) fn set_ignore_trimmed(&mut self) {
        self.ignore_trimmed = true;
    }

    pub fn write_bytes(&self, buf: &mut [u8]) {
        let word0 = u32::from(self.valid) | (self.length & FIELD_MASK) << 2;
        let word1 = u32::from(self.ignore_untrimmed)
            | u32::from(self.ignore_trimmed) << 1
            | (self.clear_bgn & FIELD_MASK) << 2;
        let word2 = u32::from(self.trimmed) | (self.clear_end & FIELD_MASK) << 2;
        LittleEndian::write_u32(&mut buf[0..4], word0);
        LittleEndian::write_u32(&mut buf[4..8], word1);
        LittleEndian::write_u32(&mut buf[8..12], word2);
    }

    #[must_use]
    pub fn from_bytes(buf: &[u8]) -> Self {
        let word0 = LittleEndian::read_u32(&buf[0..4]);
        let word1 = LittleEndian::read_u32(&buf[4..8]);
        let word2 = LittleEndian::read_u32(&buf[8..12]);
        Self {
            valid: word0 & 1 == 1,
            length: word0 >> 2,
            ignore_untrimmed: word1 & 1 == 1,
            ignore_trimmed: (word1 >> 1) & 1 == 1,
            clear_bgn: word1 >> 2,
            trimmed: word2 & 1 == 1,
            clear_end: word2 >> 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_layout() {
        let mut rec = SeqRecord::default();
        rec.set_length(8);
        rec.set_clear_range(2, 6);

        let mut buf = [0; SIZE_SEQ_RECORD];
        rec.write_bytes(&mut buf);
        assert_eq!(LittleEndian::read_u32(&buf[0..4]), 1 | 8 << 2);
        assert_eq!(LittleEndian::read_u32(&buf[4..8]), 2 << 2);
        assert_eq!(LittleEndian::read_u32(&buf[8..12]), 1 | 6 << 2);
        assert_eq!(SeqRecord::from_bytes(&buf), rec);
    }

    #[test]
    fn test_lengths() {
        let mut rec = SeqRecord::default();
        assert_eq!(rec.length(false), 0);
        assert!(rec.is_ignored(false));

        assert!(rec.set_length(100));
        assert!(!rec.set_length(50));
        assert_eq!(rec.length(false), 100);
        assert_eq!(rec.length(true), 0);
        assert_eq!(rec.clear_range(), None);

        rec.set_clear_range(10, 90);
        assert_eq!(rec.length(true), 80);
        assert_eq!(rec.clear_range(), Some((10, 90)));

        rec.set_ignore_trimmed();
        assert_eq!(rec.length(true), 0);
        assert_eq!(rec.length(false), 100);
    }

    #[test]
    fn test_ignore_propagation() {
        // Every prior state ends with the trimmed form ignored
        for trimmed in [false, true] {
            for ignore_t in [false, true] {
                let mut rec = SeqRecord::default();
                rec.set_length(20);
                if trimmed {
                    rec.set_clear_range(0, 10);
                }
                if ignore_t {
                    rec.set_ignore_trimmed();
                }
                rec.set_ignore_untrimmed();
                assert!(rec.ignore_trimmed());
                assert!(rec.is_ignored(true));
                assert_eq!(rec.length(true), 0);
                assert_eq!(rec.length(false), 0);

                // A later clear range keeps it ignored
                rec.set_clear_range(2, 8);
                assert!(rec.ignore_trimmed());
            }
        }
    }
}
