use byteorder::{ByteOrder, LittleEndian};

use crate::blob::Locator;

/// Size of a serialized read metadata record
pub const SIZE_READ_META: usize = 16;

/// Number of bits a read ID occupies
pub const READ_ID_BITS: u32 = 30;

/// Largest read ID the store can hold
pub const MAX_READ_ID: u32 = (1 << READ_ID_BITS) - 1;

/// Largest assignment tag
pub const MAX_ASSIGNMENT: u16 = (1 << 15) - 1;

/// Largest assignment score
pub const MAX_ASSIGNMENT_SCORE: u8 = (1 << 7) - 1;

/// Identity, library and blob position of a read
///
/// Serialized as two little endian u64 words, low bits first:
/// - word 0: read ID (30), library ID (12), assignment (15), assignment score (7)
/// - word 1: unused (8), blob file (16), blob offset (40)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadMeta {
    read_id: u32,
    library_id: u32,
    assignment: u16,
    assignment_score: u8,
    locator: Locator,
}
impl ReadMeta {
    #[must_use]
    pub fn new(read_id: u32, library_id: u32) -> Self {
        Self {
            read_id,
            library_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn read_id(&self) -> u32 {
        self.read_id
    }

    #[must_use]
    pub fn library_id(&self) -> u32 {
        self.library_id
    }

    /// Opaque classification tag, not interpreted by the store
    #[must_use]
    pub fn assignment(&self) -> u16 {
        self.assignment
    }

    #[must_use]
    pub fn assignment_score(&self) -> u8 {
        self.assignment_score
    }

    #[must_use]
    pub fn locator(&self) -> Locator {
        self.locator
    }

    pub(crate) fn set_assignment(&mut self, assignment: u16, score: u8) {
        self.assignment = assignment.min(MAX_ASSIGNMENT);
        self.assignment_score = score.min(MAX_ASSIGNMENT_SCORE);
    }

    pub(crate) fn set_locator(&mut self, locator: Locator) {
        self.locator = locator;
    }

    pub fn write_bytes(&self, buf: &mut [u8]) {
        let word0 = u64::from(self.read_id & MAX_READ_ID)
            | u64::from(self.library_id & 0xfff) << 30
            | u64::from(self.assignment & MAX_ASSIGNMENT) << 42
            | u64::from(self.assignment_score & MAX_ASSIGNMENT_SCORE) << 57;
        let word1 = u64::from(self.locator.file) << 8 | (self.locator.offset & ((1 << 40) - 1)) << 24;
        LittleEndian::write_u64(&mut buf[0..8], word0);
        LittleEndian::write_u64(&mut buf[8..16], word1);
    }

    #[must_use]
    pub fn from_bytes(buf: &[u8]) -> Self {
        let word0 = LittleEndian::read_u64(&buf[0..8]);
        let word1 = LittleEndian::read_u64(&buf[8..16]);
        Self {
            read_id: (word0 & u64::from(MAX_READ_ID)) as u32,
            library_id: ((word0 >> 30) & 0xfff) as u32,
            assignment: ((word0 >> 42) & u64::from(MAX_ASSIGNMENT)) as u16,
            assignment_score: (word0 >> 57) as u8,
            locator: Locator::new((word1 >> 8) as u16, word1 >> 24),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_layout() {
        let mut meta = ReadMeta::new(5, 2);
        meta.set_assignment(7, 3);
        meta.set_locator(Locator::new(1, 300));

        let mut buf = [0; SIZE_READ_META];
        meta.write_bytes(&mut buf);
        assert_eq!(
            LittleEndian::read_u64(&buf[0..8]),
            5 | 2 << 30 | 7 << 42 | 3 << 57
        );
        assert_eq!(LittleEndian::read_u64(&buf[8..16]), 1 << 8 | 300 << 24);
        assert_eq!(ReadMeta::from_bytes(&buf), meta);
    }

    #[test]
    fn test_extremes() {
        let mut meta = ReadMeta::new(MAX_READ_ID, 4095);
        meta.set_assignment(u16::MAX, u8::MAX);
        meta.set_locator(Locator::new(u16::MAX, (1 << 40) - 1));

        let mut buf = [0; SIZE_READ_META];
        meta.write_bytes(&mut buf);
        let back = ReadMeta::from_bytes(&buf);
        assert_eq!(back.read_id(), MAX_READ_ID);
        assert_eq!(back.library_id(), 4095);
        assert_eq!(back.assignment(), MAX_ASSIGNMENT);
        assert_eq!(back.assignment_score(), MAX_ASSIGNMENT_SCORE);
        assert_eq!(back.locator(), Locator::new(u16::MAX, (1 << 40) - 1));
    }
}
