//! Store info
//!
//! Global counters of a store version plus the structural sizes the store was created
//! with. Records are addressed by position, so a program whose record layout differs
//! from the one recorded here must refuse to open the store.

use std::{fmt, fs, path::Path};

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    error::{InfoError, Result},
    library::{LIBRARY_ID_BITS, LIBRARY_NAME_SIZE, SIZE_LIBRARY},
    read::{SeqRecord, Variant, Which, READ_ID_BITS, READ_LEN_BITS, SIZE_READ_META, SIZE_SEQ_RECORD},
};

/// Magic number of the info file ("canu:SEQ" little endian)
#[allow(clippy::unreadable_literal)]
pub const STORE_MAGIC: u64 = 0x5145533a756e6163;

/// Current store format version
pub const STORE_VERSION: u64 = 9;

/// Size of the serialized info
pub const SIZE_INFO: usize = 16 + 4 * NUM_STRUCTURAL + 12 + 16 * NUM_BUCKETS;

/// Number of structural fields
const NUM_STRUCTURAL: usize = 7;

/// Number of read/base count buckets: four variants, untrimmed and trimmed
pub const NUM_BUCKETS: usize = 8;

/// Names of the structural fields, in serialization order
const STRUCTURAL_NAMES: [&str; NUM_STRUCTURAL] = [
    "library record size",
    "read meta record size",
    "sequence record size",
    "library ID bits",
    "library name size",
    "read ID bits",
    "read length bits",
];

/// The structural sizes of the running program
const STRUCTURE: [u32; NUM_STRUCTURAL] = [
    SIZE_LIBRARY as u32,
    SIZE_READ_META as u32,
    SIZE_SEQ_RECORD as u32,
    LIBRARY_ID_BITS,
    LIBRARY_NAME_SIZE as u32,
    READ_ID_BITS,
    READ_LEN_BITS,
];

/// Offset of the "library name size" field, for tests that corrupt it
#[cfg(test)]
pub(crate) const LIBRARY_NAME_SIZE_OFFSET: usize = 16 + 4 * 4;

/// Bucket index for a variant in its untrimmed or trimmed form
fn bucket(variant: Variant, trimmed: bool) -> usize {
    variant.index() * 2 + usize::from(trimmed)
}

/// Counters and structural self-check of a store version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    magic: u64,
    version: u64,
    structure: [u32; NUM_STRUCTURAL],

    num_libraries: u32,
    num_reads: u32,
    num_blobs: u32,

    /// Reads and bases per bucket
    counts: [(u64, u64); NUM_BUCKETS],
}
impl Default for StoreInfo {
    fn default() -> Self {
        Self::new()
    }
}
impl StoreInfo {
    /// Info for an empty store laid out by the running program
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: STORE_MAGIC,
            version: STORE_VERSION,
            structure: STRUCTURE,
            num_libraries: 0,
            num_reads: 0,
            num_blobs: 0,
            counts: [(0, 0); NUM_BUCKETS],
        }
    }

    /// Deserializes the info, without validating it
    ///
    /// See [`StoreInfo::check`].
    pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer.len() != SIZE_INFO {
            return Err(InfoError::InvalidSize("info", buffer.len(), SIZE_INFO).into());
        }
        let mut structure = [0; NUM_STRUCTURAL];
        for (i, field) in structure.iter_mut().enumerate() {
            *field = LittleEndian::read_u32(&buffer[16 + 4 * i..]);
        }
        let base = 16 + 4 * NUM_STRUCTURAL;
        let mut counts = [(0, 0); NUM_BUCKETS];
        for (i, count) in counts.iter_mut().enumerate() {
            let offset = base + 12 + 16 * i;
            *count = (
                LittleEndian::read_u64(&buffer[offset..]),
                LittleEndian::read_u64(&buffer[offset + 8..]),
            );
        }
        Ok(Self {
            magic: LittleEndian::read_u64(&buffer[0..8]),
            version: LittleEndian::read_u64(&buffer[8..16]),
            structure,
            num_libraries: LittleEndian::read_u32(&buffer[base..]),
            num_reads: LittleEndian::read_u32(&buffer[base + 4..]),
            num_blobs: LittleEndian::read_u32(&buffer[base + 8..]),
            counts,
        })
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = vec![0; SIZE_INFO];
        LittleEndian::write_u64(&mut buffer[0..8], self.magic);
        LittleEndian::write_u64(&mut buffer[8..16], self.version);
        for (i, field) in self.structure.iter().enumerate() {
            LittleEndian::write_u32(&mut buffer[16 + 4 * i..], *field);
        }
        let base = 16 + 4 * NUM_STRUCTURAL;
        LittleEndian::write_u32(&mut buffer[base..], self.num_libraries);
        LittleEndian::write_u32(&mut buffer[base + 4..], self.num_reads);
        LittleEndian::write_u32(&mut buffer[base + 8..], self.num_blobs);
        for (i, (reads, bases)) in self.counts.iter().enumerate() {
            let offset = base + 12 + 16 * i;
            LittleEndian::write_u64(&mut buffer[offset..], *reads);
            LittleEndian::write_u64(&mut buffer[offset + 8..], *bases);
        }
        buffer
    }

    /// Loads and validates the info file at `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let info = Self::from_bytes(&fs::read(path)?)?;
        info.check()?;
        Ok(info)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Validates the magic number, format version and every structural size against
    /// the running program
    ///
    /// # Errors
    ///
    /// Returns a fatal [`InfoError`] naming the first field that differs.
    pub fn check(&self) -> Result<()> {
        if self.magic != STORE_MAGIC {
            return Err(InfoError::InvalidMagicNumber(self.magic).into());
        }
        if self.version != STORE_VERSION {
            return Err(InfoError::InvalidFormatVersion(self.version).into());
        }
        for ((field, stored), expected) in STRUCTURAL_NAMES
            .iter()
            .zip(self.structure.iter())
            .zip(STRUCTURE.iter())
        {
            if stored != expected {
                return Err(InfoError::StructureMismatch {
                    field: *field,
                    stored: u64::from(*stored),
                    expected: u64::from(*expected),
                }
                .into());
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn num_libraries(&self) -> u32 {
        self.num_libraries
    }

    #[must_use]
    pub fn num_reads(&self) -> u32 {
        self.num_reads
    }

    #[must_use]
    pub fn num_blobs(&self) -> u32 {
        self.num_blobs
    }

    pub(crate) fn set_num_libraries(&mut self, n: u32) {
        self.num_libraries = n;
    }

    pub(crate) fn set_num_reads(&mut self, n: u32) {
        self.num_reads = n;
    }

    pub(crate) fn set_num_blobs(&mut self, n: u32) {
        self.num_blobs = n;
    }

    /// Number of reads with a usable sequence of the selected form
    #[must_use]
    pub fn reads(&self, which: Which) -> u64 {
        which
            .variant()
            .map_or(0, |v| self.counts[bucket(v, which.is_trimmed())].0)
    }

    /// Number of bases in the usable sequences of the selected form
    #[must_use]
    pub fn bases(&self, which: Which) -> u64 {
        which
            .variant()
            .map_or(0, |v| self.counts[bucket(v, which.is_trimmed())].1)
    }

    /// Recounts the reads and bases of every bucket from the sequence records
    ///
    /// Index 0 of every record array is the blank placeholder and is skipped.
    pub(crate) fn recount(&mut self, seqs: &[Vec<SeqRecord>; 4]) {
        self.counts = [(0, 0); NUM_BUCKETS];
        for variant in Variant::ALL {
            for record in seqs[variant.index()].iter().skip(1) {
                for trimmed in [false, true] {
                    let len = record.length(trimmed);
                    if len > 0 {
                        let count = &mut self.counts[bucket(variant, trimmed)];
                        count.0 += 1;
                        count.1 += u64::from(len);
                    }
                }
            }
        }
    }
}
impl fmt::Display for StoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "magic            {:#018x}", self.magic)?;
        writeln!(f, "version          {}", self.version)?;
        for (name, value) in STRUCTURAL_NAMES.iter().zip(self.structure.iter()) {
            writeln!(f, "{name:<22} {value}")?;
        }
        writeln!(f, "libraries        {}", self.num_libraries)?;
        writeln!(f, "reads            {}", self.num_reads)?;
        writeln!(f, "blob files       {}", self.num_blobs)?;
        writeln!(f)?;
        writeln!(f, "{:<30} {:>12} {:>16}", "variant", "reads", "bases")?;
        for variant in Variant::ALL {
            for trimmed in [false, true] {
                let mut which = variant.which();
                if trimmed {
                    which |= Which::TRIMMED;
                }
                let (reads, bases) = self.counts[bucket(variant, trimmed)];
                writeln!(f, "{:<30} {reads:>12} {bases:>16}", which.to_string())?;
            }
        }
        Ok(())
    }
}
