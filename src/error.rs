/// Custom Result type for store operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the sequence store, encompassing every failure that can
/// occur while opening, reading, writing or partitioning a store.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors raised while loading or validating the store info
    InfoError(#[from] InfoError),
    /// Errors raised by the blob layer (framing, codecs, file management)
    BlobError(#[from] BlobError),
    /// Errors that occur during read operations
    ReadError(#[from] ReadError),
    /// Errors that occur during write operations
    WriteError(#[from] WriteError),
    /// Errors raised while building or opening partitions
    PartitionError(#[from] PartitionError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
}
impl Error {
    /// Checks if the error signals a broken store invariant
    ///
    /// Fatal errors mean the on-disk data (or the caller's use of the append-only
    /// contract) is already inconsistent and processing must stop. Every other error
    /// is a caller error that a batch tool may skip over.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InfoError(err) => matches!(
                err,
                InfoError::InvalidMagicNumber(_)
                    | InfoError::InvalidFormatVersion(_)
                    | InfoError::StructureMismatch { .. }
                    | InfoError::InvalidSize(..)
            ),
            Self::BlobError(err) => matches!(
                err,
                BlobError::InvalidTag { .. }
                    | BlobError::Truncated { .. }
                    | BlobError::ShortChunk { .. }
            ),
            Self::ReadError(err) => matches!(
                err,
                ReadError::FileTruncation(..) | ReadError::CorruptRecord(..)
            ),
            Self::WriteError(err) => matches!(
                err,
                WriteError::OutOfOrderCommit { .. } | WriteError::DoubleCommit(_)
            ),
            Self::PartitionError(err) => matches!(err, PartitionError::InvalidMagicNumber(_)),
            Self::IoError(_) => false,
        }
    }

    /// Checks if the error is a request for a read ID the store does not hold
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::ReadError(ReadError::OutOfRange(..)))
    }
}

/// Errors specific to loading and validating the store info
#[derive(thiserror::Error, Debug)]
pub enum InfoError {
    /// The magic number in the info file does not match the expected value
    #[error("Invalid magic number: {0:#x}")]
    InvalidMagicNumber(u64),

    /// The format version in the info file is not supported
    #[error("Invalid format version: {0}")]
    InvalidFormatVersion(u64),

    /// A structural size recorded when the store was created differs from the
    /// running program's layout
    #[error("Store structure mismatch in '{field}': store has {stored}, program expects {expected}")]
    StructureMismatch {
        field: &'static str,
        stored: u64,
        expected: u64,
    },

    /// The size of a metadata file is inconsistent with the counts in the info file
    ///
    /// # Arguments
    /// * `&'static str` - The metadata file
    /// * First `usize` - The actual number of bytes
    /// * Second `usize` - The expected number of bytes
    #[error("Invalid size of '{0}': {1} bytes. Expected: {2}")]
    InvalidSize(&'static str, usize, usize),

    /// Attempted to create a store where one already exists
    #[error("Store already exists at '{0}'")]
    StoreExists(String),

    /// Attempted to open a store that does not exist
    #[error("No store found at '{0}'")]
    StoreMissing(String),

    /// The requested metadata version does not exist
    #[error("Store has no version {0} (latest is {1})")]
    MissingVersion(u32, u32),
}

/// Errors raised by the blob layer
#[derive(thiserror::Error, Debug)]
pub enum BlobError {
    /// The bytes at a locator do not start with the expected chunk tag
    #[error("Expected tag '{expected}' at blob file {file} offset {offset}, found {found:?}")]
    InvalidTag {
        expected: &'static str,
        found: [u8; 4],
        file: u16,
        offset: u64,
    },

    /// A chunk declares more bytes than are available
    #[error("Chunk at blob file {file} offset {offset} is truncated")]
    Truncated { file: u16, offset: u64 },

    /// A sequence chunk holds fewer bytes than its record's length requires
    #[error("{codec} sequence chunk holds {bytes} bytes, too few for {bases} bases")]
    ShortChunk {
        codec: String,
        bytes: usize,
        bases: usize,
    },

    /// The chunk was written with a codec this program cannot decode
    #[error("Unsupported sequence codec '{0}'")]
    UnsupportedCodec(String),

    /// The blob file index overflows the locator width
    #[error("Too many blob files: {0}")]
    TooManyFiles(u32),

    /// The byte offset overflows the locator width
    #[error("Blob offset {0} exceeds the maximum locator offset")]
    OffsetOverflow(u64),
}

/// Errors that can occur while reading from the store
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// A metadata file appears to be truncated or corrupted
    ///
    /// # Arguments
    /// * `usize` - The byte position where the truncation was detected
    #[error(
        "Number of bytes in file does not match expectation - possibly truncated at byte pos {0}"
    )]
    FileTruncation(usize),

    /// A metadata record holds a value no writer produces
    #[error("Corrupt {0} record {1}")]
    CorruptRecord(&'static str, u32),

    /// Attempted to access a read ID that is beyond the available range
    ///
    /// # Arguments
    /// * First `u32` - The requested read ID
    /// * Second `u32` - The last read ID in the store
    #[error("Requested read ID ({0}) is out of read range (1..={1})")]
    OutOfRange(u32, u32),

    /// The read has no data for the requested variant
    #[error("Read {0} has no {1} sequence")]
    MissingVariant(u32, String),

    /// The selector names neither raw nor corrected sequence
    #[error("Selector '{0}' does not name a sequence variant")]
    InvalidWhich(String),

    /// The read is not a member of the partition
    #[error("Read {0} is not in partition {1}")]
    NotInPartition(u32, u32),
}

/// Errors that can occur while writing to the store
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// The store was opened read-only
    #[error("Store is opened read-only")]
    ReadOnly,

    /// A read was committed with an ID other than the next one
    #[error("Out of order commit: expected read ID {expected}, got {got}")]
    OutOfOrderCommit { expected: u32, got: u32 },

    /// A read ID was committed twice, usually because two reads were begun without a
    /// commit in between
    #[error("Read {0} was already committed")]
    DoubleCommit(u32),

    /// The read is longer than a sequence record can describe
    #[error("Read {id} has length {len}, longer than the maximum {max}")]
    ReadTooLong { id: u32, len: usize, max: usize },

    /// A revision tried to replace sequence data that already exists
    #[error("Read {0} already has {1} sequence")]
    VariantAlreadySet(u32, String),

    /// The library ID is not known to the store
    #[error("Unknown library ID {0}")]
    UnknownLibrary(u32),

    /// The store holds the maximum number of libraries
    #[error("Too many libraries: at most {0} are supported")]
    LibraryLimit(u32),

    /// The store holds the maximum number of reads
    #[error("Too many reads: at most {0} are supported")]
    ReadLimit(u32),
}

/// Errors that can occur while building or reading partitions
#[derive(thiserror::Error, Debug)]
pub enum PartitionError {
    /// The partition map does not start with the expected magic number
    #[error("Invalid partition map magic number: {0:#x}")]
    InvalidMagicNumber(u64),

    /// The assignment table does not cover every read in the store
    #[error("Partition assignment covers {0} reads but the store has {1}")]
    AssignmentSize(usize, u32),

    /// A partition ID outside the built range was requested
    #[error("Partition {0} does not exist ({1} partitions)")]
    MissingPartition(u32, u32),

    /// A partition ID too large for the on-disk naming scheme
    #[error("Partition ID {0} exceeds the maximum of 9999")]
    TooManyPartitions(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let err: Error = WriteError::OutOfOrderCommit {
            expected: 2,
            got: 4,
        }
        .into();
        assert!(err.is_fatal());

        let err: Error = ReadError::OutOfRange(12, 10).into();
        assert!(!err.is_fatal());
        assert!(err.is_out_of_range());

        let err: Error = InfoError::StructureMismatch {
            field: "library name size",
            stored: 256,
            expected: 128,
        }
        .into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("library name size"));
    }
}
