//! Library records
//!
//! A library describes one batch of sequencing reads: its sequencing technology and a
//! human readable name. Libraries are numbered densely from 1 and never deleted.

use std::{fmt, str::FromStr};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ReadError, Result};

/// Size of a library name field in bytes, including the terminating NUL
pub const LIBRARY_NAME_SIZE: usize = 128;

/// Number of bits a library ID occupies in a read record
pub const LIBRARY_ID_BITS: u32 = 12;

/// Largest library ID a read record can reference
pub const MAX_LIBRARY_ID: u32 = (1 << LIBRARY_ID_BITS) - 1;

/// Size of a serialized library record
pub const SIZE_LIBRARY: usize = 8 + LIBRARY_NAME_SIZE;

/// Sequencing technology of a library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Technology {
    #[default]
    Generic,
    Contig,
    PacbioRaw,
    PacbioCorrected,
    PacbioHifi,
    NanoporeRaw,
    NanoporeCorrected,
}
impl Technology {
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Generic => 0,
            Self::Contig => 1,
            Self::PacbioRaw => 2,
            Self::PacbioCorrected => 3,
            Self::PacbioHifi => 4,
            Self::NanoporeRaw => 5,
            Self::NanoporeCorrected => 6,
        }
    }

    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Generic),
            1 => Some(Self::Contig),
            2 => Some(Self::PacbioRaw),
            3 => Some(Self::PacbioCorrected),
            4 => Some(Self::PacbioHifi),
            5 => Some(Self::NanoporeRaw),
            6 => Some(Self::NanoporeCorrected),
            _ => None,
        }
    }

    /// Technologies whose reads arrive already corrected
    #[must_use]
    pub fn is_corrected(self) -> bool {
        matches!(
            self,
            Self::Contig | Self::PacbioCorrected | Self::PacbioHifi | Self::NanoporeCorrected
        )
    }
}
impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generic => "generic",
            Self::Contig => "contig",
            Self::PacbioRaw => "pacbio-raw",
            Self::PacbioCorrected => "pacbio-corrected",
            Self::PacbioHifi => "pacbio-hifi",
            Self::NanoporeRaw => "nanopore-raw",
            Self::NanoporeCorrected => "nanopore-corrected",
        };
        write!(f, "{name}")
    }
}
impl FromStr for Technology {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(Self::Generic),
            "contig" => Ok(Self::Contig),
            "pacbio-raw" => Ok(Self::PacbioRaw),
            "pacbio-corrected" => Ok(Self::PacbioCorrected),
            "pacbio-hifi" => Ok(Self::PacbioHifi),
            "nanopore-raw" => Ok(Self::NanoporeRaw),
            "nanopore-corrected" => Ok(Self::NanoporeCorrected),
            _ => Err(format!("unknown sequencing technology '{s}'")),
        }
    }
}

/// A library record
///
/// Serialized as 136 bytes:
/// - Bytes 0-3: library ID (u32, little endian)
/// - Bytes 4-7: technology code (u32, little endian)
/// - Bytes 8-135: name, NUL padded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    id: u32,
    technology: Technology,
    name: String,
}
impl Library {
    /// Creates a library, truncating the name to fit the name field
    #[must_use]
    pub fn new(id: u32, name: &str, technology: Technology) -> Self {
        let mut end = name.len().min(LIBRARY_NAME_SIZE - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        if end < name.len() {
            log::warn!(
                "library name '{name}' truncated to {} bytes",
                LIBRARY_NAME_SIZE - 1
            );
        }
        Self {
            id,
            technology,
            name: name[..end].to_string(),
        }
    }

    /// The blank record stored at index 0
    #[must_use]
    pub fn blank() -> Self {
        Self {
            id: 0,
            technology: Technology::Generic,
            name: String::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn technology(&self) -> Technology {
        self.technology
    }

    pub fn write_bytes(&self, buf: &mut Vec<u8>) {
        let mut record = [0; SIZE_LIBRARY];
        LittleEndian::write_u32(&mut record[0..4], self.id);
        LittleEndian::write_u32(&mut record[4..8], self.technology.code());
        record[8..8 + self.name.len()].copy_from_slice(self.name.as_bytes());
        buf.extend_from_slice(&record);
    }

    /// Deserializes a library from exactly [`SIZE_LIBRARY`] bytes
    pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < SIZE_LIBRARY {
            return Err(ReadError::FileTruncation(buffer.len()).into());
        }
        let id = LittleEndian::read_u32(&buffer[0..4]);
        let technology = LittleEndian::read_u32(&buffer[4..8]);
        let Some(technology) = Technology::from_code(technology) else {
            return Err(ReadError::CorruptRecord("library", id).into());
        };
        let name_bytes = &buffer[8..SIZE_LIBRARY];
        let name_len = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(LIBRARY_NAME_SIZE);
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();
        Ok(Self {
            id,
            technology,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_technology_names() {
        for code in 0..7 {
            let tech = Technology::from_code(code).unwrap();
            assert_eq!(tech.to_string().parse::<Technology>(), Ok(tech));
            assert_eq!(tech.code(), code);
        }
        assert!("illumina".parse::<Technology>().is_err());
        assert_eq!(Technology::from_code(7), None);
    }

    #[test]
    fn test_library_bytes() -> Result<()> {
        let lib = Library::new(3, "libA", Technology::PacbioRaw);
        let mut buf = Vec::new();
        lib.write_bytes(&mut buf);
        assert_eq!(buf.len(), SIZE_LIBRARY);
        assert_eq!(Library::from_bytes(&buf)?, lib);
        Ok(())
    }

    #[test]
    fn test_long_name_truncated() {
        let name = "x".repeat(300);
        let lib = Library::new(1, &name, Technology::Generic);
        assert_eq!(lib.name().len(), LIBRARY_NAME_SIZE - 1);
    }
}
