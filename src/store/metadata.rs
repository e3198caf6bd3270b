//! Versioned metadata snapshots
//!
//! Every time a writable store is closed its metadata is written to a new directory
//! `version.NNN`. The snapshot is assembled in `version.NNN.tmp` and renamed into place,
//! so an interrupted close never leaves a partial version behind.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{InfoError, Result},
    info::StoreInfo,
    library::{Library, SIZE_LIBRARY},
    read::{ReadMeta, SeqRecord, Variant, SIZE_READ_META, SIZE_SEQ_RECORD},
};

const INFO_FILE: &str = "info";
const LIBRARIES_FILE: &str = "libraries";
const READS_FILE: &str = "reads";

/// In-core metadata of one store version
///
/// Index 0 of every array is a blank record so that IDs index the arrays directly.
#[derive(Debug, Clone)]
pub(crate) struct Metadata {
    pub info: StoreInfo,
    pub libraries: Vec<Library>,
    pub metas: Vec<ReadMeta>,
    pub seqs: [Vec<SeqRecord>; 4],
}
impl Metadata {
    /// Metadata of an empty store
    pub fn empty() -> Self {
        Self {
            info: StoreInfo::new(),
            libraries: vec![Library::blank()],
            metas: vec![ReadMeta::default()],
            seqs: std::array::from_fn(|_| vec![SeqRecord::default()]),
        }
    }

    /// Loads and validates a snapshot directory
    pub fn load(dir: &Path) -> Result<Self> {
        let info = StoreInfo::load(dir.join(INFO_FILE))?;
        let num_libraries = info.num_libraries() as usize + 1;
        let num_reads = info.num_reads() as usize + 1;

        let bytes = read_exact(dir, LIBRARIES_FILE, num_libraries * SIZE_LIBRARY)?;
        let libraries = bytes
            .chunks_exact(SIZE_LIBRARY)
            .map(Library::from_bytes)
            .collect::<Result<Vec<_>>>()?;

        let bytes = read_exact(dir, READS_FILE, num_reads * SIZE_READ_META)?;
        let metas = bytes
            .chunks_exact(SIZE_READ_META)
            .map(ReadMeta::from_bytes)
            .collect();

        let mut seqs: [Vec<SeqRecord>; 4] = Default::default();
        for variant in Variant::ALL {
            let bytes = read_exact(dir, variant.file_name(), num_reads * SIZE_SEQ_RECORD)?;
            seqs[variant.index()] = bytes
                .chunks_exact(SIZE_SEQ_RECORD)
                .map(SeqRecord::from_bytes)
                .collect();
        }

        Ok(Self {
            info,
            libraries,
            metas,
            seqs,
        })
    }

    /// Writes the snapshot to `dir`, which must not exist yet
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir(dir)?;
        self.info.save(dir.join(INFO_FILE))?;

        let mut buf = Vec::with_capacity(self.libraries.len() * SIZE_LIBRARY);
        for library in &self.libraries {
            library.write_bytes(&mut buf);
        }
        fs::write(dir.join(LIBRARIES_FILE), &buf)?;

        let mut buf = vec![0; self.metas.len() * SIZE_READ_META];
        for (meta, record) in self.metas.iter().zip(buf.chunks_exact_mut(SIZE_READ_META)) {
            meta.write_bytes(record);
        }
        fs::write(dir.join(READS_FILE), &buf)?;

        for variant in Variant::ALL {
            let records = &self.seqs[variant.index()];
            let mut buf = vec![0; records.len() * SIZE_SEQ_RECORD];
            for (seq, record) in records.iter().zip(buf.chunks_exact_mut(SIZE_SEQ_RECORD)) {
                seq.write_bytes(record);
            }
            fs::write(dir.join(variant.file_name()), &buf)?;
        }
        Ok(())
    }
}

fn read_exact(dir: &Path, name: &'static str, expected: usize) -> Result<Vec<u8>> {
    let bytes = fs::read(dir.join(name))?;
    if bytes.len() != expected {
        return Err(InfoError::InvalidSize(name, bytes.len(), expected).into());
    }
    Ok(bytes)
}

/// Path of the snapshot directory for `version`
pub(crate) fn version_dir(store: &Path, version: u32) -> PathBuf {
    store.join(format!("version.{version:03}"))
}

/// Highest version present in the store, 0 if there is none
pub(crate) fn last_version(store: &Path) -> Result<u32> {
    let mut last = 0;
    for entry in fs::read_dir(store)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(version) = name
            .to_str()
            .and_then(|n| n.strip_prefix("version."))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        if entry.file_type()?.is_dir() {
            last = last.max(version);
        }
    }
    Ok(last)
}

/// Writes `metadata` as `version`, via a temporary directory
pub(crate) fn write_version(store: &Path, version: u32, metadata: &Metadata) -> Result<()> {
    let dir = version_dir(store, version);
    let tmp = dir.with_extension(format!("{version:03}.tmp"));
    if tmp.exists() {
        fs::remove_dir_all(&tmp)?;
    }
    metadata.save(&tmp)?;
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::rename(&tmp, &dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Technology;

    #[test]
    fn test_save_load() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut metadata = Metadata::empty();
        metadata
            .libraries
            .push(Library::new(1, "lib", Technology::NanoporeRaw));
        metadata.info.set_num_libraries(1);
        metadata.metas.push(ReadMeta::new(1, 1));
        for records in &mut metadata.seqs {
            let mut rec = SeqRecord::default();
            rec.set_length(12);
            records.push(rec);
        }
        metadata.info.set_num_reads(1);

        write_version(dir.path(), 1, &metadata)?;
        assert!(version_dir(dir.path(), 1).is_dir());
        assert_eq!(last_version(dir.path())?, 1);

        let back = Metadata::load(&version_dir(dir.path(), 1))?;
        assert_eq!(back.libraries, metadata.libraries);
        assert_eq!(back.metas, metadata.metas);
        assert_eq!(back.seqs, metadata.seqs);
        Ok(())
    }

    #[test]
    fn test_truncated_array() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut metadata = Metadata::empty();
        metadata.info.set_num_reads(3);
        write_version(dir.path(), 1, &metadata)?;

        let err = Metadata::load(&version_dir(dir.path(), 1)).err();
        assert!(err.is_some_and(|e| e.is_fatal()));
        Ok(())
    }

    #[test]
    fn test_last_version_ignores_tmp() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(last_version(dir.path())?, 0);
        fs::create_dir(dir.path().join("version.002"))?;
        fs::create_dir(dir.path().join("version.007.tmp"))?;
        fs::write(dir.path().join("version.009"), b"")?;
        assert_eq!(last_version(dir.path())?, 2);
        Ok(())
    }
}
