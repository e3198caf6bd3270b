//! The sequence read store
//!
//! A store is a directory holding append-only blob files and a series of metadata
//! versions. It is opened in one of three [`Mode`]s, fixed for the lifetime of the
//! handle:
//!
//! - [`Mode::Create`] makes a new, empty store and fails if one already exists.
//! - [`Mode::Extend`] loads the latest version for reading and appending; on close the
//!   changes are written as the next version.
//! - [`Mode::ReadOnly`] loads the latest (or a requested) version and rejects writes.
//!
//! ```rust,no_run
//! use seqstore::{Mode, StoreOptions, Technology, Which};
//!
//! # fn main() -> seqstore::Result<()> {
//! let mut store = StoreOptions::new().mode(Mode::Create).open("reads.seqStore")?;
//! let lib = store.add_library("libA", Technology::PacbioRaw)?;
//!
//! let mut read = store.begin_read(lib, "r1")?;
//! read.set_raw_bases(b"ACGTACGT")?;
//! let id = store.commit_read(read)?;
//!
//! assert_eq!(store.get_read(id)?.sequence(Which::RAW)?, b"ACGTACGT");
//! store.close()?;
//! # Ok(())
//! # }
//! ```

mod filter;
mod metadata;

pub use filter::FilterSummary;

use std::{
    fs,
    path::{Path, PathBuf},
};

use self::metadata::{last_version, version_dir, write_version, Metadata};
use crate::{
    blob::{BlobReader, BlobWriter, BLOB_FILE_MAX_SIZE},
    codec::HomopolyMap,
    error::{InfoError, ReadError, Result, WriteError},
    info::StoreInfo,
    library::{Library, Technology, MAX_LIBRARY_ID},
    read::{Read, ReadMeta, ReadWriter, SeqRecord, Variant, Which, MAX_READ_ID},
};

/// Marker file that makes compressed reads the default
pub const HOMOPOLYMER_MARKER: &str = "homopolymerCompression";

/// How a store is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Create,
    Extend,
    #[default]
    ReadOnly,
}

/// Builder for opening a [`SeqStore`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    mode: Mode,
    version: Option<u32>,
    which: Option<Which>,
    blob_size_cap: u64,
}
impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}
impl StoreOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: Mode::default(),
            version: None,
            which: None,
            blob_size_cap: BLOB_FILE_MAX_SIZE,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Opens a historical metadata version instead of the latest (read-only only)
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the selector used wherever [`Which::UNSET`] is passed
    #[must_use]
    pub fn which(mut self, which: Which) -> Self {
        self.which = Some(which);
        self
    }

    /// Sets the size at which a blob file is retired and a new one started
    #[must_use]
    pub fn blob_size_cap(mut self, cap: u64) -> Self {
        self.blob_size_cap = cap;
        self
    }

    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<SeqStore> {
        SeqStore::open(path.as_ref(), &self)
    }
}

/// An open sequence read store
pub struct SeqStore {
    path: PathBuf,
    mode: Mode,

    /// Version loaded, or the version that will be written on close
    version: u32,

    /// Default selector, substituted for [`Which::UNSET`]
    which: Which,

    metadata: Metadata,

    blob_reader: BlobReader,
    blob_writer: Option<BlobWriter>,

    /// True once anything was changed that needs a new version
    dirty: bool,
    closed: bool,
}
impl SeqStore {
    /// Opens an existing store read-only at its latest version
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        StoreOptions::new().mode(Mode::ReadOnly).open(path)
    }

    fn open(path: &Path, options: &StoreOptions) -> Result<Self> {
        let display = path.display().to_string();
        let (version, metadata, blob_writer) = match options.mode {
            Mode::Create => {
                if path.exists() {
                    return Err(InfoError::StoreExists(display).into());
                }
                fs::create_dir_all(path)?;
                let writer = BlobWriter::with_cap(path, 0, options.blob_size_cap);
                (1, Metadata::empty(), Some(writer))
            }
            Mode::Extend => {
                let last = Self::existing_version(path)?;
                let metadata = Metadata::load(&version_dir(path, last))?;
                let writer =
                    BlobWriter::with_cap(path, metadata.info.num_blobs(), options.blob_size_cap);
                (last + 1, metadata, Some(writer))
            }
            Mode::ReadOnly => {
                let last = Self::existing_version(path)?;
                let version = options.version.unwrap_or(last);
                if version == 0 || version > last {
                    return Err(InfoError::MissingVersion(version, last).into());
                }
                (version, Metadata::load(&version_dir(path, version))?, None)
            }
        };

        let which = default_which(options.which, &metadata.info, path);
        log::info!(
            "opened store {display} ({:?}, version {version}, {} reads, default {which})",
            options.mode,
            metadata.info.num_reads()
        );

        Ok(Self {
            path: path.to_path_buf(),
            mode: options.mode,
            version,
            which,
            metadata,
            blob_reader: BlobReader::new(path),
            blob_writer,
            dirty: options.mode == Mode::Create,
            closed: false,
        })
    }

    fn existing_version(path: &Path) -> Result<u32> {
        if !path.is_dir() {
            return Err(InfoError::StoreMissing(path.display().to_string()).into());
        }
        match last_version(path)? {
            0 => Err(InfoError::StoreMissing(path.display().to_string()).into()),
            last => Ok(last),
        }
    }

    /// Highest metadata version recorded in the store at `path`
    pub fn last_version<P: AsRef<Path>>(path: P) -> Result<u32> {
        last_version(path.as_ref())
    }

    /// Reverts the store at `path` to `version`, deleting every later version
    ///
    /// Blob data written after `version` stays on disk but is no longer referenced;
    /// the next writer replaces it. This cannot be undone.
    pub fn revert_to_version<P: AsRef<Path>>(path: P, version: u32) -> Result<()> {
        let path = path.as_ref();
        let last = Self::existing_version(path)?;
        if version == 0 || version > last {
            return Err(InfoError::MissingVersion(version, last).into());
        }
        for later in version + 1..=last {
            let dir = version_dir(path, later);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        log::info!(
            "reverted store {} from version {last} to version {version}",
            path.display()
        );
        Ok(())
    }

    /// Writes pending metadata as a new version and closes the store
    ///
    /// Dropping a store closes it too, but only logs failures.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let Some(writer) = self.blob_writer.as_mut() else {
            return Ok(());
        };
        writer.finish()?;
        if !self.dirty {
            log::info!("closed store {} unchanged", self.path.display());
            return Ok(());
        }

        let num_blobs = writer.num_files();
        let metadata = &mut self.metadata;
        metadata.info.set_num_blobs(num_blobs);
        metadata.info.set_num_libraries(metadata.libraries.len() as u32 - 1);
        metadata.info.set_num_reads(metadata.metas.len() as u32 - 1);
        metadata.info.recount(&metadata.seqs);
        write_version(&self.path, self.version, metadata)?;

        log::info!(
            "wrote store {} version {} ({} libraries, {} reads, {} blob files)",
            self.path.display(),
            self.version,
            metadata.info.num_libraries(),
            metadata.info.num_reads(),
            num_blobs,
        );
        self.dirty = false;
        Ok(())
    }

    /// Flushes appended blobs so that independent readers can see them
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.blob_writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The version that was loaded, or that will be written on close
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The selector substituted for [`Which::UNSET`]
    #[must_use]
    pub fn default_which(&self) -> Which {
        self.which
    }

    /// Completes `which` from the store default, see [`Which::or_default`]
    #[must_use]
    pub fn resolve(&self, which: Which) -> Which {
        which.or_default(self.which)
    }

    /// Store info reflecting the current in-core state
    #[must_use]
    pub fn info(&self) -> StoreInfo {
        let mut info = self.metadata.info.clone();
        info.set_num_libraries(self.last_library_id());
        info.set_num_reads(self.last_read_id());
        if let Some(writer) = &self.blob_writer {
            info.set_num_blobs(writer.num_files());
        }
        info.recount(&self.metadata.seqs);
        info
    }

    fn writable(&self) -> Result<()> {
        if self.mode == Mode::ReadOnly || self.blob_writer.is_none() {
            return Err(WriteError::ReadOnly.into());
        }
        Ok(())
    }

    fn check_read_id(&self, id: u32) -> Result<()> {
        if id == 0 || id > self.last_read_id() {
            return Err(ReadError::OutOfRange(id, self.last_read_id()).into());
        }
        Ok(())
    }

    fn variant(&self, which: Which) -> Result<(Which, Variant)> {
        let which = self.resolve(which);
        let variant = which
            .variant()
            .ok_or_else(|| ReadError::InvalidWhich(which.to_string()))?;
        Ok((which, variant))
    }

    /*
        Libraries
    */

    /// Adds a library and returns its ID
    pub fn add_library(&mut self, name: &str, technology: Technology) -> Result<u32> {
        self.writable()?;
        let id = self.metadata.libraries.len() as u32;
        if id > MAX_LIBRARY_ID {
            return Err(WriteError::LibraryLimit(MAX_LIBRARY_ID).into());
        }
        self.metadata
            .libraries
            .push(Library::new(id, name, technology));
        self.dirty = true;
        Ok(id)
    }

    #[must_use]
    pub fn last_library_id(&self) -> u32 {
        self.metadata.libraries.len() as u32 - 1
    }

    /// The library with ID `id`, `None` if there is no such library
    #[must_use]
    pub fn library(&self, id: u32) -> Option<&Library> {
        if id == 0 {
            return None;
        }
        self.metadata.libraries.get(id as usize)
    }

    /// The library read `id` belongs to
    #[must_use]
    pub fn library_for_read(&self, id: u32) -> Option<&Library> {
        self.read_meta(id).and_then(|m| self.library(m.library_id()))
    }

    /*
        Writing reads
    */

    /// Starts a new read in library `library_id`
    ///
    /// The returned writer targets the next unused read ID. It must be committed with
    /// [`SeqStore::commit_read`] before the next read is begun: two writers begun
    /// without a commit in between target the same ID and the second commit fails.
    pub fn begin_read(&self, library_id: u32, name: &str) -> Result<ReadWriter> {
        self.writable()?;
        if self.library(library_id).is_none() {
            return Err(WriteError::UnknownLibrary(library_id).into());
        }
        let id = self.last_read_id() + 1;
        if id > MAX_READ_ID {
            return Err(WriteError::ReadLimit(MAX_READ_ID).into());
        }
        Ok(ReadWriter::new(id, library_id, name))
    }

    /// Starts a revision of read `id`, pre-loaded with its current name and bases
    ///
    /// A revision may add a variant the read does not have yet. Committing it appends
    /// a new blob and moves the read's locator; clear ranges and ignore flags are kept.
    pub fn revise_read(&mut self, id: u32) -> Result<ReadWriter> {
        self.writable()?;
        let read = self.get_read(id)?;
        let raw = self.metadata.seqs[Variant::RawNormal.index()][id as usize]
            .is_valid()
            .then(|| read.raw_bases().to_vec());
        let corrected = self.metadata.seqs[Variant::CorrectedNormal.index()][id as usize]
            .is_valid()
            .then(|| read.corrected_bases().to_vec());
        Ok(ReadWriter::revise(
            id,
            read.library_id(),
            read.name(),
            raw,
            corrected,
        ))
    }

    /// Encodes the read, appends its blob and records its metadata
    ///
    /// Returns the read ID.
    ///
    /// # Errors
    ///
    /// A new read must carry exactly the next read ID. A lower ID means the ID was
    /// already committed ([`WriteError::DoubleCommit`]) and a higher one is an
    /// [`WriteError::OutOfOrderCommit`]; both are fatal.
    #[allow(clippy::needless_pass_by_value)]
    pub fn commit_read(&mut self, writer: ReadWriter) -> Result<u32> {
        self.writable()?;
        let id = writer.id();
        if writer.is_revision() {
            return self.commit_revision(&writer);
        }

        let expected = self.last_read_id() + 1;
        if id < expected {
            return Err(WriteError::DoubleCommit(id).into());
        }
        if id > expected {
            return Err(WriteError::OutOfOrderCommit { expected, got: id }.into());
        }

        let encoded = writer.encode()?;
        log::trace!(
            "read {id}: raw codec {:?}, corrected codec {:?}",
            encoded.codecs[0],
            encoded.codecs[1]
        );
        let locator = self.append_blob(&encoded.blob)?;

        let mut meta = ReadMeta::new(id, writer.library_id());
        if let Some((assignment, score)) = writer.assignment() {
            meta.set_assignment(assignment, score);
        }
        meta.set_locator(locator);
        self.metadata.metas.push(meta);

        for variant in Variant::ALL {
            let mut record = SeqRecord::default();
            if let Some(len) = encoded.lengths[variant.index()] {
                record.set_length(len);
            }
            self.metadata.seqs[variant.index()].push(record);
        }
        self.dirty = true;
        Ok(id)
    }

    fn commit_revision(&mut self, writer: &ReadWriter) -> Result<u32> {
        let id = writer.id();
        self.check_read_id(id)?;
        let encoded = writer.encode()?;

        // Stored variants were pre-loaded and cannot change, so only new ones are set
        for variant in Variant::ALL {
            let record = &mut self.metadata.seqs[variant.index()][id as usize];
            if let Some(len) = encoded.lengths[variant.index()] {
                if !record.is_valid() {
                    record.set_length(len);
                }
            }
        }

        let locator = self.append_blob(&encoded.blob)?;
        let meta = &mut self.metadata.metas[id as usize];
        meta.set_locator(locator);
        if let Some((assignment, score)) = writer.assignment() {
            meta.set_assignment(assignment, score);
        }
        self.dirty = true;
        Ok(id)
    }

    fn append_blob(&mut self, blob: &[u8]) -> Result<crate::blob::Locator> {
        let Some(writer) = self.blob_writer.as_mut() else {
            return Err(WriteError::ReadOnly.into());
        };
        writer.append(blob)
    }

    /*
        Reading
    */

    #[must_use]
    pub fn last_read_id(&self) -> u32 {
        self.metadata.metas.len() as u32 - 1
    }

    /// Number of reads with a usable sequence of the selected form
    #[must_use]
    pub fn num_reads(&self, which: Which) -> u64 {
        self.count(which).0
    }

    /// Number of bases in the usable sequences of the selected form
    #[must_use]
    pub fn num_bases(&self, which: Which) -> u64 {
        self.count(which).1
    }

    fn count(&self, which: Which) -> (u64, u64) {
        let which = self.resolve(which);
        let Some(variant) = which.variant() else {
            return (0, 0);
        };
        self.metadata.seqs[variant.index()]
            .iter()
            .skip(1)
            .map(|rec| rec.length(which.is_trimmed()))
            .filter(|&len| len > 0)
            .fold((0, 0), |(reads, bases), len| {
                (reads + 1, bases + u64::from(len))
            })
    }

    /// Metadata record of read `id`
    #[must_use]
    pub fn read_meta(&self, id: u32) -> Option<&ReadMeta> {
        if id == 0 {
            return None;
        }
        self.metadata.metas.get(id as usize)
    }

    /// Sequence record of read `id` for one variant
    #[must_use]
    pub fn seq_record(&self, id: u32, variant: Variant) -> Option<&SeqRecord> {
        if id == 0 {
            return None;
        }
        self.metadata.seqs[variant.index()].get(id as usize)
    }

    pub(crate) fn seq_records(&self, id: u32) -> [SeqRecord; 4] {
        std::array::from_fn(|i| self.metadata.seqs[i][id as usize])
    }

    fn selected(&self, id: u32, which: Which) -> Option<(Which, &SeqRecord)> {
        let which = self.resolve(which);
        let variant = which.variant()?;
        self.seq_record(id, variant).map(|rec| (which, rec))
    }

    /// Length of the selected form of read `id`
    ///
    /// Zero for unknown IDs and for reads that are missing, ignored or (for trimmed
    /// forms) not trimmed.
    #[must_use]
    pub fn read_length(&self, id: u32, which: Which) -> u32 {
        self.selected(id, which)
            .map_or(0, |(which, rec)| rec.length(which.is_trimmed()))
    }

    /// Clear range of read `id`, only if it has been trimmed
    #[must_use]
    pub fn clear_range(&self, id: u32, which: Which) -> Option<(u32, u32)> {
        self.selected(id, which).and_then(|(_, rec)| rec.clear_range())
    }

    /// True if read `id` holds bases for the selected variant
    #[must_use]
    pub fn is_valid(&self, id: u32, which: Which) -> bool {
        self.selected(id, which).is_some_and(|(_, rec)| rec.is_valid())
    }

    /// True if read `id` is missing or ignored in the selected form
    #[must_use]
    pub fn is_ignored(&self, id: u32, which: Which) -> bool {
        self.selected(id, which)
            .is_none_or(|(which, rec)| rec.is_ignored(which.is_trimmed()))
    }

    /// True if read `id` has a clear range for the selected variant
    #[must_use]
    pub fn is_trimmed(&self, id: u32, which: Which) -> bool {
        self.selected(id, which).is_some_and(|(_, rec)| rec.is_trimmed())
    }

    /// Loads and decodes read `id`
    ///
    /// # Errors
    ///
    /// An unknown ID is a non-fatal [`ReadError::OutOfRange`]. Blob data that does not
    /// match the metadata is a fatal blob error.
    pub fn get_read(&mut self, id: u32) -> Result<Read> {
        self.check_read_id(id)?;
        self.flush()?;
        let meta = self.metadata.metas[id as usize];
        let seqs = self.seq_records(id);
        let blob = self.blob_reader.fetch(meta.locator())?;
        Read::decode(id, meta, seqs, blob)
    }

    /// Loads and decodes read `id` through an independent blob reader
    ///
    /// Blobs committed by this handle are only visible after [`SeqStore::flush`].
    pub fn get_read_with(&self, reader: &mut BlobReader, id: u32) -> Result<Read> {
        self.check_read_id(id)?;
        let meta = self.metadata.metas[id as usize];
        Read::decode(id, meta, self.seq_records(id), reader.fetch(meta.locator())?)
    }

    /// Raw blob bytes of read `id`
    pub(crate) fn read_blob(&mut self, id: u32) -> Result<&[u8]> {
        self.check_read_id(id)?;
        self.flush()?;
        let locator = self.metadata.metas[id as usize].locator();
        self.blob_reader.fetch(locator)
    }

    /// A fresh blob reader over this store's blob files
    #[must_use]
    pub fn blob_reader(&self) -> BlobReader {
        BlobReader::new(&self.path)
    }

    /*
        Trimming and filtering
    */

    /// Sets the clear range of read `id`
    ///
    /// The range is given in the coordinates of the selected variant (compressed or
    /// normal) and is translated so that both the normal and the compressed record of
    /// the same source receive matching clear ranges. Boundaries past the end of the
    /// read are clamped. If `bogus` is set, or the range is empty or inverted, the
    /// trimmed read is also marked ignored.
    pub fn set_clear_range(
        &mut self,
        id: u32,
        bgn: u32,
        end: u32,
        bogus: bool,
        which: Which,
    ) -> Result<()> {
        self.writable()?;
        self.check_read_id(id)?;
        let (which, variant) = self.variant(which)?;
        let normal = variant.normal();
        let compressed = variant.compressed();
        if !self.metadata.seqs[normal.index()][id as usize].is_valid() {
            return Err(ReadError::MissingVariant(id, which.to_string()).into());
        }

        let read = self.get_read(id)?;
        let bases = if variant.is_corrected() {
            read.corrected_bases()
        } else {
            read.raw_bases()
        };
        let map = HomopolyMap::new(bases);

        let empty = end <= bgn;
        let end = end.max(bgn);
        let (normal_range, compressed_range) = if variant.is_compressed() {
            let len = map.compressed_len();
            let range = (bgn.min(len), end.min(len));
            (map.to_normal(range.0, range.1), range)
        } else {
            let len = map.normal_len();
            let range = (bgn.min(len), end.min(len));
            (range, map.to_compressed(range.0, range.1))
        };

        for (v, (b, e)) in [(normal, normal_range), (compressed, compressed_range)] {
            let record = &mut self.metadata.seqs[v.index()][id as usize];
            record.set_clear_range(b, e);
            if bogus || empty || e <= b {
                record.set_ignore_trimmed();
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Marks read `id` ignored, in both the normal and compressed records of the
    /// selected source
    ///
    /// Ignoring the untrimmed read also ignores the trimmed read.
    pub fn set_ignored(&mut self, id: u32, untrimmed: bool, trimmed: bool, which: Which) -> Result<()> {
        self.writable()?;
        self.check_read_id(id)?;
        let (_, variant) = self.variant(which)?;
        for v in [variant.normal(), variant.compressed()] {
            let record = &mut self.metadata.seqs[v.index()][id as usize];
            if untrimmed {
                record.set_ignore_untrimmed();
            }
            if trimmed {
                record.set_ignore_trimmed();
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Sets the assignment tag and score of read `id`
    pub fn set_assignment(&mut self, id: u32, assignment: u16, score: u8) -> Result<()> {
        self.writable()?;
        self.check_read_id(id)?;
        self.metadata.metas[id as usize].set_assignment(assignment, score);
        self.dirty = true;
        Ok(())
    }

    /// Makes homopolymer-compressed reads the default for future opens
    pub fn set_homopolymer_compression(&mut self, enabled: bool) -> Result<()> {
        self.writable()?;
        let marker = self.path.join(HOMOPOLYMER_MARKER);
        if enabled {
            fs::write(&marker, b"")?;
        } else if marker.exists() {
            fs::remove_file(&marker)?;
        }
        Ok(())
    }
}
impl Drop for SeqStore {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            log::error!("failed to close store {}: {err}", self.path.display());
        }
    }
}

/// Picks the selector used for [`Which::UNSET`]
///
/// An explicit selector is used as given. Otherwise the latest stage present in the
/// store is chosen: corrected over raw, trimmed if any read of that source is trimmed,
/// and compressed if the store carries the homopolymer marker (unless
/// [`Which::NORMAL`] was requested).
pub(crate) fn default_which(requested: Option<Which>, info: &StoreInfo, path: &Path) -> Which {
    let requested = requested.unwrap_or(Which::UNSET);
    if !requested.is_unset() {
        return requested;
    }
    let mut which = if info.reads(Which::CORRECTED) > 0 {
        Which::CORRECTED
    } else {
        Which::RAW
    };
    if info.reads(which | Which::TRIMMED) > 0 {
        which |= Which::TRIMMED;
    }
    if !requested.contains(Which::NORMAL) && path.join(HOMOPOLYMER_MARKER).exists() {
        which |= Which::COMPRESSED;
    }
    which
}
