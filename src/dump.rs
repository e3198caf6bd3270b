//! FASTA/FASTQ rendering of store and partition reads
//!
//! [`write_reads`] sends every read to one writer. [`write_reads_to`] asks a
//! [`DumpOutput`] for the writer of each read's library, which is how
//! [`LibraryFiles`] splits a dump into one file per library.

use std::{
    collections::{btree_map::Entry, BTreeMap},
    ffi::OsString,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{
    partition::Partition,
    read::{Read, ReadMeta, SeqRecord, Which},
    Result, SeqStore,
};

/// Selects the reads to render and the output format
#[derive(Debug, Clone, Copy)]
#[allow(clippy::struct_excessive_bools)]
pub struct DumpOptions {
    /// Form of each read to write; what it leaves open comes from the source default
    pub which: Which,
    /// Write FASTA instead of FASTQ
    pub fasta: bool,
    /// Inclusive range of read IDs, all reads when `None`
    pub range: Option<(u32, u32)>,
    /// Only reads of this library
    pub library: Option<u32>,
    /// Write the reverse complement
    pub reverse: bool,
    /// Use the read name in headers; otherwise headers are `read<ID>`
    pub read_names: bool,
    /// Also write reads whose selected form has length zero, untrimmed
    pub all_reads: bool,
    /// For trimmed forms, write the whole read with the bases outside the clear range
    /// in lower case
    pub all_bases: bool,
}
impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            which: Which::UNSET,
            fasta: false,
            range: None,
            library: None,
            reverse: false,
            read_names: true,
            all_reads: false,
            all_bases: false,
        }
    }
}

/// A set of reads that can be dumped: a whole store or one of its partitions
pub trait ReadSource {
    /// Completes a selector from the source's default form
    fn resolve(&self, which: Which) -> Which;

    /// IDs of the reads in the inclusive range `bgn..=end`, ascending
    fn read_ids_between(&self, bgn: u32, end: u32) -> Vec<u32>;

    /// Metadata and sequence records of read `id`
    fn records(&self, id: u32) -> Option<(ReadMeta, [SeqRecord; 4])>;

    /// Loads and decodes read `id`
    fn load_read(&mut self, id: u32) -> Result<Read>;
}
impl ReadSource for SeqStore {
    fn resolve(&self, which: Which) -> Which {
        SeqStore::resolve(self, which)
    }

    fn read_ids_between(&self, bgn: u32, end: u32) -> Vec<u32> {
        (bgn.max(1)..=end.min(self.last_read_id())).collect()
    }

    fn records(&self, id: u32) -> Option<(ReadMeta, [SeqRecord; 4])> {
        let meta = *self.read_meta(id)?;
        Some((meta, self.seq_records(id)))
    }

    fn load_read(&mut self, id: u32) -> Result<Read> {
        self.get_read(id)
    }
}
impl ReadSource for Partition {
    fn resolve(&self, which: Which) -> Which {
        Partition::resolve(self, which)
    }

    fn read_ids_between(&self, bgn: u32, end: u32) -> Vec<u32> {
        self.read_ids().filter(|id| (bgn..=end).contains(id)).collect()
    }

    fn records(&self, id: u32) -> Option<(ReadMeta, [SeqRecord; 4])> {
        self.read_records(id)
    }

    fn load_read(&mut self, id: u32) -> Result<Read> {
        self.get_read(id)
    }
}

/// Supplies the writer for the reads of each library
pub trait DumpOutput {
    fn writer(&mut self, library_id: u32) -> Result<&mut dyn Write>;
}

/// Every library to the same writer
struct SingleOutput<'a, W>(&'a mut W);
impl<W: Write> DumpOutput for SingleOutput<'_, W> {
    fn writer(&mut self, _library_id: u32) -> Result<&mut dyn Write> {
        let out: &mut dyn Write = self.0;
        Ok(out)
    }
}

/// Output files named after a prefix, created when their first read is written
///
/// Per-library files are `PREFIX.LIBNAME.fastq`; merged output is `PREFIX.fastq`
/// (`.fasta` for FASTA).
pub struct LibraryFiles {
    prefix: PathBuf,
    extension: &'static str,
    library_names: Option<Vec<String>>,
    files: BTreeMap<u32, (PathBuf, BufWriter<File>)>,
}
impl LibraryFiles {
    /// Writes every read to a single file
    pub fn merged<P: AsRef<Path>>(prefix: P, fasta: bool) -> Self {
        Self {
            prefix: prefix.as_ref().to_path_buf(),
            extension: if fasta { "fasta" } else { "fastq" },
            library_names: None,
            files: BTreeMap::new(),
        }
    }

    /// Writes one file per library; `library_names[i]` names library `i + 1`
    pub fn per_library<P: AsRef<Path>>(prefix: P, fasta: bool, library_names: Vec<String>) -> Self {
        Self {
            library_names: Some(library_names),
            ..Self::merged(prefix, fasta)
        }
    }

    /// Flushes every file and returns the paths written, in library order
    pub fn finish(self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(self.files.len());
        for (path, mut file) in self.files.into_values() {
            file.flush()?;
            paths.push(path);
        }
        Ok(paths)
    }
}
impl DumpOutput for LibraryFiles {
    fn writer(&mut self, library_id: u32) -> Result<&mut dyn Write> {
        let key = if self.library_names.is_some() { library_id } else { 0 };
        let (_, file) = match self.files.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let name = self.library_names.as_ref().map(|names| {
                    key.checked_sub(1)
                        .and_then(|i| names.get(i as usize))
                        .cloned()
                        .unwrap_or_else(|| format!("lib{key}"))
                });
                let path = output_path(&self.prefix, name.as_deref(), self.extension);
                let file = BufWriter::new(File::create(&path)?);
                entry.insert((path, file))
            }
        };
        let out: &mut dyn Write = file;
        Ok(out)
    }
}

fn output_path(prefix: &Path, library: Option<&str>, extension: &str) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    if let Some(library) = library {
        path.push(".");
        path.push(library);
    }
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// Base complement table; anything but `ACGT` (either case) becomes `N`
const COMPLEMENT: [u8; 256] = {
    let mut table = [b'N'; 256];
    table[b'A' as usize] = b'T';
    table[b'C' as usize] = b'G';
    table[b'G' as usize] = b'C';
    table[b'T' as usize] = b'A';
    table[b'a' as usize] = b't';
    table[b'c' as usize] = b'g';
    table[b'g' as usize] = b'c';
    table[b't' as usize] = b'a';
    table
};

/// Reverse complements `seq` in place
pub fn reverse_complement(seq: &mut [u8]) {
    seq.reverse();
    for base in seq.iter_mut() {
        *base = COMPLEMENT[*base as usize];
    }
}

/// Lower-cases the bases outside `bgn..end` and upper-cases those inside
fn soft_mask(seq: &mut [u8], bgn: usize, end: usize) {
    let end = end.min(seq.len());
    let bgn = bgn.min(end);
    seq[..bgn].make_ascii_lowercase();
    seq[bgn..end].make_ascii_uppercase();
    seq[end..].make_ascii_lowercase();
}

/// Writes the selected reads of `source` to `out`
///
/// Headers are `name id=ID clr=BGN,END`, where the clear range is in the coordinates
/// of the written form (the whole read for untrimmed forms). FASTQ qualities are not
/// stored and are written as `!`. Returns the number of reads written.
pub fn write_reads<S: ReadSource, W: Write>(
    source: &mut S,
    options: &DumpOptions,
    out: &mut W,
) -> Result<u64> {
    write_reads_to(source, options, &mut SingleOutput(out))
}

/// Writes the selected reads of `source`, each to the writer of its library
pub fn write_reads_to<S: ReadSource>(
    source: &mut S,
    options: &DumpOptions,
    output: &mut dyn DumpOutput,
) -> Result<u64> {
    let which = source.resolve(options.which);
    let untrimmed = which.without(Which::TRIMMED);
    let Some(variant) = which.variant() else {
        return Ok(0);
    };
    let (bgn, end) = options.range.unwrap_or((1, u32::MAX));

    let mut ids = itoa::Buffer::new();
    let mut coords = itoa::Buffer::new();
    let mut written = 0;

    for id in source.read_ids_between(bgn, end) {
        let Some((meta, records)) = source.records(id) else {
            continue;
        };
        if options.library.is_some_and(|library| library != meta.library_id()) {
            continue;
        }

        let record = records[variant.index()];
        let form = if record.length(which.is_trimmed()) > 0 {
            which
        } else if options.all_reads && record.is_valid() {
            untrimmed
        } else {
            continue;
        };

        let read = source.load_read(id)?;
        let (mut seq, clr_bgn, clr_end) = match read.clear_range(form) {
            Some((clr_bgn, clr_end)) if form.is_trimmed() && options.all_bases => {
                let mut seq = read.sequence(untrimmed)?;
                soft_mask(&mut seq, clr_bgn as usize, clr_end as usize);
                let len = seq.len() as u32;
                (seq, 0, len)
            }
            Some((clr_bgn, clr_end)) if form.is_trimmed() => {
                (read.sequence(form)?, clr_bgn, clr_end)
            }
            _ => {
                let seq = read.sequence(form)?;
                let len = seq.len() as u32;
                (seq, 0, len)
            }
        };
        if options.reverse {
            reverse_complement(&mut seq);
        }

        let out = output.writer(meta.library_id())?;
        out.write_all(if options.fasta { b">" } else { b"@" })?;
        if options.read_names && !read.name().is_empty() {
            out.write_all(read.name().as_bytes())?;
            out.write_all(b" id=")?;
        } else {
            out.write_all(b"read")?;
        }
        out.write_all(ids.format(id).as_bytes())?;
        out.write_all(b" clr=")?;
        out.write_all(coords.format(clr_bgn).as_bytes())?;
        out.write_all(b",")?;
        out.write_all(coords.format(clr_end).as_bytes())?;
        out.write_all(b"\n")?;
        out.write_all(&seq)?;
        out.write_all(b"\n")?;
        if !options.fasta {
            out.write_all(b"+\n")?;
            out.write_all(&vec![b'!'; seq.len()])?;
            out.write_all(b"\n")?;
        }
        written += 1;
    }

    log::debug!("wrote {written} reads as {which}");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mode, StoreOptions, Technology};

    fn dump(store: &mut SeqStore, options: &DumpOptions) -> Result<String> {
        let mut out = Vec::new();
        write_reads(store, options, &mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn build(path: &std::path::Path) -> Result<SeqStore> {
        let mut store = StoreOptions::new().mode(Mode::Create).open(path)?;
        let a = store.add_library("a", Technology::PacbioRaw)?;
        let b = store.add_library("b", Technology::NanoporeRaw)?;
        for (lib, name, bases) in [
            (a, "first", &b"ACGTTG"[..]),
            (b, "second", &b"AACCNN"[..]),
            (a, "", &b"GGGA"[..]),
        ] {
            let mut read = store.begin_read(lib, name)?;
            read.set_raw_bases(bases)?;
            store.commit_read(read)?;
        }
        Ok(store)
    }

    #[test]
    fn test_fasta_and_fastq() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = build(&dir.path().join("test.seqStore"))?;

        let fasta = DumpOptions {
            which: Which::RAW,
            fasta: true,
            ..DumpOptions::default()
        };
        assert_eq!(
            dump(&mut store, &fasta)?,
            ">first id=1 clr=0,6\nACGTTG\n>second id=2 clr=0,6\nAACCNN\n>read3 clr=0,4\nGGGA\n"
        );

        let fastq = DumpOptions {
            which: Which::RAW,
            range: Some((2, 2)),
            ..DumpOptions::default()
        };
        assert_eq!(dump(&mut store, &fastq)?, "@second id=2 clr=0,6\nAACCNN\n+\n!!!!!!\n");
        Ok(())
    }

    #[test]
    fn test_filters_and_reverse() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = build(&dir.path().join("test.seqStore"))?;

        let options = DumpOptions {
            which: Which::RAW,
            fasta: true,
            library: Some(1),
            reverse: true,
            read_names: false,
            ..DumpOptions::default()
        };
        assert_eq!(
            dump(&mut store, &options)?,
            ">read1 clr=0,6\nCAACGT\n>read3 clr=0,4\nTCCC\n"
        );
        Ok(())
    }

    #[test]
    fn test_trimmed_and_all_reads() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = build(&dir.path().join("test.seqStore"))?;
        store.set_clear_range(1, 1, 5, false, Which::RAW)?;

        let mut options = DumpOptions {
            which: Which::RAW | Which::TRIMMED,
            fasta: true,
            ..DumpOptions::default()
        };
        assert_eq!(dump(&mut store, &options)?, ">first id=1 clr=1,5\nCGTT\n");

        options.all_reads = true;
        let out = dump(&mut store, &options)?;
        assert!(out.starts_with(">first id=1 clr=1,5\nCGTT\n>second id=2 clr=0,6\n"));
        assert_eq!(out.lines().count(), 6);

        options.which = Which::CORRECTED;
        assert_eq!(dump(&mut store, &options)?, "");
        Ok(())
    }

    #[test]
    fn test_modifier_only_selectors() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = build(&dir.path().join("test.seqStore"))?;
        store.set_clear_range(1, 1, 5, false, Which::RAW)?;

        let trimmed = DumpOptions {
            which: Which::TRIMMED,
            fasta: true,
            ..DumpOptions::default()
        };
        assert_eq!(dump(&mut store, &trimmed)?, ">first id=1 clr=1,5\nCGTT\n");

        let compressed = DumpOptions {
            which: Which::COMPRESSED,
            fasta: true,
            range: Some((2, 2)),
            ..DumpOptions::default()
        };
        assert_eq!(dump(&mut store, &compressed)?, ">second id=2 clr=0,3\nACN\n");
        Ok(())
    }

    #[test]
    fn test_all_bases_soft_masks() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = build(&dir.path().join("test.seqStore"))?;
        store.set_clear_range(1, 1, 5, false, Which::RAW)?;

        let options = DumpOptions {
            which: Which::RAW | Which::TRIMMED,
            fasta: true,
            all_bases: true,
            ..DumpOptions::default()
        };
        assert_eq!(dump(&mut store, &options)?, ">first id=1 clr=0,6\naCGTTg\n");
        Ok(())
    }

    #[test]
    fn test_partition_dump() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.seqStore");
        let mut store = build(&path)?;
        store.build_partitions(&[0, 1, 2, 1])?;

        let mut partition = Partition::open(&path, 1)?;
        let mut options = DumpOptions {
            fasta: true,
            ..DumpOptions::default()
        };
        let mut out = Vec::new();
        assert_eq!(write_reads(&mut partition, &options, &mut out)?, 2);
        assert_eq!(out, b">first id=1 clr=0,6\nACGTTG\n>read3 clr=0,4\nGGGA\n");

        options.range = Some((2, 3));
        out.clear();
        write_reads(&mut partition, &options, &mut out)?;
        assert_eq!(out, b">read3 clr=0,4\nGGGA\n");
        Ok(())
    }

    #[test]
    fn test_library_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = build(&dir.path().join("test.seqStore"))?;
        let prefix = dir.path().join("out");
        let options = DumpOptions {
            which: Which::RAW,
            fasta: true,
            read_names: false,
            ..DumpOptions::default()
        };

        let names = vec!["a".to_string(), "b".to_string()];
        let mut files = LibraryFiles::per_library(&prefix, true, names);
        assert_eq!(write_reads_to(&mut store, &options, &mut files)?, 3);
        let paths = files.finish()?;
        assert_eq!(paths, vec![dir.path().join("out.a.fasta"), dir.path().join("out.b.fasta")]);
        assert_eq!(
            std::fs::read_to_string(&paths[0])?,
            ">read1 clr=0,6\nACGTTG\n>read3 clr=0,4\nGGGA\n"
        );
        assert_eq!(std::fs::read_to_string(&paths[1])?, ">read2 clr=0,6\nAACCNN\n");

        let mut files = LibraryFiles::merged(&prefix, false);
        write_reads_to(&mut store, &DumpOptions { fasta: false, ..options }, &mut files)?;
        assert_eq!(files.finish()?, vec![dir.path().join("out.fastq")]);
        let merged = std::fs::read_to_string(dir.path().join("out.fastq"))?;
        assert_eq!(merged.lines().count(), 12);
        Ok(())
    }

    #[test]
    fn test_reverse_complement() {
        let mut seq = b"ACGTNacgt".to_vec();
        reverse_complement(&mut seq);
        assert_eq!(seq, b"acgtNACGT");
    }
}
