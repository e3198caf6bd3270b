//! Partitioned copies of a store
//!
//! Partitioning copies the reads assigned to each partition into an independent set of
//! blob files under `partitions/NNNN/`, together with a dense array of read records
//! whose locators point into those files. A consumer opens a single [`Partition`] and
//! never touches the master metadata or blob files.
//!
//! The `partitions/map` file records the assignment itself: a fixed header followed by
//! a zstd stream holding the per-partition read counts, the partition of every read
//! and the dense index of every read inside its partition.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read as _, Write},
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder, LittleEndian};
use zstd::{Decoder, Encoder};

use crate::{
    blob::{BlobReader, BlobWriter},
    error::{InfoError, PartitionError, ReadError, Result},
    info::StoreInfo,
    read::{Read, ReadMeta, SeqRecord, Variant, Which, SIZE_READ_META, SIZE_SEQ_RECORD},
    store::default_which,
    SeqStore,
};

/// Directory below the store holding every partition
pub const PARTITIONS_DIR: &str = "partitions";

/// Magic number of the partition map ("SQPARMAP" little endian)
pub const PARTITION_MAGIC: u64 = u64::from_le_bytes(*b"SQPARMAP");

/// Size of the uncompressed partition map header
pub const SIZE_MAP_HEADER: usize = 16;

/// Size of one partition read record: the read meta followed by the four sequence
/// records
pub const SIZE_PARTITION_READ: usize = SIZE_READ_META + 4 * SIZE_SEQ_RECORD;

/// Largest partition ID, bounded by the four-digit directory names
pub const MAX_PARTITIONS: u32 = 9999;

const MAP_FILE: &str = "map";
const READS_FILE: &str = "reads";

/// Directory of partition `id` in the store at `store`
#[must_use]
pub fn partition_dir(store: &Path, id: u32) -> PathBuf {
    store.join(PARTITIONS_DIR).join(format!("{id:04}"))
}

/// The read-to-partition assignment of a partitioned store
///
/// Read IDs and partition IDs are 1-based; partition 0 means "not assigned" and
/// `len(0)` counts the unassigned reads. Dense indices are 1-based as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMap {
    counts: Vec<u32>,
    partition_of: Vec<u32>,
    index_of: Vec<u32>,
}
impl PartitionMap {
    /// Builds the map from a per-read assignment indexed by read ID
    ///
    /// Entry 0 of `assignment` is a placeholder and ignored.
    pub fn new(assignment: &[u32]) -> Result<Self> {
        let num_partitions = assignment.iter().skip(1).copied().max().unwrap_or(0);
        if num_partitions > MAX_PARTITIONS {
            return Err(PartitionError::TooManyPartitions(num_partitions).into());
        }

        let mut counts = vec![0; num_partitions as usize + 1];
        let mut partition_of = vec![0; assignment.len().max(1)];
        let mut index_of = vec![0; assignment.len().max(1)];
        for (id, &partition) in assignment.iter().enumerate().skip(1) {
            counts[partition as usize] += 1;
            if partition > 0 {
                partition_of[id] = partition;
                index_of[id] = counts[partition as usize];
            }
        }
        Ok(Self {
            counts,
            partition_of,
            index_of,
        })
    }

    #[must_use]
    pub fn num_partitions(&self) -> u32 {
        self.counts.len() as u32 - 1
    }

    /// Number of reads covered by the map
    #[must_use]
    pub fn num_reads(&self) -> u32 {
        self.partition_of.len() as u32 - 1
    }

    /// Number of reads in `partition`; partition 0 counts unassigned reads
    #[must_use]
    pub fn len(&self, partition: u32) -> u32 {
        self.counts.get(partition as usize).copied().unwrap_or(0)
    }

    /// True if no read is assigned to any partition
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.iter().skip(1).all(|&c| c == 0)
    }

    /// Partition of read `id`, `None` if it is unassigned or unknown
    #[must_use]
    pub fn partition_of(&self, id: u32) -> Option<u32> {
        if id == 0 {
            return None;
        }
        self.partition_of
            .get(id as usize)
            .copied()
            .filter(|&p| p > 0)
    }

    /// 1-based position of read `id` inside its partition
    #[must_use]
    pub fn index_of(&self, id: u32) -> Option<u32> {
        self.partition_of(id).map(|_| self.index_of[id as usize])
    }

    /// Read IDs of `partition` in dense order
    #[must_use]
    pub fn read_ids(&self, partition: u32) -> Vec<u32> {
        if partition == 0 {
            return Vec::new();
        }
        (1..=self.num_reads())
            .filter(|&id| self.partition_of[id as usize] == partition)
            .collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = File::create(path).map(BufWriter::new)?;
        let mut header = [0; SIZE_MAP_HEADER];
        LittleEndian::write_u64(&mut header[0..8], PARTITION_MAGIC);
        LittleEndian::write_u32(&mut header[8..12], self.num_partitions());
        LittleEndian::write_u32(&mut header[12..16], self.num_reads());
        writer.write_all(&header)?;

        let mut body = vec![0; 4 * (self.counts.len() + 2 * self.partition_of.len())];
        let (counts, rest) = body.split_at_mut(4 * self.counts.len());
        let (partition_of, index_of) = rest.split_at_mut(4 * self.partition_of.len());
        LittleEndian::write_u32_into(&self.counts, counts);
        LittleEndian::write_u32_into(&self.partition_of, partition_of);
        LittleEndian::write_u32_into(&self.index_of, index_of);

        let mut writer = Encoder::new(writer, 3)?.auto_finish();
        writer.write_all(&body)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path).map(BufReader::new)?;
        let mut header = [0; SIZE_MAP_HEADER];
        file.read_exact(&mut header)?;
        let magic = LittleEndian::read_u64(&header[0..8]);
        if magic != PARTITION_MAGIC {
            return Err(PartitionError::InvalidMagicNumber(magic).into());
        }
        let num_partitions = LittleEndian::read_u32(&header[8..12]) as usize;
        let num_reads = LittleEndian::read_u32(&header[12..16]) as usize;

        let mut body = Vec::new();
        Decoder::new(file)?.read_to_end(&mut body)?;
        let expected = 4 * (num_partitions + 1 + 2 * (num_reads + 1));
        if body.len() != expected {
            return Err(InfoError::InvalidSize("partition map", body.len(), expected).into());
        }

        let mut counts = vec![0; num_partitions + 1];
        let mut partition_of = vec![0; num_reads + 1];
        let mut index_of = vec![0; num_reads + 1];
        let (head, rest) = body.split_at(4 * counts.len());
        let (middle, tail) = rest.split_at(4 * partition_of.len());
        LittleEndian::read_u32_into(head, &mut counts);
        LittleEndian::read_u32_into(middle, &mut partition_of);
        LittleEndian::read_u32_into(tail, &mut index_of);
        Ok(Self {
            counts,
            partition_of,
            index_of,
        })
    }
}

impl SeqStore {
    /// Copies the store's reads into partitions
    ///
    /// `assignment` maps every read ID to a partition (index 0 is a placeholder, so its
    /// length must be `last_read_id() + 1`). Reads assigned to partition 0 are left out
    /// of every partition. Blobs are copied byte for byte into per-partition blob
    /// files; the master metadata and blob files are not modified.
    ///
    /// Any previous partitioning of the store is replaced.
    pub fn build_partitions(&mut self, assignment: &[u32]) -> Result<PartitionMap> {
        let num_reads = self.last_read_id();
        if assignment.len() != num_reads as usize + 1 {
            return Err(PartitionError::AssignmentSize(assignment.len(), num_reads + 1).into());
        }
        let map = PartitionMap::new(assignment)?;

        let root = self.path().join(PARTITIONS_DIR);
        if root.exists() {
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)?;

        let mut writers = Vec::with_capacity(map.num_partitions() as usize);
        let mut records = Vec::with_capacity(map.num_partitions() as usize);
        for partition in 1..=map.num_partitions() {
            let dir = partition_dir(self.path(), partition);
            fs::create_dir(&dir)?;
            writers.push(BlobWriter::new(&dir, 0));
            records.push(Vec::with_capacity(
                map.len(partition) as usize * SIZE_PARTITION_READ,
            ));
        }

        for id in 1..=num_reads {
            let Some(partition) = map.partition_of(id) else {
                continue;
            };
            let Some(mut meta) = self.read_meta(id).copied() else {
                return Err(ReadError::OutOfRange(id, num_reads).into());
            };
            let seqs = self.seq_records(id);
            let slot = partition as usize - 1;
            let locator = writers[slot].append(self.read_blob(id)?)?;
            meta.set_locator(locator);
            write_partition_read(&meta, &seqs, &mut records[slot]);
        }

        for (slot, (mut writer, buf)) in writers.into_iter().zip(records).enumerate() {
            let partition = slot as u32 + 1;
            writer.finish()?;
            if buf.is_empty() {
                log::warn!("partition {partition} is empty");
            }
            fs::write(partition_dir(self.path(), partition).join(READS_FILE), &buf)?;
        }
        map.save(root.join(MAP_FILE))?;

        log::info!(
            "built {} partitions of store {} ({} reads unassigned)",
            map.num_partitions(),
            self.path().display(),
            map.len(0),
        );
        Ok(map)
    }
}

fn write_partition_read(meta: &ReadMeta, seqs: &[SeqRecord; 4], buf: &mut Vec<u8>) {
    let start = buf.len();
    buf.resize(start + SIZE_PARTITION_READ, 0);
    let record = &mut buf[start..];
    meta.write_bytes(&mut record[..SIZE_READ_META]);
    for (seq, bytes) in seqs
        .iter()
        .zip(record[SIZE_READ_META..].chunks_exact_mut(SIZE_SEQ_RECORD))
    {
        seq.write_bytes(bytes);
    }
}

fn read_partition_read(record: &[u8]) -> (ReadMeta, [SeqRecord; 4]) {
    let meta = ReadMeta::from_bytes(&record[..SIZE_READ_META]);
    let seqs = std::array::from_fn(|i| {
        let offset = SIZE_READ_META + i * SIZE_SEQ_RECORD;
        SeqRecord::from_bytes(&record[offset..offset + SIZE_SEQ_RECORD])
    });
    (meta, seqs)
}

/// One partition of a store, opened for reading
pub struct Partition {
    id: u32,
    dir: PathBuf,
    metas: Vec<ReadMeta>,
    seqs: Vec<[SeqRecord; 4]>,
    which: Which,
    blob_reader: BlobReader,
}
impl Partition {
    /// Opens partition `id` of the store at `store`
    pub fn open<P: AsRef<Path>>(store: P, id: u32) -> Result<Self> {
        let store = store.as_ref();
        let map = PartitionMap::load(store.join(PARTITIONS_DIR).join(MAP_FILE))?;
        if id == 0 || id > map.num_partitions() {
            return Err(PartitionError::MissingPartition(id, map.num_partitions()).into());
        }

        let dir = partition_dir(store, id);
        let bytes = fs::read(dir.join(READS_FILE))?;
        let expected = map.len(id) as usize * SIZE_PARTITION_READ;
        if bytes.len() != expected {
            return Err(InfoError::InvalidSize("partition reads", bytes.len(), expected).into());
        }
        let (metas, seqs): (Vec<ReadMeta>, Vec<[SeqRecord; 4]>) = bytes
            .chunks_exact(SIZE_PARTITION_READ)
            .map(read_partition_read)
            .unzip();

        // The default form is chosen from this partition's reads alone
        let mut columns: [Vec<SeqRecord>; 4] = std::array::from_fn(|_| vec![SeqRecord::default()]);
        for records in &seqs {
            for (column, record) in columns.iter_mut().zip(records) {
                column.push(*record);
            }
        }
        let mut info = StoreInfo::new();
        info.recount(&columns);
        let which = default_which(None, &info, store);

        Ok(Self {
            id,
            blob_reader: BlobReader::new(&dir),
            dir,
            metas,
            seqs,
            which,
        })
    }

    /// The selector substituted for what a request leaves open
    #[must_use]
    pub fn default_which(&self) -> Which {
        self.which
    }

    /// Completes `which` from the partition default, see [`Which::or_default`]
    #[must_use]
    pub fn resolve(&self, which: Which) -> Which {
        which.or_default(self.which)
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of reads in the partition
    #[must_use]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    /// Master-store IDs of the partition's reads, in dense order
    pub fn read_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.metas.iter().map(ReadMeta::read_id)
    }

    fn position(&self, read_id: u32) -> Option<usize> {
        self.metas
            .binary_search_by_key(&read_id, ReadMeta::read_id)
            .ok()
    }

    #[must_use]
    pub fn contains(&self, read_id: u32) -> bool {
        self.position(read_id).is_some()
    }

    /// Sequence record of a read in the partition
    #[must_use]
    pub fn seq_record(&self, read_id: u32, variant: Variant) -> Option<&SeqRecord> {
        self.position(read_id)
            .map(|pos| &self.seqs[pos][variant.index()])
    }

    /// Metadata and the four sequence records of a read in the partition
    #[must_use]
    pub fn read_records(&self, read_id: u32) -> Option<(ReadMeta, [SeqRecord; 4])> {
        self.position(read_id)
            .map(|pos| (self.metas[pos], self.seqs[pos]))
    }

    /// Loads read `read_id` (a master-store ID) from the partition
    pub fn get_read(&mut self, read_id: u32) -> Result<Read> {
        let Some(pos) = self.position(read_id) else {
            return Err(ReadError::NotInPartition(read_id, self.id).into());
        };
        self.read_at(pos)
    }

    /// Loads the read at dense position `pos`
    pub(crate) fn read_at(&mut self, pos: usize) -> Result<Read> {
        let meta = self.metas[pos];
        let blob = self.blob_reader.fetch(meta.locator())?;
        Read::decode(meta.read_id(), meta, self.seqs[pos], blob)
    }

    /// Loads the read at dense position `pos` through an independent blob reader
    pub(crate) fn read_at_with(&self, reader: &mut BlobReader, pos: usize) -> Result<Read> {
        let meta = self.metas[pos];
        Read::decode(meta.read_id(), meta, self.seqs[pos], reader.fetch(meta.locator())?)
    }

    /// Iterates the partition's reads in dense order
    pub fn iter(&mut self) -> PartitionReads<'_> {
        PartitionReads {
            partition: self,
            pos: 0,
        }
    }
}

/// Iterator over the reads of a [`Partition`]
pub struct PartitionReads<'a> {
    partition: &'a mut Partition,
    pos: usize,
}
impl Iterator for PartitionReads<'_> {
    type Item = Result<Read>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.partition.len() {
            return None;
        }
        let read = self.partition.read_at(self.pos);
        self.pos += 1;
        Some(read)
    }
}
