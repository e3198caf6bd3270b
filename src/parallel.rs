use std::{ops::Range, path::Path};

use crate::{blob::BlobReader, partition::Partition, read::Read, Result, SeqStore};

/// Default batch size for parallel processing
///
/// Each thread calls [`ParallelProcessor::on_batch_complete`] after this many reads.
pub const BATCH_SIZE: usize = 1024;

/// Trait for stores and partitions whose reads can be processed in parallel
///
/// This is implemented by the **reader** not by the **processor**.
/// For the **processor**, see the [`ParallelProcessor`] trait.
pub trait ParallelReader {
    /// Number of positions visited by [`ParallelReader::process_parallel`]
    fn num_parallel_reads(&self) -> usize;

    /// Processes every read, splitting them over `num_threads` threads
    ///
    /// A thread count of zero uses every available CPU; larger counts are capped at the
    /// number of CPUs.
    fn process_parallel<P: ParallelProcessor>(
        &mut self,
        processor: P,
        num_threads: usize,
    ) -> Result<()> {
        let num_reads = self.num_parallel_reads();
        self.process_parallel_range(processor, num_threads, 0..num_reads)
    }

    /// Processes the reads at positions `range`
    ///
    /// A store's position `i` is read ID `i + 1`; a partition's positions follow its
    /// dense order.
    fn process_parallel_range<P: ParallelProcessor>(
        &mut self,
        processor: P,
        num_threads: usize,
        range: Range<usize>,
    ) -> Result<()>;
}

/// Trait for types that can process reads in parallel.
///
/// This is implemented by the **processor** not by the **reader**.
/// For the **reader**, see the [`ParallelReader`] trait.
pub trait ParallelProcessor: Send + Clone {
    /// Process a single read
    fn process_read(&mut self, read: &Read) -> Result<()>;

    /// Called when a thread finishes processing a batch
    /// Default implementation does nothing
    fn on_batch_complete(&mut self) -> Result<()> {
        Ok(())
    }

    /// Set the thread ID for this processor
    ///
    /// Each thread should call this method with its own unique ID.
    #[allow(unused_variables)]
    fn set_tid(&mut self, tid: usize) {
        // Default implementation does nothing
    }

    /// Get the thread ID for this processor
    fn get_tid(&self) -> Option<usize> {
        None
    }
}

impl ParallelReader for SeqStore {
    fn num_parallel_reads(&self) -> usize {
        self.last_read_id() as usize
    }

    fn process_parallel_range<P: ParallelProcessor>(
        &mut self,
        processor: P,
        num_threads: usize,
        range: Range<usize>,
    ) -> Result<()> {
        // Threads read the blob files directly, so pending blobs must reach the disk
        self.flush()?;
        let range = range.start..range.end.min(self.num_parallel_reads());
        let store: &SeqStore = self;
        run_parallel(&processor, num_threads, range, store.path(), |reader, pos| {
            store.get_read_with(reader, pos as u32 + 1)
        })
    }
}

impl ParallelReader for Partition {
    fn num_parallel_reads(&self) -> usize {
        self.len()
    }

    fn process_parallel_range<P: ParallelProcessor>(
        &mut self,
        processor: P,
        num_threads: usize,
        range: Range<usize>,
    ) -> Result<()> {
        let range = range.start..range.end.min(self.len());
        let partition: &Partition = self;
        run_parallel(&processor, num_threads, range, partition.dir(), |reader, pos| {
            partition.read_at_with(reader, pos)
        })
    }
}

/// Splits `range` into one contiguous block per thread
///
/// Every thread owns a clone of the processor and a blob reader over `blob_dir`.
fn run_parallel<P, F>(
    processor: &P,
    num_threads: usize,
    range: Range<usize>,
    blob_dir: &Path,
    fetch: F,
) -> Result<()>
where
    P: ParallelProcessor,
    F: Fn(&mut BlobReader, usize) -> Result<Read> + Sync,
{
    let num_threads = if num_threads == 0 {
        num_cpus::get()
    } else {
        num_threads.min(num_cpus::get())
    };
    if range.start >= range.end {
        return Ok(());
    }
    let reads_per_thread = (range.end - range.start).div_ceil(num_threads);
    let fetch = &fetch;

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..num_threads)
            .map(|tid| {
                let mut processor = processor.clone();
                processor.set_tid(tid);
                let range = range.clone();

                scope.spawn(move || -> Result<()> {
                    let start_idx = range.start + tid * reads_per_thread;
                    let end_idx = (start_idx + reads_per_thread).min(range.end);
                    if start_idx >= end_idx {
                        return Ok(());
                    }

                    let mut reader = BlobReader::new(blob_dir);
                    for batch_start in (start_idx..end_idx).step_by(BATCH_SIZE) {
                        let batch_end = (batch_start + BATCH_SIZE).min(end_idx);
                        for pos in batch_start..batch_end {
                            let read = fetch(&mut reader, pos)?;
                            processor.process_read(&read)?;
                        }
                        processor.on_batch_complete()?;
                    }
                    Ok(())
                })
            })
            .collect();

        handles
            .into_iter()
            .try_for_each(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::{Mode, StoreOptions, Technology, Which};

    #[derive(Clone, Default)]
    struct Collector {
        tid: Option<usize>,
        local: Vec<(u32, usize)>,
        seen: Arc<Mutex<Vec<(u32, usize)>>>,
        batches: Arc<Mutex<usize>>,
    }
    impl ParallelProcessor for Collector {
        fn process_read(&mut self, read: &Read) -> Result<()> {
            self.local.push((read.id(), read.sequence(Which::RAW)?.len()));
            Ok(())
        }

        fn on_batch_complete(&mut self) -> Result<()> {
            self.seen.lock().append(&mut self.local);
            *self.batches.lock() += 1;
            Ok(())
        }

        fn set_tid(&mut self, tid: usize) {
            self.tid = Some(tid);
        }

        fn get_tid(&self) -> Option<usize> {
            self.tid
        }
    }

    fn build_store(path: &Path, n: usize) -> Result<SeqStore> {
        let mut store = StoreOptions::new().mode(Mode::Create).open(path)?;
        let lib = store.add_library("lib", Technology::PacbioHifi)?;
        for i in 1..=n {
            let mut read = store.begin_read(lib, &format!("r{i}"))?;
            read.set_raw_bases(&b"ACGTT".repeat(i % 7 + 1))?;
            store.commit_read(read)?;
        }
        Ok(store)
    }

    #[test]
    fn test_store_parallel() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = build_store(&dir.path().join("test.seqStore"), 2500)?;

        let collector = Collector::default();
        store.process_parallel(collector.clone(), 4)?;

        let mut seen = collector.seen.lock().clone();
        seen.sort_unstable();
        assert_eq!(seen.len(), 2500);
        assert!(seen.iter().enumerate().all(|(i, &(id, _))| id as usize == i + 1));
        let bases: usize = seen.iter().map(|&(_, len)| len).sum();
        assert_eq!(bases as u64, store.num_bases(Which::RAW));
        assert!(*collector.batches.lock() >= 3);
        Ok(())
    }

    #[test]
    fn test_store_parallel_range() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = build_store(&dir.path().join("test.seqStore"), 20)?;

        let collector = Collector::default();
        store.process_parallel_range(collector.clone(), 0, 5..50)?;
        let mut ids: Vec<u32> = collector.seen.lock().iter().map(|&(id, _)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (6..=20).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_partition_parallel() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.seqStore");
        let mut store = build_store(&path, 30)?;
        let assignment: Vec<u32> = (0..=30).map(|id| u32::from(id % 3 == 0)).collect();
        store.build_partitions(&assignment)?;

        let mut partition = Partition::open(&path, 1)?;
        let collector = Collector::default();
        partition.process_parallel(collector.clone(), 3)?;
        let mut ids: Vec<u32> = collector.seen.lock().iter().map(|&(id, _)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=10).map(|i| i * 3).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_processor_error_propagates() -> anyhow::Result<()> {
        #[derive(Clone)]
        struct Corrected;
        impl ParallelProcessor for Corrected {
            fn process_read(&mut self, read: &Read) -> Result<()> {
                read.sequence(Which::CORRECTED).map(|_| ())
            }
        }

        let dir = tempfile::tempdir()?;
        let mut store = build_store(&dir.path().join("test.seqStore"), 10)?;
        assert!(store.process_parallel(Corrected, 2).is_err());
        Ok(())
    }
}
