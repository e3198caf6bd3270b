//! # seqstore
//!
//! An embedded, append-only store for sequencing reads.
//!
//! A store keeps every read in up to four forms: raw or corrected, each either as
//! sequenced or homopolymer-compressed, and each optionally trimmed to a clear range.
//! Read data lives in immutable blobs spread over size-capped blob files; per-read
//! metadata is held in fixed-size records that are written as numbered versions, so
//! every stage of a pipeline can be inspected afterwards.
//!
//! Stores are opened through [`StoreOptions`]:
//!
//! ```rust,no_run
//! use seqstore::{Mode, StoreOptions, Which};
//!
//! # fn main() -> seqstore::Result<()> {
//! let mut store = StoreOptions::new()
//!     .mode(Mode::ReadOnly)
//!     .which(Which::CORRECTED | Which::TRIMMED)
//!     .open("asm.seqStore")?;
//!
//! for id in 1..=store.last_read_id() {
//!     if store.read_length(id, Which::UNSET) == 0 {
//!         continue;
//!     }
//!     let read = store.get_read(id)?;
//!     let bases = read.sequence(store.default_which())?;
//!     println!("{}\t{}", read.name(), bases.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Reads of a store (or of one of its [`Partition`]s) can be processed on many threads
//! with [`ParallelReader::process_parallel`].

pub mod blob;
pub mod codec;
pub mod dump;
pub mod error;
pub mod info;
pub mod library;
pub mod parallel;
pub mod partition;
pub mod read;
pub mod store;

pub use error::{Error, Result};
pub use info::StoreInfo;
pub use library::{Library, Technology};
pub use parallel::{ParallelProcessor, ParallelReader};
pub use partition::{Partition, PartitionMap};
pub use read::{Read, ReadMeta, ReadWriter, SeqRecord, Variant, Which};
pub use store::{FilterSummary, Mode, SeqStore, StoreOptions};
