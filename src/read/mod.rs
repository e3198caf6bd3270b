//! Per-read records
//!
//! Every read has one [`ReadMeta`] (library and blob locator) and four [`SeqRecord`]s,
//! one per [`Variant`]. Sequence records are the only metadata that is ever updated in
//! place: trimming and filtering set clear ranges and ignore flags on them, while the
//! blob a [`ReadMeta`] points at is never modified.

mod decoded;
mod meta;
mod seq;
mod which;
mod writer;

pub use decoded::Read;
pub use meta::{ReadMeta, MAX_ASSIGNMENT, MAX_ASSIGNMENT_SCORE, MAX_READ_ID, READ_ID_BITS, SIZE_READ_META};
pub use seq::{SeqRecord, MAX_READ_LEN, READ_LEN_BITS, SIZE_SEQ_RECORD};
pub use which::{Variant, Which};
pub use writer::{normalize_bases, ReadWriter};
