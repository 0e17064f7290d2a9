//! Indexed storage abstraction for position-sorted genomic data files.
//!
//! An [`IndexedStorage`] owns everything format specific: the loaded index,
//! how read handles onto the data file are opened, how reference sequence
//! names map to numeric ids and how records are pulled out of a byte range.
//! [`IndexedSource`](crate::IndexedSource) layers handle pooling, scratch
//! buffers and streaming on top of it.
//!
//! # Implementations
//!
//! - [`TabixStorage`] - BGZF-compressed files with a `.tbi` or `.csi` sidecar
//!
//! # Example
//!
//! ```no_run
//! use tbxpool::storage::{IndexedStorage, TabixStorage};
//!
//! # async fn run() -> tbxpool::Result<()> {
//! let storage = TabixStorage::open("variants.vcf.gz").await?;
//! let id = storage.reference_sequence_id("chr1");
//! # Ok(())
//! # }
//! ```

mod tabix;

pub use tabix::{TabixCursor, TabixStorage};

use crate::Result;
use async_trait::async_trait;

/// Storage backend trait for random access into an indexed data file.
#[async_trait]
pub trait IndexedStorage: Send + Sync + 'static {
    /// An open read handle on the data file.
    type Handle: Send + 'static;

    /// A positional iterator over the records of one reference sequence that
    /// overlap one interval.
    type Cursor: Send + 'static;

    /// Open a new read handle on the data file.
    async fn open_handle(&self) -> Result<Self::Handle>;

    /// Look up the numeric id of a reference sequence name, exactly as given.
    fn reference_sequence_id(&self, name: &str) -> Option<usize>;

    /// Position an iterator over the 0-based, half-open interval
    /// `[start, end)` of reference sequence `id`.
    ///
    /// Returns `None` when the index holds no data blocks for the interval.
    fn query(&self, id: usize, start: u64, end: u64) -> Result<Option<Self::Cursor>>;

    /// Pull the next overlapping record into `buf`, replacing its contents
    /// and leaving out the line terminator.
    ///
    /// Returns `Ok(false)` once the iterator is exhausted.
    async fn read_record(
        &self,
        handle: &mut Self::Handle,
        cursor: &mut Self::Cursor,
        buf: &mut Vec<u8>,
    ) -> Result<bool>;
}
