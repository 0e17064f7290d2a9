//! Random-access region queries against one indexed file.
//!
//! An [`IndexedSource`] owns the loaded index, a bounded pool of read handles
//! and a bounded pool of scratch buffers, all shared by every query issued
//! against it. Each query that touches index data gets its own background
//! fetch task and [`StreamPipe`]; the caller gets the stream back before any
//! record has been read.
//!
//! # Example
//!
//! ```no_run
//! use tbxpool::IndexedSource;
//! use tokio::io::AsyncReadExt;
//!
//! # async fn run() -> tbxpool::Result<()> {
//! let source = IndexedSource::open("variants.vcf.gz").await?;
//!
//! let mut records = String::new();
//! source
//!     .query("chr1", 50_000, 90_000)
//!     .await?
//!     .read_to_string(&mut records)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{SourceOptions, UnknownContigPolicy};
use crate::fetch::FetchTask;
use crate::pipe::{StreamPipe, pipe};
use crate::pool::Pool;
use crate::storage::{IndexedStorage, TabixStorage};
use crate::types::Region;
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Prefix tried on and off reference names that miss the index as given.
pub const CONTIG_PREFIX: &str = "chr";

/// Idle and total counts of a source's pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub handles_available: usize,
    pub handles_capacity: usize,
    pub scratch_available: usize,
    pub scratch_capacity: usize,
}

impl PoolStatus {
    /// Whether every handle and scratch buffer is back in its pool.
    pub fn is_idle(&self) -> bool {
        self.handles_available == self.handles_capacity
            && self.scratch_available == self.scratch_capacity
    }
}

pub struct IndexedSource<S: IndexedStorage = TabixStorage> {
    storage: Arc<S>,
    handles: Arc<Pool<S::Handle>>,
    scratch: Arc<Pool<Vec<u8>>>,
    contigs: RwLock<HashMap<String, Option<usize>>>,
    options: SourceOptions,
}

impl IndexedSource<TabixStorage> {
    /// Open a tabix-indexed file with default options.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, SourceOptions::default()).await
    }

    pub async fn open_with<P: AsRef<Path>>(path: P, options: SourceOptions) -> Result<Self> {
        let storage = TabixStorage::open(path).await?;
        Self::with_storage(storage, options).await
    }
}

impl<S: IndexedStorage> IndexedSource<S> {
    /// Wrap any indexed storage, eagerly opening the pooled read handles.
    pub async fn with_storage(storage: S, options: SourceOptions) -> Result<Self> {
        let options = options.normalized();

        let mut handles = Vec::with_capacity(options.pool_size);
        for _ in 0..options.pool_size {
            handles.push(storage.open_handle().await?);
        }

        tracing::debug!(
            handles = options.pool_size,
            scratch = options.scratch_pool_size(),
            "opened source"
        );

        Ok(Self {
            storage: Arc::new(storage),
            handles: Pool::new(handles),
            scratch: Pool::with(options.scratch_pool_size(), Vec::new),
            contigs: RwLock::new(HashMap::new()),
            options,
        })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn options(&self) -> &SourceOptions {
        &self.options
    }

    pub fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            handles_available: self.handles.available(),
            handles_capacity: self.handles.capacity(),
            scratch_available: self.scratch.available(),
            scratch_capacity: self.scratch.capacity(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handles.is_closed()
    }

    /// Resolve a reference sequence name to its numeric id.
    ///
    /// The name is looked up as given, then with [`CONTIG_PREFIX`] stripped
    /// if it has it or prepended if it does not. The outcome, including a
    /// miss, is cached under the name as given.
    pub async fn resolve_contig(&self, name: &str) -> Option<usize> {
        if let Some(id) = self.contigs.read().await.get(name) {
            return *id;
        }

        let mut contigs = self.contigs.write().await;
        if let Some(id) = contigs.get(name) {
            return *id;
        }

        let id = self.lookup(name);
        tracing::debug!(contig = name, id = ?id, "resolved reference sequence");
        contigs.insert(name.to_string(), id);

        id
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.storage.reference_sequence_id(name).or_else(|| {
            match name.strip_prefix(CONTIG_PREFIX) {
                Some(stripped) => self.storage.reference_sequence_id(stripped),
                None => self
                    .storage
                    .reference_sequence_id(&format!("{}{}", CONTIG_PREFIX, name)),
            }
        })
    }

    /// Stream the records of `contig` overlapping the 0-based, half-open
    /// interval `[start, end)`, newline-terminated and in index order.
    ///
    /// The stream is returned as soon as the fetch task is started. Unknown
    /// contigs yield an empty stream unless the source was opened with
    /// [`UnknownContigPolicy::Error`], as do intervals without index data.
    pub async fn query(&self, contig: &str, start: u64, end: u64) -> Result<StreamPipe> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let Some(id) = self.resolve_contig(contig).await else {
            return match self.options.unknown_contig {
                UnknownContigPolicy::Empty => {
                    tracing::warn!(contig, "reference sequence not found in index");
                    Ok(StreamPipe::empty())
                }
                UnknownContigPolicy::Error => Err(Error::UnknownContig(contig.to_string())),
            };
        };

        if start >= end {
            return Ok(StreamPipe::empty());
        }

        let Some(cursor) = self.storage.query(id, start, end)? else {
            tracing::trace!(contig, start, end, "no index data for interval");
            return Ok(StreamPipe::empty());
        };

        let (writer, stream) = pipe(self.options.channel_capacity);
        FetchTask {
            storage: Arc::clone(&self.storage),
            handles: Arc::clone(&self.handles),
            scratch: Arc::clone(&self.scratch),
            batch_size: self.options.batch_size,
            cursor,
            writer,
        }
        .spawn();

        Ok(stream)
    }

    pub async fn query_region(&self, region: &Region) -> Result<StreamPipe> {
        let (start, end) = region.bounds();
        self.query(&region.reference_name, start, end).await
    }

    /// Release the pooled handles and scratch buffers.
    ///
    /// Idle resources are dropped immediately and those held by running
    /// fetch tasks when the tasks finish. Later queries fail with
    /// [`Error::Closed`], as do queries whose task has not yet checked out a
    /// handle. Calling this again has no effect.
    ///
    /// Dropping a source without closing it leaves accepted queries running:
    /// every fetch task holds the storage and both pools, which are released
    /// when the last of them finishes.
    pub fn close(&self) {
        if !self.is_closed() {
            tracing::debug!("closing source");
        }
        self.handles.close();
        self.scratch.close();
    }
}
