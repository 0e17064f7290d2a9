//! Background task feeding one query's [`StreamPipe`](crate::StreamPipe).
//!
//! A fetch task borrows one read handle and a batch of scratch buffers, pulls
//! records through the query's positional iterator a batch at a time, joins
//! each batch into one newline-terminated chunk and writes it into the pipe.
//! Batching amortizes the per-record cost of the storage calls and keeps the
//! number of channel sends low.
//!
//! When it stops the task closes the pipe, then returns the handle, then the
//! scratch buffers. The guards make that happen on every exit path.

use crate::pipe::PipeWriter;
use crate::pool::Pool;
use crate::storage::IndexedStorage;
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub(crate) struct FetchTask<S: IndexedStorage> {
    pub storage: Arc<S>,
    pub handles: Arc<Pool<S::Handle>>,
    pub scratch: Arc<Pool<Vec<u8>>>,
    pub batch_size: usize,
    pub cursor: S::Cursor,
    pub writer: PipeWriter,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FetchStats {
    records: usize,
    chunks: usize,
}

impl<S: IndexedStorage> FetchTask<S> {
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let FetchTask {
            storage,
            handles,
            scratch,
            batch_size,
            mut cursor,
            writer,
        } = self;

        let mut handle = match handles.checkout().await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::debug!(error = %e, "no read handle for fetch");
                writer.fail(e).await;
                return;
            }
        };

        let mut buffers = match scratch.checkout_many(batch_size).await {
            Ok(buffers) => buffers,
            Err(e) => {
                tracing::debug!(error = %e, "no scratch buffers for fetch");
                writer.fail(e).await;
                return;
            }
        };

        match pull(&*storage, &mut *handle, &mut cursor, &mut *buffers, &writer).await {
            Ok(stats) => {
                tracing::debug!(records = stats.records, chunks = stats.chunks, "fetch finished");
                drop(writer);
            }
            Err(Error::Closed) => {
                tracing::debug!("stream dropped by reader, stopping fetch");
                drop(writer);
            }
            Err(e) => {
                tracing::error!(error = %e, "iterator failed mid-stream");
                writer.fail(e).await;
            }
        }

        drop(handle);
        drop(buffers);
    }
}

/// Pull records until the iterator is exhausted, it fails, or the reader
/// goes away.
///
/// Records are read straight into the first scratch buffer; the rest of the
/// batch is read into the other buffers and appended to the first one.
async fn pull<S: IndexedStorage>(
    storage: &S,
    handle: &mut S::Handle,
    cursor: &mut S::Cursor,
    scratch: &mut [Vec<u8>],
    writer: &PipeWriter,
) -> Result<FetchStats> {
    let mut stats = FetchStats::default();

    let Some((first, rest)) = scratch.split_first_mut() else {
        return Err(Error::Internal("fetch needs at least one scratch buffer".to_string()));
    };

    loop {
        if writer.is_closed() {
            return Err(Error::Closed);
        }

        if !storage.read_record(handle, cursor, first).await? {
            break;
        }
        first.push(b'\n');

        let mut records = 1;
        let mut exhausted = false;
        let mut fault = None;

        for buf in rest.iter_mut() {
            match storage.read_record(handle, cursor, buf).await {
                Ok(true) => {
                    first.extend_from_slice(buf);
                    first.push(b'\n');
                    records += 1;
                }
                Ok(false) => {
                    exhausted = true;
                    break;
                }
                Err(e) => {
                    fault = Some(e);
                    break;
                }
            }
        }

        // A short batch still carries every record pulled before it ended.
        writer.write(Bytes::copy_from_slice(first)).await?;
        stats.records += records;
        stats.chunks += 1;

        if let Some(e) = fault {
            return Err(e);
        }
        if exhausted {
            break;
        }
    }

    Ok(stats)
}
