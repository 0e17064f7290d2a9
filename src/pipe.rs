//! Single-producer, single-consumer byte stream between a fetch task and its
//! reader.
//!
//! The producer hands over whole chunks through a bounded channel, so a slow
//! reader throttles the producer. The consumer copies chunks into whatever
//! buffer size its caller uses and keeps the unread tail of the latest chunk
//! as carry-over for the next read.
//!
//! [`StreamPipe`] implements both [`std::io::Read`], for callers on plain
//! threads, and [`tokio::io::AsyncRead`].

use crate::{Error, Result};
use bytes::{Buf, Bytes};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Create a connected writer/stream pair buffering at most `capacity` chunks.
pub fn pipe(capacity: usize) -> (PipeWriter, StreamPipe) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PipeWriter { tx },
        StreamPipe {
            rx,
            carry: Bytes::new(),
            fault: None,
            done: false,
        },
    )
}

/// Producer half of a [`pipe`]. Dropping it ends the stream.
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<Result<Bytes>>,
}

impl PipeWriter {
    /// Send one chunk, waiting while the channel is full.
    ///
    /// Fails with [`Error::Closed`] once the stream has been dropped.
    pub async fn write(&self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        self.tx.send(Ok(chunk)).await.map_err(|_| Error::Closed)
    }

    /// Blocking variant of [`PipeWriter::write`] for producers outside the
    /// runtime.
    #[cfg(test)]
    pub(crate) fn blocking_write(&self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        self.tx.blocking_send(Ok(chunk)).map_err(|_| Error::Closed)
    }

    /// End the stream with an error, after every chunk already written.
    pub async fn fail(self, err: Error) {
        if self.tx.send(Err(err)).await.is_err() {
            tracing::debug!("stream dropped before fault could be delivered");
        }
    }

    /// Whether the consumer has dropped its end.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of a [`pipe`]: a sequential byte source.
#[derive(Debug)]
pub struct StreamPipe {
    rx: mpsc::Receiver<Result<Bytes>>,
    carry: Bytes,
    fault: Option<Error>,
    done: bool,
}

impl StreamPipe {
    /// A stream that is already exhausted.
    pub fn empty() -> Self {
        let (_, stream) = pipe(1);
        stream
    }

    /// Number of carried-over bytes waiting to be read.
    pub fn carried(&self) -> usize {
        self.carry.len()
    }

    /// Copy carry-over and already-queued chunks into `dst` without waiting.
    ///
    /// Returns the number of bytes copied. Stops early at a fault, which is
    /// held back until the bytes before it have been handed out.
    fn fill(&mut self, dst: &mut [u8]) -> usize {
        let mut n = self.take_carry(dst);

        while n < dst.len() && !self.done && self.fault.is_none() {
            match self.rx.try_recv() {
                Ok(Ok(chunk)) => {
                    self.carry = chunk;
                    n += self.take_carry(&mut dst[n..]);
                }
                Ok(Err(e)) => self.fault = Some(e),
                Err(TryRecvError::Disconnected) => self.done = true,
                Err(TryRecvError::Empty) => break,
            }
        }

        n
    }

    fn take_carry(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.carry.len());
        dst[..n].copy_from_slice(&self.carry[..n]);
        self.carry.advance(n);
        n
    }

    /// Handle one chunk received while blocked. Returns `Ok(0)` at the end of
    /// the stream.
    fn accept(&mut self, received: Option<Result<Bytes>>, dst: &mut [u8]) -> io::Result<usize> {
        match received {
            Some(Ok(chunk)) => {
                self.carry = chunk;
                Ok(self.fill(dst))
            }
            Some(Err(e)) => {
                self.done = true;
                Err(e.into())
            }
            None => {
                self.done = true;
                Ok(0)
            }
        }
    }

    fn pending_fault(&mut self) -> Option<io::Error> {
        self.fault.take().map(|e| {
            self.done = true;
            e.into()
        })
    }
}

/// Blocking reads for consumers on plain threads, such as those started with
/// [`tokio::task::spawn_blocking`].
///
/// # Panics
///
/// A read that has to wait for the producer panics when called from within
/// an asynchronous execution context. Use the [`AsyncRead`] implementation
/// there instead.
impl io::Read for StreamPipe {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }

        loop {
            let n = self.fill(dst);
            if n > 0 {
                return Ok(n);
            }
            if let Some(e) = self.pending_fault() {
                return Err(e);
            }
            if self.done {
                return Ok(0);
            }

            let received = self.rx.blocking_recv();
            let n = self.accept(received, dst)?;
            if n > 0 || self.done {
                return Ok(n);
            }
        }
    }
}

impl AsyncRead for StreamPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            let dst = buf.initialize_unfilled();
            let n = this.fill(dst);
            if n > 0 {
                buf.advance(n);
                return Poll::Ready(Ok(()));
            }
            if let Some(e) = this.pending_fault() {
                return Poll::Ready(Err(e));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }

            let received = ready!(this.rx.poll_recv(cx));
            let dst = buf.initialize_unfilled();
            let n = this.accept(received, dst)?;
            if n > 0 || this.done {
                buf.advance(n);
                return Poll::Ready(Ok(()));
            }
        }
    }
}


#[cfg(test)]
mod async_tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_async_reader_with_backpressure() {
        let (writer, mut stream) = pipe(1);
        let producer = tokio::spawn(async move {
            for i in 0..50 {
                writer.write(Bytes::from(format!("{}\n", i))).await.unwrap();
            }
        });

        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        producer.await.unwrap();

        let expected: String = (0..50).map(|i| format!("{}\n", i)).collect();
        assert_eq!(out, expected.as_bytes());
    }

    #[tokio::test]
    async fn test_async_fault_is_reported_once() {
        let (writer, mut stream) = pipe(2);
        writer.write(Bytes::from_static(b"ok\n")).await.unwrap();
        writer.fail(Error::Iterator("truncated".to_string())).await;

        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf[..3], b"ok\n");

        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut rest = Vec::new();
        assert_eq!(stream.read_to_end(&mut rest).await.unwrap(), 0);
    }
}
