//! Bounded pools of reusable resources.
//!
//! A [`Pool`] is a fixed set of items parked in a bounded queue whose capacity
//! equals the number of items. Checking an item out waits until one is idle;
//! the returned guard hands it back when dropped, so the pool's cardinality
//! stays constant on every exit path of the borrower.
//!
//! [`Pool::checkout_many`] takes several items as one unit under the receive
//! lock. Two borrowers asking for batches can therefore never each hold half of
//! what the other needs.

use crate::{Error, Result};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify, mpsc};

pub struct Pool<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    capacity: usize,
    closed: AtomicBool,
    shutdown: Notify,
}

impl<T: Send + 'static> Pool<T> {
    /// Create a pool holding `items`.
    pub fn new(items: Vec<T>) -> Arc<Self> {
        let capacity = items.len();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        for item in items {
            let seeded = tx.try_send(item);
            debug_assert!(seeded.is_ok(), "pool seeded past its capacity");
        }

        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    /// Create a pool of `n` items built by `f`.
    pub fn with(n: usize, f: impl FnMut() -> T) -> Arc<Self> {
        Self::new(std::iter::repeat_with(f).take(n).collect())
    }

    /// Total number of items owned by the pool, idle or checked out.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently idle.
    pub fn available(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait for an idle item.
    pub async fn checkout(self: &Arc<Self>) -> Result<Pooled<T>> {
        let mut batch = self.checkout_many(1).await?;
        let item = batch.items.pop();

        Ok(Pooled {
            item,
            pool: Arc::clone(self),
        })
    }

    /// Wait until `n` items can be taken together.
    pub async fn checkout_many(self: &Arc<Self>, n: usize) -> Result<PooledBatch<T>> {
        if n > self.capacity {
            return Err(Error::Internal(format!(
                "batch of {} exceeds pool capacity {}",
                n, self.capacity
            )));
        }

        let result = tokio::select! {
            biased;
            _ = self.wait_closed() => Err(Error::Closed),
            batch = self.take(n) => batch,
        };

        if result.is_err() {
            self.drain();
        }

        result
    }

    /// Close the pool. Idle items are dropped now, checked out items when
    /// they come back, and pending or later checkouts fail with
    /// [`Error::Closed`]. Calling this more than once has no further effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            self.drain();
            return;
        }

        tracing::debug!(capacity = self.capacity, "closing pool");
        self.shutdown.notify_waiters();
        self.drain();
    }

    async fn take(self: &Arc<Self>, n: usize) -> Result<PooledBatch<T>> {
        let mut rx = self.rx.lock().await;

        // Items received so far go back to the pool if this future is dropped.
        let mut batch = PooledBatch {
            items: Vec::with_capacity(n),
            pool: Arc::clone(self),
        };

        while batch.items.len() < n {
            match rx.recv().await {
                Some(item) => batch.items.push(item),
                None => return Err(Error::Closed),
            }
        }

        Ok(batch)
    }

    async fn wait_closed(&self) {
        loop {
            let notified = self.shutdown.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    fn drain(&self) {
        if !self.is_closed() {
            return;
        }

        if let Ok(mut rx) = self.rx.try_lock() {
            rx.close();
            while let Ok(item) = rx.try_recv() {
                drop(item);
            }
        }
    }

    fn give_back(&self, item: T) {
        if self.is_closed() {
            return;
        }

        if self.tx.try_send(item).is_err() {
            tracing::trace!("pool closed while item was checked out");
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity)
            .field("available", &(self.tx.max_capacity() - self.tx.capacity()))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// A single item checked out of a [`Pool`].
pub struct Pooled<T: Send + 'static> {
    item: Option<T>,
    pool: Arc<Pool<T>>,
}

impl<T: Send + 'static> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("pooled item is only taken on drop")
    }
}

impl<T: Send + 'static> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item is only taken on drop")
    }
}

impl<T: Send + fmt::Debug + 'static> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.item).finish()
    }
}

impl<T: Send + 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.give_back(item);
        }
    }
}

/// Several items checked out of a [`Pool`] together and returned together.
pub struct PooledBatch<T: Send + 'static> {
    items: Vec<T>,
    pool: Arc<Pool<T>>,
}

impl<T: Send + 'static> Deref for PooledBatch<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T: Send + 'static> DerefMut for PooledBatch<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<T: Send + fmt::Debug + 'static> fmt::Debug for PooledBatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.items).finish()
    }
}

impl<T: Send + 'static> Drop for PooledBatch<T> {
    fn drop(&mut self) {
        for item in self.items.drain(..) {
            self.pool.give_back(item);
        }
    }
}
