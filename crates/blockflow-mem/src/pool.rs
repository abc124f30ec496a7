//! Thread-safe pool of row blocks.
//!
//! `acquire` hands out a `PooledBlock` resized to the requested shape,
//! reusing a previously released block when one is free. Dropping the handle
//! clears the block and puts it back on the free list (up to
//! `max_retained`); anything beyond that is simply freed.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use blockflow_core::block::RowBlock;
use blockflow_core::config::EngineConfig;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::tracking::PeakTracker;

struct PoolInner {
    free: Mutex<Vec<RowBlock>>,
    max_retained: usize,
    max_outstanding: Option<usize>,
    acquired: AtomicUsize,
    reused: AtomicUsize,
    released: AtomicUsize,
    discarded: AtomicUsize,
    outstanding: AtomicUsize,
    peak: PeakTracker,
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub acquired: usize,
    pub reused: usize,
    pub released: usize,
    pub discarded: usize,
    pub outstanding: usize,
    pub peak_outstanding: usize,
    pub free: usize,
}

#[derive(Clone)]
pub struct BlockPool {
    inner: Arc<PoolInner>,
}

impl BlockPool {
    pub fn new(max_retained: usize) -> Self {
        Self::build(max_retained, None)
    }

    /// A pool whose `try_acquire` fails once `max_outstanding` blocks are live.
    pub fn bounded(max_retained: usize, max_outstanding: usize) -> Self {
        Self::build(max_retained, Some(max_outstanding))
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(cfg.pool_max_retained)
    }

    fn build(max_retained: usize, max_outstanding: Option<usize>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(max_retained)),
                max_retained,
                max_outstanding,
                acquired: AtomicUsize::new(0),
                reused: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
                peak: PeakTracker::new(),
            }),
        }
    }

    /// A block of `columns` x `rows` undefined cells.
    pub fn acquire(&self, columns: usize, rows: usize) -> PooledBlock {
        let mut block = self.take_free();
        block.resize(columns, rows);
        self.track(block)
    }

    pub fn try_acquire(&self, columns: usize, rows: usize) -> Result<PooledBlock> {
        if let Some(limit) = self.inner.max_outstanding {
            let outstanding = self.inner.outstanding.load(Ordering::Acquire);
            if outstanding >= limit {
                return Err(Error::Exhausted { outstanding, limit });
            }
        }
        Ok(self.acquire(columns, rows))
    }

    /// Wrap an existing block so it is accounted for and returns here on drop.
    pub fn adopt(&self, block: RowBlock) -> PooledBlock {
        self.track(block)
    }

    /// Explicit return; same as dropping the handle.
    pub fn release(&self, block: PooledBlock) {
        drop(block);
    }

    pub fn stats(&self) -> PoolStats {
        let i = &self.inner;
        PoolStats {
            acquired: i.acquired.load(Ordering::Relaxed),
            reused: i.reused.load(Ordering::Relaxed),
            released: i.released.load(Ordering::Relaxed),
            discarded: i.discarded.load(Ordering::Relaxed),
            outstanding: i.outstanding.load(Ordering::Relaxed),
            peak_outstanding: i.peak.peak(),
            free: i.free.lock().len(),
        }
    }

    fn take_free(&self) -> RowBlock {
        match self.inner.free.lock().pop() {
            Some(b) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                b
            }
            None => RowBlock::new(),
        }
    }

    fn track(&self, block: RowBlock) -> PooledBlock {
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        let now = self.inner.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.peak.record(now);
        PooledBlock {
            block,
            pool: Some(self.clone()),
        }
    }

    fn give_back(&self, mut block: RowBlock) {
        self.inner.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.inner.released.fetch_add(1, Ordering::Relaxed);
        block.clear();
        let mut free = self.inner.free.lock();
        if free.len() < self.inner.max_retained {
            free.push(block);
        } else {
            self.inner.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn forget(&self) {
        self.inner.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockPool")
            .field("max_retained", &self.inner.max_retained)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A row block on loan from a `BlockPool`.
pub struct PooledBlock {
    block: RowBlock,
    // None once detached.
    pool: Option<BlockPool>,
}

impl PooledBlock {
    /// Take the block out of pool accounting; it will not come back.
    pub fn detach(mut self) -> RowBlock {
        if let Some(pool) = self.pool.take() {
            pool.forget();
        }
        std::mem::take(&mut self.block)
    }

    /// A copy drawn from the same pool.
    pub fn duplicate(&self) -> PooledBlock {
        match &self.pool {
            Some(pool) => {
                let mut copy = pool.acquire(0, 0);
                copy.block.clone_from(&self.block);
                copy
            }
            None => PooledBlock {
                block: self.block.clone(),
                pool: None,
            },
        }
    }
}

impl Deref for PooledBlock {
    type Target = RowBlock;
    fn deref(&self) -> &Self::Target {
        &self.block
    }
}

impl DerefMut for PooledBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.block
    }
}

impl Drop for PooledBlock {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            // NOTE: no logging here; drop is on the hot path.
            pool.give_back(std::mem::take(&mut self.block));
        }
    }
}

impl fmt::Debug for PooledBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBlock")
            .field("columns", &self.block.num_columns())
            .field("rows", &self.block.num_rows())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockflow_core::types::Value;

    #[test]
    fn released_block_is_reused() {
        let pool = BlockPool::new(4);
        let mut b = pool.acquire(2, 3);
        b.set_value(0, 0, Value::Integer(7));
        drop(b);
        let s = pool.stats();
        assert_eq!(s.outstanding, 0);
        assert_eq!(s.free, 1);

        let b = pool.acquire(3, 1);
        assert_eq!(b.num_columns(), 3);
        assert_eq!(b.num_rows(), 1);
        assert!(b.value(0, 0).is_undefined());
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn retention_is_capped() {
        let pool = BlockPool::new(1);
        let a = pool.acquire(1, 1);
        let b = pool.acquire(1, 1);
        drop(a);
        drop(b);
        let s = pool.stats();
        assert_eq!(s.free, 1);
        assert_eq!(s.discarded, 1);
        assert_eq!(s.peak_outstanding, 2);
    }

    #[test]
    fn detach_leaves_accounting() {
        let pool = BlockPool::new(2);
        let b = pool.acquire(1, 2);
        let raw = b.detach();
        assert_eq!(raw.num_rows(), 2);
        let s = pool.stats();
        assert_eq!(s.outstanding, 0);
        assert_eq!(s.free, 0);
        assert_eq!(s.released, 0);
    }

    #[test]
    fn duplicate_is_independent() {
        let pool = BlockPool::new(2);
        let mut a = pool.acquire(1, 1);
        a.set_value(0, 0, Value::Integer(1));
        let mut b = a.duplicate();
        b.set_value(0, 0, Value::Integer(2));
        assert_eq!(a.value(0, 0), &Value::Integer(1));
        assert_eq!(pool.stats().outstanding, 2);
    }

    #[test]
    fn bounded_pool_refuses() {
        let pool = BlockPool::bounded(1, 1);
        let _a = pool.try_acquire(1, 1).unwrap();
        let err = pool.try_acquire(1, 1).unwrap_err();
        assert!(matches!(err, Error::Exhausted { limit: 1, .. }));
    }

    #[test]
    fn concurrent_acquire_release() {
        let pool = BlockPool::new(8);
        std::thread::scope(|s| {
            for _ in 0..8 {
                let pool = pool.clone();
                s.spawn(move || {
                    for i in 0..200 {
                        let b = pool.acquire(2, i % 7);
                        assert_eq!(b.num_rows(), i % 7);
                    }
                });
            }
        });
        let s = pool.stats();
        assert_eq!(s.outstanding, 0);
        assert_eq!(s.acquired, 1600);
        assert!(s.free <= 8);
    }
}
