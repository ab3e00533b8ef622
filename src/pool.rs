//! Scratch pool for transfers the service cannot reach directly

use core::borrow::BorrowMut;
use core::ops::{Deref, DerefMut};

/// Alignment of every block handed out by the pool
pub const ALIGN: usize = 32;

/// Scratch pool error
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PoolError {
    /// The region has no usable byte after alignment
    TooSmall,
    /// The requested block does not fit
    Exhausted,
}

/// Allocation counters
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PoolStats {
    pub allocs: u32,
    pub frees: u32,
}

/// A pool over memory that satisfies the service's residency requirement.
///
/// Blocks are request scoped: a [ScratchBlock] borrows the pool, so only one
/// block exists at a time and it is freed when dropped.
pub struct ScratchPool<T: BorrowMut<[u8]>> {
    inner: T,
    base: usize, // offset of the first aligned byte
    stats: PoolStats,
}

impl<T: BorrowMut<[u8]>> ScratchPool<T> {
    /// Creates a pool over `inner`
    ///
    /// # Errors
    /// * [TooSmall]
    ///
    /// [TooSmall]: crate::pool::PoolError::TooSmall
    pub fn new(inner: T) -> Result<ScratchPool<T>, PoolError> {
        let base = Self::aligned_base(inner.borrow());
        if base >= inner.borrow().len() {
            return Err(PoolError::TooSmall);
        }
        Ok(ScratchPool {
            inner,
            base,
            stats: PoolStats::default(),
        })
    }

    /// Returns `true` if a pool could be created over `region`
    pub fn fits(region: &[u8]) -> bool {
        Self::aligned_base(region) < region.len()
    }

    fn aligned_base(region: &[u8]) -> usize {
        match region.as_ptr().align_offset(ALIGN) {
            usize::MAX => region.len(),
            offset => offset,
        }
    }

    /// Number of bytes available for a block
    pub fn capacity(&self) -> usize {
        self.inner.borrow().len() - self.base
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Allocates a block of exactly `len` bytes
    ///
    /// # Errors
    /// * [Exhausted]
    ///
    /// [Exhausted]: crate::pool::PoolError::Exhausted
    pub fn alloc(&mut self, len: usize) -> Result<ScratchBlock<'_, T>, PoolError> {
        if len > self.capacity() {
            return Err(PoolError::Exhausted);
        }
        self.stats.allocs += 1;
        Ok(ScratchBlock { pool: self, len })
    }

    /// Gives the backing region back
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// A block of the [ScratchPool], freed on drop
pub struct ScratchBlock<'p, T: BorrowMut<[u8]>> {
    pool: &'p mut ScratchPool<T>,
    len: usize,
}

impl<T: BorrowMut<[u8]>> Deref for ScratchBlock<'_, T> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        let base = self.pool.base;
        &self.pool.inner.borrow()[base..base + self.len]
    }
}

impl<T: BorrowMut<[u8]>> DerefMut for ScratchBlock<'_, T> {
    fn deref_mut(&mut self) -> &mut [u8] {
        let base = self.pool.base;
        &mut self.pool.inner.borrow_mut()[base..base + self.len]
    }
}

impl<T: BorrowMut<[u8]>> Drop for ScratchBlock<'_, T> {
    fn drop(&mut self) {
        self.pool.stats.frees += 1;
    }
}
