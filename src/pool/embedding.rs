//! SIMD-aligned embedding block pool.
//!
//! Embedding math wants 32-byte alignment so the similarity kernels can
//! use aligned vector loads. `Vec<f32>` only guarantees 4-byte
//! alignment, so blocks are carved with `std::alloc` and a 32-byte
//! `Layout`. Every [`crate::search::Vector`] stores its data in an
//! [`AlignedBlock`]; blocks leased from the pool carry a return path and
//! requeue themselves when the last reference drops, so the engine's
//! embed-on-store and embed-per-query churn recycles the same slabs.
//!
//! Blocks are zeroed on release and allocated zeroed, so an agent never
//! observes another agent's embedding through the pool.

use crate::error::{AgramaError, AgramaResult};
use crate::pool::PoolStats;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Alignment for embedding blocks (AVX2 lane width).
pub const EMBEDDING_ALIGN: usize = 32;

/// Owned 32-byte-aligned f32 storage. Deallocates on drop with the same
/// layout it was allocated with.
#[derive(Debug)]
struct RawBlock {
    ptr: NonNull<f32>,
    len: usize,
}

// The block exclusively owns its allocation.
unsafe impl Send for RawBlock {}
unsafe impl Sync for RawBlock {}

impl RawBlock {
    fn new(len: usize) -> Self {
        assert!(len > 0, "embedding dimension must be non-zero");
        let layout = Self::layout(len);
        // Safety: layout has non-zero size; alignment is a power of two.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut f32).expect("embedding block allocation failed");
        Self { ptr, len }
    }

    fn layout(len: usize) -> Layout {
        Layout::from_size_align(len * std::mem::size_of::<f32>(), EMBEDDING_ALIGN)
            .expect("invalid embedding block layout")
    }

    fn as_slice(&self) -> &[f32] {
        // Safety: ptr is valid for len floats for the block's lifetime.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [f32] {
        // Safety: exclusive borrow of self guarantees unique access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn zero(&mut self) {
        self.as_mut_slice().fill(0.0);
    }
}

impl Drop for RawBlock {
    fn drop(&mut self) {
        // Safety: allocated with the identical layout in `new`.
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, Self::layout(self.len)) };
    }
}

#[derive(Debug)]
struct PoolCore {
    dim: usize,
    free: Mutex<Vec<RawBlock>>,
    total_allocated: AtomicUsize,
    total_freed: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
    cap: usize,
}

impl PoolCore {
    /// Accept a leased block back: zero it and requeue.
    fn give_back(&self, mut raw: RawBlock) {
        raw.zero();
        self.total_freed.fetch_add(1, Ordering::Relaxed);
        self.current.fetch_sub(1, Ordering::Relaxed);
        if let Ok(mut free) = self.free.lock() {
            free.push(raw);
        }
    }
}

/// A 32-byte-aligned block of `f32` values.
///
/// Blocks leased from an [`EmbeddingPool`] return to it when dropped;
/// standalone blocks simply deallocate. Either way the storage is
/// aligned, so vectors built on top are uniform.
#[derive(Debug)]
pub struct AlignedBlock {
    raw: Option<RawBlock>,
    home: Weak<PoolCore>,
}

impl AlignedBlock {
    /// A standalone aligned block holding a copy of `data`.
    pub fn unpooled(data: &[f32]) -> Self {
        let mut raw = RawBlock::new(data.len());
        raw.as_mut_slice().copy_from_slice(data);
        Self {
            raw: Some(raw),
            home: Weak::new(),
        }
    }

    fn raw(&self) -> &RawBlock {
        self.raw.as_ref().expect("block already returned")
    }

    /// Number of floats in the block.
    pub fn len(&self) -> usize {
        self.raw().len
    }

    /// Whether the block holds zero floats (never true in practice).
    pub fn is_empty(&self) -> bool {
        self.raw().len == 0
    }

    /// Whether this block returns to a pool on drop.
    pub fn is_pooled(&self) -> bool {
        self.home.strong_count() > 0
    }

    /// View the block as a slice.
    pub fn as_slice(&self) -> &[f32] {
        self.raw().as_slice()
    }

    /// View the block as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.raw.as_mut().expect("block already returned").as_mut_slice()
    }

    /// Copy `src` into the block. `src.len()` must equal the block size.
    pub fn copy_from(&mut self, src: &[f32]) {
        self.as_mut_slice().copy_from_slice(src);
    }
}

impl Drop for AlignedBlock {
    fn drop(&mut self) {
        let Some(raw) = self.raw.take() else { return };
        if let Some(core) = self.home.upgrade() {
            core.give_back(raw);
        }
        // Without a living pool, raw deallocates on its own drop
    }
}

/// Pool of aligned embedding blocks for one dimension.
///
/// Cheap to clone; clones share the same slabs.
#[derive(Debug, Clone)]
pub struct EmbeddingPool {
    core: Arc<PoolCore>,
}

impl EmbeddingPool {
    /// Create a pool vending blocks of `dim` floats, at most `cap` blocks.
    pub fn new(dim: usize, cap: usize) -> Self {
        Self {
            core: Arc::new(PoolCore {
                dim,
                free: Mutex::new(Vec::new()),
                total_allocated: AtomicUsize::new(0),
                total_freed: AtomicUsize::new(0),
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                cap,
            }),
        }
    }

    /// The embedding dimension this pool serves.
    pub fn dim(&self) -> usize {
        self.core.dim
    }

    /// Lease a zeroed block. The block returns to the pool when dropped.
    ///
    /// # Errors
    ///
    /// `PoolExhausted` once `cap` blocks exist and none are free.
    pub fn acquire(&self) -> AgramaResult<AlignedBlock> {
        let raw = {
            let mut free = self.core.free.lock().expect("embedding free-list poisoned");
            match free.pop() {
                Some(raw) => raw,
                None => {
                    if self.core.total_allocated.load(Ordering::Relaxed) >= self.core.cap {
                        return Err(AgramaError::PoolExhausted {
                            pool: "embedding".to_string(),
                            cap: self.core.cap,
                        });
                    }
                    self.core.total_allocated.fetch_add(1, Ordering::Relaxed);
                    RawBlock::new(self.core.dim)
                }
            }
        };

        let current = self.core.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.core.peak.fetch_max(current, Ordering::Relaxed);
        Ok(AlignedBlock {
            raw: Some(raw),
            home: Arc::downgrade(&self.core),
        })
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_allocated: self.core.total_allocated.load(Ordering::Relaxed),
            total_freed: self.core.total_freed.load(Ordering::Relaxed),
            current: self.core.current.load(Ordering::Relaxed),
            peak: self.core.peak.load(Ordering::Relaxed),
            free: self.core.free.lock().map(|f| f.len()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_aligned() {
        let pool = EmbeddingPool::new(768, 16);
        let block = pool.acquire().unwrap();
        assert_eq!(block.as_slice().as_ptr() as usize % EMBEDDING_ALIGN, 0);
        assert_eq!(block.len(), 768);
        assert!(block.is_pooled());

        let standalone = AlignedBlock::unpooled(&[1.0, 2.0]);
        assert_eq!(standalone.as_slice().as_ptr() as usize % EMBEDDING_ALIGN, 0);
        assert!(!standalone.is_pooled());
    }

    #[test]
    fn test_drop_returns_block_zeroed() {
        let pool = EmbeddingPool::new(8, 4);

        let mut block = pool.acquire().unwrap();
        block.copy_from(&[1.0; 8]);
        drop(block);

        let stats = pool.stats();
        assert_eq!(stats.current, 0);
        assert_eq!(stats.total_freed, 1);
        assert_eq!(stats.free, 1);

        // The recycled block comes back zeroed
        let block = pool.acquire().unwrap();
        assert!(block.as_slice().iter().all(|&x| x == 0.0));
        assert_eq!(pool.stats().total_allocated, 1);
    }

    #[test]
    fn test_cap_enforced() {
        let pool = EmbeddingPool::new(4, 2);

        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(matches!(
            pool.acquire(),
            Err(AgramaError::PoolExhausted { .. })
        ));

        drop(a);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_stats_counters() {
        let pool = EmbeddingPool::new(4, 8);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.stats().current, 2);
        assert_eq!(pool.stats().peak, 2);

        drop(a);
        drop(b);
        let stats = pool.stats();
        assert_eq!(stats.current, 0);
        assert_eq!(stats.total_allocated, 2);
        assert_eq!(stats.total_freed, 2);
        assert_eq!(stats.free, 2);
    }

    #[test]
    fn test_block_outliving_pool_deallocates() {
        let pool = EmbeddingPool::new(4, 4);
        let block = pool.acquire().unwrap();
        drop(pool);
        // No pool to return to; the block just deallocates
        drop(block);
    }

    #[test]
    fn test_copy_roundtrip() {
        let pool = EmbeddingPool::new(4, 4);
        let mut block = pool.acquire().unwrap();
        block.copy_from(&[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(block.as_slice(), &[0.1, 0.2, 0.3, 0.4]);
    }
}
