//! Fixed-size object pool with a free-list and capped geometric growth.

use crate::error::{AgramaError, AgramaResult};
use crate::pool::PoolStats;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Objects that can live in a [`FixedPool`].
///
/// `reset` must return the object to a state indistinguishable from a
/// freshly constructed one; the pool calls it on every release so no
/// caller data leaks between uses.
pub trait Poolable: Default + Send {
    /// Zero the object for reuse.
    fn reset(&mut self);
}

impl Poolable for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Poolable for String {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Poolable for Vec<(u64, f32)> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Pre-allocated pool of `T` values.
///
/// `acquire` pops from the free-list; `release` resets the object and
/// pushes it back. When the free-list runs dry the pool grows
/// geometrically (×1.5) up to a hard cap, after which acquire fails with
/// [`AgramaError::PoolExhausted`].
#[derive(Debug)]
pub struct FixedPool<T: Poolable> {
    name: &'static str,
    free: Mutex<Vec<T>>,
    /// Objects ever constructed
    total_allocated: AtomicUsize,
    /// Release operations observed
    total_freed: AtomicUsize,
    /// Objects currently handed out
    current: AtomicUsize,
    /// High-water mark of handed-out objects
    peak: AtomicUsize,
    /// Hard cap on total constructed objects
    cap: usize,
}

impl<T: Poolable> FixedPool<T> {
    /// Create a pool with `initial` pre-allocated objects and a hard cap.
    pub fn new(name: &'static str, initial: usize, cap: usize) -> Self {
        let initial = initial.min(cap);
        let mut free = Vec::with_capacity(initial);
        for _ in 0..initial {
            free.push(T::default());
        }
        Self {
            name,
            free: Mutex::new(free),
            total_allocated: AtomicUsize::new(initial),
            total_freed: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            cap,
        }
    }

    /// Take an object from the pool.
    ///
    /// # Errors
    ///
    /// `PoolExhausted` once the hard cap is reached and nothing is free.
    pub fn acquire(&self) -> AgramaResult<T> {
        let mut free = self.free.lock().expect("pool free-list poisoned");
        let obj = match free.pop() {
            Some(obj) => obj,
            None => {
                let allocated = self.total_allocated.load(Ordering::Relaxed);
                if allocated >= self.cap {
                    return Err(AgramaError::PoolExhausted {
                        pool: self.name.to_string(),
                        cap: self.cap,
                    });
                }
                // Grow ×1.5: construct the batch now so the next acquires
                // hit the free-list instead of the allocator.
                let target = ((allocated * 3) / 2).max(allocated + 1).min(self.cap);
                for _ in allocated..target.saturating_sub(1) {
                    free.push(T::default());
                }
                self.total_allocated.store(target, Ordering::Relaxed);
                T::default()
            }
        };
        drop(free);

        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak.fetch_max(current, Ordering::Relaxed);
        Ok(obj)
    }

    /// Return an object to the pool. The object is reset before it
    /// becomes available again.
    pub fn release(&self, mut obj: T) {
        obj.reset();
        self.total_freed.fetch_add(1, Ordering::Relaxed);
        self.current.fetch_sub(1, Ordering::Relaxed);
        self.free.lock().expect("pool free-list poisoned").push(obj);
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
            total_freed: self.total_freed.load(Ordering::Relaxed),
            current: self.current.load(Ordering::Relaxed),
            peak: self.peak.load(Ordering::Relaxed),
            free: self.free.lock().map(|f| f.len()).unwrap_or(0),
        }
    }

    /// The pool's hard cap.
    pub fn cap(&self) -> usize {
        self.cap
    }
}
