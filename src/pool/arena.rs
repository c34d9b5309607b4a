//! Scoped scratch arenas.
//!
//! Each primitive call borrows one arena for its lifetime. The arena
//! vends scratch buffers (bytes and strings) that the call may use and
//! recycle freely; when the scope ends, the guard resets the arena and
//! returns it to the manager. Nothing handed out by an arena survives
//! its release: reset truncates every retained buffer, so a later scope
//! observes only empty storage.

use crate::pool::PoolStats;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Workload class an arena is sized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArenaClass {
    /// General primitive execution scratch (small)
    Primitive,
    /// Search candidate accumulation (medium)
    Search,
    /// JSON serialization scratch (large)
    Json,
}

impl ArenaClass {
    /// Initial capacity for buffers vended by this class.
    fn buffer_capacity(self) -> usize {
        match self {
            ArenaClass::Primitive => 1024,
            ArenaClass::Search => 16 * 1024,
            ArenaClass::Json => 64 * 1024,
        }
    }

    fn index(self) -> usize {
        match self {
            ArenaClass::Primitive => 0,
            ArenaClass::Search => 1,
            ArenaClass::Json => 2,
        }
    }
}

/// A scratch arena scoped to one primitive call.
///
/// Buffers taken from the arena should be handed back with the recycle
/// methods so later calls reuse their capacity; buffers that are not
/// handed back are simply dropped and the arena re-allocates on demand.
#[derive(Debug)]
pub struct ScopedArena {
    class: ArenaClass,
    bytes: Vec<Vec<u8>>,
    strings: Vec<String>,
    /// Buffers handed out during this scope
    handed_out: usize,
    /// Bytes of capacity retained across scopes
    retained_capacity: usize,
}

impl ScopedArena {
    fn new(class: ArenaClass) -> Self {
        Self {
            class,
            bytes: Vec::new(),
            strings: Vec::new(),
            handed_out: 0,
            retained_capacity: 0,
        }
    }

    /// The class this arena is sized for.
    pub fn class(&self) -> ArenaClass {
        self.class
    }

    /// Take a byte buffer (empty, with class-sized capacity).
    pub fn byte_buffer(&mut self) -> Vec<u8> {
        self.handed_out += 1;
        self.bytes
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.class.buffer_capacity()))
    }

    /// Take a string buffer (empty, with class-sized capacity).
    pub fn string_buffer(&mut self) -> String {
        self.handed_out += 1;
        self.strings
            .pop()
            .unwrap_or_else(|| String::with_capacity(self.class.buffer_capacity()))
    }

    /// Return a byte buffer for reuse within (and after) this scope.
    pub fn recycle_bytes(&mut self, mut buf: Vec<u8>) {
        buf.clear();
        self.retained_capacity += buf.capacity();
        self.bytes.push(buf);
    }

    /// Return a string buffer for reuse within (and after) this scope.
    pub fn recycle_string(&mut self, mut buf: String) {
        buf.clear();
        self.retained_capacity += buf.capacity();
        self.strings.push(buf);
    }

    /// Buffers handed out during the current scope.
    pub fn handed_out(&self) -> usize {
        self.handed_out
    }

    /// Bytes of buffer capacity retained for reuse across scopes.
    pub fn retained_capacity(&self) -> usize {
        self.retained_capacity
    }

    /// Truncate every retained buffer and zero the scope counters.
    fn reset(&mut self) {
        for buf in &mut self.bytes {
            buf.clear();
        }
        for buf in &mut self.strings {
            buf.clear();
        }
        self.handed_out = 0;
        self.retained_capacity = self.bytes.iter().map(|b| b.capacity()).sum::<usize>()
            + self.strings.iter().map(|s| s.capacity()).sum::<usize>();
    }
}

#[derive(Debug, Default)]
struct ManagerInner {
    /// Idle arenas per class (indexed by `ArenaClass::index`)
    idle: [Mutex<Vec<ScopedArena>>; 3],
    /// Arenas ever constructed
    created: AtomicUsize,
    /// Scopes ever vended
    scopes: AtomicUsize,
    /// Arenas currently out on loan
    active: AtomicUsize,
    /// High-water mark of simultaneously active arenas
    peak: AtomicUsize,
}

/// Vends [`ScopedArena`]s and reclaims them on scope end.
///
/// Arenas returned to the manager are reset, not destroyed, so their
/// buffer capacity is reused by the next scope of the same class.
#[derive(Debug, Clone, Default)]
pub struct ArenaManager {
    inner: Arc<ManagerInner>,
}

impl ArenaManager {
    /// Create an empty manager; arenas are constructed on first demand.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow an arena for one call scope.
    ///
    /// The returned guard dereferences to the arena and hands it back on
    /// drop. The arena must stay on the thread that acquired it.
    pub fn scope(&self, class: ArenaClass) -> ArenaGuard {
        self.inner.scopes.fetch_add(1, Ordering::Relaxed);
        let arena = {
            let mut idle = self.inner.idle[class.index()]
                .lock()
                .expect("arena free-list poisoned");
            idle.pop()
        };
        let arena = arena.unwrap_or_else(|| {
            self.inner.created.fetch_add(1, Ordering::Relaxed);
            ScopedArena::new(class)
        });

        let active = self.inner.active.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.peak.fetch_max(active, Ordering::Relaxed);

        ArenaGuard {
            arena: Some(arena),
            manager: Arc::clone(&self.inner),
        }
    }

    /// Scopes vended over the manager's lifetime.
    pub fn total_scopes(&self) -> usize {
        self.inner.scopes.load(Ordering::Relaxed)
    }

    /// Current counters, in the common pool shape.
    pub fn stats(&self) -> PoolStats {
        let free = self
            .inner
            .idle
            .iter()
            .map(|m| m.lock().map(|v| v.len()).unwrap_or(0))
            .sum();
        PoolStats {
            total_allocated: self.inner.created.load(Ordering::Relaxed),
            total_freed: self
                .inner
                .scopes
                .load(Ordering::Relaxed)
                .saturating_sub(self.inner.active.load(Ordering::Relaxed)),
            current: self.inner.active.load(Ordering::Relaxed),
            peak: self.inner.peak.load(Ordering::Relaxed),
            free,
        }
    }
}

/// RAII guard for a borrowed arena.
///
/// On drop, resets the arena and returns it to the manager's idle list.
#[derive(Debug)]
pub struct ArenaGuard {
    arena: Option<ScopedArena>,
    manager: Arc<ManagerInner>,
}

impl std::ops::Deref for ArenaGuard {
    type Target = ScopedArena;

    fn deref(&self) -> &ScopedArena {
        self.arena.as_ref().expect("arena taken")
    }
}

impl std::ops::DerefMut for ArenaGuard {
    fn deref_mut(&mut self) -> &mut ScopedArena {
        self.arena.as_mut().expect("arena taken")
    }
}

impl Drop for ArenaGuard {
    fn drop(&mut self) {
        if let Some(mut arena) = self.arena.take() {
            arena.reset();
            self.manager.active.fetch_sub(1, Ordering::Relaxed);
            if let Ok(mut idle) = self.manager.idle[arena.class.index()].lock() {
                idle.push(arena);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_vends_and_reclaims() {
        let manager = ArenaManager::new();

        {
            let mut arena = manager.scope(ArenaClass::Primitive);
            let mut buf = arena.byte_buffer();
            buf.extend_from_slice(b"scratch");
            arena.recycle_bytes(buf);
            assert_eq!(arena.handed_out(), 1);
            assert_eq!(manager.stats().current, 1);
        }

        let stats = manager.stats();
        assert_eq!(stats.current, 0);
        assert_eq!(stats.free, 1);
    }

    #[test]
    fn test_nothing_survives_release() {
        let manager = ArenaManager::new();

        {
            let mut arena = manager.scope(ArenaClass::Json);
            let mut buf = arena.byte_buffer();
            buf.extend_from_slice(b"leaked?");
            arena.recycle_bytes(buf);
        }

        // The same arena comes back, but every buffer is empty
        let mut arena = manager.scope(ArenaClass::Json);
        let buf = arena.byte_buffer();
        assert!(buf.is_empty());
        assert_eq!(arena.handed_out(), 1);
    }

    #[test]
    fn test_arena_reuse_by_class() {
        let manager = ArenaManager::new();

        drop(manager.scope(ArenaClass::Search));
        drop(manager.scope(ArenaClass::Search));
        drop(manager.scope(ArenaClass::Primitive));

        // Two Search scopes shared one arena; Primitive got its own
        assert_eq!(manager.stats().total_allocated, 2);
        assert_eq!(manager.total_scopes(), 3);
    }

    #[test]
    fn test_string_buffers_recycled() {
        let manager = ArenaManager::new();

        let mut arena = manager.scope(ArenaClass::Primitive);
        let mut s = arena.string_buffer();
        s.push_str("hello");
        let capacity = s.capacity();
        arena.recycle_string(s);

        let s = arena.string_buffer();
        assert!(s.is_empty());
        assert!(s.capacity() >= capacity.min(ArenaClass::Primitive.buffer_capacity()));
    }

    #[test]
    fn test_peak_counts_concurrent_scopes() {
        let manager = ArenaManager::new();

        let a = manager.scope(ArenaClass::Primitive);
        let b = manager.scope(ArenaClass::Primitive);
        assert_eq!(manager.stats().peak, 2);
        drop(a);
        drop(b);
        assert_eq!(manager.stats().current, 0);
        assert_eq!(manager.stats().peak, 2);
    }
}
