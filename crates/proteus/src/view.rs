//! Recompute-then-cache snapshots of report rows.
//!
//! Readers always get a complete list: either the one built before the last
//! invalidation or the one rebuilt after it, never a partially updated one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub struct CachedView<T> {
    dirty: AtomicBool,
    /// Serializes rebuilds, so only one reader recomputes a dirty view
    rebuild: Mutex<()>,
    snapshot: RwLock<Arc<Vec<T>>>,
}

impl<T> Default for CachedView<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CachedView<T> {
    /// An empty view that is built on first access
    pub fn new() -> Self {
        Self {
            dirty: AtomicBool::new(true),
            rebuild: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Mark the view stale, e.g. after scoring, ranking or filter settings changed
    pub fn invalidate(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Current snapshot, rebuilt with `build` first if the view is dirty
    pub fn get<F>(&self, build: F) -> Arc<Vec<T>>
    where
        F: FnOnce() -> Vec<T>,
    {
        if self.is_dirty() {
            let _guard = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
            // Another reader may have rebuilt while we waited for the lock
            if self.dirty.swap(false, Ordering::AcqRel) {
                let rows = Arc::new(build());
                *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = rows;
            }
        }
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn rebuild_only_when_dirty() {
        let view = CachedView::new();
        let builds = AtomicUsize::new(0);
        let build = || {
            builds.fetch_add(1, Ordering::Relaxed);
            vec![1, 2, 3]
        };
        assert!(view.is_dirty());
        assert_eq!(*view.get(build), vec![1, 2, 3]);
        assert_eq!(*view.get(build), vec![1, 2, 3]);
        assert_eq!(builds.load(Ordering::Relaxed), 1);

        view.invalidate();
        assert_eq!(*view.get(|| vec![4]), vec![4]);
        assert!(!view.is_dirty());
    }

    #[test]
    fn concurrent_readers() {
        let view = CachedView::new();
        let builds = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let rows = view.get(|| {
                        builds.fetch_add(1, Ordering::Relaxed);
                        (0..1000).collect::<Vec<u32>>()
                    });
                    assert_eq!(rows.len(), 1000);
                });
            }
        });
        assert_eq!(builds.load(Ordering::Relaxed), 1);

        let before = view.get(Vec::new);
        view.invalidate();
        let after = view.get(|| vec![7]);
        assert_eq!(before.len(), 1000);
        assert_eq!(*after, vec![7]);
    }
}
