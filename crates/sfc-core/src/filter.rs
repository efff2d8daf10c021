//! Bounded membership filter for name deduplication.
//!
//! Plugins collect large candidate lists and the dispatcher must not
//! re-emit events for names it has already seen. The filter keeps the
//! most recently inserted names up to a fixed capacity, so memory stays
//! bounded over long sessions while recent duplicates are still caught.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Bounded, recency-keeping membership filter for FQDNs.
pub struct FqdnFilter {
    inner: Mutex<LruCache<String, ()>>,
}

impl FqdnFilter {
    /// Creates a filter bounded at `capacity` names.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Inserts a name, returning true if it was not already present.
    pub fn insert(&self, name: &str) -> bool {
        let mut inner = self.inner.lock().expect("filter lock");
        if inner.contains(name) {
            inner.promote(name);
            return false;
        }
        inner.put(name.to_string(), ());
        true
    }

    /// Returns true if the name has been inserted and not yet evicted.
    pub fn has(&self, name: &str) -> bool {
        self.inner.lock().expect("filter lock").contains(name)
    }

    /// Shrinks the filter to the `keep` most recently inserted names.
    pub fn prune(&self, keep: usize) {
        let mut inner = self.inner.lock().expect("filter lock");
        while inner.len() > keep {
            inner.pop_lru();
        }
    }

    /// Returns the retained names, oldest first.
    pub fn to_vec(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("filter lock");
        let mut names: Vec<String> = inner.iter().map(|(k, _)| k.clone()).collect();
        names.reverse();
        names
    }

    /// Number of names currently retained.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("filter lock").len()
    }

    /// Returns true if no names are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
