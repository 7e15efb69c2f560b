//! Per-tile geometry cache
//!
//! Parsed shapes are memoized by tile file name so repeated viewport queries never
//! re-read a tile. The cache is unbounded by default; an optional capacity turns it
//! into an LRU keyed by tile.

use crate::{GeometryLoader, GeometryShape};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

type Shapes = Arc<[GeometryShape]>;

/// Shared, thread-safe cache of tile geometry
///
/// Entries are written whole (replace-on-reload), so readers never observe a
/// partially populated shape list. Failed loads are cached as empty lists so a broken
/// tile file is read at most once per session.
pub struct GeometryCache {
    entries: Mutex<LruCache<String, Shapes>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeometryCache {
    /// Create a cache, bounded to `capacity` tiles when given
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        let entries = match capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Create a cache that never evicts
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Return the cached shapes for `file_id`, loading them on a miss
    ///
    /// This blocks the calling thread for the duration of the load; call it from a
    /// worker thread or use [`GeometryCache::get`] from latency-sensitive contexts.
    /// The lock is not held while loading, so misses on different tiles proceed in
    /// parallel. Concurrent misses on the same tile may both load, but only the first
    /// stored result is ever returned.
    pub fn get_or_load<L>(&self, file_id: &str, loader: &L) -> Shapes
    where
        L: GeometryLoader + ?Sized,
    {
        if let Some(shapes) = self.get(file_id) {
            return shapes;
        }

        let loaded: Shapes = match loader.load(file_id) {
            Ok(shapes) => {
                tracing::debug!("Loaded {} shapes from tile {file_id}", shapes.len());
                shapes.into()
            }
            Err(e) => {
                tracing::warn!("{e}");
                Vec::new().into()
            }
        };

        let mut entries = self.lock();
        if let Some(existing) = entries.get(file_id) {
            return existing.clone();
        }
        entries.put(file_id.to_string(), loaded.clone());
        loaded
    }

    /// Cached shapes for `file_id`, never loading
    pub fn get(&self, file_id: &str) -> Option<Shapes> {
        self.lock().get(file_id).cloned()
    }

    /// Store (or replace) the shapes of a tile
    pub fn insert(&self, file_id: impl Into<String>, shapes: Vec<GeometryShape>) {
        self.lock().put(file_id.into(), shapes.into());
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.lock().contains(file_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Lock the entries, recovering from a poisoned mutex
    ///
    /// Entries are only ever replaced whole, so a panic while holding the lock cannot
    /// leave a partially written value behind.
    fn lock(&self) -> MutexGuard<'_, LruCache<String, Shapes>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Geometry cache mutex poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for GeometryCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl std::fmt::Debug for GeometryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryCache")
            .field("len", &self.len())
            .finish()
    }
}
