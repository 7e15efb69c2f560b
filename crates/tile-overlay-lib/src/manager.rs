//! Tile load/unload reconciliation
//!
//! The manager owns the active overlay set: every materialized shape gets a minted
//! [`OverlayId`] mapped to the tile file it came from. On each viewport change the set
//! of needed files is compared against the materialized and in-flight files; stale
//! overlays are removed at once and a bounded batch of new files is scheduled for
//! loading. Remaining files are picked up by later events.

use crate::{GeometryCache, GeometryLoader, GeometryShape};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Handle of a materialized overlay, unique for the lifetime of a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OverlayId(u64);

impl OverlayId {
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlay#{}", self.0)
    }
}

/// Work decided by a single reconciliation step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Overlays already dropped from the active set, with their tile file
    pub to_remove: Vec<(OverlayId, String)>,
    /// Files to load now (at most the batch capacity), marked in flight
    pub to_add: Vec<String>,
}

/// Result of a synchronous reconciliation
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub removed: Vec<(OverlayId, String)>,
    pub added: Vec<(OverlayId, String, GeometryShape)>,
}

/// Reconciles materialized tiles against the tiles a viewport needs
#[derive(Debug, Clone)]
pub struct TileLoadManager {
    /// Maximum number of new files scheduled per reconciliation
    batch_cap: usize,
    /// Next overlay handle to mint
    next_id: u64,
    /// Active overlay set: overlay handle to owning tile file
    overlays: BTreeMap<OverlayId, String>,
    /// Materialized files and their overlays (a tile without shapes still counts)
    files: BTreeMap<String, Vec<OverlayId>>,
    /// Files scheduled for loading whose result has not been applied yet
    in_flight: BTreeSet<String>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TileLoadManager {
    /// Create a manager scheduling at most `batch_cap` new files per event
    pub fn new(batch_cap: usize) -> Self {
        Self {
            batch_cap,
            next_id: 0,
            overlays: BTreeMap::new(),
            files: BTreeMap::new(),
            in_flight: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn batch_cap(&self) -> usize {
        self.batch_cap
    }

    /// Compute and apply the removal half of a reconciliation step
    ///
    /// Overlays of files no longer needed leave the active set immediately and are
    /// returned so the caller can detach them from the display. Pending loads of
    /// files no longer needed are cancelled. New files, in `needed` order, are marked
    /// in flight up to the batch capacity and returned for loading.
    pub fn plan(&mut self, needed: &[String]) -> ReconcilePlan {
        let needed_set: BTreeSet<&str> = needed.iter().map(String::as_str).collect();

        let stale_files: Vec<String> = self
            .files
            .keys()
            .filter(|f| !needed_set.contains(f.as_str()))
            .cloned()
            .collect();

        let mut to_remove = Vec::new();
        for file in stale_files {
            for id in self.files.remove(&file).unwrap_or_default() {
                self.overlays.remove(&id);
                to_remove.push((id, file.clone()));
            }
        }

        self.in_flight.retain(|f| needed_set.contains(f.as_str()));

        let mut to_add = Vec::new();
        for file in needed {
            if to_add.len() >= self.batch_cap {
                break;
            }
            if self.files.contains_key(file)
                || self.in_flight.contains(file)
                || to_add.contains(file)
            {
                continue;
            }
            to_add.push(file.clone());
        }
        self.in_flight.extend(to_add.iter().cloned());

        tracing::debug!(
            "Reconcile: {} needed, {} overlays removed, {} files scheduled, {} in flight",
            needed.len(),
            to_remove.len(),
            to_add.len(),
            self.in_flight.len()
        );

        ReconcilePlan { to_remove, to_add }
    }

    /// Register the shapes of a finished load
    ///
    /// Returns the newly minted overlays. Loads that were cancelled by a later plan,
    /// or files that are already materialized, register nothing.
    pub fn complete_load(
        &mut self,
        file_id: &str,
        shapes: &[GeometryShape],
    ) -> Vec<(OverlayId, GeometryShape)> {
        if !self.in_flight.remove(file_id) {
            tracing::debug!("Discarding load of {file_id}: no longer needed");
            return Vec::new();
        }
        if self.files.contains_key(file_id) {
            return Vec::new();
        }

        let mut ids = Vec::with_capacity(shapes.len());
        let mut added = Vec::with_capacity(shapes.len());
        for shape in shapes {
            let id = self.mint();
            self.overlays.insert(id, file_id.to_string());
            ids.push(id);
            added.push((id, shape.clone()));
        }
        self.files.insert(file_id.to_string(), ids);
        added
    }

    /// Run a full reconciliation step, loading scheduled files through the cache
    ///
    /// Blocks on every scheduled load; intended for synchronous callers and tests.
    pub fn reconcile<L>(
        &mut self,
        needed: &[String],
        cache: &GeometryCache,
        loader: &L,
    ) -> ReconcileOutcome
    where
        L: GeometryLoader + ?Sized,
    {
        let plan = self.plan(needed);
        let mut added = Vec::new();
        for file in plan.to_add {
            let shapes = cache.get_or_load(&file, loader);
            added.extend(
                self.complete_load(&file, &shapes)
                    .into_iter()
                    .map(|(id, shape)| (id, file.clone(), shape)),
            );
        }
        ReconcileOutcome {
            removed: plan.to_remove,
            added,
        }
    }

    /// Files currently materialized
    pub fn active_files(&self) -> BTreeSet<String> {
        self.files.keys().cloned().collect()
    }

    /// Files scheduled but not yet applied
    pub fn in_flight(&self) -> &BTreeSet<String> {
        &self.in_flight
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    /// Tile file owning an overlay
    pub fn file_of(&self, id: OverlayId) -> Option<&str> {
        self.overlays.get(&id).map(String::as_str)
    }

    /// Drop every overlay and pending load, returning the removed overlays
    pub fn clear(&mut self) -> Vec<(OverlayId, String)> {
        self.files.clear();
        self.in_flight.clear();
        std::mem::take(&mut self.overlays).into_iter().collect()
    }

    fn mint(&mut self) -> OverlayId {
        let id = OverlayId(self.next_id);
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Result, TileError};
    use geo::Coord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shape(offset: f64) -> GeometryShape {
        GeometryShape::polygon(vec![
            Coord { x: offset, y: 0.0 },
            Coord { x: offset + 1.0, y: 0.0 },
            Coord { x: offset + 1.0, y: 1.0 },
        ])
        .unwrap()
    }

    fn names(files: &[&str]) -> Vec<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    /// Two shapes per tile, except tiles named "empty*" which have none
    fn loader(file_id: &str) -> Result<Vec<GeometryShape>> {
        if file_id.starts_with("empty") {
            return Ok(Vec::new());
        }
        Ok(vec![shape(0.0), shape(2.0)])
    }

    #[test]
    fn test_reconcile_from_empty() {
        let mut manager = TileLoadManager::new(2);
        let cache = GeometryCache::unbounded();

        let outcome = manager.reconcile(&names(&["a", "b"]), &cache, &loader);
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.added.len(), 4);
        assert_eq!(manager.active_files(), BTreeSet::from(["a".into(), "b".into()]));
        assert_eq!(manager.overlay_count(), 4);
        assert!(manager.in_flight().is_empty());
    }

    #[test]
    fn test_batch_cap_and_convergence() {
        let mut manager = TileLoadManager::new(2);
        let cache = GeometryCache::unbounded();
        let needed = names(&["a", "b", "c", "d", "e"]);

        manager.reconcile(&needed, &cache, &loader);
        assert_eq!(manager.active_files().len(), 2);

        manager.reconcile(&needed, &cache, &loader);
        assert_eq!(manager.active_files().len(), 4);

        // ceil(5 / 2) = 3 stationary events to converge
        manager.reconcile(&needed, &cache, &loader);
        let expected: BTreeSet<String> = needed.iter().cloned().collect();
        assert_eq!(manager.active_files(), expected);
    }

    #[test]
    fn test_removes_tiles_no_longer_needed() {
        let mut manager = TileLoadManager::new(2);
        let cache = GeometryCache::unbounded();

        manager.reconcile(&names(&["a", "b"]), &cache, &loader);
        let outcome = manager.reconcile(&names(&["b", "c"]), &cache, &loader);

        let removed_files: BTreeSet<&str> =
            outcome.removed.iter().map(|(_, f)| f.as_str()).collect();
        assert_eq!(removed_files, BTreeSet::from(["a"]));
        assert_eq!(outcome.removed.len(), 2);
        for (id, _) in &outcome.removed {
            assert!(manager.file_of(*id).is_none());
        }
        assert_eq!(manager.active_files(), BTreeSet::from(["b".into(), "c".into()]));
    }

    #[test]
    fn test_never_double_loads() {
        let mut manager = TileLoadManager::new(2);
        let calls = AtomicUsize::new(0);
        let counting = |file_id: &str| -> Result<Vec<GeometryShape>> {
            calls.fetch_add(1, Ordering::SeqCst);
            loader(file_id)
        };
        // A fresh cache per event so only the manager can prevent reloads
        manager.reconcile(&names(&["a"]), &GeometryCache::unbounded(), &counting);
        manager.reconcile(&names(&["a"]), &GeometryCache::unbounded(), &counting);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // In-flight files are not scheduled twice
        let plan = manager.plan(&names(&["a", "b"]));
        assert_eq!(plan.to_add, names(&["b"]));
        let plan = manager.plan(&names(&["a", "b"]));
        assert!(plan.to_add.is_empty());
    }

    #[test]
    fn test_empty_tiles_do_not_hog_the_batch() {
        let mut manager = TileLoadManager::new(2);
        let cache = GeometryCache::unbounded();
        let needed = names(&["empty1", "empty2", "a"]);

        manager.reconcile(&needed, &cache, &loader);
        let outcome = manager.reconcile(&needed, &cache, &loader);
        assert_eq!(outcome.added.len(), 2);
        assert!(manager.active_files().contains("a"));
    }

    #[test]
    fn test_cancelled_load_is_discarded() {
        let mut manager = TileLoadManager::new(2);
        let plan = manager.plan(&names(&["a"]));
        assert_eq!(plan.to_add, names(&["a"]));

        // Viewport moved away before the load finished
        manager.plan(&names(&["b"]));
        assert!(!manager.in_flight().contains("a"));

        let added = manager.complete_load("a", &[shape(0.0)]);
        assert!(added.is_empty());
        assert!(!manager.active_files().contains("a"));
    }

    #[test]
    fn test_reconciliation_property() {
        // After reconcile, active = needed members already loaded plus up to
        // batch_cap new ones; nothing outside needed survives.
        let mut manager = TileLoadManager::new(2);
        let cache = GeometryCache::unbounded();
        manager.reconcile(&names(&["a", "b", "c"]), &cache, &loader);
        manager.reconcile(&names(&["a", "b", "c"]), &cache, &loader);
        let before = manager.active_files();

        let needed = names(&["b", "c", "x", "y", "z"]);
        manager.reconcile(&needed, &cache, &loader);
        let after = manager.active_files();

        let needed_set: BTreeSet<String> = needed.iter().cloned().collect();
        assert!(after.is_subset(&needed_set));
        assert!(!after.contains("a"));
        let kept: BTreeSet<String> = before.intersection(&needed_set).cloned().collect();
        assert!(kept.is_subset(&after));
        assert_eq!(after.len(), kept.len() + 2);
    }

    #[test]
    fn test_failing_tile_is_isolated() {
        let mut manager = TileLoadManager::new(2);
        let cache = GeometryCache::unbounded();
        let flaky = |file_id: &str| -> Result<Vec<GeometryShape>> {
            if file_id == "bad" {
                return Err(TileError::GeometryLoad {
                    file: file_id.to_string(),
                    reason: "corrupt".to_string(),
                });
            }
            loader(file_id)
        };

        let outcome = manager.reconcile(&names(&["bad", "a"]), &cache, &flaky);
        assert_eq!(outcome.added.len(), 2);
        assert!(manager.active_files().contains("a"));
        assert!(manager.active_files().contains("bad"));
    }

    #[test]
    fn test_overlay_ids_are_unique() {
        let mut manager = TileLoadManager::new(4);
        let cache = GeometryCache::unbounded();
        let first = manager.reconcile(&names(&["a"]), &cache, &loader);
        manager.reconcile(&names(&[]), &cache, &loader);
        let second = manager.reconcile(&names(&["a"]), &cache, &loader);

        let first_ids: BTreeSet<OverlayId> = first.added.iter().map(|(id, _, _)| *id).collect();
        let second_ids: BTreeSet<OverlayId> = second.added.iter().map(|(id, _, _)| *id).collect();
        assert!(first_ids.is_disjoint(&second_ids));
    }

    #[test]
    fn test_clear() {
        let mut manager = TileLoadManager::new(2);
        manager.reconcile(&names(&["a"]), &GeometryCache::unbounded(), &loader);
        let removed = manager.clear();
        assert_eq!(removed.len(), 2);
        assert_eq!(manager.overlay_count(), 0);
        assert!(manager.active_files().is_empty());
    }
}
