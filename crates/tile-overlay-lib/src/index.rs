//! Containment queries over the tile catalog
//!
//! Catalogs hold tens to low hundreds of tiles, so both queries are a linear scan with
//! the containment predicate. Results are always the complete matching set, in
//! catalog order.

use crate::{ProjectedRect, TileCatalog, TileRecord};

/// Spatial filter over an immutable [`TileCatalog`]
#[derive(Debug, Clone, Copy)]
pub struct TileIndex<'a> {
    catalog: &'a TileCatalog,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> TileIndex<'a> {
    pub fn new(catalog: &'a TileCatalog) -> Self {
        Self { catalog }
    }

    /// Every record whose native bounds contain the point (boundary-inclusive)
    ///
    /// The point is expressed in catalog units: `(lon, lat)` for degree catalogs.
    /// Overlapping tiles all match.
    pub fn find_by_point(&self, x: f64, y: f64) -> Vec<&'a TileRecord> {
        self.catalog
            .records()
            .iter()
            .filter(|r| r.bounds.contains_point(x, y))
            .collect()
    }

    /// Every record whose projected bounds intersect the query rectangle
    ///
    /// Touching edges count as intersecting.
    pub fn find_by_rect(&self, rect: &ProjectedRect) -> Vec<&'a TileRecord> {
        self.catalog
            .records()
            .iter()
            .filter(|r| r.projected.intersects(rect))
            .collect()
    }
}
