//! Vector shapes loaded from tile files

use crate::{ProjectedRect, Result, TileError};
use geo::Coord;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kind of outline a shape describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ShapeKind {
    /// Closed ring with an implicit closing edge
    Polygon,
    /// Open path
    Polyline,
}

impl ShapeKind {
    /// Minimum number of points a valid shape of this kind needs
    pub fn min_points(self) -> usize {
        match self {
            ShapeKind::Polygon => 3,
            ShapeKind::Polyline => 2,
        }
    }
}

/// A polygon or polyline in projected coordinates
///
/// The bounding rectangle and the enclosed area are computed once at construction
/// and reused by every viewport query. Points are shared, so clones are cheap.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GeometryShape {
    kind: ShapeKind,
    points: Arc<[Coord<f64>]>,
    bounds: ProjectedRect,
    area: f64,
}

impl GeometryShape {
    /// Create a shape, validating the point count
    pub fn new(kind: ShapeKind, points: Vec<Coord<f64>>) -> Result<Self> {
        if points.len() < kind.min_points() {
            return Err(TileError::InvalidGeometry(format!(
                "{kind:?} needs at least {} points, got {}",
                kind.min_points(),
                points.len()
            )));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(TileError::InvalidGeometry(
                "non-finite coordinate".to_string(),
            ));
        }

        // Checked above: at least one point
        let bounds = ProjectedRect::bounding(&points)
            .ok_or_else(|| TileError::InvalidGeometry("empty point list".to_string()))?;
        let area = match kind {
            ShapeKind::Polygon => shoelace_area(&points),
            ShapeKind::Polyline => 0.0,
        };

        Ok(Self {
            kind,
            points: points.into(),
            bounds,
            area,
        })
    }

    /// Polygon from a ring; a trailing point equal to the first is dropped
    pub fn polygon(mut ring: Vec<Coord<f64>>) -> Result<Self> {
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        Self::new(ShapeKind::Polygon, ring)
    }

    pub fn polyline(points: Vec<Coord<f64>>) -> Result<Self> {
        Self::new(ShapeKind::Polyline, points)
    }

    #[inline]
    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    #[inline]
    pub fn points(&self) -> &[Coord<f64>] {
        &self.points
    }

    /// Cached bounding rectangle
    #[inline]
    pub fn bounds(&self) -> &ProjectedRect {
        &self.bounds
    }

    /// Cached enclosed area (always 0 for polylines)
    #[inline]
    pub fn area(&self) -> f64 {
        self.area
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.kind == ShapeKind::Polygon
    }
}

/// Absolute shoelace area over an implicitly closed ring
///
/// Exact for simple polygons; self-intersecting rings give a deterministic but
/// otherwise meaningless magnitude.
pub(crate) fn shoelace_area(points: &[Coord<f64>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    (sum * 0.5).abs()
}
