//! Axis-aligned rectangles on the projected map plane

use geo::{Coord, Rect};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in projected map-plane coordinates
///
/// Stored as origin (minimum corner) plus a non-negative size. All predicates are
/// closed: rectangles that only touch along an edge or corner intersect.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProjectedRect {
    origin_x: f64,
    origin_y: f64,
    width: f64,
    height: f64,
}

impl ProjectedRect {
    /// Create a rectangle from origin and size
    ///
    /// Negative sizes are normalized by moving the origin, so the stored width and
    /// height are always non-negative.
    pub fn new(origin_x: f64, origin_y: f64, width: f64, height: f64) -> Self {
        let (origin_x, width) = if width < 0.0 {
            (origin_x + width, -width)
        } else {
            (origin_x, width)
        };
        let (origin_y, height) = if height < 0.0 {
            (origin_y + height, -height)
        } else {
            (origin_y, height)
        };
        Self {
            origin_x,
            origin_y,
            width,
            height,
        }
    }

    /// Create a rectangle spanning two arbitrary corners
    pub fn from_corners(a: Coord<f64>, b: Coord<f64>) -> Self {
        let min_x = a.x.min(b.x);
        let min_y = a.y.min(b.y);
        Self::new(
            min_x,
            min_y,
            a.x.max(b.x) - min_x,
            a.y.max(b.y) - min_y,
        )
    }

    /// Bounding rectangle of a point sequence, `None` when empty
    pub fn bounding(points: &[Coord<f64>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    #[inline]
    pub fn origin_x(&self) -> f64 {
        self.origin_x
    }

    #[inline]
    pub fn origin_y(&self) -> f64 {
        self.origin_y
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.height
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.origin_x + self.width
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.origin_y + self.height
    }

    /// Midpoint of the rectangle
    #[inline]
    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: self.origin_x + self.width / 2.0,
            y: self.origin_y + self.height / 2.0,
        }
    }

    /// True if the rectangles overlap or touch
    ///
    /// Two rectangles are disjoint only when one lies entirely to one side of the
    /// other on some axis.
    #[inline]
    pub fn intersects(&self, other: &ProjectedRect) -> bool {
        !(other.max_x() < self.origin_x
            || other.origin_x > self.max_x()
            || other.max_y() < self.origin_y
            || other.origin_y > self.max_y())
    }

    /// True if `other` lies entirely inside this rectangle (edges inclusive)
    #[inline]
    pub fn contains(&self, other: &ProjectedRect) -> bool {
        self.origin_x <= other.origin_x
            && self.origin_y <= other.origin_y
            && self.max_x() >= other.max_x()
            && self.max_y() >= other.max_y()
    }

    /// True if the point lies inside or on the boundary
    #[inline]
    pub fn contains_point(&self, point: Coord<f64>) -> bool {
        point.x >= self.origin_x
            && point.x <= self.max_x()
            && point.y >= self.origin_y
            && point.y <= self.max_y()
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &ProjectedRect) -> ProjectedRect {
        let min_x = self.origin_x.min(other.origin_x);
        let min_y = self.origin_y.min(other.origin_y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        ProjectedRect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Length of the longer side
    #[inline]
    pub fn max_span(&self) -> f64 {
        self.width.max(self.height)
    }
}

impl From<Rect<f64>> for ProjectedRect {
    fn from(rect: Rect<f64>) -> Self {
        ProjectedRect::from_corners(rect.min(), rect.max())
    }
}

impl From<ProjectedRect> for Rect<f64> {
    fn from(rect: ProjectedRect) -> Self {
        Rect::new(
            Coord {
                x: rect.origin_x,
                y: rect.origin_y,
            },
            Coord {
                x: rect.max_x(),
                y: rect.max_y(),
            },
        )
    }
}
