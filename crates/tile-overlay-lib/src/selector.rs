//! Visible-geometry selection and ranking

use crate::{GeometryShape, ProjectedRect, utils};
use geo::Coord;

/// Absolute area difference below which two shapes are considered equally large
pub const AREA_TOLERANCE: f64 = 1e-6;

/// Put candidates in render order
///
/// Larger areas come first. Shapes whose areas lie within [`AREA_TOLERANCE`] of
/// the largest remaining area form a tie group, ordered by the distance from their
/// bounds center to `center`, closest first. Both passes are stable sorts over
/// `total_cmp`, so equal keys keep their input order.
fn rank(candidates: &mut [&GeometryShape], center: Coord<f64>) {
    candidates.sort_by(|a, b| b.area().total_cmp(&a.area()));

    let mut start = 0;
    while start < candidates.len() {
        let anchor = candidates[start].area();
        let len = candidates[start..]
            .iter()
            .position(|s| anchor - s.area() > AREA_TOLERANCE)
            .unwrap_or(candidates.len() - start);
        let end = start + len.max(1);

        candidates[start..end].sort_by(|a, b| {
            let da = utils::distance(a.bounds().center(), center);
            let db = utils::distance(b.bounds().center(), center);
            da.total_cmp(&db)
        });
        start = end;
    }
}

/// Pick the shapes worth rendering for a viewport
///
/// Keeps shapes whose bounds intersect `viewport`, ranks them largest first with
/// near-equal areas ordered by distance to `center`, and truncates to `max_count`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn select<'a, I>(
    viewport: &ProjectedRect,
    shapes: I,
    center: Coord<f64>,
    max_count: usize,
) -> Vec<GeometryShape>
where
    I: IntoIterator<Item = &'a GeometryShape>,
{
    let mut candidates: Vec<&GeometryShape> = shapes
        .into_iter()
        .filter(|s| s.bounds().intersects(viewport))
        .collect();

    rank(&mut candidates, center);
    candidates.truncate(max_count);

    tracing::trace!("Selected {} shapes for rendering", candidates.len());
    candidates.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> GeometryShape {
        GeometryShape::polygon(vec![
            Coord { x, y },
            Coord { x: x + size, y },
            Coord {
                x: x + size,
                y: y + size,
            },
            Coord { x, y: y + size },
        ])
        .unwrap()
    }

    fn line(x: f64, y: f64) -> GeometryShape {
        GeometryShape::polyline(vec![Coord { x, y }, Coord { x: x + 1.0, y }]).unwrap()
    }

    #[test]
    fn test_larger_area_first() {
        let viewport = ProjectedRect::new(-100.0, -100.0, 200.0, 200.0);
        let shapes = [square(0.0, 0.0, 5.0), square(0.0, 0.0, 10.0), line(0.0, 0.0)];
        let selected = select(&viewport, &shapes, Coord { x: 0.0, y: 0.0 }, 10);

        let areas: Vec<f64> = selected.iter().map(|s| s.area()).collect();
        assert_eq!(areas, vec![100.0, 25.0, 0.0]);
    }

    #[test]
    fn test_ties_broken_by_distance() {
        let viewport = ProjectedRect::new(-100.0, -100.0, 200.0, 200.0);
        let far = square(50.0, 50.0, 2.0);
        let near = square(1.0, 1.0, 2.0);
        let center = Coord { x: 0.0, y: 0.0 };

        let selected = select(&viewport, [&far, &near], center, 10);
        assert_eq!(selected, vec![near.clone(), far.clone()]);

        // Areas within the tolerance are still tied
        let nudged = GeometryShape::polygon(vec![
            Coord { x: 60.0, y: 60.0 },
            Coord {
                x: 62.0 + 1e-8,
                y: 60.0,
            },
            Coord { x: 62.0, y: 62.0 },
            Coord { x: 60.0, y: 62.0 },
        ])
        .unwrap();
        let selected = select(&viewport, [&nudged, &near], center, 10);
        assert_eq!(selected, vec![near, nudged]);
    }

    #[test]
    fn test_filters_and_truncates() {
        let viewport = ProjectedRect::new(0.0, 0.0, 10.0, 10.0);
        let shapes = [
            square(1.0, 1.0, 1.0),
            square(2.0, 2.0, 3.0),
            square(100.0, 100.0, 50.0),
            // Touches the viewport corner
            square(-2.0, -2.0, 2.0),
        ];
        let selected = select(&viewport, &shapes, viewport.center(), 2);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].area(), 9.0);
        assert_eq!(selected[1].area(), 4.0);

        let none = select(&viewport, &shapes[2..3], viewport.center(), 200);
        assert!(none.is_empty());
    }

    #[test]
    fn test_near_tie_chain() {
        // Neighbours are within the tolerance but the ends of the chain are not
        let shapes: Vec<GeometryShape> = (0..200)
            .map(|i| {
                let x = ((i * 7919) % 200) as f64 * 3.0 - 300.0;
                let height = 5.0 + i as f64 * 0.3e-6;
                GeometryShape::polygon(vec![
                    Coord { x, y: 0.0 },
                    Coord { x: x + 4.0, y: 0.0 },
                    Coord { x, y: height },
                ])
                .unwrap()
            })
            .collect();
        let viewport = ProjectedRect::new(-1000.0, -1000.0, 2000.0, 2000.0);
        let center = Coord { x: 0.0, y: 0.0 };

        let selected = select(&viewport, &shapes, center, usize::MAX);
        assert_eq!(selected.len(), shapes.len());
        for pair in selected.windows(2) {
            assert!(pair[1].area() - pair[0].area() <= AREA_TOLERANCE);
        }

        // The largest area anchors a group with its immediate neighbour only
        let distance = |s: &GeometryShape| utils::distance(s.bounds().center(), center);
        let top: Vec<f64> = selected[..2].iter().map(|s| s.area()).collect();
        assert!(top.contains(&shapes[199].area()));
        assert!(top.contains(&shapes[198].area()));
        assert!(distance(&selected[0]) <= distance(&selected[1]));

        assert_eq!(select(&viewport, &shapes, center, 50), selected[..50].to_vec());
    }
}
