//! Coordinate conversions between WGS84 degrees and the projected map plane

use crate::ProjectedRect;
use geo::{Coord, Point};

/// Web Mercator bounds in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;
pub const EARTH_MERCATOR_MIN: f64 = -20037508.34;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Precomputed constant: EARTH_MERCATOR_MAX / 180.0
const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / PI
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / std::f64::consts::PI;

/// Precomputed constant: 180.0 / EARTH_MERCATOR_MAX
const X_TO_LON_FACTOR: f64 = 180.0 / EARTH_MERCATOR_MAX;

/// Precomputed constant: PI / EARTH_MERCATOR_MAX
const Y_TO_LAT_FACTOR: f64 = std::f64::consts::PI / EARTH_MERCATOR_MAX;

/// Convert WGS84 (lat, lon) to Web Mercator (x, y) in meters
///
/// Latitude is clamped to the representable Web Mercator range. Y grows northward.
#[inline(always)]
pub fn wgs84_to_mercator(lat: f64, lon: f64) -> Point<f64> {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);

    let x = lon * LON_TO_X_FACTOR;
    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR;

    Point::new(x, y)
}

/// Convert Web Mercator (x, y) in meters to WGS84, returned as `(lat, lon)` degrees
#[inline(always)]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x * X_TO_LON_FACTOR;
    let lat =
        (std::f64::consts::PI / 2.0 - 2.0 * ((-y * Y_TO_LAT_FACTOR).exp()).atan()).to_degrees();
    (lat, lon)
}

/// Project a GeoJSON-ordered `(lon, lat)` coordinate onto the map plane
#[inline]
pub fn project_lon_lat(coord: Coord<f64>) -> Coord<f64> {
    wgs84_to_mercator(coord.y, coord.x).into()
}

/// Project a degree bounding box `(min_lon, min_lat, max_lon, max_lat)` onto the map plane
pub fn project_degree_bounds(
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
) -> ProjectedRect {
    let min = wgs84_to_mercator(min_lat, min_lon);
    let max = wgs84_to_mercator(max_lat, max_lon);
    ProjectedRect::from_corners(min.into(), max.into())
}

/// Check if a point is within Web Mercator bounds
#[inline(always)]
pub fn is_valid_mercator(point: &Point<f64>) -> bool {
    let x = point.x();
    let y = point.y();
    x >= EARTH_MERCATOR_MIN
        && x <= EARTH_MERCATOR_MAX
        && y >= EARTH_MERCATOR_MIN
        && y <= EARTH_MERCATOR_MAX
}

/// Euclidean distance between two plane coordinates
#[inline]
pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wgs84_to_mercator_origin() {
        let point = wgs84_to_mercator(0.0, 0.0);
        assert!((point.x() - 0.0).abs() < 0.01);
        assert!((point.y() - 0.0).abs() < 0.01);
    }

    #[test]
    fn test_wgs84_to_mercator_bounds() {
        let west = wgs84_to_mercator(0.0, -180.0);
        assert!((west.x() - EARTH_MERCATOR_MIN).abs() < 1.0);

        let east = wgs84_to_mercator(0.0, 180.0);
        assert!((east.x() - EARTH_MERCATOR_MAX).abs() < 1.0);
    }

    #[test]
    fn test_mercator_to_wgs84_roundtrip() {
        let lat = 61.1;
        let lon = -149.8;

        let mercator = wgs84_to_mercator(lat, lon);
        let (lat2, lon2) = mercator_to_wgs84(mercator.x(), mercator.y());

        assert!((lat - lat2).abs() < 0.0001);
        assert!((lon - lon2).abs() < 0.0001);
    }

    #[test]
    fn test_northward_y() {
        let south = wgs84_to_mercator(60.0, -150.0);
        let north = wgs84_to_mercator(62.0, -150.0);
        assert!(north.y() > south.y());
    }

    #[test]
    fn test_project_lon_lat_uses_geojson_order() {
        let projected = project_lon_lat(Coord { x: -73.7, y: 40.68 });
        let expected = wgs84_to_mercator(40.68, -73.7);
        assert_eq!(projected, Coord::from(expected));
    }

    #[test]
    fn test_project_degree_bounds() {
        let rect = project_degree_bounds(-150.0, 60.0, -148.0, 62.0);
        assert!(rect.width() > 0.0);
        assert!(rect.height() > 0.0);
        assert!(is_valid_mercator(&Point::new(rect.origin_x(), rect.origin_y())));
    }

    #[test]
    fn test_is_valid_mercator() {
        assert!(is_valid_mercator(&Point::new(0.0, 0.0)));
        assert!(!is_valid_mercator(&Point::new(EARTH_MERCATOR_MAX + 1.0, 0.0)));
    }

    #[test]
    fn test_distance() {
        let d = distance(Coord { x: 0.0, y: 0.0 }, Coord { x: 3.0, y: 4.0 });
        assert!((d - 5.0).abs() < 1e-12);
    }
}
