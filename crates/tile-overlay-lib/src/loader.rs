//! Geometry loading from GeoJSON tile files
//!
//! Each tile file is a GeoJSON document (usually a `FeatureCollection`). Polygons
//! contribute their exterior ring, line strings become polylines; every other geometry
//! type is ignored.

use crate::{BoundsUnits, GeometryShape, Result, TileError};
use geo::Coord;
use geojson::{GeoJson, Geometry, Value};
use std::path::{Path, PathBuf};

/// Source of tile geometry, invoked on cache misses
///
/// Implementations must be callable from background worker threads.
pub trait GeometryLoader: Send + Sync {
    /// Load every shape stored under `file_id`
    fn load(&self, file_id: &str) -> Result<Vec<GeometryShape>>;
}

impl<F> GeometryLoader for F
where
    F: Fn(&str) -> Result<Vec<GeometryShape>> + Send + Sync,
{
    fn load(&self, file_id: &str) -> Result<Vec<GeometryShape>> {
        self(file_id)
    }
}

/// Loads tile files from a folder on disk
#[derive(Debug, Clone)]
pub struct GeoJsonLoader {
    folder: PathBuf,
    units: BoundsUnits,
}

impl GeoJsonLoader {
    pub fn new(folder: impl Into<PathBuf>, units: BoundsUnits) -> Self {
        Self {
            folder: folder.into(),
            units,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeometryLoader for GeoJsonLoader {
    fn load(&self, file_id: &str) -> Result<Vec<GeometryShape>> {
        let path = self.folder.join(file_id);
        let json = std::fs::read_to_string(&path).map_err(|e| TileError::GeometryLoad {
            file: file_id.to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;
        parse_geojson_shapes(&json, self.units).map_err(|e| TileError::GeometryLoad {
            file: file_id.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Decode a GeoJSON document into projected shapes
///
/// Degenerate rings and lines (too few points) are skipped rather than failing the
/// whole document.
pub fn parse_geojson_shapes(json: &str, units: BoundsUnits) -> Result<Vec<GeometryShape>> {
    let geojson: GeoJson = json.parse()?;
    let mut shapes = Vec::new();

    match geojson {
        GeoJson::FeatureCollection(collection) => {
            for feature in collection.features {
                if let Some(geometry) = feature.geometry {
                    collect_shapes(&geometry, units, &mut shapes);
                }
            }
        }
        GeoJson::Feature(feature) => {
            if let Some(geometry) = feature.geometry {
                collect_shapes(&geometry, units, &mut shapes);
            }
        }
        GeoJson::Geometry(geometry) => collect_shapes(&geometry, units, &mut shapes),
    }

    Ok(shapes)
}

fn collect_shapes(geometry: &Geometry, units: BoundsUnits, out: &mut Vec<GeometryShape>) {
    match &geometry.value {
        Value::Polygon(rings) => push_polygon(rings, units, out),
        Value::MultiPolygon(polygons) => {
            for rings in polygons {
                push_polygon(rings, units, out);
            }
        }
        Value::LineString(line) => push_polyline(line, units, out),
        Value::MultiLineString(lines) => {
            for line in lines {
                push_polyline(line, units, out);
            }
        }
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_shapes(geometry, units, out);
            }
        }
        Value::Point(_) | Value::MultiPoint(_) => {}
    }
}

fn push_polygon(rings: &[Vec<Vec<f64>>], units: BoundsUnits, out: &mut Vec<GeometryShape>) {
    let Some(exterior) = rings.first() else {
        return;
    };
    match GeometryShape::polygon(project_positions(exterior, units)) {
        Ok(shape) => out.push(shape),
        Err(e) => tracing::debug!("Skipping polygon: {e}"),
    }
}

fn push_polyline(line: &[Vec<f64>], units: BoundsUnits, out: &mut Vec<GeometryShape>) {
    match GeometryShape::polyline(project_positions(line, units)) {
        Ok(shape) => out.push(shape),
        Err(e) => tracing::debug!("Skipping polyline: {e}"),
    }
}

/// Project `[x, y, ...]` positions, dropping positions with fewer than two values
fn project_positions(positions: &[Vec<f64>], units: BoundsUnits) -> Vec<Coord<f64>> {
    positions
        .iter()
        .filter_map(|p| match p[..] {
            [x, y, ..] => Some(units.project(Coord { x, y })),
            _ => None,
        })
        .collect()
}
