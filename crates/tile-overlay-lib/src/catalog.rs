//! Tile catalog loading
//!
//! A catalog is a JSON array of `{ "file": "<name>", "bounds": [minX, minY, maxX, maxY] }`
//! records. Bounds are min-then-max on each axis, either in WGS84 degrees
//! (`[minLon, minLat, maxLon, maxLat]`) or already in projected units.

use crate::{ProjectedRect, Result, TileError, utils};
use geo::{Coord, Point};
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;
use std::path::Path;

/// Units of the catalog bounds and of the tile geometry coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BoundsUnits {
    /// WGS84 longitude/latitude, projected through Web Mercator
    #[default]
    Degrees,
    /// Already projected; used as-is
    Projected,
}

impl BoundsUnits {
    /// Map a coordinate in these units onto the projected plane
    #[inline]
    pub fn project(self, coord: Coord<f64>) -> Coord<f64> {
        match self {
            BoundsUnits::Degrees => utils::project_lon_lat(coord),
            BoundsUnits::Projected => coord,
        }
    }

    /// Map a projected coordinate back into these units
    #[inline]
    pub fn unproject(self, coord: Coord<f64>) -> Coord<f64> {
        match self {
            BoundsUnits::Degrees => {
                let (lat, lon) = utils::mercator_to_wgs84(coord.x, coord.y);
                Coord { x: lon, y: lat }
            }
            BoundsUnits::Projected => coord,
        }
    }
}

/// Bounding box of a tile in catalog units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl TileBounds {
    /// Boundary-inclusive point containment
    #[inline]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Projected rectangle covering these bounds
    pub fn project(&self, units: BoundsUnits) -> ProjectedRect {
        match units {
            BoundsUnits::Degrees => {
                utils::project_degree_bounds(self.min_x, self.min_y, self.max_x, self.max_y)
            }
            BoundsUnits::Projected => ProjectedRect::new(
                self.min_x,
                self.min_y,
                self.max_x - self.min_x,
                self.max_y - self.min_y,
            ),
        }
    }
}

/// Metadata of a single tile file
#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    /// File name relative to the tile folder
    pub file_id: String,
    /// Bounds in catalog units
    pub bounds: TileBounds,
    /// Bounds on the projected plane (computed once at load time)
    pub projected: ProjectedRect,
}

/// Wire format of a catalog entry
#[derive(Deserialize)]
struct RawTileMeta {
    file: String,
    bounds: Vec<f64>,
}

/// Ordered, read-only collection of tile records
#[derive(Debug, Clone)]
pub struct TileCatalog {
    records: Vec<TileRecord>,
    units: BoundsUnits,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TileCatalog {
    /// Load a catalog document from disk
    pub fn load(path: impl AsRef<Path>, units: BoundsUnits) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&json, units)?;
        tracing::info!(
            "Loaded {} tiles from catalog {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parse a catalog document
    ///
    /// Fails only when the document is not a JSON array. Malformed records are
    /// dropped with a warning and loading continues with the rest.
    pub fn from_json_str(json: &str, units: BoundsUnits) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let entries = match value {
            serde_json::Value::Array(entries) => entries,
            other => {
                return Err(TileError::CatalogParse(format!(
                    "expected an array of tile records, found {}",
                    json_kind(&other)
                )));
            }
        };

        let records = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match parse_record(index, entry, units) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!("Dropping catalog record: {err}");
                    None
                }
            })
            .collect();

        Ok(Self { records, units })
    }

    /// Build a catalog from already validated records
    pub fn from_records(records: Vec<TileRecord>, units: BoundsUnits) -> Self {
        Self { records, units }
    }

    #[inline]
    pub fn records(&self) -> &[TileRecord] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn units(&self) -> BoundsUnits {
        self.units
    }

    /// Find a record by file name
    pub fn get(&self, file_id: &str) -> Option<&TileRecord> {
        self.records.iter().find(|r| r.file_id == file_id)
    }

    /// Projected extent covering every tile, `None` for an empty catalog
    pub fn extent(&self) -> Option<ProjectedRect> {
        self.records
            .iter()
            .map(|r| r.projected)
            .reduce(|acc, r| acc.union(&r))
    }
}

fn parse_record(index: usize, entry: serde_json::Value, units: BoundsUnits) -> Result<TileRecord> {
    let raw: RawTileMeta = serde_json::from_value(entry).map_err(|e| TileError::InvalidRecord {
        index,
        reason: e.to_string(),
    })?;

    let invalid = |reason: String| TileError::InvalidRecord { index, reason };

    let [min_x, min_y, max_x, max_y] = raw.bounds[..] else {
        return Err(invalid(format!(
            "{}: expected 4 bound values, found {}",
            raw.file,
            raw.bounds.len()
        )));
    };
    if raw.file.is_empty() {
        return Err(invalid("empty file name".to_string()));
    }
    if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
        return Err(invalid(format!("{}: non-finite bounds", raw.file)));
    }
    if min_x > max_x || min_y > max_y {
        return Err(invalid(format!(
            "{}: bounds are not min-then-max ({min_x}, {min_y}, {max_x}, {max_y})",
            raw.file
        )));
    }

    let bounds = TileBounds {
        min_x,
        min_y,
        max_x,
        max_y,
    };
    let projected = bounds.project(units);
    if units == BoundsUnits::Degrees {
        let corners = [
            Point::new(projected.origin_x(), projected.origin_y()),
            Point::new(projected.max_x(), projected.max_y()),
        ];
        if !corners.iter().all(utils::is_valid_mercator) {
            return Err(invalid(format!(
                "{}: bounds fall outside the Web Mercator plane ({min_x}, {max_x})",
                raw.file
            )));
        }
    }
    Ok(TileRecord {
        file_id: raw.file,
        projected,
        bounds,
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
