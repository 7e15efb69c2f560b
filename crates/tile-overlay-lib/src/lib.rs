//! Tile Overlay Library - Viewport-driven Tile Selection, Caching and Rasterization
//!
//! This library decides which pre-partitioned vector tiles are relevant for a map viewport,
//! loads and caches their geometry, ranks the visible shapes and strokes them into a single
//! raster covering the viewport. Presenting the results is left to an [`OverlaySink`].
//!
//! # Architecture
//!
//! - **[`TileCatalog`]**: Immutable list of tile files and their bounds
//! - **[`TileIndex`]**: Point and rectangle containment queries over the catalog
//! - **[`GeometryCache`]**: Memoized per-tile shape lists with optional LRU bound
//! - **[`TileLoadManager`]**: Reconciles the active overlay set against the needed tiles
//! - **[`select`]**: Intersects, ranks and truncates shapes to a render budget
//! - **[`Rasterizer`]**: Strokes shapes into an RGBA raster at bounded resolution
//! - **[`Debouncer`]**: Coalesces bursts of viewport changes
//! - **[`TileOverlayPipeline`]**: Foreground controller wiring everything together
//!
//! # Coordinate Conventions
//!
//! Projected coordinates are Web Mercator meters (or raw catalog units for projected
//! catalogs) with Y increasing northward. Rasters use image coordinates with Y increasing
//! downward; the [`Rasterizer`] performs the flip.

mod cache;
mod catalog;
mod debounce;
mod index;
mod loader;
mod manager;
mod pipeline;
mod raster;
mod rect;
mod selector;
mod shape;
pub mod utils;

// Public API exports
pub use cache::GeometryCache;
pub use catalog::{BoundsUnits, TileBounds, TileCatalog, TileRecord};
pub use debounce::Debouncer;
pub use index::TileIndex;
pub use loader::{GeoJsonLoader, GeometryLoader, parse_geojson_shapes};
pub use manager::{OverlayId, ReconcileOutcome, ReconcilePlan, TileLoadManager};
pub use pipeline::{
    OverlaySink, PipelineConfig, PipelineEvent, RenderOutcome, TileOverlayPipeline, TileSource,
};
pub use raster::{RasterImage, RasterStyle, Rasterizer};
pub use rect::ProjectedRect;
pub use selector::{AREA_TOLERANCE, select};
pub use shape::{GeometryShape, ShapeKind};

/// Error types for the tile overlay pipeline
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("Catalog parsing error: {0}")]
    CatalogParse(String),

    #[error("Invalid catalog record #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Failed to load geometry for tile {file}: {reason}")]
    GeometryLoad { file: String, reason: String },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TileError>;
