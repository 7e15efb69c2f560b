//! End-to-end runs over a tile folder on disk

use geo::Coord;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tile_overlay_lib::{
    BoundsUnits, GeometryShape, OverlayId, OverlaySink, PipelineConfig, ProjectedRect,
    RasterImage, RenderOutcome, TileOverlayPipeline, TileSource, utils,
};

const CATALOG: &str = r#"[
    {"file": "downtown.geojson", "bounds": [-149.95, 61.19, -149.85, 61.23]},
    {"file": "midtown.geojson", "bounds": [-149.90, 61.17, -149.80, 61.20]},
    {"file": "broken.geojson", "bounds": [-149.95, 61.10, -149.85, 61.15]},
    {"file": "bad-record.geojson", "bounds": [-149.80, 61.20, -149.90, 61.25]},
    {"file": "short.geojson", "bounds": [1, 2, 3]}
]"#;

const DOWNTOWN: &str = r#"{"type": "FeatureCollection", "features": [
    {"type": "Feature", "properties": {"parcel": "A-1"}, "geometry": {"type": "Polygon",
     "coordinates": [[[-149.91, 61.205], [-149.89, 61.205], [-149.89, 61.215], [-149.91, 61.215], [-149.91, 61.205]]]}},
    {"type": "Feature", "properties": {"parcel": "A-2"}, "geometry": {"type": "Polygon",
     "coordinates": [[[-149.905, 61.208], [-149.900, 61.208], [-149.900, 61.210], [-149.905, 61.208]]]}},
    {"type": "Feature", "properties": {"road": "5th Ave"}, "geometry": {"type": "LineString",
     "coordinates": [[-149.93, 61.217], [-149.87, 61.217]]}}
]}"#;

const MIDTOWN: &str = r#"{"type": "FeatureCollection", "features": [
    {"type": "Feature", "properties": {}, "geometry": {"type": "MultiPolygon",
     "coordinates": [
        [[[-149.88, 61.18], [-149.86, 61.18], [-149.86, 61.19], [-149.88, 61.18]]],
        [[[-149.84, 61.18], [-149.83, 61.18], [-149.83, 61.185], [-149.84, 61.18]]]
     ]}}
]}"#;

fn write_folder(dir: &Path) {
    std::fs::write(dir.join("tile_metadata.json"), CATALOG).unwrap();
    std::fs::write(dir.join("downtown.geojson"), DOWNTOWN).unwrap();
    std::fs::write(dir.join("midtown.geojson"), MIDTOWN).unwrap();
    std::fs::write(dir.join("broken.geojson"), "{\"type\": \"FeatureCollection\"").unwrap();
}

/// Degree viewport `(min_lon, min_lat, max_lon, max_lat)` on the projected plane
fn viewport(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> ProjectedRect {
    utils::project_degree_bounds(min_lon, min_lat, max_lon, max_lat)
}

#[derive(Default)]
struct Display {
    overlays: BTreeSet<OverlayId>,
    raster: Option<RasterImage>,
}

impl OverlaySink for Display {
    fn add_overlay(&mut self, id: OverlayId, _file_id: &str, _shape: &GeometryShape) {
        assert!(self.overlays.insert(id), "overlay {id} added twice");
    }

    fn remove_overlay(&mut self, id: OverlayId) {
        assert!(self.overlays.remove(&id), "unknown overlay {id} removed");
    }

    fn show_raster(&mut self, raster: &RasterImage) {
        self.raster = Some(raster.clone());
    }

    fn clear_raster(&mut self) {
        self.raster = None;
    }
}

#[test]
fn test_catalog_drops_malformed_records() {
    let dir = tempfile::tempdir().unwrap();
    write_folder(dir.path());

    let source = TileSource::open(PipelineConfig::viewport_render(dir.path())).unwrap();
    let files: Vec<&str> = source
        .catalog()
        .records()
        .iter()
        .map(|r| r.file_id.as_str())
        .collect();
    assert_eq!(files, vec!["downtown.geojson", "midtown.geojson", "broken.geojson"]);
}

#[test]
fn test_render_over_degree_tiles() {
    let dir = tempfile::tempdir().unwrap();
    write_folder(dir.path());
    let source = TileSource::open(PipelineConfig::viewport_render(dir.path())).unwrap();

    let view = viewport(-149.92, 61.20, -149.86, 61.22);
    assert_eq!(source.tiles_for_rect(&view), vec!["downtown.geojson", "midtown.geojson"]);

    let center = utils::project_lon_lat(Coord { x: -149.90, y: 61.21 });
    assert_eq!(source.tiles_for_point(center), vec!["downtown.geojson"]);

    match source.render(&view, 1) {
        RenderOutcome::Rendered(raster) => {
            assert!(raster.width() <= 1024 && raster.height() <= 1024);
            assert_eq!(raster.width().max(raster.height()), 1024);
            assert!(!raster.is_blank());
            assert!(!raster.encode_png().unwrap().is_empty());
        }
        other => panic!("expected a raster, got {other:?}"),
    }

    // Both intersecting tiles are cached after one render
    assert!(source.cache().contains("downtown.geojson"));
    assert!(source.cache().contains("midtown.geojson"));
}

#[test]
fn test_broken_tile_renders_empty() {
    let dir = tempfile::tempdir().unwrap();
    write_folder(dir.path());
    let source = TileSource::open(PipelineConfig::viewport_render(dir.path())).unwrap();

    let view = viewport(-149.94, 61.11, -149.90, 61.13);
    assert_eq!(source.render(&view, 1), RenderOutcome::Empty);
    assert!(source.load_file("broken.geojson").is_empty());
}

#[test]
fn test_cache_capacity_bounds_memory() {
    let dir = tempfile::tempdir().unwrap();
    write_folder(dir.path());
    let config = PipelineConfig {
        cache_capacity: NonZeroUsize::new(1),
        ..PipelineConfig::viewport_render(dir.path())
    };
    let source = TileSource::open(config).unwrap();

    source.load_file("downtown.geojson");
    source.load_file("midtown.geojson");
    assert_eq!(source.cache().len(), 1);
    assert!(source.cache().contains("midtown.geojson"));
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_follows_the_viewport() {
    let dir = tempfile::tempdir().unwrap();
    write_folder(dir.path());
    let config = PipelineConfig {
        bounds_units: BoundsUnits::Degrees,
        ..PipelineConfig::point_tracking(dir.path())
    };
    let source = Arc::new(TileSource::open(config).unwrap());
    let mut pipeline = TileOverlayPipeline::new(source, Display::default());

    // Centered in downtown
    pipeline.on_viewport_changed(viewport(-149.92, 61.20, -149.88, 61.22));
    pipeline.settle().await;
    assert_eq!(
        pipeline.active_files(),
        BTreeSet::from(["downtown.geojson".to_string()])
    );
    assert_eq!(pipeline.sink().overlays.len(), 3);
    assert!(pipeline.sink().raster.is_some());

    // Centered in midtown only
    pipeline.on_viewport_changed(viewport(-149.85, 61.175, -149.81, 61.185));
    pipeline.settle().await;
    assert_eq!(
        pipeline.active_files(),
        BTreeSet::from(["midtown.geojson".to_string()])
    );
    assert_eq!(pipeline.sink().overlays.len(), 2);
    assert_eq!(pipeline.displayed(), Some(2));

    // Nowhere near any tile
    pipeline.on_viewport_changed(viewport(10.0, 10.0, 10.01, 10.01));
    pipeline.settle().await;
    assert!(pipeline.active_files().is_empty());
    assert!(pipeline.sink().overlays.is_empty());
    assert!(pipeline.sink().raster.is_none());
    assert_eq!(pipeline.generation(), 3);
}
