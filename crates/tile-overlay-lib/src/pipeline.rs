//! Viewport-driven controller
//!
//! [`TileOverlayPipeline`] is owned by a single foreground task. Viewport changes are
//! debounced into rebuilds; each rebuild mints a generation, reconciles the tiles under
//! the viewport center against the active overlays and starts a background render.
//! Background work runs on tokio's blocking pool and reports back through a channel,
//! so only the foreground ever touches overlay state or the displayed raster.

use crate::{
    BoundsUnits, Debouncer, GeoJsonLoader, GeometryCache, GeometryLoader, GeometryShape,
    OverlayId, ProjectedRect, RasterImage, RasterStyle, Rasterizer, Result, TileCatalog,
    TileIndex, TileLoadManager, select,
};
use geo::Coord;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tunables of the pipeline
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct PipelineConfig {
    /// Folder holding the catalog and every tile file
    pub tile_folder: PathBuf,
    /// Catalog file name inside `tile_folder`
    pub catalog_file: String,
    /// Units of catalog bounds and tile coordinates
    pub bounds_units: BoundsUnits,
    /// Maximum number of new tiles scheduled per viewport change
    pub batch_cap: usize,
    /// Quiet period before a burst of viewport changes triggers a rebuild
    pub debounce_delay: Duration,
    /// Maximum number of shapes drawn per render
    pub render_budget: usize,
    /// Upper bound of either raster side, in pixels
    pub max_pixel_dimension: u32,
    /// Maximum number of intersecting tiles feeding one render
    pub max_render_tiles: Option<usize>,
    /// Skip rendering (and clear the raster) above this viewport span
    pub max_render_span: Option<f64>,
    /// Number of tiles kept in the geometry cache (unbounded when unset)
    pub cache_capacity: Option<NonZeroUsize>,
    pub style: RasterStyle,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_folder: PathBuf::from("tiles"),
            catalog_file: "tile_metadata.json".to_string(),
            bounds_units: BoundsUnits::default(),
            batch_cap: 2,
            debounce_delay: Duration::from_millis(400),
            render_budget: 200,
            max_pixel_dimension: 1024,
            max_render_tiles: None,
            max_render_span: None,
            cache_capacity: None,
            style: RasterStyle::default(),
        }
    }
}

impl PipelineConfig {
    /// Load tracking around the viewport center, two tiles per change
    pub fn point_tracking(tile_folder: impl Into<PathBuf>) -> Self {
        Self {
            tile_folder: tile_folder.into(),
            ..Self::default()
        }
    }

    /// Rendering of every tile under the viewport, at most ten per render
    pub fn viewport_render(tile_folder: impl Into<PathBuf>) -> Self {
        Self {
            tile_folder: tile_folder.into(),
            max_render_tiles: Some(10),
            ..Self::default()
        }
    }

    /// Full path of the catalog document
    pub fn catalog_path(&self) -> PathBuf {
        self.tile_folder.join(&self.catalog_file)
    }
}

/// Result of a background render
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered(RasterImage),
    /// Nothing visible in the viewport
    Empty,
    /// Viewport larger than the configured render span
    ZoomedOut,
}

/// Display collaborator receiving overlay and raster updates
///
/// Called only from the task owning the pipeline.
pub trait OverlaySink {
    fn add_overlay(&mut self, id: OverlayId, file_id: &str, shape: &GeometryShape);
    fn remove_overlay(&mut self, id: OverlayId);
    /// Replace the displayed raster
    fn show_raster(&mut self, raster: &RasterImage);
    fn clear_raster(&mut self);
}

/// Shared read-mostly state used by foreground and background work alike
pub struct TileSource {
    catalog: TileCatalog,
    cache: GeometryCache,
    loader: Box<dyn GeometryLoader>,
    rasterizer: Rasterizer,
    config: PipelineConfig,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TileSource {
    pub fn new(
        catalog: TileCatalog,
        loader: impl GeometryLoader + 'static,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            cache: GeometryCache::new(config.cache_capacity),
            loader: Box::new(loader),
            rasterizer: Rasterizer::new(config.style),
            config,
        }
    }

    /// Read the catalog from disk and load tiles as GeoJSON from the same folder
    pub fn open(config: PipelineConfig) -> Result<Self> {
        let catalog = TileCatalog::load(config.catalog_path(), config.bounds_units)?;
        let loader = GeoJsonLoader::new(&config.tile_folder, config.bounds_units);
        Ok(Self::new(catalog, loader, config))
    }

    pub fn catalog(&self) -> &TileCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &GeometryCache {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn index(&self) -> TileIndex<'_> {
        TileIndex::new(&self.catalog)
    }

    /// Tiles whose bounds contain a projected point
    pub fn tiles_for_point(&self, point: Coord<f64>) -> Vec<String> {
        let native = self.catalog.units().unproject(point);
        self.index()
            .find_by_point(native.x, native.y)
            .into_iter()
            .map(|r| r.file_id.clone())
            .collect()
    }

    /// Tiles whose projected bounds intersect a rectangle
    pub fn tiles_for_rect(&self, rect: &ProjectedRect) -> Vec<String> {
        self.index()
            .find_by_rect(rect)
            .into_iter()
            .map(|r| r.file_id.clone())
            .collect()
    }

    /// Shapes of one tile, loading it on a cache miss (blocking)
    pub fn load_file(&self, file_id: &str) -> Arc<[GeometryShape]> {
        self.cache.get_or_load(file_id, self.loader.as_ref())
    }

    /// Shapes of several tiles, loading misses in parallel (blocking)
    pub fn shapes_for_files(&self, files: &[String]) -> Vec<Arc<[GeometryShape]>> {
        files.par_iter().map(|f| self.load_file(f)).collect()
    }

    /// Select and rasterize what is visible in `viewport` (blocking)
    pub fn render(&self, viewport: &ProjectedRect, generation: u64) -> RenderOutcome {
        if self
            .config
            .max_render_span
            .is_some_and(|span| viewport.max_span() > span)
        {
            return RenderOutcome::ZoomedOut;
        }

        let mut files = self.tiles_for_rect(viewport);
        if let Some(max_tiles) = self.config.max_render_tiles {
            files.truncate(max_tiles);
        }
        let loaded = self.shapes_for_files(&files);
        let selected = select(
            viewport,
            loaded.iter().flat_map(|shapes| shapes.iter()),
            viewport.center(),
            self.config.render_budget,
        );
        if selected.is_empty() {
            return RenderOutcome::Empty;
        }

        let raster = self
            .rasterizer
            .rasterize(&selected, viewport, self.config.max_pixel_dimension)
            .with_generation(generation);
        tracing::debug!(
            "Rendered generation {generation}: {} tiles, {} shapes",
            files.len(),
            selected.len()
        );
        RenderOutcome::Rendered(raster)
    }
}

impl std::fmt::Debug for TileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSource")
            .field("tiles", &self.catalog.len())
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}

/// Messages delivered to the foreground task
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Debounced viewport change
    Rebuild { viewport: ProjectedRect },
    /// A scheduled tile finished loading
    TileLoaded {
        generation: u64,
        file_id: String,
        shapes: Arc<[GeometryShape]>,
    },
    RenderFinished {
        generation: u64,
        outcome: RenderOutcome,
    },
}

/// Foreground owner of overlay state
pub struct TileOverlayPipeline<S: OverlaySink> {
    source: Arc<TileSource>,
    manager: TileLoadManager,
    sink: S,
    generation: u64,
    displayed: Option<u64>,
    debouncer: Debouncer,
    /// Latest debounced viewport whose rebuild has not been handled yet
    awaiting_rebuild: Option<ProjectedRect>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    events_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    render_task: Option<JoinHandle<()>>,
    render_in_flight: bool,
    pending_loads: usize,
}

impl<S: OverlaySink> TileOverlayPipeline<S> {
    pub fn new(source: Arc<TileSource>, sink: S) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let config = source.config();
        Self {
            manager: TileLoadManager::new(config.batch_cap),
            debouncer: Debouncer::new(config.debounce_delay),
            awaiting_rebuild: None,
            source,
            sink,
            generation: 0,
            displayed: None,
            events_tx,
            events_rx,
            render_task: None,
            render_in_flight: false,
            pending_loads: 0,
        }
    }

    /// Open the tile folder named by `config` and build a pipeline over it
    pub fn open(config: PipelineConfig, sink: S) -> Result<Self> {
        Ok(Self::new(Arc::new(TileSource::open(config)?), sink))
    }

    /// Debounced trigger: a rebuild for `viewport` is posted once changes settle
    pub fn on_viewport_changed(&mut self, viewport: ProjectedRect) {
        let events = self.events_tx.clone();
        self.awaiting_rebuild = Some(viewport);
        self.debouncer.schedule(async move {
            if events.send(PipelineEvent::Rebuild { viewport }).is_err() {
                tracing::debug!("Pipeline dropped before rebuild fired");
            }
        });
    }

    /// Apply one event on the foreground
    pub fn handle_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Rebuild { viewport } => self.rebuild(viewport),
            PipelineEvent::TileLoaded {
                generation,
                file_id,
                shapes,
            } => {
                self.pending_loads = self.pending_loads.saturating_sub(1);
                let added = self.manager.complete_load(&file_id, &shapes);
                tracing::debug!(
                    "Tile {file_id} (generation {generation}) added {} overlays",
                    added.len()
                );
                for (id, shape) in &added {
                    self.sink.add_overlay(*id, &file_id, shape);
                }
            }
            PipelineEvent::RenderFinished {
                generation,
                outcome,
            } => self.finish_render(generation, outcome),
        }
    }

    /// Next event from background work or the debouncer
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events_rx.recv().await
    }

    /// Process events until no work is scheduled or running
    pub async fn settle(&mut self) {
        while !self.is_idle() {
            match self.next_event().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    /// Feed viewport changes from `viewports` until it closes, then finish pending work
    pub async fn run(&mut self, mut viewports: mpsc::Receiver<ProjectedRect>) {
        let mut input_open = true;
        loop {
            if !input_open && self.is_idle() {
                break;
            }
            tokio::select! {
                viewport = viewports.recv(), if input_open => match viewport {
                    Some(viewport) => self.on_viewport_changed(viewport),
                    None => input_open = false,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                else => break,
            }
        }
        tracing::info!(
            "Pipeline finished after {} rebuilds with {} active tiles",
            self.generation,
            self.manager.active_files().len()
        );
    }

    /// Whether no rebuild, load or render is pending
    pub fn is_idle(&self) -> bool {
        self.awaiting_rebuild.is_none()
            && self.pending_loads == 0
            && !self.render_in_flight
            && self.events_rx.is_empty()
    }

    /// Generation of the latest rebuild
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_files(&self) -> BTreeSet<String> {
        self.manager.active_files()
    }

    /// Generation of the raster currently shown, if any
    pub fn displayed(&self) -> Option<u64> {
        self.displayed
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn source(&self) -> &Arc<TileSource> {
        &self.source
    }

    fn rebuild(&mut self, viewport: ProjectedRect) {
        if self.awaiting_rebuild == Some(viewport) {
            self.awaiting_rebuild = None;
        }
        self.generation += 1;
        let generation = self.generation;

        let needed = self.source.tiles_for_point(viewport.center());
        let plan = self.manager.plan(&needed);
        for (id, _) in &plan.to_remove {
            self.sink.remove_overlay(*id);
        }
        for file_id in plan.to_add {
            self.spawn_load(generation, file_id);
        }

        self.spawn_render(generation, viewport);
    }

    /// Load a tile on the blocking pool; a panicking loader reports an empty tile
    fn spawn_load(&mut self, generation: u64, file_id: String) {
        let source = self.source.clone();
        let events = self.events_tx.clone();
        self.pending_loads += 1;
        let blocking_id = file_id.clone();
        let load = tokio::task::spawn_blocking(move || source.load_file(&blocking_id));
        tokio::spawn(async move {
            let shapes = match load.await {
                Ok(shapes) => shapes,
                Err(e) => {
                    tracing::warn!("Loading {file_id} failed: {e}");
                    Arc::from([])
                }
            };
            let _ = events.send(PipelineEvent::TileLoaded {
                generation,
                file_id,
                shapes,
            });
        });
    }

    /// Render on the blocking pool; a panicking render reports an empty outcome
    fn spawn_render(&mut self, generation: u64, viewport: ProjectedRect) {
        if let Some(previous) = self.render_task.take() {
            previous.abort();
        }
        let source = self.source.clone();
        let events = self.events_tx.clone();
        self.render_in_flight = true;
        let render = tokio::task::spawn_blocking(move || source.render(&viewport, generation));
        self.render_task = Some(tokio::spawn(async move {
            let outcome = match render.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("Render of generation {generation} failed: {e}");
                    RenderOutcome::Empty
                }
            };
            let _ = events.send(PipelineEvent::RenderFinished {
                generation,
                outcome,
            });
        }));
    }

    fn finish_render(&mut self, generation: u64, outcome: RenderOutcome) {
        if generation != self.generation {
            tracing::debug!(
                "Discarding stale render of generation {generation} (current {})",
                self.generation
            );
            return;
        }
        self.render_in_flight = false;
        self.render_task = None;

        match outcome {
            RenderOutcome::Rendered(raster) => {
                self.sink.show_raster(&raster);
                self.displayed = Some(generation);
            }
            RenderOutcome::Empty => self.clear_raster(),
            RenderOutcome::ZoomedOut => {
                tracing::debug!("Viewport too large to render; clearing raster");
                self.clear_raster();
            }
        }
    }

    fn clear_raster(&mut self) {
        self.sink.clear_raster();
        self.displayed = None;
    }
}

impl<S: OverlaySink> Drop for TileOverlayPipeline<S> {
    fn drop(&mut self) {
        if let Some(task) = self.render_task.take() {
            task.abort();
        }
    }
}
