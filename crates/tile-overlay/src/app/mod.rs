//! Application module
//!
//! Drives the tile overlay pipeline from the command line:
//! - Opens the tile folder and its catalog
//! - Feeds the requested viewports one step at a time
//! - Writes the latest raster to a PNG file

pub(crate) mod settings;
mod sink;

pub use settings::Settings;
pub use sink::PngSink;

use std::collections::BTreeMap;
use std::sync::Arc;
use tile_overlay_lib::{TileError, TileOverlayPipeline, TileSource};
use tokio::sync::mpsc;

/// Errors surfaced to the user
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Tile(#[from] TileError),
}

/// What a run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub rebuilds: u64,
    /// Overlays per materialized tile when the run ended
    pub overlays_by_file: BTreeMap<String, usize>,
    /// Generation of the raster left on disk, if any
    pub written: Option<u64>,
    pub rasters_written: usize,
}

/// Main application structure
pub struct TileOverlayApp {
    settings: Settings,
}

impl TileOverlayApp {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Run every viewport through the pipeline and wait for the work to settle
    pub async fn run(self) -> Result<RunSummary, AppError> {
        let config = self.settings.pipeline_config()?;
        let source = TileSource::open(config)?;
        tracing::info!(
            "Opened {} tiles from {}",
            source.catalog().len(),
            self.settings.tile_folder.display()
        );

        let sink = PngSink::new(&self.settings.output);
        let mut pipeline = TileOverlayPipeline::new(Arc::new(source), sink);

        let viewports = self.settings.projected_viewports();
        let step = self.settings.step();
        let (tx, rx) = mpsc::channel(viewports.len().max(1));
        let feeder = tokio::spawn(async move {
            for (i, viewport) in viewports.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(step).await;
                }
                tracing::debug!("Viewport change {i}: {viewport:?}");
                if tx.send(viewport).await.is_err() {
                    break;
                }
            }
        });

        pipeline.run(rx).await;
        if let Err(e) = feeder.await {
            tracing::warn!("Viewport feeder failed: {e}");
        }

        let sink = pipeline.sink();
        let summary = RunSummary {
            rebuilds: pipeline.generation(),
            overlays_by_file: sink
                .overlays_by_file()
                .into_iter()
                .map(|(file, count)| (file.to_string(), count))
                .collect(),
            written: sink.written(),
            rasters_written: sink.rasters_written(),
        };
        if sink.write_errors() > 0 {
            tracing::warn!("{} raster writes failed", sink.write_errors());
        }
        Ok(summary)
    }
}
