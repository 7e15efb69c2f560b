//! File-backed display collaborator

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tile_overlay_lib::{GeometryShape, OverlayId, OverlaySink, RasterImage};

/// Writes every displayed raster to a PNG file and tracks the overlay set
#[derive(Debug)]
pub struct PngSink {
    output: PathBuf,
    overlays: BTreeMap<OverlayId, String>,
    /// Generation of the raster currently on disk
    written: Option<u64>,
    rasters_written: usize,
    write_errors: usize,
}

impl PngSink {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            overlays: BTreeMap::new(),
            written: None,
            rasters_written: 0,
            write_errors: 0,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    /// Overlay count per tile file
    pub fn overlays_by_file(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for file in self.overlays.values() {
            *counts.entry(file.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn written(&self) -> Option<u64> {
        self.written
    }

    pub fn rasters_written(&self) -> usize {
        self.rasters_written
    }

    pub fn write_errors(&self) -> usize {
        self.write_errors
    }
}

impl OverlaySink for PngSink {
    fn add_overlay(&mut self, id: OverlayId, file_id: &str, shape: &GeometryShape) {
        tracing::trace!(
            "Add {id} from {file_id} ({:?}, {} points)",
            shape.kind(),
            shape.points().len()
        );
        self.overlays.insert(id, file_id.to_string());
    }

    fn remove_overlay(&mut self, id: OverlayId) {
        if self.overlays.remove(&id).is_none() {
            tracing::warn!("Remove of unknown {id}");
        }
    }

    fn show_raster(&mut self, raster: &RasterImage) {
        match raster.save_png(&self.output) {
            Ok(()) => {
                tracing::info!(
                    "Wrote {}x{} raster (generation {}) to {}",
                    raster.width(),
                    raster.height(),
                    raster.generation(),
                    self.output.display()
                );
                self.written = Some(raster.generation());
                self.rasters_written += 1;
            }
            Err(e) => {
                tracing::error!("Failed to write {}: {e}", self.output.display());
                self.write_errors += 1;
            }
        }
    }

    fn clear_raster(&mut self) {
        if self.written.take().is_some() {
            match std::fs::remove_file(&self.output) {
                Ok(()) => tracing::info!("Cleared raster {}", self.output.display()),
                Err(e) => tracing::warn!("Failed to remove {}: {e}", self.output.display()),
            }
        } else {
            tracing::debug!("Nothing visible; no raster written");
        }
    }
}
