//! Tile Overlay - Command-line Driver
//!
//! Feeds a sequence of viewports through the tile overlay pipeline and writes the
//! resulting raster to a PNG file.

mod app;
mod logging;

pub use app::{AppError, PngSink, RunSummary, Settings, TileOverlayApp};
pub use logging::setup_logging;
