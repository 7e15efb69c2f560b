use clap::{Parser, ValueEnum};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tile_overlay_lib::{BoundsUnits, PipelineConfig, ProjectedRect, utils};

use crate::app::AppError;

/// Units of the catalog bounds, tile coordinates and `--viewport` values
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    /// WGS84 longitude/latitude degrees
    Degrees,
    /// Already projected map-plane coordinates
    Projected,
}

impl From<Units> for BoundsUnits {
    fn from(units: Units) -> Self {
        match units {
            Units::Degrees => BoundsUnits::Degrees,
            Units::Projected => BoundsUnits::Projected,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Tile Overlay - Render bundled vector tiles for a sequence of map viewports
pub struct Settings {
    /// Folder holding the tile catalog and the GeoJSON tile files
    #[clap(short, long, value_name = "DIR")]
    pub tile_folder: PathBuf,

    /// Catalog file name inside the tile folder
    #[clap(long, default_value = "tile_metadata.json")]
    pub catalog_file: String,

    /// Units of catalog bounds, tile coordinates and viewports
    #[clap(long, value_enum, default_value = "degrees")]
    pub bounds_units: Units,

    /// Viewport as minX,minY,maxX,maxY (lon/lat for degree units); repeat to simulate movement
    #[clap(
        short,
        long = "viewport",
        value_name = "RECT",
        value_parser = parse_viewport,
        allow_hyphen_values = true,
        required = true
    )]
    pub viewports: Vec<[f64; 4]>,

    /// Pause between consecutive viewport changes in milliseconds
    #[clap(long, default_value = "500")]
    pub step_ms: u64,

    /// JSON pipeline configuration used as the base for the flags below
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum number of new tiles loaded per viewport change
    #[clap(long)]
    pub batch_cap: Option<usize>,

    /// Quiet period before a burst of viewport changes triggers a rebuild
    #[clap(long)]
    pub debounce_ms: Option<u64>,

    /// Maximum number of shapes drawn per render
    #[clap(long)]
    pub render_budget: Option<usize>,

    /// Upper bound of either raster side in pixels
    #[clap(long)]
    pub max_pixel_dimension: Option<u32>,

    /// Maximum number of intersecting tiles feeding one render
    #[clap(long)]
    pub max_render_tiles: Option<usize>,

    /// Skip rendering above this viewport span (projected units)
    #[clap(long)]
    pub max_render_span: Option<f64>,

    /// Number of tiles kept in the geometry cache (unbounded by default)
    #[clap(long)]
    pub cache_capacity: Option<NonZeroUsize>,

    /// Where to write the final raster
    #[clap(short, long, value_name = "PNG", default_value = "overlay.png")]
    pub output: PathBuf,
}

impl Settings {
    /// Parse from the command line, exiting with usage on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Pipeline configuration: the `--config` file (or defaults) overridden by flags
    pub fn pipeline_config(&self) -> Result<PipelineConfig, AppError> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?;
                serde_json::from_str::<PipelineConfig>(&json)
                    .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?
            }
            None => PipelineConfig::default(),
        };

        config.tile_folder = self.tile_folder.clone();
        config.catalog_file = self.catalog_file.clone();
        config.bounds_units = self.bounds_units.into();
        if let Some(batch_cap) = self.batch_cap {
            config.batch_cap = batch_cap;
        }
        if let Some(ms) = self.debounce_ms {
            config.debounce_delay = Duration::from_millis(ms);
        }
        if let Some(budget) = self.render_budget {
            config.render_budget = budget;
        }
        if let Some(max_dim) = self.max_pixel_dimension {
            config.max_pixel_dimension = max_dim;
        }
        if self.max_render_tiles.is_some() {
            config.max_render_tiles = self.max_render_tiles;
        }
        if self.max_render_span.is_some() {
            config.max_render_span = self.max_render_span;
        }
        if self.cache_capacity.is_some() {
            config.cache_capacity = self.cache_capacity;
        }

        if config.batch_cap == 0 {
            return Err(AppError::Config("batch cap must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Viewports on the projected plane, in command-line order
    pub fn projected_viewports(&self) -> Vec<ProjectedRect> {
        self.viewports
            .iter()
            .map(|&[min_x, min_y, max_x, max_y]| match self.bounds_units {
                Units::Degrees => utils::project_degree_bounds(min_x, min_y, max_x, max_y),
                Units::Projected => ProjectedRect::new(min_x, min_y, max_x - min_x, max_y - min_y),
            })
            .collect()
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }
}

/// Parse `minX,minY,maxX,maxY`
fn parse_viewport(s: &str) -> Result<[f64; 4], String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("'{v}': {e}")))
        .collect::<Result<Vec<f64>, String>>()?;

    let [min_x, min_y, max_x, max_y] = values[..] else {
        return Err(format!("expected 4 comma-separated numbers, got {}", values.len()));
    };
    if values.iter().any(|v| !v.is_finite()) {
        return Err("viewport values must be finite".to_string());
    }
    if min_x > max_x || min_y > max_y {
        return Err("viewport minimum exceeds maximum".to_string());
    }
    Ok([min_x, min_y, max_x, max_y])
}
