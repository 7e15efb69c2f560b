//! Viewport rasterization of selected shapes
//!
//! Shapes are stroked (never filled) into an RGBA image covering exactly the viewport.
//! The resolution is one pixel per projected unit, scaled down so the larger side stays
//! within a pixel budget.

use crate::{GeometryShape, ProjectedRect, Result, ShapeKind};
use geo::Coord;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stroke appearance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct RasterStyle {
    /// Stroke color (RGBA)
    pub stroke: [u8; 4],
    /// Stroke color of polylines; `None` draws them with `stroke`
    pub polyline_stroke: Option<[u8; 4]>,
    /// Stroke width in pixels (0 behaves as 1)
    pub stroke_width: u32,
    /// Fill of untouched pixels (RGBA)
    pub background: [u8; 4],
}

impl Default for RasterStyle {
    fn default() -> Self {
        Self {
            stroke: [255, 255, 0, 255],
            polyline_stroke: Some([255, 0, 0, 255]),
            stroke_width: 1,
            background: [0, 0, 0, 0],
        }
    }
}

/// A rendered viewport
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: RgbaImage,
    rect: ProjectedRect,
    generation: u64,
}

impl RasterImage {
    /// Tag the image with the rebuild generation that requested it
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Viewport the image covers
    #[inline]
    pub fn rect(&self) -> &ProjectedRect {
        &self.rect
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Whether every pixel still has the color of the top-left one
    pub fn is_blank(&self) -> bool {
        let mut pixels = self.pixels.pixels();
        match pixels.next() {
            Some(first) => pixels.all(|p| p == first),
            None => true,
        }
    }

    /// Encode as PNG
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buffer: Vec<u8> = Vec::new();
        PngEncoder::new(&mut buffer).write_image(
            self.pixels.as_raw(),
            self.width(),
            self.height(),
            ExtendedColorType::Rgba8,
        )?;
        Ok(buffer)
    }

    /// Encode as PNG and write to `path`
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.encode_png()?)?;
        Ok(())
    }
}

/// Strokes shapes into viewport-sized images
#[derive(Debug, Clone, Default)]
pub struct Rasterizer {
    style: RasterStyle,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Rasterizer {
    pub fn new(style: RasterStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &RasterStyle {
        &self.style
    }

    /// Render `shapes` over `viewport`, keeping both sides within `max_pixel_dimension`
    ///
    /// Polygons are drawn as closed outlines, polylines as open paths. Output is
    /// deterministic for identical inputs.
    pub fn rasterize(
        &self,
        shapes: &[GeometryShape],
        viewport: &ProjectedRect,
        max_pixel_dimension: u32,
    ) -> RasterImage {
        let max_dim = f64::from(max_pixel_dimension.max(1));
        let scale = (max_dim / viewport.width())
            .min(max_dim / viewport.height())
            .min(1.0);
        let width = pixel_extent(viewport.width() * scale);
        let height = pixel_extent(viewport.height() * scale);

        let mut pixels = RgbaImage::from_pixel(width, height, Rgba(self.style.background));
        let transform = PixelTransform {
            origin_x: viewport.origin_x(),
            origin_y: viewport.origin_y(),
            scale,
            height: f64::from(height),
        };

        for shape in shapes {
            self.stroke_shape(&mut pixels, shape, &transform);
        }

        tracing::trace!(
            "Rasterized {} shapes into {width}x{height} (scale {scale:.4})",
            shapes.len()
        );

        RasterImage {
            pixels,
            rect: *viewport,
            generation: 0,
        }
    }

    fn stroke_shape(
        &self,
        pixels: &mut RgbaImage,
        shape: &GeometryShape,
        transform: &PixelTransform,
    ) {
        let color = match shape.kind() {
            ShapeKind::Polygon => self.style.stroke,
            ShapeKind::Polyline => self.style.polyline_stroke.unwrap_or(self.style.stroke),
        };
        let points: Vec<(f32, f32)> = shape
            .points()
            .iter()
            .map(|p| transform.apply(*p))
            .collect();
        for pair in points.windows(2) {
            self.stroke_segment(pixels, pair[0], pair[1], color);
        }
        if shape.kind() == ShapeKind::Polygon && points.len() > 2 {
            self.stroke_segment(pixels, points[points.len() - 1], points[0], color);
        }
    }

    /// Draw one segment, thickened by repeating it along the minor axis
    fn stroke_segment(
        &self,
        pixels: &mut RgbaImage,
        start: (f32, f32),
        end: (f32, f32),
        color: [u8; 4],
    ) {
        let width = self.style.stroke_width.max(1) as i64;
        let pad = width as f32;
        let bounds = (pixels.width() as f32 + pad, pixels.height() as f32 + pad);
        let Some((start, end)) = clip_segment(start, end, (-pad, -pad), bounds) else {
            return;
        };

        let color = Rgba(color);
        let horizontal = (end.0 - start.0).abs() >= (end.1 - start.1).abs();
        let first_offset = -(width - 1) / 2;
        for k in first_offset..first_offset + width {
            let k = k as f32;
            let (s, e) = if horizontal {
                ((start.0, start.1 + k), (end.0, end.1 + k))
            } else {
                ((start.0 + k, start.1), (end.0 + k, end.1))
            };
            draw_line_segment_mut(pixels, s, e, color);
        }
    }
}

/// Projected to pixel coordinates with the Y axis flipped
struct PixelTransform {
    origin_x: f64,
    origin_y: f64,
    scale: f64,
    height: f64,
}

impl PixelTransform {
    fn apply(&self, p: Coord<f64>) -> (f32, f32) {
        let px = (p.x - self.origin_x) * self.scale;
        let py = self.height - (p.y - self.origin_y) * self.scale;
        (px as f32, py as f32)
    }
}

fn pixel_extent(size: f64) -> u32 {
    if !size.is_finite() {
        return 1;
    }
    size.round().clamp(1.0, f64::from(u32::MAX)) as u32
}

/// Liang-Barsky clipping of a segment against an axis-aligned box
fn clip_segment(
    start: (f32, f32),
    end: (f32, f32),
    min: (f32, f32),
    max: (f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;

    for (p, q) in [
        (-dx, start.0 - min.0),
        (dx, max.0 - start.0),
        (-dy, start.1 - min.1),
        (dy, max.1 - start.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    Some((
        (start.0 + t0 * dx, start.1 + t0 * dy),
        (start.0 + t1 * dx, start.1 + t1 * dy),
    ))
}
