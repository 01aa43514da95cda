//! Grid composite: N garment photos on one fixed-aspect portrait canvas.

use crate::error::CompositingError;
use crate::raster::{RasterImage, Rect};
use crate::trim::{trim, DEFAULT_TRIM_THRESHOLD};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default canvas width (3:4 portrait).
pub const DEFAULT_CANVAS_WIDTH: u32 = 1536;

/// Default canvas height (3:4 portrait).
pub const DEFAULT_CANVAS_HEIGHT: u32 = 2048;

/// Default gap between cells and around the canvas edge.
pub const DEFAULT_CELL_PADDING: u32 = 20;

/// Default JPEG quality of the encoded composite.
pub const DEFAULT_JPEG_QUALITY: f32 = 0.8;

const WHITE: [u8; 3] = [255, 255, 255];

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Columns and rows used for `n` images.
///
/// Small counts use a fixed table so common outfit sizes stay visually
/// balanced; larger counts fall back to a near-square grid.
pub fn grid_layout(n: usize) -> (u32, u32) {
    match n {
        0 | 1 => (1, 1),
        2 => (2, 1),
        3 | 4 => (2, 2),
        5 | 6 => (2, 3),
        7..=9 => (3, 3),
        10..=12 => (3, 4),
        _ => {
            let cols = (n as f64).sqrt().ceil() as usize;
            let rows = n.div_ceil(cols);
            (cols as u32, rows as u32)
        }
    }
}

/// Canvas and drawing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GridOptions {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub padding: u32,
    /// Multiplier on the fit scale; `1.0` fills the cell.
    pub safety_margin: f64,
    pub trim_threshold: u8,
    /// JPEG quality in `0.0..=1.0`.
    pub jpeg_quality: f32,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            padding: DEFAULT_CELL_PADDING,
            safety_margin: 1.0,
            trim_threshold: DEFAULT_TRIM_THRESHOLD,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

// ---------------------------------------------------------------------------
// GridComposer
// ---------------------------------------------------------------------------

/// Lays images out row-major on a white canvas.
#[derive(Debug, Clone, Default)]
pub struct GridComposer {
    options: GridOptions,
}

impl GridComposer {
    pub fn new(options: GridOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    /// Cell rectangles for `n` images, row-major. Always covers the whole
    /// grid, so trailing cells beyond `n` are included.
    pub fn cell_rects(&self, n: usize) -> Vec<Rect> {
        let (cols, rows) = grid_layout(n);
        let pad = self.options.padding;
        let cell_width = self
            .options
            .canvas_width
            .saturating_sub(pad * (cols + 1))
            / cols;
        let cell_height = self
            .options
            .canvas_height
            .saturating_sub(pad * (rows + 1))
            / rows;

        (0..rows)
            .flat_map(|row| (0..cols).map(move |col| (col, row)))
            .map(|(col, row)| {
                Rect::new(
                    pad + col * (cell_width + pad),
                    pad + row * (cell_height + pad),
                    cell_width,
                    cell_height,
                )
            })
            .collect()
    }

    /// Draw every image, trimmed, into its cell on a fresh white canvas.
    pub fn compose_rasters(&self, images: &[RasterImage]) -> RasterImage {
        let mut canvas = RasterImage::blank(
            self.options.canvas_width,
            self.options.canvas_height,
            WHITE,
        );

        for (image, cell) in images.iter().zip(self.cell_rects(images.len())) {
            let trimmed = trim(image, self.options.trim_threshold);
            let scale = fit_scale(&trimmed, cell) * self.options.safety_margin;
            canvas.draw_scaled_centered(&trimmed, cell, scale);
        }

        tracing::debug!(
            count = images.len(),
            width = self.options.canvas_width,
            height = self.options.canvas_height,
            "Composed garment grid",
        );
        canvas
    }

    /// Compose and encode as JPEG.
    pub fn compose(&self, images: &[RasterImage]) -> Result<Vec<u8>, CompositingError> {
        self.compose_rasters(images)
            .encode_jpeg(self.options.jpeg_quality)
    }

    /// Decode every source, then compose and encode.
    ///
    /// A single undecodable source aborts the whole composite.
    pub fn compose_encoded(&self, sources: &[Vec<u8>]) -> Result<Vec<u8>, CompositingError> {
        let images = sources
            .iter()
            .map(|bytes| RasterImage::load(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        self.compose(&images)
    }
}

/// Largest uniform scale that fits `image` inside `cell`.
fn fit_scale(image: &RasterImage, cell: Rect) -> f64 {
    if image.width() == 0 || image.height() == 0 {
        return 0.0;
    }
    let sx = cell.width as f64 / image.width() as f64;
    let sy = cell.height as f64 / image.height() as f64;
    sx.min(sy)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
