//! RGBA raster wrapper: load, pixel access, scaled drawing, JPEG encoding.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, Rgba, RgbaImage};

use crate::error::CompositingError;

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// An owned RGBA8 image.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    inner: RgbaImage,
}

impl RasterImage {
    /// Decode PNG, JPEG or WebP bytes.
    pub fn load(bytes: &[u8]) -> Result<Self, CompositingError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| CompositingError::Decode(e.to_string()))?;
        Ok(Self {
            inner: decoded.to_rgba8(),
        })
    }

    /// Opaque canvas filled with a single color.
    pub fn blank(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let [r, g, b] = rgb;
        Self {
            inner: RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255])),
        }
    }

    /// Wrap an RGBA8 row-major buffer. Returns `None` if the length does
    /// not match `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, rgba).map(|inner| Self { inner })
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    /// RGBA8 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.inner.as_raw()
    }

    /// `[r, g, b, a]` at `(x, y)`. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.inner.get_pixel(x, y).0
    }

    /// Copy out `rect`. The rectangle is clamped to the image bounds.
    pub fn crop(&self, rect: Rect) -> Self {
        let x = rect.x.min(self.width());
        let y = rect.y.min(self.height());
        let width = rect.width.min(self.width() - x);
        let height = rect.height.min(self.height() - y);
        Self {
            inner: imageops::crop_imm(&self.inner, x, y, width, height).to_image(),
        }
    }

    /// Draw `image` resized by `scale` and centered inside `cell`.
    ///
    /// Both axes use the same factor, so the aspect ratio is kept. The
    /// drawn size never exceeds the cell and never drops below 1 px.
    /// Transparent source pixels blend with what is already on `self`.
    pub fn draw_scaled_centered(&mut self, image: &RasterImage, cell: Rect, scale: f64) {
        if cell.width == 0 || cell.height == 0 || image.width() == 0 || image.height() == 0 {
            return;
        }

        let fit = (cell.width as f64 / image.width() as f64)
            .min(cell.height as f64 / image.height() as f64);
        let scale = scale.min(fit);
        let width = scaled_side(image.width(), scale, cell.width);
        let height = scaled_side(image.height(), scale, cell.height);

        let offset_x = cell.x + (cell.width - width) / 2;
        let offset_y = cell.y + (cell.height - height) / 2;

        if width == image.width() && height == image.height() {
            imageops::overlay(&mut self.inner, &image.inner, offset_x as i64, offset_y as i64);
        } else {
            let resized = imageops::resize(&image.inner, width, height, FilterType::Triangle);
            imageops::overlay(&mut self.inner, &resized, offset_x as i64, offset_y as i64);
        }
    }

    /// Encode as baseline JPEG.
    ///
    /// `quality` is in `0.0..=1.0` and maps onto the encoder's `1..=100`
    /// scale. Transparent pixels are flattened onto white first.
    pub fn encode_jpeg(&self, quality: f32) -> Result<Vec<u8>, CompositingError> {
        let rgb = self.flatten_on_white();
        let mut buf = Vec::new();
        {
            let mut encoder =
                JpegEncoder::new_with_quality(Cursor::new(&mut buf), jpeg_quality(quality));
            encoder
                .encode_image(&rgb)
                .map_err(|e| CompositingError::Encode(e.to_string()))?;
        }
        Ok(buf)
    }

    fn flatten_on_white(&self) -> RgbImage {
        RgbImage::from_fn(self.width(), self.height(), |x, y| {
            let [r, g, b, a] = self.inner.get_pixel(x, y).0;
            let a = a as u16;
            let blend = |c: u8| ((c as u16 * a + 255 * (255 - a) + 127) / 255) as u8;
            Rgb([blend(r), blend(g), blend(b)])
        })
    }
}

/// Side length after scaling, clamped to `1..=limit`.
fn scaled_side(side: u32, scale: f64, limit: u32) -> u32 {
    let scaled = (side as f64 * scale).round();
    (scaled.max(1.0) as u32).min(limit)
}

/// Map a `0.0..=1.0` quality onto the JPEG encoder scale.
fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, px: [u8; 4]) -> RasterImage {
        RasterImage {
            inner: RgbaImage::from_pixel(width, height, Rgba(px)),
        }
    }

    #[test]
    fn jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.8), 80);
        assert_eq!(jpeg_quality(1.0), 100);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(7.0), 100);
    }

    #[test]
    fn scaled_side_clamps() {
        assert_eq!(scaled_side(100, 0.5, 1000), 50);
        assert_eq!(scaled_side(100, 0.001, 1000), 1);
        assert_eq!(scaled_side(100, 3.0, 250), 250);
    }

    #[test]
    fn crop_is_clamped_to_bounds() {
        let img = solid(10, 8, [0, 0, 0, 255]);
        let cropped = img.crop(Rect::new(6, 4, 10, 10));
        assert_eq!((cropped.width(), cropped.height()), (4, 4));
    }

    #[test]
    fn draw_centers_and_keeps_aspect() {
        let mut canvas = RasterImage::blank(100, 100, [255, 255, 255]);
        let red = solid(10, 5, [255, 0, 0, 255]);
        canvas.draw_scaled_centered(&red, Rect::new(0, 0, 100, 100), 10.0);

        // 100x50 drawn in the middle rows.
        assert_eq!(canvas.pixel(50, 24), [255, 255, 255, 255]);
        assert_eq!(canvas.pixel(50, 25), [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(50, 74), [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(50, 75), [255, 255, 255, 255]);
        assert_eq!(canvas.pixel(0, 50), [255, 0, 0, 255]);
    }

    #[test]
    fn oversized_scale_is_capped_uniformly() {
        let mut canvas = RasterImage::blank(20, 20, [255, 255, 255]);
        let red = solid(10, 5, [255, 0, 0, 255]);
        canvas.draw_scaled_centered(&red, Rect::new(0, 0, 20, 20), 3.0);

        // Capped at 2.0 on both axes: 20x10 in rows 5..15, not 20x15.
        assert_eq!(canvas.pixel(10, 4), [255, 255, 255, 255]);
        assert_eq!(canvas.pixel(10, 5), [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(10, 14), [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(10, 15), [255, 255, 255, 255]);
        assert_eq!(canvas.pixel(0, 10), [255, 0, 0, 255]);
    }

    #[test]
    fn transparent_pixels_leave_canvas_untouched() {
        let mut canvas = RasterImage::blank(4, 4, [255, 255, 255]);
        let clear = solid(4, 4, [0, 0, 0, 0]);
        canvas.draw_scaled_centered(&clear, Rect::new(0, 0, 4, 4), 1.0);
        assert_eq!(canvas.pixel(2, 2), [255, 255, 255, 255]);
    }

    #[test]
    fn encode_then_load_keeps_dimensions() {
        let img = solid(16, 12, [10, 200, 30, 255]);
        let bytes = img.encode_jpeg(0.8).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = RasterImage::load(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }

    #[test]
    fn flatten_blends_transparent_onto_white() {
        let img = solid(1, 1, [0, 0, 0, 0]);
        assert_eq!(img.flatten_on_white().get_pixel(0, 0).0, [255, 255, 255]);
        let img = solid(1, 1, [0, 0, 0, 255]);
        assert_eq!(img.flatten_on_white().get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn load_rejects_garbage() {
        assert!(matches!(
            RasterImage::load(b"definitely not an image"),
            Err(CompositingError::Decode(_))
        ));
    }

    #[test]
    fn from_rgba_checks_length() {
        assert!(RasterImage::from_rgba(2, 2, vec![0; 16]).is_some());
        assert!(RasterImage::from_rgba(2, 2, vec![0; 15]).is_none());
    }
}
