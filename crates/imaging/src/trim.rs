//! Whitespace trimming: crop a garment photo to its content bounding box.

use crate::raster::{RasterImage, Rect};

/// Default distance from pure white still treated as background.
pub const DEFAULT_TRIM_THRESHOLD: u8 = 15;

/// Whether an RGBA pixel counts as background.
///
/// Fully transparent pixels are background, as are pixels whose three
/// color channels all exceed `255 - threshold`.
fn is_background(px: &[u8], threshold: u8) -> bool {
    let cutoff = 255 - threshold;
    px[3] == 0 || (px[0] > cutoff && px[1] > cutoff && px[2] > cutoff)
}

/// Minimal rectangle covering every non-background pixel, or `None` if
/// the image is entirely background.
pub fn content_bounds(image: &RasterImage, threshold: u8) -> Option<Rect> {
    let width = image.width() as usize;
    if width == 0 {
        return None;
    }

    let mut min_x = usize::MAX;
    let mut min_y = usize::MAX;
    let mut max_x = 0usize;
    let mut max_y = 0usize;
    let mut found = false;

    for (y, row) in image.pixels().chunks_exact(width * 4).enumerate() {
        for (x, px) in row.chunks_exact(4).enumerate() {
            if is_background(px, threshold) {
                continue;
            }
            found = true;
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }

    found.then(|| {
        Rect::new(
            min_x as u32,
            min_y as u32,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        )
    })
}

/// Crop `image` exactly to its content bounding box.
///
/// An image with no content is returned unchanged rather than cropped
/// to zero size.
pub fn trim(image: &RasterImage, threshold: u8) -> RasterImage {
    match content_bounds(image, threshold) {
        Some(bounds) => image.crop(bounds),
        None => image.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(width: u32, height: u32, fill: [u8; 4]) -> Vec<u8> {
        fill.iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect()
    }

    fn set(buf: &mut [u8], width: u32, x: u32, y: u32, px: [u8; 4]) {
        let i = ((y * width + x) * 4) as usize;
        buf[i..i + 4].copy_from_slice(&px);
    }

    #[test]
    fn all_white_is_returned_unchanged() {
        let img = RasterImage::from_rgba(20, 10, canvas(20, 10, [255, 255, 255, 255])).unwrap();
        let trimmed = trim(&img, DEFAULT_TRIM_THRESHOLD);
        assert_eq!((trimmed.width(), trimmed.height()), (20, 10));
        assert_eq!(trimmed, img);
    }

    #[test]
    fn all_transparent_is_returned_unchanged() {
        let img = RasterImage::from_rgba(7, 9, canvas(7, 9, [12, 34, 56, 0])).unwrap();
        assert_eq!(content_bounds(&img, DEFAULT_TRIM_THRESHOLD), None);
        assert_eq!(trim(&img, DEFAULT_TRIM_THRESHOLD), img);
    }

    #[test]
    fn single_pixel_crops_to_one_by_one() {
        let mut buf = canvas(30, 40, [255, 255, 255, 255]);
        set(&mut buf, 30, 11, 27, [20, 20, 20, 255]);
        let img = RasterImage::from_rgba(30, 40, buf).unwrap();

        assert_eq!(
            content_bounds(&img, DEFAULT_TRIM_THRESHOLD),
            Some(Rect::new(11, 27, 1, 1))
        );
        let trimmed = trim(&img, DEFAULT_TRIM_THRESHOLD);
        assert_eq!((trimmed.width(), trimmed.height()), (1, 1));
        assert_eq!(trimmed.pixel(0, 0), [20, 20, 20, 255]);
    }

    #[test]
    fn near_white_within_threshold_is_background() {
        let mut buf = canvas(10, 10, [255, 255, 255, 255]);
        // 241 > 240: background at threshold 15.
        set(&mut buf, 10, 1, 1, [241, 250, 245, 255]);
        // 240 is not above the cutoff: content.
        set(&mut buf, 10, 8, 6, [240, 255, 255, 255]);
        let img = RasterImage::from_rgba(10, 10, buf).unwrap();
        assert_eq!(
            content_bounds(&img, DEFAULT_TRIM_THRESHOLD),
            Some(Rect::new(8, 6, 1, 1))
        );
    }

    #[test]
    fn bounding_box_spans_all_content() {
        let mut buf = canvas(50, 50, [0, 0, 0, 0]);
        set(&mut buf, 50, 5, 40, [200, 0, 0, 255]);
        set(&mut buf, 50, 44, 3, [0, 0, 200, 128]);
        let img = RasterImage::from_rgba(50, 50, buf).unwrap();
        let bounds = content_bounds(&img, DEFAULT_TRIM_THRESHOLD).unwrap();
        assert_eq!(bounds, Rect::new(5, 3, 40, 38));
        let trimmed = trim(&img, DEFAULT_TRIM_THRESHOLD);
        assert_eq!((trimmed.width(), trimmed.height()), (40, 38));
        assert_eq!(trimmed.pixel(0, 37), [200, 0, 0, 255]);
        assert_eq!(trimmed.pixel(39, 0), [0, 0, 200, 128]);
    }

    #[test]
    fn trim_is_deterministic() {
        let mut buf = canvas(16, 16, [255, 255, 255, 255]);
        set(&mut buf, 16, 3, 4, [1, 2, 3, 255]);
        set(&mut buf, 16, 12, 9, [4, 5, 6, 255]);
        let img = RasterImage::from_rgba(16, 16, buf).unwrap();
        assert_eq!(trim(&img, 15), trim(&img, 15));
    }

    #[test]
    fn zero_threshold_keeps_every_opaque_pixel() {
        let mut buf = canvas(4, 4, [255, 255, 255, 255]);
        set(&mut buf, 4, 0, 0, [0, 0, 0, 0]);
        let img = RasterImage::from_rgba(4, 4, buf).unwrap();
        assert_eq!(content_bounds(&img, 0), Some(Rect::new(0, 0, 4, 4)));
    }
}
