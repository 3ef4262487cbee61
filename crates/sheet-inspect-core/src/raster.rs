//! Float maps, rectangular windows and bilinear sampling over `image` buffers.

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use serde::{Deserialize, Serialize};

/// Single-channel `f32` image used for cue maps and intermediate filters.
pub type FloatMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Axis-aligned pixel rectangle, `x..x+width` by `y..y+height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width x height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[inline]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    /// Smallest rectangle containing both `self` and the pixel `(x, y)`.
    pub fn include(&self, x: u32, y: u32) -> Self {
        let x0 = self.x.min(x);
        let y0 = self.y.min(y);
        let x1 = self.right().max(x + 1);
        let y1 = self.bottom().max(y + 1);
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// Copy the window `rect` out of any image buffer.
pub fn crop_window<P>(
    img: &ImageBuffer<P, Vec<P::Subpixel>>,
    rect: PixelRect,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: image::Pixel + 'static,
{
    image::imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image()
}

/// Wrap a row-major buffer of `width * height` values as a float map.
///
/// A buffer of the wrong length yields an all-zero map.
pub fn float_map_from_vec(width: u32, height: u32, data: Vec<f32>) -> FloatMap {
    FloatMap::from_raw(width, height, data).unwrap_or_else(|| FloatMap::new(width, height))
}

/// Promote an 8-bit image to a float map without rescaling.
pub fn float_map_from_gray(img: &GrayImage) -> FloatMap {
    FloatMap::from_fn(img.width(), img.height(), |x, y| Luma([img.get_pixel(x, y)[0] as f32]))
}

/// Round a float map back to 8 bits, saturating at `[0, 255]`.
pub fn gray_from_float_map(map: &FloatMap) -> GrayImage {
    GrayImage::from_fn(map.width(), map.height(), |x, y| {
        Luma([round_u8(map.get_pixel(x, y)[0])])
    })
}

#[inline]
pub fn round_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// `(min, max)` over all pixels; `(0, 0)` for an empty map.
pub fn value_range(map: &FloatMap) -> (f32, f32) {
    let mut it = map.as_raw().iter().copied();
    let Some(first) = it.next() else {
        return (0.0, 0.0);
    };
    it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Min/max normalization into `[0, 1]`. A constant map becomes all zeros.
pub fn normalize01(map: &FloatMap) -> FloatMap {
    let (lo, hi) = value_range(map);
    if hi <= lo {
        return FloatMap::new(map.width(), map.height());
    }
    let scale = 1.0 / (hi - lo);
    let data = map.as_raw().iter().map(|&v| (v - lo) * scale).collect();
    float_map_from_vec(map.width(), map.height(), data)
}

/// `a - b`, clamped at zero, as a float map.
pub fn saturating_difference(a: &GrayImage, b: &GrayImage) -> FloatMap {
    FloatMap::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].saturating_sub(b.get_pixel(x, y)[0]) as f32])
    })
}

#[inline]
fn fetch_gray(src: &GrayImage, x: i64, y: i64) -> f32 {
    if x < 0 || y < 0 || x >= src.width() as i64 || y >= src.height() as i64 {
        return 0.0;
    }
    src.get_pixel(x as u32, y as u32)[0] as f32
}

#[inline]
fn fetch_rgb(src: &RgbImage, x: i64, y: i64) -> [f32; 3] {
    if x < 0 || y < 0 || x >= src.width() as i64 || y >= src.height() as i64 {
        return [0.0; 3];
    }
    let p = src.get_pixel(x as u32, y as u32).0;
    [p[0] as f32, p[1] as f32, p[2] as f32]
}

/// Bilinear sample in pixel-index coordinates; pixels outside the image read as 0.
#[inline]
pub fn sample_bilinear(src: &GrayImage, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = fetch_gray(src, x0, y0);
    let p10 = fetch_gray(src, x0 + 1, y0);
    let p01 = fetch_gray(src, x0, y0 + 1);
    let p11 = fetch_gray(src, x0 + 1, y0 + 1);

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Per-channel bilinear sample of an RGB image; outside pixels read as black.
#[inline]
pub fn sample_bilinear_rgb(src: &RgbImage, x: f32, y: f32) -> [f32; 3] {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = fetch_rgb(src, x0, y0);
    let p10 = fetch_rgb(src, x0 + 1, y0);
    let p01 = fetch_rgb(src, x0, y0 + 1);
    let p11 = fetch_rgb(src, x0 + 1, y0 + 1);

    let mut out = [0.0f32; 3];
    for c in 0..3 {
        let a = p00[c] + fx * (p10[c] - p00[c]);
        let b = p01[c] + fx * (p11[c] - p01[c]);
        out[c] = a + fy * (b - a);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normalize01_maps_extremes_to_unit_range() {
        let map = FloatMap::from_fn(4, 1, |x, _| Luma([10.0 + x as f32 * 5.0]));
        let n = normalize01(&map);
        assert_relative_eq!(n.get_pixel(0, 0)[0], 0.0);
        assert_relative_eq!(n.get_pixel(3, 0)[0], 1.0);
        assert_relative_eq!(n.get_pixel(1, 0)[0], 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn normalize01_of_constant_map_is_zero() {
        let map = FloatMap::from_pixel(3, 3, Luma([7.5]));
        assert!(normalize01(&map).as_raw().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn bilinear_interpolates_between_neighbours() {
        let img = GrayImage::from_fn(2, 2, |x, y| Luma([(x * 100 + y * 50) as u8]));
        assert_relative_eq!(sample_bilinear(&img, 0.5, 0.0), 50.0);
        assert_relative_eq!(sample_bilinear(&img, 0.5, 0.5), 75.0);
        assert_relative_eq!(sample_bilinear(&img, 1.0, 1.0), 150.0);
    }

    #[test]
    fn rect_include_grows_to_cover_pixel() {
        let r = PixelRect::new(5, 5, 1, 1).include(8, 2);
        assert_eq!(r, PixelRect::new(5, 2, 4, 4));
        assert!(r.contains(8, 5));
        assert!(!r.contains(9, 5));
    }
}
