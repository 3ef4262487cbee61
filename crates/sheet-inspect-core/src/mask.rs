//! Binary masks and the region of interest they restrict processing to.
//!
//! Masks are 8-bit images holding 0 (background) or 255 (foreground).

use crate::morphology::erode;
use crate::raster::{crop_window, FloatMap, PixelRect};
use image::{GrayImage, Luma, Rgb, RgbImage};

pub const MASK_ON: u8 = 255;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MaskError {
    #[error("region of interest has no foreground pixels")]
    Empty,
}

/// Number of non-zero pixels.
pub fn count_nonzero(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v != 0).count()
}

fn zip_masks(a: &GrayImage, b: &GrayImage, f: impl Fn(bool, bool) -> bool) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let on = f(a.get_pixel(x, y)[0] != 0, b.get_pixel(x, y)[0] != 0);
        Luma([if on { MASK_ON } else { 0 }])
    })
}

pub fn mask_or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    zip_masks(a, b, |p, q| p || q)
}

pub fn mask_and(a: &GrayImage, b: &GrayImage) -> GrayImage {
    zip_masks(a, b, |p, q| p && q)
}

/// Pixels set in `a` and clear in `b`.
pub fn mask_and_not(a: &GrayImage, b: &GrayImage) -> GrayImage {
    zip_masks(a, b, |p, q| p && !q)
}

pub fn mask_not(a: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([if a.get_pixel(x, y)[0] == 0 { MASK_ON } else { 0 }])
    })
}

/// Union of any number of equally sized masks; `None` for an empty slice.
pub fn union_all<'a>(masks: impl IntoIterator<Item = &'a GrayImage>) -> Option<GrayImage> {
    let mut it = masks.into_iter();
    let first = it.next()?.clone();
    Some(it.fold(first, |acc, m| mask_or(&acc, m)))
}

/// Linear-interpolated percentile (`pct` in `[0, 100]`) of a non-empty sample.
///
/// Sorts `values` in place. Returns `0.0` for an empty slice.
pub fn percentile(values: &mut [f32], pct: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(f32::total_cmp);
    let n = values.len();
    let rank = (pct.clamp(0.0, 100.0) as f64 / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let t = (rank - lo as f64) as f32;
    values[lo] + (values[hi] - values[lo]) * t
}

/// Foreground region of a template, validated non-empty.
#[derive(Clone, Debug)]
pub struct RoiMask {
    mask: GrayImage,
    count: usize,
    bbox: PixelRect,
}

impl RoiMask {
    /// Binarize `mask` (any non-zero value is foreground).
    pub fn from_gray(mask: &GrayImage) -> Result<Self, MaskError> {
        let mut count = 0usize;
        let mut bbox: Option<PixelRect> = None;
        let bin = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
            if mask.get_pixel(x, y)[0] != 0 {
                count += 1;
                bbox = Some(match bbox {
                    Some(r) => r.include(x, y),
                    None => PixelRect::new(x, y, 1, 1),
                });
                Luma([MASK_ON])
            } else {
                Luma([0])
            }
        });
        let bbox = bbox.ok_or(MaskError::Empty)?;
        Ok(Self {
            mask: bin,
            count,
            bbox,
        })
    }

    /// ROI covering the whole `width x height` frame.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            mask: GrayImage::from_pixel(width, height, Luma([MASK_ON])),
            count: width as usize * height as usize,
            bbox: PixelRect::full(width, height),
        }
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    #[inline]
    pub fn as_image(&self) -> &GrayImage {
        &self.mask
    }

    /// Number of foreground pixels, always `>= 1`.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn bounding_box(&self) -> PixelRect {
        self.bbox
    }

    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.mask.get_pixel(x, y)[0] != 0
    }

    /// Erode by a square of side `size`; `Err` if nothing survives.
    pub fn eroded(&self, size: u32) -> Result<Self, MaskError> {
        Self::from_gray(&erode(&self.mask, size))
    }

    pub fn crop(&self, rect: PixelRect) -> Result<Self, MaskError> {
        Self::from_gray(&crop_window(&self.mask, rect))
    }

    /// Values of `map` at foreground pixels, in raster order.
    pub fn values(&self, map: &FloatMap) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.count);
        for (m, v) in self.mask.as_raw().iter().zip(map.as_raw()) {
            if *m != 0 {
                out.push(*v);
            }
        }
        out
    }

    /// Mean of an 8-bit image over the foreground.
    pub fn mean(&self, img: &GrayImage) -> f64 {
        let sum: u64 = self
            .mask
            .as_raw()
            .iter()
            .zip(img.as_raw())
            .filter(|(m, _)| **m != 0)
            .map(|(_, v)| *v as u64)
            .sum();
        sum as f64 / self.count as f64
    }

    /// Percentile binarization restricted to the ROI.
    ///
    /// A pixel is set when its value is at or above the ROI percentile and
    /// strictly above the ROI minimum, so a flat map yields an empty mask.
    pub fn binarize_percentile(&self, map: &FloatMap, pct: f32) -> GrayImage {
        let mut values = self.values(map);
        let floor = values.iter().copied().fold(f32::INFINITY, f32::min);
        let thr = percentile(&mut values, pct);
        let (w, h) = self.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            let v = map.get_pixel(x, y)[0];
            let on = self.contains(x, y) && v >= thr && v > floor;
            Luma([if on { MASK_ON } else { 0 }])
        })
    }

    /// Strict threshold `map > thr` restricted to the ROI.
    pub fn threshold_above(&self, map: &FloatMap, thr: f32) -> GrayImage {
        let (w, h) = self.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            let on = self.contains(x, y) && map.get_pixel(x, y)[0] > thr;
            Luma([if on { MASK_ON } else { 0 }])
        })
    }

    /// Clear every mask pixel outside the ROI.
    pub fn restrict(&self, mask: &GrayImage) -> GrayImage {
        mask_and(mask, &self.mask)
    }

    /// Black out RGB pixels outside the ROI.
    pub fn apply_rgb(&self, img: &RgbImage) -> RgbImage {
        RgbImage::from_fn(img.width(), img.height(), |x, y| {
            if self.contains(x, y) {
                *img.get_pixel(x, y)
            } else {
                Rgb([0, 0, 0])
            }
        })
    }
}
