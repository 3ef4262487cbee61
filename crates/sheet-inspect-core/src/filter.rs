//! Gaussian smoothing and resampling for float maps.
//!
//! Convolution and bilinear resampling go through `imageproc` and
//! `image::imageops`; both replicate the edge pixel past the border, so flat
//! regions stay flat up to the image edge.

use crate::raster::{float_map_from_gray, float_map_from_vec, gray_from_float_map, FloatMap};
use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::filter::separable_filter_equal;

/// Coerce a kernel size to an odd value `>= 1` (even sizes grow by one).
#[inline]
pub fn odd_kernel_size(k: u32) -> u32 {
    let k = k.max(1);
    if k % 2 == 0 {
        k + 1
    } else {
        k
    }
}

/// Normalized 1-D Gaussian weights of length `odd_kernel_size(ksize)`.
///
/// A non-positive `sigma` is derived from the size as
/// `0.3 * ((ksize - 1) / 2 - 1) + 0.8`.
pub fn gaussian_kernel(ksize: u32, sigma: f32) -> Vec<f32> {
    let k = odd_kernel_size(ksize) as i64;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let r = k / 2;
    let denom = 2.0 * sigma * sigma;
    let mut w: Vec<f32> = (-r..=r)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = w.iter().sum();
    if sum > 0.0 {
        for v in &mut w {
            *v /= sum;
        }
    }
    w
}

/// Correlate rows then columns with the same 1-D kernel.
pub fn separable_filter(map: &FloatMap, kernel: &[f32]) -> FloatMap {
    let (w, h) = map.dimensions();
    if w == 0 || h == 0 || kernel.len() <= 1 {
        return map.clone();
    }
    separable_filter_equal(map, kernel)
}

pub fn gaussian_blur(map: &FloatMap, ksize: u32, sigma: f32) -> FloatMap {
    separable_filter(map, &gaussian_kernel(ksize, sigma))
}

/// Gaussian blur of an 8-bit image, rounded back to 8 bits.
pub fn gaussian_blur_gray(img: &GrayImage, ksize: u32, sigma: f32) -> GrayImage {
    gray_from_float_map(&gaussian_blur(&float_map_from_gray(img), ksize, sigma))
}

/// Shrink by an integer `factor` averaging each `factor x factor` block.
///
/// The output is `max(1, dim / factor)` on each axis; trailing rows and
/// columns that do not fill a block are folded into the last block.
pub fn downsample_area(map: &FloatMap, factor: u32) -> FloatMap {
    let (w, h) = map.dimensions();
    if factor <= 1 || w == 0 || h == 0 {
        return map.clone();
    }
    let ow = (w / factor).max(1);
    let oh = (h / factor).max(1);
    let mut out = Vec::with_capacity((ow * oh) as usize);
    for oy in 0..oh {
        let y0 = oy * factor;
        let y1 = if oy + 1 == oh { h } else { (y0 + factor).min(h) };
        for ox in 0..ow {
            let x0 = ox * factor;
            let x1 = if ox + 1 == ow { w } else { (x0 + factor).min(w) };
            let mut acc = 0.0f64;
            for y in y0..y1 {
                for x in x0..x1 {
                    acc += map.get_pixel(x, y)[0] as f64;
                }
            }
            let n = ((y1 - y0) * (x1 - x0)).max(1) as f64;
            out.push((acc / n) as f32);
        }
    }
    float_map_from_vec(ow, oh, out)
}

/// Bilinear resize with pixel-center alignment.
///
/// Samples are clamped to `[0, 1]`, the float range of `image`; callers
/// resample normalized maps only.
pub fn resize_bilinear(map: &FloatMap, out_w: u32, out_h: u32) -> FloatMap {
    let (w, h) = map.dimensions();
    if (w, h) == (out_w, out_h) {
        return map.clone();
    }
    if w == 0 || h == 0 || out_w == 0 || out_h == 0 {
        return FloatMap::new(out_w, out_h);
    }
    imageops::resize(map, out_w, out_h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Luma;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel(5, 0.0);
        assert_eq!(k.len(), 5);
        assert_relative_eq!(k.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(k[0], k[4]);
        assert!(k[2] > k[1] && k[1] > k[0]);
    }

    #[test]
    fn even_sizes_are_bumped_to_odd() {
        assert_eq!(odd_kernel_size(0), 1);
        assert_eq!(odd_kernel_size(4), 5);
        assert_eq!(odd_kernel_size(9), 9);
    }

    #[test]
    fn blur_preserves_constant_maps() {
        let map = FloatMap::from_pixel(6, 4, Luma([42.0]));
        let out = gaussian_blur(&map, 7, 1.5);
        for v in out.as_raw() {
            assert_relative_eq!(*v, 42.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn area_downsample_averages_blocks() {
        let map = FloatMap::from_fn(4, 2, |x, _| Luma([x as f32]));
        let d = downsample_area(&map, 2);
        assert_eq!(d.dimensions(), (2, 1));
        assert_relative_eq!(d.get_pixel(0, 0)[0], 0.5);
        assert_relative_eq!(d.get_pixel(1, 0)[0], 2.5);
    }

    #[test]
    fn blur_spreads_an_impulse_symmetrically() {
        let mut map = FloatMap::new(9, 9);
        map.put_pixel(4, 4, Luma([1.0]));
        let out = gaussian_blur(&map, 5, 1.0);
        let k = gaussian_kernel(5, 1.0);
        assert_relative_eq!(out.get_pixel(4, 4)[0], k[2] * k[2], epsilon = 1e-6);
        assert_relative_eq!(out.get_pixel(3, 4)[0], out.get_pixel(5, 4)[0], epsilon = 1e-7);
        assert_relative_eq!(out.get_pixel(4, 2)[0], out.get_pixel(2, 4)[0], epsilon = 1e-7);
        assert_eq!(out.get_pixel(0, 0)[0], 0.0);
        assert_relative_eq!(out.as_raw().iter().sum::<f32>(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn blur_replicates_the_edge() {
        let map = FloatMap::from_fn(8, 3, |x, _| Luma([if x == 0 { 1.0 } else { 0.0 }]));
        let out = gaussian_blur(&map, 3, 1.0);
        let k = gaussian_kernel(3, 1.0);
        assert_relative_eq!(out.get_pixel(0, 1)[0], k[0] + k[1], epsilon = 1e-6);
    }

    #[test]
    fn bilinear_upsample_is_monotonic_and_bounded() {
        let map = FloatMap::from_fn(2, 2, |x, y| Luma([(x + 2 * y) as f32 / 3.0]));
        let up = resize_bilinear(&map, 8, 8);
        assert_eq!(up.dimensions(), (8, 8));
        assert_relative_eq!(up.get_pixel(0, 0)[0], 0.0);
        assert_relative_eq!(up.get_pixel(7, 7)[0], 1.0, epsilon = 1e-6);
        for y in 0..8 {
            for x in 1..8 {
                assert!(up.get_pixel(x, y)[0] >= up.get_pixel(x - 1, y)[0]);
            }
        }
    }

    #[test]
    fn resampling_zeros_stays_exactly_zero() {
        let up = resize_bilinear(&FloatMap::new(5, 3), 17, 11);
        assert!(up.as_raw().iter().all(|&v| v == 0.0));
    }
}
