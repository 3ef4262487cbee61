//! Multi-scale structural similarity, reported as dissimilarity.

use crate::params::StructuralParams;
use image::{GrayImage, Luma};
use sheet_inspect_core::{
    downsample_area, float_map_from_gray, gaussian_blur, open_close, resize_bilinear, FloatMap,
    RoiMask,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

const SCALE_FACTORS: [u32; 3] = [1, 2, 4];
const DEN_EPS: f64 = 1e-12;

/// DSSIM map plus the number of pixels whose SSIM denominator vanished.
#[derive(Clone, Debug)]
pub struct StructuralMap {
    pub dssim: FloatMap,
    pub degenerate_pixels: usize,
}

fn product(a: &FloatMap, b: &FloatMap) -> FloatMap {
    FloatMap::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0] * b.get_pixel(x, y)[0]])
    })
}

/// Local Gaussian-window SSIM clipped to `[0, 1]`.
fn ssim_map(
    x: &FloatMap,
    y: &FloatMap,
    ksize: u32,
    sigma: f32,
    c1: f64,
    c2: f64,
) -> (FloatMap, usize) {
    let mu_x = gaussian_blur(x, ksize, sigma);
    let mu_y = gaussian_blur(y, ksize, sigma);
    let xx = gaussian_blur(&product(x, x), ksize, sigma);
    let yy = gaussian_blur(&product(y, y), ksize, sigma);
    let xy = gaussian_blur(&product(x, y), ksize, sigma);

    let mut degenerate = 0usize;
    let data: Vec<f32> = (0..mu_x.len())
        .map(|i| {
            let mx = mu_x.as_raw()[i] as f64;
            let my = mu_y.as_raw()[i] as f64;
            let sx = xx.as_raw()[i] as f64 - mx * mx;
            let sy = yy.as_raw()[i] as f64 - my * my;
            let sxy = xy.as_raw()[i] as f64 - mx * my;
            let num = (2.0 * mx * my + c1) * (2.0 * sxy + c2);
            let den = (mx * mx + my * my + c1) * (sx + sy + c2);
            if den <= DEN_EPS {
                degenerate += 1;
                1.0
            } else {
                (num / den).clamp(0.0, 1.0) as f32
            }
        })
        .collect();
    (
        FloatMap::from_raw(x.width(), x.height(), data)
            .unwrap_or_else(|| FloatMap::new(x.width(), x.height())),
        degenerate,
    )
}

/// `1 - MS-SSIM` between two gray images, at the input resolution.
///
/// Scales are full, half and quarter resolution (area averaging). Each
/// per-scale `1 - SSIM` map is upsampled bilinearly and combined with
/// `scale_weights` normalized by their sum, so perfectly matching pixels
/// stay at exactly zero.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(width = template.width(), height = template.height()))
)]
pub fn ms_ssim_dissimilarity(
    template: &GrayImage,
    candidate: &GrayImage,
    params: &StructuralParams,
) -> StructuralMap {
    let (w, h) = template.dimensions();
    let x0 = float_map_from_gray(template);
    let y0 = float_map_from_gray(candidate);
    let c1 = (params.k1 as f64 * 255.0).powi(2);
    let c2 = (params.k2 as f64 * 255.0).powi(2);

    let mut acc = vec![0.0f32; (w * h) as usize];
    let mut wsum = 0.0f32;
    let mut degenerate_pixels = 0usize;
    for (i, &factor) in SCALE_FACTORS.iter().enumerate() {
        let weight = params.scale_weights[i];
        if weight <= 0.0 {
            continue;
        }
        let (xs, ys) = if factor == 1 {
            (x0.clone(), y0.clone())
        } else {
            (downsample_area(&x0, factor), downsample_area(&y0, factor))
        };
        let (ssim, degenerate) = ssim_map(
            &xs,
            &ys,
            params.kernel_sizes[i],
            params.sigmas[i],
            c1,
            c2,
        );
        degenerate_pixels += degenerate;
        let mut dssim = ssim;
        for v in dssim.iter_mut() {
            *v = 1.0 - *v;
        }
        let up = if factor == 1 {
            dssim
        } else {
            resize_bilinear(&dssim, w, h)
        };
        for (a, v) in acc.iter_mut().zip(up.as_raw()) {
            *a += weight * v;
        }
        wsum += weight;
    }

    if degenerate_pixels > 0 {
        log::debug!("ms-ssim: {degenerate_pixels} degenerate pixels scored as similar");
    }
    let wsum = wsum.max(1e-8);
    let dssim: Vec<f32> = acc
        .into_iter()
        .map(|a| (a / wsum).clamp(0.0, 1.0))
        .collect();
    StructuralMap {
        dssim: FloatMap::from_raw(w, h, dssim).unwrap_or_else(|| FloatMap::new(w, h)),
        degenerate_pixels,
    }
}

/// Structural cue: DSSIM map, its raw percentile mask and the cleaned mask
/// used for fusion.
pub fn structural_cue(
    template: &GrayImage,
    candidate: &GrayImage,
    roi: &RoiMask,
    params: &StructuralParams,
) -> (StructuralMap, GrayImage, GrayImage) {
    let map = ms_ssim_dissimilarity(template, candidate, params);
    let raw = roi.binarize_percentile(&map.dssim, params.percentile);
    let cleaned = open_close(&raw, params.morph.kernel_size, params.morph.iterations);
    (map, raw, cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sheet_inspect_core::count_nonzero;

    fn textured(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 7 + y * 13) % 97 + 60) as u8]))
    }

    #[test]
    fn identical_images_have_zero_dissimilarity() {
        let img = textured(48, 40);
        let out = ms_ssim_dissimilarity(&img, &img, &StructuralParams::default());
        assert!(out.dssim.as_raw().iter().all(|&v| v == 0.0));
        assert_eq!(out.degenerate_pixels, 0);
    }

    #[test]
    fn local_change_peaks_at_the_change() {
        let tpl = textured(64, 64);
        let mut cand = tpl.clone();
        for y in 30..36 {
            for x in 30..36 {
                cand.put_pixel(x, y, Luma([10]));
            }
        }
        let out = ms_ssim_dissimilarity(&tpl, &cand, &StructuralParams::default());
        let at = out.dssim.get_pixel(32, 32)[0];
        let far = out.dssim.get_pixel(5, 5)[0];
        assert!(at > 0.3, "dssim at change {at}");
        assert_abs_diff_eq!(far, 0.0, epsilon = 1e-3);

        let roi = RoiMask::full(64, 64);
        let (_, raw, _) = structural_cue(&tpl, &cand, &roi, &StructuralParams::default());
        assert!(count_nonzero(&raw) > 0);
        assert!(raw.get_pixel(5, 5)[0] == 0);
    }

    #[test]
    fn zero_constants_on_black_images_are_degenerate() {
        let black = GrayImage::new(16, 16);
        let params = StructuralParams {
            k1: 0.0,
            k2: 0.0,
            ..StructuralParams::default()
        };
        let out = ms_ssim_dissimilarity(&black, &black, &params);
        assert!(out.degenerate_pixels > 0);
        assert!(out.dssim.as_raw().iter().all(|&v| v.abs() < 1e-5));
    }
}
