//! Global photometric correction of the candidate towards the template.

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use sheet_inspect_core::{FloatMap, LabPlanes, RoiMask};

const STD_EPS: f64 = 1e-6;

/// Per-channel Lab gain and bias applied to the candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhotometricCorrection {
    /// `[L, a, b]` gains.
    pub gain: [f32; 3],
    /// `[L, a, b]` offsets in 8-bit Lab units.
    pub bias: [f32; 3],
    /// Absolute ROI gray-mean difference that triggered the correction.
    pub luminance_delta: f32,
}

/// Absolute difference of the ROI gray means.
pub fn luminance_delta(
    template_gray: &GrayImage,
    candidate_gray: &GrayImage,
    roi: &RoiMask,
) -> f32 {
    (roi.mean(template_gray) - roi.mean(candidate_gray)).abs() as f32
}

fn channel_stats(plane: &FloatMap, roi: &RoiMask) -> (f64, f64) {
    let values = roi.values(plane);
    let n = values.len().max(1) as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, var.sqrt())
}

/// Match the candidate's per-channel Lab mean and standard deviation over the
/// ROI to the template's.
///
/// Every pixel is mapped as `gain * v + bias`, clipped to `[0, 255]` and
/// converted back to RGB.
pub fn normalize_to_template(
    template: &LabPlanes,
    candidate: &RgbImage,
    roi: &RoiMask,
    luminance_delta: f32,
) -> (RgbImage, PhotometricCorrection) {
    let mut lab = LabPlanes::from_rgb(candidate);
    let mut gain = [1.0f32; 3];
    let mut bias = [0.0f32; 3];

    for (c, (tpl, cand)) in template
        .planes()
        .into_iter()
        .zip(lab.planes_mut())
        .enumerate()
    {
        let (mt, st) = channel_stats(tpl, roi);
        let (mi, si) = channel_stats(cand, roi);
        let g = st / (si + STD_EPS);
        let b = mt - g * mi;
        gain[c] = g as f32;
        bias[c] = b as f32;
        for v in cand.iter_mut() {
            *v = (gain[c] * *v + bias[c]).clamp(0.0, 255.0);
        }
    }

    (
        lab.to_rgb(),
        PhotometricCorrection {
            gain,
            bias,
            luminance_delta,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use sheet_inspect_core::gray_bt601;

    fn gradient(offset: i32) -> RgbImage {
        RgbImage::from_fn(64, 48, |x, y| {
            let v = (60 + x as i32 + y as i32 + offset).clamp(0, 255) as u8;
            Rgb([v, v.saturating_add(10), v.saturating_sub(5)])
        })
    }

    #[test]
    fn brightness_shift_is_mostly_removed() {
        let tpl = gradient(0);
        let cand = gradient(25);
        let roi = RoiMask::full(64, 48);
        let tpl_gray = gray_bt601(&tpl);
        let before = luminance_delta(&tpl_gray, &gray_bt601(&cand), &roi);
        assert!(before > 20.0);

        let (out, corr) = normalize_to_template(&LabPlanes::from_rgb(&tpl), &cand, &roi, before);
        let after = luminance_delta(&tpl_gray, &gray_bt601(&out), &roi);
        assert!(after < 2.0, "residual delta {after}");
        assert_eq!(corr.luminance_delta, before);
        assert!(corr.bias[0] < 0.0);
    }

    #[test]
    fn identical_images_get_unit_gain() {
        let tpl = gradient(0);
        let roi = RoiMask::full(64, 48);
        let (_, corr) = normalize_to_template(&LabPlanes::from_rgb(&tpl), &tpl, &roi, 0.0);
        for c in 0..3 {
            approx::assert_abs_diff_eq!(corr.gain[c], 1.0, epsilon = 1e-3);
            approx::assert_abs_diff_eq!(corr.bias[c], 0.0, epsilon = 0.2);
        }
    }
}
