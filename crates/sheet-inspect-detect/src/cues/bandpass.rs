use crate::params::SimpleModeParams;
use image::{GrayImage, Luma};
use sheet_inspect_core::{gaussian_blur, normalize01, FloatMap};

/// Difference-of-Gaussians of the normalized absolute gray residual.
///
/// Keeps mid-frequency differences and suppresses both pixel noise and
/// slow illumination gradients.
pub fn bandpass_residual(
    template: &GrayImage,
    candidate: &GrayImage,
    params: &SimpleModeParams,
) -> FloatMap {
    let (w, h) = template.dimensions();
    let resid = normalize01(&FloatMap::from_fn(w, h, |x, y| {
        let d = template.get_pixel(x, y)[0] as f32 - candidate.get_pixel(x, y)[0] as f32;
        Luma([d.abs()])
    }));
    let k = params.band_kernel_size.max(3);
    let fine = gaussian_blur(&resid, k, params.band_sigma_fine);
    let coarse = gaussian_blur(&resid, k, params.band_sigma_coarse);
    normalize01(&FloatMap::from_fn(w, h, |x, y| {
        Luma([(fine.get_pixel(x, y)[0] - coarse.get_pixel(x, y)[0]).abs()])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_images_give_zero_band() {
        let img = GrayImage::from_fn(20, 20, |x, y| Luma([(x * 9 + y * 4) as u8]));
        let band = bandpass_residual(&img, &img, &SimpleModeParams::default());
        assert!(band.as_raw().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn speck_response_is_local() {
        let tpl = GrayImage::from_pixel(32, 32, Luma([100]));
        let mut cand = tpl.clone();
        cand.put_pixel(16, 16, Luma([30]));
        let band = bandpass_residual(&tpl, &cand, &SimpleModeParams::default());
        assert!(band.get_pixel(16, 16)[0] > 0.5);
        assert_eq!(band.get_pixel(2, 2)[0], 0.0);
    }
}
