use super::CueLayer;
use image::{GrayImage, Luma};
use imageproc::edges::canny;
use sheet_inspect_core::{erode, mask_or, morphological_gradient, FloatMap, RoiMask};

/// Side of the square used for the morphological gradient.
pub const GRADIENT_SE: u32 = 5;

/// Pixels with enough local contrast for a dark difference to count.
///
/// The map is the 5x5 morphological gradient scaled to `[0, 1]`. A
/// non-positive threshold disables the gate (the mask covers the ROI).
pub fn gradient_gate(candidate: &GrayImage, roi: &RoiMask, threshold: f32) -> CueLayer {
    let grad = morphological_gradient(candidate, GRADIENT_SE);
    let map = FloatMap::from_fn(grad.width(), grad.height(), |x, y| {
        Luma([grad.get_pixel(x, y)[0] as f32 / 255.0])
    });
    let mask = if threshold <= 0.0 {
        roi.as_image().clone()
    } else {
        roi.threshold_above(&map, threshold / 255.0)
    };
    CueLayer::new(map, mask)
}

/// Canny edges of the template (cached) OR the candidate, thinned by a 3x3
/// erosion.
pub fn edge_mask(
    template_edges: &GrayImage,
    candidate: &GrayImage,
    low: f32,
    high: f32,
) -> GrayImage {
    let cand = canny(candidate, low, high);
    erode(&mask_or(template_edges, &cand), 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheet_inspect_core::count_nonzero;

    fn step() -> GrayImage {
        GrayImage::from_fn(30, 30, |x, _| Luma([if x < 15 { 50 } else { 150 }]))
    }

    #[test]
    fn gate_follows_contrast() {
        let roi = RoiMask::full(30, 30);
        let gate = gradient_gate(&step(), &roi, 10.0);
        assert_eq!(gate.mask.get_pixel(15, 10)[0], 255);
        assert_eq!(gate.mask.get_pixel(3, 10)[0], 0);
        let map = gate.map.unwrap();
        approx::assert_abs_diff_eq!(map.get_pixel(14, 10)[0], 100.0 / 255.0, epsilon = 1e-6);
    }

    #[test]
    fn non_positive_threshold_opens_the_gate() {
        let roi = RoiMask::full(30, 30);
        let gate = gradient_gate(&GrayImage::from_pixel(30, 30, Luma([80])), &roi, 0.0);
        assert_eq!(count_nonzero(&gate.mask), 900);
    }

    #[test]
    fn flat_images_have_no_edges() {
        let flat = GrayImage::from_pixel(30, 30, Luma([80]));
        let tpl_edges = canny(&flat, 60.0, 180.0);
        assert_eq!(count_nonzero(&edge_mask(&tpl_edges, &flat, 60.0, 180.0)), 0);
    }
}
