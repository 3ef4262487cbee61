//! Fixed-threshold subtractive detector: dark, bright (yellowing), blue and
//! red deviations.

use super::{CueKind, PreparedFrame};
use crate::params::ClassicParams;
use image::{GrayImage, Luma};
use sheet_inspect_core::{black_hat, mask_and, mask_or, open_close, FloatMap, RoiMask, MASK_ON};

/// Structuring element of the micro-dark black-hat residual.
pub const MICRO_DARK_SE: u32 = 7;

/// Residual threshold for dark specks too small for the plain difference.
pub fn micro_dark_threshold(dark_threshold: f32) -> f32 {
    (dark_threshold * 0.5 + 6.0).clamp(6.0, 20.0)
}

#[derive(Clone, Debug)]
pub struct ClassicMasks {
    pub dark: GrayImage,
    pub bright: GrayImage,
    pub blue: GrayImage,
    pub red: GrayImage,
}

impl ClassicMasks {
    pub fn layers(&self) -> [(CueKind, &GrayImage); 4] {
        [
            (CueKind::Dark, &self.dark),
            (CueKind::Bright, &self.bright),
            (CueKind::Blue, &self.blue),
            (CueKind::Red, &self.red),
        ]
    }

    /// OR of the four masks.
    pub fn union(&self) -> GrayImage {
        mask_or(&mask_or(&self.dark, &self.bright), &mask_or(&self.blue, &self.red))
    }
}

fn above(w: u32, h: u32, thr: f32, f: impl Fn(u32, u32) -> f32) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| Luma([if f(x, y) > thr { MASK_ON } else { 0 }]))
}

fn plane_at(map: &FloatMap, x: u32, y: u32) -> f32 {
    map.get_pixel(x, y)[0].round()
}

/// Compute the four classic masks.
///
/// `template_micro` is the template's 7x7 black-hat, `gate` the gradient
/// gate and `edges` the thinned edge mask suppressing the color cues.
pub fn classic_masks(
    template: &PreparedFrame,
    candidate: &PreparedFrame,
    template_micro: &GrayImage,
    gate: &GrayImage,
    edges: &GrayImage,
    roi: &RoiMask,
    params: &ClassicParams,
) -> ClassicMasks {
    let (w, h) = template.dimensions();
    let roi_img = roi.as_image();

    let (tb, cb) = (&template.blurred, &candidate.blurred);
    let drop = above(w, h, params.dark_threshold, |x, y| {
        tb.get_pixel(x, y)[0] as f32 - cb.get_pixel(x, y)[0] as f32
    });
    let micro_cand = black_hat(cb, MICRO_DARK_SE);
    let micro = above(w, h, micro_dark_threshold(params.dark_threshold), |x, y| {
        micro_cand.get_pixel(x, y)[0] as f32 - template_micro.get_pixel(x, y)[0] as f32
    });
    let dark = mask_or(&mask_and(&drop, gate), &mask_and(&micro, roi_img));

    let edge_free = GrayImage::from_fn(w, h, |x, y| {
        let on = roi_img.get_pixel(x, y)[0] != 0 && edges.get_pixel(x, y)[0] == 0;
        Luma([if on { MASK_ON } else { 0 }])
    });
    let (tl, cl) = (&template.lab, &candidate.lab);
    let bright = above(w, h, params.bright_threshold, |x, y| {
        plane_at(&cl.b, x, y) - plane_at(&tl.b, x, y)
    });
    let blue = above(w, h, params.blue_threshold, |x, y| {
        plane_at(&tl.b, x, y) - plane_at(&cl.b, x, y)
    });
    let red = above(w, h, params.red_threshold, |x, y| {
        plane_at(&cl.a, x, y) - plane_at(&tl.a, x, y)
    });

    let dm = params.dark_morph;
    let bm = params.bright_morph;
    let clean =
        |m: &GrayImage| open_close(&mask_and(m, &edge_free), bm.kernel_size, bm.iterations);
    ClassicMasks {
        dark: open_close(&dark, dm.kernel_size, dm.iterations),
        bright: clean(&bright),
        blue: clean(&blue),
        red: clean(&red),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use sheet_inspect_core::count_nonzero;

    fn frame(img: RgbImage) -> PreparedFrame {
        PreparedFrame::new(img, 5)
    }

    fn with_patch(base: Rgb<u8>, patch: Rgb<u8>) -> RgbImage {
        let mut img = RgbImage::from_pixel(60, 60, base);
        for y in 24..36 {
            for x in 24..36 {
                img.put_pixel(x, y, patch);
            }
        }
        img
    }

    fn run(tpl: &RgbImage, cand: &RgbImage, params: &ClassicParams) -> ClassicMasks {
        let t = frame(tpl.clone());
        let c = frame(cand.clone());
        let roi = RoiMask::full(60, 60);
        let micro = black_hat(&t.blurred, MICRO_DARK_SE);
        let no_edges = GrayImage::new(60, 60);
        classic_masks(&t, &c, &micro, roi.as_image(), &no_edges, &roi, params)
    }

    #[test]
    fn micro_threshold_is_clamped() {
        assert_eq!(micro_dark_threshold(0.0), 6.0);
        assert_eq!(micro_dark_threshold(20.0), 16.0);
        assert_eq!(micro_dark_threshold(100.0), 20.0);
    }

    #[test]
    fn darker_patch_triggers_dark_only() {
        let tpl = RgbImage::from_pixel(60, 60, Rgb([150, 150, 150]));
        let cand = with_patch(Rgb([150, 150, 150]), Rgb([90, 90, 90]));
        let m = run(&tpl, &cand, &ClassicParams::default());
        assert_eq!(m.dark.get_pixel(30, 30)[0], 255);
        assert_eq!(m.dark.get_pixel(5, 5)[0], 0);
        assert_eq!(count_nonzero(&m.bright), 0);
        assert_eq!(count_nonzero(&m.blue), 0);
        assert_eq!(count_nonzero(&m.red), 0);
    }

    #[test]
    fn yellowing_triggers_bright() {
        let tpl = RgbImage::from_pixel(60, 60, Rgb([200, 200, 200]));
        let cand = with_patch(Rgb([200, 200, 200]), Rgb([215, 205, 110]));
        let m = run(&tpl, &cand, &ClassicParams::default());
        assert_eq!(m.bright.get_pixel(30, 30)[0], 255);
        assert_eq!(count_nonzero(&m.blue), 0);
        assert_eq!(m.union().get_pixel(30, 30)[0], 255);
    }

    #[test]
    fn edges_suppress_color_cues() {
        let tpl = RgbImage::from_pixel(60, 60, Rgb([200, 200, 200]));
        let cand = with_patch(Rgb([200, 200, 200]), Rgb([215, 205, 110]));
        let t = frame(tpl);
        let c = frame(cand);
        let roi = RoiMask::full(60, 60);
        let micro = black_hat(&t.blurred, MICRO_DARK_SE);
        let all_edges = GrayImage::from_pixel(60, 60, Luma([255]));
        let params = ClassicParams::default();
        let m = classic_masks(&t, &c, &micro, roi.as_image(), &all_edges, &roi, &params);
        assert_eq!(count_nonzero(&m.bright), 0);
    }
}
