//! Independent anomaly cues computed on a template/candidate pair.
//!
//! Every extractor takes the two [`PreparedFrame`]s (ROI-masked, cropped to
//! the ROI window) and returns maps and masks of the window size.

mod bandpass;
mod classic;
mod color;
mod gradient;
mod morph;
mod structural;

pub use bandpass::bandpass_residual;
pub use classic::{classic_masks, micro_dark_threshold, ClassicMasks, MICRO_DARK_SE};
pub use color::{chroma_delta, color_cue};
pub use gradient::{edge_mask, gradient_gate, GRADIENT_SE};
pub use morph::{black_hat_cue, top_hat_cue, MorphResiduals};
pub use structural::{ms_ssim_dissimilarity, structural_cue, StructuralMap};

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use sheet_inspect_core::{gaussian_blur_gray, gray_bt601, FloatMap, LabPlanes};

/// Source of a detected region, in tie-break order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueKind {
    Structural,
    TopHat,
    BlackHat,
    Color,
    Bandpass,
    Dark,
    Bright,
    Blue,
    Red,
    /// Weighted or simple-mode fused score.
    Fused,
}

/// A cue's continuous score map (if it has one) and its binary mask.
#[derive(Clone, Debug)]
pub struct CueLayer {
    pub map: Option<FloatMap>,
    pub mask: GrayImage,
}

impl CueLayer {
    pub fn new(map: FloatMap, mask: GrayImage) -> Self {
        Self {
            map: Some(map),
            mask,
        }
    }

    pub fn mask_only(mask: GrayImage) -> Self {
        Self { map: None, mask }
    }
}

/// Gray, blurred gray and Lab views of one ROI-masked image.
#[derive(Clone, Debug)]
pub struct PreparedFrame {
    pub rgb: RgbImage,
    /// Unblurred BT.601 gray.
    pub gray: GrayImage,
    /// Gaussian-blurred gray, the input of every intensity cue.
    pub blurred: GrayImage,
    pub lab: LabPlanes,
}

impl PreparedFrame {
    pub fn new(rgb: RgbImage, blur_kernel_size: u32) -> Self {
        let gray = gray_bt601(&rgb);
        let blurred = gaussian_blur_gray(&gray, blur_kernel_size, 0.0);
        let lab = LabPlanes::from_rgb(&rgb);
        Self {
            rgb,
            gray,
            blurred,
            lab,
        }
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }
}
