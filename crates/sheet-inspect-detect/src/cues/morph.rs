use super::CueLayer;
use crate::params::MorphMapParams;
use image::GrayImage;
use sheet_inspect_core::{black_hat, normalize01, saturating_difference, top_hat, RoiMask};

/// Template-side residuals, computed once per template.
#[derive(Clone, Debug)]
pub struct MorphResiduals {
    pub top_hat: GrayImage,
    pub black_hat: GrayImage,
}

impl MorphResiduals {
    pub fn new(blurred: &GrayImage, params: &MorphMapParams) -> Self {
        Self {
            top_hat: top_hat(blurred, params.se_top),
            black_hat: black_hat(blurred, params.se_black),
        }
    }
}

fn residual_cue(
    candidate: &GrayImage,
    template: &GrayImage,
    roi: &RoiMask,
    pct: f32,
) -> CueLayer {
    let map = normalize01(&saturating_difference(candidate, template));
    let mask = roi.binarize_percentile(&map, pct);
    CueLayer::new(map, mask)
}

/// Small bright structures present in the candidate but not the template.
pub fn top_hat_cue(
    candidate: &GrayImage,
    template: &MorphResiduals,
    roi: &RoiMask,
    params: &MorphMapParams,
) -> CueLayer {
    let cand = top_hat(candidate, params.se_top);
    residual_cue(&cand, &template.top_hat, roi, params.top_percentile)
}

/// Small dark structures present in the candidate but not the template.
pub fn black_hat_cue(
    candidate: &GrayImage,
    template: &MorphResiduals,
    roi: &RoiMask,
    params: &MorphMapParams,
) -> CueLayer {
    let cand = black_hat(candidate, params.se_black);
    residual_cue(&cand, &template.black_hat, roi, params.black_percentile)
}
