//! Combining cue outputs into a single decision mask.

use crate::cues::CueLayer;
use crate::params::{SimpleModeParams, WeightedFusionParams};
use image::{GrayImage, RgbImage};
use sheet_inspect_core::{dilate, normalize01, union_all, value_channel, FloatMap, RoiMask};

/// OR of every mask; an empty mask of `dims` when there is none.
pub fn fuse_union<'a>(
    masks: impl IntoIterator<Item = &'a GrayImage>,
    dims: (u32, u32),
) -> GrayImage {
    union_all(masks).unwrap_or_else(|| GrayImage::new(dims.0, dims.1))
}

/// `sum(w_i * map_i)`, renormalized to `[0, 1]`. Terms with zero weight are
/// skipped; `None` when no term remains.
pub fn weighted_score(terms: &[(f32, &FloatMap)]) -> Option<FloatMap> {
    let mut active = terms.iter().filter(|(w, _)| *w > 0.0);
    let (w0, first) = active.next()?;
    let mut acc: Vec<f32> = first.as_raw().iter().map(|v| w0 * v).collect();
    for (w, map) in active {
        for (a, v) in acc.iter_mut().zip(map.as_raw()) {
            *a += w * v;
        }
    }
    let sum = FloatMap::from_raw(first.width(), first.height(), acc)?;
    Some(normalize01(&sum))
}

/// Weighted fusion of the advanced cue maps, binarized once.
pub fn fuse_weighted(
    structural: Option<&FloatMap>,
    top_hat: Option<&FloatMap>,
    black_hat: Option<&FloatMap>,
    color: Option<&FloatMap>,
    roi: &RoiMask,
    params: &WeightedFusionParams,
) -> Option<CueLayer> {
    let mut terms = Vec::with_capacity(4);
    for (w, map) in [
        (params.structural, structural),
        (params.top_hat, top_hat),
        (params.black_hat, black_hat),
        (params.color, color),
    ] {
        if let Some(map) = map {
            terms.push((w, map));
        }
    }
    let score = weighted_score(&terms)?;
    let mask = roi.binarize_percentile(&score, params.percentile);
    Some(CueLayer::new(score, mask))
}

/// Simple-mode score `a * dssim + b * color + c * band`, normalized and
/// percentile-binarized.
pub fn simple_score(
    dssim: &FloatMap,
    color: &FloatMap,
    band: &FloatMap,
    roi: &RoiMask,
    params: &SimpleModeParams,
) -> CueLayer {
    let (w, h) = dssim.dimensions();
    let score = weighted_score(&[
        (params.structural_weight, dssim),
        (params.color_weight, color),
        (params.bandpass_weight, band),
    ])
    .unwrap_or_else(|| FloatMap::new(w, h));
    let mask = roi.binarize_percentile(&score, params.percentile);
    CueLayer::new(score, mask)
}

/// Saturated pixels (`max(R, G, B) > level`) inside the ROI, grown by 3x3.
pub fn overexposure_mask(candidate: &RgbImage, level: u8, roi: &RoiMask) -> GrayImage {
    let value = value_channel(candidate);
    let hot = roi.threshold_above(
        &FloatMap::from_fn(value.width(), value.height(), |x, y| {
            image::Luma([value.get_pixel(x, y)[0] as f32])
        }),
        level as f32,
    );
    dilate(&hot, 3)
}
