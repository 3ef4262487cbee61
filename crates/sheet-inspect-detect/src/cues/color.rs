use super::CueLayer;
use crate::params::{ColorMetric, ColorParams};
use image::Luma;
use sheet_inspect_core::{normalize01, FloatMap, LabPlanes, RoiMask};

/// Chroma deviation between two Lab images (unnormalized, 8-bit units).
///
/// Planes are compared at 8-bit precision so that identical colors give an
/// exact zero.
pub fn chroma_delta(
    template: &LabPlanes,
    candidate: &LabPlanes,
    metric: ColorMetric,
) -> FloatMap {
    let (w, h) = template.dimensions();
    FloatMap::from_fn(w, h, |x, y| {
        let da = (candidate.a.get_pixel(x, y)[0].round() - template.a.get_pixel(x, y)[0].round())
            .abs();
        let db = (candidate.b.get_pixel(x, y)[0].round() - template.b.get_pixel(x, y)[0].round())
            .abs();
        Luma([match metric {
            ColorMetric::MaxAb => da.max(db),
            ColorMetric::L2Ab => (da * da + db * db).sqrt(),
        }])
    })
}

/// Normalized chroma deviation and its percentile mask.
pub fn color_cue(
    template: &LabPlanes,
    candidate: &LabPlanes,
    roi: &RoiMask,
    params: &ColorParams,
) -> CueLayer {
    let map = normalize01(&chroma_delta(template, candidate, params.metric));
    let mask = roi.binarize_percentile(&map, params.percentile);
    CueLayer::new(map, mask)
}
