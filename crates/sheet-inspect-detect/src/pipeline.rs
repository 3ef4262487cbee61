//! The inspection session: template model, per-frame pipeline and result
//! assembly.

use crate::contours::{clean_and_extract_within, LabelImage, Region};
use crate::cues::{
    bandpass_residual, black_hat_cue, chroma_delta, classic_masks, color_cue, edge_mask,
    gradient_gate, ms_ssim_dissimilarity, structural_cue, top_hat_cue, ClassicMasks, CueKind,
    CueLayer, MorphResiduals, PreparedFrame, MICRO_DARK_SE,
};
use crate::error::InspectError;
use crate::fusion::{fuse_union, fuse_weighted, overexposure_mask, simple_score};
use crate::normalize::{luminance_delta, normalize_to_template};
use crate::params::{ColorMetric, FusionMode, InspectionMode, InspectionParams, MorphParams};
use crate::result::{CueDiagnostics, Defect, InspectionResult};
use image::{imageops, GrayImage, RgbImage};
use imageproc::edges::canny;
use nalgebra::Point2;
use sheet_inspect_align::{FeatureAligner, FeatureSet, Registration};
use sheet_inspect_core::{
    black_hat, crop_window, gray_bt601, mask_and, mask_and_not, normalize01, Homography,
    PixelRect, RoiMask,
};
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Everything derived from the template once per session.
#[derive(Debug)]
struct TemplateModel {
    dims: (u32, u32),
    /// ROI bounding box (or the full frame) the pipeline runs in.
    window: PixelRect,
    roi: RoiMask,
    /// ROI eroded away from its border.
    safe_roi: RoiMask,
    frame: PreparedFrame,
    residuals: MorphResiduals,
    micro_black_hat: GrayImage,
    edges: GrayImage,
    features: FeatureSet,
}

/// Binary decision of one pipeline mode plus the cue masks used to label
/// regions, in tie-break order.
struct Decision {
    mask: GrayImage,
    layers: Vec<(CueKind, GrayImage)>,
    cleanup: MorphParams,
}

/// A reusable inspection session bound to one template, ROI and parameter
/// set.
///
/// Construction validates the ROI and precomputes the template side of every
/// cue; [`Inspector::inspect`] only processes the captured image. The
/// inspector is immutable and can be shared between threads.
pub struct Inspector {
    params: InspectionParams,
    aligner: FeatureAligner,
    model: TemplateModel,
}

impl Inspector {
    /// Build a session. Parameters are sanitized first.
    ///
    /// Fails with [`InspectError::DimensionMismatch`] when the ROI mask and
    /// template differ in size, and [`InspectError::EmptyRoi`] when the mask
    /// has no foreground.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = template.width(), height = template.height()))
    )]
    pub fn new(
        template: &RgbImage,
        roi_mask: &GrayImage,
        params: InspectionParams,
    ) -> Result<Self, InspectError> {
        if template.dimensions() != roi_mask.dimensions() {
            return Err(InspectError::DimensionMismatch {
                template: template.dimensions(),
                mask: roi_mask.dimensions(),
            });
        }
        let params = params.sanitized();
        let (w, h) = template.dimensions();
        let full_roi = RoiMask::from_gray(roi_mask)?;
        let window = if params.crop_to_roi {
            full_roi.bounding_box()
        } else {
            PixelRect::full(w, h)
        };
        let roi = full_roi.crop(window)?;
        let safe_roi = match roi.eroded(params.roi_erode_size) {
            Ok(r) => r,
            Err(_) => {
                log::warn!(
                    "ROI vanishes under a {0}x{0} erosion, using it uneroded",
                    params.roi_erode_size
                );
                roi.clone()
            }
        };

        let frame = PreparedFrame::new(
            roi.apply_rgb(&crop_window(template, window)),
            params.blur_kernel_size,
        );
        let residuals = MorphResiduals::new(&frame.blurred, &params.morph_maps);
        let micro_black_hat = black_hat(&frame.blurred, MICRO_DARK_SE);
        let edges = canny(
            &frame.blurred,
            params.classic.edge_low,
            params.classic.edge_high,
        );

        let aligner = FeatureAligner::new(params.align.clone());
        let features = if params.align.enabled {
            aligner.features(template)
        } else {
            FeatureSet::default()
        };
        log::debug!(
            "template model: window {:?}, roi {} px, safe roi {} px, {} features",
            window,
            roi.count(),
            safe_roi.count(),
            features.len()
        );

        Ok(Self {
            params,
            aligner,
            model: TemplateModel {
                dims: (w, h),
                window,
                roi,
                safe_roi,
                frame,
                residuals,
                micro_black_hat,
                edges,
                features,
            },
        })
    }

    #[inline]
    pub fn params(&self) -> &InspectionParams {
        &self.params
    }

    /// Region of the template the pipeline works in.
    #[inline]
    pub fn window(&self) -> PixelRect {
        self.model.window
    }

    /// Inspect one captured image.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = captured.width(), height = captured.height()))
    )]
    pub fn inspect(&self, captured: &RgbImage) -> Result<InspectionResult, InspectError> {
        let t0 = Instant::now();
        let p = &self.params;
        let m = &self.model;

        let alignment = self
            .aligner
            .align_or_identity(captured, &m.features, m.dims);
        let t_align = t0.elapsed();

        let mut cand_rgb = m.roi.apply_rgb(&crop_window(&alignment.image, m.window));
        let mut correction = None;
        if p.normalize.enabled {
            let delta = luminance_delta(&m.frame.gray, &gray_bt601(&cand_rgb), &m.roi);
            if delta > p.normalize.min_luminance_delta {
                let (rgb, corr) = normalize_to_template(&m.frame.lab, &cand_rgb, &m.roi, delta);
                log::debug!(
                    "photometric correction: delta {delta:.2}, gain {:?}, bias {:?}",
                    corr.gain,
                    corr.bias
                );
                cand_rgb = m.roi.apply_rgb(&rgb);
                correction = Some(corr);
            }
        }
        let candidate = PreparedFrame::new(cand_rgb, p.blur_kernel_size);

        let mut diagnostics = p.keep_diagnostics.then(|| CueDiagnostics::empty(m.window));
        let decision = match p.mode {
            InspectionMode::Full => self.full_mode(&candidate, &mut diagnostics),
            InspectionMode::Simple => self.simple_mode(&candidate, &mut diagnostics),
        };
        let t_cues = t0.elapsed();

        let mut allowed = m.safe_roi.as_image().clone();
        if p.mode == InspectionMode::Full && p.ignore_overexposed {
            let over = overexposure_mask(&candidate.rgb, p.overexposure_level, &m.roi);
            allowed = mask_and_not(&allowed, &over);
            if let Some(d) = diagnostics.as_mut() {
                d.overexposed = Some(over);
            }
        }
        let decided = mask_and(&decision.mask, &allowed);

        // cleanup may grow regions again; cut them back before labelling
        let extraction = clean_and_extract_within(
            &decided,
            &allowed,
            decision.cleanup,
            p.min_defect_area,
        );
        let camera_from_template = match &alignment.registration {
            Registration::Aligned { homography, .. } => homography.inverse(),
            Registration::Unaligned { .. } => None,
        };
        let defects: Vec<Defect> = extraction
            .regions
            .iter()
            .map(|r| {
                let cue = dominant_cue(&extraction.labels, r, &decision.layers);
                to_defect(r, m.window, cue, camera_from_template.as_ref())
            })
            .collect();

        let (w, h) = m.dims;
        let mut mask = GrayImage::new(w, h);
        imageops::replace(&mut mask, &extraction.mask, m.window.x as i64, m.window.y as i64);

        log::info!(
            "inspection: {} defect(s), {} ({:.1} ms align, {:.1} ms cues, {:.1} ms total)",
            defects.len(),
            if alignment.registration.is_aligned() {
                "aligned"
            } else {
                "unaligned"
            },
            t_align.as_secs_f64() * 1e3,
            (t_cues - t_align).as_secs_f64() * 1e3,
            t0.elapsed().as_secs_f64() * 1e3
        );

        Ok(InspectionResult {
            mode: p.mode,
            mask,
            defects,
            registration: alignment.registration,
            correction,
            diagnostics,
        })
    }

    fn full_mode(
        &self,
        candidate: &PreparedFrame,
        diagnostics: &mut Option<CueDiagnostics>,
    ) -> Decision {
        let p = &self.params;
        let m = &self.model;
        let (w, h) = candidate.dimensions();
        let use_classic = p.classic.enabled || p.fusion == FusionMode::Classic;
        let use_advanced = p.fusion != FusionMode::Classic;

        let want_gate = use_classic || diagnostics.is_some();
        let classic_part = || -> (Option<CueLayer>, Option<ClassicMasks>) {
            if !want_gate {
                return (None, None);
            }
            let gate = gradient_gate(
                &candidate.blurred,
                &m.roi,
                p.classic.dark_gradient_threshold,
            );
            if !use_classic {
                return (Some(gate), None);
            }
            let edges = edge_mask(
                &m.edges,
                &candidate.blurred,
                p.classic.edge_low,
                p.classic.edge_high,
            );
            let masks = classic_masks(
                &m.frame,
                candidate,
                &m.micro_black_hat,
                &gate.mask,
                &edges,
                &m.roi,
                &p.classic,
            );
            (Some(gate), Some(masks))
        };
        let structural_part = || {
            (use_advanced && p.structural.enabled).then(|| {
                structural_cue(
                    &m.frame.blurred,
                    &candidate.blurred,
                    &m.safe_roi,
                    &p.structural,
                )
            })
        };
        let morph_part = || {
            (use_advanced && p.morph_maps.enabled).then(|| {
                let cand = &candidate.blurred;
                rayon::join(
                    || top_hat_cue(cand, &m.residuals, &m.safe_roi, &p.morph_maps),
                    || black_hat_cue(cand, &m.residuals, &m.safe_roi, &p.morph_maps),
                )
            })
        };
        let color_part = || {
            (use_advanced && p.color.enabled)
                .then(|| color_cue(&m.frame.lab, &candidate.lab, &m.safe_roi, &p.color))
        };

        let ((gate, classic), (structural, (morph, color))) = rayon::join(classic_part, || {
            rayon::join(structural_part, || rayon::join(morph_part, color_part))
        });
        let (top, black) = match morph {
            Some((t, b)) => (Some(t), Some(b)),
            None => (None, None),
        };

        let include_structural = p.structural.weight > 0.0;
        let structural_mask = structural
            .as_ref()
            .filter(|_| include_structural)
            .map(|(_, _, cleaned)| cleaned.clone());

        let fused = match p.fusion {
            FusionMode::Classic => None,
            FusionMode::Union => {
                let masks = [
                    top.as_ref().map(|l| &l.mask),
                    black.as_ref().map(|l| &l.mask),
                    color.as_ref().map(|l| &l.mask),
                    structural_mask.as_ref(),
                ];
                let mask = fuse_union(masks.into_iter().flatten(), (w, h));
                Some(CueLayer::mask_only(mask))
            }
            FusionMode::Weighted => fuse_weighted(
                structural.as_ref().map(|(s, _, _)| &s.dssim),
                top.as_ref().and_then(|l| l.map.as_ref()),
                black.as_ref().and_then(|l| l.map.as_ref()),
                color.as_ref().and_then(|l| l.map.as_ref()),
                &m.safe_roi,
                &p.weighted,
            ),
        };

        let classic_union = classic.as_ref().map(ClassicMasks::union);
        let mask = fuse_union(
            [
                classic_union.as_ref(),
                structural_mask.as_ref(),
                fused.as_ref().map(|l| &l.mask),
            ]
            .into_iter()
            .flatten(),
            (w, h),
        );

        let mut layers = Vec::new();
        if let Some(s) = &structural_mask {
            layers.push((CueKind::Structural, s.clone()));
        }
        let advanced = [
            (CueKind::TopHat, &top),
            (CueKind::BlackHat, &black),
            (CueKind::Color, &color),
        ];
        for (kind, layer) in advanced {
            if let Some(l) = layer {
                layers.push((kind, l.mask.clone()));
            }
        }
        if let Some(masks) = &classic {
            for (kind, mask) in masks.layers() {
                layers.push((kind, mask.clone()));
            }
        }
        if p.fusion == FusionMode::Weighted {
            if let Some(f) = &fused {
                layers.push((CueKind::Fused, f.mask.clone()));
            }
        }

        if let Some(d) = diagnostics.as_mut() {
            if let Some((map, raw, _)) = structural {
                d.structural_degenerate_pixels = map.degenerate_pixels;
                d.structural = Some(CueLayer::new(map.dssim, raw));
            }
            d.top_hat = top;
            d.black_hat = black;
            d.color = color;
            d.gradient = gate;
            d.classic = classic;
            d.fused = fused;
        }

        Decision {
            mask,
            layers,
            cleanup: p.cleanup,
        }
    }

    fn simple_mode(
        &self,
        candidate: &PreparedFrame,
        diagnostics: &mut Option<CueDiagnostics>,
    ) -> Decision {
        let p = &self.params;
        let m = &self.model;
        let (structural, (color, band)) = rayon::join(
            || ms_ssim_dissimilarity(&m.frame.blurred, &candidate.blurred, &p.structural),
            || {
                rayon::join(
                    || {
                        let delta = chroma_delta(&m.frame.lab, &candidate.lab, ColorMetric::MaxAb);
                        normalize01(&delta)
                    },
                    || bandpass_residual(&m.frame.blurred, &candidate.blurred, &p.simple),
                )
            },
        );
        let score = simple_score(&structural.dssim, &color, &band, &m.safe_roi, &p.simple);

        // per-cue masks at the same (bounded) percentile, for labelling only
        let pct = p.simple.percentile.clamp(98.5, 99.9);
        let structural_mask = m.safe_roi.binarize_percentile(&structural.dssim, pct);
        let color_mask = m.safe_roi.binarize_percentile(&color, pct);
        let band_mask = m.safe_roi.binarize_percentile(&band, pct);

        let layers = vec![
            (CueKind::Structural, structural_mask.clone()),
            (CueKind::Color, color_mask.clone()),
            (CueKind::Bandpass, band_mask.clone()),
            (CueKind::Fused, score.mask.clone()),
        ];
        let mask = score.mask.clone();

        if let Some(d) = diagnostics.as_mut() {
            d.structural_degenerate_pixels = structural.degenerate_pixels;
            d.structural = Some(CueLayer::new(structural.dssim, structural_mask));
            d.color = Some(CueLayer::new(color, color_mask));
            d.bandpass = Some(CueLayer::new(band, band_mask));
            d.fused = Some(score);
        }

        Decision {
            mask,
            layers,
            cleanup: p.simple.morph,
        }
    }
}

/// Cue whose mask covers the most pixels of the region; earlier layers win
/// ties.
fn dominant_cue(
    labels: &LabelImage,
    region: &Region,
    layers: &[(CueKind, GrayImage)],
) -> Option<CueKind> {
    let b = region.bbox;
    let mut best: Option<(CueKind, usize)> = None;
    for (kind, mask) in layers {
        let mut n = 0usize;
        for y in b.y..b.bottom() {
            for x in b.x..b.right() {
                if labels.get_pixel(x, y)[0] == region.label && mask.get_pixel(x, y)[0] != 0 {
                    n += 1;
                }
            }
        }
        if n > 0 && best.is_none_or(|(_, top)| n > top) {
            best = Some((*kind, n));
        }
    }
    best.map(|(kind, _)| kind)
}

fn to_defect(
    region: &Region,
    window: PixelRect,
    cue: Option<CueKind>,
    camera_from_template: Option<&Homography>,
) -> Defect {
    let (ox, oy) = (window.x as f32, window.y as f32);
    let center = Point2::new(region.center.x + ox, region.center.y + oy);
    let (camera_center, camera_radius) = match camera_from_template {
        Some(h) => {
            let c = h.apply(center);
            let edge = h.apply(Point2::new(center.x + region.radius, center.y));
            (Some(c), Some((edge - c).norm()))
        }
        None => (None, None),
    };
    Defect {
        center,
        radius: region.radius,
        bbox: PixelRect::new(
            region.bbox.x + window.x,
            region.bbox.y + window.y,
            region.bbox.width,
            region.bbox.height,
        ),
        area: region.area,
        perimeter: region.perimeter,
        circularity: region.circularity,
        cue,
        camera_center,
        camera_radius,
    }
}

/// One-shot inspection without keeping a session.
pub fn inspect(
    template: &RgbImage,
    captured: &RgbImage,
    roi_mask: &GrayImage,
    params: &InspectionParams,
) -> Result<InspectionResult, InspectError> {
    Inspector::new(template, roi_mask, params.clone())?.inspect(captured)
}
