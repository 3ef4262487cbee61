use crate::cues::{ClassicMasks, CueKind, CueLayer};
use crate::normalize::PhotometricCorrection;
use crate::params::InspectionMode;
use image::GrayImage;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use sheet_inspect_align::Registration;
use sheet_inspect_core::PixelRect;

/// A connected defect region in template coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    /// Center of the minimum enclosing circle.
    pub center: Point2<f32>,
    pub radius: f32,
    pub bbox: PixelRect,
    /// Pixel count.
    pub area: u32,
    pub perimeter: f32,
    pub circularity: f32,
    /// Cue whose mask overlaps the region most.
    pub cue: Option<CueKind>,
    /// Center and radius in the captured image, when registration succeeded.
    pub camera_center: Option<Point2<f32>>,
    pub camera_radius: Option<f32>,
}

/// Intermediate cue outputs, in ROI-window coordinates (see `window`).
#[derive(Clone, Debug)]
pub struct CueDiagnostics {
    /// Placement of the diagnostic images inside the template.
    pub window: PixelRect,
    /// Structural map and its percentile mask before cleanup.
    pub structural: Option<CueLayer>,
    pub structural_degenerate_pixels: usize,
    pub top_hat: Option<CueLayer>,
    pub black_hat: Option<CueLayer>,
    pub color: Option<CueLayer>,
    pub gradient: Option<CueLayer>,
    pub bandpass: Option<CueLayer>,
    pub classic: Option<ClassicMasks>,
    pub fused: Option<CueLayer>,
    pub overexposed: Option<GrayImage>,
}

impl CueDiagnostics {
    pub(crate) fn empty(window: PixelRect) -> Self {
        Self {
            window,
            structural: None,
            structural_degenerate_pixels: 0,
            top_hat: None,
            black_hat: None,
            color: None,
            gradient: None,
            bandpass: None,
            classic: None,
            fused: None,
            overexposed: None,
        }
    }
}

/// Outcome of one inspection.
#[derive(Clone, Debug)]
pub struct InspectionResult {
    pub mode: InspectionMode,
    /// Final binary mask at template dimensions.
    pub mask: GrayImage,
    /// Accepted regions, ordered top-to-bottom then left-to-right.
    pub defects: Vec<Defect>,
    pub registration: Registration,
    /// `None` when normalization was disabled or not needed.
    pub correction: Option<PhotometricCorrection>,
    /// Present when `keep_diagnostics` is set.
    pub diagnostics: Option<CueDiagnostics>,
}

impl InspectionResult {
    #[inline]
    pub fn defect_count(&self) -> usize {
        self.defects.len()
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.defects.is_empty()
    }

    /// `false` when the capture could not be registered and the result rests
    /// on an identity alignment.
    #[inline]
    pub fn is_registered(&self) -> bool {
        self.registration.is_aligned()
    }
}
