//! Typed inspection parameters with defaults and range clamping.

use serde::{Deserialize, Serialize};
use sheet_inspect_align::AlignParams;
use sheet_inspect_core::odd_kernel_size;
use std::fmt;

/// Which detection pipeline runs after alignment and normalization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionMode {
    /// All cues plus the fixed-threshold classic detector.
    #[default]
    Full,
    /// Single fused score of structure, color and band-pass residual.
    Simple,
}

/// How advanced cue outputs are combined in [`InspectionMode::Full`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// OR of the per-cue percentile masks.
    #[default]
    #[serde(alias = "or")]
    Union,
    /// Weighted sum of cue maps, binarized once.
    Weighted,
    /// Only the fixed-threshold dark/bright/blue/red cues.
    Classic,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMetric {
    /// `max(|da|, |db|)`
    #[default]
    #[serde(rename = "maxab")]
    MaxAb,
    /// `sqrt(da^2 + db^2)`
    #[serde(rename = "l2ab")]
    L2Ab,
}

/// Opening+closing with a square kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphParams {
    pub kernel_size: u32,
    pub iterations: u32,
}

impl MorphParams {
    pub const fn new(kernel_size: u32, iterations: u32) -> Self {
        Self {
            kernel_size,
            iterations,
        }
    }

    /// No-op cleanup.
    pub const fn disabled() -> Self {
        Self::new(1, 0)
    }
}

impl Default for MorphParams {
    fn default() -> Self {
        Self::new(3, 1)
    }
}

/// Fixed-threshold subtractive cues (8-bit units).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassicParams {
    pub enabled: bool,
    /// Gray drop (template - candidate) above which a pixel is dark.
    pub dark_threshold: f32,
    /// Lab `b` rise (yellowing) threshold.
    pub bright_threshold: f32,
    /// Lab `b` drop threshold.
    pub blue_threshold: f32,
    /// Lab `a` rise threshold.
    pub red_threshold: f32,
    /// Minimum 5x5 morphological gradient for the dark cue; `<= 0` disables
    /// the gate.
    pub dark_gradient_threshold: f32,
    pub dark_morph: MorphParams,
    /// Cleanup shared by the bright, blue and red cues.
    pub bright_morph: MorphParams,
    pub edge_low: f32,
    pub edge_high: f32,
}

impl Default for ClassicParams {
    fn default() -> Self {
        Self {
            enabled: true,
            dark_threshold: 30.0,
            bright_threshold: 30.0,
            blue_threshold: 25.0,
            red_threshold: 25.0,
            dark_gradient_threshold: 10.0,
            dark_morph: MorphParams::default(),
            bright_morph: MorphParams::default(),
            edge_low: 60.0,
            edge_high: 180.0,
        }
    }
}

/// Multi-scale SSIM dissimilarity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralParams {
    pub enabled: bool,
    /// The structural mask joins the union only when this is positive.
    pub weight: f32,
    pub percentile: f32,
    /// Gaussian window per scale (full, 1/2, 1/4).
    pub kernel_sizes: [u32; 3],
    pub sigmas: [f32; 3],
    pub scale_weights: [f32; 3],
    pub k1: f32,
    pub k2: f32,
    pub morph: MorphParams,
}

impl Default for StructuralParams {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 0.5,
            percentile: 99.5,
            kernel_sizes: [7, 5, 3],
            sigmas: [1.5, 1.0, 0.8],
            scale_weights: [0.5, 0.3, 0.2],
            k1: 0.01,
            k2: 0.03,
            morph: MorphParams::default(),
        }
    }
}

/// Top-hat / black-hat residual cues.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphMapParams {
    pub enabled: bool,
    pub top_percentile: f32,
    pub black_percentile: f32,
    pub se_top: u32,
    pub se_black: u32,
}

impl Default for MorphMapParams {
    fn default() -> Self {
        Self {
            enabled: true,
            top_percentile: 99.5,
            black_percentile: 99.5,
            se_top: 9,
            se_black: 9,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorParams {
    pub enabled: bool,
    pub metric: ColorMetric,
    pub percentile: f32,
}

impl Default for ColorParams {
    fn default() -> Self {
        Self {
            enabled: true,
            metric: ColorMetric::MaxAb,
            percentile: 99.0,
        }
    }
}

/// Weights and threshold of [`FusionMode::Weighted`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightedFusionParams {
    pub structural: f32,
    pub top_hat: f32,
    pub black_hat: f32,
    pub color: f32,
    pub percentile: f32,
}

impl Default for WeightedFusionParams {
    fn default() -> Self {
        Self {
            structural: 0.5,
            top_hat: 0.25,
            black_hat: 0.15,
            color: 0.10,
            percentile: 99.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleModeParams {
    pub structural_weight: f32,
    pub color_weight: f32,
    pub bandpass_weight: f32,
    pub percentile: f32,
    pub band_kernel_size: u32,
    pub band_sigma_fine: f32,
    pub band_sigma_coarse: f32,
    pub morph: MorphParams,
}

impl Default for SimpleModeParams {
    fn default() -> Self {
        Self {
            structural_weight: 0.5,
            color_weight: 0.3,
            bandpass_weight: 0.2,
            percentile: 99.5,
            band_kernel_size: 5,
            band_sigma_fine: 1.0,
            band_sigma_coarse: 2.0,
            morph: MorphParams::default(),
        }
    }
}

/// Lab gain/bias correction of global illumination drift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeParams {
    pub enabled: bool,
    /// Applied only when the ROI gray means differ by more than this.
    pub min_luminance_delta: f32,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            enabled: true,
            min_luminance_delta: 1.0,
        }
    }
}

/// Complete configuration of an inspection session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionParams {
    pub mode: InspectionMode,
    pub fusion: FusionMode,
    /// Regions with fewer pixels are discarded.
    pub min_defect_area: u32,
    /// Side of the square used to erode the ROI away from its border.
    pub roi_erode_size: u32,
    /// Gaussian pre-blur of both gray images.
    pub blur_kernel_size: u32,
    /// Process only the ROI bounding box.
    pub crop_to_roi: bool,
    pub ignore_overexposed: bool,
    pub overexposure_level: u8,
    /// Keep per-cue maps and masks in the result.
    pub keep_diagnostics: bool,
    pub align: AlignParams,
    pub normalize: NormalizeParams,
    pub classic: ClassicParams,
    pub structural: StructuralParams,
    pub morph_maps: MorphMapParams,
    pub color: ColorParams,
    pub weighted: WeightedFusionParams,
    pub simple: SimpleModeParams,
    /// Final opening+closing before contour extraction (full mode).
    pub cleanup: MorphParams,
}

impl Default for InspectionParams {
    fn default() -> Self {
        Self {
            mode: InspectionMode::Full,
            fusion: FusionMode::Union,
            min_defect_area: 1,
            roi_erode_size: 5,
            blur_kernel_size: 5,
            crop_to_roi: true,
            ignore_overexposed: false,
            overexposure_level: 250,
            keep_diagnostics: false,
            align: AlignParams::default(),
            normalize: NormalizeParams::default(),
            classic: ClassicParams::default(),
            structural: StructuralParams::default(),
            morph_maps: MorphMapParams::default(),
            color: ColorParams::default(),
            weighted: WeightedFusionParams::default(),
            simple: SimpleModeParams::default(),
            cleanup: MorphParams::default(),
        }
    }
}

/// A parameter that was out of range or malformed and has been replaced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub key: String,
    pub message: String,
}

impl ConfigWarning {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

struct Clamp<'a> {
    warnings: &'a mut Vec<ConfigWarning>,
}

impl Clamp<'_> {
    fn range(&mut self, key: &str, v: &mut f32, lo: f32, hi: f32, default: f32) {
        if !v.is_finite() {
            self.warnings
                .push(ConfigWarning::new(key, format!("non-finite, using {default}")));
            *v = default;
        } else if *v < lo || *v > hi {
            let c = v.clamp(lo, hi);
            self.warnings.push(ConfigWarning::new(
                key,
                format!("{v} outside [{lo}, {hi}], clamped to {c}"),
            ));
            *v = c;
        }
    }

    fn intensity(&mut self, key: &str, v: &mut f32, default: f32) {
        self.range(key, v, 0.0, 255.0, default);
    }

    fn percentile(&mut self, key: &str, v: &mut f32, default: f32) {
        self.range(key, v, 0.0, 100.0, default);
    }

    fn weight(&mut self, key: &str, v: &mut f32, default: f32) {
        self.range(key, v, 0.0, 1.0, default);
    }

    fn kernel(&mut self, key: &str, k: &mut u32) {
        let c = odd_kernel_size(*k);
        if c != *k {
            self.warnings.push(ConfigWarning::new(
                key,
                format!("kernel size {k} coerced to {c}"),
            ));
            *k = c;
        }
    }

    fn morph(&mut self, key: &str, m: &mut MorphParams) {
        self.kernel(&format!("{key}.kernel_size"), &mut m.kernel_size);
    }

    fn positive(&mut self, key: &str, v: &mut f32, default: f32) {
        if !(v.is_finite() && *v > 0.0) {
            self.warnings
                .push(ConfigWarning::new(key, format!("{v} not positive, using {default}")));
            *v = default;
        }
    }
}

impl InspectionParams {
    /// Clamp every field into its valid range.
    ///
    /// Returns one warning per corrected field; each is also logged.
    pub fn sanitize(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let d = InspectionParams::default();
        {
            let mut c = Clamp {
                warnings: &mut warnings,
            };

            if self.min_defect_area < 1 {
                c.warnings
                    .push(ConfigWarning::new("min_defect_area", "raised to 1"));
                self.min_defect_area = 1;
            }
            c.kernel("roi_erode_size", &mut self.roi_erode_size);
            c.kernel("blur_kernel_size", &mut self.blur_kernel_size);
            c.morph("cleanup", &mut self.cleanup);

            let cl = &mut self.classic;
            c.intensity("classic.dark_threshold", &mut cl.dark_threshold, d.classic.dark_threshold);
            c.intensity(
                "classic.bright_threshold",
                &mut cl.bright_threshold,
                d.classic.bright_threshold,
            );
            c.intensity("classic.blue_threshold", &mut cl.blue_threshold, d.classic.blue_threshold);
            c.intensity("classic.red_threshold", &mut cl.red_threshold, d.classic.red_threshold);
            c.intensity(
                "classic.dark_gradient_threshold",
                &mut cl.dark_gradient_threshold,
                d.classic.dark_gradient_threshold,
            );
            c.intensity("classic.edge_low", &mut cl.edge_low, d.classic.edge_low);
            c.intensity("classic.edge_high", &mut cl.edge_high, d.classic.edge_high);
            if cl.edge_high < cl.edge_low {
                c.warnings
                    .push(ConfigWarning::new("classic.edge_high", "below edge_low, swapped"));
                std::mem::swap(&mut cl.edge_low, &mut cl.edge_high);
            }
            c.morph("classic.dark_morph", &mut cl.dark_morph);
            c.morph("classic.bright_morph", &mut cl.bright_morph);

            let st = &mut self.structural;
            c.weight("structural.weight", &mut st.weight, d.structural.weight);
            c.percentile("structural.percentile", &mut st.percentile, d.structural.percentile);
            for i in 0..3 {
                c.kernel(&format!("structural.kernel_sizes[{i}]"), &mut st.kernel_sizes[i]);
                c.positive(
                    &format!("structural.sigmas[{i}]"),
                    &mut st.sigmas[i],
                    d.structural.sigmas[i],
                );
                c.weight(
                    &format!("structural.scale_weights[{i}]"),
                    &mut st.scale_weights[i],
                    d.structural.scale_weights[i],
                );
            }
            c.range("structural.k1", &mut st.k1, 0.0, 1.0, d.structural.k1);
            c.range("structural.k2", &mut st.k2, 0.0, 1.0, d.structural.k2);
            c.morph("structural.morph", &mut st.morph);

            let mm = &mut self.morph_maps;
            c.percentile(
                "morph_maps.top_percentile",
                &mut mm.top_percentile,
                d.morph_maps.top_percentile,
            );
            c.percentile(
                "morph_maps.black_percentile",
                &mut mm.black_percentile,
                d.morph_maps.black_percentile,
            );
            c.kernel("morph_maps.se_top", &mut mm.se_top);
            c.kernel("morph_maps.se_black", &mut mm.se_black);

            c.percentile("color.percentile", &mut self.color.percentile, d.color.percentile);

            let w = &mut self.weighted;
            c.weight("weighted.structural", &mut w.structural, d.weighted.structural);
            c.weight("weighted.top_hat", &mut w.top_hat, d.weighted.top_hat);
            c.weight("weighted.black_hat", &mut w.black_hat, d.weighted.black_hat);
            c.weight("weighted.color", &mut w.color, d.weighted.color);
            c.percentile("weighted.percentile", &mut w.percentile, d.weighted.percentile);

            let s = &mut self.simple;
            c.weight(
                "simple.structural_weight",
                &mut s.structural_weight,
                d.simple.structural_weight,
            );
            c.weight("simple.color_weight", &mut s.color_weight, d.simple.color_weight);
            c.weight("simple.bandpass_weight", &mut s.bandpass_weight, d.simple.bandpass_weight);
            c.percentile("simple.percentile", &mut s.percentile, d.simple.percentile);
            if s.band_kernel_size < 3 {
                c.warnings
                    .push(ConfigWarning::new("simple.band_kernel_size", "raised to 3"));
                s.band_kernel_size = 3;
            }
            c.kernel("simple.band_kernel_size", &mut s.band_kernel_size);
            c.positive("simple.band_sigma_fine", &mut s.band_sigma_fine, d.simple.band_sigma_fine);
            c.positive(
                "simple.band_sigma_coarse",
                &mut s.band_sigma_coarse,
                d.simple.band_sigma_coarse,
            );
            c.morph("simple.morph", &mut s.morph);

            c.range(
                "normalize.min_luminance_delta",
                &mut self.normalize.min_luminance_delta,
                0.0,
                255.0,
                d.normalize.min_luminance_delta,
            );

            let a = &mut self.align;
            if !(a.downscale.is_finite() && a.downscale > 0.0 && a.downscale <= 1.0) {
                c.warnings.push(ConfigWarning::new(
                    "align.downscale",
                    format!("{} outside (0, 1], using {}", a.downscale, d.align.downscale),
                ));
                a.downscale = d.align.downscale;
            }
            c.weight(
                "align.good_match_fraction",
                &mut a.good_match_fraction,
                d.align.good_match_fraction,
            );
            if !(a.ransac.inlier_threshold.is_finite() && a.ransac.inlier_threshold > 0.0) {
                c.warnings.push(ConfigWarning::new(
                    "align.ransac.inlier_threshold",
                    format!("using {}", d.align.ransac.inlier_threshold),
                ));
                a.ransac.inlier_threshold = d.align.ransac.inlier_threshold;
            }
        }

        for w in &warnings {
            log::warn!("config: {w}");
        }
        warnings
    }

    /// Sanitized copy of `self`, discarding the warnings (they are logged).
    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }
}
