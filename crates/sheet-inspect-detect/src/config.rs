//! Loading [`InspectionParams`] from JSON files.
//!
//! Two layouts are accepted: the nested serde form of [`InspectionParams`],
//! and the flat key/value map written by the line-side tuning tool
//! (`dark_threshold`, `use_ms_ssim`, `w_struct`, ...). The layout is detected
//! from the keys present.

use crate::params::{ColorMetric, ConfigWarning, FusionMode, InspectionMode, InspectionParams};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Keys of the flat layout that carry no meaning for the inspection core.
const IGNORED_FLAT_KEYS: &[&str] = &[
    "use_heatmap_bg",
    "final_include_gradient",
    "line_top",
    "line_bottom",
    "line_left",
    "line_right",
    "area_min",
    "area_max",
    "circularity_min",
];

struct FlatReader<'a> {
    map: &'a Map<String, Value>,
    warnings: Vec<ConfigWarning>,
}

impl<'a> FlatReader<'a> {
    fn new(map: &'a Map<String, Value>) -> Self {
        Self {
            map,
            warnings: Vec::new(),
        }
    }

    fn number(&mut self, key: &str) -> Option<f64> {
        let v = self.map.get(key)?;
        let parsed = match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        };
        if parsed.is_none() {
            self.warnings
                .push(ConfigWarning::new(key, format!("not a number ({v}), ignored")));
        }
        parsed
    }

    fn f32(&mut self, key: &str, out: &mut f32) {
        if let Some(v) = self.number(key) {
            *out = v as f32;
        }
    }

    fn u32(&mut self, key: &str, out: &mut u32) {
        if let Some(v) = self.number(key) {
            if v < 0.0 {
                self.warnings
                    .push(ConfigWarning::new(key, format!("{v} negative, using 0")));
            }
            *out = v.max(0.0).round().min(u32::MAX as f64) as u32;
        }
    }

    fn bool(&mut self, key: &str, out: &mut bool) {
        let Some(v) = self.map.get(key) else {
            return;
        };
        let parsed = match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|f| f != 0.0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        };
        match parsed {
            Some(b) => *out = b,
            None => self
                .warnings
                .push(ConfigWarning::new(key, format!("not a boolean ({v}), ignored"))),
        }
    }

    /// Despite its name the key holds a fraction in `[0, 1]`, and `1` keeps
    /// every match. Larger values are read as a percentage.
    fn match_fraction(&mut self, key: &str, v: f64) -> f32 {
        if v > 1.0 {
            let f = v / 100.0;
            self.warnings.push(ConfigWarning::new(
                key,
                format!("{v} read as a percentage, using fraction {f}"),
            ));
            f as f32
        } else {
            v as f32
        }
    }

    fn text(&mut self, key: &str) -> Option<String> {
        match self.map.get(key)? {
            Value::String(s) => Some(s.trim().to_ascii_lowercase()),
            other => {
                self.warnings
                    .push(ConfigWarning::new(key, format!("not a string ({other}), ignored")));
                None
            }
        }
    }
}

/// `true` when `map` looks like the flat tuning-tool layout.
pub fn is_flat_layout(map: &Map<String, Value>) -> bool {
    const NESTED: &[&str] = &[
        "classic",
        "structural",
        "morph_maps",
        "color",
        "weighted",
        "simple",
        "align",
        "normalize",
        "cleanup",
    ];
    !map.values().any(Value::is_object) && !NESTED.iter().any(|k| map.contains_key(*k))
}

impl InspectionParams {
    /// Build parameters from the flat key/value layout.
    ///
    /// Unknown keys are logged and skipped. Returns the sanitized parameters
    /// together with every warning raised while reading and clamping.
    pub fn from_flat_map(map: &Map<String, Value>) -> (Self, Vec<ConfigWarning>) {
        let mut p = InspectionParams::default();
        let mut r = FlatReader::new(map);

        if let Some(mode) = r.text("mode") {
            match mode.as_str() {
                "full" => p.mode = InspectionMode::Full,
                "simple" => p.mode = InspectionMode::Simple,
                other => r
                    .warnings
                    .push(ConfigWarning::new("mode", format!("unknown mode '{other}'"))),
            }
        }

        // legacy alias first so the canonical key wins when both are present
        r.u32("detect_area", &mut p.min_defect_area);
        r.u32("min_defect_area", &mut p.min_defect_area);
        r.u32("blur_ksize", &mut p.blur_kernel_size);
        r.bool("ignore_overexposed", &mut p.ignore_overexposed);

        let c = &mut p.classic;
        r.f32("dark_threshold", &mut c.dark_threshold);
        r.f32("bright_threshold", &mut c.bright_threshold);
        r.f32("blue_threshold", &mut c.blue_threshold);
        r.f32("red_threshold", &mut c.red_threshold);
        r.f32("dark_gradient_threshold", &mut c.dark_gradient_threshold);
        r.u32("dark_morph_kernel_size", &mut c.dark_morph.kernel_size);
        r.u32("dark_morph_iterations", &mut c.dark_morph.iterations);
        r.u32("bright_morph_kernel_size", &mut c.bright_morph.kernel_size);
        r.u32("bright_morph_iterations", &mut c.bright_morph.iterations);
        r.f32("canny_threshold1", &mut c.edge_low);
        r.f32("canny_threshold2", &mut c.edge_high);

        let s = &mut p.structural;
        r.bool("use_ms_ssim", &mut s.enabled);
        r.f32("msssim_percentile", &mut s.percentile);
        r.f32("msssim_weight", &mut s.weight);
        r.u32("msssim_kernel_size_s1", &mut s.kernel_sizes[0]);
        r.u32("msssim_kernel_size_s2", &mut s.kernel_sizes[1]);
        r.u32("msssim_kernel_size_s3", &mut s.kernel_sizes[2]);
        r.f32("msssim_sigma_s1", &mut s.sigmas[0]);
        r.f32("msssim_sigma_s2", &mut s.sigmas[1]);
        r.f32("msssim_sigma_s3", &mut s.sigmas[2]);
        r.u32("msssim_morph_kernel_size", &mut s.morph.kernel_size);
        r.u32("msssim_morph_iterations", &mut s.morph.iterations);

        let m = &mut p.morph_maps;
        r.bool("use_morph_maps", &mut m.enabled);
        r.f32("th_top_percentile", &mut m.top_percentile);
        r.f32("th_black_percentile", &mut m.black_percentile);
        r.u32("se_top", &mut m.se_top);
        r.u32("se_black", &mut m.se_black);

        r.bool("use_color_delta", &mut p.color.enabled);
        r.f32("color_percentile", &mut p.color.percentile);
        if let Some(metric) = r.text("color_metric") {
            match metric.as_str() {
                "maxab" => p.color.metric = ColorMetric::MaxAb,
                "l2ab" => p.color.metric = ColorMetric::L2Ab,
                other => r.warnings.push(ConfigWarning::new(
                    "color_metric",
                    format!("unknown metric '{other}', keeping maxab"),
                )),
            }
        }

        if let Some(fusion) = r.text("fusion_mode") {
            match fusion.as_str() {
                "or" | "union" => p.fusion = FusionMode::Union,
                "weighted" => p.fusion = FusionMode::Weighted,
                "classic" => p.fusion = FusionMode::Classic,
                other => r.warnings.push(ConfigWarning::new(
                    "fusion_mode",
                    format!("unknown fusion '{other}', keeping union"),
                )),
            }
        }
        if let Some(final_mode) = r.text("final_mode") {
            match final_mode.as_str() {
                "classic" => p.fusion = FusionMode::Classic,
                "extended" => {}
                other => r.warnings.push(ConfigWarning::new(
                    "final_mode",
                    format!("unknown final mode '{other}'"),
                )),
            }
        }
        let w = &mut p.weighted;
        r.f32("w_struct", &mut w.structural);
        r.f32("w_top", &mut w.top_hat);
        r.f32("w_black", &mut w.black_hat);
        r.f32("w_color", &mut w.color);
        r.f32("fused_percentile", &mut w.percentile);

        let a = &mut p.align;
        let mut max_features = a.max_features as u32;
        r.u32("max_features", &mut max_features);
        a.max_features = max_features as usize;
        if let Some(v) = r.number("good_match_percent") {
            a.good_match_fraction = r.match_fraction("good_match_percent", v);
        }

        for key in map.keys() {
            if !is_known_flat_key(key) {
                log::debug!("config: ignoring unknown key '{key}'");
            }
        }

        let mut warnings = r.warnings;
        for w in &warnings {
            log::warn!("config: {w}");
        }
        warnings.extend(p.sanitize());
        (p, warnings)
    }

    /// Read parameters from a JSON file in either layout.
    pub fn load_json(path: impl AsRef<Path>) -> Result<(Self, Vec<ConfigWarning>), ConfigIoError> {
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: Value) -> Result<(Self, Vec<ConfigWarning>), ConfigIoError> {
        match value {
            Value::Object(map) if is_flat_layout(&map) => Ok(Self::from_flat_map(&map)),
            other => {
                let mut p: InspectionParams = serde_json::from_value(other)?;
                let warnings = p.sanitize();
                Ok((p, warnings))
            }
        }
    }

    /// Write the nested layout as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn is_known_flat_key(key: &str) -> bool {
    const KNOWN: &[&str] = &[
        "mode",
        "detect_area",
        "min_defect_area",
        "blur_ksize",
        "ignore_overexposed",
        "dark_threshold",
        "bright_threshold",
        "blue_threshold",
        "red_threshold",
        "dark_gradient_threshold",
        "dark_morph_kernel_size",
        "dark_morph_iterations",
        "bright_morph_kernel_size",
        "bright_morph_iterations",
        "canny_threshold1",
        "canny_threshold2",
        "use_ms_ssim",
        "msssim_percentile",
        "msssim_weight",
        "msssim_kernel_size_s1",
        "msssim_kernel_size_s2",
        "msssim_kernel_size_s3",
        "msssim_sigma_s1",
        "msssim_sigma_s2",
        "msssim_sigma_s3",
        "msssim_morph_kernel_size",
        "msssim_morph_iterations",
        "use_morph_maps",
        "th_top_percentile",
        "th_black_percentile",
        "se_top",
        "se_black",
        "use_color_delta",
        "color_metric",
        "color_percentile",
        "fusion_mode",
        "final_mode",
        "w_struct",
        "w_top",
        "w_black",
        "w_color",
        "fused_percentile",
        "max_features",
        "good_match_percent",
    ];
    KNOWN.contains(&key) || IGNORED_FLAT_KEYS.contains(&key)
}
