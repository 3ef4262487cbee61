//! Multi-cue defect detection of a captured sheet against its reference
//! template.
//!
//! An [`Inspector`] is built once per template and ROI mask. Each call to
//! [`Inspector::inspect`] then
//! 1. registers the capture onto the template (identity fallback),
//! 2. corrects global illumination drift in Lab,
//! 3. runs the cue extractors concurrently (structural, top-hat/black-hat,
//!    color, gradient-gated classic cues, or the simple fused score),
//! 4. fuses and thresholds the cues inside the eroded ROI,
//! 5. cleans the mask and extracts filtered, labelled defect regions.
//!
//! ```no_run
//! use sheet_inspect_detect::{Inspector, InspectionParams};
//! # fn load() -> (image::RgbImage, image::GrayImage, image::RgbImage) { unimplemented!() }
//! let (template, roi, captured) = load();
//! let inspector = Inspector::new(&template, &roi, InspectionParams::default())?;
//! let result = inspector.inspect(&captured)?;
//! for d in &result.defects {
//!     println!("{:?} at ({:.1}, {:.1}) r={:.1}", d.cue, d.center.x, d.center.y, d.radius);
//! }
//! # Ok::<(), sheet_inspect_detect::InspectError>(())
//! ```

mod config;
mod contours;
pub mod cues;
mod error;
mod fusion;
mod io;
mod normalize;
mod params;
mod pipeline;
mod result;

pub use config::{is_flat_layout, ConfigIoError};
pub use contours::{
    circularity, clean_and_extract, clean_and_extract_within, min_enclosing_circle, Extraction,
    LabelImage, Region, CIRCULARITY_AREA_LIMIT, MIN_CIRCULARITY,
};
pub use cues::{ClassicMasks, CueKind, CueLayer};
pub use error::InspectError;
pub use fusion::{fuse_union, fuse_weighted, overexposure_mask, simple_score, weighted_score};
pub use io::{InspectionReport, ReportSources};
pub use normalize::{luminance_delta, normalize_to_template, PhotometricCorrection};
pub use params::{
    ClassicParams, ColorMetric, ColorParams, ConfigWarning, FusionMode, InspectionMode,
    InspectionParams, MorphMapParams, MorphParams, NormalizeParams, SimpleModeParams,
    StructuralParams, WeightedFusionParams,
};
pub use pipeline::{inspect, Inspector};
pub use result::{CueDiagnostics, Defect, InspectionResult};

pub use sheet_inspect_align::{AlignParams, Registration};
