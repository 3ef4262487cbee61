//! Facade crate for the `sheet-inspect-*` workspace.
//!
//! Compares a captured photo of a printed sheet with its reference template
//! and reports localized defects (spots, scratches, missing ink, color
//! shifts) inside a region-of-interest mask.
//!
//! This crate provides:
//! - re-exports of the underlying crates
//! - (feature `image`) helpers that load template, ROI mask and capture from
//!   image files, run an inspection and write the report and mask
//! - (feature `cli`) the `sheet-inspect` binary
//!
//! ## Quickstart
//!
//! ```no_run
//! use sheet_inspect::detect;
//! use sheet_inspect::InspectionParams;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let inspector = detect::inspector_from_files("template.png", "roi.png", InspectionParams::default())?;
//! let captured = detect::load_rgb("frame_0001.jpg")?;
//! let result = inspector.inspect(&captured)?;
//! println!("{} defect(s)", result.defect_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `sheet_inspect::core`: rasters, color, filters, morphology, masks, homographies.
//! - `sheet_inspect::align`: FAST/BRIEF features and RANSAC registration.
//! - `sheet_inspect::inspect`: cue extraction, fusion and defect extraction.
//! - `sheet_inspect::detect` (feature `image`): file-level helpers.

pub use sheet_inspect_align as align;
pub use sheet_inspect_core as core;
pub use sheet_inspect_detect as inspect;

pub use sheet_inspect_detect::{
    AlignParams, ConfigWarning, CueKind, Defect, FusionMode, InspectError, InspectionMode,
    InspectionParams, InspectionReport, InspectionResult, Inspector, Registration, ReportSources,
};

#[cfg(feature = "image")]
pub mod detect;
