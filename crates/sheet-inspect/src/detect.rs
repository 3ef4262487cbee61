use crate::inspect::{
    ConfigIoError, ConfigWarning, InspectError, InspectionParams, InspectionReport,
    InspectionResult, Inspector, ReportSources,
};
use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the file-level helpers.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("failed to read image {path}: {source}")]
    ReadImage {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("failed to write mask {path}: {source}")]
    WriteMask {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error(transparent)]
    Inspect(#[from] InspectError),

    #[error(transparent)]
    Report(#[from] ConfigIoError),
}

/// Load an image file as 8-bit RGB. Alpha is dropped, gray is expanded.
pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage, DetectError> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|source| DetectError::ReadImage {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Load an ROI mask; any non-zero luma counts as inside.
pub fn load_mask(path: impl AsRef<Path>) -> Result<GrayImage, DetectError> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|source| DetectError::ReadImage {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_luma8())
}

/// Write a binary mask; the format follows the file extension.
pub fn save_mask(mask: &GrayImage, path: impl AsRef<Path>) -> Result<(), DetectError> {
    let path = path.as_ref();
    mask.save(path).map_err(|source| DetectError::WriteMask {
        path: path.to_path_buf(),
        source,
    })
}

/// Build an [`Inspector`] from a template image and ROI mask on disk.
pub fn inspector_from_files(
    template: impl AsRef<Path>,
    roi_mask: impl AsRef<Path>,
    params: InspectionParams,
) -> Result<Inspector, DetectError> {
    let template = load_rgb(template)?;
    let mask = load_mask(roi_mask)?;
    Ok(Inspector::new(&template, &mask, params)?)
}

/// Input and output locations of one file-level inspection.
#[derive(Clone, Debug)]
pub struct InspectionPaths {
    pub template: PathBuf,
    pub roi_mask: PathBuf,
    pub image: PathBuf,
    pub report: Option<PathBuf>,
    pub mask_out: Option<PathBuf>,
}

impl InspectionPaths {
    fn sources(&self) -> ReportSources {
        ReportSources {
            template_path: Some(self.template.display().to_string()),
            mask_path: Some(self.roi_mask.display().to_string()),
            image_path: Some(self.image.display().to_string()),
            mask_output_path: self.mask_out.as_ref().map(|p| p.display().to_string()),
        }
    }
}

/// Result of [`inspect_files`]: the in-memory result and its report.
#[derive(Debug)]
pub struct FileInspection {
    pub result: InspectionResult,
    pub report: InspectionReport,
}

/// Load the three inputs, inspect once and write whichever outputs are
/// requested in `paths`.
///
/// `warnings` are the configuration warnings collected while loading
/// `params`; they are carried into the report.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(params, warnings), fields(image = %paths.image.display()))
)]
pub fn inspect_files(
    paths: &InspectionPaths,
    params: InspectionParams,
    warnings: Vec<ConfigWarning>,
) -> Result<FileInspection, DetectError> {
    let t0 = Instant::now();
    let inspector = inspector_from_files(&paths.template, &paths.roi_mask, params)?;
    let captured = load_rgb(&paths.image)?;
    let result = inspector.inspect(&captured)?;
    let elapsed_ms = t0.elapsed().as_secs_f64() * 1e3;

    let report = InspectionReport::new(
        &result,
        inspector.params(),
        inspector.window(),
        paths.sources(),
        elapsed_ms,
    )
    .with_warnings(warnings);

    if let Some(out) = &paths.report {
        report.write_json(out)?;
        log::info!("report written to {}", out.display());
    }
    if let Some(out) = &paths.mask_out {
        save_mask(&result.mask, out)?;
        log::info!("mask written to {}", out.display());
    }
    Ok(FileInspection { result, report })
}
