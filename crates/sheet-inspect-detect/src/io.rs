//! JSON report of an inspection.

use crate::config::ConfigIoError;
use crate::normalize::PhotometricCorrection;
use crate::params::{ConfigWarning, InspectionMode, InspectionParams};
use crate::result::{Defect, InspectionResult};
use serde::{Deserialize, Serialize};
use sheet_inspect_align::Registration;
use sheet_inspect_core::PixelRect;
use std::{fs, path::Path};

/// Inputs of a report, as given on the command line or by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSources {
    pub template_path: Option<String>,
    pub mask_path: Option<String>,
    pub image_path: Option<String>,
    pub mask_output_path: Option<String>,
}

/// Serializable summary of one inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionReport {
    #[serde(flatten)]
    pub sources: ReportSources,
    pub mode: InspectionMode,
    pub template_size: [u32; 2],
    pub window: PixelRect,
    pub registration: Registration,
    pub correction: Option<PhotometricCorrection>,
    pub defect_count: usize,
    pub defects: Vec<Defect>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_warnings: Vec<ConfigWarning>,
    pub params: InspectionParams,
    pub elapsed_ms: f64,
}

impl InspectionReport {
    pub fn new(
        result: &InspectionResult,
        params: &InspectionParams,
        window: PixelRect,
        sources: ReportSources,
        elapsed_ms: f64,
    ) -> Self {
        Self {
            sources,
            mode: result.mode,
            template_size: [result.mask.width(), result.mask.height()],
            window,
            registration: result.registration.clone(),
            correction: result.correction.clone(),
            defect_count: result.defects.len(),
            defects: result.defects.clone(),
            config_warnings: Vec::new(),
            params: params.clone(),
            elapsed_ms,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<ConfigWarning>) -> Self {
        self.config_warnings = warnings;
        self
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
