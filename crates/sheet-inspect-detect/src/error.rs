use sheet_inspect_core::MaskError;

/// Fatal inspection errors. Everything else degrades gracefully.
#[derive(thiserror::Error, Debug)]
pub enum InspectError {
    #[error("ROI mask has no foreground pixels")]
    EmptyRoi,
    #[error("ROI mask is {mask:?} but the template is {template:?}")]
    DimensionMismatch {
        template: (u32, u32),
        mask: (u32, u32),
    },
}

impl From<MaskError> for InspectError {
    fn from(err: MaskError) -> Self {
        match err {
            MaskError::Empty => InspectError::EmptyRoi,
        }
    }
}
