//! Core image, mask and geometry utilities for template-referenced sheet
//! inspection.
//!
//! Everything operates on `image` crate buffers: 8-bit [`image::GrayImage`] /
//! [`image::RgbImage`] for pixels and masks, and [`FloatMap`] for cue maps.
//! Nothing here knows about defects; the detection pipeline lives in
//! `sheet-inspect-detect`.

mod color;
mod filter;
mod homography;
mod logger;
mod mask;
mod morphology;
mod raster;

pub use color::{gray_bt601, lab8_to_rgb, rgb_to_lab8, value_channel, LabPlanes};
pub use filter::{
    downsample_area, gaussian_blur, gaussian_blur_gray, gaussian_kernel, odd_kernel_size,
    resize_bilinear, separable_filter,
};
pub use homography::{
    estimate_homography, fit_homography_ransac, homography_from_4pt, warp_perspective_rgb,
    Homography, HomographyError, RansacFit, RansacParams,
};
pub use mask::{
    count_nonzero, mask_and, mask_and_not, mask_not, mask_or, percentile, union_all, MaskError,
    RoiMask, MASK_ON,
};
pub use morphology::{
    black_hat, close, dilate, erode, morphological_gradient, open, open_close, top_hat,
};
pub use raster::{
    crop_window, float_map_from_gray, float_map_from_vec, gray_from_float_map, normalize01,
    round_u8, sample_bilinear, sample_bilinear_rgb, saturating_difference, value_range, FloatMap,
    PixelRect,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{default_directives, init_with_level, INSPECT_CRATES};
