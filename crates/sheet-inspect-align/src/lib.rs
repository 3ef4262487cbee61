//! Feature-based registration of captured sheet photographs onto a reference
//! template.
//!
//! Pipeline:
//! - FAST-9 corners on a downscaled gray image, strongest `max_features` kept,
//! - intensity-centroid orientation and steered 256-bit BRIEF descriptors,
//! - mutual-nearest Hamming matching, best fraction retained,
//! - seeded RANSAC homography (captured -> template) at full resolution,
//! - bilinear perspective warp into the template frame.
//!
//! Failures never abort an inspection: [`FeatureAligner::align_or_identity`]
//! falls back to the identity transform and reports
//! [`Registration::Unaligned`].

mod aligner;
mod fast;
mod matcher;
mod orb;

pub use aligner::{AlignError, AlignParams, Alignment, FeatureAligner, FeatureSet, Registration};
pub use fast::{detect_fast, Keypoint};
pub use matcher::{match_mutual, retain_best, FeatureMatch};
pub use orb::{describe, hamming, orientation, BriefPattern, Descriptor, DESCRIPTOR_MARGIN};
