use crate::fast::{detect_fast, Keypoint};
use crate::matcher::{match_mutual, retain_best};
use crate::orb::{describe, orientation, BriefPattern, Descriptor, DESCRIPTOR_MARGIN};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use sheet_inspect_core::{
    fit_homography_ransac, gaussian_blur_gray, gray_bt601, warp_perspective_rgb, Homography,
    HomographyError, RansacParams,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters of the feature-based registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignParams {
    /// When `false` every capture is treated as already registered.
    pub enabled: bool,
    /// Scale applied to both images before feature extraction (`1.0` = full
    /// resolution). The homography is always reported at full resolution.
    pub downscale: f32,
    pub max_features: usize,
    pub fast_threshold: u8,
    /// Fraction of the sorted mutual matches passed to RANSAC.
    pub good_match_fraction: f32,
    pub ransac: RansacParams,
    /// Seed of the BRIEF test pattern.
    pub pattern_seed: u64,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            enabled: true,
            downscale: 0.5,
            max_features: 1000,
            fast_threshold: 20,
            good_match_fraction: 0.2,
            ransac: RansacParams::default(),
            pattern_seed: 0x0B5E_55ED,
        }
    }
}

/// Errors raised while estimating the captured-to-template homography.
#[derive(thiserror::Error, Debug)]
pub enum AlignError {
    #[error("no describable keypoints (template={template}, captured={captured})")]
    NoKeypoints { template: usize, captured: usize },
    #[error("too few feature matches: need 4, found {found}")]
    InsufficientMatches { found: usize },
    #[error(transparent)]
    Homography(#[from] HomographyError),
}

/// Outcome of registering a capture against the template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Registration {
    /// `homography` maps captured-image pixels to template pixels.
    Aligned {
        homography: Homography,
        matches: usize,
        inliers: usize,
    },
    /// Identity was used instead; results carry lower confidence.
    Unaligned { reason: String },
}

impl Registration {
    pub fn is_aligned(&self) -> bool {
        matches!(self, Registration::Aligned { .. })
    }

    /// Captured-to-template transform (identity when unaligned).
    pub fn homography(&self) -> Homography {
        match self {
            Registration::Aligned { homography, .. } => *homography,
            Registration::Unaligned { .. } => Homography::identity(),
        }
    }
}

/// Captured image resampled into the template frame.
#[derive(Clone, Debug)]
pub struct Alignment {
    pub image: RgbImage,
    pub registration: Registration,
}

/// Keypoints (full-resolution coordinates) and their descriptors.
#[derive(Clone, Debug, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn point(&self, idx: usize) -> Point2<f32> {
        let kp = &self.keypoints[idx];
        Point2::new(kp.x, kp.y)
    }
}

/// ORB-style registration of captures onto a fixed template.
pub struct FeatureAligner {
    params: AlignParams,
    pattern: BriefPattern,
}

impl FeatureAligner {
    pub fn new(params: AlignParams) -> Self {
        let pattern = BriefPattern::new(params.pattern_seed);
        Self { params, pattern }
    }

    #[inline]
    pub fn params(&self) -> &AlignParams {
        &self.params
    }

    fn working_gray(&self, img: &RgbImage) -> (GrayImage, f32, f32) {
        let gray = gray_bt601(img);
        let s = self.params.downscale;
        if !(s > 0.0 && s < 1.0) {
            return (gray, 1.0, 1.0);
        }
        let (w, h) = gray.dimensions();
        let nw = ((w as f32 * s).round() as u32).max(1);
        let nh = ((h as f32 * s).round() as u32).max(1);
        let small = imageops::resize(&gray, nw, nh, FilterType::Triangle);
        (small, nw as f32 / w as f32, nh as f32 / h as f32)
    }

    /// Detect and describe features; coordinates are mapped back to the
    /// full-resolution frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img), fields(width = img.width(), height = img.height()))
    )]
    pub fn features(&self, img: &RgbImage) -> FeatureSet {
        let (gray, sx, sy) = self.working_gray(img);
        let smoothed = gaussian_blur_gray(&gray, 7, 2.0);
        let mut keypoints = detect_fast(
            &gray,
            self.params.fast_threshold,
            DESCRIPTOR_MARGIN,
            self.params.max_features,
        );

        let mut descriptors = Vec::with_capacity(keypoints.len());
        for kp in &mut keypoints {
            kp.angle = orientation(&gray, kp.x as u32, kp.y as u32);
            descriptors.push(describe(&smoothed, kp, &self.pattern));
            // pixel-center convention when scaling back
            kp.x = (kp.x + 0.5) / sx - 0.5;
            kp.y = (kp.y + 0.5) / sy - 0.5;
        }

        FeatureSet {
            keypoints,
            descriptors,
        }
    }

    /// Estimate the captured-to-template homography from precomputed
    /// template features. Returns `(H, matches, inliers)`.
    pub fn estimate(
        &self,
        captured: &RgbImage,
        template: &FeatureSet,
    ) -> Result<(Homography, usize, usize), AlignError> {
        let cap = self.features(captured);
        if cap.is_empty() || template.is_empty() {
            return Err(AlignError::NoKeypoints {
                template: template.len(),
                captured: cap.len(),
            });
        }

        let mut matches = match_mutual(&template.descriptors, &cap.descriptors);
        retain_best(&mut matches, self.params.good_match_fraction);
        if matches.len() < 4 {
            return Err(AlignError::InsufficientMatches {
                found: matches.len(),
            });
        }

        let src: Vec<Point2<f32>> = matches.iter().map(|m| cap.point(m.captured_idx)).collect();
        let dst: Vec<Point2<f32>> = matches.iter().map(|m| template.point(m.template_idx)).collect();
        let fit = fit_homography_ransac(&src, &dst, &self.params.ransac)?;
        log::debug!(
            "registration: {} keypoints, {} matches, {} inliers",
            cap.len(),
            matches.len(),
            fit.n_inliers
        );
        Ok((fit.homography, matches.len(), fit.n_inliers))
    }

    /// Register `captured` onto a template of size `template_dims`.
    ///
    /// Any failure degrades to the identity transform and is reported as
    /// [`Registration::Unaligned`].
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, captured, template), fields(width = captured.width(), height = captured.height()))
    )]
    pub fn align_or_identity(
        &self,
        captured: &RgbImage,
        template: &FeatureSet,
        template_dims: (u32, u32),
    ) -> Alignment {
        let (tw, th) = template_dims;
        if !self.params.enabled {
            return identity_alignment(captured, tw, th, "alignment disabled".to_string());
        }
        match self.estimate(captured, template) {
            Ok((homography, matches, inliers)) => match homography.inverse() {
                Some(h_cap_from_tpl) => Alignment {
                    image: warp_perspective_rgb(captured, &h_cap_from_tpl, tw, th),
                    registration: Registration::Aligned {
                        homography,
                        matches,
                        inliers,
                    },
                },
                None => {
                    let err = AlignError::from(HomographyError::NotInvertible);
                    log::warn!("alignment failed, using identity: {err}");
                    identity_alignment(captured, tw, th, err.to_string())
                }
            },
            Err(err) => {
                log::warn!("alignment failed, using identity: {err}");
                identity_alignment(captured, tw, th, err.to_string())
            }
        }
    }

    /// Convenience wrapper extracting template features on the fly.
    pub fn align(&self, captured: &RgbImage, template: &RgbImage) -> Alignment {
        let features = self.features(template);
        self.align_or_identity(captured, &features, template.dimensions())
    }
}

fn identity_alignment(captured: &RgbImage, w: u32, h: u32, reason: String) -> Alignment {
    let image = if captured.dimensions() == (w, h) {
        captured.clone()
    } else {
        warp_perspective_rgb(captured, &Homography::identity(), w, h)
    };
    Alignment {
        image,
        registration: Registration::Unaligned { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn flat_images_fall_back_to_identity() {
        let aligner = FeatureAligner::new(AlignParams::default());
        let tpl = RgbImage::from_pixel(120, 90, Rgb([90, 90, 90]));
        let cap = RgbImage::from_pixel(130, 80, Rgb([90, 90, 90]));
        let out = aligner.align(&cap, &tpl);
        assert!(!out.registration.is_aligned());
        assert_eq!(out.image.dimensions(), (120, 90));
        assert_eq!(out.registration.homography(), Homography::identity());
        // padded area is black
        assert_eq!(out.image.get_pixel(10, 85)[0], 0);
    }

    #[test]
    fn disabled_alignment_reports_reason() {
        let aligner = FeatureAligner::new(AlignParams {
            enabled: false,
            ..AlignParams::default()
        });
        let img = RgbImage::from_pixel(40, 30, Rgb([10, 20, 30]));
        let out = aligner.align(&img, &img);
        match out.registration {
            Registration::Unaligned { reason } => assert!(reason.contains("disabled")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(out.image, img);
    }

    #[test]
    fn registration_serializes_with_status_tag() {
        let r = Registration::Unaligned {
            reason: "no keypoints".into(),
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"status\":\"unaligned\""));
    }
}
