use crate::raster::{round_u8, sample_bilinear_rgb};
use image::{Rgb, RgbImage};
use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Projective transform acting on pixel coordinates: `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl From<[[f64; 3]; 3]> for Homography {
    fn from(rows: [[f64; 3]; 3]) -> Self {
        Self::from_array(rows)
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        h.to_array()
    }
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// Transfer error `|H * src - dst|` in pixels.
    #[inline]
    pub fn transfer_error(&self, src: Point2<f32>, dst: Point2<f32>) -> f64 {
        let v = self.h * Vector3::new(src.x as f64, src.y as f64, 1.0);
        if v[2].abs() < 1e-12 {
            return f64::INFINITY;
        }
        let dx = v[0] / v[2] - dst.x as f64;
        let dy = v[1] / v[2] - dst.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    #[error("need at least {needed} correspondences, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("point sets differ in length ({src} vs {dst})")]
    LengthMismatch { src: usize, dst: usize },
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("insufficient inliers: need {needed}, found {found}")]
    InsufficientInliers { needed: usize, found: usize },
    #[error("estimated homography is not invertible")]
    NotInvertible,
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points(pts: &[Point2<f32>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // translate to centroid, scale so mean distance = sqrt(2)
    let n = pts.len() as f64;
    let (mut cx, mut cy) = (0.0, 0.0);
    for p in pts {
        cx += p.x as f64;
        cy += p.y as f64;
    }
    cx /= n;
    cy /= n;

    let mean_dist = pts
        .iter()
        .map(|p| {
            let dx = p.x as f64 - cx;
            let dy = p.y as f64 - cy;
            (dx * dx + dy * dy).sqrt()
        })
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Direct linear estimate of H with `dst ~ H * src` from `n >= 4` pairs.
pub fn estimate_homography(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    if src.len() == 4 {
        let s: &[Point2<f32>; 4] = src.try_into().ok()?;
        let d: &[Point2<f32>; 4] = dst.try_into().ok()?;
        return homography_from_4pt(s, d);
    }

    let (r, tr) = normalize_points(src);
    let (i, ti) = normalize_points(dst);

    // A is 2N x 9
    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);

    for k in 0..n {
        let (x, y) = (r[k].x, r[k].y);
        let (u, v) = (i[k].x, i[k].y);

        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // h is the right singular vector with the smallest singular value
    let svd = a.svd(true, true);
    let vt = svd.v_t?;
    let last = vt.nrows().checked_sub(1)?;
    let h = vt.row(last);

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    let h_den = denormalize_homography(hn, tr, ti)?;
    let h_den = normalize_homography(h_den)?;

    Some(Homography::new(h_den))
}

/// Exact H with `dst ~ H * src` from four correspondences (h33 fixed to 1).
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let (x, y) = (src_n[k].x, src_n[k].y);
        let (u, v) = (dst_n[k].x, dst_n[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h_den = denormalize_homography(hn, t_src, t_dst)?;
    let h_den = normalize_homography(h_den)?;

    Some(Homography::new(h_den))
}

/// RANSAC settings for [`fit_homography_ransac`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    pub max_iters: usize,
    /// Transfer error (pixels) below which a pair counts as an inlier.
    pub inlier_threshold: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 3.0,
            min_inliers: 4,
            seed: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RansacFit {
    pub homography: Homography,
    pub inlier_mask: Vec<bool>,
    pub n_inliers: usize,
}

fn inliers_of(
    h: &Homography,
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    threshold: f64,
) -> (Vec<bool>, usize) {
    let mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(&s, &d)| h.transfer_error(s, d) < threshold)
        .collect();
    let count = mask.iter().filter(|&&m| m).count();
    (mask, count)
}

/// Robust `dst ~ H * src` fit: seeded 4-point sampling, then a DLT refit on
/// the best consensus set.
pub fn fit_homography_ransac(
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    params: &RansacParams,
) -> Result<RansacFit, HomographyError> {
    let n = src.len();
    if n != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: n,
            dst: dst.len(),
        });
    }
    if n < 4 {
        return Err(HomographyError::TooFewPoints { needed: 4, got: n });
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(Homography, Vec<bool>, usize)> = None;

    for _ in 0..params.max_iters.max(1) {
        let mut idx = [0usize; 4];
        let mut filled = 0;
        let mut attempts = 0;
        while filled < 4 && attempts < 100 {
            let c = rng.gen_range(0..n);
            if !idx[..filled].contains(&c) {
                idx[filled] = c;
                filled += 1;
            }
            attempts += 1;
        }
        if filled < 4 {
            continue;
        }

        let s4 = idx.map(|i| src[i]);
        let d4 = idx.map(|i| dst[i]);
        let Some(h) = homography_from_4pt(&s4, &d4) else {
            continue;
        };

        let (mask, count) = inliers_of(&h, src, dst, params.inlier_threshold);
        if best.as_ref().is_none_or(|(_, _, c)| count > *c) {
            best = Some((h, mask, count));
            // early exit above 90% inliers
            if count * 10 > n * 9 {
                break;
            }
        }
    }

    let (best_h, best_mask, best_count) = best.ok_or(HomographyError::Degenerate)?;
    if best_count < params.min_inliers.max(4) {
        return Err(HomographyError::InsufficientInliers {
            needed: params.min_inliers.max(4),
            found: best_count,
        });
    }

    let in_src: Vec<Point2<f32>> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let in_dst: Vec<Point2<f32>> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let refit = estimate_homography(&in_src, &in_dst).unwrap_or(best_h);

    let (inlier_mask, n_inliers) = inliers_of(&refit, src, dst, params.inlier_threshold);
    let (homography, inlier_mask, n_inliers) = if n_inliers >= best_count {
        (refit, inlier_mask, n_inliers)
    } else {
        (best_h, best_mask, best_count)
    };

    if homography.inverse().is_none() {
        return Err(HomographyError::NotInvertible);
    }

    Ok(RansacFit {
        homography,
        inlier_mask,
        n_inliers,
    })
}

/// Warp into an `out_w x out_h` frame: each output pixel `p` samples `src`
/// at `h_src_from_dst * p`. Samples falling outside `src` are black.
pub fn warp_perspective_rgb(
    src: &RgbImage,
    h_src_from_dst: &Homography,
    out_w: u32,
    out_h: u32,
) -> RgbImage {
    RgbImage::from_fn(out_w, out_h, |x, y| {
        let p = h_src_from_dst.apply(Point2::new(x as f32, y as f32));
        if !p.x.is_finite() || !p.y.is_finite() {
            return Rgb([0, 0, 0]);
        }
        let v = sample_bilinear_rgb(src, p.x, p.y);
        Rgb([round_u8(v[0]), round_u8(v[1]), round_u8(v[2])])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point2<f32>, b: Point2<f32>, tol: f32) {
        let dx = (a.x - b.x).abs();
        let dy = (a.y - b.y).abs();
        assert!(
            dx < tol && dy < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    fn skewed() -> Homography {
        Homography::new(Matrix3::new(
            1.02, 0.03, 6.0, //
            -0.025, 0.98, -4.0, //
            0.00002, -0.00001, 1.0,
        ))
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = skewed();
        let inv = h.inverse().expect("invertible");
        for p in [
            Point2::new(0.0_f32, 0.0),
            Point2::new(50.0_f32, -20.0),
            Point2::new(320.0_f32, 200.0),
        ] {
            assert_close(inv.apply(h.apply(p)), p, 1e-3);
        }
    }

    #[test]
    fn four_point_solution_recovers_h() {
        let gt = skewed();
        let src = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(180.0, 0.0),
            Point2::new(180.0, 130.0),
            Point2::new(0.0, 130.0),
        ];
        let dst = src.map(|p| gt.apply(p));
        let h = homography_from_4pt(&src, &dst).expect("recoverable");
        for p in [Point2::new(60.0_f32, 40.0), Point2::new(150.0, 120.0)] {
            assert_close(h.apply(p), gt.apply(p), 1e-3);
        }
    }

    #[test]
    fn dlt_handles_overdetermined_case() {
        let gt = skewed();
        let src: Vec<Point2<f32>> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Point2::new(x as f32 * 40.0, y as f32 * 50.0)))
            .collect();
        let dst: Vec<Point2<f32>> = src.iter().map(|&p| gt.apply(p)).collect();
        let h = estimate_homography(&src, &dst).expect("estimate");
        assert_close(h.apply(Point2::new(80.0, 90.0)), gt.apply(Point2::new(80.0, 90.0)), 1e-3);
    }

    #[test]
    fn ransac_rejects_outliers() {
        let gt = skewed();
        let mut rng = StdRng::seed_from_u64(7);
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for _ in 0..40 {
            let p = Point2::new(rng.gen_range(0.0..400.0_f32), rng.gen_range(0.0..300.0_f32));
            src.push(p);
            dst.push(gt.apply(p));
        }
        for _ in 0..15 {
            src.push(Point2::new(rng.gen_range(0.0..400.0_f32), rng.gen_range(0.0..300.0_f32)));
            dst.push(Point2::new(rng.gen_range(0.0..400.0_f32), rng.gen_range(0.0..300.0_f32)));
        }
        let fit = fit_homography_ransac(&src, &dst, &RansacParams::default()).expect("fit");
        assert!(fit.n_inliers >= 40, "only {} inliers", fit.n_inliers);
        assert!(fit.inlier_mask[..40].iter().all(|&m| m));
        assert_close(
            fit.homography.apply(Point2::new(200.0, 150.0)),
            gt.apply(Point2::new(200.0, 150.0)),
            1e-2,
        );
    }

    #[test]
    fn ransac_needs_four_points() {
        let pts = vec![Point2::new(0.0_f32, 0.0); 3];
        assert_eq!(
            fit_homography_ransac(&pts, &pts, &RansacParams::default()).unwrap_err(),
            HomographyError::TooFewPoints { needed: 4, got: 3 }
        );
    }

    #[test]
    fn identity_warp_is_lossless() {
        let img = RgbImage::from_fn(9, 7, |x, y| Rgb([(x * 20) as u8, (y * 30) as u8, 77]));
        let out = warp_perspective_rgb(&img, &Homography::identity(), 9, 7);
        assert_eq!(out, img);
    }
}
