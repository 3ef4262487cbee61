//! Oriented BRIEF: intensity-centroid orientation and 256-bit binary
//! descriptors steered by that orientation.

use crate::fast::Keypoint;
use image::GrayImage;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Radius of the disc used for the intensity centroid.
pub const ORIENTATION_RADIUS: i32 = 15;
/// Half-width of the square the test pairs are drawn from.
pub const PATCH_HALF: i32 = 13;
/// Minimum distance from the border for a keypoint to be describable.
///
/// Covers the orientation disc and a fully rotated test pair
/// (`PATCH_HALF * sqrt(2)`, rounded up).
pub const DESCRIPTOR_MARGIN: u32 = 19;

pub type Descriptor = [u64; 4];

#[inline]
pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Fixed set of 256 point-pair tests, reproducible from a seed.
#[derive(Clone, Debug)]
pub struct BriefPattern {
    pairs: Vec<[(f32, f32); 2]>,
}

impl BriefPattern {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut coord = || rng.gen_range(-PATCH_HALF..=PATCH_HALF) as f32;
        let pairs = (0..256)
            .map(|_| [(coord(), coord()), (coord(), coord())])
            .collect();
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Angle of the vector from the keypoint to the intensity centroid of the
/// surrounding disc. The keypoint must be `ORIENTATION_RADIUS` from the border.
pub fn orientation(img: &GrayImage, x: u32, y: u32) -> f32 {
    let r = ORIENTATION_RADIUS;
    let (mut m01, mut m10) = (0i64, 0i64);
    for dy in -r..=r {
        let span = ((r * r - dy * dy) as f32).sqrt() as i32;
        for dx in -span..=span {
            let v = img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

/// Steered BRIEF descriptor sampled on a pre-smoothed image.
pub fn describe(smoothed: &GrayImage, kp: &Keypoint, pattern: &BriefPattern) -> Descriptor {
    let (s, c) = kp.angle.sin_cos();
    let (w, h) = smoothed.dimensions();
    let sample = |(px, py): (f32, f32)| -> u8 {
        let rx = (kp.x + c * px - s * py).round() as i64;
        let ry = (kp.y + s * px + c * py).round() as i64;
        let rx = rx.clamp(0, w as i64 - 1) as u32;
        let ry = ry.clamp(0, h as i64 - 1) as u32;
        smoothed.get_pixel(rx, ry)[0]
    };

    let mut desc = [0u64; 4];
    for (bit, [a, b]) in pattern.pairs.iter().enumerate() {
        if sample(*a) < sample(*b) {
            desc[bit / 64] |= 1 << (bit % 64);
        }
    }
    desc
}
