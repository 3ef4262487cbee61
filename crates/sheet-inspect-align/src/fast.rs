//! FAST-9 corner detection with 3x3 non-maximum suppression.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Bresenham circle of radius 3, clockwise from 12 o'clock.
const RING: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

const ARC: usize = 9;

/// Detected corner in pixel-index coordinates of the image it was found in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Sum of contrast in excess of the threshold over the winning arc class.
    pub score: f32,
    /// Intensity-centroid orientation in radians.
    pub angle: f32,
}

#[inline]
fn has_arc(flags: u16) -> bool {
    let doubled = (flags as u32) | ((flags as u32) << 16);
    let mut run = 0;
    for i in 0..32 {
        if doubled & (1 << i) != 0 {
            run += 1;
            if run >= ARC {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

fn corner_score(img: &GrayImage, x: u32, y: u32, threshold: i16) -> Option<f32> {
    let p = img.get_pixel(x, y)[0] as i16;
    let mut bright = 0u16;
    let mut dark = 0u16;
    let mut bright_sum = 0i32;
    let mut dark_sum = 0i32;
    for (i, (dx, dy)) in RING.iter().enumerate() {
        let v = img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as i16;
        let d = v - p;
        if d > threshold {
            bright |= 1 << i;
            bright_sum += (d - threshold) as i32;
        } else if d < -threshold {
            dark |= 1 << i;
            dark_sum += (-d - threshold) as i32;
        }
    }

    let mut best = None;
    if bright.count_ones() as usize >= ARC && has_arc(bright) {
        best = Some(bright_sum as f32);
    }
    if dark.count_ones() as usize >= ARC && has_arc(dark) {
        let s = dark_sum as f32;
        best = Some(best.map_or(s, |b: f32| b.max(s)));
    }
    best
}

/// FAST-9 corners at least `margin` pixels away from the border, suppressed
/// to local maxima and sorted by descending score (ties in raster order).
///
/// Returns at most `max_features` keypoints; `angle` is left at zero.
pub fn detect_fast(
    img: &GrayImage,
    threshold: u8,
    margin: u32,
    max_features: usize,
) -> Vec<Keypoint> {
    let (w, h) = img.dimensions();
    let margin = margin.max(3);
    if w <= 2 * margin || h <= 2 * margin {
        return Vec::new();
    }

    let (wu, hu) = (w as usize, h as usize);
    let mut scores = vec![0.0f32; wu * hu];
    let t = threshold as i16;
    for y in margin..h - margin {
        for x in margin..w - margin {
            if let Some(s) = corner_score(img, x, y, t) {
                // 0 is reserved for "no corner"
                scores[y as usize * wu + x as usize] = s + 1.0;
            }
        }
    }

    let mut out = Vec::new();
    for y in margin as usize..hu - margin as usize {
        for x in margin as usize..wu - margin as usize {
            let s = scores[y * wu + x];
            if s <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'nbr: for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let n = scores[(y as i64 + dy) as usize * wu + (x as i64 + dx) as usize];
                    let earlier = dy < 0 || (dy == 0 && dx < 0);
                    if n > s || (earlier && n == s) {
                        is_max = false;
                        break 'nbr;
                    }
                }
            }
            if is_max {
                out.push(Keypoint {
                    x: x as f32,
                    y: y as f32,
                    score: s,
                    angle: 0.0,
                });
            }
        }
    }

    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.y.total_cmp(&b.y))
            .then(a.x.total_cmp(&b.x))
    });
    out.truncate(max_features);
    out
}
