//! Color conversions used by the inspection cues.
//!
//! Lab values use the 8-bit convention common to machine-vision tooling:
//! `L` scaled to `[0, 255]`, `a` and `b` offset by 128.

use crate::raster::{float_map_from_vec, round_u8, FloatMap};
use image::{GrayImage, Luma, Rgb, RgbImage};
use palette::white_point::D65;
use palette::{FromColor, Lab, LinSrgb, Srgb};

/// Luma with BT.601 weights (0.299, 0.587, 0.114).
pub fn gray_bt601(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0;
        Luma([round_u8(0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)])
    })
}

/// HSV value channel: the per-pixel maximum of R, G and B.
pub fn value_channel(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0;
        Luma([r.max(g).max(b)])
    })
}

pub fn rgb_to_lab8(rgb: [u8; 3]) -> [f32; 3] {
    let lin: LinSrgb<f32> = Srgb::new(
        rgb[0] as f32 / 255.0,
        rgb[1] as f32 / 255.0,
        rgb[2] as f32 / 255.0,
    )
    .into_linear();
    let lab: Lab<D65, f32> = Lab::from_color(lin);
    [lab.l * 255.0 / 100.0, lab.a + 128.0, lab.b + 128.0]
}

pub fn lab8_to_rgb(lab: [f32; 3]) -> [u8; 3] {
    let lab = Lab::<D65, f32>::new(lab[0] * 100.0 / 255.0, lab[1] - 128.0, lab[2] - 128.0);
    let lin = LinSrgb::<f32>::from_color(lab);
    let srgb: Srgb<f32> = Srgb::from_linear(lin);
    [
        round_u8(srgb.red * 255.0),
        round_u8(srgb.green * 255.0),
        round_u8(srgb.blue * 255.0),
    ]
}

/// Planar 8-bit-scaled Lab representation of an RGB image.
#[derive(Clone, Debug)]
pub struct LabPlanes {
    pub l: FloatMap,
    pub a: FloatMap,
    pub b: FloatMap,
}

impl LabPlanes {
    pub fn from_rgb(img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        let n = (w * h) as usize;
        let mut l = Vec::with_capacity(n);
        let mut a = Vec::with_capacity(n);
        let mut b = Vec::with_capacity(n);
        for p in img.pixels() {
            let [pl, pa, pb] = rgb_to_lab8(p.0);
            l.push(pl);
            a.push(pa);
            b.push(pb);
        }
        Self {
            l: float_map_from_vec(w, h, l),
            a: float_map_from_vec(w, h, a),
            b: float_map_from_vec(w, h, b),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.l.dimensions()
    }

    pub fn planes(&self) -> [&FloatMap; 3] {
        [&self.l, &self.a, &self.b]
    }

    pub fn planes_mut(&mut self) -> [&mut FloatMap; 3] {
        [&mut self.l, &mut self.a, &mut self.b]
    }

    /// Convert back to RGB; every plane is clipped to `[0, 255]` first.
    pub fn to_rgb(&self) -> RgbImage {
        let (w, h) = self.dimensions();
        RgbImage::from_fn(w, h, |x, y| {
            let v = [
                self.l.get_pixel(x, y)[0].clamp(0.0, 255.0),
                self.a.get_pixel(x, y)[0].clamp(0.0, 255.0),
                self.b.get_pixel(x, y)[0].clamp(0.0, 255.0),
            ];
            Rgb(lab8_to_rgb(v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn neutral_gray_has_centered_chroma() {
        let lab = rgb_to_lab8([128, 128, 128]);
        assert_abs_diff_eq!(lab[1], 128.0, epsilon = 0.5);
        assert_abs_diff_eq!(lab[2], 128.0, epsilon = 0.5);
        assert!(lab[0] > 100.0 && lab[0] < 160.0);
    }

    #[test]
    fn yellow_is_positive_b_and_blue_negative() {
        let yellow = rgb_to_lab8([230, 220, 40]);
        let blue = rgb_to_lab8([30, 60, 200]);
        assert!(yellow[2] > 128.0 + 30.0);
        assert!(blue[2] < 128.0 - 30.0);
    }

    #[test]
    fn lab_round_trip_is_close() {
        for rgb in [[0u8, 0, 0], [255, 255, 255], [200, 30, 60], [12, 140, 90]] {
            let back = lab8_to_rgb(rgb_to_lab8(rgb));
            for c in 0..3 {
                assert!((back[c] as i32 - rgb[c] as i32).abs() <= 1, "{rgb:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn gray_uses_bt601_weights() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(gray_bt601(&img).get_pixel(0, 0)[0], 76);
        assert_eq!(value_channel(&img).get_pixel(0, 0)[0], 255);
    }
}
