use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, Point2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sheet_inspect_align::{AlignParams, FeatureAligner, Registration};
use sheet_inspect_core::{warp_perspective_rgb, Homography};

fn synthetic_sheet(w: u32, h: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = RgbImage::from_fn(w, h, |x, y| {
        let v = (40 + (x + y) / 12) as u8;
        Rgb([v, v, v])
    });
    for _ in 0..70 {
        let rw = rng.gen_range(10..50);
        let rh = rng.gen_range(10..50);
        let x0 = rng.gen_range(0..w - rw);
        let y0 = rng.gen_range(0..h - rh);
        let color = Rgb([
            rng.gen_range(60..250),
            rng.gen_range(60..250),
            rng.gen_range(60..250),
        ]);
        for y in y0..y0 + rh {
            for x in x0..x0 + rw {
                img.put_pixel(x, y, color);
            }
        }
    }
    img
}

/// Template-to-captured motion: small rotation, scale, shift and tilt.
fn camera_motion() -> Homography {
    let (s, c) = 2.0_f64.to_radians().sin_cos();
    let k = 1.01;
    Homography::new(Matrix3::new(
        k * c, -k * s, 6.0, //
        k * s, k * c, -5.0, //
        1.5e-5, -1.0e-5, 1.0,
    ))
}

fn assert_corners_recovered(registration: &Registration, motion: &Homography, w: u32, h: u32) {
    let Registration::Aligned { homography, .. } = registration else {
        panic!("expected alignment, got {registration:?}");
    };
    for c in [
        Point2::new(0.0_f32, 0.0),
        Point2::new(w as f32 - 1.0, 0.0),
        Point2::new(w as f32 - 1.0, h as f32 - 1.0),
        Point2::new(0.0, h as f32 - 1.0),
    ] {
        let back = homography.apply(motion.apply(c));
        let err = ((back.x - c.x).powi(2) + (back.y - c.y).powi(2)).sqrt();
        assert!(err < 2.0, "corner {c:?} reprojects to {back:?} (err {err:.3})");
    }
}

#[test]
fn recovers_known_homography_at_full_resolution() {
    let (w, h) = (400, 300);
    let template = synthetic_sheet(w, h, 5);
    let motion = camera_motion();
    let captured = warp_perspective_rgb(&template, &motion.inverse().unwrap(), w, h);

    let aligner = FeatureAligner::new(AlignParams {
        downscale: 1.0,
        ..AlignParams::default()
    });
    let out = aligner.align(&captured, &template);
    assert_corners_recovered(&out.registration, &motion, w, h);
    assert_eq!(out.image.dimensions(), (w, h));
}

#[test]
fn recovers_known_homography_with_default_downscale() {
    let (w, h) = (640, 480);
    let template = synthetic_sheet(w, h, 17);
    let motion = camera_motion();
    let captured = warp_perspective_rgb(&template, &motion.inverse().unwrap(), w, h);

    let aligner = FeatureAligner::new(AlignParams::default());
    let out = aligner.align(&captured, &template);
    assert_corners_recovered(&out.registration, &motion, w, h);
}

#[test]
fn registration_is_deterministic() {
    let template = synthetic_sheet(320, 240, 9);
    let motion = camera_motion();
    let captured = warp_perspective_rgb(&template, &motion.inverse().unwrap(), 320, 240);
    let aligner = FeatureAligner::new(AlignParams::default());
    let a = aligner.align(&captured, &template);
    let b = aligner.align(&captured, &template);
    assert_eq!(a.registration, b.registration);
    assert_eq!(a.image, b.image);
}

#[test]
fn self_registration_is_identity() {
    let template = synthetic_sheet(320, 240, 23);
    let aligner = FeatureAligner::new(AlignParams::default());
    let out = aligner.align(&template, &template);
    let Registration::Aligned { homography, .. } = out.registration else {
        panic!("self registration failed");
    };
    let p = homography.apply(Point2::new(160.0, 120.0));
    assert!((p.x - 160.0).abs() < 1e-3 && (p.y - 120.0).abs() < 1e-3);
    assert_eq!(out.image, template);
}
