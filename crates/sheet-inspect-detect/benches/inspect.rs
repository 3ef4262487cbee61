use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sheet_inspect_core::PixelRect;
use sheet_inspect_detect::{
    clean_and_extract, AlignParams, InspectionMode, InspectionParams, Inspector, MorphParams,
};

fn make_sheet(w: u32, h: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = RgbImage::from_fn(w, h, |x, y| {
        let v = (50 + (x + 2 * y) / 16) as u8;
        Rgb([v, v, v])
    });
    for _ in 0..120 {
        let rw = rng.gen_range(8..60);
        let rh = rng.gen_range(8..60);
        let x0 = rng.gen_range(0..w - rw);
        let y0 = rng.gen_range(0..h - rh);
        let color = Rgb([
            rng.gen_range(60..240),
            rng.gen_range(60..240),
            rng.gen_range(60..240),
        ]);
        for y in y0..y0 + rh {
            for x in x0..x0 + rw {
                img.put_pixel(x, y, color);
            }
        }
    }
    img
}

fn make_fixture(w: u32, h: u32, seed: u64) -> (RgbImage, GrayImage, RgbImage) {
    let template = make_sheet(w, h, seed);
    let roi = GrayImage::from_fn(w, h, |x, y| {
        let inside = PixelRect::new(16, 16, w - 32, h - 32).contains(x, y);
        Luma([if inside { 255 } else { 0 }])
    });
    let mut captured = template.clone();
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
    for _ in 0..6 {
        let cx = rng.gen_range(40..w - 40);
        let cy = rng.gen_range(40..h - 40);
        let r: i32 = rng.gen_range(2..6);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    let x = (cx as i32 + dx) as u32;
                    let y = (cy as i32 + dy) as u32;
                    captured.put_pixel(x, y, Rgb([20, 20, 20]));
                }
            }
        }
    }
    (template, roi, captured)
}

fn unaligned(mode: InspectionMode) -> InspectionParams {
    InspectionParams {
        mode,
        align: AlignParams {
            enabled: false,
            ..AlignParams::default()
        },
        ..InspectionParams::default()
    }
}

fn bench_inspect(c: &mut Criterion) {
    let (template, roi, captured) = make_fixture(640, 480, 11);

    let full = Inspector::new(&template, &roi, unaligned(InspectionMode::Full))
        .expect("fixture roi is non-empty");
    c.bench_function("inspect_full_640x480_noalign", |b| {
        b.iter(|| black_box(full.inspect(black_box(&captured))))
    });

    let simple = Inspector::new(&template, &roi, unaligned(InspectionMode::Simple))
        .expect("fixture roi is non-empty");
    c.bench_function("inspect_simple_640x480_noalign", |b| {
        b.iter(|| black_box(simple.inspect(black_box(&captured))))
    });

    let aligned = Inspector::new(&template, &roi, InspectionParams::default())
        .expect("fixture roi is non-empty");
    c.bench_function("inspect_full_640x480_align", |b| {
        b.iter(|| black_box(aligned.inspect(black_box(&captured))))
    });
}

fn bench_template_model(c: &mut Criterion) {
    let (template, roi, _) = make_fixture(640, 480, 23);
    c.bench_function("inspector_new_640x480", |b| {
        b.iter(|| {
            black_box(Inspector::new(
                black_box(&template),
                black_box(&roi),
                InspectionParams::default(),
            ))
        })
    });
}

fn bench_extraction(c: &mut Criterion) {
    let mut mask = GrayImage::new(640, 480);
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..200 {
        let x0 = rng.gen_range(0..620);
        let y0 = rng.gen_range(0..460);
        let s = rng.gen_range(2..18);
        for y in y0..y0 + s {
            for x in x0..x0 + s {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }
    c.bench_function("clean_and_extract_200_blobs", |b| {
        b.iter(|| black_box(clean_and_extract(black_box(&mask), MorphParams::default(), 4)))
    });
}

criterion_group!(benches, bench_inspect, bench_template_model, bench_extraction);
criterion_main!(benches);
