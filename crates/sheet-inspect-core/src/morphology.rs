//! Grayscale morphology with square structuring elements.
//!
//! Windows are clipped at the image border, so pixels outside the image never
//! win a min/max. Binary masks (0/255) go through the same code paths.

use crate::filter::odd_kernel_size;
use image::{GrayImage, Luma};

fn rank_filter(img: &GrayImage, size: u32, pick: fn(u8, u8) -> u8) -> GrayImage {
    let size = odd_kernel_size(size);
    let (w, h) = img.dimensions();
    if size <= 1 || w == 0 || h == 0 {
        return img.clone();
    }
    let r = (size / 2) as usize;
    let (wu, hu) = (w as usize, h as usize);
    let src = img.as_raw();

    let mut tmp = vec![0u8; wu * hu];
    for y in 0..hu {
        let row = &src[y * wu..(y + 1) * wu];
        for x in 0..wu {
            let lo = x.saturating_sub(r);
            let hi = (x + r).min(wu - 1);
            tmp[y * wu + x] = row[lo..=hi].iter().copied().fold(row[x], pick);
        }
    }

    let mut out = vec![0u8; wu * hu];
    for y in 0..hu {
        let lo = y.saturating_sub(r);
        let hi = (y + r).min(hu - 1);
        for x in 0..wu {
            let mut v = tmp[y * wu + x];
            for yy in lo..=hi {
                v = pick(v, tmp[yy * wu + x]);
            }
            out[y * wu + x] = v;
        }
    }
    GrayImage::from_raw(w, h, out).unwrap_or_else(|| img.clone())
}

pub fn erode(img: &GrayImage, size: u32) -> GrayImage {
    rank_filter(img, size, u8::min)
}

pub fn dilate(img: &GrayImage, size: u32) -> GrayImage {
    rank_filter(img, size, u8::max)
}

fn repeat(
    img: &GrayImage,
    size: u32,
    iterations: u32,
    op: fn(&GrayImage, u32) -> GrayImage,
) -> GrayImage {
    let mut out = img.clone();
    for _ in 0..iterations {
        out = op(&out, size);
    }
    out
}

/// Erosion followed by dilation, each applied `iterations` times.
pub fn open(img: &GrayImage, size: u32, iterations: u32) -> GrayImage {
    let eroded = repeat(img, size, iterations, erode);
    repeat(&eroded, size, iterations, dilate)
}

/// Dilation followed by erosion, each applied `iterations` times.
pub fn close(img: &GrayImage, size: u32, iterations: u32) -> GrayImage {
    let dilated = repeat(img, size, iterations, dilate);
    repeat(&dilated, size, iterations, erode)
}

fn subtract(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].saturating_sub(b.get_pixel(x, y)[0])])
    })
}

/// Bright residual: `img - open(img)`.
pub fn top_hat(img: &GrayImage, size: u32) -> GrayImage {
    subtract(img, &open(img, size, 1))
}

/// Dark residual: `close(img) - img`.
pub fn black_hat(img: &GrayImage, size: u32) -> GrayImage {
    subtract(&close(img, size, 1), img)
}

/// `dilate(img) - erode(img)`; large values mark edges and texture.
pub fn morphological_gradient(img: &GrayImage, size: u32) -> GrayImage {
    subtract(&dilate(img, size), &erode(img, size))
}

/// Denoise then bridge: opening followed by closing.
///
/// No-op when `kernel_size <= 1` or `iterations == 0`.
pub fn open_close(mask: &GrayImage, kernel_size: u32, iterations: u32) -> GrayImage {
    if kernel_size <= 1 || iterations == 0 {
        return mask.clone();
    }
    let k = odd_kernel_size(kernel_size);
    close(&open(mask, k, iterations), k, iterations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(w: u32, h: u32, x0: u32, y0: u32, side: u32, fg: u8, bg: u8) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let inside = x >= x0 && x < x0 + side && y >= y0 && y < y0 + side;
            Luma([if inside { fg } else { bg }])
        })
    }

    fn count(mask: &GrayImage) -> usize {
        mask.as_raw().iter().filter(|&&v| v > 0).count()
    }

    #[test]
    fn opening_removes_specks_and_keeps_blocks() {
        let mut mask = square(20, 20, 5, 5, 6, 255, 0);
        mask.put_pixel(1, 1, Luma([255]));
        let out = open_close(&mask, 3, 1);
        assert_eq!(out.get_pixel(1, 1)[0], 0);
        assert_eq!(count(&out), 36);
    }

    #[test]
    fn closing_bridges_single_pixel_gap() {
        let mut mask = square(20, 20, 4, 4, 8, 255, 0);
        for y in 4..12 {
            mask.put_pixel(8, y, Luma([0]));
        }
        let closed = close(&mask, 3, 1);
        assert_eq!(closed.get_pixel(8, 7)[0], 255);
    }

    #[test]
    fn black_hat_highlights_small_dark_spot() {
        let img = square(15, 15, 7, 7, 1, 40, 200);
        let bh = black_hat(&img, 3);
        assert_eq!(bh.get_pixel(7, 7)[0], 160);
        assert_eq!(bh.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn top_hat_highlights_small_bright_spot() {
        let img = square(15, 15, 7, 7, 2, 220, 20);
        let th = top_hat(&img, 5);
        assert_eq!(th.get_pixel(7, 7)[0], 200);
        assert_eq!(th.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn gradient_is_zero_on_flat_region() {
        let img = square(15, 15, 5, 5, 5, 180, 60);
        let g = morphological_gradient(&img, 3);
        assert_eq!(g.get_pixel(0, 0)[0], 0);
        assert_eq!(g.get_pixel(4, 6)[0], 120);
        assert_eq!(g.get_pixel(7, 7)[0], 0);
    }

    #[test]
    fn small_kernel_is_identity() {
        let img = square(8, 8, 2, 2, 3, 255, 0);
        assert_eq!(open_close(&img, 1, 3), img);
        assert_eq!(open_close(&img, 3, 0), img);
    }
}
