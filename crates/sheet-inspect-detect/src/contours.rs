//! Final cleanup, region extraction and geometric filtering.

use crate::params::MorphParams;
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::region_labelling::{connected_components, Connectivity};
use nalgebra::Point2;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use sheet_inspect_core::{mask_and, open_close, PixelRect};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Regions thinner than this circularity are rejected when large.
pub const MIN_CIRCULARITY: f32 = 0.02;
/// Area above which the circularity test applies.
pub const CIRCULARITY_AREA_LIMIT: u32 = 150;

const MIN_PERIMETER: f32 = 1e-6;

pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// One accepted connected region of the cleaned mask.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    /// Label in [`Extraction::labels`].
    pub label: u32,
    /// Pixel count of the 8-connected component.
    pub area: u32,
    /// Closed length of the outer border.
    pub perimeter: f32,
    /// `4 * pi * area / perimeter^2`.
    pub circularity: f32,
    /// Minimum enclosing circle of the border.
    pub center: Point2<f32>,
    pub radius: f32,
    pub bbox: PixelRect,
}

/// Cleaned mask, component labels and the regions that passed the filters.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub mask: GrayImage,
    pub labels: LabelImage,
    pub regions: Vec<Region>,
}

#[derive(Clone, Copy, Default)]
struct ComponentStats {
    area: u32,
    bbox: Option<PixelRect>,
}

fn component_stats(labels: &LabelImage) -> Vec<ComponentStats> {
    let max_label = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    let mut stats = vec![ComponentStats::default(); max_label + 1];
    for (x, y, p) in labels.enumerate_pixels() {
        let l = p[0] as usize;
        if l == 0 {
            continue;
        }
        let s = &mut stats[l];
        s.area += 1;
        s.bbox = Some(match s.bbox {
            Some(r) => r.include(x, y),
            None => PixelRect::new(x, y, 1, 1),
        });
    }
    stats
}

fn closed_arc_length(points: &[Point2<f64>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut len = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        len += (q - p).norm();
    }
    len
}

/// `4 * pi * area / perimeter^2`.
#[inline]
pub fn circularity(area: f32, perimeter: f32) -> f32 {
    let p = perimeter.max(MIN_PERIMETER);
    4.0 * std::f32::consts::PI * area / (p * p)
}

/// Open+close `mask`, label 8-connected regions and keep those whose outer
/// border has no parent and which pass the area and circularity tests.
///
/// Regions are ordered by bounding box top, then left.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(mask), fields(width = mask.width(), height = mask.height()))
)]
pub fn clean_and_extract(mask: &GrayImage, morph: MorphParams, min_area: u32) -> Extraction {
    extract_regions(open_close(mask, morph.kernel_size, morph.iterations), min_area)
}

/// [`clean_and_extract`] with the cleaned mask cut back to `allowed` before
/// labelling, so closing cannot bridge regions across excluded pixels or
/// leave foreground outside them.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(mask, allowed), fields(width = mask.width(), height = mask.height()))
)]
pub fn clean_and_extract_within(
    mask: &GrayImage,
    allowed: &GrayImage,
    morph: MorphParams,
    min_area: u32,
) -> Extraction {
    let cleaned = open_close(mask, morph.kernel_size, morph.iterations);
    extract_regions(mask_and(&cleaned, allowed), min_area)
}

fn extract_regions(cleaned: GrayImage, min_area: u32) -> Extraction {
    let labels = connected_components(&cleaned, Connectivity::Eight, Luma([0u8]));
    let stats = component_stats(&labels);
    let min_area = min_area.max(1);

    let contours: Vec<Contour<u32>> = find_contours(&cleaned);
    let mut regions = Vec::new();
    for contour in &contours {
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        let Some(first) = contour.points.first() else {
            continue;
        };
        let label = labels.get_pixel(first.x, first.y)[0];
        let Some(s) = stats.get(label as usize).copied() else {
            continue;
        };
        let Some(bbox) = s.bbox else {
            continue;
        };
        if s.area < min_area {
            continue;
        }

        let pts: Vec<Point2<f64>> = contour
            .points
            .iter()
            .map(|p| Point2::new(p.x as f64, p.y as f64))
            .collect();
        let perimeter = (closed_arc_length(&pts) as f32).max(MIN_PERIMETER);
        let circ = circularity(s.area as f32, perimeter);
        if circ < MIN_CIRCULARITY && s.area > CIRCULARITY_AREA_LIMIT {
            log::debug!(
                "rejecting elongated region at ({}, {}): area {}, circularity {circ:.4}",
                bbox.x,
                bbox.y,
                s.area
            );
            continue;
        }

        let (center, radius) = min_enclosing_circle(&pts);
        regions.push(Region {
            label,
            area: s.area,
            perimeter,
            circularity: circ,
            center: Point2::new(center.x as f32, center.y as f32),
            radius: radius as f32,
            bbox,
        });
    }
    regions.sort_by_key(|r| (r.bbox.y, r.bbox.x));

    Extraction {
        mask: cleaned,
        labels,
        regions,
    }
}

fn circle_two(a: Point2<f64>, b: Point2<f64>) -> (Point2<f64>, f64) {
    let c = nalgebra::center(&a, &b);
    (c, (a - c).norm())
}

fn circle_three(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> (Point2<f64>, f64) {
    let (bx, by) = (b.x - a.x, b.y - a.y);
    let (cx, cy) = (c.x - a.x, c.y - a.y);
    let d = 2.0 * (bx * cy - by * cx);
    if d.abs() < 1e-12 {
        // collinear: the widest pair spans the circle
        let candidates = [circle_two(a, b), circle_two(a, c), circle_two(b, c)];
        return candidates
            .into_iter()
            .fold((a, 0.0), |best, cand| if cand.1 > best.1 { cand } else { best });
    }
    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (cy * b2 - by * c2) / d;
    let uy = (bx * c2 - cx * b2) / d;
    let center = Point2::new(a.x + ux, a.y + uy);
    (center, (ux * ux + uy * uy).sqrt())
}

#[inline]
fn inside(circle: &(Point2<f64>, f64), p: &Point2<f64>) -> bool {
    (p - circle.0).norm() <= circle.1 + 1e-7
}

/// Smallest circle containing every point (Welzl, randomized incremental).
///
/// The shuffle is seeded, so the result is deterministic.
pub fn min_enclosing_circle(points: &[Point2<f64>]) -> (Point2<f64>, f64) {
    if points.is_empty() {
        return (Point2::origin(), 0.0);
    }
    let mut pts = points.to_vec();
    pts.shuffle(&mut StdRng::seed_from_u64(0));

    let mut circle = (pts[0], 0.0);
    for i in 1..pts.len() {
        if inside(&circle, &pts[i]) {
            continue;
        }
        circle = (pts[i], 0.0);
        for j in 0..i {
            if inside(&circle, &pts[j]) {
                continue;
            }
            circle = circle_two(pts[i], pts[j]);
            for k in 0..j {
                if !inside(&circle, &pts[k]) {
                    circle = circle_three(pts[i], pts[j], pts[k]);
                }
            }
        }
    }
    circle
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sheet_inspect_core::MASK_ON;

    fn blank(w: u32, h: u32) -> GrayImage {
        GrayImage::new(w, h)
    }

    fn fill_rect(m: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                m.put_pixel(x, y, Luma([MASK_ON]));
            }
        }
    }

    fn fill_disk(m: &mut GrayImage, cx: i32, cy: i32, r: i32) {
        for y in cy - r..=cy + r {
            for x in cx - r..=cx + r {
                if (x - cx).pow(2) + (y - cy).pow(2) <= r * r {
                    m.put_pixel(x as u32, y as u32, Luma([MASK_ON]));
                }
            }
        }
    }

    #[test]
    fn square_geometry() {
        let mut m = blank(40, 40);
        fill_rect(&mut m, 10, 12, 5, 5);
        let out = clean_and_extract(&m, MorphParams::disabled(), 1);
        assert_eq!(out.regions.len(), 1);
        let r = &out.regions[0];
        assert_eq!(r.area, 25);
        assert_eq!(r.bbox, PixelRect::new(10, 12, 5, 5));
        assert_abs_diff_eq!(r.perimeter, 16.0, epsilon = 1e-4);
        assert_abs_diff_eq!(r.center.x, 12.0, epsilon = 1e-4);
        assert_abs_diff_eq!(r.center.y, 14.0, epsilon = 1e-4);
        assert_abs_diff_eq!(r.radius, 8.0_f32.sqrt(), epsilon = 1e-4);
    }

    #[test]
    fn min_area_boundary_is_inclusive() {
        let mut m = blank(40, 40);
        fill_rect(&mut m, 5, 5, 4, 3); // 12 px
        let keep = clean_and_extract(&m, MorphParams::disabled(), 12);
        assert_eq!(keep.regions.len(), 1);
        let drop = clean_and_extract(&m, MorphParams::disabled(), 13);
        assert!(drop.regions.is_empty());
        // the cleaned mask is not filtered by the region tests
        assert_eq!(drop.mask, m);
    }

    #[test]
    fn long_thin_line_is_rejected_but_disk_is_kept() {
        let mut line = blank(220, 20);
        fill_rect(&mut line, 10, 10, 200, 1);
        let out = clean_and_extract(&line, MorphParams::disabled(), 1);
        assert!(out.regions.is_empty());

        let mut disk = blank(40, 40);
        fill_disk(&mut disk, 20, 20, 8);
        let out = clean_and_extract(&disk, MorphParams::disabled(), 1);
        assert_eq!(out.regions.len(), 1);
        assert!(out.regions[0].area > 150);
        assert!(out.regions[0].circularity > 0.5);
    }

    #[test]
    fn holes_do_not_create_regions_and_order_is_raster() {
        let mut m = blank(60, 60);
        fill_rect(&mut m, 30, 5, 20, 20);
        for y in 10..20 {
            for x in 35..45 {
                m.put_pixel(x, y, Luma([0]));
            }
        }
        fill_rect(&mut m, 38, 13, 3, 3); // island inside the hole
        fill_rect(&mut m, 2, 40, 6, 6);
        fill_rect(&mut m, 2, 5, 6, 6);
        let out = clean_and_extract(&m, MorphParams::disabled(), 1);
        let tops: Vec<(u32, u32)> = out.regions.iter().map(|r| (r.bbox.y, r.bbox.x)).collect();
        assert_eq!(tops, vec![(5, 2), (5, 30), (40, 2)]);
    }

    #[test]
    fn cleanup_removes_specks() {
        let mut m = blank(30, 30);
        m.put_pixel(3, 3, Luma([MASK_ON]));
        fill_rect(&mut m, 10, 10, 8, 8);
        let out = clean_and_extract(&m, MorphParams::default(), 1);
        assert_eq!(out.regions.len(), 1);
        assert_eq!(out.mask.get_pixel(3, 3)[0], 0);
    }

    #[test]
    fn closing_does_not_bridge_excluded_pixels() {
        let mut m = blank(40, 20);
        fill_rect(&mut m, 5, 5, 14, 10);
        fill_rect(&mut m, 21, 5, 14, 10);
        let mut allowed = blank(40, 20);
        fill_rect(&mut allowed, 0, 0, 40, 20);
        for y in 0..20 {
            for x in 19..21 {
                allowed.put_pixel(x, y, Luma([0]));
            }
        }
        let morph = MorphParams {
            kernel_size: 5,
            iterations: 1,
        };

        let bridged = clean_and_extract(&m, morph, 1);
        assert_eq!(bridged.regions.len(), 1);

        let split = clean_and_extract_within(&m, &allowed, morph, 1);
        assert_eq!(split.regions.len(), 2);
        for y in 0..20 {
            assert_eq!(split.mask.get_pixel(19, y)[0], 0);
            assert_eq!(split.mask.get_pixel(20, y)[0], 0);
        }
    }

    #[test]
    fn enclosing_circle_of_degenerate_sets() {
        let (c, r) = min_enclosing_circle(&[Point2::new(3.0, 4.0)]);
        assert_eq!((c.x, c.y, r), (3.0, 4.0, 0.0));
        let pts = [
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(4.0, 0.0),
        ];
        let (c, r) = min_enclosing_circle(&pts);
        assert_abs_diff_eq!(c.x, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r, 2.0, epsilon = 1e-9);
    }
}
