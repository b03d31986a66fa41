use crate::error::SamResult;
use crate::inference::sam::mask_inference::{decode_mask, encode_prompt};
use crate::inference::sam::{InstanceMap, Sam};
use crate::utils::graph::Point;
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_polygon_mut;
use ndarray::Array2;
use std::cmp::Ordering;

/// A rasterized contour waiting to be merged into the instance map.
pub(crate) struct FillCandidate {
    pub fill: GrayImage,
    pub area: f64,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Sam {
    /// Prompt-free segmentation: samples the center of every cell of a
    /// `rows x cols` grid, queries a mask per cell and merges the accepted
    /// masks into one non-overlapping label map. Larger instances win
    /// contested pixels; instances left with no pixels are dropped.
    ///
    /// `progress` is called once per grid cell with a fraction in [0, 1],
    /// purely for observability. The scan always runs to completion; the
    /// state lock is held for the whole scan, so the result is consistent
    /// even with concurrent callers.
    pub fn auto_segment(
        &self,
        grid: (u32, u32),
        iou_threshold: f32,
        min_area: f64,
        mut progress: Option<&mut dyn FnMut(f64)>,
    ) -> SamResult<InstanceMap> {
        let (rows, cols) = grid;
        let (width, height) = (self.input_width, self.input_height);
        let mut labels = Array2::<f64>::zeros((height as usize, width as usize));
        let mut areas = Vec::new();

        if rows == 0 || cols == 0 {
            return Ok(InstanceMap { labels, areas });
        }

        let mut state = self.state.lock();

        for i in 0..rows {
            for j in 0..cols {
                if let Some(report) = progress.as_deref_mut() {
                    report(cell_fraction(i, j, rows, cols));
                }

                let center = Point::new(
                    (j as f32 + 0.5) * width as f32 / cols as f32,
                    (i as f32 + 0.5) * height as f32 / rows as f32,
                );
                let prompt = encode_prompt(&[center], &[], None, width, height)?;
                let result = decode_mask(&mut state, self.variant, prompt, width, height)?;
                if result.score < iou_threshold {
                    continue;
                }

                let Some(candidate) = largest_contour_fill(&result.mask, min_area) else {
                    continue;
                };
                overlay_instance(&mut labels, &mut areas, &candidate);
            }
        }

        Ok(InstanceMap { labels, areas })
    }
}

/// Fractional completion of cell (i, j) in a rows x cols scan, in [0, 1).
/// Computed in f64 so oversized grids cannot overflow the index math.
fn cell_fraction(i: u32, j: u32, rows: u32, cols: u32) -> f64 {
    (i as f64 * cols as f64 + j as f64) / (rows as f64 * cols as f64)
}

/// Picks the largest external contour of a binary mask, rejects it below
/// `min_area`, and rasterizes it into a fill mask with its bounding box.
pub(crate) fn largest_contour_fill(mask: &GrayImage, min_area: f64) -> Option<FillCandidate> {
    let contours = find_contours::<i32>(mask);
    let (contour, area) = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| (c, polygon_area(&c.points)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))?;
    if area < min_area {
        return None;
    }

    let mut points = contour.points.clone();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    let mut fill = GrayImage::new(mask.width(), mask.height());
    if points.len() >= 3 {
        draw_polygon_mut(&mut fill, &points, Luma([255u8]));
    } else {
        for point in &points {
            fill.put_pixel(point.x as u32, point.y as u32, Luma([255u8]));
        }
    }

    let min_x = points.iter().map(|p| p.x).min()? as u32;
    let min_y = points.iter().map(|p| p.y).min()? as u32;
    let max_x = points.iter().map(|p| p.x).max()? as u32;
    let max_y = points.iter().map(|p| p.y).max()? as u32;

    Some(FillCandidate {
        fill,
        area,
        min_x,
        min_y,
        max_x,
        max_y,
    })
}

/// Shoelace area of a pixel contour.
fn polygon_area(points: &[imageproc::point::Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.;
    }
    let mut doubled = 0i64;
    for (current, next) in points.iter().zip(points.iter().cycle().skip(1)) {
        doubled += current.x as i64 * next.y as i64 - next.x as i64 * current.y as i64;
    }
    (doubled.abs() as f64) / 2.
}

/// Merges one candidate into the running label map. A pixel is (re)labeled
/// only if it is unassigned or its owning instance has a strictly smaller
/// recorded area. A candidate that ends up owning no pixels is discarded
/// and does not consume a label index.
pub(crate) fn overlay_instance(
    labels: &mut Array2<f64>,
    areas: &mut Vec<f64>,
    candidate: &FillCandidate,
) -> bool {
    let index = (areas.len() + 1) as f64;
    let mut owned = 0usize;

    for y in candidate.min_y..=candidate.max_y {
        for x in candidate.min_x..=candidate.max_x {
            if candidate.fill.get_pixel(x, y).0[0] == 0 {
                continue;
            }
            let current = labels[[y as usize, x as usize]];
            if current > 0. && areas[current as usize - 1] >= candidate.area {
                continue;
            }
            labels[[y as usize, x as usize]] = index;
            owned += 1;
        }
    }

    if owned == 0 {
        return false;
    }
    areas.push(candidate.area);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_candidate(
        size: (u32, u32),
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        area: f64,
    ) -> FillCandidate {
        let mut fill = GrayImage::new(size.0, size.1);
        for yy in y..y + h {
            for xx in x..x + w {
                fill.put_pixel(xx, yy, Luma([255u8]));
            }
        }
        FillCandidate {
            fill,
            area,
            min_x: x,
            min_y: y,
            max_x: x + w - 1,
            max_y: y + h - 1,
        }
    }

    fn rect_mask(size: (u32, u32), x: u32, y: u32, w: u32, h: u32) -> GrayImage {
        let mut mask = GrayImage::new(size.0, size.1);
        for yy in y..y + h {
            for xx in x..x + w {
                mask.put_pixel(xx, yy, Luma([255u8]));
            }
        }
        mask
    }

    #[test]
    fn larger_instance_wins_contested_pixels() {
        let mut labels = Array2::<f64>::zeros((32, 32));
        let mut areas = Vec::new();

        // Small instance first, then a larger overlapping one.
        let small = rect_candidate((32, 32), 0, 0, 10, 10, 81.);
        let large = rect_candidate((32, 32), 5, 5, 20, 20, 361.);
        assert!(overlay_instance(&mut labels, &mut areas, &small));
        assert!(overlay_instance(&mut labels, &mut areas, &large));

        // Contested region belongs to the larger instance.
        assert_eq!(labels[[7, 7]], 2.);
        // The smaller instance keeps its non-overlapping region.
        assert_eq!(labels[[2, 2]], 1.);
        assert_eq!(areas, vec![81., 361.]);
    }

    #[test]
    fn smaller_instance_never_steals_pixels() {
        let mut labels = Array2::<f64>::zeros((32, 32));
        let mut areas = Vec::new();

        let large = rect_candidate((32, 32), 0, 0, 20, 20, 361.);
        let small = rect_candidate((32, 32), 5, 5, 10, 10, 81.);
        assert!(overlay_instance(&mut labels, &mut areas, &large));
        // Fully shadowed: owns zero pixels, so it is dropped entirely.
        assert!(!overlay_instance(&mut labels, &mut areas, &small));

        assert_eq!(labels[[7, 7]], 1.);
        assert_eq!(areas, vec![361.]);
    }

    #[test]
    fn equal_area_keeps_the_first_owner() {
        let mut labels = Array2::<f64>::zeros((16, 16));
        let mut areas = Vec::new();

        let first = rect_candidate((16, 16), 0, 0, 8, 8, 49.);
        let second = rect_candidate((16, 16), 0, 0, 8, 8, 49.);
        assert!(overlay_instance(&mut labels, &mut areas, &first));
        assert!(!overlay_instance(&mut labels, &mut areas, &second));
        assert_eq!(areas.len(), 1);
    }

    #[test]
    fn largest_contour_is_selected() {
        let mut mask = rect_mask((64, 64), 2, 2, 5, 5);
        for yy in 20..50 {
            for xx in 20..50 {
                mask.put_pixel(xx, yy, Luma([255u8]));
            }
        }

        let candidate = largest_contour_fill(&mask, 0.).unwrap();
        assert_eq!(candidate.min_x, 20);
        assert_eq!(candidate.min_y, 20);
        assert_eq!(candidate.max_x, 49);
        assert_eq!(candidate.max_y, 49);
        // Shoelace area of a 30x30 pixel block's boundary polygon.
        assert_eq!(candidate.area, 841.);
        assert_eq!(candidate.fill.get_pixel(35, 35).0[0], 255);
        assert_eq!(candidate.fill.get_pixel(3, 3).0[0], 0);
    }

    #[test]
    fn min_area_filters_every_contour() {
        let mask = rect_mask((64, 64), 2, 2, 5, 5);
        assert!(largest_contour_fill(&mask, 100.).is_none());
        assert!(largest_contour_fill(&mask, 10.).is_some());
    }

    #[test]
    fn cell_fraction_is_finite_for_huge_grids() {
        let fraction = cell_fraction(u32::MAX - 1, u32::MAX - 1, u32::MAX, u32::MAX);
        assert!(fraction.is_finite());
        assert!((0. ..=1.).contains(&fraction));
        assert_eq!(cell_fraction(0, 0, 10, 10), 0.);
        assert_eq!(cell_fraction(5, 0, 10, 10), 0.5);
    }

    #[test]
    fn empty_mask_yields_no_candidate() {
        let mask = GrayImage::new(64, 64);
        assert!(largest_contour_fill(&mask, 0.).is_none());
    }
}
