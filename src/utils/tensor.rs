use ndarray::prelude::*;
use rayon::prelude::*;

/// Reorders interleaved RGB bytes into planar channel-major layout
/// (all R, then all G, then all B), one rayon task per plane.
pub fn interleaved_to_planar(data: &[u8], pixels: usize) -> Vec<u8> {
    debug_assert_eq!(data.len(), pixels * 3);

    let mut planar = vec![0u8; pixels * 3];
    planar
        .par_chunks_exact_mut(pixels)
        .enumerate()
        .for_each(|(channel, plane)| {
            for (target, source) in plane.iter_mut().zip(data.chunks_exact(3)) {
                *target = source[channel];
            }
        });
    planar
}

/// Planar reorder with the [0,1] float rescale the edge decoder expects.
pub fn interleaved_to_planar_normalized(data: &[u8], pixels: usize) -> Vec<f32> {
    debug_assert_eq!(data.len(), pixels * 3);

    let mut planar = vec![0f32; pixels * 3];
    planar
        .par_chunks_exact_mut(pixels)
        .enumerate()
        .for_each(|(channel, plane)| {
            for (target, source) in plane.iter_mut().zip(data.chunks_exact(3)) {
                *target = source[channel] as f32 / 255.;
            }
        });
    planar
}

/// Bilinear resize of a single-channel float map to `(height, width)`.
pub fn linear_interpolate(source: ArrayView2<f32>, size: (usize, usize)) -> Array2<f32> {
    let (out_h, out_w) = size;
    let (src_h, src_w) = source.dim();
    if (src_h, src_w) == (out_h, out_w) {
        return source.to_owned();
    }

    let scale_y = src_h as f32 / out_h as f32;
    let scale_x = src_w as f32 / out_w as f32;

    Array2::from_shape_fn((out_h, out_w), |(y, x)| {
        let sy = ((y as f32 + 0.5) * scale_y - 0.5).max(0.);
        let sx = ((x as f32 + 0.5) * scale_x - 0.5).max(0.);

        let y0 = (sy as usize).min(src_h - 1);
        let x0 = (sx as usize).min(src_w - 1);
        let y1 = (y0 + 1).min(src_h - 1);
        let x1 = (x0 + 1).min(src_w - 1);

        let dy = sy - y0 as f32;
        let dx = sx - x0 as f32;

        let top = source[[y0, x0]] * (1. - dx) + source[[y0, x1]] * dx;
        let bottom = source[[y1, x0]] * (1. - dx) + source[[y1, x1]] * dx;
        top * (1. - dy) + bottom * dy
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_reorder_splits_channels() {
        // Two pixels: (1, 2, 3) and (4, 5, 6).
        let planar = interleaved_to_planar(&[1, 2, 3, 4, 5, 6], 2);
        assert_eq!(planar, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn normalized_reorder_rescales() {
        let planar = interleaved_to_planar_normalized(&[255, 0, 51, 255, 0, 51], 2);
        assert_eq!(planar, vec![1.0, 1.0, 0.0, 0.0, 0.2, 0.2]);
    }

    #[test]
    fn interpolation_is_identity_for_equal_sizes() {
        let source = array![[1., 2.], [3., 4.]];
        assert_eq!(linear_interpolate(source.view(), (2, 2)), source);
    }

    #[test]
    fn interpolation_preserves_constant_maps() {
        let source = Array2::from_elem((4, 4), 7.5f32);
        let resized = linear_interpolate(source.view(), (9, 5));
        assert_eq!(resized.dim(), (9, 5));
        assert!(resized.iter().all(|v| (v - 7.5).abs() < 1e-6));
    }

    #[test]
    fn interpolation_stays_within_source_range() {
        let source = array![[0., 10.], [20., 30.]];
        let resized = linear_interpolate(source.view(), (5, 5));
        assert!(resized.iter().all(|&v| (-1e-4..=30.0001).contains(&v)));
        assert!((resized[[0, 0]] - 0.).abs() < 1e-4);
        assert!((resized[[4, 4]] - 30.).abs() < 1e-4);
    }
}
