//! Per-view confidence weights: border-distance blending and content-based
//! local contrast.
//!
//! Blending weights are pure functions of the native coordinate and are
//! evaluated lazily per point. Content-based weights need a smoothed
//! neighborhood and are therefore computed eagerly over the view's native
//! grid once per fusion call, then resampled like the image itself.

use ndarray::{Array3, Axis};

use crate::float_trait::FuseFloat;
use crate::view::PixelSource;

/// Compute 1D Gaussian kernel with given sigma.
/// Kernel size is ceil(truncate * sigma) * 2 + 1.
fn gaussian_kernel_1d<F: FuseFloat>(sigma: F) -> Vec<F> {
    if sigma <= F::zero() {
        return vec![F::one()];
    }

    let radius = (F::GAUSSIAN_TRUNCATE * sigma)
        .ceil()
        .to_usize()
        .unwrap_or(0);
    let size = 2 * radius + 1;
    let mut kernel = vec![F::zero(); size];

    let sigma2 = sigma * sigma;
    let mut sum = F::zero();
    let two = F::from_f64_c(2.0);
    let neg_one = F::from_f64_c(-1.0);

    for (i, k) in kernel.iter_mut().enumerate() {
        let x = F::usize_as(i) - F::usize_as(radius);
        let val = (neg_one * x * x / (two * sigma2)).exp();
        *k = val;
        sum += val;
    }

    let inv_sum = F::one() / sum;
    for val in kernel.iter_mut() {
        *val *= inv_sum;
    }

    kernel
}

/// Reflect index for boundary handling.
/// For an array of length n, reflects indices outside [0, n-1].
#[inline(always)]
fn reflect_index(idx: isize, len: usize) -> usize {
    let n = len as isize;
    if idx < 0 {
        (-idx - 1).min(n - 1) as usize
    } else if idx >= n {
        let excess = idx - n;
        (n - 2 - excess).max(0) as usize
    } else {
        idx as usize
    }
}

/// Fill a pre-allocated padded buffer with reflected boundaries so the
/// convolution hot loop needs no branching.
fn fill_padded_line<F: FuseFloat>(input: &[F], radius: usize, padded: &mut Vec<F>) {
    let n = input.len();
    let padded_len = n + 2 * radius;

    if padded.len() != padded_len {
        padded.resize(padded_len, F::zero());
    }

    padded[radius..radius + n].copy_from_slice(input);

    for i in 0..radius {
        let left = reflect_index(-(i as isize) - 1, n);
        padded[radius - 1 - i] = input[left];
        let right = reflect_index((n + i) as isize, n);
        padded[radius + n + i] = input[right];
    }
}

/// Apply 1D convolution to a padded buffer.
#[inline]
fn convolve_1d_padded<F: FuseFloat>(padded: &[F], kernel: &[F], output: &mut [F]) {
    let klen = kernel.len();
    for (i, out) in output.iter_mut().enumerate() {
        let mut sum = F::zero();
        for k in 0..klen {
            sum += padded[i + k] * kernel[k];
        }
        *out = sum;
    }
}

/// Blur a volume in place along one axis with reflect boundary.
fn blur_axis<F: FuseFloat>(data: &mut Array3<F>, sigma: F, axis: Axis) {
    if sigma <= F::zero() {
        return;
    }
    let kernel = gaussian_kernel_1d(sigma);
    let radius = kernel.len() / 2;
    let n = data.len_of(axis);
    if n == 0 {
        return;
    }

    let mut line: Vec<F> = Vec::with_capacity(n);
    let mut padded: Vec<F> = Vec::new();
    let mut out = vec![F::zero(); n];

    for mut lane in data.lanes_mut(axis) {
        line.clear();
        line.extend(lane.iter().copied());
        fill_padded_line(&line, radius, &mut padded);
        convolve_1d_padded(&padded, &kernel, &mut out);
        for (dst, &v) in lane.iter_mut().zip(out.iter()) {
            *dst = v;
        }
    }
}

/// Separable 3D Gaussian blur with per-axis sigma given in x/y/z order.
/// The buffer is shaped (z, y, x).
pub fn gaussian_blur_3d<F: FuseFloat>(data: &mut Array3<F>, sigma: [F; 3]) {
    blur_axis(data, sigma[0], Axis(2));
    blur_axis(data, sigma[1], Axis(1));
    blur_axis(data, sigma[2], Axis(0));
}

/// Geometric blending weight over a view's native extent.
///
/// Per axis, the weight is 0 inside the excluded border margin, rises along
/// a smooth cosine ramp over the configured range and is 1 in the interior;
/// the final weight is the product over axes. Outside the extent it is 0.
#[derive(Debug, Clone)]
pub struct BlendingProfile {
    dim: [usize; 3],
    border: [f64; 3],
    range: [f64; 3],
}

impl BlendingProfile {
    pub fn new(dim: [usize; 3], border: [f64; 3], range: [f64; 3]) -> Self {
        Self { dim, border, range }
    }

    /// Evaluate the blending weight at a native (possibly fractional)
    /// coordinate.
    pub fn weight_at<F: FuseFloat>(&self, local: [f64; 3]) -> F {
        let mut w = 1.0f64;

        for d in 0..3 {
            let max = (self.dim[d] - 1) as f64;
            // distance to the nearer face, minus the excluded border
            let l1 = local[d] - self.border[d];
            let l2 = (max - self.border[d]) - local[d];
            let dist = l1.min(l2);

            if dist < 0.0 {
                return F::zero();
            }

            if self.range[d] > 0.0 && dist < self.range[d] {
                let rel = dist / self.range[d];
                w *= (((1.0 - rel) * std::f64::consts::PI).cos() + 1.0) / 2.0;
            }
        }

        F::from_f64_c(w)
    }
}

/// Content-based weight field: |G_sigma1(I) - G_sigma2(I)| with sigma1 <
/// sigma2, a difference-of-Gaussians approximation of local contrast.
///
/// The field is materialized over the full native grid when constructed and
/// lives for the duration of one fusion call.
pub struct ContentBasedField<F> {
    field: Array3<F>,
    dim: [usize; 3],
}

impl<F: FuseFloat> ContentBasedField<F> {
    pub fn new(source: &dyn PixelSource<F>, sigma1: [f64; 3], sigma2: [f64; 3]) -> Self {
        let dim = source.dim();
        let shape = (dim[2], dim[1], dim[0]);

        let input = Array3::from_shape_fn(shape, |(z, y, x)| source.get([x, y, z]));

        let mut narrow = input.clone();
        gaussian_blur_3d(
            &mut narrow,
            [
                F::from_f64_c(sigma1[0]),
                F::from_f64_c(sigma1[1]),
                F::from_f64_c(sigma1[2]),
            ],
        );

        let mut wide = input;
        gaussian_blur_3d(
            &mut wide,
            [
                F::from_f64_c(sigma2[0]),
                F::from_f64_c(sigma2[1]),
                F::from_f64_c(sigma2[2]),
            ],
        );

        let field = ndarray::Zip::from(&narrow)
            .and(&wide)
            .map_collect(|&a, &b| (a - b).abs());

        Self { field, dim }
    }

    /// Nearest-neighbor lookup at a native coordinate, `None` outside the
    /// extent.
    pub fn weight_at(&self, local: [f64; 3]) -> Option<F> {
        let mut pos = [0usize; 3];
        for d in 0..3 {
            let r = local[d].round();
            if r < 0.0 || r > (self.dim[d] - 1) as f64 {
                return None;
            }
            pos[d] = r as usize;
        }
        Some(self.field[[pos[2], pos[1], pos[0]]])
    }
}

/// The weighting scheme attached to one view for a fusion call.
pub enum ViewWeight<F> {
    /// Border-distance blending only.
    Blending(BlendingProfile),
    /// Content-based contrast only.
    ContentBased(ContentBasedField<F>),
    /// Pointwise product of blending and content-based weights.
    Combined(BlendingProfile, ContentBasedField<F>),
}

impl<F: FuseFloat> ViewWeight<F> {
    /// Evaluate the combined weight at a native coordinate; 0 outside the
    /// view's extent.
    pub fn weight_at(&self, local: [f64; 3]) -> F {
        match self {
            ViewWeight::Blending(b) => b.weight_at(local),
            ViewWeight::ContentBased(c) => c.weight_at(local).unwrap_or_else(F::zero),
            ViewWeight::Combined(b, c) => {
                let bw: F = b.weight_at(local);
                if bw <= F::zero() {
                    return F::zero();
                }
                match c.weight_at(local) {
                    Some(cw) => bw * cw,
                    None => F::zero(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ArraySource;
    use ndarray::Array3;

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    // ==================== Gaussian Kernel Tests ====================

    #[test]
    fn test_gaussian_kernel_sums_to_one() {
        for sigma in [0.5f32, 1.0, 2.0, 5.0] {
            let kernel = gaussian_kernel_1d(sigma);
            let sum: f32 = kernel.iter().sum();
            assert!(
                approx_eq(sum, 1.0, 1e-6),
                "Kernel for sigma={} sums to {}",
                sigma,
                sum
            );
        }
    }

    #[test]
    fn test_gaussian_kernel_symmetric() {
        let kernel = gaussian_kernel_1d(2.0f32);
        let n = kernel.len();
        for i in 0..n / 2 {
            assert!(approx_eq(kernel[i], kernel[n - 1 - i], 1e-7));
        }
    }

    #[test]
    fn test_gaussian_kernel_zero_sigma() {
        let kernel = gaussian_kernel_1d(0.0f32);
        assert_eq!(kernel.len(), 1);
        assert_eq!(kernel[0], 1.0);
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(0, 5), 0);
        assert_eq!(reflect_index(4, 5), 4);
        assert_eq!(reflect_index(-1, 5), 0);
        assert_eq!(reflect_index(-2, 5), 1);
        assert_eq!(reflect_index(5, 5), 3);
        assert_eq!(reflect_index(6, 5), 2);
    }

    // ==================== Blur Tests ====================

    #[test]
    fn test_blur_uniform_unchanged() {
        let mut data = Array3::from_elem((8, 8, 8), 3.0f32);
        gaussian_blur_3d(&mut data, [2.0, 2.0, 2.0]);
        for &v in data.iter() {
            assert!(approx_eq(v, 3.0, 1e-5));
        }
    }

    #[test]
    fn test_blur_spreads_impulse() {
        let mut data = Array3::from_elem((9, 9, 9), 0.0f32);
        data[[4, 4, 4]] = 1.0;
        gaussian_blur_3d(&mut data, [1.0, 1.0, 1.0]);

        assert!(data[[4, 4, 4]] < 1.0);
        assert!(data[[4, 4, 5]] > 0.0);
        assert!(data[[5, 4, 4]] > 0.0);
        // mass approximately preserved under reflect boundary
        let sum: f32 = data.iter().sum();
        assert!(approx_eq(sum, 1.0, 1e-4));
    }

    // ==================== Blending Profile Tests ====================

    #[test]
    fn test_blending_interior_is_one() {
        let b = BlendingProfile::new([20, 20, 20], [0.0; 3], [3.0; 3]);
        let w: f32 = b.weight_at([10.0, 10.0, 10.0]);
        assert!(approx_eq(w, 1.0, 1e-6));
    }

    #[test]
    fn test_blending_zero_outside() {
        let b = BlendingProfile::new([20, 20, 20], [0.0; 3], [3.0; 3]);
        let w: f32 = b.weight_at([-0.5, 10.0, 10.0]);
        assert_eq!(w, 0.0);
        let w: f32 = b.weight_at([10.0, 19.5, 10.0]);
        assert_eq!(w, 0.0);
    }

    #[test]
    fn test_blending_border_excluded() {
        let b = BlendingProfile::new([20, 20, 20], [2.0; 3], [3.0; 3]);
        // inside the border margin the weight is fully 0
        let w: f32 = b.weight_at([1.0, 10.0, 10.0]);
        assert_eq!(w, 0.0);
        let w: f32 = b.weight_at([1.9, 10.0, 10.0]);
        assert_eq!(w, 0.0);
    }

    #[test]
    fn test_blending_ramp_monotone() {
        let b = BlendingProfile::new([40, 40, 40], [0.0; 3], [8.0; 3]);
        let mut prev: f32 = -1.0;
        for i in 0..=8 {
            let w: f32 = b.weight_at([i as f64, 20.0, 20.0]);
            assert!(w >= prev, "ramp must be non-decreasing at {}", i);
            prev = w;
        }
        assert!(approx_eq(prev, 1.0, 1e-6));
        // face itself carries zero weight
        let w0: f32 = b.weight_at([0.0, 20.0, 20.0]);
        assert!(approx_eq(w0, 0.0, 1e-6));
    }

    #[test]
    fn test_blending_product_over_axes() {
        let b = BlendingProfile::new([40, 40, 40], [0.0; 3], [8.0; 3]);
        let wx: f32 = b.weight_at([4.0, 20.0, 20.0]);
        let wy: f32 = b.weight_at([20.0, 4.0, 20.0]);
        let wxy: f32 = b.weight_at([4.0, 4.0, 20.0]);
        assert!(approx_eq(wxy, wx * wy, 1e-6));
    }

    // ==================== Content-Based Tests ====================

    #[test]
    fn test_content_uniform_is_zero() {
        let src = ArraySource::new(Array3::from_elem((12, 12, 12), 0.7f32));
        let field = ContentBasedField::new(&src, [1.0; 3], [2.0; 3]);
        for z in 0..12 {
            let w = field.weight_at([6.0, 6.0, z as f64]).unwrap();
            assert!(approx_eq(w, 0.0, 1e-5), "uniform image has no content");
        }
    }

    #[test]
    fn test_content_peaks_near_edges() {
        // step edge along x at x = 8
        let data = Array3::from_shape_fn(
            (16, 16, 16),
            |(_, _, x)| if x < 8 { 0.0f32 } else { 1.0 },
        );
        let src = ArraySource::new(data);
        let field = ContentBasedField::new(&src, [1.0; 3], [2.0; 3]);

        let at_edge = field.weight_at([8.0, 8.0, 8.0]).unwrap();
        let far_away = field.weight_at([1.0, 8.0, 8.0]).unwrap();
        assert!(
            at_edge > far_away,
            "contrast weight must dominate near the edge: {} vs {}",
            at_edge,
            far_away
        );
    }

    #[test]
    fn test_content_outside_absent() {
        let src = ArraySource::new(Array3::from_elem((4, 4, 4), 0.0f32));
        let field = ContentBasedField::new(&src, [1.0; 3], [2.0; 3]);
        assert!(field.weight_at([-1.0, 0.0, 0.0]).is_none());
        assert!(field.weight_at([0.0, 0.0, 4.0]).is_none());
    }

    // ==================== Combination Tests ====================

    #[test]
    fn test_combined_is_pointwise_product() {
        let data = Array3::from_shape_fn(
            (16, 16, 16),
            |(_, _, x)| if x < 8 { 0.0f32 } else { 1.0 },
        );
        let src = ArraySource::new(data);

        let blending = BlendingProfile::new([16, 16, 16], [0.0; 3], [4.0; 3]);
        let content = ContentBasedField::new(&src, [1.0; 3], [2.0; 3]);

        let pos = [8.0, 2.0, 8.0];
        let bw: f32 = blending.weight_at(pos);
        let cw = content.weight_at(pos).unwrap();

        let combined = ViewWeight::Combined(
            BlendingProfile::new([16, 16, 16], [0.0; 3], [4.0; 3]),
            ContentBasedField::new(&src, [1.0; 3], [2.0; 3]),
        );
        assert!(approx_eq(combined.weight_at(pos), bw * cw, 1e-6));
    }

    #[test]
    fn test_combined_zero_outside() {
        let src = ArraySource::new(Array3::from_elem((8, 8, 8), 1.0f32));
        let combined = ViewWeight::Combined(
            BlendingProfile::new([8, 8, 8], [0.0; 3], [2.0; 3]),
            ContentBasedField::new(&src, [1.0; 3], [2.0; 3]),
        );
        assert_eq!(combined.weight_at([-3.0, 4.0, 4.0]), 0.0f32);
    }
}
