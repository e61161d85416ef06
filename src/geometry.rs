//! Affine transforms and bounding boxes in the global output frame.
//!
//! Every view carries a 3D affine model mapping its native pixel grid into
//! the common output frame. Fusion itself always works on a zero-minimum
//! interval; the bounding-box minimum is kept as an offset and reapplied at
//! the boundary when results are exposed.

use crate::error::{FusionError, FusionResult};

/// Row-major 3x4 affine transform (linear part plus translation column).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine3 {
    m: [[f64; 4]; 3],
}

impl Affine3 {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }

    /// Build a transform from explicit rows.
    pub fn from_rows(m: [[f64; 4]; 3]) -> Self {
        Self { m }
    }

    /// A pure translation.
    pub fn translation(t: [f64; 3]) -> Self {
        let mut a = Self::identity();
        for d in 0..3 {
            a.m[d][3] = t[d];
        }
        a
    }

    /// A per-axis scaling.
    pub fn scaling(s: [f64; 3]) -> Self {
        let mut a = Self::identity();
        for d in 0..3 {
            a.m[d][d] = s[d];
        }
        a
    }

    /// Apply the transform to a point.
    #[inline]
    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (row, o) in self.m.iter().zip(out.iter_mut()) {
            *o = row[0] * p[0] + row[1] * p[1] + row[2] * p[2] + row[3];
        }
        out
    }

    /// Compose two transforms: the result applies `other` first, then
    /// `self`.
    pub fn concatenate(&self, other: &Affine3) -> Affine3 {
        let a = &self.m;
        let b = &other.m;
        let mut m = [[0.0; 4]; 3];
        for r in 0..3 {
            for c in 0..3 {
                m[r][c] = a[r][0] * b[0][c] + a[r][1] * b[1][c] + a[r][2] * b[2][c];
            }
            m[r][3] = a[r][0] * b[0][3] + a[r][1] * b[1][3] + a[r][2] * b[2][3] + a[r][3];
        }
        Affine3 { m }
    }

    /// Rescale the output frame of this transform uniformly. Scaling by
    /// `1/downsampling` maps the model into the downsampled output grid;
    /// it multiplies every entry, translation included.
    pub fn pre_scale(&mut self, factor: f64) {
        for row in self.m.iter_mut() {
            for v in row.iter_mut() {
                *v *= factor;
            }
        }
    }

    /// Per-axis scale factors of the transform: output units covered per
    /// native pixel step along each input axis (the column norms of the
    /// linear part). The view extent cancels out, so it is not needed here.
    pub fn axis_scales(&self) -> [f64; 3] {
        let mut s = [0.0; 3];
        for (d, sd) in s.iter_mut().enumerate() {
            let mut sum = 0.0;
            for row in &self.m {
                sum += row[d] * row[d];
            }
            *sd = sum.sqrt();
        }
        s
    }

    /// Invert the transform. Fails when the linear part is singular.
    pub fn invert(&self) -> Option<Affine3> {
        let m = &self.m;
        let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);

        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }

        let inv_det = 1.0 / det;
        let mut inv = [[0.0; 4]; 3];
        inv[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
        inv[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
        inv[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
        inv[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
        inv[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
        inv[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
        inv[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
        inv[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
        inv[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;

        // inverse translation: -A^-1 * t
        for d in 0..3 {
            inv[d][3] =
                -(inv[d][0] * m[0][3] + inv[d][1] * m[1][3] + inv[d][2] * m[2][3]);
        }

        Some(Affine3 { m: inv })
    }
}

/// Axis-aligned integer interval in the global output frame, min/max
/// inclusive per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    min: [i64; 3],
    max: [i64; 3],
}

impl BoundingBox {
    /// Create a bounding box. Every axis must satisfy min <= max.
    pub fn new(min: [i64; 3], max: [i64; 3]) -> FusionResult<Self> {
        for d in 0..3 {
            if min[d] > max[d] {
                return Err(FusionError::InvalidBoundingBox(format!(
                    "min {:?} > max {:?} on axis {}",
                    min, max, d
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// Lower bound per axis (inclusive).
    pub fn min(&self) -> [i64; 3] {
        self.min
    }

    /// Upper bound per axis (inclusive).
    pub fn max(&self) -> [i64; 3] {
        self.max
    }

    /// Extent per axis; always positive.
    pub fn dim(&self) -> [usize; 3] {
        let mut d = [0; 3];
        for i in 0..3 {
            d[i] = (self.max[i] - self.min[i] + 1) as usize;
        }
        d
    }

    /// Total number of output pixels at the given downsampling factor:
    /// the product over axes of round(extent / downsampling). A non-finite
    /// factor means no downsampling.
    pub fn num_pixels(&self, downsampling: f64) -> u64 {
        let ds = if downsampling.is_finite() {
            downsampling
        } else {
            1.0
        };

        let mut n = 1u64;
        for d in 0..3 {
            let extent = (self.max[d] - self.min[d] + 1) as f64;
            n *= (extent / ds).round() as u64;
        }
        n
    }

    /// Scale min and max by a factor, rounding to the nearest integer.
    /// Used to map the requested interval into a downsampled output grid;
    /// the factor must be positive or min/max would invert.
    pub fn scale(&self, factor: f64) -> Self {
        debug_assert!(
            factor.is_finite() && factor > 0.0,
            "scale factor must be positive, got {}",
            factor
        );
        let mut min = [0i64; 3];
        let mut max = [0i64; 3];
        for d in 0..3 {
            min[d] = (self.min[d] as f64 * factor).round() as i64;
            max[d] = (self.max[d] as f64 * factor).round() as i64;
        }
        Self { min, max }
    }
}

/// Map a flattened index into a 3D position, x fastest.
#[inline]
pub fn index_to_pos(index: usize, dim: [usize; 3]) -> [usize; 3] {
    let x = index % dim[0];
    let y = (index / dim[0]) % dim[1];
    let z = index / (dim[0] * dim[1]);
    [x, y, z]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_identity_apply() {
        let t = Affine3::identity();
        let p = t.apply([1.5, -2.0, 7.0]);
        assert_eq!(p, [1.5, -2.0, 7.0]);
    }

    #[test]
    fn test_translation_apply() {
        let t = Affine3::translation([5.0, 0.0, -3.0]);
        let p = t.apply([1.0, 2.0, 3.0]);
        assert_eq!(p, [6.0, 2.0, 0.0]);
    }

    #[test]
    fn test_invert_round_trip() {
        let t = Affine3::from_rows([
            [2.0, 0.1, 0.0, 5.0],
            [0.0, 0.5, 0.2, -1.0],
            [0.3, 0.0, 4.0, 2.0],
        ]);
        let inv = t.invert().unwrap();

        let p = [3.0, -2.0, 1.0];
        let back = inv.apply(t.apply(p));
        for d in 0..3 {
            assert!(approx_eq(back[d], p[d], 1e-9), "axis {}: {}", d, back[d]);
        }
    }

    #[test]
    fn test_concatenate_applies_right_first() {
        let scale = Affine3::scaling([2.0, 2.0, 2.0]);
        let shift = Affine3::translation([1.0, 0.0, 0.0]);

        // scale after shift: (p + t) * 2
        let p = scale.concatenate(&shift).apply([3.0, 1.0, 1.0]);
        assert_eq!(p, [8.0, 2.0, 2.0]);

        // shift after scale: p * 2 + t
        let p = shift.concatenate(&scale).apply([3.0, 1.0, 1.0]);
        assert_eq!(p, [7.0, 2.0, 2.0]);
    }

    #[test]
    fn test_invert_singular() {
        let t = Affine3::scaling([1.0, 0.0, 1.0]);
        assert!(t.invert().is_none());
    }

    #[test]
    fn test_axis_scales() {
        let t = Affine3::scaling([2.0, 0.5, 3.0]);
        let s = t.axis_scales();
        assert!(approx_eq(s[0], 2.0, 1e-12));
        assert!(approx_eq(s[1], 0.5, 1e-12));
        assert!(approx_eq(s[2], 3.0, 1e-12));
    }

    #[test]
    fn test_axis_scales_after_pre_scale() {
        let mut t = Affine3::scaling([2.0, 2.0, 8.0]);
        t.pre_scale(0.5);
        let s = t.axis_scales();
        assert!(approx_eq(s[0], 1.0, 1e-12));
        assert!(approx_eq(s[2], 4.0, 1e-12));
    }

    #[test]
    fn test_bounding_box_dim() {
        let bb = BoundingBox::new([0, 0, 0], [9, 19, 4]).unwrap();
        assert_eq!(bb.dim(), [10, 20, 5]);
    }

    #[test]
    fn test_bounding_box_rejects_inverted() {
        assert!(BoundingBox::new([0, 5, 0], [9, 4, 9]).is_err());
    }

    #[test]
    fn test_num_pixels_no_downsampling() {
        let bb = BoundingBox::new([0, 0, 0], [9, 9, 9]).unwrap();
        assert_eq!(bb.num_pixels(1.0), 1000);
        // NaN means no downsampling
        assert_eq!(bb.num_pixels(f64::NAN), 1000);
    }

    #[test]
    fn test_num_pixels_downsampled() {
        let bb = BoundingBox::new([0, 0, 0], [9, 9, 9]).unwrap();
        // round(10/2)^3
        assert_eq!(bb.num_pixels(2.0), 125);
        // round(10/4) = round(2.5) = 3
        assert_eq!(bb.num_pixels(4.0), 27);
    }

    #[test]
    fn test_num_pixels_negative_min() {
        let bb = BoundingBox::new([-5, -5, -5], [4, 4, 4]).unwrap();
        assert_eq!(bb.num_pixels(1.0), 1000);
    }

    #[test]
    fn test_scale_bounding_box() {
        let bb = BoundingBox::new([0, 0, 0], [99, 99, 99]).unwrap();
        let scaled = bb.scale(0.5);
        assert_eq!(scaled.min(), [0, 0, 0]);
        assert_eq!(scaled.max(), [50, 50, 50]);
    }

    #[test]
    #[should_panic(expected = "scale factor must be positive")]
    fn test_scale_rejects_non_positive_factor() {
        let bb = BoundingBox::new([0, 0, 0], [9, 9, 9]).unwrap();
        let _ = bb.scale(-0.5);
    }

    #[test]
    fn test_index_to_pos_x_fastest() {
        let dim = [4, 3, 2];
        assert_eq!(index_to_pos(0, dim), [0, 0, 0]);
        assert_eq!(index_to_pos(1, dim), [1, 0, 0]);
        assert_eq!(index_to_pos(4, dim), [0, 1, 0]);
        assert_eq!(index_to_pos(12, dim), [0, 0, 1]);
        assert_eq!(index_to_pos(23, dim), [3, 2, 1]);
    }
}
