//! Generic sample precision for the fusion core.
//!
//! Every algorithm is parameterized over [`FuseFloat`], so the same code
//! fuses `f32` and `f64` volumes without runtime dispatch on the pixel
//! type.

use num_traits::{Float, FromPrimitive, NumAssign};
use std::fmt::Debug;
use std::iter::Sum;

/// Capability bound for sample values flowing through the fusion core.
///
/// Combines the arithmetic the weighted accumulator needs (`Float`,
/// `NumAssign`, `Sum`), conversions from the `f64` parameter space and
/// from grid indices, and the thread-safety bounds required to share
/// volumes across rayon workers.
pub trait FuseFloat:
    Float + FromPrimitive + NumAssign + Sum + Debug + Send + Sync + 'static
{
    /// Gaussian kernels are cut off at this many sigmas.
    const GAUSSIAN_TRUNCATE: Self;

    /// Lossy conversion from an `f64` parameter.
    fn from_f64_c(val: f64) -> Self;

    /// Conversion from a grid index.
    fn usize_as(val: usize) -> Self;
}

impl FuseFloat for f32 {
    const GAUSSIAN_TRUNCATE: Self = 4.0;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f32
    }
}

impl FuseFloat for f64 {
    const GAUSSIAN_TRUNCATE: Self = 4.0;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The accumulator's core expression, written once over the bound.
    fn weighted_mean<F: FuseFloat>(samples: &[F], weights: &[F]) -> F {
        let sum: F = samples
            .iter()
            .zip(weights)
            .map(|(&s, &w)| s * w)
            .sum();
        let weight_sum: F = weights.iter().copied().sum();
        sum / weight_sum
    }

    #[test]
    fn test_weighted_mean_generic_over_precision() {
        let m32 = weighted_mean(&[1.0f32, 3.0], &[1.0, 1.0]);
        assert!((m32 - 2.0).abs() < 1e-6);

        let m64 = weighted_mean(&[10.0f64, 20.0, 30.0], &[0.5, 0.25, 0.25]);
        assert!((m64 - 17.5).abs() < 1e-12);
    }

    #[test]
    fn test_truncate_fixes_kernel_radius() {
        // radius = ceil(truncate * sigma), shared by both precisions
        let r32 = (f32::GAUSSIAN_TRUNCATE * 2.0).ceil() as usize;
        let r64 = (f64::GAUSSIAN_TRUNCATE * 2.0).ceil() as usize;
        assert_eq!(r32, 8);
        assert_eq!(r64, 8);
    }

    #[test]
    fn test_parameter_conversion() {
        let blending: f32 = FuseFloat::from_f64_c(40.0);
        assert_eq!(blending, 40.0f32);
        let sigma: f64 = FuseFloat::from_f64_c(20.0);
        assert_eq!(sigma, 20.0f64);
    }

    #[test]
    fn test_grid_index_conversion_exact() {
        // f32 represents grid indices exactly up to 2^24
        let n: f32 = FuseFloat::usize_as(1 << 24);
        assert_eq!(n, 16_777_216.0f32);
        let n: f64 = FuseFloat::usize_as(4095);
        assert_eq!(n, 4095.0f64);
    }
}
