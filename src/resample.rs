//! Resampling a view into the global output frame.
//!
//! A [`TransformedView`] maps output coordinates through the inverse of the
//! view's registration model into native pixel space and interpolates.
//! Coordinates falling outside the native extent yield `None`, which the
//! accumulator treats as a zero-weight contribution, never an error.

use crate::error::{FusionError, FusionResult};
use crate::float_trait::FuseFloat;
use crate::geometry::Affine3;
use crate::view::{PixelSource, ViewId};

/// Interpolation order used when sampling transformed views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Nearest-neighbor lookup.
    NearestNeighbor,
    /// Trilinear interpolation.
    #[default]
    Linear,
}

/// A lazily-evaluated view of one input in output-frame coordinates.
pub struct TransformedView<'a, F: FuseFloat> {
    source: &'a dyn PixelSource<F>,
    inverse: Affine3,
    dim: [usize; 3],
    interpolation: Interpolation,
}

impl<'a, F: FuseFloat> TransformedView<'a, F> {
    /// Wrap a pixel source with its model into the output frame. Fails when
    /// the model cannot be inverted.
    pub fn new(
        id: ViewId,
        source: &'a dyn PixelSource<F>,
        model: &Affine3,
        interpolation: Interpolation,
    ) -> FusionResult<Self> {
        let inverse = model
            .invert()
            .ok_or(FusionError::SingularTransform { view: id.0 })?;
        Ok(Self {
            source,
            inverse,
            dim: source.dim(),
            interpolation,
        })
    }

    /// Map a global output coordinate into native pixel space.
    #[inline]
    pub fn to_local(&self, global: [f64; 3]) -> [f64; 3] {
        self.inverse.apply(global)
    }

    /// Sample the view at a global output coordinate, or `None` when the
    /// inverse-mapped position lies outside the native extent.
    #[inline]
    pub fn sample(&self, global: [f64; 3]) -> Option<F> {
        self.sample_local(self.to_local(global))
    }

    /// Sample at an already inverse-mapped native coordinate.
    pub fn sample_local(&self, local: [f64; 3]) -> Option<F> {
        match self.interpolation {
            Interpolation::NearestNeighbor => {
                let mut pos = [0usize; 3];
                for d in 0..3 {
                    let r = local[d].round();
                    if r < 0.0 || r > (self.dim[d] - 1) as f64 {
                        return None;
                    }
                    pos[d] = r as usize;
                }
                Some(self.source.get(pos))
            }
            Interpolation::Linear => {
                let mut base = [0usize; 3];
                let mut frac = [F::zero(); 3];
                for d in 0..3 {
                    if local[d] < 0.0 || local[d] > (self.dim[d] - 1) as f64 {
                        return None;
                    }
                    let f = local[d].floor();
                    base[d] = f as usize;
                    frac[d] = F::from_f64_c(local[d] - f);
                }

                let mut acc = F::zero();
                for corner in 0..8usize {
                    let mut pos = base;
                    let mut w = F::one();
                    for d in 0..3 {
                        if corner & (1 << d) != 0 {
                            // clamp keeps the upper face in bounds
                            pos[d] = (base[d] + 1).min(self.dim[d] - 1);
                            w *= frac[d];
                        } else {
                            w *= F::one() - frac[d];
                        }
                    }
                    if w > F::zero() {
                        acc += self.source.get(pos) * w;
                    }
                }
                Some(acc)
            }
        }
    }
}
