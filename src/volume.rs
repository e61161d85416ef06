//! Volume abstraction shared by lazy, cached and dense fusion results.
//!
//! Statistics and export consume any [`Volume`] without knowing how it is
//! materialized. Coordinates are zero-minimum; the original bounding-box
//! minimum is reported by [`Volume::offset`].

use ndarray::Array3;

use crate::float_trait::FuseFloat;

/// Read access to a fused output volume.
pub trait Volume<F: FuseFloat>: Sync {
    /// Extent per axis, x/y/z.
    fn dim(&self) -> [usize; 3];

    /// Translation from zero-min internal coordinates back into the global
    /// output frame (the bounding-box minimum of the fusion call).
    fn offset(&self) -> [i64; 3];

    /// Sample value at a zero-min coordinate inside `dim()`.
    fn get(&self, pos: [usize; 3]) -> F;

    /// Total number of samples.
    fn num_elements(&self) -> u64 {
        let d = self.dim();
        d[0] as u64 * d[1] as u64 * d[2] as u64
    }
}

/// A fully materialized fusion result: dense buffer, O(1) reads.
#[derive(Debug, Clone)]
pub struct DenseVolume<F> {
    data: Array3<F>,
    offset: [i64; 3],
}

impl<F: FuseFloat> DenseVolume<F> {
    /// Wrap a dense buffer shaped (z, y, x) with its global offset.
    pub fn new(data: Array3<F>, offset: [i64; 3]) -> Self {
        Self { data, offset }
    }

    pub fn data(&self) -> &Array3<F> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<F> {
        &mut self.data
    }
}

impl<F: FuseFloat> Volume<F> for DenseVolume<F> {
    fn dim(&self) -> [usize; 3] {
        let (nz, ny, nx) = self.data.dim();
        [nx, ny, nz]
    }

    fn offset(&self) -> [i64; 3] {
        self.offset
    }

    #[inline]
    fn get(&self, pos: [usize; 3]) -> F {
        self.data[[pos[2], pos[1], pos[0]]]
    }
}
