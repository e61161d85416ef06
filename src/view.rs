//! Input views: identity, registration transform and lazy pixel access.
//!
//! A view is one registered acquisition (angle/illumination/channel/
//! timepoint) of the specimen. Its pixel data is accessed lazily through
//! [`PixelSource`]; the fusion core never requires a whole view in memory.

use ndarray::Array3;

use crate::float_trait::FuseFloat;
use crate::geometry::Affine3;

/// Identity of one registered input acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u32);

/// Lazy random access to a view's native pixel grid.
///
/// Implementations must be thread-safe for concurrent reads; the core
/// shares sources across worker threads without synchronization.
pub trait PixelSource<F: FuseFloat>: Send + Sync {
    /// Extent of the native pixel grid, x/y/z.
    fn dim(&self) -> [usize; 3];

    /// Value at an in-bounds integer coordinate.
    fn get(&self, pos: [usize; 3]) -> F;
}

/// A pixel source backed by a dense in-memory array, shaped (z, y, x).
#[derive(Debug, Clone)]
pub struct ArraySource<F> {
    data: Array3<F>,
}

impl<F: FuseFloat> ArraySource<F> {
    pub fn new(data: Array3<F>) -> Self {
        Self { data }
    }
}

impl<F: FuseFloat> PixelSource<F> for ArraySource<F> {
    fn dim(&self) -> [usize; 3] {
        let (nz, ny, nx) = self.data.dim();
        [nx, ny, nz]
    }

    #[inline]
    fn get(&self, pos: [usize; 3]) -> F {
        self.data[[pos[2], pos[1], pos[0]]]
    }
}

/// One registered input view: identity, affine model into the global output
/// frame, lazy pixel source and optional voxel-size metadata.
///
/// The model is immutable for the duration of one fusion call; downsampled
/// fusion rescales a copy, never the view itself.
pub struct View<F: FuseFloat> {
    pub id: ViewId,
    pub model: Affine3,
    pub source: Box<dyn PixelSource<F>>,
    /// Physical voxel size per axis, when known from acquisition metadata.
    pub voxel_size: Option<[f64; 3]>,
}

impl<F: FuseFloat> View<F> {
    pub fn new(id: ViewId, model: Affine3, source: Box<dyn PixelSource<F>>) -> Self {
        Self {
            id,
            model,
            source,
            voxel_size: None,
        }
    }

    pub fn with_voxel_size(mut self, voxel_size: [f64; 3]) -> Self {
        self.voxel_size = Some(voxel_size);
        self
    }

    /// Smallest physical voxel extent of this view. Falls back to 1.0 with
    /// a warning when no voxel size metadata is available.
    pub fn min_resolution(&self) -> f64 {
        match self.voxel_size {
            Some(s) => s[0].min(s[1]).min(s[2]),
            None => {
                tracing::warn!(view = self.id.0, "could not load voxel size, assuming 1,1,1");
                1.0
            }
        }
    }
}
