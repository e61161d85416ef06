//! Multi-View Image Fusion Core
//!
//! Pure Rust engine for fusing registered 3D acquisitions (angles,
//! illuminations, channels, timepoints) into a single output volume.
//! Fusion is lazy: each output voxel is the weighted combination of every
//! view covering it, computed on access and optionally cached or copied
//! into a dense buffer.

pub mod error;
pub mod export;
pub mod float_trait;
pub mod fusion;
pub mod geometry;
pub mod materialize;
pub mod portion;
pub mod resample;
pub mod stats;
pub mod view;
pub mod volume;
pub mod weights;

// Re-export commonly used types at the crate root
pub use error::{FusionError, FusionResult};
pub use export::{ExportSink, FusionProvenance};
pub use float_trait::FuseFloat;
pub use fusion::{fuse_virtual, FusedVolume, FusionOptions};
pub use geometry::{Affine3, BoundingBox};
pub use materialize::{materialize, FusedImage, ImgDataType, MaterializeOptions};
pub use portion::{divide_into_portions, ImagePortion};
pub use resample::Interpolation;
pub use stats::{min_max, min_max_approx, min_max_avg_approx, normalize_image, MinMaxAvg};
pub use view::{ArraySource, PixelSource, View, ViewId};
pub use volume::{DenseVolume, Volume};
