//! Intensity statistics and normalization over fused volumes.
//!
//! Exact min/max walks every voxel with one parallel task per portion. The
//! approximate variants sample a fixed number of random positions with a
//! seeded generator, so repeated runs on the same volume return the same
//! estimate. Normalization rescales a dense volume in place and refuses to
//! touch it when the range is degenerate.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{FusionError, FusionResult};
use crate::float_trait::FuseFloat;
use crate::geometry::index_to_pos;
use crate::portion::{divide_into_portions, with_pool};
use crate::volume::{DenseVolume, Volume};

/// Seed of the approximate min/max sampler.
pub const APPROX_MIN_MAX_SEED: u64 = 3535;

/// Sample count of the approximate min/max estimate.
pub const APPROX_MIN_MAX_SAMPLES: usize = 1000;

/// Sampled intensity summary of a volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxAvg<F> {
    pub min: F,
    pub max: F,
    pub avg: F,
}

/// Exact minimum and maximum over every voxel, one parallel reduction task
/// per portion.
pub fn min_max<F: FuseFloat, V: Volume<F>>(
    volume: &V,
    pool: Option<&rayon::ThreadPool>,
) -> (F, F) {
    let dim = volume.dim();
    let size = volume.num_elements();

    with_pool(pool, |threads| {
        divide_into_portions(size, threads)
            .par_iter()
            .map(|portion| {
                let mut lo = F::infinity();
                let mut hi = F::neg_infinity();
                for i in portion.start..portion.start + portion.len {
                    let v = volume.get(index_to_pos(i as usize, dim));
                    if v < lo {
                        lo = v;
                    }
                    if v > hi {
                        hi = v;
                    }
                }
                (lo, hi)
            })
            .reduce(
                || (F::infinity(), F::neg_infinity()),
                |a, b| (a.0.min(b.0), a.1.max(b.1)),
            )
    })
}

/// Estimate min, max and average from `samples` random voxels drawn with a
/// seeded generator. The estimate is deterministic for a given seed and
/// never exceeds the exact range. At least one sample is required.
pub fn min_max_avg_approx<F: FuseFloat, V: Volume<F>>(
    volume: &V,
    samples: usize,
    seed: u64,
) -> MinMaxAvg<F> {
    debug_assert!(samples > 0, "at least one sample is required");
    let dim = volume.dim();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut lo = F::infinity();
    let mut hi = F::neg_infinity();

    // Kahan summation keeps the average stable over many small samples
    let mut sum = 0.0f64;
    let mut comp = 0.0f64;

    for _ in 0..samples {
        let pos = [
            rng.gen_range(0..dim[0]),
            rng.gen_range(0..dim[1]),
            rng.gen_range(0..dim[2]),
        ];
        let v = volume.get(pos);
        if v < lo {
            lo = v;
        }
        if v > hi {
            hi = v;
        }

        let y = v.to_f64().unwrap_or(0.0) - comp;
        let t = sum + y;
        comp = (t - sum) - y;
        sum = t;
    }

    MinMaxAvg {
        min: lo,
        max: hi,
        avg: F::from_f64_c(sum / samples as f64),
    }
}

/// Approximate minimum and maximum with the default sample count and seed.
pub fn min_max_approx<F: FuseFloat, V: Volume<F>>(volume: &V) -> (F, F) {
    let mma = min_max_avg_approx(volume, APPROX_MIN_MAX_SAMPLES, APPROX_MIN_MAX_SEED);
    (mma.min, mma.max)
}

/// Rescale a dense volume in place so `[min, max]` maps onto `[0, 1]`.
///
/// Fails without modifying the image when `max - min` is zero or
/// non-finite. The rescale runs one parallel task per portion over disjoint
/// slices of the buffer.
pub fn normalize_image<F: FuseFloat>(
    image: &mut DenseVolume<F>,
    min: f64,
    max: f64,
    pool: Option<&rayon::ThreadPool>,
) -> FusionResult<()> {
    let diff = max - min;
    if diff == 0.0 || !diff.is_finite() {
        return Err(FusionError::DegenerateRange { min, max });
    }

    let offset = F::from_f64_c(min);
    let inv = F::from_f64_c(1.0 / diff);

    if let Some(slice) = image.data_mut().as_slice_mut() {
        with_pool(pool, |threads| {
            let portions = divide_into_portions(slice.len() as u64, threads);

            let mut chunks = Vec::with_capacity(portions.len());
            let mut rest = slice;
            for p in &portions {
                let (head, tail) = rest.split_at_mut(p.len as usize);
                chunks.push(head);
                rest = tail;
            }

            chunks.into_par_iter().for_each(|chunk| {
                for v in chunk.iter_mut() {
                    *v = (*v - offset) * inv;
                }
            });
        });
        return Ok(());
    }

    // non-contiguous layouts cannot be split into flat portions
    for v in image.data_mut().iter_mut() {
        *v = (*v - offset) * inv;
    }

    Ok(())
}
