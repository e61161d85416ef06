//! Deterministic partitioning of a flattened index space for parallel work.
//!
//! Every heavy per-voxel operation (precompute copy, exact min/max,
//! normalization) is expressed as one independent task per portion. The
//! partition is a pure function of (size, thread count), so workloads are
//! reproducible across runs.

/// Number of voxels per portion beyond which the partition grows past the
/// thread count (64^3).
const VOXELS_PER_PORTION: u64 = 64 * 64 * 64;

/// Run `op` inside the caller's pool, handing it the worker count that
/// should size the portion partition.
///
/// When no pool is supplied a scoped pool is built for the call and torn
/// down on every exit path. If building one fails, the ambient rayon pool
/// is used instead.
pub(crate) fn with_pool<R: Send>(
    pool: Option<&rayon::ThreadPool>,
    op: impl FnOnce(usize) -> R + Send,
) -> R {
    match pool {
        Some(p) => {
            let threads = p.current_num_threads();
            p.install(move || op(threads))
        }
        None => match rayon::ThreadPoolBuilder::new().build() {
            Ok(owned) => {
                let threads = owned.current_num_threads();
                owned.install(move || op(threads))
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not build worker pool, using ambient pool");
                op(rayon::current_num_threads())
            }
        },
    }
}

/// A contiguous, disjoint slice of a flattened index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePortion {
    /// First flattened index covered by this portion.
    pub start: u64,
    /// Number of indices covered.
    pub len: u64,
}

/// Split `[0, size)` into near-equal contiguous portions.
///
/// If `size <= threads`, each index gets its own portion. Otherwise the
/// target portion count is `max(threads, size / 64^3)`, shrunk until the
/// uniform chunk size is non-zero; the final portion absorbs the remainder.
/// Portions are ordered, non-overlapping and cover `[0, size)` exactly;
/// `size == 0` yields an empty list.
pub fn divide_into_portions(size: u64, threads: usize) -> Vec<ImagePortion> {
    let threads = threads.max(1) as u64;

    if size == 0 {
        return Vec::new();
    }

    let mut num_portions = if size <= threads {
        size
    } else {
        threads.max(size / VOXELS_PER_PORTION)
    };

    let mut chunk = size / num_portions;
    while chunk == 0 {
        num_portions -= 1;
        chunk = size / num_portions;
    }
    let remainder = size % num_portions;

    let mut portions = Vec::with_capacity(num_portions as usize);
    for id in 0..num_portions {
        let start = id * chunk;
        // the last portion runs longer when size is not divisible evenly
        let len = if id == num_portions - 1 {
            chunk + remainder
        } else {
            chunk
        };
        portions.push(ImagePortion { start, len });
    }

    portions
}
