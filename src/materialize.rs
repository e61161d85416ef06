//! Materialization strategies for a fused volume.
//!
//! The same lazy [`FusedVolume`] can be consumed three ways: recompute on
//! every access, cache computed cells with a bounded LRU, or copy the whole
//! result into a dense buffer up front. All three produce identical
//! numbers; they trade memory against repeated-access cost.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ndarray::Array3;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::{FusionError, FusionResult};
use crate::float_trait::FuseFloat;
use crate::fusion::FusedVolume;
use crate::geometry::index_to_pos;
use crate::portion::{divide_into_portions, with_pool};
use crate::volume::{DenseVolume, Volume};

/// Cell edge length of the cached strategy.
const DEFAULT_CELL_DIM: usize = 64;

/// Maximum number of cells kept resident by the cached strategy.
const DEFAULT_MAX_CACHED_CELLS: usize = 100;

/// How a fused result is held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImgDataType {
    /// Recompute the weighted combination on every access.
    Virtual,
    /// Compute cell tiles on demand and keep a bounded number resident.
    #[default]
    Cached,
    /// Copy the full result into a dense buffer before returning.
    Precomputed,
}

/// Parameters of the materialization step.
#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    pub data_type: ImgDataType,
    /// Tile extent per axis of the cached strategy.
    pub cell_dim: [usize; 3],
    /// Resident tile budget of the cached strategy.
    pub max_cells: usize,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            data_type: ImgDataType::default(),
            cell_dim: [DEFAULT_CELL_DIM; 3],
            max_cells: DEFAULT_MAX_CACHED_CELLS,
        }
    }
}

/// Progress observer for the precompute copy, called with the completed
/// fraction in (0, 1].
pub type ProgressFn<'p> = &'p (dyn Fn(f64) + Sync);

fn panic_detail(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Copy a volume into a dense buffer, one parallel task per portion.
///
/// Portions map to disjoint output slices, so workers write lock-free. A
/// panicking worker aborts the batch with a task failure; the partial
/// output is discarded.
pub fn precompute<F: FuseFloat, V: Volume<F>>(
    volume: &V,
    pool: Option<&rayon::ThreadPool>,
    progress: Option<ProgressFn<'_>>,
) -> FusionResult<DenseVolume<F>> {
    let dim = volume.dim();
    let size = volume.num_elements();
    let mut data = vec![F::zero(); size as usize];

    let result: Result<(), String> = with_pool(pool, |threads| {
        let portions = divide_into_portions(size, threads);
        tracing::debug!(?dim, portions = portions.len(), "precomputing fused volume");

        // carve the flat buffer into one disjoint slice per portion
        let mut chunks = Vec::with_capacity(portions.len());
        let mut rest = data.as_mut_slice();
        for p in &portions {
            let (head, tail) = rest.split_at_mut(p.len as usize);
            chunks.push(head);
            rest = tail;
        }

        let total = portions.len();
        let done = AtomicUsize::new(0);

        portions
            .par_iter()
            .zip(chunks.into_par_iter())
            .try_for_each(|(portion, chunk)| {
                catch_unwind(AssertUnwindSafe(|| {
                    for (i, out) in chunk.iter_mut().enumerate() {
                        let pos = index_to_pos((portion.start + i as u64) as usize, dim);
                        *out = volume.get(pos);
                    }
                }))
                .map_err(panic_detail)?;

                if let Some(cb) = progress {
                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    cb(finished as f64 / total as f64);
                }
                Ok(())
            })
    });

    result.map_err(|detail| {
        tracing::error!(detail = %detail, "failed to copy image");
        FusionError::TaskFailed {
            job: "copy image",
            detail,
        }
    })?;

    let shape = (dim[2], dim[1], dim[0]);
    let array = Array3::from_shape_vec(shape, data)
        .map_err(|e| FusionError::TaskFailed {
            job: "copy image",
            detail: e.to_string(),
        })?;

    Ok(DenseVolume::new(array, volume.offset()))
}

struct CacheEntry<F> {
    data: Vec<F>,
    last_used: u64,
}

struct CellCache<F> {
    cells: FxHashMap<usize, CacheEntry<F>>,
    tick: u64,
}

/// Cell-tiled cache over a lazy fused volume.
///
/// A whole cell is computed on first touch of any of its voxels, under the
/// cache lock, so each cell is computed at most once. When the resident
/// budget is exceeded the least recently used cell is dropped; it is simply
/// recomputed on the next touch.
pub struct CellCachedVolume<'a, F: FuseFloat> {
    source: FusedVolume<'a, F>,
    cell_dim: [usize; 3],
    max_cells: usize,
    grid: [usize; 3],
    cache: Mutex<CellCache<F>>,
}

impl<'a, F: FuseFloat> CellCachedVolume<'a, F> {
    pub fn new(source: FusedVolume<'a, F>, cell_dim: [usize; 3], max_cells: usize) -> Self {
        let dim = source.dim();
        let mut grid = [0usize; 3];
        for d in 0..3 {
            grid[d] = dim[d].div_ceil(cell_dim[d]);
        }
        Self {
            source,
            cell_dim,
            max_cells: max_cells.max(1),
            grid,
            cache: Mutex::new(CellCache {
                cells: FxHashMap::default(),
                tick: 0,
            }),
        }
    }

    /// Extent of a cell clipped at the volume boundary.
    fn cell_extent(&self, cell: [usize; 3]) -> [usize; 3] {
        let dim = self.source.dim();
        let mut extent = [0usize; 3];
        for d in 0..3 {
            let min = cell[d] * self.cell_dim[d];
            extent[d] = self.cell_dim[d].min(dim[d] - min);
        }
        extent
    }

    fn compute_cell(&self, cell: [usize; 3]) -> Vec<F> {
        let extent = self.cell_extent(cell);
        let mut data = Vec::with_capacity(extent[0] * extent[1] * extent[2]);
        for lz in 0..extent[2] {
            for ly in 0..extent[1] {
                for lx in 0..extent[0] {
                    data.push(self.source.sample([
                        cell[0] * self.cell_dim[0] + lx,
                        cell[1] * self.cell_dim[1] + ly,
                        cell[2] * self.cell_dim[2] + lz,
                    ]));
                }
            }
        }
        data
    }
}

impl<F: FuseFloat> Volume<F> for CellCachedVolume<'_, F> {
    fn dim(&self) -> [usize; 3] {
        self.source.dim()
    }

    fn offset(&self) -> [i64; 3] {
        self.source.offset()
    }

    fn get(&self, pos: [usize; 3]) -> F {
        let mut cell = [0usize; 3];
        let mut local = [0usize; 3];
        for d in 0..3 {
            cell[d] = pos[d] / self.cell_dim[d];
            local[d] = pos[d] % self.cell_dim[d];
        }
        let key = (cell[2] * self.grid[1] + cell[1]) * self.grid[0] + cell[0];
        let extent = self.cell_extent(cell);
        let index = (local[2] * extent[1] + local[1]) * extent[0] + local[0];

        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.tick += 1;
        let tick = cache.tick;

        if let Some(entry) = cache.cells.get_mut(&key) {
            entry.last_used = tick;
            return entry.data[index];
        }

        if cache.cells.len() >= self.max_cells {
            if let Some(evict) = cache
                .cells
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| *k)
            {
                cache.cells.remove(&evict);
            }
        }

        let data = self.compute_cell(cell);
        let value = data[index];
        cache.cells.insert(
            key,
            CacheEntry {
                data,
                last_used: tick,
            },
        );
        value
    }
}

/// A fused result under one of the three materialization strategies.
pub enum FusedImage<'a, F: FuseFloat> {
    Virtual(FusedVolume<'a, F>),
    Cached(CellCachedVolume<'a, F>),
    Precomputed(DenseVolume<F>),
}

impl<F: FuseFloat> Volume<F> for FusedImage<'_, F> {
    fn dim(&self) -> [usize; 3] {
        match self {
            FusedImage::Virtual(v) => v.dim(),
            FusedImage::Cached(v) => v.dim(),
            FusedImage::Precomputed(v) => v.dim(),
        }
    }

    fn offset(&self) -> [i64; 3] {
        match self {
            FusedImage::Virtual(v) => v.offset(),
            FusedImage::Cached(v) => v.offset(),
            FusedImage::Precomputed(v) => v.offset(),
        }
    }

    #[inline]
    fn get(&self, pos: [usize; 3]) -> F {
        match self {
            FusedImage::Virtual(v) => v.get(pos),
            FusedImage::Cached(v) => v.get(pos),
            FusedImage::Precomputed(v) => v.get(pos),
        }
    }
}

/// Wrap a lazy fused volume in the requested materialization strategy.
pub fn materialize<'a, F: FuseFloat>(
    fused: FusedVolume<'a, F>,
    options: &MaterializeOptions,
    pool: Option<&rayon::ThreadPool>,
    progress: Option<ProgressFn<'_>>,
) -> FusionResult<FusedImage<'a, F>> {
    match options.data_type {
        ImgDataType::Virtual => Ok(FusedImage::Virtual(fused)),
        ImgDataType::Cached => Ok(FusedImage::Cached(CellCachedVolume::new(
            fused,
            options.cell_dim,
            options.max_cells,
        ))),
        ImgDataType::Precomputed => {
            let dense = precompute(&fused, pool, progress)?;
            Ok(FusedImage::Precomputed(dense))
        }
    }
}
