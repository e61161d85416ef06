//! Lazy weighted fusion of registered views.
//!
//! [`fuse_virtual`] captures, per view, a resampled image and an optional
//! weight field, and returns a [`FusedVolume`] that evaluates
//! `sum(sample * weight) / sum(weight)` independently at every requested
//! coordinate. Nothing is precomputed except content-based weight fields,
//! which need a smoothed neighborhood and are materialized per view before
//! accumulation begins.

use crate::error::{FusionError, FusionResult};
use crate::float_trait::FuseFloat;
use crate::geometry::{Affine3, BoundingBox};
use crate::resample::{Interpolation, TransformedView};
use crate::view::View;
use crate::volume::Volume;
use crate::weights::{BlendingProfile, ContentBasedField, ViewWeight};

/// Target blending ramp width in output units.
const DEFAULT_BLENDING_RANGE: f64 = 40.0;

/// Target blending border margin in output units.
const DEFAULT_BLENDING_BORDER: f64 = 0.0;

/// Narrow sigma of the content-based contrast estimate.
const DEFAULT_CONTENT_SIGMA1: f64 = 20.0;

/// Wide sigma of the content-based contrast estimate.
const DEFAULT_CONTENT_SIGMA2: f64 = 40.0;

/// Parameters of one fusion call. Immutable once the call begins; there is
/// no process-wide state.
#[derive(Debug, Clone)]
pub struct FusionOptions {
    /// Weight views by distance to their borders.
    pub use_blending: bool,
    /// Weight views by local contrast.
    pub use_content_based: bool,
    /// Interpolation order for resampling views into the output frame.
    pub interpolation: Interpolation,
    /// Downsampling factor applied to the bounding box and all transforms.
    /// Non-finite means no downsampling.
    pub downsampling: f64,
    /// Target blending ramp width per axis, in output units.
    pub blending_range: [f64; 3],
    /// Target blending border margin per axis, in output units.
    pub blending_border: [f64; 3],
    /// Narrow content-based sigma per axis, in output units.
    pub content_sigma1: [f64; 3],
    /// Wide content-based sigma per axis, in output units.
    pub content_sigma2: [f64; 3],
    /// Output value where no view contributes. A zero fill changes
    /// downstream statistics relative to an absent marker, so this is
    /// configurable rather than hard-coded.
    pub fallback: f64,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            use_blending: true,
            use_content_based: false,
            interpolation: Interpolation::Linear,
            downsampling: f64::NAN,
            blending_range: [DEFAULT_BLENDING_RANGE; 3],
            blending_border: [DEFAULT_BLENDING_BORDER; 3],
            content_sigma1: [DEFAULT_CONTENT_SIGMA1; 3],
            content_sigma2: [DEFAULT_CONTENT_SIGMA2; 3],
            fallback: 0.0,
        }
    }
}

impl FusionOptions {
    /// Plain averaging: no blending, no content-based weighting.
    pub fn unweighted() -> Self {
        Self {
            use_blending: false,
            use_content_based: false,
            ..Default::default()
        }
    }
}

/// Per-axis scale factors of a view's model, asserted valid.
fn checked_scales(model: &Affine3) -> [f64; 3] {
    let scale = model.axis_scales();
    for (d, s) in scale.iter().enumerate() {
        debug_assert!(
            s.is_finite() && *s > 0.0,
            "axis {} of view transform has invalid scale {}",
            d,
            s
        );
    }
    scale
}

/// Compute how much blending in the input has to be done so the target
/// blending range and border are achieved in the fused image, accounting
/// for downsampling, anisotropy and the registration itself.
pub fn adjust_blending(model: &Affine3, blending: &mut [f64; 3], border: &mut [f64; 3]) {
    let scale = checked_scales(model);
    tracing::debug!(?scale, "adjusting blending for view scale");

    for d in 0..3 {
        blending[d] /= scale[d];
        border[d] /= scale[d];
    }
}

/// Compute how much smoothing in the input has to be applied so the target
/// sigmas of the contrast estimate are achieved in the fused image.
pub fn adjust_content_based(model: &Affine3, sigma1: &mut [f64; 3], sigma2: &mut [f64; 3]) {
    let scale = checked_scales(model);

    for d in 0..3 {
        sigma1[d] /= scale[d];
        sigma2[d] /= scale[d];
    }
}

/// One view's contribution to the fused result: resampled image and
/// optional weight, sharing a single inverse mapping per lookup.
struct ViewChannel<'a, F: FuseFloat> {
    image: TransformedView<'a, F>,
    weight: Option<ViewWeight<F>>,
}

impl<F: FuseFloat> ViewChannel<'_, F> {
    /// Sample and weight at a global output coordinate. Absent samples
    /// contribute nothing.
    #[inline]
    fn contribute(&self, global: [f64; 3]) -> Option<(F, F)> {
        let local = self.image.to_local(global);
        let sample = self.image.sample_local(local)?;
        let weight = match &self.weight {
            Some(w) => w.weight_at(local),
            None => F::one(),
        };
        Some((sample, weight))
    }
}

/// The lazy fusion accumulator over a zero-min output interval.
///
/// Every access recomputes from the captured (resampled view, weight field)
/// pairs; the volume owns no sample storage of its own.
pub struct FusedVolume<'a, F: FuseFloat> {
    dim: [usize; 3],
    offset: [i64; 3],
    channels: Vec<ViewChannel<'a, F>>,
    fallback: F,
}

impl<F: FuseFloat> FusedVolume<'_, F> {
    /// Weighted combination at a zero-min output coordinate.
    #[inline]
    pub fn sample(&self, pos: [usize; 3]) -> F {
        let global = [
            pos[0] as f64 + self.offset[0] as f64,
            pos[1] as f64 + self.offset[1] as f64,
            pos[2] as f64 + self.offset[2] as f64,
        ];

        let mut sum = F::zero();
        let mut weight_sum = F::zero();

        for channel in &self.channels {
            if let Some((sample, weight)) = channel.contribute(global) {
                sum += sample * weight;
                weight_sum += weight;
            }
        }

        if weight_sum > F::zero() {
            sum / weight_sum
        } else {
            self.fallback
        }
    }
}

impl<F: FuseFloat> Volume<F> for FusedVolume<'_, F> {
    fn dim(&self) -> [usize; 3] {
        self.dim
    }

    fn offset(&self) -> [i64; 3] {
        self.offset
    }

    #[inline]
    fn get(&self, pos: [usize; 3]) -> F {
        self.sample(pos)
    }
}

/// Fuse a set of registered views over a bounding box into a lazy volume.
///
/// Weight parameters are rescaled per view so the configured effective
/// widths hold in the (possibly downsampled, anisotropic) output frame.
/// Transforms are copied before any in-call rescaling; the views themselves
/// are never modified.
pub fn fuse_virtual<'a, F: FuseFloat>(
    views: &'a [View<F>],
    bounding_box: &BoundingBox,
    options: &FusionOptions,
) -> FusionResult<FusedVolume<'a, F>> {
    if views.is_empty() {
        return Err(FusionError::NoViews);
    }

    let scale_factor = if options.downsampling.is_finite() {
        Some(1.0 / options.downsampling)
    } else {
        None
    };

    let bb = match scale_factor {
        Some(f) => bounding_box.scale(f),
        None => *bounding_box,
    };

    let mut channels = Vec::with_capacity(views.len());

    for view in views {
        let mut model = view.model;
        if let Some(f) = scale_factor {
            // maps from the input to the downsampled output grid, for the
            // image as well as its weights
            model.pre_scale(f);
        }

        let image = TransformedView::new(
            view.id,
            view.source.as_ref(),
            &model,
            options.interpolation,
        )?;

        let blending = if options.use_blending {
            let mut range = options.blending_range;
            let mut border = options.blending_border;
            adjust_blending(&model, &mut range, &mut border);
            Some(BlendingProfile::new(view.source.dim(), border, range))
        } else {
            None
        };

        let content = if options.use_content_based {
            let mut sigma1 = options.content_sigma1;
            let mut sigma2 = options.content_sigma2;
            adjust_content_based(&model, &mut sigma1, &mut sigma2);
            Some(ContentBasedField::new(
                view.source.as_ref(),
                sigma1,
                sigma2,
            ))
        } else {
            None
        };

        let weight = match (blending, content) {
            (Some(b), Some(c)) => Some(ViewWeight::Combined(b, c)),
            (Some(b), None) => Some(ViewWeight::Blending(b)),
            (None, Some(c)) => Some(ViewWeight::ContentBased(c)),
            (None, None) => None,
        };

        channels.push(ViewChannel { image, weight });
    }

    Ok(FusedVolume {
        dim: bb.dim(),
        offset: bb.min(),
        channels,
        fallback: F::from_f64_c(options.fallback),
    })
}
