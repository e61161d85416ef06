//! Export seam: hand a fused volume to an external writer.
//!
//! The core never writes files itself. An [`ExportSink`] receives any
//! [`Volume`] together with a [`FusionProvenance`] record describing how it
//! was produced, so writers can name and annotate their output without
//! re-deriving the fusion parameters.

use crate::error::FusionResult;
use crate::float_trait::FuseFloat;
use crate::geometry::BoundingBox;
use crate::view::ViewId;
use crate::volume::Volume;

/// How a fused volume was produced, for naming and metadata on export.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionProvenance {
    /// Requested interval in the global output frame, before downsampling.
    pub bounding_box: BoundingBox,
    /// Downsampling factor, when one was applied.
    pub downsampling: Option<f64>,
    /// z-anisotropy factor preserved through fusion, when one applies.
    pub anisotropy: Option<f64>,
    /// Display title of the fused image.
    pub title: String,
    /// Description of the fused view group.
    pub group: String,
}

impl FusionProvenance {
    pub fn new(bounding_box: BoundingBox, views: &[ViewId]) -> Self {
        let group = group_name(views);
        Self {
            bounding_box,
            downsampling: None,
            anisotropy: None,
            title: fused_title(&group, None),
            group,
        }
    }

    pub fn with_downsampling(mut self, downsampling: f64) -> Self {
        if downsampling.is_finite() {
            self.downsampling = Some(downsampling);
            self.title = fused_title(&self.group, self.downsampling);
        }
        self
    }

    pub fn with_anisotropy(mut self, anisotropy: f64) -> Self {
        self.anisotropy = Some(anisotropy);
        self
    }
}

/// Receiver of fused output; implementations live outside the core.
pub trait ExportSink<F: FuseFloat> {
    fn export(
        &mut self,
        volume: &dyn Volume<F>,
        provenance: &FusionProvenance,
    ) -> FusionResult<()>;
}

/// Human-readable name of a fused view group, e.g. `views [0, 2, 5]`.
pub fn group_name(views: &[ViewId]) -> String {
    let mut ids: Vec<u32> = views.iter().map(|v| v.0).collect();
    ids.sort_unstable();
    ids.dedup();

    let list = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("views [{}]", list)
}

/// Display title of a fused image, carrying the downsampling factor when
/// one was applied.
pub fn fused_title(group: &str, downsampling: Option<f64>) -> String {
    match downsampling {
        Some(ds) if ds != 1.0 => format!("fused: {} (downsampled {}x)", group, ds),
        _ => format!("fused: {}", group),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::DenseVolume;
    use ndarray::Array3;

    struct CollectingSink {
        titles: Vec<String>,
        voxels: u64,
    }

    impl ExportSink<f32> for CollectingSink {
        fn export(
            &mut self,
            volume: &dyn Volume<f32>,
            provenance: &FusionProvenance,
        ) -> FusionResult<()> {
            self.titles.push(provenance.title.clone());
            self.voxels += volume.num_elements();
            Ok(())
        }
    }

    #[test]
    fn test_group_name_sorted_deduplicated() {
        let name = group_name(&[ViewId(5), ViewId(0), ViewId(2), ViewId(5)]);
        assert_eq!(name, "views [0, 2, 5]");
    }

    #[test]
    fn test_fused_title() {
        assert_eq!(fused_title("views [0]", None), "fused: views [0]");
        assert_eq!(fused_title("views [0]", Some(1.0)), "fused: views [0]");
        assert_eq!(
            fused_title("views [0, 1]", Some(2.0)),
            "fused: views [0, 1] (downsampled 2x)"
        );
    }

    #[test]
    fn test_provenance_builder() {
        let bb = BoundingBox::new([0, 0, 0], [9, 9, 9]).unwrap();
        let p = FusionProvenance::new(bb, &[ViewId(0), ViewId(1)])
            .with_downsampling(4.0)
            .with_anisotropy(2.5);

        assert_eq!(p.downsampling, Some(4.0));
        assert_eq!(p.anisotropy, Some(2.5));
        assert_eq!(p.title, "fused: views [0, 1] (downsampled 4x)");

        // non-finite factor means no downsampling was applied
        let p = FusionProvenance::new(bb, &[ViewId(0)]).with_downsampling(f64::NAN);
        assert_eq!(p.downsampling, None);
    }

    #[test]
    fn test_sink_receives_volume_and_provenance() {
        let bb = BoundingBox::new([0, 0, 0], [3, 3, 3]).unwrap();
        let vol = DenseVolume::new(Array3::<f32>::zeros((4, 4, 4)), [0, 0, 0]);
        let mut sink = CollectingSink {
            titles: Vec::new(),
            voxels: 0,
        };

        sink.export(&vol, &FusionProvenance::new(bb, &[ViewId(3)]))
            .unwrap();

        assert_eq!(sink.titles, vec!["fused: views [3]".to_string()]);
        assert_eq!(sink.voxels, 64);
    }
}
