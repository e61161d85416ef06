//! Error taxonomy for the fusion core.
//!
//! Recoverable conditions (degenerate normalization ranges, failed worker
//! batches) are reported as variants rather than panics. Coverage gaps are
//! not errors; a coordinate with no contributing view resolves to the
//! configured fallback value instead.

/// Convenience result type used across the fusion core.
pub type FusionResult<T> = Result<T, FusionError>;

/// Top-level error taxonomy for fusion operations.
#[derive(thiserror::Error, Debug)]
pub enum FusionError {
    /// The normalization factor is zero or non-finite (min == max).
    /// The input image is left unmodified.
    #[error("cannot normalize image, min={min} max={max}")]
    DegenerateRange { min: f64, max: f64 },

    /// A bounding box with non-positive extent or inverted min/max.
    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// A view transform whose linear part cannot be inverted.
    #[error("transform of view {view} is singular")]
    SingularTransform { view: u32 },

    /// No views were supplied to a fusion call.
    #[error("no views supplied for fusion")]
    NoViews,

    /// A worker task of a parallel batch failed. The batch is aborted and
    /// already-written output must be treated as indeterminate.
    #[error("failed to {job}: {detail}")]
    TaskFailed { job: &'static str, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_identify_operation() {
        let err = FusionError::TaskFailed {
            job: "copy image",
            detail: "worker panicked".to_string(),
        };
        assert!(err.to_string().contains("copy image"));

        let err = FusionError::DegenerateRange { min: 5.0, max: 5.0 };
        assert!(err.to_string().contains("min=5"));
    }
}
