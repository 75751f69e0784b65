//! # MOTS Eval - Segmentation Tracking Evaluation
//!
//! CLEAR MOT evaluation of multi-object tracking and segmentation results.
//!
//! Ground truth and predicted videos are decoded Scalabel-style labels with
//! RLE or polygon masks. Every class of every video is matched frame by frame
//! on mask IoU, the matches are folded into tracking events, and the events
//! are turned into MOTA, MOTP, IDF1, MT/PT/ML, FM and IDSw per class, per
//! super-class, as an unweighted AVERAGE and as an OVERALL pool.
//!
//! ## Features
//!
//! - Canonical column-major RLE masks (COCO compressed strings, polygons)
//! - Crowd / ignored regions that swallow false positives
//! - Identity-switch aware tracking accumulator
//! - Global identity assignment for IDF1
//! - Videos evaluated in parallel on a rayon pool
//!
//! ## Example
//!
//! ```rust,ignore
//! use mots_eval_rs::{evaluate, group_and_sort, Config, EvalOptions, Frame};
//!
//! let gts = group_and_sort(serde_json::from_str::<Vec<Frame>>(&gt_json)?);
//! let preds = group_and_sort(serde_json::from_str::<Vec<Frame>>(&pred_json)?);
//! let config: Config = serde_json::from_str(&config_json)?;
//!
//! let result = evaluate(&gts, &preds, &config, &EvalOptions::default())?;
//! println!("{}", result);
//! ```

// Internal modules (assignment solver)
pub(crate) mod internal;

// Public modules
pub mod extract;
pub mod label;
pub mod mask;
pub mod matching;
pub mod metrics;

// Re-exports for convenience
pub use extract::{Detection, FrameObjects, IdRegistry, ObjectExtractor};
pub use label::{
    group_and_sort, Category, Config, Frame, ImageSize, Label, Poly2d, RleLabel, Video,
};
pub use mask::Mask;
pub use matching::{FrameMatch, FrameMatcher};
pub use metrics::{evaluate, ClassMetric, EvalOptions, EvalResult, MetricRow, Scores};

// Error types
pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    /// Errors that can occur during an evaluation
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        Config(String),

        #[error("Unknown category: {0}")]
        UnknownCategory(String),

        #[error("Shape mismatch: {0}")]
        ShapeMismatch(String),

        #[error("Invalid mask: {0}")]
        InvalidMask(String),

        #[error("Worker pool error: {0}")]
        WorkerPool(#[from] rayon::ThreadPoolBuildError),

        #[error("Serialization error: {0}")]
        Serialization(#[from] serde_json::Error),
    }

    /// Result type for evaluation operations
    pub type Result<T> = std::result::Result<T, Error>;
}
