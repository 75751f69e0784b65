//! CLEAR MOT metrics evaluation module.
//!
//! - `TrackAccumulator` - Per video, per class event accumulation
//! - `IdentityTable` - Identity co-occurrence counts behind IDF1
//! - `ClassMetric` / `Scores` - Metric computation from merged tallies
//! - `evaluate` - Dataset-level evaluation on a worker pool

mod accumulator;
mod evaluation;
mod identity;
mod summary;

pub use accumulator::{
    ClassTally, EventCounts, IdentityTrack, MOTEvent, MOTEventType, TrackAccumulator, TrackStatus,
};
pub use evaluation::{
    accumulate_video, evaluate, EvalOptions, EvalResult, MetricRow, AVERAGE_ROW, OVERALL_ROW,
};
pub use identity::{merged_true_positives, IdentityTable};
pub use summary::{ClassMetric, Scores, METRIC_COLUMNS, UNDEFINED};
